//! Parsed classfile structure.
//!
//! A `ClassNode` is built once per class-load event, mutated in place by
//! transformers, serialized back to bytes at most once, and discarded.
//! Attributes the tree does not model are carried as raw bytes; the
//! append-only constant pool keeps their indices valid.

use crate::insn::{Const, Handle, Insn, LabelId};
use crate::pool::ConstPool;

/// The access flags this crate actually needs to look at.
pub mod access {
    pub const ACC_PUBLIC: u16 = 0x0001;
    pub const ACC_STATIC: u16 = 0x0008;
    pub const ACC_FINAL: u16 = 0x0010;
    pub const ACC_SUPER: u16 = 0x0020;
    pub const ACC_NATIVE: u16 = 0x0100;
    pub const ACC_INTERFACE: u16 = 0x0200;
    pub const ACC_ABSTRACT: u16 = 0x0400;
}

/// An attribute carried verbatim.
#[derive(Debug, Clone, PartialEq)]
pub struct RawAttribute {
    pub name: String,
    pub data: Vec<u8>,
}

/// One `BootstrapMethods` table entry, symbolic.
#[derive(Debug, Clone, PartialEq)]
pub struct BootstrapMethod {
    pub handle: Handle,
    pub args: Vec<Const>,
}

/// An exception-handler table entry, label-based. `catch_type` of `None`
/// is the catch-all used by `finally`.
#[derive(Debug, Clone, PartialEq)]
pub struct TryCatch {
    pub start: LabelId,
    pub end: LabelId,
    pub handler: LabelId,
    pub catch_type: Option<String>,
}

/// A `LineNumberTable` entry.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct LineNumber {
    pub start: LabelId,
    pub line: u16,
}

/// A `LocalVariableTable` entry.
#[derive(Debug, Clone, PartialEq)]
pub struct LocalVar {
    pub start: LabelId,
    pub end: LabelId,
    pub name: String,
    pub descriptor: String,
    pub index: u16,
}

/// A verification type in a stack map frame.
#[derive(Debug, Clone, PartialEq)]
pub enum VerificationType {
    Top,
    Integer,
    Float,
    Double,
    Long,
    Null,
    UninitializedThis,
    Object(String),
    Uninitialized(LabelId),
}

impl VerificationType {
    /// Long and Double verification entries stand for two locals slots.
    pub fn slots(&self) -> u16 {
        match self {
            VerificationType::Long | VerificationType::Double => 2,
            _ => 1,
        }
    }
}

/// A stack map frame, expanded to full form on read and written back as
/// `full_frame` entries with recomputed offset deltas.
#[derive(Debug, Clone, PartialEq)]
pub struct StackMapFrame {
    pub at: LabelId,
    pub locals: Vec<VerificationType>,
    pub stack: Vec<VerificationType>,
}

/// A field; everything beyond the header is raw passthrough.
#[derive(Debug, Clone, PartialEq)]
pub struct FieldNode {
    pub access: u16,
    pub name: String,
    pub descriptor: String,
    pub attrs: Vec<RawAttribute>,
}

/// A method with its decoded Code attribute.
#[derive(Debug, Clone, PartialEq)]
pub struct MethodNode {
    pub access: u16,
    pub name: String,
    pub descriptor: String,
    pub max_stack: u16,
    pub max_locals: u16,
    pub instructions: Vec<Insn>,
    pub try_catches: Vec<TryCatch>,
    pub line_numbers: Vec<LineNumber>,
    pub local_vars: Vec<LocalVar>,
    pub frames: Vec<StackMapFrame>,
    /// Unknown Code sub-attributes, dropped if the body was edited since
    /// their offsets would be stale.
    pub code_attrs: Vec<RawAttribute>,
    /// Unknown method-level attributes (Signature, Exceptions, ...).
    pub attrs: Vec<RawAttribute>,
    next_label: u32,
}

impl MethodNode {
    pub fn new(access: u16, name: impl Into<String>, descriptor: impl Into<String>) -> Self {
        Self {
            access,
            name: name.into(),
            descriptor: descriptor.into(),
            max_stack: 0,
            max_locals: 0,
            instructions: Vec::new(),
            try_catches: Vec::new(),
            line_numbers: Vec::new(),
            local_vars: Vec::new(),
            frames: Vec::new(),
            code_attrs: Vec::new(),
            attrs: Vec::new(),
            next_label: 0,
        }
    }

    /// Whether this method carries a Code attribute at all.
    pub fn has_code(&self) -> bool {
        self.access & (access::ACC_ABSTRACT | access::ACC_NATIVE) == 0
    }

    /// Allocates a fresh label, unique within this method.
    pub fn new_label(&mut self) -> LabelId {
        let id = LabelId(self.next_label);
        self.next_label += 1;
        id
    }

    /// Bumps the label allocator past `id`; used by the reader after it
    /// has assigned labels from bytecode offsets.
    pub(crate) fn reserve_labels(&mut self, count: u32) {
        self.next_label = self.next_label.max(count);
    }

    /// Position of a label's pseudo-instruction, if placed.
    pub fn label_position(&self, label: LabelId) -> Option<usize> {
        self.instructions
            .iter()
            .position(|i| matches!(i, Insn::Label(l) if *l == label))
    }
}

/// A parsed class.
#[derive(Debug, Clone)]
pub struct ClassNode {
    pub minor_version: u16,
    pub major_version: u16,
    pub pool: ConstPool,
    pub access: u16,
    pub name: String,
    pub super_name: Option<String>,
    pub interfaces: Vec<String>,
    pub fields: Vec<FieldNode>,
    pub methods: Vec<MethodNode>,
    /// The `BootstrapMethods` table, symbolic and append-only (parsed pool
    /// entries reference it by position).
    pub bootstrap_methods: Vec<BootstrapMethod>,
    /// Unknown class-level attributes.
    pub attrs: Vec<RawAttribute>,
}

impl ClassNode {
    /// A minimal class shell, mostly useful for tests and generated code.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            minor_version: 0,
            major_version: 52, // Java 8
            pool: ConstPool::new(),
            access: access::ACC_PUBLIC | access::ACC_SUPER,
            name: name.into(),
            super_name: Some("java/lang/Object".to_owned()),
            interfaces: Vec::new(),
            fields: Vec::new(),
            methods: Vec::new(),
            bootstrap_methods: Vec::new(),
            attrs: Vec::new(),
        }
    }

    pub fn method(&self, name: &str, descriptor: &str) -> Option<&MethodNode> {
        self.methods
            .iter()
            .find(|m| m.name == name && m.descriptor == descriptor)
    }

    pub fn method_mut(&mut self, name: &str, descriptor: &str) -> Option<&mut MethodNode> {
        self.methods
            .iter_mut()
            .find(|m| m.name == name && m.descriptor == descriptor)
    }
}
