//! The instruction tree: structured instructions with symbolic operands.
//!
//! Labels are pseudo-instructions interleaved with real ones, so a
//! position in a method's `Vec<Insn>` identifies an instruction and jump
//! targets survive arbitrary edits. Compact encodings (`iload_2`,
//! `ldc_w`, wide forms) are normalization details of the reader/writer
//! and never appear here.

use std::fmt;

use crate::opcode::Opcode;

/// An opaque label. Allocated per method; see
/// [`crate::node::MethodNode::new_label`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct LabelId(pub u32);

impl fmt::Display for LabelId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}

/// Method handle kinds (JVMS table 5.4.3.5-A).
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum HandleKind {
    GetField,
    GetStatic,
    PutField,
    PutStatic,
    InvokeVirtual,
    InvokeStatic,
    InvokeSpecial,
    NewInvokeSpecial,
    InvokeInterface,
}

impl HandleKind {
    pub fn from_byte(byte: u8) -> Option<Self> {
        Some(match byte {
            1 => Self::GetField,
            2 => Self::GetStatic,
            3 => Self::PutField,
            4 => Self::PutStatic,
            5 => Self::InvokeVirtual,
            6 => Self::InvokeStatic,
            7 => Self::InvokeSpecial,
            8 => Self::NewInvokeSpecial,
            9 => Self::InvokeInterface,
            _ => return None,
        })
    }

    pub fn byte(self) -> u8 {
        match self {
            Self::GetField => 1,
            Self::GetStatic => 2,
            Self::PutField => 3,
            Self::PutStatic => 4,
            Self::InvokeVirtual => 5,
            Self::InvokeStatic => 6,
            Self::InvokeSpecial => 7,
            Self::NewInvokeSpecial => 8,
            Self::InvokeInterface => 9,
        }
    }

    /// Field-handle kinds reference a Fieldref entry, the rest a Methodref.
    pub fn refers_to_field(self) -> bool {
        matches!(
            self,
            Self::GetField | Self::GetStatic | Self::PutField | Self::PutStatic
        )
    }
}

/// A symbolic field or method handle.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Handle {
    pub kind: HandleKind,
    pub owner: String,
    pub name: String,
    pub descriptor: String,
    pub interface: bool,
}

impl fmt::Display for Handle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}{}", self.owner, self.name, self.descriptor)
    }
}

/// A loadable constant.
#[derive(Debug, Clone, PartialEq)]
pub enum Const {
    Int(i32),
    Long(i64),
    Float(f32),
    Double(f64),
    Str(String),
    Class(String),
    MethodHandle(Handle),
    MethodType(String),
    /// A `CONSTANT_Dynamic` constant, carried for fidelity.
    Dynamic(Box<CallSite>),
}

impl Const {
    /// Operand-stack slots when loaded.
    pub fn slots(&self) -> u16 {
        match self {
            Const::Long(_) | Const::Double(_) => 2,
            _ => 1,
        }
    }
}

impl fmt::Display for Const {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Const::Int(v) => write!(f, "{v}"),
            Const::Long(v) => write!(f, "{v}L"),
            Const::Float(v) => write!(f, "{v}f"),
            Const::Double(v) => write!(f, "{v}d"),
            Const::Str(s) => write!(f, "{s:?}"),
            Const::Class(name) => write!(f, "{name}.class"),
            Const::MethodHandle(h) => write!(f, "handle {h}"),
            Const::MethodType(d) => write!(f, "type {d}"),
            Const::Dynamic(cs) => write!(f, "condy {}:{}", cs.name, cs.descriptor),
        }
    }
}

/// The symbolic form of a dynamic call site (or dynamic constant): the
/// invoked name/descriptor plus the bootstrap method and its static
/// arguments. The writer interns the `BootstrapMethods` entry on emit.
#[derive(Debug, Clone, PartialEq)]
pub struct CallSite {
    pub name: String,
    pub descriptor: String,
    pub bootstrap: Handle,
    pub args: Vec<Const>,
}

/// Element types for `newarray`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ArrayType {
    Boolean,
    Char,
    Float,
    Double,
    Byte,
    Short,
    Int,
    Long,
}

impl ArrayType {
    pub fn from_byte(byte: u8) -> Option<Self> {
        Some(match byte {
            4 => Self::Boolean,
            5 => Self::Char,
            6 => Self::Float,
            7 => Self::Double,
            8 => Self::Byte,
            9 => Self::Short,
            10 => Self::Int,
            11 => Self::Long,
            _ => return None,
        })
    }

    pub fn byte(self) -> u8 {
        match self {
            Self::Boolean => 4,
            Self::Char => 5,
            Self::Float => 6,
            Self::Double => 7,
            Self::Byte => 8,
            Self::Short => 9,
            Self::Int => 10,
            Self::Long => 11,
        }
    }
}

/// One instruction (or label pseudo-instruction) in a method body.
#[derive(Debug, Clone, PartialEq)]
pub enum Insn {
    /// A position marker; never emitted as bytes.
    Label(LabelId),
    /// Any opcode without operands (`nop`, `iconst_0`, `iadd`, `return`, ...).
    Simple(Opcode),
    /// `bipush` / `sipush`.
    PushInt { op: Opcode, value: i32 },
    /// A constant load; the writer picks `ldc`/`ldc_w`/`ldc2_w`.
    LoadConst(Const),
    /// Local variable access (`*load`, `*store`, `ret`), wide-normalized.
    Local { op: Opcode, index: u16 },
    /// `iinc`, wide-normalized.
    Iinc { index: u16, delta: i16 },
    /// Field access (`getstatic`, `putstatic`, `getfield`, `putfield`).
    Field {
        op: Opcode,
        owner: String,
        name: String,
        descriptor: String,
    },
    /// Method invocation except `invokedynamic`.
    Method {
        op: Opcode,
        owner: String,
        name: String,
        descriptor: String,
        interface: bool,
    },
    /// `invokedynamic`.
    InvokeDynamic(CallSite),
    /// All branches; `goto_w`/`jsr_w` are normalized to `goto`/`jsr` and
    /// re-widened on write only when the offset demands it.
    Jump { op: Opcode, target: LabelId },
    Tableswitch {
        default: LabelId,
        low: i32,
        high: i32,
        targets: Vec<LabelId>,
    },
    Lookupswitch {
        default: LabelId,
        pairs: Vec<(i32, LabelId)>,
    },
    /// `new`, `anewarray`, `checkcast`, `instanceof`.
    Type { op: Opcode, class_name: String },
    /// `newarray`.
    NewArray(ArrayType),
    /// `multianewarray`.
    MultiANewArray { descriptor: String, dims: u8 },
}

impl Insn {
    /// The opcode, if this is a real instruction.
    pub fn opcode(&self) -> Option<Opcode> {
        match self {
            Insn::Label(_) => None,
            Insn::Simple(op)
            | Insn::PushInt { op, .. }
            | Insn::Local { op, .. }
            | Insn::Field { op, .. }
            | Insn::Method { op, .. }
            | Insn::Jump { op, .. }
            | Insn::Type { op, .. } => Some(*op),
            Insn::LoadConst(c) => Some(if c.slots() == 2 {
                Opcode::Ldc2W
            } else {
                Opcode::Ldc
            }),
            Insn::Iinc { .. } => Some(Opcode::Iinc),
            Insn::InvokeDynamic(_) => Some(Opcode::Invokedynamic),
            Insn::Tableswitch { .. } => Some(Opcode::Tableswitch),
            Insn::Lookupswitch { .. } => Some(Opcode::Lookupswitch),
            Insn::NewArray(_) => Some(Opcode::Newarray),
            Insn::MultiANewArray { .. } => Some(Opcode::Multianewarray),
        }
    }

    /// Labels this instruction references (not the label it *is*).
    pub fn referenced_labels(&self) -> Vec<LabelId> {
        match self {
            Insn::Jump { target, .. } => vec![*target],
            Insn::Tableswitch { default, targets, .. } => {
                let mut all = vec![*default];
                all.extend_from_slice(targets);
                all
            }
            Insn::Lookupswitch { default, pairs } => {
                let mut all = vec![*default];
                all.extend(pairs.iter().map(|(_, l)| *l));
                all
            }
            _ => Vec::new(),
        }
    }
}

impl fmt::Display for Insn {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Insn::Label(l) => write!(f, "{l}:"),
            Insn::Simple(op) => write!(f, "{op}"),
            Insn::PushInt { op, value } => write!(f, "{op} {value}"),
            Insn::LoadConst(c) => write!(f, "ldc {c}"),
            Insn::Local { op, index } => write!(f, "{op} {index}"),
            Insn::Iinc { index, delta } => write!(f, "iinc {index} {delta:+}"),
            Insn::Field { op, owner, name, descriptor } => {
                write!(f, "{op} {owner}.{name} : {descriptor}")
            }
            Insn::Method { op, owner, name, descriptor, .. } => {
                write!(f, "{op} {owner}.{name}{descriptor}")
            }
            Insn::InvokeDynamic(cs) => {
                write!(f, "invokedynamic {}{} bsm={}", cs.name, cs.descriptor, cs.bootstrap)
            }
            Insn::Jump { op, target } => write!(f, "{op} {target}"),
            Insn::Tableswitch { default, low, high, .. } => {
                write!(f, "tableswitch [{low}..{high}] default={default}")
            }
            Insn::Lookupswitch { default, pairs } => {
                write!(f, "lookupswitch ({} keys) default={default}", pairs.len())
            }
            Insn::Type { op, class_name } => write!(f, "{op} {class_name}"),
            Insn::NewArray(ty) => write!(f, "newarray {ty:?}"),
            Insn::MultiANewArray { descriptor, dims } => {
                write!(f, "multianewarray {descriptor} dims={dims}")
            }
        }
    }
}
