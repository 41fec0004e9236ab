//! Classfile object model: parse JVM class bytes into an editable tree of
//! classes, methods, and label-addressed instructions, then serialize the
//! tree back to valid bytes.
//!
//! The model is symbolic end to end. Instructions name fields, methods, and
//! constants directly instead of holding constant pool indices, and branch
//! targets are labels instead of byte offsets. The reader resolves indices
//! and offsets on the way in; the writer interns and re-lays-out on the way
//! out. Attributes the model does not interpret are carried as raw bytes,
//! which stays sound because the constant pool only ever grows.

pub mod desc;
pub mod insn;
pub mod node;
pub mod opcode;
pub mod pool;
pub mod reader;
pub mod writer;

pub use insn::{ArrayType, CallSite, Const, Handle, HandleKind, Insn, LabelId};
pub use node::{
    access, BootstrapMethod, ClassNode, FieldNode, LineNumber, LocalVar, MethodNode,
    RawAttribute, StackMapFrame, TryCatch, VerificationType,
};
pub use opcode::Opcode;
pub use pool::{ConstPool, PoolEntry};
pub use reader::parse_class;
pub use writer::write_class;
