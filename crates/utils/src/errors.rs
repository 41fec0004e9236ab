use thiserror::Error;

/// Error type for classfile parsing.
#[derive(Debug, Error)]
pub enum ClassReadError {
    /// The input ended before a complete structure could be read.
    #[error("unexpected end of class file at offset {0}")]
    UnexpectedEof(usize),
    /// The file does not start with the 0xCAFEBABE magic.
    #[error("bad magic: 0x{0:08x}")]
    BadMagic(u32),
    /// Constant pool entry with an unknown tag byte.
    #[error("unknown constant pool tag {tag} at entry {index}")]
    BadConstantTag { tag: u8, index: u16 },
    /// A constant pool index pointed at a missing or wrongly-typed entry.
    #[error("constant pool index {index} is not a {expected}")]
    BadConstantIndex { index: u16, expected: &'static str },
    /// Modified UTF-8 data that could not be decoded.
    #[error("malformed utf8 in constant pool entry {0}")]
    BadUtf8(u16),
    /// An opcode byte the reader does not recognize.
    #[error("unknown opcode 0x{opcode:02x} at code offset {offset}")]
    BadOpcode { opcode: u8, offset: usize },
    /// A branch or table target outside the method's code, or into the
    /// middle of an instruction.
    #[error("branch target {target} at code offset {offset} is not an instruction boundary")]
    BadBranchTarget { offset: usize, target: usize },
    /// An attribute's declared length disagrees with its content.
    #[error("attribute `{0}` has inconsistent length")]
    BadAttributeLength(String),
    /// A malformed field or method descriptor.
    #[error("invalid descriptor `{0}`")]
    BadDescriptor(String),
}

/// Error type for classfile serialization.
#[derive(Debug, Error)]
pub enum ClassWriteError {
    /// The constant pool grew past the u16 index space.
    #[error("constant pool overflow: entry would land at index {0}")]
    ConstantPoolOverflow(usize),
    /// A conditional branch offset does not fit in 16 bits. Unconditional
    /// jumps are widened to goto_w automatically; if/if_icmp forms have no
    /// wide variant.
    #[error("branch offset {offset} out of 16-bit range in method `{method}`")]
    BranchOffsetOverflow { method: String, offset: i64 },
    /// Code attribute longer than the format's u32 size field allows.
    #[error("method `{0}` exceeds the maximum code length")]
    CodeSizeOverflow(String),
    /// An instruction or table referenced a label with no `Insn::Label` in
    /// the method body.
    #[error("label L{label} referenced in method `{method}` was never placed")]
    MissingLabel { method: String, label: u32 },
    /// A value that only fits in a wide instruction form the writer does
    /// not emit (e.g. a local index above u16).
    #[error("operand out of range in method `{method}`: {what}")]
    OperandOverflow { method: String, what: String },
}

/// Error type for structural edit violations inside a change batch.
///
/// These are programming defects in a transformer, not recoverable
/// conditions: the batch refuses to commit and the method is left
/// untouched.
#[derive(Debug, PartialEq, Eq, Error)]
pub enum EditError {
    /// An edit anchor index past the end of the instruction list.
    #[error("edit anchor {index} out of range (method has {len} instructions)")]
    AnchorOutOfRange { index: usize, len: usize },
    /// Two edits claimed the same instruction (e.g. remove + replace).
    #[error("conflicting edits on instruction {0}")]
    ConflictingEdits(usize),
    /// Committing would leave a jump, handler, or table entry pointing at a
    /// label that no longer exists.
    #[error("removing label L{label} would dangle a {referent} in method `{method}`")]
    DanglingLabel {
        method: String,
        label: u32,
        referent: &'static str,
    },
}

/// Error type for transformer execution.
#[derive(Debug, Error)]
pub enum TransformError {
    /// A change batch failed validation.
    #[error("structural edit violation")]
    Edit(#[from] EditError),
    /// Transformer-specific failure with context.
    #[error("{0}")]
    Other(String),
}

/// Error type for the dispatch driver.
#[derive(Debug, Error)]
pub enum DriverError {
    /// The incoming class bytes could not be parsed.
    #[error("failed to read class `{name}`: {source}")]
    Read {
        name: String,
        #[source]
        source: ClassReadError,
    },
    /// The transformed class could not be serialized.
    #[error("failed to write class `{name}`: {source}")]
    Write {
        name: String,
        #[source]
        source: ClassWriteError,
    },
    /// A transformer failed and the failure policy is fatal.
    #[error("transformer `{transformer}` failed on class `{name}`: {source}")]
    Transform {
        name: String,
        transformer: String,
        #[source]
        source: TransformError,
    },
}
