//! Shared builders for test classes and `StringBuilder` chains.

use classweave_core::{access, ClassNode, Const, Insn, MethodNode, Opcode};
use classweave_transform::ClassContext;

pub const STRING_BUILDER: &str = "java/lang/StringBuilder";

pub fn ctx() -> ClassContext {
    ClassContext {
        name: "Sample".to_owned(),
        transformed_name: "Sample".to_owned(),
    }
}

pub fn static_method(name: &str, descriptor: &str, instructions: Vec<Insn>) -> MethodNode {
    let mut method = MethodNode::new(access::ACC_PUBLIC | access::ACC_STATIC, name, descriptor);
    method.max_stack = 8;
    method.max_locals = 8;
    method.instructions = instructions;
    method
}

pub fn class_with(method: MethodNode) -> ClassNode {
    let mut class = ClassNode::new("Sample");
    class.methods.push(method);
    class
}

pub fn new_builder() -> Insn {
    Insn::Type {
        op: Opcode::New,
        class_name: STRING_BUILDER.to_owned(),
    }
}

pub fn init_builder(descriptor: &str) -> Insn {
    Insn::Method {
        op: Opcode::Invokespecial,
        owner: STRING_BUILDER.to_owned(),
        name: "<init>".to_owned(),
        descriptor: descriptor.to_owned(),
        interface: false,
    }
}

/// `StringBuilder.append` taking one argument of field type `arg`.
pub fn append(arg: &str) -> Insn {
    Insn::Method {
        op: Opcode::Invokevirtual,
        owner: STRING_BUILDER.to_owned(),
        name: "append".to_owned(),
        descriptor: format!("({arg})Ljava/lang/StringBuilder;"),
        interface: false,
    }
}

pub fn build_string() -> Insn {
    Insn::Method {
        op: Opcode::Invokevirtual,
        owner: STRING_BUILDER.to_owned(),
        name: "toString".to_owned(),
        descriptor: "()Ljava/lang/String;".to_owned(),
        interface: false,
    }
}

pub fn ldc_str(value: &str) -> Insn {
    Insn::LoadConst(Const::Str(value.to_owned()))
}
