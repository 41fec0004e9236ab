use std::fs;

use classweave_cli::commands::transform::TransformArgs;
use classweave_cli::commands::Command;
use classweave_core::{access, parse_class, write_class, ClassNode, Insn, MethodNode, Opcode};

const STRING_BUILDER: &str = "java/lang/StringBuilder";

fn concat_class() -> Vec<u8> {
    let mut method = MethodNode::new(
        access::ACC_PUBLIC | access::ACC_STATIC,
        "greet",
        "(I)Ljava/lang/String;",
    );
    method.max_stack = 4;
    method.max_locals = 1;
    method.instructions = vec![
        Insn::Type {
            op: Opcode::New,
            class_name: STRING_BUILDER.to_owned(),
        },
        Insn::Simple(Opcode::Dup),
        Insn::Method {
            op: Opcode::Invokespecial,
            owner: STRING_BUILDER.to_owned(),
            name: "<init>".to_owned(),
            descriptor: "()V".to_owned(),
            interface: false,
        },
        Insn::LoadConst(classweave_core::Const::Str("n=".to_owned())),
        Insn::Method {
            op: Opcode::Invokevirtual,
            owner: STRING_BUILDER.to_owned(),
            name: "append".to_owned(),
            descriptor: "(Ljava/lang/String;)Ljava/lang/StringBuilder;".to_owned(),
            interface: false,
        },
        Insn::Local { op: Opcode::Iload, index: 0 },
        Insn::Method {
            op: Opcode::Invokevirtual,
            owner: STRING_BUILDER.to_owned(),
            name: "append".to_owned(),
            descriptor: "(I)Ljava/lang/StringBuilder;".to_owned(),
            interface: false,
        },
        Insn::Method {
            op: Opcode::Invokevirtual,
            owner: STRING_BUILDER.to_owned(),
            name: "toString".to_owned(),
            descriptor: "()Ljava/lang/String;".to_owned(),
            interface: false,
        },
        Insn::Simple(Opcode::Areturn),
    ];
    let mut class = ClassNode::new("Sample");
    class.methods.push(method);
    write_class(&class).unwrap()
}

#[test]
fn transform_command_rewrites_class_files() {
    let dir = tempfile::tempdir().unwrap();
    let input = dir.path().join("Sample.class");
    fs::write(&input, concat_class()).unwrap();
    let config = dir.path().join("pipeline.json");
    fs::write(&config, r#"{ "modules": {} }"#).unwrap();
    let out = dir.path().join("out");

    let args = TransformArgs {
        inputs: vec![input],
        config,
        out: Some(out.clone()),
        isolate: false,
    };
    args.execute().unwrap();

    let rewritten = parse_class(&fs::read(out.join("Sample.class")).unwrap()).unwrap();
    let body = &rewritten.methods[0].instructions;
    assert!(body.iter().any(|i| matches!(i, Insn::InvokeDynamic(_))));
    assert!(!body
        .iter()
        .any(|i| matches!(i, Insn::Type { class_name, .. } if class_name == STRING_BUILDER)));
}

#[test]
fn disabled_module_leaves_bytes_untouched() {
    let dir = tempfile::tempdir().unwrap();
    let bytes = concat_class();
    let input = dir.path().join("Sample.class");
    fs::write(&input, &bytes).unwrap();
    let config = dir.path().join("pipeline.json");
    fs::write(&config, r#"{ "modules": { "concat_folding": false } }"#).unwrap();
    let out = dir.path().join("out");

    let args = TransformArgs {
        inputs: vec![input],
        config,
        out: Some(out.clone()),
        isolate: false,
    };
    args.execute().unwrap();

    assert_eq!(fs::read(out.join("Sample.class")).unwrap(), bytes);
}
