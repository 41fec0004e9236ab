use classweave_core::{Const, Insn, Opcode, StackMapFrame};
use classweave_transform::{ConcatFolding, Transformer};

use crate::fixtures::{
    append, build_string, class_with, ctx, init_builder, ldc_str, new_builder, static_method,
};

#[test]
fn all_constant_chain_folds_to_a_literal() {
    let mut method = static_method(
        "subject",
        "()Ljava/lang/String;",
        vec![
            new_builder(),
            Insn::Simple(Opcode::Dup),
            init_builder("()V"),
            ldc_str("x"),
            append("Ljava/lang/String;"),
            Insn::PushInt { op: Opcode::Bipush, value: 42 },
            append("I"),
            Insn::Simple(Opcode::Iconst1),
            append("Z"),
            build_string(),
            Insn::Simple(Opcode::Areturn),
        ],
    );

    let changed = ConcatFolding::new()
        .transform_method(&ctx(), &mut method)
        .unwrap();
    assert!(changed);
    assert_eq!(method.instructions.len(), 2);
    let Insn::InvokeDynamic(site) = &method.instructions[0] else {
        panic!("expected invokedynamic, got {:?}", method.instructions[0]);
    };
    assert_eq!(site.descriptor, "()Ljava/lang/String;");
    assert_eq!(site.args, vec![Const::Str("x42true".to_owned())]);
    assert!(matches!(method.instructions[1], Insn::Simple(Opcode::Areturn)));
}

#[test]
fn loaded_arguments_stay_dynamic() {
    let mut method = static_method(
        "subject",
        "(IZ)Ljava/lang/String;",
        vec![
            new_builder(),
            Insn::Simple(Opcode::Dup),
            init_builder("()V"),
            ldc_str("x"),
            append("Ljava/lang/String;"),
            Insn::Local { op: Opcode::Iload, index: 0 },
            append("I"),
            Insn::Local { op: Opcode::Iload, index: 1 },
            append("Z"),
            build_string(),
            Insn::Simple(Opcode::Areturn),
        ],
    );

    assert!(ConcatFolding::new()
        .transform_method(&ctx(), &mut method)
        .unwrap());
    assert_eq!(
        method.instructions[..2],
        [
            Insn::Local { op: Opcode::Iload, index: 0 },
            Insn::Local { op: Opcode::Iload, index: 1 },
        ]
    );
    let Insn::InvokeDynamic(site) = &method.instructions[2] else {
        panic!("expected invokedynamic");
    };
    assert_eq!(site.descriptor, "(IZ)Ljava/lang/String;");
    assert_eq!(site.args, vec![Const::Str("x\u{1}\u{1}".to_owned())]);
}

#[test]
fn string_seeded_constructor_folds() {
    let mut method = static_method(
        "subject",
        "(I)Ljava/lang/String;",
        vec![
            new_builder(),
            Insn::Simple(Opcode::Dup),
            ldc_str("n="),
            init_builder("(Ljava/lang/String;)V"),
            Insn::Local { op: Opcode::Iload, index: 0 },
            append("I"),
            build_string(),
            Insn::Simple(Opcode::Areturn),
        ],
    );

    assert!(ConcatFolding::new()
        .transform_method(&ctx(), &mut method)
        .unwrap());
    let Insn::InvokeDynamic(site) = &method.instructions[1] else {
        panic!("expected invokedynamic");
    };
    assert_eq!(site.args, vec![Const::Str("n=\u{1}".to_owned())]);
}

#[test]
fn second_run_finds_nothing() {
    let mut method = static_method(
        "subject",
        "()Ljava/lang/String;",
        vec![
            new_builder(),
            Insn::Simple(Opcode::Dup),
            init_builder("()V"),
            ldc_str("x"),
            append("Ljava/lang/String;"),
            build_string(),
            Insn::Simple(Opcode::Areturn),
        ],
    );
    let folding = ConcatFolding::new();
    assert!(folding.transform_method(&ctx(), &mut method).unwrap());
    let settled = method.instructions.clone();
    assert!(!folding.transform_method(&ctx(), &mut method).unwrap());
    assert_eq!(method.instructions, settled);
}

#[test]
fn duplicated_builder_is_left_alone() {
    let original = vec![
        new_builder(),
        Insn::Simple(Opcode::Dup),
        init_builder("()V"),
        Insn::Simple(Opcode::Dup),
        ldc_str("x"),
        append("Ljava/lang/String;"),
        build_string(),
        Insn::Simple(Opcode::Pop),
        Insn::Simple(Opcode::Areturn),
    ];
    let mut method = static_method("subject", "()Ljava/lang/String;", original.clone());
    assert!(!ConcatFolding::new()
        .transform_method(&ctx(), &mut method)
        .unwrap());
    assert_eq!(method.instructions, original);
}

#[test]
fn builder_from_local_is_left_alone() {
    let original = vec![
        Insn::Local { op: Opcode::Aload, index: 0 },
        ldc_str("x"),
        append("Ljava/lang/String;"),
        build_string(),
        Insn::Simple(Opcode::Areturn),
    ];
    let mut method = static_method(
        "subject",
        "(Ljava/lang/StringBuilder;)Ljava/lang/String;",
        original.clone(),
    );
    assert!(!ConcatFolding::new()
        .transform_method(&ctx(), &mut method)
        .unwrap());
    assert_eq!(method.instructions, original);
}

#[test]
fn chain_spanning_a_framed_label_is_left_alone() {
    let mut method = static_method("subject", "()Ljava/lang/String;", Vec::new());
    let mid = method.new_label();
    method.instructions = vec![
        new_builder(),
        Insn::Simple(Opcode::Dup),
        init_builder("()V"),
        Insn::Label(mid),
        ldc_str("x"),
        append("Ljava/lang/String;"),
        build_string(),
        Insn::Simple(Opcode::Areturn),
    ];
    method.frames.push(StackMapFrame {
        at: mid,
        locals: Vec::new(),
        stack: vec![classweave_core::VerificationType::Object(
            "java/lang/StringBuilder".to_owned(),
        )],
    });
    let original = method.instructions.clone();
    assert!(!ConcatFolding::new()
        .transform_method(&ctx(), &mut method)
        .unwrap());
    assert_eq!(method.instructions, original);
}
