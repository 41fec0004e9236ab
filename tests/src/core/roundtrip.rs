use classweave_core::{
    parse_class, write_class, CallSite, ClassNode, Const, Handle, HandleKind, Insn, Opcode,
    StackMapFrame, VerificationType,
};
use classweave_utils::errors::ClassWriteError;

use crate::fixtures::{class_with, static_method};

/// Serializes, reparses, and serializes again; the two byte images must
/// match. Returns the reparsed class for structural asserts.
fn reparse_stable(class: &ClassNode) -> ClassNode {
    let first = write_class(class).unwrap();
    let parsed = parse_class(&first).unwrap();
    let second = write_class(&parsed).unwrap();
    assert_eq!(first, second, "re-serialization must be byte-stable");
    parsed
}

#[test]
fn minimal_class_round_trips() {
    let class = ClassNode::new("Sample");
    let parsed = reparse_stable(&class);
    assert_eq!(parsed.name, "Sample");
    assert_eq!(parsed.super_name.as_deref(), Some("java/lang/Object"));
    assert_eq!(parsed.major_version, 52);
    assert!(parsed.methods.is_empty());
}

#[test]
fn straight_line_body_round_trips() {
    let instructions = vec![
        Insn::Local { op: Opcode::Iload, index: 0 },
        Insn::Iinc { index: 0, delta: -1 },
        Insn::Simple(Opcode::Pop),
        Insn::PushInt { op: Opcode::Bipush, value: 42 },
        Insn::Field {
            op: Opcode::Getstatic,
            owner: "java/lang/System".to_owned(),
            name: "out".to_owned(),
            descriptor: "Ljava/io/PrintStream;".to_owned(),
        },
        Insn::Method {
            op: Opcode::Invokevirtual,
            owner: "java/io/PrintStream".to_owned(),
            name: "println".to_owned(),
            descriptor: "(I)V".to_owned(),
            interface: false,
        },
        Insn::Simple(Opcode::Return),
    ];
    let class = class_with(static_method("subject", "(I)V", instructions.clone()));
    let parsed = reparse_stable(&class);
    assert_eq!(parsed.methods[0].instructions, instructions);
    assert_eq!(parsed.methods[0].max_stack, 8);
    assert_eq!(parsed.methods[0].max_locals, 8);
}

#[test]
fn wide_constants_round_trip() {
    let instructions = vec![
        Insn::LoadConst(Const::Long(1_234_567_890_123)),
        Insn::Simple(Opcode::Pop2),
        Insn::LoadConst(Const::Double(2.5)),
        Insn::Simple(Opcode::Pop2),
        Insn::LoadConst(Const::Str("hi".to_owned())),
        Insn::Simple(Opcode::Pop),
        Insn::LoadConst(Const::Int(100_000)),
        Insn::Simple(Opcode::Pop),
        Insn::Simple(Opcode::Return),
    ];
    let class = class_with(static_method("subject", "()V", instructions.clone()));
    let parsed = reparse_stable(&class);
    assert_eq!(parsed.methods[0].instructions, instructions);
}

#[test]
fn switches_round_trip() {
    let mut method = static_method("subject", "(I)I", Vec::new());
    let low = method.new_label();
    let high = method.new_label();
    let fallback = method.new_label();
    method.instructions = vec![
        Insn::Local { op: Opcode::Iload, index: 0 },
        Insn::Tableswitch {
            default: fallback,
            low: 0,
            high: 1,
            targets: vec![low, high],
        },
        Insn::Label(low),
        Insn::Local { op: Opcode::Iload, index: 0 },
        Insn::Lookupswitch {
            default: fallback,
            pairs: vec![(5, high), (9, fallback)],
        },
        Insn::Label(high),
        Insn::Simple(Opcode::Iconst1),
        Insn::Simple(Opcode::Ireturn),
        Insn::Label(fallback),
        Insn::Simple(Opcode::IconstM1),
        Insn::Simple(Opcode::Ireturn),
    ];
    let class = class_with(method);
    let parsed = reparse_stable(&class);
    let body = &parsed.methods[0].instructions;
    assert!(body
        .iter()
        .any(|i| matches!(i, Insn::Tableswitch { low: 0, high: 1, .. })));
    assert!(body
        .iter()
        .any(|i| matches!(i, Insn::Lookupswitch { pairs, .. } if pairs.len() == 2)));
}

#[test]
fn long_jump_widens_and_round_trips() {
    let mut method = static_method("subject", "()V", Vec::new());
    let exit = method.new_label();
    let mut instructions = vec![Insn::Jump { op: Opcode::Goto, target: exit }];
    instructions.extend(std::iter::repeat_with(|| Insn::Simple(Opcode::Nop)).take(40_000));
    instructions.push(Insn::Label(exit));
    instructions.push(Insn::Simple(Opcode::Return));
    method.instructions = instructions;

    let parsed = reparse_stable(&class_with(method));
    let body = &parsed.methods[0].instructions;
    assert_eq!(body.len(), 40_003);
    assert!(matches!(body[0], Insn::Jump { op: Opcode::Goto, .. }));
}

#[test]
fn oversized_body_is_rejected() {
    let mut instructions = Vec::new();
    instructions.extend(std::iter::repeat_with(|| Insn::Simple(Opcode::Nop)).take(70_000));
    instructions.push(Insn::Simple(Opcode::Return));
    let class = class_with(static_method("subject", "()V", instructions));
    assert!(matches!(
        write_class(&class),
        Err(ClassWriteError::CodeSizeOverflow(_))
    ));
}

#[test]
fn invokedynamic_round_trips() {
    let site = CallSite {
        name: "makeConcatWithConstants".to_owned(),
        descriptor: "(I)Ljava/lang/String;".to_owned(),
        bootstrap: Handle {
            kind: HandleKind::InvokeStatic,
            owner: "java/lang/invoke/StringConcatFactory".to_owned(),
            name: "makeConcatWithConstants".to_owned(),
            descriptor: "(Ljava/lang/invoke/MethodHandles$Lookup;Ljava/lang/String;\
Ljava/lang/invoke/MethodType;Ljava/lang/String;[Ljava/lang/Object;)\
Ljava/lang/invoke/CallSite;"
                .to_owned(),
            interface: false,
        },
        args: vec![Const::Str("n=\u{1}".to_owned())],
    };
    let instructions = vec![
        Insn::Simple(Opcode::Iconst3),
        Insn::InvokeDynamic(site),
        Insn::Simple(Opcode::Areturn),
    ];
    let class = class_with(static_method("subject", "()Ljava/lang/String;", instructions.clone()));
    let parsed = reparse_stable(&class);
    assert_eq!(parsed.methods[0].instructions, instructions);
    assert_eq!(parsed.bootstrap_methods.len(), 1);
}

#[test]
fn handlers_and_frames_round_trip() {
    let mut method = static_method("subject", "(I)V", Vec::new());
    let join = method.new_label();
    method.instructions = vec![
        Insn::Local { op: Opcode::Iload, index: 0 },
        Insn::Jump { op: Opcode::Ifeq, target: join },
        Insn::Simple(Opcode::Nop),
        Insn::Label(join),
        Insn::Simple(Opcode::Return),
    ];
    method.frames.push(StackMapFrame {
        at: join,
        locals: vec![VerificationType::Integer],
        stack: Vec::new(),
    });
    let parsed = reparse_stable(&class_with(method));
    let frames = &parsed.methods[0].frames;
    assert_eq!(frames.len(), 1);
    assert_eq!(frames[0].locals, vec![VerificationType::Integer]);
    assert!(frames[0].stack.is_empty());
}

#[test]
fn exception_table_round_trips() {
    let mut method = static_method("subject", "()V", Vec::new());
    let start = method.new_label();
    let end = method.new_label();
    let handler = method.new_label();
    method.instructions = vec![
        Insn::Label(start),
        Insn::Simple(Opcode::Nop),
        Insn::Label(end),
        Insn::Simple(Opcode::Return),
        Insn::Label(handler),
        Insn::Simple(Opcode::Athrow),
    ];
    method.frames.push(StackMapFrame {
        at: handler,
        locals: Vec::new(),
        stack: vec![VerificationType::Object("java/lang/Exception".to_owned())],
    });
    method.try_catches.push(classweave_core::TryCatch {
        start,
        end,
        handler,
        catch_type: Some("java/lang/Exception".to_owned()),
    });
    let parsed = reparse_stable(&class_with(method));
    let tc = &parsed.methods[0].try_catches;
    assert_eq!(tc.len(), 1);
    assert_eq!(tc[0].catch_type.as_deref(), Some("java/lang/Exception"));
}
