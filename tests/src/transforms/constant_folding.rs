use classweave_core::{Const, HandleKind, Insn, Opcode, StackMapFrame, VerificationType};
use classweave_transform::{
    BootstrapSpec, ChainedCall, FieldConstantFolding, FoldTarget, Transformer,
};

use crate::fixtures::{ctx, static_method};

fn bootstrap() -> BootstrapSpec {
    BootstrapSpec {
        owner: "com/example/ConstantSupport".to_owned(),
        name: "constantFold".to_owned(),
        descriptor: "(Ljava/lang/invoke/MethodHandles$Lookup;Ljava/lang/String;\
Ljava/lang/invoke/MethodType;[Ljava/lang/invoke/MethodHandle;)Ljava/lang/invoke/CallSite;"
            .to_owned(),
    }
}

fn getstatic(owner: &str, name: &str, descriptor: &str) -> Insn {
    Insn::Field {
        op: Opcode::Getstatic,
        owner: owner.to_owned(),
        name: name.to_owned(),
        descriptor: descriptor.to_owned(),
    }
}

fn default_state_target() -> FoldTarget {
    FoldTarget {
        owner: "net/minecraft/block/Blocks".to_owned(),
        name: "REDSTONE_ORE".to_owned(),
        descriptor: "Lnet/minecraft/block/Block;".to_owned(),
        chained: Some(ChainedCall {
            name: "getDefaultState".to_owned(),
            descriptor: "()Lnet/minecraft/block/BlockState;".to_owned(),
        }),
    }
}

#[test]
fn chained_field_access_folds() {
    let mut method = static_method(
        "subject",
        "()Lnet/minecraft/block/BlockState;",
        vec![
            getstatic(
                "net/minecraft/block/Blocks",
                "REDSTONE_ORE",
                "Lnet/minecraft/block/Block;",
            ),
            Insn::Method {
                op: Opcode::Invokevirtual,
                owner: "net/minecraft/block/Block".to_owned(),
                name: "getDefaultState".to_owned(),
                descriptor: "()Lnet/minecraft/block/BlockState;".to_owned(),
                interface: false,
            },
            Insn::Simple(Opcode::Areturn),
        ],
    );

    let folding = FieldConstantFolding::new(vec![default_state_target()], bootstrap());
    assert!(folding.transform_method(&ctx(), &mut method).unwrap());

    assert_eq!(method.instructions.len(), 2);
    let Insn::InvokeDynamic(site) = &method.instructions[0] else {
        panic!("expected invokedynamic, got {:?}", method.instructions[0]);
    };
    assert_eq!(site.name, "REDSTONE_ORE");
    assert_eq!(site.descriptor, "()Lnet/minecraft/block/BlockState;");
    assert_eq!(site.bootstrap, bootstrap().handle());
    assert_eq!(site.args.len(), 2);
    let Const::MethodHandle(field) = &site.args[0] else {
        panic!("expected field accessor handle");
    };
    assert_eq!(field.kind, HandleKind::GetStatic);
    assert_eq!(field.owner, "net/minecraft/block/Blocks");
    let Const::MethodHandle(call) = &site.args[1] else {
        panic!("expected call accessor handle");
    };
    assert_eq!(call.kind, HandleKind::InvokeVirtual);
    assert_eq!(call.owner, "net/minecraft/block/Block");

    // Already folded, nothing left to match.
    assert!(!folding.transform_method(&ctx(), &mut method).unwrap());
}

#[test]
fn plain_field_access_folds_in_place() {
    let mut method = static_method(
        "subject",
        "()Ljava/lang/Object;",
        vec![
            getstatic("com/example/Config", "INSTANCE", "Ljava/lang/Object;"),
            Insn::Simple(Opcode::Areturn),
        ],
    );
    let target = FoldTarget {
        owner: "com/example/Config".to_owned(),
        name: "INSTANCE".to_owned(),
        descriptor: "Ljava/lang/Object;".to_owned(),
        chained: None,
    };
    let folding = FieldConstantFolding::new(vec![target], bootstrap());
    assert!(folding.transform_method(&ctx(), &mut method).unwrap());

    let Insn::InvokeDynamic(site) = &method.instructions[0] else {
        panic!("expected invokedynamic");
    };
    assert_eq!(site.name, "INSTANCE");
    assert_eq!(site.descriptor, "()Ljava/lang/Object;");
    assert_eq!(site.args.len(), 1);
}

#[test]
fn ambiguous_field_consumer_is_left_alone() {
    let original = vec![
        getstatic(
            "net/minecraft/block/Blocks",
            "REDSTONE_ORE",
            "Lnet/minecraft/block/Block;",
        ),
        Insn::Simple(Opcode::Dup),
        Insn::Method {
            op: Opcode::Invokevirtual,
            owner: "net/minecraft/block/Block".to_owned(),
            name: "getDefaultState".to_owned(),
            descriptor: "()Lnet/minecraft/block/BlockState;".to_owned(),
            interface: false,
        },
        Insn::Simple(Opcode::Pop),
        Insn::Simple(Opcode::Areturn),
    ];
    let mut method = static_method("subject", "()Ljava/lang/Object;", original.clone());
    let folding = FieldConstantFolding::new(vec![default_state_target()], bootstrap());
    assert!(!folding.transform_method(&ctx(), &mut method).unwrap());
    assert_eq!(method.instructions, original);
}

#[test]
fn field_feeding_another_call_is_left_alone() {
    let original = vec![
        getstatic(
            "net/minecraft/block/Blocks",
            "REDSTONE_ORE",
            "Lnet/minecraft/block/Block;",
        ),
        Insn::Method {
            op: Opcode::Invokevirtual,
            owner: "net/minecraft/block/Block".to_owned(),
            name: "hashCode".to_owned(),
            descriptor: "()I".to_owned(),
            interface: false,
        },
        Insn::Simple(Opcode::Ireturn),
    ];
    let mut method = static_method("subject", "()I", original.clone());
    let folding = FieldConstantFolding::new(vec![default_state_target()], bootstrap());
    assert!(!folding.transform_method(&ctx(), &mut method).unwrap());
    assert_eq!(method.instructions, original);
}

#[test]
fn fold_across_a_framed_label_is_left_alone() {
    let mut method = static_method("subject", "()Lnet/minecraft/block/BlockState;", Vec::new());
    let join = method.new_label();
    method.instructions = vec![
        getstatic(
            "net/minecraft/block/Blocks",
            "REDSTONE_ORE",
            "Lnet/minecraft/block/Block;",
        ),
        Insn::Jump { op: Opcode::Goto, target: join },
        Insn::Label(join),
        Insn::Method {
            op: Opcode::Invokevirtual,
            owner: "net/minecraft/block/Block".to_owned(),
            name: "getDefaultState".to_owned(),
            descriptor: "()Lnet/minecraft/block/BlockState;".to_owned(),
            interface: false,
        },
        Insn::Simple(Opcode::Areturn),
    ];
    // The frame at the join records the field's value on the stack, so
    // removing the read would leave the frame describing a vanished value.
    method.frames.push(StackMapFrame {
        at: join,
        locals: Vec::new(),
        stack: vec![VerificationType::Object(
            "net/minecraft/block/Block".to_owned(),
        )],
    });
    let original = method.instructions.clone();
    let folding = FieldConstantFolding::new(vec![default_state_target()], bootstrap());
    assert!(!folding.transform_method(&ctx(), &mut method).unwrap());
    assert_eq!(method.instructions, original);
}

#[test]
fn unlisted_field_is_left_alone() {
    let original = vec![
        getstatic("com/example/Other", "FIELD", "I"),
        Insn::Simple(Opcode::Ireturn),
    ];
    let mut method = static_method("subject", "()I", original.clone());
    let folding = FieldConstantFolding::new(vec![default_state_target()], bootstrap());
    assert!(!folding.transform_method(&ctx(), &mut method).unwrap());
    assert_eq!(method.instructions, original);
}

#[test]
fn targets_deserialize_from_config() {
    let json = r#"[
        {
            "owner": "net/minecraft/block/Blocks",
            "name": "REDSTONE_ORE",
            "descriptor": "Lnet/minecraft/block/Block;",
            "chained": { "name": "getDefaultState",
                         "descriptor": "()Lnet/minecraft/block/BlockState;" }
        },
        { "owner": "com/example/Config", "name": "INSTANCE",
          "descriptor": "Ljava/lang/Object;" }
    ]"#;
    let targets: Vec<FoldTarget> = serde_json::from_str(json).unwrap();
    assert_eq!(targets[0], default_state_target());
    assert_eq!(targets[1].chained, None);
}
