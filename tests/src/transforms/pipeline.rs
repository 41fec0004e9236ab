use classweave_core::{parse_class, write_class, Insn, Opcode};
use classweave_transform::{ClassResolver, ConcatFolding, Driver, FailurePolicy};

use crate::fixtures::{
    append, build_string, class_with, init_builder, ldc_str, new_builder, static_method,
};

fn concat_class_bytes() -> Vec<u8> {
    let method = static_method(
        "greet",
        "(I)Ljava/lang/String;",
        vec![
            new_builder(),
            Insn::Simple(Opcode::Dup),
            init_builder("()V"),
            ldc_str("n="),
            append("Ljava/lang/String;"),
            Insn::Local { op: Opcode::Iload, index: 0 },
            append("I"),
            build_string(),
            Insn::Simple(Opcode::Areturn),
        ],
    );
    write_class(&class_with(method)).unwrap()
}

struct NothingResolves;

impl ClassResolver for NothingResolves {
    fn resolve(&self, _class_name: &str) -> bool {
        false
    }
}

#[test]
fn driver_folds_concatenation_end_to_end() {
    let _ = tracing_subscriber::fmt()
        .with_max_level(tracing::Level::DEBUG)
        .try_init();
    let bytes = concat_class_bytes();
    let driver = Driver::builder()
        .register(Box::new(ConcatFolding::new()))
        .failure_policy(FailurePolicy::Fatal)
        .build();

    let out = driver
        .transform_class("Sample", "Sample", &bytes)
        .unwrap()
        .expect("concatenation should fold");
    let rewritten = parse_class(&out).unwrap();
    let body = &rewritten.methods[0].instructions;
    assert!(body.iter().any(|i| matches!(i, Insn::InvokeDynamic(_))));
    assert!(!body
        .iter()
        .any(|i| matches!(i, Insn::Type { class_name, .. } if class_name == "java/lang/StringBuilder")));
    assert_eq!(rewritten.bootstrap_methods.len(), 1);

    // Transformed output settles; a second run reports no change.
    let again = driver.transform_class("Sample", "Sample", &out).unwrap();
    assert_eq!(again, None);
}

#[test]
fn unresolvable_support_class_skips_transformer() {
    let bytes = concat_class_bytes();
    let driver = Driver::builder()
        .register(Box::new(ConcatFolding::new()))
        .resolver(std::sync::Arc::new(NothingResolves))
        .build();
    let out = driver.transform_class("Sample", "Sample", &bytes).unwrap();
    assert_eq!(out, None);
}
