//! Folds `StringBuilder` append chains into a single `invokedynamic`
//! against `StringConcatFactory`.
//!
//! The matcher walks a `toString()` call back through its receiver chain:
//! every link must be a supported `append` overload whose result feeds
//! only the next link, terminating in the `new`/`dup`/`<init>` allocation
//! sequence. Constant arguments with a sole consumer fold into the recipe
//! as literals and their producers are removed; everything else stays on
//! the stack as a dynamic argument. Any uncertainty, an unsupported
//! overload, an ambiguous consumer, or a provenance query that declines,
//! leaves the chain untouched.

use tracing::{debug, info};

use classweave_analysis::{Consumers, InsnFlow};
use classweave_core::desc::JType;
use classweave_core::{Const, Insn, MethodNode, Opcode};
use classweave_utils::errors::TransformError;

use crate::batch::ChangeBatch;
use crate::callsite::{jvm_double_to_string, jvm_float_to_string, ConcatRecipe};
use crate::{ClassContext, Transformer};

const STRING_BUILDER: &str = "java/lang/StringBuilder";
const TO_STRING_DESC: &str = "()Ljava/lang/String;";
const INIT_EMPTY: &str = "()V";
const INIT_STRING: &str = "(Ljava/lang/String;)V";

/// Rewrites eligible `StringBuilder` chains into `makeConcatWithConstants`
/// call sites.
#[derive(Debug, Default)]
pub struct ConcatFolding;

impl ConcatFolding {
    pub fn new() -> Self {
        Self
    }
}

impl Transformer for ConcatFolding {
    fn name(&self) -> &'static str {
        "concat_folding"
    }

    fn interested(&self, _name: &str, _transformed_name: &str) -> bool {
        true
    }

    fn required_class(&self) -> Option<&str> {
        Some("java/lang/invoke/StringConcatFactory")
    }

    fn transform_method(
        &self,
        ctx: &ClassContext,
        method: &mut MethodNode,
    ) -> Result<bool, TransformError> {
        let mut changed = false;
        while let Some(batch) = find_chain(method) {
            changed |= batch.commit(method)?;
        }
        if changed {
            info!(
                class = %ctx.name,
                method = %method.name,
                "folded string concatenation"
            );
        }
        Ok(changed)
    }
}

/// Finds one rewritable chain, returning the edits that fold it. Called
/// repeatedly; every successful commit removes a `toString`, so the scan
/// converges.
fn find_chain(method: &MethodNode) -> Option<ChangeBatch> {
    let flow = InsnFlow::new(method);
    for (i, insn) in method.instructions.iter().enumerate() {
        let Insn::Method { op: Opcode::Invokevirtual, owner, name, descriptor, .. } = insn
        else {
            continue;
        };
        if owner == STRING_BUILDER && name == "toString" && descriptor == TO_STRING_DESC {
            if let Some(batch) = match_chain(method, &flow, i) {
                return Some(batch);
            }
            debug!(method = %method.name, index = i, "builder chain not foldable");
        }
    }
    None
}

fn match_chain(method: &MethodNode, flow: &InsnFlow<'_>, to_string: usize) -> Option<ChangeBatch> {
    let insns = &method.instructions;

    // Receiver chain, collected back-to-front.
    let mut appends_rev = Vec::new();
    let mut cursor = to_string;
    let dup_idx = loop {
        let recv = flow.source_of_from_bottom(cursor, 0)?;
        match &insns[recv] {
            Insn::Method { op: Opcode::Invokevirtual, owner, name, descriptor, .. }
                if owner == STRING_BUILDER
                    && name == "append"
                    && append_arg_type(descriptor).is_some() =>
            {
                if flow.consumers_of(recv) != Consumers::Sole(cursor) {
                    return None;
                }
                appends_rev.push(recv);
                cursor = recv;
            }
            Insn::Simple(Opcode::Dup) => break recv,
            _ => return None,
        }
    };

    let new_idx = flow.source_of(dup_idx, 0)?;
    match &insns[new_idx] {
        Insn::Type { op: Opcode::New, class_name } if class_name == STRING_BUILDER => {}
        _ => return None,
    }

    let (init_idx, init_desc) = (dup_idx + 1..insns.len()).find_map(|j| {
        let Insn::Method { op: Opcode::Invokespecial, owner, name, descriptor, .. } = &insns[j]
        else {
            return None;
        };
        (owner == STRING_BUILDER
            && name == "<init>"
            && flow.source_of_from_bottom(j, 0) == Some(dup_idx))
        .then(|| (j, descriptor.clone()))
    })?;

    // Removing operands across a label that carries a stack-map frame
    // would falsify the recorded stack, so such chains are left alone.
    let framed_label = insns[new_idx..=to_string].iter().any(|insn| {
        matches!(insn, Insn::Label(label)
            if method.frames.iter().any(|frame| frame.at == *label))
    });
    if framed_label {
        return None;
    }

    let mut recipe = ConcatRecipe::new();
    let mut batch = ChangeBatch::new();
    batch.remove(new_idx);
    batch.remove(dup_idx);
    batch.remove(init_idx);

    match init_desc.as_str() {
        INIT_EMPTY => {}
        INIT_STRING => {
            let string_type = JType::Object("java/lang/String".to_owned());
            fold_argument(flow, insns, init_idx, &string_type, &mut recipe, &mut batch);
        }
        _ => return None,
    }

    for &append in appends_rev.iter().rev() {
        let Insn::Method { descriptor, .. } = &insns[append] else {
            return None;
        };
        let ty = append_arg_type(descriptor)?;
        fold_argument(flow, insns, append, &ty, &mut recipe, &mut batch);
        batch.remove(append);
    }

    batch.replace(to_string, vec![Insn::InvokeDynamic(recipe.into_call_site())]);
    Some(batch)
}

/// Folds the call's argument into the recipe: a literal when the producer
/// is a constant exclusively feeding this call, a dynamic element
/// otherwise.
fn fold_argument(
    flow: &InsnFlow<'_>,
    insns: &[Insn],
    call: usize,
    ty: &JType,
    recipe: &mut ConcatRecipe,
    batch: &mut ChangeBatch,
) {
    let folded = flow.source_of_from_bottom(call, 1).and_then(|producer| {
        let text = literal_text(&insns[producer], ty)?;
        (flow.consumers_of(producer) == Consumers::Sole(call)).then_some((producer, text))
    });
    match folded {
        Some((producer, text)) => {
            recipe.push_literal(&text);
            batch.remove(producer);
        }
        None => recipe.push_dynamic(ty.clone()),
    }
}

fn append_arg_type(descriptor: &str) -> Option<JType> {
    let ty = match descriptor {
        "(Z)Ljava/lang/StringBuilder;" => JType::Boolean,
        "(C)Ljava/lang/StringBuilder;" => JType::Char,
        "(I)Ljava/lang/StringBuilder;" => JType::Int,
        "(J)Ljava/lang/StringBuilder;" => JType::Long,
        "(F)Ljava/lang/StringBuilder;" => JType::Float,
        "(D)Ljava/lang/StringBuilder;" => JType::Double,
        "(Ljava/lang/String;)Ljava/lang/StringBuilder;" => {
            JType::Object("java/lang/String".to_owned())
        }
        _ => return None,
    };
    Some(ty)
}

/// The argument rendered exactly as the chain would have rendered it at
/// runtime, when the producing instruction is a recognised constant push.
fn literal_text(insn: &Insn, ty: &JType) -> Option<String> {
    match ty {
        JType::Boolean => match const_int(insn)? {
            0 => Some("false".to_owned()),
            1 => Some("true".to_owned()),
            _ => None,
        },
        JType::Char => {
            let code = u32::try_from(const_int(insn)?).ok()?;
            char::from_u32(code).map(|c| c.to_string())
        }
        JType::Int => Some(const_int(insn)?.to_string()),
        JType::Long => match insn {
            Insn::Simple(Opcode::Lconst0) => Some("0".to_owned()),
            Insn::Simple(Opcode::Lconst1) => Some("1".to_owned()),
            Insn::LoadConst(Const::Long(v)) => Some(v.to_string()),
            _ => None,
        },
        JType::Float => match insn {
            Insn::Simple(Opcode::Fconst0) => Some(jvm_float_to_string(0.0)),
            Insn::Simple(Opcode::Fconst1) => Some(jvm_float_to_string(1.0)),
            Insn::Simple(Opcode::Fconst2) => Some(jvm_float_to_string(2.0)),
            Insn::LoadConst(Const::Float(v)) => Some(jvm_float_to_string(*v)),
            _ => None,
        },
        JType::Double => match insn {
            Insn::Simple(Opcode::Dconst0) => Some(jvm_double_to_string(0.0)),
            Insn::Simple(Opcode::Dconst1) => Some(jvm_double_to_string(1.0)),
            Insn::LoadConst(Const::Double(v)) => Some(jvm_double_to_string(*v)),
            _ => None,
        },
        JType::Object(name) if name == "java/lang/String" => match insn {
            Insn::LoadConst(Const::Str(s)) => Some(s.clone()),
            _ => None,
        },
        _ => None,
    }
}

fn const_int(insn: &Insn) -> Option<i32> {
    match insn {
        Insn::Simple(Opcode::IconstM1) => Some(-1),
        Insn::Simple(Opcode::Iconst0) => Some(0),
        Insn::Simple(Opcode::Iconst1) => Some(1),
        Insn::Simple(Opcode::Iconst2) => Some(2),
        Insn::Simple(Opcode::Iconst3) => Some(3),
        Insn::Simple(Opcode::Iconst4) => Some(4),
        Insn::Simple(Opcode::Iconst5) => Some(5),
        Insn::PushInt { value, .. } => Some(*value),
        Insn::LoadConst(Const::Int(v)) => Some(*v),
        _ => None,
    }
}
