//! Folds allow-listed static field reads (optionally with one chained
//! zero-argument virtual call) into constant-bootstrap `invokedynamic`
//! call sites.
//!
//! The rewritten site carries the original accessor chain as
//! `MethodHandle` static arguments; the bootstrap invokes them once at
//! first linkage and installs the result as a constant, so repeated
//! executions skip the field read entirely. Targets come from
//! configuration, deserialized with `serde`.

use serde::Deserialize;
use tracing::info;

use classweave_analysis::{Consumers, InsnFlow};
use classweave_core::{Handle, HandleKind, Insn, MethodNode, Opcode};
use classweave_utils::errors::TransformError;

use crate::batch::ChangeBatch;
use crate::callsite::{fold_static_constant, BootstrapSpec};
use crate::{ClassContext, Transformer};

/// A zero-argument virtual call chained onto the field read.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct ChainedCall {
    pub name: String,
    pub descriptor: String,
}

/// One allow-listed `getstatic` to fold.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
pub struct FoldTarget {
    pub owner: String,
    pub name: String,
    pub descriptor: String,
    #[serde(default)]
    pub chained: Option<ChainedCall>,
}

/// Rewrites matching field accesses into constant call sites linked by a
/// configured support-class bootstrap.
#[derive(Debug)]
pub struct FieldConstantFolding {
    targets: Vec<FoldTarget>,
    bootstrap: BootstrapSpec,
}

impl FieldConstantFolding {
    pub fn new(targets: Vec<FoldTarget>, bootstrap: BootstrapSpec) -> Self {
        Self { targets, bootstrap }
    }
}

impl Transformer for FieldConstantFolding {
    fn name(&self) -> &'static str {
        "field_constant_folding"
    }

    fn interested(&self, _name: &str, _transformed_name: &str) -> bool {
        !self.targets.is_empty()
    }

    fn required_class(&self) -> Option<&str> {
        Some(&self.bootstrap.owner)
    }

    fn transform_method(
        &self,
        ctx: &ClassContext,
        method: &mut MethodNode,
    ) -> Result<bool, TransformError> {
        let mut changed = false;
        while let Some(batch) = find_fold(method, &self.targets, &self.bootstrap) {
            changed |= batch.commit(method)?;
        }
        if changed {
            info!(
                class = %ctx.name,
                method = %method.name,
                "folded constant field access"
            );
        }
        Ok(changed)
    }
}

fn find_fold(
    method: &MethodNode,
    targets: &[FoldTarget],
    bootstrap: &BootstrapSpec,
) -> Option<ChangeBatch> {
    let flow = InsnFlow::new(method);
    for (i, insn) in method.instructions.iter().enumerate() {
        let Insn::Field { op: Opcode::Getstatic, owner, name, descriptor } = insn else {
            continue;
        };
        let Some(target) = targets
            .iter()
            .find(|t| t.owner == *owner && t.name == *name && t.descriptor == *descriptor)
        else {
            continue;
        };
        if let Some(batch) = match_target(method, &flow, i, target, bootstrap) {
            return Some(batch);
        }
    }
    None
}

fn match_target(
    method: &MethodNode,
    flow: &InsnFlow<'_>,
    field_at: usize,
    target: &FoldTarget,
    bootstrap: &BootstrapSpec,
) -> Option<ChangeBatch> {
    let field_handle = Handle {
        kind: HandleKind::GetStatic,
        owner: target.owner.clone(),
        name: target.name.clone(),
        descriptor: target.descriptor.clone(),
        interface: false,
    };
    let mut batch = ChangeBatch::new();

    match &target.chained {
        None => {
            let site =
                fold_static_constant(&target.name, &target.descriptor, &[field_handle], bootstrap);
            batch.replace(field_at, vec![Insn::InvokeDynamic(site)]);
        }
        Some(chained) => {
            let result_descriptor = chained.descriptor.strip_prefix("()")?;
            let Consumers::Sole(call_at) = flow.consumers_of(field_at) else {
                return None;
            };
            let Insn::Method {
                op: Opcode::Invokevirtual,
                owner: call_owner,
                name: call_name,
                descriptor: call_descriptor,
                ..
            } = &method.instructions[call_at]
            else {
                return None;
            };
            if *call_name != chained.name || *call_descriptor != chained.descriptor {
                return None;
            }
            if flow.source_of_from_bottom(call_at, 0) != Some(field_at) {
                return None;
            }
            // Removing the field's value across a label that carries a
            // stack-map frame would falsify the recorded stack, so such
            // shapes are left alone.
            let (lo, hi) = (field_at.min(call_at), field_at.max(call_at));
            let framed_label = method.instructions[lo..=hi].iter().any(|insn| {
                matches!(insn, Insn::Label(label)
                    if method.frames.iter().any(|frame| frame.at == *label))
            });
            if framed_label {
                return None;
            }
            let call_handle = Handle {
                kind: HandleKind::InvokeVirtual,
                owner: call_owner.clone(),
                name: chained.name.clone(),
                descriptor: chained.descriptor.clone(),
                interface: false,
            };
            let site = fold_static_constant(
                &target.name,
                result_descriptor,
                &[field_handle, call_handle],
                bootstrap,
            );
            batch.remove(field_at);
            batch.replace(call_at, vec![Insn::InvokeDynamic(site)]);
        }
    }
    Some(batch)
}
