//! Transactional edits against one method's instruction list.
//!
//! A [`ChangeBatch`] records removals, replacements, and insertions keyed
//! by instruction index, then applies them all at once. Validation runs
//! against the candidate result before the method is touched: anchors must
//! be in range, no two edits may claim the same instruction, and every
//! label still referenced by a jump, switch, handler range, line-number
//! entry, local-variable range, or stack-map frame must survive. A batch
//! that fails validation leaves the method exactly as it was. Dropping an
//! uncommitted batch discards it.

use std::collections::{BTreeMap, HashSet};

use tracing::trace;

use classweave_core::{Insn, LabelId, MethodNode};
use classweave_utils::errors::EditError;

#[derive(Debug, Clone)]
enum Edit {
    Remove,
    Replace(Vec<Insn>),
}

/// A pending set of structural edits. Indices always refer to the method
/// as it was when the batch was opened.
#[derive(Debug, Default)]
pub struct ChangeBatch {
    edits: Vec<(usize, Edit)>,
    before: BTreeMap<usize, Vec<Insn>>,
    after: BTreeMap<usize, Vec<Insn>>,
}

impl ChangeBatch {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn is_empty(&self) -> bool {
        self.edits.is_empty() && self.before.is_empty() && self.after.is_empty()
    }

    /// Deletes the instruction at `index`.
    pub fn remove(&mut self, index: usize) -> &mut Self {
        self.edits.push((index, Edit::Remove));
        self
    }

    /// Replaces the instruction at `index` with `insns`.
    pub fn replace(&mut self, index: usize, insns: Vec<Insn>) -> &mut Self {
        self.edits.push((index, Edit::Replace(insns)));
        self
    }

    /// Inserts `insns` immediately before `index`. Repeated insertions at
    /// one anchor accumulate in call order.
    pub fn insert_before(&mut self, index: usize, insns: Vec<Insn>) -> &mut Self {
        self.before.entry(index).or_default().extend(insns);
        self
    }

    /// Inserts `insns` immediately after `index`.
    pub fn insert_after(&mut self, index: usize, insns: Vec<Insn>) -> &mut Self {
        self.after.entry(index).or_default().extend(insns);
        self
    }

    /// Validates and applies every recorded edit, returning whether the
    /// instruction list actually changed. On error nothing is modified.
    pub fn commit(self, method: &mut MethodNode) -> Result<bool, EditError> {
        let len = method.instructions.len();

        let mut replacements: BTreeMap<usize, Edit> = BTreeMap::new();
        for (index, edit) in self.edits {
            if index >= len {
                return Err(EditError::AnchorOutOfRange { index, len });
            }
            if replacements.insert(index, edit).is_some() {
                return Err(EditError::ConflictingEdits(index));
            }
        }
        for &index in self.before.keys().chain(self.after.keys()) {
            if index >= len {
                return Err(EditError::AnchorOutOfRange { index, len });
            }
        }

        let mut candidate = Vec::with_capacity(len);
        for (i, insn) in method.instructions.iter().enumerate() {
            if let Some(insns) = self.before.get(&i) {
                candidate.extend(insns.iter().cloned());
            }
            match replacements.get(&i) {
                Some(Edit::Remove) => {}
                Some(Edit::Replace(insns)) => candidate.extend(insns.iter().cloned()),
                None => candidate.push(insn.clone()),
            }
            if let Some(insns) = self.after.get(&i) {
                candidate.extend(insns.iter().cloned());
            }
        }

        validate_labels(method, &candidate)?;

        if candidate == method.instructions {
            return Ok(false);
        }
        trace!(
            method = %method.name,
            from = len,
            to = candidate.len(),
            "committed change batch"
        );
        method.instructions = candidate;
        // Unknown code attributes carry raw byte offsets that are now
        // stale; the interpreted tables are label-based and survive.
        method.code_attrs.clear();
        Ok(true)
    }
}

/// Every label referent in the candidate and in the method's tables must
/// point at a surviving `Insn::Label`.
fn validate_labels(method: &MethodNode, candidate: &[Insn]) -> Result<(), EditError> {
    let surviving: HashSet<LabelId> = candidate
        .iter()
        .filter_map(|insn| match insn {
            Insn::Label(label) => Some(*label),
            _ => None,
        })
        .collect();

    let check = |label: LabelId, referent: &'static str| -> Result<(), EditError> {
        if surviving.contains(&label) {
            Ok(())
        } else {
            Err(EditError::DanglingLabel {
                method: method.name.clone(),
                label: label.0,
                referent,
            })
        }
    };

    for insn in candidate {
        for label in insn.referenced_labels() {
            check(label, "branch")?;
        }
    }
    for tc in &method.try_catches {
        check(tc.start, "exception handler range")?;
        check(tc.end, "exception handler range")?;
        check(tc.handler, "exception handler")?;
    }
    for ln in &method.line_numbers {
        check(ln.start, "line number entry")?;
    }
    for lv in &method.local_vars {
        check(lv.start, "local variable range")?;
        check(lv.end, "local variable range")?;
    }
    for frame in &method.frames {
        check(frame.at, "stack map frame")?;
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use classweave_core::{access, Opcode};

    fn method(instructions: Vec<Insn>) -> MethodNode {
        let mut m = MethodNode::new(access::ACC_STATIC, "subject", "()V");
        m.instructions = instructions;
        m
    }

    #[test]
    fn ordered_application() {
        let mut m = method(vec![
            Insn::Simple(Opcode::Iconst1),
            Insn::Simple(Opcode::Pop),
            Insn::Simple(Opcode::Return),
        ]);
        let mut batch = ChangeBatch::new();
        batch.remove(0);
        batch.replace(1, vec![Insn::Simple(Opcode::Nop)]);
        batch.insert_before(2, vec![Insn::Simple(Opcode::Nop)]);
        assert_eq!(batch.commit(&mut m), Ok(true));
        assert_eq!(
            m.instructions,
            vec![
                Insn::Simple(Opcode::Nop),
                Insn::Simple(Opcode::Nop),
                Insn::Simple(Opcode::Return),
            ]
        );
    }

    #[test]
    fn conflicting_edits_rejected_atomically() {
        let original = vec![Insn::Simple(Opcode::Iconst1), Insn::Simple(Opcode::Return)];
        let mut m = method(original.clone());
        let mut batch = ChangeBatch::new();
        batch.remove(0);
        batch.replace(0, vec![Insn::Simple(Opcode::Nop)]);
        assert!(matches!(
            batch.commit(&mut m),
            Err(EditError::ConflictingEdits(0))
        ));
        assert_eq!(m.instructions, original);
    }

    #[test]
    fn anchor_out_of_range() {
        let mut m = method(vec![Insn::Simple(Opcode::Return)]);
        let mut batch = ChangeBatch::new();
        batch.remove(9);
        assert!(matches!(
            batch.commit(&mut m),
            Err(EditError::AnchorOutOfRange { index: 9, len: 1 })
        ));
    }

    #[test]
    fn dangling_jump_target_rejected() {
        let mut m = MethodNode::new(access::ACC_STATIC, "subject", "()V");
        let target = m.new_label();
        m.instructions = vec![
            Insn::Jump { op: Opcode::Goto, target },
            Insn::Label(target),
            Insn::Simple(Opcode::Return),
        ];
        let original = m.instructions.clone();
        let mut batch = ChangeBatch::new();
        batch.remove(1);
        let err = batch.commit(&mut m).unwrap_err();
        assert!(matches!(err, EditError::DanglingLabel { label: 0, .. }));
        assert_eq!(m.instructions, original);
    }

    #[test]
    fn dangling_handler_rejected() {
        let mut m = MethodNode::new(access::ACC_STATIC, "subject", "()V");
        let start = m.new_label();
        let end = m.new_label();
        let handler = m.new_label();
        m.instructions = vec![
            Insn::Label(start),
            Insn::Simple(Opcode::Nop),
            Insn::Label(end),
            Insn::Simple(Opcode::Return),
            Insn::Label(handler),
            Insn::Simple(Opcode::Athrow),
        ];
        m.try_catches.push(classweave_core::TryCatch {
            start,
            end,
            handler,
            catch_type: None,
        });
        let mut batch = ChangeBatch::new();
        batch.remove(4);
        assert!(matches!(
            batch.commit(&mut m),
            Err(EditError::DanglingLabel { .. })
        ));
    }

    #[test]
    fn noop_batch_reports_unchanged() {
        let mut m = method(vec![Insn::Simple(Opcode::Return)]);
        let batch = ChangeBatch::new();
        assert_eq!(batch.commit(&mut m), Ok(false));
    }
}
