//! Operand provenance over a decoded method body.
//!
//! [`InsnFlow`] builds a basic-block graph once and then answers two
//! questions: which instruction produced the value at a given stack depth
//! ([`InsnFlow::source_of`]), and which instruction consumes the value an
//! instruction pushed ([`InsnFlow::consumers_of`]). Both are deliberately
//! partial. Whenever the answer would depend on which path executed, on an
//! exception edge, on a subroutine, or on an instruction the effect table
//! does not model, the query declines instead of guessing. A declined query
//! is the signal for a transformer to leave the code alone.
//!
//! The flow borrows the method immutably for its whole lifetime, so a
//! batch of edits cannot be committed while answers from a stale graph are
//! still alive.

use std::collections::{HashMap, HashSet};

use petgraph::graph::{DiGraph, NodeIndex};
use petgraph::visit::EdgeRef;
use petgraph::Direction;
use tracing::debug;

use classweave_core::{Insn, LabelId, MethodNode, Opcode};

use crate::effect::stack_effect;

/// Answer to a [`InsnFlow::consumers_of`] query.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Consumers {
    /// The value is provably discarded (the method returns or unwinds with
    /// it still on the stack).
    None,
    /// Exactly one instruction consumes the value on every path.
    Sole(usize),
    /// The consumer could not be pinned down: the value is duplicated,
    /// crosses a merge point, or flows through something unmodelled.
    Ambiguous,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum EdgeKind {
    Flow,
    Exception,
}

#[derive(Debug, Clone, Copy)]
struct Block {
    /// First instruction index.
    start: usize,
    /// One past the last instruction index.
    end: usize,
}

/// Basic-block graph plus stack bookkeeping for one method body.
#[derive(Debug)]
pub struct InsnFlow<'a> {
    method: &'a MethodNode,
    blocks: Vec<Block>,
    block_of: Vec<usize>,
    label_index: HashMap<LabelId, usize>,
    graph: DiGraph<usize, EdgeKind>,
    nodes: Vec<NodeIndex>,
}

impl<'a> InsnFlow<'a> {
    pub fn new(method: &'a MethodNode) -> Self {
        let insns = &method.instructions;
        let n = insns.len();

        let mut label_index = HashMap::new();
        for (i, insn) in insns.iter().enumerate() {
            if let Insn::Label(label) = insn {
                label_index.insert(*label, i);
            }
        }

        // Leaders: entry, every control transfer target, and the
        // instruction after anything that branches or terminates.
        let mut leaders: HashSet<usize> = HashSet::new();
        if n > 0 {
            leaders.insert(0);
        }
        let mark_label = |set: &mut HashSet<usize>, label: LabelId| {
            if let Some(&i) = label_index.get(&label) {
                set.insert(i);
            }
        };
        for (i, insn) in insns.iter().enumerate() {
            for label in insn.referenced_labels() {
                mark_label(&mut leaders, label);
            }
            if let Some(op) = insn.opcode() {
                if op.is_terminal() || op.is_conditional_branch() || op == Opcode::Jsr {
                    if i + 1 < n {
                        leaders.insert(i + 1);
                    }
                }
            }
        }
        for tc in &method.try_catches {
            mark_label(&mut leaders, tc.start);
            mark_label(&mut leaders, tc.end);
            mark_label(&mut leaders, tc.handler);
        }

        let mut starts: Vec<usize> = leaders.into_iter().collect();
        starts.sort_unstable();
        let mut blocks = Vec::with_capacity(starts.len());
        for (b, &start) in starts.iter().enumerate() {
            let end = starts.get(b + 1).copied().unwrap_or(n);
            blocks.push(Block { start, end });
        }

        let mut block_of = vec![0usize; n];
        for (b, block) in blocks.iter().enumerate() {
            for slot in &mut block_of[block.start..block.end] {
                *slot = b;
            }
        }

        let mut graph = DiGraph::new();
        let nodes: Vec<NodeIndex> = (0..blocks.len()).map(|b| graph.add_node(b)).collect();
        let block_of_label = |label: LabelId| label_index.get(&label).map(|&i| block_of[i]);

        for (b, block) in blocks.iter().enumerate() {
            let last = insns[block.start..block.end]
                .iter()
                .rev()
                .find(|i| !matches!(i, Insn::Label(_)));
            let mut falls_through = true;
            if let Some(last) = last {
                for label in last.referenced_labels() {
                    if let Some(target) = block_of_label(label) {
                        graph.update_edge(nodes[b], nodes[target], EdgeKind::Flow);
                    }
                }
                if let Some(op) = last.opcode() {
                    if op.is_terminal() {
                        falls_through = false;
                    }
                }
            }
            if falls_through && b + 1 < blocks.len() {
                graph.update_edge(nodes[b], nodes[b + 1], EdgeKind::Flow);
            }
        }

        // A handler is reachable from every block that overlaps its range.
        for tc in &method.try_catches {
            let (Some(from), Some(to), Some(handler)) = (
                label_index.get(&tc.start).copied(),
                label_index.get(&tc.end).copied(),
                block_of_label(tc.handler),
            ) else {
                continue;
            };
            for (b, block) in blocks.iter().enumerate() {
                if block.start < to && block.end > from {
                    graph.update_edge(nodes[b], nodes[handler], EdgeKind::Exception);
                }
            }
        }

        debug!(
            method = %method.name,
            blocks = blocks.len(),
            edges = graph.edge_count(),
            "built instruction flow"
        );

        Self { method, blocks, block_of, label_index, graph, nodes }
    }

    /// The instruction that produced the operand sitting `depth` slots
    /// below the top of the stack immediately before `index` executes.
    ///
    /// Returns `None` whenever the producer is not unique and certain:
    /// the walk reaches a merge point, an exception handler, method entry,
    /// or an instruction with an unmodelled stack effect.
    pub fn source_of(&self, index: usize, depth: u16) -> Option<usize> {
        let insns = &self.method.instructions;
        if index >= insns.len() {
            return None;
        }
        let mut d = i64::from(depth);
        let mut block = self.block_of[index];
        let mut i = index;
        let mut visited = HashSet::from([block]);
        loop {
            while i > self.blocks[block].start {
                i -= 1;
                let effect = stack_effect(&insns[i])?;
                if d < i64::from(effect.pushes) {
                    return Some(i);
                }
                d = d - i64::from(effect.pushes) + i64::from(effect.pops);
            }
            block = self.sole_flow_predecessor(block)?;
            if !visited.insert(block) {
                return None;
            }
            i = self.blocks[block].end;
        }
    }

    /// Like [`source_of`](Self::source_of), but the operand is named by its
    /// slot position from the bottom of the operands `index` pops: slot 0
    /// is the receiver of a virtual call, the last slot is the top of the
    /// stack. Declines when the consumer's own effect is unmodelled.
    pub fn source_of_from_bottom(&self, index: usize, slot: u16) -> Option<usize> {
        let insn = self.method.instructions.get(index)?;
        let effect = stack_effect(insn)?;
        if slot >= effect.pops {
            return None;
        }
        self.source_of(index, effect.pops - 1 - slot)
    }

    /// The instruction consuming the value pushed by `index`, tracked
    /// across every path the value can take.
    pub fn consumers_of(&self, index: usize) -> Consumers {
        let insns = &self.method.instructions;
        if index >= insns.len() {
            return Consumers::Ambiguous;
        }
        // Duplication opcodes push copies, so "the" consumer of their
        // result is not a meaningful question.
        if is_dup_family(&insns[index]) {
            return Consumers::Ambiguous;
        }
        let Some(produced) = stack_effect(&insns[index]) else {
            return Consumers::Ambiguous;
        };
        if produced.pushes == 0 {
            return Consumers::None;
        }
        // Every non-duplicating pusher pushes exactly one value, whose
        // width is its push count.
        let width = i64::from(produced.pushes);

        let mut d: i64 = 0;
        let mut block = self.block_of[index];
        let mut visited = HashSet::from([block]);
        let mut i = index + 1;
        loop {
            if i >= insns.len() {
                return Consumers::Ambiguous;
            }
            if self.block_of[i] != block {
                // Fell through into the next block.
                let next = self.block_of[i];
                if !self.enterable(next) || !visited.insert(next) {
                    return Consumers::Ambiguous;
                }
                block = next;
            }
            let insn = &insns[i];
            let Some(effect) = stack_effect(insn) else {
                return Consumers::Ambiguous;
            };
            let pops = i64::from(effect.pops);
            if pops > d {
                if is_dup_family(insn) {
                    return Consumers::Ambiguous;
                }
                if pops >= d + width {
                    return Consumers::Sole(i);
                }
                // The instruction splits the value's slots.
                return Consumers::Ambiguous;
            }
            d = d - pops + i64::from(effect.pushes);

            if let Some(op) = insn.opcode() {
                if op == Opcode::Goto {
                    let Insn::Jump { target, .. } = insn else {
                        return Consumers::Ambiguous;
                    };
                    let Some(&target_index) = self.label_index.get(target) else {
                        return Consumers::Ambiguous;
                    };
                    let next = self.block_of[target_index];
                    if !self.enterable(next) || !visited.insert(next) {
                        return Consumers::Ambiguous;
                    }
                    block = next;
                    i = target_index;
                    continue;
                }
                if op.is_terminal() {
                    // A return or throw that did not consume the value
                    // abandons the operand stack.
                    return Consumers::None;
                }
                if op.is_conditional_branch() || op == Opcode::Jsr {
                    // The value survives into more than one successor.
                    return Consumers::Ambiguous;
                }
            }
            i += 1;
        }
    }

    fn sole_flow_predecessor(&self, block: usize) -> Option<usize> {
        if !self.enterable(block) {
            return None;
        }
        self.graph
            .neighbors_directed(self.nodes[block], Direction::Incoming)
            .next()
            .map(|node| self.graph[node])
    }

    /// A block can be crossed into only when exactly one flow edge reaches
    /// it and no exception edge does.
    fn enterable(&self, block: usize) -> bool {
        let mut flow = 0usize;
        for edge in self.graph.edges_directed(self.nodes[block], Direction::Incoming) {
            match edge.weight() {
                EdgeKind::Flow => flow += 1,
                EdgeKind::Exception => return false,
            }
        }
        flow == 1
    }
}

fn is_dup_family(insn: &Insn) -> bool {
    matches!(
        insn,
        Insn::Simple(
            Opcode::Dup
                | Opcode::DupX1
                | Opcode::DupX2
                | Opcode::Dup2
                | Opcode::Dup2X1
                | Opcode::Dup2X2
                | Opcode::Swap
        )
    )
}

#[cfg(test)]
mod tests {
    use super::*;
    use classweave_core::{access, Const, MethodNode};

    fn method(instructions: Vec<Insn>) -> MethodNode {
        let mut m = MethodNode::new(access::ACC_STATIC, "probe", "()V");
        m.instructions = instructions;
        m
    }

    #[test]
    fn straight_line_sources() {
        let m = method(vec![
            Insn::Simple(Opcode::Iconst1),
            Insn::Simple(Opcode::Iconst2),
            Insn::Simple(Opcode::Iadd),
            Insn::Simple(Opcode::Ireturn),
        ]);
        let flow = InsnFlow::new(&m);
        assert_eq!(flow.source_of(2, 0), Some(1));
        assert_eq!(flow.source_of(2, 1), Some(0));
        assert_eq!(flow.source_of_from_bottom(2, 0), Some(0));
        assert_eq!(flow.source_of_from_bottom(2, 1), Some(1));
        assert_eq!(flow.consumers_of(0), Consumers::Sole(2));
        assert_eq!(flow.consumers_of(1), Consumers::Sole(2));
        assert_eq!(flow.consumers_of(2), Consumers::Sole(3));
    }

    #[test]
    fn wide_value_tracked_as_one_unit() {
        let m = method(vec![
            Insn::LoadConst(Const::Long(7)),
            Insn::LoadConst(Const::Long(8)),
            Insn::Simple(Opcode::Ladd),
            Insn::Simple(Opcode::Lreturn),
        ]);
        let flow = InsnFlow::new(&m);
        assert_eq!(flow.source_of(2, 0), Some(1));
        assert_eq!(flow.source_of(2, 2), Some(0));
        assert_eq!(flow.consumers_of(0), Consumers::Sole(2));
    }

    #[test]
    fn merge_point_declines() {
        // Two arms each push a value and meet at L0; the producer at the
        // merge is path dependent.
        let mut m = MethodNode::new(access::ACC_STATIC, "probe", "(Z)I");
        let merge = m.new_label();
        m.instructions = vec![
            Insn::Local { op: Opcode::Iload, index: 0 },
            Insn::Jump { op: Opcode::Ifeq, target: merge },
            Insn::Simple(Opcode::Iconst1),
            Insn::Jump { op: Opcode::Goto, target: merge },
            Insn::Simple(Opcode::Iconst2),
            Insn::Label(merge),
            Insn::Simple(Opcode::Ireturn),
        ];
        let flow = InsnFlow::new(&m);
        assert_eq!(flow.source_of(6, 0), None);
        assert_eq!(flow.consumers_of(2), Consumers::Ambiguous);
    }

    #[test]
    fn single_predecessor_is_crossed() {
        let mut m = MethodNode::new(access::ACC_STATIC, "probe", "()I");
        let next = m.new_label();
        m.instructions = vec![
            Insn::Simple(Opcode::Iconst5),
            Insn::Jump { op: Opcode::Goto, target: next },
            Insn::Label(next),
            Insn::Simple(Opcode::Ireturn),
        ];
        let flow = InsnFlow::new(&m);
        assert_eq!(flow.source_of(3, 0), Some(0));
        assert_eq!(flow.consumers_of(0), Consumers::Sole(3));
    }

    #[test]
    fn duplication_declines() {
        let m = method(vec![
            Insn::Simple(Opcode::Iconst1),
            Insn::Simple(Opcode::Dup),
            Insn::Simple(Opcode::Pop),
            Insn::Simple(Opcode::Ireturn),
        ]);
        let flow = InsnFlow::new(&m);
        assert_eq!(flow.consumers_of(0), Consumers::Ambiguous);
        assert_eq!(flow.consumers_of(1), Consumers::Ambiguous);
    }

    #[test]
    fn discarded_value_has_no_consumer() {
        let m = method(vec![
            Insn::Simple(Opcode::Iconst1),
            Insn::Simple(Opcode::Return),
        ]);
        let flow = InsnFlow::new(&m);
        assert_eq!(flow.consumers_of(0), Consumers::None);
    }

    #[test]
    fn handler_entry_declines() {
        let mut m = MethodNode::new(access::ACC_STATIC, "probe", "()V");
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
        let flow = InsnFlow::new(&m);
        // The exception object on the handler's stack has no producer
        // instruction.
        assert_eq!(flow.source_of(5, 0), None);
    }
}
