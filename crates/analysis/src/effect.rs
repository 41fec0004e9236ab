//! Per-instruction operand stack effects, measured in stack slots.
//!
//! A `long` or `double` counts as two slots, matching how the JVM sizes
//! the operand stack. Instructions whose effect cannot be known statically
//! (`jsr`/`ret`, or a malformed descriptor) report `None`, and every query
//! built on top of this table declines rather than guesses.

use classweave_core::desc::{argument_slots, parse_field_descriptor, return_slots};
use classweave_core::{Insn, Opcode};

/// Slots popped and pushed by one instruction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StackEffect {
    pub pops: u16,
    pub pushes: u16,
}

const fn eff(pops: u16, pushes: u16) -> Option<StackEffect> {
    Some(StackEffect { pops, pushes })
}

/// The stack effect of `insn`, or `None` when it is not statically known.
pub fn stack_effect(insn: &Insn) -> Option<StackEffect> {
    match insn {
        Insn::Label(_) => eff(0, 0),

        Insn::PushInt { .. } => eff(0, 1),
        Insn::LoadConst(c) => eff(0, c.slots()),
        Insn::Iinc { .. } => eff(0, 0),

        Insn::Local { op, .. } => match op {
            Opcode::Iload | Opcode::Fload | Opcode::Aload => eff(0, 1),
            Opcode::Lload | Opcode::Dload => eff(0, 2),
            Opcode::Istore | Opcode::Fstore | Opcode::Astore => eff(1, 0),
            Opcode::Lstore | Opcode::Dstore => eff(2, 0),
            // ret: the successor is a jsr return address, not modelled.
            _ => None,
        },

        Insn::Field { op, descriptor, .. } => {
            let slots = parse_field_descriptor(descriptor).ok()?.slots();
            match op {
                Opcode::Getstatic => eff(0, slots),
                Opcode::Putstatic => eff(slots, 0),
                Opcode::Getfield => eff(1, slots),
                Opcode::Putfield => eff(1 + slots, 0),
                _ => None,
            }
        }

        Insn::Method { op, descriptor, .. } => {
            let args = argument_slots(descriptor).ok()?;
            let ret = return_slots(descriptor).ok()?;
            let receiver = if *op == Opcode::Invokestatic { 0 } else { 1 };
            eff(receiver + args, ret)
        }

        Insn::InvokeDynamic(site) => {
            let args = argument_slots(&site.descriptor).ok()?;
            let ret = return_slots(&site.descriptor).ok()?;
            eff(args, ret)
        }

        Insn::Jump { op, .. } => match op {
            Opcode::Goto => eff(0, 0),
            Opcode::Ifeq
            | Opcode::Ifne
            | Opcode::Iflt
            | Opcode::Ifge
            | Opcode::Ifgt
            | Opcode::Ifle
            | Opcode::Ifnull
            | Opcode::Ifnonnull => eff(1, 0),
            Opcode::IfIcmpeq
            | Opcode::IfIcmpne
            | Opcode::IfIcmplt
            | Opcode::IfIcmpge
            | Opcode::IfIcmpgt
            | Opcode::IfIcmple
            | Opcode::IfAcmpeq
            | Opcode::IfAcmpne => eff(2, 0),
            // jsr pushes a return address the model does not track.
            _ => None,
        },

        Insn::Tableswitch { .. } | Insn::Lookupswitch { .. } => eff(1, 0),

        Insn::Type { op, .. } => match op {
            Opcode::New => eff(0, 1),
            Opcode::Checkcast | Opcode::Instanceof | Opcode::Anewarray => eff(1, 1),
            _ => None,
        },
        Insn::NewArray(_) => eff(1, 1),
        Insn::MultiANewArray { dims, .. } => eff(*dims as u16, 1),

        Insn::Simple(op) => simple_effect(*op),
    }
}

fn simple_effect(op: Opcode) -> Option<StackEffect> {
    use Opcode::*;
    match op {
        Nop => eff(0, 0),

        AconstNull | IconstM1 | Iconst0 | Iconst1 | Iconst2 | Iconst3 | Iconst4 | Iconst5
        | Fconst0 | Fconst1 | Fconst2 => eff(0, 1),
        Lconst0 | Lconst1 | Dconst0 | Dconst1 => eff(0, 2),

        Iaload | Faload | Aaload | Baload | Caload | Saload => eff(2, 1),
        Laload | Daload => eff(2, 2),
        Iastore | Fastore | Aastore | Bastore | Castore | Sastore => eff(3, 0),
        Lastore | Dastore => eff(4, 0),

        Pop => eff(1, 0),
        Pop2 => eff(2, 0),
        Dup => eff(1, 2),
        DupX1 => eff(2, 3),
        DupX2 => eff(3, 4),
        Dup2 => eff(2, 4),
        Dup2X1 => eff(3, 5),
        Dup2X2 => eff(4, 6),
        Swap => eff(2, 2),

        Iadd | Isub | Imul | Idiv | Irem | Iand | Ior | Ixor | Ishl | Ishr | Iushr => eff(2, 1),
        Ladd | Lsub | Lmul | Ldiv | Lrem | Land | Lor | Lxor => eff(4, 2),
        Lshl | Lshr | Lushr => eff(3, 2),
        Fadd | Fsub | Fmul | Fdiv | Frem => eff(2, 1),
        Dadd | Dsub | Dmul | Ddiv | Drem => eff(4, 2),
        Ineg | Fneg => eff(1, 1),
        Lneg | Dneg => eff(2, 2),

        I2l | I2d | F2l | F2d => eff(1, 2),
        I2f | F2i | I2b | I2c | I2s => eff(1, 1),
        L2i | L2f | D2i | D2f => eff(2, 1),
        L2d | D2l => eff(2, 2),

        Lcmp | Dcmpl | Dcmpg => eff(4, 1),
        Fcmpl | Fcmpg => eff(2, 1),

        Ireturn | Freturn | Areturn => eff(1, 0),
        Lreturn | Dreturn => eff(2, 0),
        Return => eff(0, 0),

        Arraylength => eff(1, 1),
        Athrow => eff(1, 0),
        Monitorenter | Monitorexit => eff(1, 0),

        _ => None,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use classweave_core::Const;

    #[test]
    fn wide_values_take_two_slots() {
        assert_eq!(
            stack_effect(&Insn::LoadConst(Const::Long(1))),
            eff(0, 2)
        );
        assert_eq!(stack_effect(&Insn::Simple(Opcode::Ladd)), eff(4, 2));
        assert_eq!(stack_effect(&Insn::Simple(Opcode::Lshl)), eff(3, 2));
    }

    #[test]
    fn invocation_counts_receiver_and_descriptor_slots() {
        let virt = Insn::Method {
            op: Opcode::Invokevirtual,
            owner: "java/lang/String".into(),
            name: "charAt".into(),
            descriptor: "(I)C".into(),
            interface: false,
        };
        assert_eq!(stack_effect(&virt), eff(2, 1));

        let stat = Insn::Method {
            op: Opcode::Invokestatic,
            owner: "java/lang/Long".into(),
            name: "toString".into(),
            descriptor: "(J)Ljava/lang/String;".into(),
            interface: false,
        };
        assert_eq!(stack_effect(&stat), eff(2, 1));
    }

    #[test]
    fn subroutine_opcodes_are_unmodelled() {
        assert_eq!(
            stack_effect(&Insn::Jump { op: Opcode::Jsr, target: classweave_core::LabelId(0) }),
            None
        );
        assert_eq!(stack_effect(&Insn::Local { op: Opcode::Ret, index: 1 }), None);
    }
}
