//! Classfile serializer.
//!
//! Mirror of the reader: labels become offsets again, compact instruction
//! forms (`iload_0`, `ldc`, `wide`) are chosen from operand values, and
//! symbolic field, method, and call-site references are interned into a
//! copy of the class's constant pool. Interning is append-only, so indices
//! parsed from the original file stay valid and raw passthrough attributes
//! need no rewriting.

use std::collections::{HashMap, HashSet};

use tracing::trace;

use classweave_utils::errors::ClassWriteError;

use crate::desc::argument_slots;
use crate::insn::{CallSite, Const, Insn, LabelId};
use crate::node::{
    BootstrapMethod, ClassNode, MethodNode, RawAttribute, StackMapFrame, VerificationType,
};
use crate::opcode::Opcode;
use crate::pool::{encode_modified_utf8, tag, ConstPool, PoolEntry};

const MAGIC: u32 = 0xcafe_babe;
const MAX_CODE_LEN: usize = 0xffff;

fn put_u8(buf: &mut Vec<u8>, v: u8) {
    buf.push(v);
}

fn put_u16(buf: &mut Vec<u8>, v: u16) {
    buf.extend_from_slice(&v.to_be_bytes());
}

fn put_u32(buf: &mut Vec<u8>, v: u32) {
    buf.extend_from_slice(&v.to_be_bytes());
}

fn put_i32(buf: &mut Vec<u8>, v: i32) {
    buf.extend_from_slice(&v.to_be_bytes());
}

/// Serializes a class back to bytes.
///
/// The class itself is not modified: interning happens on an internal copy
/// of the pool and bootstrap method table, so writing is repeatable.
pub fn write_class(class: &ClassNode) -> Result<Vec<u8>, ClassWriteError> {
    let mut w = ClassWriter {
        pool: class.pool.clone(),
        bootstrap: class.bootstrap_methods.clone(),
    };
    w.write(class)
}

struct ClassWriter {
    pool: ConstPool,
    bootstrap: Vec<BootstrapMethod>,
}

/// Pre-interned operand of one instruction, so layout can size everything
/// without touching the pool again.
#[derive(Clone, Copy)]
enum Operand {
    None,
    /// Constant pool index plus whether it loads two stack slots.
    Const { index: u16, wide_slot: bool },
    /// Any plain u16 pool index operand.
    Ref(u16),
}

impl ClassWriter {
    fn write(&mut self, class: &ClassNode) -> Result<Vec<u8>, ClassWriteError> {
        // Everything after the pool is assembled first; the pool is
        // serialized once all interning has happened.
        let mut body = Vec::new();

        put_u16(&mut body, class.access);
        let this_class = self.pool.intern_class(&class.name)?;
        put_u16(&mut body, this_class);
        let super_class = match &class.super_name {
            Some(name) => self.pool.intern_class(name)?,
            None => 0,
        };
        put_u16(&mut body, super_class);

        put_u16(&mut body, class.interfaces.len() as u16);
        for name in &class.interfaces {
            let index = self.pool.intern_class(name)?;
            put_u16(&mut body, index);
        }

        put_u16(&mut body, class.fields.len() as u16);
        for field in &class.fields {
            put_u16(&mut body, field.access);
            let name = self.pool.intern_utf8(&field.name)?;
            put_u16(&mut body, name);
            let descriptor = self.pool.intern_utf8(&field.descriptor)?;
            put_u16(&mut body, descriptor);
            self.write_attrs(&mut body, &field.attrs)?;
        }

        put_u16(&mut body, class.methods.len() as u16);
        for method in &class.methods {
            self.write_method(&mut body, method)?;
        }

        // Class attributes: raw passthrough plus a rebuilt BootstrapMethods
        // table when any bootstrap method exists.
        let mut class_attrs: Vec<RawAttribute> = class.attrs.clone();
        if !self.bootstrap.is_empty() {
            let data = self.bootstrap_methods_attr()?;
            class_attrs.push(RawAttribute { name: "BootstrapMethods".to_owned(), data });
        }
        self.write_attrs(&mut body, &class_attrs)?;

        let mut out = Vec::with_capacity(body.len() + 256);
        put_u32(&mut out, MAGIC);
        put_u16(&mut out, class.minor_version);
        put_u16(&mut out, class.major_version);
        self.write_pool(&mut out);
        out.extend_from_slice(&body);

        trace!(
            class = %class.name,
            bytes = out.len(),
            pool_count = self.pool.count(),
            "wrote class"
        );
        Ok(out)
    }

    fn write_attrs(
        &mut self,
        buf: &mut Vec<u8>,
        attrs: &[RawAttribute],
    ) -> Result<(), ClassWriteError> {
        put_u16(buf, attrs.len() as u16);
        for attr in attrs {
            let name = self.pool.intern_utf8(&attr.name)?;
            put_u16(buf, name);
            put_u32(buf, attr.data.len() as u32);
            buf.extend_from_slice(&attr.data);
        }
        Ok(())
    }

    fn write_pool(&self, buf: &mut Vec<u8>) {
        put_u16(buf, self.pool.count());
        for (_, entry) in self.pool.entries() {
            match entry {
                PoolEntry::Utf8(s) => {
                    put_u8(buf, tag::UTF8);
                    let bytes = encode_modified_utf8(s);
                    put_u16(buf, bytes.len() as u16);
                    buf.extend_from_slice(&bytes);
                }
                PoolEntry::Integer(v) => {
                    put_u8(buf, tag::INTEGER);
                    put_i32(buf, *v);
                }
                PoolEntry::Float(v) => {
                    put_u8(buf, tag::FLOAT);
                    put_u32(buf, v.to_bits());
                }
                PoolEntry::Long(v) => {
                    put_u8(buf, tag::LONG);
                    buf.extend_from_slice(&v.to_be_bytes());
                }
                PoolEntry::Double(v) => {
                    put_u8(buf, tag::DOUBLE);
                    buf.extend_from_slice(&v.to_bits().to_be_bytes());
                }
                PoolEntry::Class(name) => {
                    put_u8(buf, tag::CLASS);
                    put_u16(buf, *name);
                }
                PoolEntry::Str(utf8) => {
                    put_u8(buf, tag::STRING);
                    put_u16(buf, *utf8);
                }
                PoolEntry::FieldRef { class, name_and_type } => {
                    put_u8(buf, tag::FIELD_REF);
                    put_u16(buf, *class);
                    put_u16(buf, *name_and_type);
                }
                PoolEntry::MethodRef { class, name_and_type } => {
                    put_u8(buf, tag::METHOD_REF);
                    put_u16(buf, *class);
                    put_u16(buf, *name_and_type);
                }
                PoolEntry::InterfaceMethodRef { class, name_and_type } => {
                    put_u8(buf, tag::INTERFACE_METHOD_REF);
                    put_u16(buf, *class);
                    put_u16(buf, *name_and_type);
                }
                PoolEntry::NameAndType { name, descriptor } => {
                    put_u8(buf, tag::NAME_AND_TYPE);
                    put_u16(buf, *name);
                    put_u16(buf, *descriptor);
                }
                PoolEntry::MethodHandle { kind, reference } => {
                    put_u8(buf, tag::METHOD_HANDLE);
                    put_u8(buf, *kind);
                    put_u16(buf, *reference);
                }
                PoolEntry::MethodType(descriptor) => {
                    put_u8(buf, tag::METHOD_TYPE);
                    put_u16(buf, *descriptor);
                }
                PoolEntry::Dynamic { bootstrap, name_and_type } => {
                    put_u8(buf, tag::DYNAMIC);
                    put_u16(buf, *bootstrap);
                    put_u16(buf, *name_and_type);
                }
                PoolEntry::InvokeDynamic { bootstrap, name_and_type } => {
                    put_u8(buf, tag::INVOKE_DYNAMIC);
                    put_u16(buf, *bootstrap);
                    put_u16(buf, *name_and_type);
                }
                PoolEntry::Module(name) => {
                    put_u8(buf, tag::MODULE);
                    put_u16(buf, *name);
                }
                PoolEntry::Package(name) => {
                    put_u8(buf, tag::PACKAGE);
                    put_u16(buf, *name);
                }
            }
        }
    }

    // ---- bootstrap methods ----------------------------------------------

    /// Returns the index of the matching table entry, appending if new.
    fn intern_bootstrap(&mut self, site: &CallSite) -> Result<u16, ClassWriteError> {
        let entry = BootstrapMethod { handle: site.bootstrap.clone(), args: site.args.clone() };
        if let Some(pos) = self.bootstrap.iter().position(|e| *e == entry) {
            return Ok(pos as u16);
        }
        // Intern pool entries up front so the attribute body can be emitted
        // without further pool growth.
        self.pool.intern_method_handle(&entry.handle)?;
        for arg in &entry.args {
            self.intern_const(arg)?;
        }
        let index = self.bootstrap.len();
        if index > u16::MAX as usize {
            return Err(ClassWriteError::ConstantPoolOverflow(index));
        }
        self.bootstrap.push(entry);
        Ok(index as u16)
    }

    fn bootstrap_methods_attr(&mut self) -> Result<Vec<u8>, ClassWriteError> {
        // intern_bootstrap already interned the pool entries of any table
        // entry it appended, and entries parsed from the original file refer
        // to pool entries the reader kept, so interning here only looks up.
        let mut body = Vec::new();
        put_u16(&mut body, self.bootstrap.len() as u16);
        for i in 0..self.bootstrap.len() {
            let entry = self.bootstrap[i].clone();
            let handle = self.pool.intern_method_handle(&entry.handle)?;
            put_u16(&mut body, handle);
            put_u16(&mut body, entry.args.len() as u16);
            for arg in &entry.args {
                let index = self.intern_const(arg)?;
                put_u16(&mut body, index);
            }
        }
        Ok(body)
    }

    fn intern_const(&mut self, value: &Const) -> Result<u16, ClassWriteError> {
        match value {
            Const::Int(v) => self.pool.intern_integer(*v),
            Const::Long(v) => self.pool.intern_long(*v),
            Const::Float(v) => self.pool.intern_float(*v),
            Const::Double(v) => self.pool.intern_double(*v),
            Const::Str(s) => self.pool.intern_string(s),
            Const::Class(name) => self.pool.intern_class(name),
            Const::MethodHandle(handle) => self.pool.intern_method_handle(handle),
            Const::MethodType(descriptor) => self.pool.intern_method_type(descriptor),
            Const::Dynamic(site) => {
                let bootstrap = self.intern_bootstrap(site)?;
                self.pool.intern_dynamic(bootstrap, &site.name, &site.descriptor)
            }
        }
    }

    // ---- methods ---------------------------------------------------------

    fn write_method(
        &mut self,
        buf: &mut Vec<u8>,
        method: &MethodNode,
    ) -> Result<(), ClassWriteError> {
        put_u16(buf, method.access);
        let name = self.pool.intern_utf8(&method.name)?;
        put_u16(buf, name);
        let descriptor = self.pool.intern_utf8(&method.descriptor)?;
        put_u16(buf, descriptor);

        let mut attrs: Vec<RawAttribute> = Vec::new();
        if method.has_code() {
            let data = self.code_attr(method)?;
            attrs.push(RawAttribute { name: "Code".to_owned(), data });
        }
        attrs.extend(method.attrs.iter().cloned());
        self.write_attrs(buf, &attrs)?;
        Ok(())
    }

    fn code_attr(&mut self, method: &MethodNode) -> Result<Vec<u8>, ClassWriteError> {
        let operands = self.intern_operands(method)?;
        let (positions, code) = self.layout_and_emit(method, &operands)?;

        let mut data = Vec::new();
        put_u16(&mut data, method.max_stack);
        put_u16(&mut data, method.max_locals);
        put_u32(&mut data, code.len() as u32);
        data.extend_from_slice(&code);

        put_u16(&mut data, method.try_catches.len() as u16);
        for tc in &method.try_catches {
            put_u16(&mut data, resolve(method, &positions, tc.start)?);
            put_u16(&mut data, resolve(method, &positions, tc.end)?);
            put_u16(&mut data, resolve(method, &positions, tc.handler)?);
            let catch_type = match &tc.catch_type {
                Some(name) => self.pool.intern_class(name)?,
                None => 0,
            };
            put_u16(&mut data, catch_type);
        }

        let mut attrs: Vec<RawAttribute> = Vec::new();
        if !method.line_numbers.is_empty() {
            let mut body = Vec::new();
            put_u16(&mut body, method.line_numbers.len() as u16);
            for ln in &method.line_numbers {
                put_u16(&mut body, resolve(method, &positions, ln.start)?);
                put_u16(&mut body, ln.line);
            }
            attrs.push(RawAttribute { name: "LineNumberTable".to_owned(), data: body });
        }
        if !method.local_vars.is_empty() {
            let mut body = Vec::new();
            put_u16(&mut body, method.local_vars.len() as u16);
            for lv in &method.local_vars {
                let start = resolve(method, &positions, lv.start)?;
                let end = resolve(method, &positions, lv.end)?;
                put_u16(&mut body, start);
                put_u16(&mut body, end.saturating_sub(start));
                put_u16(&mut body, self.pool.intern_utf8(&lv.name)?);
                put_u16(&mut body, self.pool.intern_utf8(&lv.descriptor)?);
                put_u16(&mut body, lv.index);
            }
            attrs.push(RawAttribute { name: "LocalVariableTable".to_owned(), data: body });
        }
        if !method.frames.is_empty() {
            let body = self.stack_map_table(method, &positions)?;
            attrs.push(RawAttribute { name: "StackMapTable".to_owned(), data: body });
        }
        attrs.extend(method.code_attrs.iter().cloned());

        let mut attr_bytes = Vec::new();
        self.write_attrs(&mut attr_bytes, &attrs)?;
        data.extend_from_slice(&attr_bytes);
        Ok(data)
    }

    /// Frames are re-emitted as `full_frame` entries: their expanded form is
    /// what the model carries, and compressing back buys nothing.
    fn stack_map_table(
        &mut self,
        method: &MethodNode,
        positions: &HashMap<LabelId, usize>,
    ) -> Result<Vec<u8>, ClassWriteError> {
        let mut frames: Vec<(usize, &StackMapFrame)> = Vec::with_capacity(method.frames.len());
        for frame in &method.frames {
            let at = resolve(method, positions, frame.at)? as usize;
            frames.push((at, frame));
        }
        frames.sort_by_key(|(at, _)| *at);

        let mut body = Vec::new();
        put_u16(&mut body, frames.len() as u16);
        let mut previous: i64 = -1;
        for (at, frame) in frames {
            let delta = at as i64 - previous - 1;
            if delta < 0 {
                return Err(ClassWriteError::OperandOverflow {
                    method: method.name.clone(),
                    what: format!("duplicate stack map frame at offset {at}"),
                });
            }
            previous = at as i64;
            put_u8(&mut body, 255);
            put_u16(&mut body, delta as u16);
            put_u16(&mut body, frame.locals.len() as u16);
            for vt in &frame.locals {
                self.verification_type(&mut body, method, positions, vt)?;
            }
            put_u16(&mut body, frame.stack.len() as u16);
            for vt in &frame.stack {
                self.verification_type(&mut body, method, positions, vt)?;
            }
        }
        Ok(body)
    }

    fn verification_type(
        &mut self,
        buf: &mut Vec<u8>,
        method: &MethodNode,
        positions: &HashMap<LabelId, usize>,
        vt: &VerificationType,
    ) -> Result<(), ClassWriteError> {
        match vt {
            VerificationType::Top => put_u8(buf, 0),
            VerificationType::Integer => put_u8(buf, 1),
            VerificationType::Float => put_u8(buf, 2),
            VerificationType::Double => put_u8(buf, 3),
            VerificationType::Long => put_u8(buf, 4),
            VerificationType::Null => put_u8(buf, 5),
            VerificationType::UninitializedThis => put_u8(buf, 6),
            VerificationType::Object(name) => {
                put_u8(buf, 7);
                let index = self.pool.intern_class(name)?;
                put_u16(buf, index);
            }
            VerificationType::Uninitialized(label) => {
                put_u8(buf, 8);
                put_u16(buf, resolve(method, positions, *label)?);
            }
        }
        Ok(())
    }

    // ---- code layout and emission ----------------------------------------

    fn intern_operands(&mut self, method: &MethodNode) -> Result<Vec<Operand>, ClassWriteError> {
        let mut operands = Vec::with_capacity(method.instructions.len());
        for insn in &method.instructions {
            let operand = match insn {
                Insn::LoadConst(c) => Operand::Const {
                    index: self.intern_const(c)?,
                    wide_slot: c.slots() == 2,
                },
                Insn::Field { owner, name, descriptor, .. } => {
                    Operand::Ref(self.pool.intern_field_ref(owner, name, descriptor)?)
                }
                Insn::Method { owner, name, descriptor, interface, .. } => Operand::Ref(
                    self.pool.intern_method_ref(owner, name, descriptor, *interface)?,
                ),
                Insn::InvokeDynamic(site) => {
                    let bootstrap = self.intern_bootstrap(site)?;
                    Operand::Ref(self.pool.intern_invoke_dynamic(
                        bootstrap,
                        &site.name,
                        &site.descriptor,
                    )?)
                }
                Insn::Type { class_name, .. } => {
                    Operand::Ref(self.pool.intern_class(class_name)?)
                }
                Insn::MultiANewArray { descriptor, .. } => {
                    Operand::Ref(self.pool.intern_class(descriptor)?)
                }
                _ => Operand::None,
            };
            operands.push(operand);
        }
        Ok(operands)
    }

    fn layout_and_emit(
        &self,
        method: &MethodNode,
        operands: &[Operand],
    ) -> Result<(HashMap<LabelId, usize>, Vec<u8>), ClassWriteError> {
        // Unconditional jumps start narrow and are widened to goto_w/jsr_w
        // whenever a pass finds their offset out of 16-bit range. Widening
        // only grows the code, so this converges.
        let mut widened: HashSet<usize> = HashSet::new();
        let (positions, offsets) = loop {
            let mut positions: HashMap<LabelId, usize> = HashMap::new();
            let mut offsets = Vec::with_capacity(method.instructions.len());
            let mut pc = 0usize;
            for (i, insn) in method.instructions.iter().enumerate() {
                offsets.push(pc);
                if let Insn::Label(label) = insn {
                    positions.insert(*label, pc);
                }
                pc += insn_size(insn, &operands[i], pc, widened.contains(&i));
            }
            if pc > MAX_CODE_LEN {
                return Err(ClassWriteError::CodeSizeOverflow(method.name.clone()));
            }

            let mut grew = false;
            for (i, insn) in method.instructions.iter().enumerate() {
                let Insn::Jump { op, target } = insn else { continue };
                let target_pc = resolve(method, &positions, *target)? as i64;
                let relative = target_pc - offsets[i] as i64;
                if i16::try_from(relative).is_ok() {
                    continue;
                }
                match op {
                    Opcode::Goto | Opcode::Jsr => {
                        if widened.insert(i) {
                            grew = true;
                        }
                    }
                    _ => {
                        return Err(ClassWriteError::BranchOffsetOverflow {
                            method: method.name.clone(),
                            offset: relative,
                        })
                    }
                }
            }
            if !grew {
                break (positions, offsets);
            }
        };

        let mut code = Vec::new();
        for (i, insn) in method.instructions.iter().enumerate() {
            self.emit_insn(
                &mut code,
                method,
                insn,
                &operands[i],
                offsets[i],
                &positions,
                widened.contains(&i),
            )?;
        }
        Ok((positions, code))
    }

    #[allow(clippy::too_many_arguments)]
    fn emit_insn(
        &self,
        code: &mut Vec<u8>,
        method: &MethodNode,
        insn: &Insn,
        operand: &Operand,
        pc: usize,
        positions: &HashMap<LabelId, usize>,
        widened: bool,
    ) -> Result<(), ClassWriteError> {
        let overflow = |what: String| ClassWriteError::OperandOverflow {
            method: method.name.clone(),
            what,
        };
        match insn {
            Insn::Label(_) => {}

            Insn::Simple(op) => put_u8(code, op.byte()),

            Insn::PushInt { op, value } => match op {
                Opcode::Bipush => {
                    let v = i8::try_from(*value)
                        .map_err(|_| overflow(format!("bipush value {value}")))?;
                    put_u8(code, op.byte());
                    put_u8(code, v as u8);
                }
                _ => {
                    let v = i16::try_from(*value)
                        .map_err(|_| overflow(format!("sipush value {value}")))?;
                    put_u8(code, Opcode::Sipush.byte());
                    put_u16(code, v as u16);
                }
            },

            Insn::LoadConst(_) => {
                let Operand::Const { index, wide_slot } = operand else {
                    return Err(overflow("constant operand missing".to_owned()));
                };
                if *wide_slot {
                    put_u8(code, Opcode::Ldc2W.byte());
                    put_u16(code, *index);
                } else if *index > 0xff {
                    put_u8(code, Opcode::LdcW.byte());
                    put_u16(code, *index);
                } else {
                    put_u8(code, Opcode::Ldc.byte());
                    put_u8(code, *index as u8);
                }
            }

            Insn::Local { op, index } => {
                let byte = op.byte();
                if *op != Opcode::Ret && *index <= 3 {
                    // iload_0 family: loads pack from 0x1a, stores from 0x3b.
                    let compact = if (0x15..=0x19).contains(&byte) {
                        0x1a + (byte - 0x15) * 4 + *index as u8
                    } else {
                        0x3b + (byte - 0x36) * 4 + *index as u8
                    };
                    put_u8(code, compact);
                } else if *index <= 0xff {
                    put_u8(code, byte);
                    put_u8(code, *index as u8);
                } else {
                    put_u8(code, Opcode::Wide.byte());
                    put_u8(code, byte);
                    put_u16(code, *index);
                }
            }

            Insn::Iinc { index, delta } => {
                if *index <= 0xff && i8::try_from(*delta).is_ok() {
                    put_u8(code, Opcode::Iinc.byte());
                    put_u8(code, *index as u8);
                    put_u8(code, *delta as i8 as u8);
                } else {
                    put_u8(code, Opcode::Wide.byte());
                    put_u8(code, Opcode::Iinc.byte());
                    put_u16(code, *index);
                    put_u16(code, *delta as u16);
                }
            }

            Insn::Field { op, .. } | Insn::Type { op, .. } => {
                let Operand::Ref(index) = operand else {
                    return Err(overflow("pool operand missing".to_owned()));
                };
                put_u8(code, op.byte());
                put_u16(code, *index);
            }

            Insn::Method { op, descriptor, .. } => {
                let Operand::Ref(index) = operand else {
                    return Err(overflow("pool operand missing".to_owned()));
                };
                put_u8(code, op.byte());
                put_u16(code, *index);
                if *op == Opcode::Invokeinterface {
                    let slots = argument_slots(descriptor)
                        .map_err(|_| overflow(format!("descriptor `{descriptor}`")))?;
                    put_u8(code, (slots + 1) as u8);
                    put_u8(code, 0);
                }
            }

            Insn::InvokeDynamic(_) => {
                let Operand::Ref(index) = operand else {
                    return Err(overflow("pool operand missing".to_owned()));
                };
                put_u8(code, Opcode::Invokedynamic.byte());
                put_u16(code, *index);
                put_u8(code, 0);
                put_u8(code, 0);
            }

            Insn::Jump { op, target } => {
                let target_pc = resolve(method, positions, *target)? as i64;
                let relative = target_pc - pc as i64;
                if widened {
                    let wide_op = if *op == Opcode::Jsr { Opcode::JsrW } else { Opcode::GotoW };
                    put_u8(code, wide_op.byte());
                    put_i32(code, relative as i32);
                } else {
                    put_u8(code, op.byte());
                    put_u16(code, relative as i16 as u16);
                }
            }

            Insn::Tableswitch { default, low, high, targets } => {
                put_u8(code, Opcode::Tableswitch.byte());
                pad_switch(code, pc);
                let base = pc as i64;
                let default_pc = resolve(method, positions, *default)? as i64;
                put_i32(code, (default_pc - base) as i32);
                put_i32(code, *low);
                put_i32(code, *high);
                for target in targets {
                    let target_pc = resolve(method, positions, *target)? as i64;
                    put_i32(code, (target_pc - base) as i32);
                }
            }

            Insn::Lookupswitch { default, pairs } => {
                put_u8(code, Opcode::Lookupswitch.byte());
                pad_switch(code, pc);
                let base = pc as i64;
                let default_pc = resolve(method, positions, *default)? as i64;
                put_i32(code, (default_pc - base) as i32);
                put_i32(code, pairs.len() as i32);
                for (key, target) in pairs {
                    put_i32(code, *key);
                    let target_pc = resolve(method, positions, *target)? as i64;
                    put_i32(code, (target_pc - base) as i32);
                }
            }

            Insn::NewArray(ty) => {
                put_u8(code, Opcode::Newarray.byte());
                put_u8(code, ty.byte());
            }

            Insn::MultiANewArray { dims, .. } => {
                let Operand::Ref(index) = operand else {
                    return Err(overflow("pool operand missing".to_owned()));
                };
                put_u8(code, Opcode::Multianewarray.byte());
                put_u16(code, *index);
                put_u8(code, *dims);
            }
        }
        Ok(())
    }
}

fn resolve(
    method: &MethodNode,
    positions: &HashMap<LabelId, usize>,
    label: LabelId,
) -> Result<u16, ClassWriteError> {
    match positions.get(&label) {
        Some(&pc) => Ok(pc as u16),
        None => Err(ClassWriteError::MissingLabel {
            method: method.name.clone(),
            label: label.0,
        }),
    }
}

fn pad_switch(code: &mut Vec<u8>, pc: usize) {
    let pad = (4 - ((pc + 1) % 4)) % 4;
    for _ in 0..pad {
        put_u8(code, 0);
    }
}

fn insn_size(insn: &Insn, operand: &Operand, pc: usize, widened: bool) -> usize {
    match insn {
        Insn::Label(_) => 0,
        Insn::Simple(_) => 1,
        Insn::PushInt { op, .. } => {
            if *op == Opcode::Bipush {
                2
            } else {
                3
            }
        }
        Insn::LoadConst(_) => match operand {
            Operand::Const { index, wide_slot } if !*wide_slot && *index <= 0xff => 2,
            _ => 3,
        },
        Insn::Local { op, index } => {
            if *op != Opcode::Ret && *index <= 3 {
                1
            } else if *index <= 0xff {
                2
            } else {
                4
            }
        }
        Insn::Iinc { index, delta } => {
            if *index <= 0xff && i8::try_from(*delta).is_ok() {
                3
            } else {
                6
            }
        }
        Insn::Field { .. } | Insn::Type { .. } => 3,
        Insn::Method { op, .. } => {
            if *op == Opcode::Invokeinterface {
                5
            } else {
                3
            }
        }
        Insn::InvokeDynamic(_) => 5,
        Insn::Jump { .. } => {
            if widened {
                5
            } else {
                3
            }
        }
        Insn::Tableswitch { targets, .. } => {
            let pad = (4 - ((pc + 1) % 4)) % 4;
            1 + pad + 12 + 4 * targets.len()
        }
        Insn::Lookupswitch { pairs, .. } => {
            let pad = (4 - ((pc + 1) % 4)) % 4;
            1 + pad + 8 + 8 * pairs.len()
        }
        Insn::NewArray(_) => 2,
        Insn::MultiANewArray { .. } => 4,
    }
}
