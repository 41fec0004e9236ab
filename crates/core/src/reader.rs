//! Classfile parser.
//!
//! Single entry point [`parse_class`]: raw bytes in, [`ClassNode`] out.
//! Bytecode offsets are converted to labels so the tree can be edited
//! without offset bookkeeping; compact and wide instruction encodings are
//! normalized away. Malformed input is always a typed error, never a
//! panic.

use std::collections::{BTreeMap, HashSet};
use std::io::Cursor;

use byteorder::{BigEndian, ReadBytesExt};
use tracing::trace;

use classweave_utils::errors::ClassReadError;

use crate::desc::{parse_method_descriptor, JType};
use crate::insn::{ArrayType, CallSite, Const, Insn, LabelId};
use crate::node::{
    access, BootstrapMethod, ClassNode, FieldNode, LineNumber, LocalVar, MethodNode,
    RawAttribute, StackMapFrame, TryCatch, VerificationType,
};
use crate::opcode::Opcode;
use crate::pool::{decode_modified_utf8, tag, ConstPool, PoolEntry};

const MAGIC: u32 = 0xcafe_babe;

struct ByteReader<'a> {
    cur: Cursor<&'a [u8]>,
}

impl<'a> ByteReader<'a> {
    fn new(data: &'a [u8]) -> Self {
        Self { cur: Cursor::new(data) }
    }

    fn pos(&self) -> usize {
        self.cur.position() as usize
    }

    fn seek(&mut self, pos: usize) {
        self.cur.set_position(pos as u64);
    }

    fn u8(&mut self) -> Result<u8, ClassReadError> {
        self.cur.read_u8().map_err(|_| self.err_here())
    }

    fn i8(&mut self) -> Result<i8, ClassReadError> {
        self.cur.read_i8().map_err(|_| self.err_here())
    }

    fn u16(&mut self) -> Result<u16, ClassReadError> {
        self.cur.read_u16::<BigEndian>().map_err(|_| self.err_here())
    }

    fn i16(&mut self) -> Result<i16, ClassReadError> {
        self.cur.read_i16::<BigEndian>().map_err(|_| self.err_here())
    }

    fn u32(&mut self) -> Result<u32, ClassReadError> {
        self.cur.read_u32::<BigEndian>().map_err(|_| self.err_here())
    }

    fn i32(&mut self) -> Result<i32, ClassReadError> {
        self.cur.read_i32::<BigEndian>().map_err(|_| self.err_here())
    }

    fn u64(&mut self) -> Result<u64, ClassReadError> {
        self.cur.read_u64::<BigEndian>().map_err(|_| self.err_here())
    }

    fn err_here(&self) -> ClassReadError {
        ClassReadError::UnexpectedEof(self.pos())
    }

    fn bytes(&mut self, len: usize) -> Result<&'a [u8], ClassReadError> {
        let start = self.pos();
        let data = *self.cur.get_ref();
        let end = start
            .checked_add(len)
            .filter(|&e| e <= data.len())
            .ok_or(ClassReadError::UnexpectedEof(start))?;
        self.seek(end);
        Ok(&data[start..end])
    }
}

/// Parses a complete classfile.
pub fn parse_class(data: &[u8]) -> Result<ClassNode, ClassReadError> {
    let mut r = ByteReader::new(data);

    let magic = r.u32()?;
    if magic != MAGIC {
        return Err(ClassReadError::BadMagic(magic));
    }
    let minor_version = r.u16()?;
    let major_version = r.u16()?;

    let pool = parse_pool(&mut r)?;

    let class_access = r.u16()?;
    let this_class = r.u16()?;
    let super_class = r.u16()?;
    let name = pool.class_name(this_class)?.to_owned();
    let super_name = if super_class == 0 {
        None
    } else {
        Some(pool.class_name(super_class)?.to_owned())
    };

    let interface_count = r.u16()?;
    let mut interfaces = Vec::with_capacity(interface_count as usize);
    for _ in 0..interface_count {
        interfaces.push(pool.class_name(r.u16()?)?.to_owned());
    }

    let field_count = r.u16()?;
    let mut fields = Vec::with_capacity(field_count as usize);
    for _ in 0..field_count {
        fields.push(parse_field(&mut r, &pool)?);
    }

    // Method bodies may reference the BootstrapMethods table, which is a
    // class attribute stored *after* them. Record where each method_info
    // starts, skip past the section, parse the class attributes, then come
    // back.
    let method_count = r.u16()?;
    let mut method_offsets = Vec::with_capacity(method_count as usize);
    for _ in 0..method_count {
        method_offsets.push(r.pos());
        skip_member(&mut r)?;
    }
    let mut bootstrap_methods = Vec::new();
    let mut attrs = Vec::new();
    let attr_count = r.u16()?;
    for _ in 0..attr_count {
        let attr_name = pool.utf8(r.u16()?)?.to_owned();
        let len = r.u32()? as usize;
        let body = r.bytes(len)?;
        if attr_name == "BootstrapMethods" {
            bootstrap_methods = parse_bootstrap_methods(body, &pool)?;
        } else {
            attrs.push(RawAttribute { name: attr_name, data: body.to_vec() });
        }
    }

    let mut methods = Vec::with_capacity(method_count as usize);
    for offset in method_offsets {
        r.seek(offset);
        methods.push(parse_method(&mut r, &pool, &name, &bootstrap_methods)?);
    }

    trace!(
        class = %name,
        methods = methods.len(),
        pool_count = pool.count(),
        "parsed class"
    );

    Ok(ClassNode {
        minor_version,
        major_version,
        pool,
        access: class_access,
        name,
        super_name,
        interfaces,
        fields,
        methods,
        bootstrap_methods,
        attrs,
    })
}

fn parse_pool(r: &mut ByteReader<'_>) -> Result<ConstPool, ClassReadError> {
    let count = r.u16()?;
    let mut pool = ConstPool::new();
    let mut index = 1u16;
    while index < count {
        let tag_byte = r.u8()?;
        let entry = match tag_byte {
            tag::UTF8 => {
                let len = r.u16()? as usize;
                let bytes = r.bytes(len)?;
                let s = decode_modified_utf8(bytes)
                    .ok_or(ClassReadError::BadUtf8(index))?;
                PoolEntry::Utf8(s)
            }
            tag::INTEGER => PoolEntry::Integer(r.i32()?),
            tag::FLOAT => PoolEntry::Float(f32::from_bits(r.u32()?)),
            tag::LONG => PoolEntry::Long(r.u64()? as i64),
            tag::DOUBLE => PoolEntry::Double(f64::from_bits(r.u64()?)),
            tag::CLASS => PoolEntry::Class(r.u16()?),
            tag::STRING => PoolEntry::Str(r.u16()?),
            tag::FIELD_REF => PoolEntry::FieldRef { class: r.u16()?, name_and_type: r.u16()? },
            tag::METHOD_REF => PoolEntry::MethodRef { class: r.u16()?, name_and_type: r.u16()? },
            tag::INTERFACE_METHOD_REF => {
                PoolEntry::InterfaceMethodRef { class: r.u16()?, name_and_type: r.u16()? }
            }
            tag::NAME_AND_TYPE => PoolEntry::NameAndType { name: r.u16()?, descriptor: r.u16()? },
            tag::METHOD_HANDLE => PoolEntry::MethodHandle { kind: r.u8()?, reference: r.u16()? },
            tag::METHOD_TYPE => PoolEntry::MethodType(r.u16()?),
            tag::DYNAMIC => PoolEntry::Dynamic { bootstrap: r.u16()?, name_and_type: r.u16()? },
            tag::INVOKE_DYNAMIC => {
                PoolEntry::InvokeDynamic { bootstrap: r.u16()?, name_and_type: r.u16()? }
            }
            tag::MODULE => PoolEntry::Module(r.u16()?),
            tag::PACKAGE => PoolEntry::Package(r.u16()?),
            other => return Err(ClassReadError::BadConstantTag { tag: other, index }),
        };
        index += entry.width();
        pool.push_parsed(entry)
            .map_err(|_| ClassReadError::BadConstantIndex { index, expected: "pool slot" })?;
    }
    Ok(pool)
}

fn parse_field(r: &mut ByteReader<'_>, pool: &ConstPool) -> Result<FieldNode, ClassReadError> {
    let access = r.u16()?;
    let name = pool.utf8(r.u16()?)?.to_owned();
    let descriptor = pool.utf8(r.u16()?)?.to_owned();
    let attr_count = r.u16()?;
    let mut attrs = Vec::with_capacity(attr_count as usize);
    for _ in 0..attr_count {
        let attr_name = pool.utf8(r.u16()?)?.to_owned();
        let len = r.u32()? as usize;
        attrs.push(RawAttribute { name: attr_name, data: r.bytes(len)?.to_vec() });
    }
    Ok(FieldNode { access, name, descriptor, attrs })
}

/// Walks past one field_info/method_info without interpreting it.
fn skip_member(r: &mut ByteReader<'_>) -> Result<(), ClassReadError> {
    r.u16()?; // access
    r.u16()?; // name
    r.u16()?; // descriptor
    let attr_count = r.u16()?;
    for _ in 0..attr_count {
        r.u16()?; // attribute name
        let len = r.u32()? as usize;
        r.bytes(len)?;
    }
    Ok(())
}

fn parse_bootstrap_methods(
    body: &[u8],
    pool: &ConstPool,
) -> Result<Vec<BootstrapMethod>, ClassReadError> {
    let mut r = ByteReader::new(body);
    let count = r.u16()?;
    let mut table = Vec::with_capacity(count as usize);
    for _ in 0..count {
        let handle = pool.method_handle(r.u16()?)?;
        let arg_count = r.u16()?;
        let mut args = Vec::with_capacity(arg_count as usize);
        for _ in 0..arg_count {
            // A dynamic static argument may only reference an earlier table
            // entry, so resolving against the partial table rejects cycles.
            args.push(const_from_pool(pool, r.u16()?, &table)?);
        }
        table.push(BootstrapMethod { handle, args });
    }
    Ok(table)
}

/// Resolves a loadable pool entry into its symbolic form.
fn const_from_pool(
    pool: &ConstPool,
    index: u16,
    bootstrap_methods: &[BootstrapMethod],
) -> Result<Const, ClassReadError> {
    match pool.get(index) {
        Some(PoolEntry::Integer(v)) => Ok(Const::Int(*v)),
        Some(PoolEntry::Float(v)) => Ok(Const::Float(*v)),
        Some(PoolEntry::Long(v)) => Ok(Const::Long(*v)),
        Some(PoolEntry::Double(v)) => Ok(Const::Double(*v)),
        Some(PoolEntry::Str(utf8)) => Ok(Const::Str(pool.utf8(*utf8)?.to_owned())),
        Some(PoolEntry::Class(utf8)) => Ok(Const::Class(pool.utf8(*utf8)?.to_owned())),
        Some(PoolEntry::MethodHandle { .. }) => {
            Ok(Const::MethodHandle(pool.method_handle(index)?))
        }
        Some(PoolEntry::MethodType(utf8)) => Ok(Const::MethodType(pool.utf8(*utf8)?.to_owned())),
        Some(PoolEntry::Dynamic { bootstrap, name_and_type }) => {
            let bsm = bootstrap_methods.get(*bootstrap as usize).ok_or(
                ClassReadError::BadConstantIndex { index, expected: "bootstrap method" },
            )?;
            let (name, descriptor) = pool.name_and_type(*name_and_type)?;
            Ok(Const::Dynamic(Box::new(CallSite {
                name: name.to_owned(),
                descriptor: descriptor.to_owned(),
                bootstrap: bsm.handle.clone(),
                args: bsm.args.clone(),
            })))
        }
        _ => Err(ClassReadError::BadConstantIndex { index, expected: "loadable constant" }),
    }
}

// ---- method & code -------------------------------------------------------

struct CodeParser<'a> {
    pool: &'a ConstPool,
    bootstrap_methods: &'a [BootstrapMethod],
    labels: BTreeMap<usize, LabelId>,
    next_label: u32,
}

impl CodeParser<'_> {
    fn label_at(&mut self, offset: usize) -> LabelId {
        if let Some(&l) = self.labels.get(&offset) {
            return l;
        }
        let l = LabelId(self.next_label);
        self.next_label += 1;
        self.labels.insert(offset, l);
        l
    }

    fn branch_target(
        &mut self,
        insn_offset: usize,
        relative: i64,
        code_len: usize,
    ) -> Result<LabelId, ClassReadError> {
        let target = insn_offset as i64 + relative;
        if target < 0 || target as usize >= code_len {
            return Err(ClassReadError::BadBranchTarget {
                offset: insn_offset,
                target: target.max(0) as usize,
            });
        }
        Ok(self.label_at(target as usize))
    }
}

fn parse_method(
    r: &mut ByteReader<'_>,
    pool: &ConstPool,
    class_name: &str,
    bootstrap_methods: &[BootstrapMethod],
) -> Result<MethodNode, ClassReadError> {
    let method_access = r.u16()?;
    let name = pool.utf8(r.u16()?)?.to_owned();
    let descriptor = pool.utf8(r.u16()?)?.to_owned();

    let mut method = MethodNode::new(method_access, name, descriptor);

    let attr_count = r.u16()?;
    for _ in 0..attr_count {
        let attr_name = pool.utf8(r.u16()?)?.to_owned();
        let len = r.u32()? as usize;
        let body = r.bytes(len)?;
        if attr_name == "Code" {
            parse_code(body, pool, class_name, bootstrap_methods, &mut method)?;
        } else {
            method.attrs.push(RawAttribute { name: attr_name, data: body.to_vec() });
        }
    }
    Ok(method)
}

fn parse_code(
    body: &[u8],
    pool: &ConstPool,
    class_name: &str,
    bootstrap_methods: &[BootstrapMethod],
    method: &mut MethodNode,
) -> Result<(), ClassReadError> {
    let mut r = ByteReader::new(body);
    method.max_stack = r.u16()?;
    method.max_locals = r.u16()?;
    let code_len = r.u32()? as usize;
    let code = r.bytes(code_len)?;

    let mut parser = CodeParser {
        pool,
        bootstrap_methods,
        labels: BTreeMap::new(),
        next_label: 0,
    };

    let mut decoded: Vec<(usize, Insn)> = Vec::new();
    let mut boundaries: HashSet<usize> = HashSet::new();
    let mut c = ByteReader::new(code);
    while c.pos() < code_len {
        let offset = c.pos();
        boundaries.insert(offset);
        let insn = decode_insn(&mut c, &mut parser, offset, code_len)?;
        decoded.push((offset, insn));
    }

    // Exception table.
    let handler_count = r.u16()?;
    for _ in 0..handler_count {
        let start = parser.label_at(r.u16()? as usize);
        let end = parser.label_at(r.u16()? as usize);
        let handler = parser.label_at(r.u16()? as usize);
        let catch_index = r.u16()?;
        let catch_type = if catch_index == 0 {
            None
        } else {
            Some(pool.class_name(catch_index)?.to_owned())
        };
        method.try_catches.push(TryCatch { start, end, handler, catch_type });
    }

    // Code sub-attributes.
    let attr_count = r.u16()?;
    for _ in 0..attr_count {
        let attr_name = pool.utf8(r.u16()?)?.to_owned();
        let len = r.u32()? as usize;
        let body = r.bytes(len)?;
        match attr_name.as_str() {
            "LineNumberTable" => {
                let mut a = ByteReader::new(body);
                let count = a.u16()?;
                for _ in 0..count {
                    let start = parser.label_at(a.u16()? as usize);
                    let line = a.u16()?;
                    method.line_numbers.push(LineNumber { start, line });
                }
            }
            "LocalVariableTable" => {
                let mut a = ByteReader::new(body);
                let count = a.u16()?;
                for _ in 0..count {
                    let start_pc = a.u16()? as usize;
                    let length = a.u16()? as usize;
                    let var_name = pool.utf8(a.u16()?)?.to_owned();
                    let var_desc = pool.utf8(a.u16()?)?.to_owned();
                    let index = a.u16()?;
                    method.local_vars.push(LocalVar {
                        start: parser.label_at(start_pc),
                        end: parser.label_at(start_pc + length),
                        name: var_name,
                        descriptor: var_desc,
                        index,
                    });
                }
            }
            "StackMapTable" => {
                let frames = parse_stack_map_table(body, pool, class_name, method, &mut parser)?;
                method.frames = frames;
            }
            _ => {
                method.code_attrs.push(RawAttribute { name: attr_name, data: body.to_vec() });
            }
        }
    }

    // Every labeled offset must be an instruction boundary (or the end of
    // the code array, which handler/variable ranges may name).
    for (&offset, _) in &parser.labels {
        if offset != code_len && !boundaries.contains(&offset) {
            return Err(ClassReadError::BadBranchTarget { offset: 0, target: offset });
        }
    }

    // Weave label pseudo-instructions into the decoded stream.
    let mut labels = parser.labels.iter().peekable();
    let mut instructions = Vec::with_capacity(decoded.len() + parser.labels.len());
    for (offset, insn) in decoded {
        while let Some((&label_offset, &label)) = labels.peek() {
            if label_offset <= offset {
                instructions.push(Insn::Label(label));
                labels.next();
            } else {
                break;
            }
        }
        instructions.push(insn);
    }
    for (_, &label) in labels {
        instructions.push(Insn::Label(label));
    }

    method.instructions = instructions;
    method.reserve_labels(parser.next_label);
    Ok(())
}

fn decode_insn(
    c: &mut ByteReader<'_>,
    parser: &mut CodeParser<'_>,
    offset: usize,
    code_len: usize,
) -> Result<Insn, ClassReadError> {
    let byte = c.u8()?;
    let op = Opcode::from_byte(byte)
        .ok_or(ClassReadError::BadOpcode { opcode: byte, offset })?;

    let insn = match op {
        Opcode::Bipush => Insn::PushInt { op, value: c.i8()? as i32 },
        Opcode::Sipush => Insn::PushInt { op, value: c.i16()? as i32 },

        Opcode::Ldc => load_const(parser, c.u8()? as u16)?,
        Opcode::LdcW | Opcode::Ldc2W => load_const(parser, c.u16()?)?,

        Opcode::Iload | Opcode::Lload | Opcode::Fload | Opcode::Dload | Opcode::Aload
        | Opcode::Istore | Opcode::Lstore | Opcode::Fstore | Opcode::Dstore | Opcode::Astore
        | Opcode::Ret => Insn::Local { op, index: c.u8()? as u16 },

        // iload_0 .. aload_3 and istore_0 .. astore_3: normalize.
        _ if (0x1a..=0x2d).contains(&byte) => {
            let rel = byte - 0x1a;
            let base = [Opcode::Iload, Opcode::Lload, Opcode::Fload, Opcode::Dload, Opcode::Aload]
                [(rel / 4) as usize];
            Insn::Local { op: base, index: (rel % 4) as u16 }
        }
        _ if (0x3b..=0x4e).contains(&byte) => {
            let rel = byte - 0x3b;
            let base =
                [Opcode::Istore, Opcode::Lstore, Opcode::Fstore, Opcode::Dstore, Opcode::Astore]
                    [(rel / 4) as usize];
            Insn::Local { op: base, index: (rel % 4) as u16 }
        }

        Opcode::Iinc => Insn::Iinc { index: c.u8()? as u16, delta: c.i8()? as i16 },

        Opcode::Wide => {
            let wide_byte = c.u8()?;
            let wide_op = Opcode::from_byte(wide_byte)
                .ok_or(ClassReadError::BadOpcode { opcode: wide_byte, offset })?;
            match wide_op {
                Opcode::Iload | Opcode::Lload | Opcode::Fload | Opcode::Dload | Opcode::Aload
                | Opcode::Istore | Opcode::Lstore | Opcode::Fstore | Opcode::Dstore
                | Opcode::Astore | Opcode::Ret => {
                    Insn::Local { op: wide_op, index: c.u16()? }
                }
                Opcode::Iinc => Insn::Iinc { index: c.u16()?, delta: c.i16()? },
                _ => return Err(ClassReadError::BadOpcode { opcode: wide_byte, offset }),
            }
        }

        Opcode::Getstatic | Opcode::Putstatic | Opcode::Getfield | Opcode::Putfield => {
            let (owner, name, descriptor, _) = parser.pool.member_ref(c.u16()?)?;
            Insn::Field {
                op,
                owner: owner.to_owned(),
                name: name.to_owned(),
                descriptor: descriptor.to_owned(),
            }
        }

        Opcode::Invokevirtual | Opcode::Invokespecial | Opcode::Invokestatic => {
            let (owner, name, descriptor, interface) = parser.pool.member_ref(c.u16()?)?;
            Insn::Method {
                op,
                owner: owner.to_owned(),
                name: name.to_owned(),
                descriptor: descriptor.to_owned(),
                interface,
            }
        }
        Opcode::Invokeinterface => {
            let (owner, name, descriptor, _) = parser.pool.member_ref(c.u16()?)?;
            c.u8()?; // count, reconstructible from the descriptor
            c.u8()?; // zero
            Insn::Method {
                op,
                owner: owner.to_owned(),
                name: name.to_owned(),
                descriptor: descriptor.to_owned(),
                interface: true,
            }
        }
        Opcode::Invokedynamic => {
            let index = c.u16()?;
            c.u8()?;
            c.u8()?;
            let (bootstrap, name_and_type) = match parser.pool.get(index) {
                Some(PoolEntry::InvokeDynamic { bootstrap, name_and_type }) => {
                    (*bootstrap, *name_and_type)
                }
                _ => {
                    return Err(ClassReadError::BadConstantIndex {
                        index,
                        expected: "InvokeDynamic",
                    })
                }
            };
            let bsm = parser.bootstrap_methods.get(bootstrap as usize).ok_or(
                ClassReadError::BadConstantIndex { index, expected: "bootstrap method" },
            )?;
            let (name, descriptor) = parser.pool.name_and_type(name_and_type)?;
            Insn::InvokeDynamic(CallSite {
                name: name.to_owned(),
                descriptor: descriptor.to_owned(),
                bootstrap: bsm.handle.clone(),
                args: bsm.args.clone(),
            })
        }

        _ if op.is_conditional_branch() || op == Opcode::Goto || op == Opcode::Jsr => {
            let relative = c.i16()? as i64;
            Insn::Jump { op, target: parser.branch_target(offset, relative, code_len)? }
        }
        Opcode::GotoW | Opcode::JsrW => {
            let relative = c.i32()? as i64;
            let narrow = if op == Opcode::GotoW { Opcode::Goto } else { Opcode::Jsr };
            Insn::Jump { op: narrow, target: parser.branch_target(offset, relative, code_len)? }
        }

        Opcode::Tableswitch => {
            skip_switch_padding(c, offset)?;
            let default = parser.branch_target(offset, c.i32()? as i64, code_len)?;
            let low = c.i32()?;
            let high = c.i32()?;
            if high < low {
                return Err(ClassReadError::BadBranchTarget { offset, target: high as usize });
            }
            let count = (high as i64 - low as i64 + 1) as usize;
            let mut targets = Vec::with_capacity(count);
            for _ in 0..count {
                targets.push(parser.branch_target(offset, c.i32()? as i64, code_len)?);
            }
            Insn::Tableswitch { default, low, high, targets }
        }
        Opcode::Lookupswitch => {
            skip_switch_padding(c, offset)?;
            let default = parser.branch_target(offset, c.i32()? as i64, code_len)?;
            let npairs = c.i32()?;
            if npairs < 0 {
                return Err(ClassReadError::BadBranchTarget { offset, target: 0 });
            }
            let mut pairs = Vec::with_capacity(npairs as usize);
            for _ in 0..npairs {
                let key = c.i32()?;
                let target = parser.branch_target(offset, c.i32()? as i64, code_len)?;
                pairs.push((key, target));
            }
            Insn::Lookupswitch { default, pairs }
        }

        Opcode::New | Opcode::Anewarray | Opcode::Checkcast | Opcode::Instanceof => {
            let class_name = parser.pool.class_name(c.u16()?)?.to_owned();
            Insn::Type { op, class_name }
        }
        Opcode::Newarray => {
            let atype = c.u8()?;
            let ty = ArrayType::from_byte(atype)
                .ok_or(ClassReadError::BadOpcode { opcode: atype, offset })?;
            Insn::NewArray(ty)
        }
        Opcode::Multianewarray => {
            let descriptor = parser.pool.class_name(c.u16()?)?.to_owned();
            let dims = c.u8()?;
            Insn::MultiANewArray { descriptor, dims }
        }

        // Everything else carries no operands.
        _ => Insn::Simple(op),
    };
    Ok(insn)
}

fn load_const(parser: &mut CodeParser<'_>, index: u16) -> Result<Insn, ClassReadError> {
    Ok(Insn::LoadConst(const_from_pool(parser.pool, index, parser.bootstrap_methods)?))
}

fn skip_switch_padding(c: &mut ByteReader<'_>, offset: usize) -> Result<(), ClassReadError> {
    let pad = (4 - ((offset + 1) % 4)) % 4;
    let _ = c.bytes(pad)?;
    Ok(())
}

// ---- stack map table -----------------------------------------------------

fn parse_stack_map_table(
    body: &[u8],
    pool: &ConstPool,
    class_name: &str,
    method: &MethodNode,
    parser: &mut CodeParser<'_>,
) -> Result<Vec<StackMapFrame>, ClassReadError> {
    let mut r = ByteReader::new(body);
    let count = r.u16()?;

    let mut locals = initial_locals(class_name, method)?;
    let mut frames = Vec::with_capacity(count as usize);
    let mut offset: i64 = -1;

    for _ in 0..count {
        let frame_type = r.u8()?;
        let (delta, stack) = match frame_type {
            0..=63 => (frame_type as u16, Vec::new()),
            64..=127 => {
                let vt = parse_verification_type(&mut r, pool, parser)?;
                (frame_type as u16 - 64, vec![vt])
            }
            247 => {
                let delta = r.u16()?;
                let vt = parse_verification_type(&mut r, pool, parser)?;
                (delta, vec![vt])
            }
            248..=250 => {
                let delta = r.u16()?;
                let chop = 251 - frame_type as usize;
                let keep = locals.len().saturating_sub(chop);
                locals.truncate(keep);
                (delta, Vec::new())
            }
            251 => (r.u16()?, Vec::new()),
            252..=254 => {
                let delta = r.u16()?;
                for _ in 0..(frame_type - 251) {
                    let vt = parse_verification_type(&mut r, pool, parser)?;
                    locals.push(vt);
                }
                (delta, Vec::new())
            }
            255 => {
                let delta = r.u16()?;
                let nlocals = r.u16()?;
                let mut new_locals = Vec::with_capacity(nlocals as usize);
                for _ in 0..nlocals {
                    new_locals.push(parse_verification_type(&mut r, pool, parser)?);
                }
                locals = new_locals;
                let nstack = r.u16()?;
                let mut stack = Vec::with_capacity(nstack as usize);
                for _ in 0..nstack {
                    stack.push(parse_verification_type(&mut r, pool, parser)?);
                }
                (delta, stack)
            }
            other => {
                return Err(ClassReadError::BadAttributeLength(format!(
                    "StackMapTable frame type {other}"
                )))
            }
        };

        offset += delta as i64 + 1;
        frames.push(StackMapFrame {
            at: parser.label_at(offset as usize),
            locals: locals.clone(),
            stack,
        });
    }
    Ok(frames)
}

fn parse_verification_type(
    r: &mut ByteReader<'_>,
    pool: &ConstPool,
    parser: &mut CodeParser<'_>,
) -> Result<VerificationType, ClassReadError> {
    Ok(match r.u8()? {
        0 => VerificationType::Top,
        1 => VerificationType::Integer,
        2 => VerificationType::Float,
        3 => VerificationType::Double,
        4 => VerificationType::Long,
        5 => VerificationType::Null,
        6 => VerificationType::UninitializedThis,
        7 => VerificationType::Object(pool.class_name(r.u16()?)?.to_owned()),
        8 => VerificationType::Uninitialized(parser.label_at(r.u16()? as usize)),
        other => {
            return Err(ClassReadError::BadAttributeLength(format!(
                "verification type tag {other}"
            )))
        }
    })
}

/// The implicit frame at method entry: `this` (or uninitializedThis in a
/// constructor) followed by the argument types.
fn initial_locals(
    class_name: &str,
    method: &MethodNode,
) -> Result<Vec<VerificationType>, ClassReadError> {
    let mut locals = Vec::new();
    if method.access & access::ACC_STATIC == 0 {
        if method.name == "<init>" {
            locals.push(VerificationType::UninitializedThis);
        } else {
            locals.push(VerificationType::Object(class_name.to_owned()));
        }
    }
    let (args, _) = parse_method_descriptor(&method.descriptor)?;
    for arg in args {
        locals.push(match arg {
            JType::Boolean | JType::Byte | JType::Char | JType::Short | JType::Int => {
                VerificationType::Integer
            }
            JType::Long => VerificationType::Long,
            JType::Float => VerificationType::Float,
            JType::Double => VerificationType::Double,
            JType::Object(name) => VerificationType::Object(name),
            JType::Array(desc) => VerificationType::Object(desc),
        });
    }
    Ok(locals)
}
