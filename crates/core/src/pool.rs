//! The classfile constant pool.
//!
//! A parsed pool is retained verbatim and is append-only: attributes we
//! carry as raw bytes keep their indices valid, and new symbolic references
//! introduced by transformers are interned at the end with deduplication
//! against everything already present.

use std::collections::HashMap;
use std::fmt;

use classweave_utils::errors::{ClassReadError, ClassWriteError};

use crate::insn::{Handle, HandleKind};

/// Constant pool tags (JVMS table 4.4-B).
pub mod tag {
    pub const UTF8: u8 = 1;
    pub const INTEGER: u8 = 3;
    pub const FLOAT: u8 = 4;
    pub const LONG: u8 = 5;
    pub const DOUBLE: u8 = 6;
    pub const CLASS: u8 = 7;
    pub const STRING: u8 = 8;
    pub const FIELD_REF: u8 = 9;
    pub const METHOD_REF: u8 = 10;
    pub const INTERFACE_METHOD_REF: u8 = 11;
    pub const NAME_AND_TYPE: u8 = 12;
    pub const METHOD_HANDLE: u8 = 15;
    pub const METHOD_TYPE: u8 = 16;
    pub const DYNAMIC: u8 = 17;
    pub const INVOKE_DYNAMIC: u8 = 18;
    pub const MODULE: u8 = 19;
    pub const PACKAGE: u8 = 20;
}

/// One constant pool entry. Cross-references are raw pool indices.
#[derive(Debug, Clone, PartialEq)]
pub enum PoolEntry {
    Utf8(String),
    Integer(i32),
    Float(f32),
    Long(i64),
    Double(f64),
    Class(u16),
    Str(u16),
    FieldRef { class: u16, name_and_type: u16 },
    MethodRef { class: u16, name_and_type: u16 },
    InterfaceMethodRef { class: u16, name_and_type: u16 },
    NameAndType { name: u16, descriptor: u16 },
    MethodHandle { kind: u8, reference: u16 },
    MethodType(u16),
    Dynamic { bootstrap: u16, name_and_type: u16 },
    InvokeDynamic { bootstrap: u16, name_and_type: u16 },
    Module(u16),
    Package(u16),
}

impl PoolEntry {
    /// Long and Double take two pool slots.
    pub fn width(&self) -> u16 {
        match self {
            PoolEntry::Long(_) | PoolEntry::Double(_) => 2,
            _ => 1,
        }
    }
}

impl fmt::Display for PoolEntry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            PoolEntry::Utf8(s) => write!(f, "Utf8 {s:?}"),
            PoolEntry::Integer(v) => write!(f, "Integer {v}"),
            PoolEntry::Float(v) => write!(f, "Float {v}"),
            PoolEntry::Long(v) => write!(f, "Long {v}"),
            PoolEntry::Double(v) => write!(f, "Double {v}"),
            PoolEntry::Class(i) => write!(f, "Class #{i}"),
            PoolEntry::Str(i) => write!(f, "String #{i}"),
            PoolEntry::FieldRef { class, name_and_type } => {
                write!(f, "Fieldref #{class}.#{name_and_type}")
            }
            PoolEntry::MethodRef { class, name_and_type } => {
                write!(f, "Methodref #{class}.#{name_and_type}")
            }
            PoolEntry::InterfaceMethodRef { class, name_and_type } => {
                write!(f, "InterfaceMethodref #{class}.#{name_and_type}")
            }
            PoolEntry::NameAndType { name, descriptor } => {
                write!(f, "NameAndType #{name}:#{descriptor}")
            }
            PoolEntry::MethodHandle { kind, reference } => {
                write!(f, "MethodHandle {kind}:#{reference}")
            }
            PoolEntry::MethodType(i) => write!(f, "MethodType #{i}"),
            PoolEntry::Dynamic { bootstrap, name_and_type } => {
                write!(f, "Dynamic bsm#{bootstrap}.#{name_and_type}")
            }
            PoolEntry::InvokeDynamic { bootstrap, name_and_type } => {
                write!(f, "InvokeDynamic bsm#{bootstrap}.#{name_and_type}")
            }
            PoolEntry::Module(i) => write!(f, "Module #{i}"),
            PoolEntry::Package(i) => write!(f, "Package #{i}"),
        }
    }
}

/// The pool itself: slot 0 is unused, the slot after a Long/Double is a
/// `None` placeholder, exactly as the format counts indices.
#[derive(Debug, Clone, Default)]
pub struct ConstPool {
    entries: Vec<Option<PoolEntry>>,
    utf8s: HashMap<String, u16>,
    classes: HashMap<u16, u16>,
    strings: HashMap<u16, u16>,
    integers: HashMap<i32, u16>,
    floats: HashMap<[u8; 4], u16>,
    longs: HashMap<i64, u16>,
    doubles: HashMap<[u8; 8], u16>,
    name_and_types: HashMap<(u16, u16), u16>,
    field_refs: HashMap<(u16, u16), u16>,
    method_refs: HashMap<(u16, u16, bool), u16>,
    method_handles: HashMap<(u8, u16), u16>,
    method_types: HashMap<u16, u16>,
    invoke_dynamics: HashMap<(u16, u16), u16>,
    dynamics: HashMap<(u16, u16), u16>,
}

impl ConstPool {
    pub fn new() -> Self {
        Self {
            entries: vec![None],
            ..Self::default()
        }
    }

    /// Number of index slots, including slot 0; the value the classfile
    /// header calls `constant_pool_count`.
    pub fn count(&self) -> u16 {
        self.entries.len() as u16
    }

    pub fn get(&self, index: u16) -> Option<&PoolEntry> {
        self.entries.get(index as usize).and_then(Option::as_ref)
    }

    /// Appends an entry parsed from an existing classfile, registering it
    /// in the dedup maps so later interning reuses it.
    pub(crate) fn push_parsed(&mut self, entry: PoolEntry) -> Result<u16, ClassWriteError> {
        self.push(entry)
    }

    pub fn entries(&self) -> impl Iterator<Item = (u16, &PoolEntry)> {
        self.entries
            .iter()
            .enumerate()
            .filter_map(|(i, e)| e.as_ref().map(|e| (i as u16, e)))
    }

    fn push(&mut self, entry: PoolEntry) -> Result<u16, ClassWriteError> {
        let index = self.entries.len();
        let width = entry.width();
        if index + width as usize > u16::MAX as usize + 1 {
            return Err(ClassWriteError::ConstantPoolOverflow(index));
        }
        let index = index as u16;
        self.register(index, &entry);
        self.entries.push(Some(entry));
        if width == 2 {
            self.entries.push(None);
        }
        Ok(index)
    }

    fn register(&mut self, index: u16, entry: &PoolEntry) {
        match entry {
            PoolEntry::Utf8(s) => {
                self.utf8s.entry(s.clone()).or_insert(index);
            }
            PoolEntry::Integer(v) => {
                self.integers.entry(*v).or_insert(index);
            }
            PoolEntry::Float(v) => {
                self.floats.entry(v.to_be_bytes()).or_insert(index);
            }
            PoolEntry::Long(v) => {
                self.longs.entry(*v).or_insert(index);
            }
            PoolEntry::Double(v) => {
                self.doubles.entry(v.to_be_bytes()).or_insert(index);
            }
            PoolEntry::Class(name) => {
                self.classes.entry(*name).or_insert(index);
            }
            PoolEntry::Str(utf8) => {
                self.strings.entry(*utf8).or_insert(index);
            }
            PoolEntry::FieldRef { class, name_and_type } => {
                self.field_refs.entry((*class, *name_and_type)).or_insert(index);
            }
            PoolEntry::MethodRef { class, name_and_type } => {
                self.method_refs
                    .entry((*class, *name_and_type, false))
                    .or_insert(index);
            }
            PoolEntry::InterfaceMethodRef { class, name_and_type } => {
                self.method_refs
                    .entry((*class, *name_and_type, true))
                    .or_insert(index);
            }
            PoolEntry::NameAndType { name, descriptor } => {
                self.name_and_types.entry((*name, *descriptor)).or_insert(index);
            }
            PoolEntry::MethodHandle { kind, reference } => {
                self.method_handles.entry((*kind, *reference)).or_insert(index);
            }
            PoolEntry::MethodType(desc) => {
                self.method_types.entry(*desc).or_insert(index);
            }
            PoolEntry::InvokeDynamic { bootstrap, name_and_type } => {
                self.invoke_dynamics
                    .entry((*bootstrap, *name_and_type))
                    .or_insert(index);
            }
            PoolEntry::Dynamic { bootstrap, name_and_type } => {
                self.dynamics
                    .entry((*bootstrap, *name_and_type))
                    .or_insert(index);
            }
            // Module/Package entries are carried through but never interned.
            PoolEntry::Module(_) | PoolEntry::Package(_) => {}
        }
    }

    // ---- typed read accessors -------------------------------------------

    pub fn utf8(&self, index: u16) -> Result<&str, ClassReadError> {
        match self.get(index) {
            Some(PoolEntry::Utf8(s)) => Ok(s),
            _ => Err(ClassReadError::BadConstantIndex { index, expected: "Utf8" }),
        }
    }

    pub fn class_name(&self, index: u16) -> Result<&str, ClassReadError> {
        match self.get(index) {
            Some(PoolEntry::Class(name)) => self.utf8(*name),
            _ => Err(ClassReadError::BadConstantIndex { index, expected: "Class" }),
        }
    }

    pub fn name_and_type(&self, index: u16) -> Result<(&str, &str), ClassReadError> {
        match self.get(index) {
            Some(PoolEntry::NameAndType { name, descriptor }) => {
                Ok((self.utf8(*name)?, self.utf8(*descriptor)?))
            }
            _ => Err(ClassReadError::BadConstantIndex {
                index,
                expected: "NameAndType",
            }),
        }
    }

    /// Resolves a Fieldref/Methodref/InterfaceMethodref into
    /// `(owner, name, descriptor, is_interface)`.
    pub fn member_ref(
        &self,
        index: u16,
    ) -> Result<(&str, &str, &str, bool), ClassReadError> {
        let (class, nt, interface) = match self.get(index) {
            Some(PoolEntry::FieldRef { class, name_and_type }) => {
                (*class, *name_and_type, false)
            }
            Some(PoolEntry::MethodRef { class, name_and_type }) => {
                (*class, *name_and_type, false)
            }
            Some(PoolEntry::InterfaceMethodRef { class, name_and_type }) => {
                (*class, *name_and_type, true)
            }
            _ => {
                return Err(ClassReadError::BadConstantIndex {
                    index,
                    expected: "Fieldref/Methodref",
                })
            }
        };
        let owner = self.class_name(class)?;
        let (name, desc) = self.name_and_type(nt)?;
        Ok((owner, name, desc, interface))
    }

    pub fn method_handle(&self, index: u16) -> Result<Handle, ClassReadError> {
        match self.get(index) {
            Some(PoolEntry::MethodHandle { kind, reference }) => {
                let kind = HandleKind::from_byte(*kind).ok_or(
                    ClassReadError::BadConstantIndex {
                        index,
                        expected: "MethodHandle kind",
                    },
                )?;
                let (owner, name, descriptor, interface) = self.member_ref(*reference)?;
                Ok(Handle {
                    kind,
                    owner: owner.to_owned(),
                    name: name.to_owned(),
                    descriptor: descriptor.to_owned(),
                    interface,
                })
            }
            _ => Err(ClassReadError::BadConstantIndex {
                index,
                expected: "MethodHandle",
            }),
        }
    }

    // ---- get-or-insert interning ----------------------------------------

    pub fn intern_utf8(&mut self, value: &str) -> Result<u16, ClassWriteError> {
        if let Some(&idx) = self.utf8s.get(value) {
            return Ok(idx);
        }
        self.push(PoolEntry::Utf8(value.to_owned()))
    }

    pub fn intern_integer(&mut self, value: i32) -> Result<u16, ClassWriteError> {
        if let Some(&idx) = self.integers.get(&value) {
            return Ok(idx);
        }
        self.push(PoolEntry::Integer(value))
    }

    pub fn intern_float(&mut self, value: f32) -> Result<u16, ClassWriteError> {
        if let Some(&idx) = self.floats.get(&value.to_be_bytes()) {
            return Ok(idx);
        }
        self.push(PoolEntry::Float(value))
    }

    pub fn intern_long(&mut self, value: i64) -> Result<u16, ClassWriteError> {
        if let Some(&idx) = self.longs.get(&value) {
            return Ok(idx);
        }
        self.push(PoolEntry::Long(value))
    }

    pub fn intern_double(&mut self, value: f64) -> Result<u16, ClassWriteError> {
        if let Some(&idx) = self.doubles.get(&value.to_be_bytes()) {
            return Ok(idx);
        }
        self.push(PoolEntry::Double(value))
    }

    pub fn intern_class(&mut self, name: &str) -> Result<u16, ClassWriteError> {
        let utf8 = self.intern_utf8(name)?;
        if let Some(&idx) = self.classes.get(&utf8) {
            return Ok(idx);
        }
        self.push(PoolEntry::Class(utf8))
    }

    pub fn intern_string(&mut self, value: &str) -> Result<u16, ClassWriteError> {
        let utf8 = self.intern_utf8(value)?;
        if let Some(&idx) = self.strings.get(&utf8) {
            return Ok(idx);
        }
        self.push(PoolEntry::Str(utf8))
    }

    pub fn intern_name_and_type(
        &mut self,
        name: &str,
        descriptor: &str,
    ) -> Result<u16, ClassWriteError> {
        let name = self.intern_utf8(name)?;
        let descriptor = self.intern_utf8(descriptor)?;
        if let Some(&idx) = self.name_and_types.get(&(name, descriptor)) {
            return Ok(idx);
        }
        self.push(PoolEntry::NameAndType { name, descriptor })
    }

    pub fn intern_field_ref(
        &mut self,
        owner: &str,
        name: &str,
        descriptor: &str,
    ) -> Result<u16, ClassWriteError> {
        let class = self.intern_class(owner)?;
        let nt = self.intern_name_and_type(name, descriptor)?;
        if let Some(&idx) = self.field_refs.get(&(class, nt)) {
            return Ok(idx);
        }
        self.push(PoolEntry::FieldRef { class, name_and_type: nt })
    }

    pub fn intern_method_ref(
        &mut self,
        owner: &str,
        name: &str,
        descriptor: &str,
        interface: bool,
    ) -> Result<u16, ClassWriteError> {
        let class = self.intern_class(owner)?;
        let nt = self.intern_name_and_type(name, descriptor)?;
        if let Some(&idx) = self.method_refs.get(&(class, nt, interface)) {
            return Ok(idx);
        }
        if interface {
            self.push(PoolEntry::InterfaceMethodRef { class, name_and_type: nt })
        } else {
            self.push(PoolEntry::MethodRef { class, name_and_type: nt })
        }
    }

    pub fn intern_method_type(&mut self, descriptor: &str) -> Result<u16, ClassWriteError> {
        let utf8 = self.intern_utf8(descriptor)?;
        if let Some(&idx) = self.method_types.get(&utf8) {
            return Ok(idx);
        }
        self.push(PoolEntry::MethodType(utf8))
    }

    pub fn intern_method_handle(&mut self, handle: &Handle) -> Result<u16, ClassWriteError> {
        let reference = if handle.kind.refers_to_field() {
            self.intern_field_ref(&handle.owner, &handle.name, &handle.descriptor)?
        } else {
            self.intern_method_ref(
                &handle.owner,
                &handle.name,
                &handle.descriptor,
                handle.interface,
            )?
        };
        let kind = handle.kind.byte();
        if let Some(&idx) = self.method_handles.get(&(kind, reference)) {
            return Ok(idx);
        }
        self.push(PoolEntry::MethodHandle { kind, reference })
    }

    pub fn intern_invoke_dynamic(
        &mut self,
        bootstrap: u16,
        name: &str,
        descriptor: &str,
    ) -> Result<u16, ClassWriteError> {
        let nt = self.intern_name_and_type(name, descriptor)?;
        if let Some(&idx) = self.invoke_dynamics.get(&(bootstrap, nt)) {
            return Ok(idx);
        }
        self.push(PoolEntry::InvokeDynamic { bootstrap, name_and_type: nt })
    }

    pub fn intern_dynamic(
        &mut self,
        bootstrap: u16,
        name: &str,
        descriptor: &str,
    ) -> Result<u16, ClassWriteError> {
        let nt = self.intern_name_and_type(name, descriptor)?;
        if let Some(&idx) = self.dynamics.get(&(bootstrap, nt)) {
            return Ok(idx);
        }
        self.push(PoolEntry::Dynamic { bootstrap, name_and_type: nt })
    }
}

// ---- modified UTF-8 ------------------------------------------------------

/// Decodes the classfile's modified UTF-8 (JVMS §4.4.7): embedded nulls are
/// `C0 80`, supplementary characters are encoded as surrogate pairs of
/// three-byte sequences.
pub fn decode_modified_utf8(bytes: &[u8]) -> Option<String> {
    let mut out = String::with_capacity(bytes.len());
    let mut units: Vec<u16> = Vec::with_capacity(bytes.len());
    let mut i = 0;
    while i < bytes.len() {
        let b = bytes[i];
        if b & 0x80 == 0 {
            if b == 0 {
                return None;
            }
            units.push(b as u16);
            i += 1;
        } else if b & 0xe0 == 0xc0 {
            let b2 = *bytes.get(i + 1)?;
            if b2 & 0xc0 != 0x80 {
                return None;
            }
            units.push((((b & 0x1f) as u16) << 6) | (b2 & 0x3f) as u16);
            i += 2;
        } else if b & 0xf0 == 0xe0 {
            let b2 = *bytes.get(i + 1)?;
            let b3 = *bytes.get(i + 2)?;
            if b2 & 0xc0 != 0x80 || b3 & 0xc0 != 0x80 {
                return None;
            }
            units.push(
                (((b & 0x0f) as u16) << 12) | (((b2 & 0x3f) as u16) << 6) | (b3 & 0x3f) as u16,
            );
            i += 3;
        } else {
            return None;
        }
    }
    // Combine surrogate pairs; unpaired surrogates are replaced, which is
    // as close as a Rust String can represent them.
    let mut iter = units.into_iter().peekable();
    while let Some(u) = iter.next() {
        match u {
            0xd800..=0xdbff => match iter.peek() {
                Some(&lo) if (0xdc00..=0xdfff).contains(&lo) => {
                    iter.next();
                    let c = 0x10000 + (((u - 0xd800) as u32) << 10) + (lo - 0xdc00) as u32;
                    out.push(char::from_u32(c)?);
                }
                _ => out.push('\u{fffd}'),
            },
            0xdc00..=0xdfff => out.push('\u{fffd}'),
            _ => match char::from_u32(u as u32) {
                Some(c) => out.push(c),
                None => return None,
            },
        }
    }
    Some(out)
}

/// Encodes a string as modified UTF-8.
pub fn encode_modified_utf8(s: &str) -> Vec<u8> {
    let mut out = Vec::with_capacity(s.len());
    for unit in s.encode_utf16() {
        match unit {
            0x0001..=0x007f => out.push(unit as u8),
            0x0000 | 0x0080..=0x07ff => {
                out.push(0xc0 | (unit >> 6) as u8);
                out.push(0x80 | (unit & 0x3f) as u8);
            }
            _ => {
                out.push(0xe0 | (unit >> 12) as u8);
                out.push(0x80 | ((unit >> 6) & 0x3f) as u8);
                out.push(0x80 | (unit & 0x3f) as u8);
            }
        }
    }
    out
}
