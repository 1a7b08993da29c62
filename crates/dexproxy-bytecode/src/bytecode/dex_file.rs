//! Verifying DEX reader.
//!
//! [`DexFile`] checks the header and integrity fields on load and decodes
//! every id section, class definition, class data item and code item into
//! owned values. [`DexFile::verify`] then checks cross references: every
//! index in id items, class data and instructions must be in bounds, and the
//! pools must be sorted and unique.

use std::io;
use std::path::Path;

use super::checksum::{compute_checksum, compute_signature};
use super::header::Header;
use super::instructions::{Instruction, RefKind};
use super::map::{MapItem, MapItemType};
use super::{HEADER_SIZE, NO_INDEX, VERSION, leb128, mutf8};

/// Reader error.
#[derive(Debug, thiserror::Error)]
pub enum DexError {
    #[error("invalid magic: expected `dex\\n035\\0`")]
    InvalidMagic,
    #[error("unsupported version: {0:03} (expected {VERSION:03})")]
    UnsupportedVersion(u32),
    #[error("file too small: {0} bytes (minimum {HEADER_SIZE})")]
    FileTooSmall(usize),
    #[error("size mismatch: header says {header} bytes, got {actual}")]
    SizeMismatch { header: u32, actual: usize },
    #[error("unsupported endian tag {0:#010x}")]
    BadEndian(u32),
    #[error("checksum mismatch: header says {header:#010x}, computed {actual:#010x}")]
    ChecksumMismatch { header: u32, actual: u32 },
    #[error("signature mismatch")]
    SignatureMismatch,
    #[error("{what} at offset {offset:#x} extends past the end of the file")]
    OutOfBounds { what: &'static str, offset: usize },
    #[error("{what} index {index} out of bounds (count {count})")]
    IndexOutOfBounds {
        what: &'static str,
        index: u32,
        count: usize,
    },
    #[error("malformed LEB128 at offset {0:#x}")]
    MalformedLeb128(usize),
    #[error("malformed string data at offset {0:#x}")]
    MalformedString(usize),
    #[error("unknown map item type {0:#06x}")]
    UnknownMapItem(u16),
    #[error("undecodable instruction {unit:#06x} at code item {code_off:#x}, pc {pc}")]
    BadInstruction { code_off: u32, pc: usize, unit: u16 },
    #[error("register v{register} out of range in code item {code_off:#x} ({registers} registers)")]
    BadRegister {
        code_off: u32,
        register: u16,
        registers: u16,
    },
    #[error("class `{class}` lists interface `{interface}` more than once")]
    DuplicateInterface { class: String, interface: String },
    #[error("{section} not sorted or not unique at entry {position}")]
    Unsorted {
        section: &'static str,
        position: usize,
    },
    #[error("io error: {0}")]
    Io(#[from] io::Error),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ProtoIdItem {
    pub shorty_idx: u32,
    pub return_type_idx: u32,
    pub parameters_off: u32,
    /// Decoded parameter type list.
    pub parameters: Vec<u16>,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FieldIdItem {
    pub class_idx: u16,
    pub type_idx: u16,
    pub name_idx: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct MethodIdItem {
    pub class_idx: u16,
    pub proto_idx: u16,
    pub name_idx: u32,
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct EncodedField {
    pub field_idx: u32,
    pub access_flags: u32,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct EncodedMethod {
    pub method_idx: u32,
    pub access_flags: u32,
    pub code_off: u32,
    pub code: Option<CodeItem>,
}

#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct ClassData {
    pub static_fields: Vec<EncodedField>,
    pub instance_fields: Vec<EncodedField>,
    pub direct_methods: Vec<EncodedMethod>,
    pub virtual_methods: Vec<EncodedMethod>,
}

impl ClassData {
    pub fn methods(&self) -> impl Iterator<Item = &EncodedMethod> {
        self.direct_methods.iter().chain(&self.virtual_methods)
    }

    pub fn fields(&self) -> impl Iterator<Item = &EncodedField> {
        self.static_fields.iter().chain(&self.instance_fields)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct CodeItem {
    /// File offset of this item.
    pub offset: u32,
    pub registers_size: u16,
    pub ins_size: u16,
    pub outs_size: u16,
    pub tries_size: u16,
    pub debug_info_off: u32,
    pub insns: Vec<u16>,
}

impl CodeItem {
    /// Decode the instruction stream into `(pc, instruction)` pairs.
    pub fn instructions(&self) -> Result<Vec<(usize, Instruction)>, DexError> {
        let mut out = Vec::new();
        let mut pc = 0;
        while pc < self.insns.len() {
            let insn =
                Instruction::decode(&self.insns[pc..]).ok_or(DexError::BadInstruction {
                    code_off: self.offset,
                    pc,
                    unit: self.insns[pc],
                })?;
            let width = insn.code_units();
            out.push((pc, insn));
            pc += width;
        }
        Ok(out)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ClassDefItem {
    pub class_idx: u32,
    pub access_flags: u32,
    pub superclass_idx: u32,
    pub interfaces_off: u32,
    pub source_file_idx: u32,
    pub annotations_off: u32,
    pub class_data_off: u32,
    pub static_values_off: u32,
    /// Decoded interface type list.
    pub interfaces: Vec<u16>,
    pub class_data: Option<ClassData>,
}

/// A field or method reference resolved to its strings.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MemberRef<'a> {
    pub class: &'a str,
    pub name: &'a str,
    /// Type descriptor for fields, `(params)ret` for methods.
    pub descriptor: String,
}

/// A loaded DEX file.
#[derive(Debug)]
pub struct DexFile {
    bytes: Vec<u8>,
    header: Header,
    strings: Vec<String>,
    types: Vec<u32>,
    protos: Vec<ProtoIdItem>,
    fields: Vec<FieldIdItem>,
    methods: Vec<MethodIdItem>,
    class_defs: Vec<ClassDefItem>,
    map_list: Vec<MapItem>,
}

impl DexFile {
    /// Load from owned bytes, checking header fields, checksum and signature.
    pub fn from_bytes(bytes: Vec<u8>) -> Result<Self, DexError> {
        if bytes.len() < HEADER_SIZE {
            return Err(DexError::FileTooSmall(bytes.len()));
        }

        let header = Header::from_bytes(&bytes[..HEADER_SIZE]);
        if !header.validate_magic() {
            return Err(DexError::InvalidMagic);
        }
        match header.version() {
            Some(VERSION) => {}
            Some(other) => return Err(DexError::UnsupportedVersion(other)),
            None => return Err(DexError::InvalidMagic),
        }
        if !header.validate_endian() {
            return Err(DexError::BadEndian(header.endian_tag));
        }
        if header.file_size as usize != bytes.len() {
            return Err(DexError::SizeMismatch {
                header: header.file_size,
                actual: bytes.len(),
            });
        }
        let checksum = compute_checksum(&bytes);
        if checksum != header.checksum {
            return Err(DexError::ChecksumMismatch {
                header: header.checksum,
                actual: checksum,
            });
        }
        if compute_signature(&bytes) != header.signature {
            return Err(DexError::SignatureMismatch);
        }

        let r = Reader { bytes: &bytes };
        let strings = r.table(header.string_ids_off, header.string_ids_size, 4, |at| {
            r.string_data(r.u32(at, "string_id_item")?)
        })?;
        let types = r.table(header.type_ids_off, header.type_ids_size, 4, |at| {
            r.u32(at, "type_id_item")
        })?;
        let protos = r.table(header.proto_ids_off, header.proto_ids_size, 12, |at| {
            let parameters_off = r.u32(at + 8, "proto_id_item")?;
            Ok(ProtoIdItem {
                shorty_idx: r.u32(at, "proto_id_item")?,
                return_type_idx: r.u32(at + 4, "proto_id_item")?,
                parameters_off,
                parameters: r.type_list(parameters_off)?,
            })
        })?;
        let fields = r.table(header.field_ids_off, header.field_ids_size, 8, |at| {
            Ok(FieldIdItem {
                class_idx: r.u16(at, "field_id_item")?,
                type_idx: r.u16(at + 2, "field_id_item")?,
                name_idx: r.u32(at + 4, "field_id_item")?,
            })
        })?;
        let methods = r.table(header.method_ids_off, header.method_ids_size, 8, |at| {
            Ok(MethodIdItem {
                class_idx: r.u16(at, "method_id_item")?,
                proto_idx: r.u16(at + 2, "method_id_item")?,
                name_idx: r.u32(at + 4, "method_id_item")?,
            })
        })?;
        let class_defs = r.table(header.class_defs_off, header.class_defs_size, 32, |at| {
            r.class_def(at)
        })?;
        let map_list = if header.map_off == 0 {
            Vec::new()
        } else {
            r.map_list(header.map_off)?
        };

        Ok(Self {
            bytes,
            header,
            strings,
            types,
            protos,
            fields,
            methods,
            class_defs,
            map_list,
        })
    }

    /// Load from a file path.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, DexError> {
        let bytes = std::fs::read(path)?;
        Self::from_bytes(bytes)
    }

    pub fn header(&self) -> &Header {
        &self.header
    }

    pub fn bytes(&self) -> &[u8] {
        &self.bytes
    }

    pub fn strings(&self) -> &[String] {
        &self.strings
    }

    /// String index of each type descriptor.
    pub fn types(&self) -> &[u32] {
        &self.types
    }

    pub fn protos(&self) -> &[ProtoIdItem] {
        &self.protos
    }

    pub fn fields(&self) -> &[FieldIdItem] {
        &self.fields
    }

    pub fn methods(&self) -> &[MethodIdItem] {
        &self.methods
    }

    pub fn class_defs(&self) -> &[ClassDefItem] {
        &self.class_defs
    }

    pub fn map_list(&self) -> &[MapItem] {
        &self.map_list
    }

    pub fn string(&self, idx: u32) -> Result<&str, DexError> {
        lookup(&self.strings, idx, "string").map(String::as_str)
    }

    /// Descriptor of type `idx`.
    pub fn type_descriptor(&self, idx: u32) -> Result<&str, DexError> {
        let string_idx = *lookup(&self.types, idx, "type")?;
        self.string(string_idx)
    }

    /// `(params)ret` of proto `idx`.
    pub fn proto_descriptor(&self, idx: u32) -> Result<String, DexError> {
        let proto = lookup(&self.protos, idx, "proto")?;
        let mut text = String::from("(");
        for &param in &proto.parameters {
            text.push_str(self.type_descriptor(param as u32)?);
        }
        text.push(')');
        text.push_str(self.type_descriptor(proto.return_type_idx)?);
        Ok(text)
    }

    pub fn field_ref(&self, idx: u32) -> Result<MemberRef<'_>, DexError> {
        let field = lookup(&self.fields, idx, "field")?;
        Ok(MemberRef {
            class: self.type_descriptor(field.class_idx as u32)?,
            name: self.string(field.name_idx)?,
            descriptor: self.type_descriptor(field.type_idx as u32)?.to_string(),
        })
    }

    pub fn method_ref(&self, idx: u32) -> Result<MemberRef<'_>, DexError> {
        let method = lookup(&self.methods, idx, "method")?;
        Ok(MemberRef {
            class: self.type_descriptor(method.class_idx as u32)?,
            name: self.string(method.name_idx)?,
            descriptor: self.proto_descriptor(method.proto_idx as u32)?,
        })
    }

    /// Class definition whose class descriptor is `descriptor`.
    pub fn find_class(&self, descriptor: &str) -> Option<&ClassDefItem> {
        self.class_defs
            .iter()
            .find(|def| self.type_descriptor(def.class_idx).ok() == Some(descriptor))
    }

    /// Check every cross reference and the pool orderings.
    pub fn verify(&self) -> Result<(), DexError> {
        self.verify_pools()?;
        for def in &self.class_defs {
            self.type_descriptor(def.class_idx)?;
            if def.superclass_idx != NO_INDEX {
                self.type_descriptor(def.superclass_idx)?;
            }
            if def.source_file_idx != NO_INDEX {
                self.string(def.source_file_idx)?;
            }
            for (i, &iface) in def.interfaces.iter().enumerate() {
                let interface = self.type_descriptor(iface as u32)?;
                if def.interfaces[..i].contains(&iface) {
                    return Err(DexError::DuplicateInterface {
                        class: self.type_descriptor(def.class_idx)?.to_string(),
                        interface: interface.to_string(),
                    });
                }
            }
            let Some(data) = &def.class_data else {
                continue;
            };
            for field in data.fields() {
                self.field_ref(field.field_idx)?;
            }
            for method in data.methods() {
                self.method_ref(method.method_idx)?;
                if let Some(code) = &method.code {
                    self.verify_code(code)?;
                }
            }
        }
        Ok(())
    }

    fn verify_pools(&self) -> Result<(), DexError> {
        check_sorted("string_ids", &self.strings, |a, b| {
            mutf8::compare_utf16(a, b)
        })?;
        check_sorted("type_ids", &self.types, |a, b| a.cmp(b))?;
        for &string_idx in &self.types {
            self.string(string_idx)?;
        }

        for proto in &self.protos {
            self.string(proto.shorty_idx)?;
            self.type_descriptor(proto.return_type_idx)?;
            for &param in &proto.parameters {
                self.type_descriptor(param as u32)?;
            }
        }
        check_sorted("proto_ids", &self.protos, |a, b| {
            (a.return_type_idx, &a.parameters).cmp(&(b.return_type_idx, &b.parameters))
        })?;

        for idx in 0..self.fields.len() {
            self.field_ref(idx as u32)?;
        }
        check_sorted("field_ids", &self.fields, |a, b| {
            (a.class_idx, a.name_idx, a.type_idx).cmp(&(b.class_idx, b.name_idx, b.type_idx))
        })?;

        for idx in 0..self.methods.len() {
            self.method_ref(idx as u32)?;
        }
        check_sorted("method_ids", &self.methods, |a, b| {
            (a.class_idx, a.name_idx, a.proto_idx).cmp(&(b.class_idx, b.name_idx, b.proto_idx))
        })?;
        Ok(())
    }

    fn verify_code(&self, code: &CodeItem) -> Result<(), DexError> {
        if code.ins_size > code.registers_size {
            return Err(DexError::BadRegister {
                code_off: code.offset,
                register: code.ins_size,
                registers: code.registers_size,
            });
        }
        for (_, insn) in code.instructions()? {
            if let Some(register) = insn
                .registers()
                .into_iter()
                .find(|&r| r >= code.registers_size)
            {
                return Err(DexError::BadRegister {
                    code_off: code.offset,
                    register,
                    registers: code.registers_size,
                });
            }
            if let Some(reference) = insn.reference() {
                match reference.kind {
                    RefKind::String => self.string(reference.index).map(drop)?,
                    RefKind::Type => self.type_descriptor(reference.index).map(drop)?,
                    RefKind::Field => self.field_ref(reference.index).map(drop)?,
                    RefKind::Method => self.method_ref(reference.index).map(drop)?,
                }
            }
        }
        Ok(())
    }
}

fn lookup<'a, T>(items: &'a [T], idx: u32, what: &'static str) -> Result<&'a T, DexError> {
    items.get(idx as usize).ok_or(DexError::IndexOutOfBounds {
        what,
        index: idx,
        count: items.len(),
    })
}

fn check_sorted<T>(
    section: &'static str,
    items: &[T],
    cmp: impl Fn(&T, &T) -> std::cmp::Ordering,
) -> Result<(), DexError> {
    match items
        .windows(2)
        .position(|pair| cmp(&pair[0], &pair[1]) != std::cmp::Ordering::Less)
    {
        Some(position) => Err(DexError::Unsorted {
            section,
            position: position + 1,
        }),
        None => Ok(()),
    }
}

/// Bounds-checked little-endian reads over the file bytes.
struct Reader<'a> {
    bytes: &'a [u8],
}

impl Reader<'_> {
    fn slice(&self, offset: usize, len: usize, what: &'static str) -> Result<&[u8], DexError> {
        offset
            .checked_add(len)
            .and_then(|end| self.bytes.get(offset..end))
            .ok_or(DexError::OutOfBounds { what, offset })
    }

    fn u16(&self, offset: usize, what: &'static str) -> Result<u16, DexError> {
        let b = self.slice(offset, 2, what)?;
        Ok(u16::from_le_bytes([b[0], b[1]]))
    }

    fn u32(&self, offset: usize, what: &'static str) -> Result<u32, DexError> {
        let b = self.slice(offset, 4, what)?;
        Ok(u32::from_le_bytes([b[0], b[1], b[2], b[3]]))
    }

    fn uleb(&self, offset: &mut usize) -> Result<u32, DexError> {
        let start = *offset;
        leb128::read_uleb128(self.bytes, offset).ok_or(DexError::MalformedLeb128(start))
    }

    /// Decode `count` fixed-size entries starting at `base`.
    fn table<T>(
        &self,
        base: u32,
        count: u32,
        item_size: usize,
        read: impl Fn(usize) -> Result<T, DexError>,
    ) -> Result<Vec<T>, DexError> {
        (0..count as usize)
            .map(|i| read(base as usize + i * item_size))
            .collect()
    }

    fn type_list(&self, off: u32) -> Result<Vec<u16>, DexError> {
        if off == 0 {
            return Ok(Vec::new());
        }
        let at = off as usize;
        let size = self.u32(at, "type_list")? as usize;
        self.slice(at + 4, size * 2, "type_list")?;
        (0..size)
            .map(|i| self.u16(at + 4 + i * 2, "type_list"))
            .collect()
    }

    fn string_data(&self, off: u32) -> Result<String, DexError> {
        let mut at = off as usize;
        let utf16_len = self.uleb(&mut at)?;
        let tail = self
            .bytes
            .get(at..)
            .ok_or(DexError::OutOfBounds {
                what: "string_data_item",
                offset: at,
            })?;
        let (text, _) = mutf8::decode(tail).ok_or(DexError::MalformedString(off as usize))?;
        if text.encode_utf16().count() != utf16_len as usize {
            return Err(DexError::MalformedString(off as usize));
        }
        Ok(text)
    }

    fn class_def(&self, at: usize) -> Result<ClassDefItem, DexError> {
        let word = |i: usize| self.u32(at + i * 4, "class_def_item");
        let interfaces_off = word(3)?;
        let class_data_off = word(6)?;
        Ok(ClassDefItem {
            class_idx: word(0)?,
            access_flags: word(1)?,
            superclass_idx: word(2)?,
            interfaces_off,
            source_file_idx: word(4)?,
            annotations_off: word(5)?,
            class_data_off,
            static_values_off: word(7)?,
            interfaces: self.type_list(interfaces_off)?,
            class_data: match class_data_off {
                0 => None,
                off => Some(self.class_data(off)?),
            },
        })
    }

    fn class_data(&self, off: u32) -> Result<ClassData, DexError> {
        let mut at = off as usize;
        let static_fields = self.uleb(&mut at)?;
        let instance_fields = self.uleb(&mut at)?;
        let direct_methods = self.uleb(&mut at)?;
        let virtual_methods = self.uleb(&mut at)?;

        Ok(ClassData {
            static_fields: self.encoded_fields(&mut at, static_fields)?,
            instance_fields: self.encoded_fields(&mut at, instance_fields)?,
            direct_methods: self.encoded_methods(&mut at, direct_methods)?,
            virtual_methods: self.encoded_methods(&mut at, virtual_methods)?,
        })
    }

    fn encoded_fields(&self, at: &mut usize, count: u32) -> Result<Vec<EncodedField>, DexError> {
        let mut idx = 0u32;
        let mut out = Vec::new();
        for _ in 0..count {
            idx = idx.wrapping_add(self.uleb(at)?);
            out.push(EncodedField {
                field_idx: idx,
                access_flags: self.uleb(at)?,
            });
        }
        Ok(out)
    }

    fn encoded_methods(
        &self,
        at: &mut usize,
        count: u32,
    ) -> Result<Vec<EncodedMethod>, DexError> {
        let mut idx = 0u32;
        let mut out = Vec::new();
        for _ in 0..count {
            idx = idx.wrapping_add(self.uleb(at)?);
            let access_flags = self.uleb(at)?;
            let code_off = self.uleb(at)?;
            out.push(EncodedMethod {
                method_idx: idx,
                access_flags,
                code_off,
                code: match code_off {
                    0 => None,
                    off => Some(self.code_item(off)?),
                },
            });
        }
        Ok(out)
    }

    fn code_item(&self, off: u32) -> Result<CodeItem, DexError> {
        let at = off as usize;
        let insns_size = self.u32(at + 12, "code_item")? as usize;
        let raw = self.slice(at + 16, insns_size * 2, "code_item")?;
        Ok(CodeItem {
            offset: off,
            registers_size: self.u16(at, "code_item")?,
            ins_size: self.u16(at + 2, "code_item")?,
            outs_size: self.u16(at + 4, "code_item")?,
            tries_size: self.u16(at + 6, "code_item")?,
            debug_info_off: self.u32(at + 8, "code_item")?,
            insns: raw
                .chunks_exact(2)
                .map(|c| u16::from_le_bytes([c[0], c[1]]))
                .collect(),
        })
    }

    fn map_list(&self, off: u32) -> Result<Vec<MapItem>, DexError> {
        let at = off as usize;
        let size = self.u32(at, "map_list")? as usize;
        self.slice(at + 4, size * MapItem::SIZE, "map_list")?;
        (0..size)
            .map(|i| {
                let entry = at + 4 + i * MapItem::SIZE;
                let code = self.u16(entry, "map_item")?;
                let item_type =
                    MapItemType::from_u16(code).ok_or(DexError::UnknownMapItem(code))?;
                Ok(MapItem::new(
                    item_type,
                    self.u32(entry + 4, "map_item")?,
                    self.u32(entry + 8, "map_item")?,
                ))
            })
            .collect()
    }
}
