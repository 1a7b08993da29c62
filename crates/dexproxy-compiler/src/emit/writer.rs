//! Container writer.
//!
//! Serializes class definitions and finished pools into a DEX file:
//!
//! ```text
//! header | string_ids | type_ids | proto_ids | field_ids | method_ids | class_defs
//! data:  code_items | type_lists | string_data | class_data | map_list
//! ```
//!
//! The id sections are reserved up front and filled in once the data items
//! they point to have offsets. Symbolic instructions are lowered here, with
//! final pool indices, so every operand gets its narrowest encoding.

use indexmap::IndexMap;

use dexproxy_bytecode::{
    HEADER_SIZE, Header, ITEM_ALIGN, Instruction, MapItem, MapItemType, NO_INDEX, align_up,
    checksum, leb128, mutf8,
};

use super::encoder::Insn;
use super::layout::{ClassDefinition, FieldDefinition, MethodDefinition};
use super::pool::Pools;
use crate::error::{Result, SynthError};

const STRING_ID_SIZE: usize = 4;
const TYPE_ID_SIZE: usize = 4;
const PROTO_ID_SIZE: usize = 12;
const FIELD_ID_SIZE: usize = 8;
const METHOD_ID_SIZE: usize = 8;
const CLASS_DEF_SIZE: usize = 32;
const CODE_ITEM_HEADER: usize = 16;

/// Write `classes` into a sealed DEX container.
pub fn write(classes: &[ClassDefinition], pools: &Pools) -> Result<Vec<u8>> {
    let order = class_order(classes, pools)?;

    let mut header = Header::default();
    let mut cursor = HEADER_SIZE;
    let mut section = |count: usize, item_size: usize| -> (u32, u32) {
        if count == 0 {
            return (0, 0);
        }
        let off = cursor;
        cursor += count * item_size;
        (count as u32, off as u32)
    };
    (header.string_ids_size, header.string_ids_off) =
        section(pools.strings.len(), STRING_ID_SIZE);
    (header.type_ids_size, header.type_ids_off) = section(pools.types.len(), TYPE_ID_SIZE);
    (header.proto_ids_size, header.proto_ids_off) = section(pools.protos.len(), PROTO_ID_SIZE);
    (header.field_ids_size, header.field_ids_off) = section(pools.fields.len(), FIELD_ID_SIZE);
    (header.method_ids_size, header.method_ids_off) =
        section(pools.methods.len(), METHOD_ID_SIZE);
    (header.class_defs_size, header.class_defs_off) = section(order.len(), CLASS_DEF_SIZE);

    let data_off = cursor;
    let mut out = vec![0u8; data_off];
    let mut map = Vec::new();

    // Code items, in class order then declaration order.
    let mut code_offsets: Vec<Vec<u32>> = Vec::with_capacity(order.len());
    let mut code_count = 0;
    let mut first_code = 0;
    for &i in &order {
        let mut offsets = Vec::new();
        for method in classes[i].methods() {
            pad(&mut out);
            let off = offset32(out.len(), "code item")?;
            if code_count == 0 {
                first_code = off;
            }
            write_code_item(&mut out, method, pools)?;
            offsets.push(off);
            code_count += 1;
        }
        code_offsets.push(offsets);
    }
    if code_count > 0 {
        map.push(MapItem::new(MapItemType::CodeItem, code_count, first_code));
    }

    // Type lists, deduplicated by content.
    let mut type_lists: IndexMap<Vec<u16>, u32> = IndexMap::new();
    let lists = pools.protos.iter().map(|p| p.params.clone()).chain(
        order
            .iter()
            .map(|&i| classes[i].interfaces.iter().map(|&t| pools.ty(t)).collect()),
    );
    for list in lists {
        if list.is_empty() || type_lists.contains_key(&list) {
            continue;
        }
        pad(&mut out);
        let off = offset32(out.len(), "type list")?;
        out.extend_from_slice(&(list.len() as u32).to_le_bytes());
        for ty in &list {
            out.extend_from_slice(&ty.to_le_bytes());
        }
        type_lists.insert(list, off);
    }
    if let Some((_, &first)) = type_lists.first() {
        map.push(MapItem::new(
            MapItemType::TypeList,
            type_lists.len() as u32,
            first,
        ));
    }

    // String data.
    let mut string_offsets = Vec::with_capacity(pools.strings.len());
    for text in &pools.strings {
        string_offsets.push(offset32(out.len(), "string data")?);
        let (bytes, units) = mutf8::encode(text);
        leb128::write_uleb128(&mut out, units);
        out.extend_from_slice(&bytes);
        out.push(0);
    }
    if let Some(&first) = string_offsets.first() {
        map.push(MapItem::new(
            MapItemType::StringData,
            string_offsets.len() as u32,
            first,
        ));
    }

    // Class data.
    let mut class_data_offsets = Vec::with_capacity(order.len());
    for (slot, &i) in order.iter().enumerate() {
        let off = offset32(out.len(), "class data")?;
        write_class_data(&mut out, &classes[i], &code_offsets[slot], pools);
        class_data_offsets.push(off);
    }
    if let Some(&first) = class_data_offsets.first() {
        map.push(MapItem::new(
            MapItemType::ClassData,
            class_data_offsets.len() as u32,
            first,
        ));
    }

    // Id sections.
    for (i, &off) in string_offsets.iter().enumerate() {
        put_u32(&mut out, header.string_ids_off as usize + i * STRING_ID_SIZE, off);
    }
    for (i, &string) in pools.types.iter().enumerate() {
        put_u32(&mut out, header.type_ids_off as usize + i * TYPE_ID_SIZE, string);
    }
    for (i, proto) in pools.protos.iter().enumerate() {
        let at = header.proto_ids_off as usize + i * PROTO_ID_SIZE;
        let params_off = type_lists.get(&proto.params).copied().unwrap_or(0);
        put_u32(&mut out, at, proto.shorty);
        put_u32(&mut out, at + 4, proto.return_type as u32);
        put_u32(&mut out, at + 8, params_off);
    }
    for (i, field) in pools.fields.iter().enumerate() {
        let at = header.field_ids_off as usize + i * FIELD_ID_SIZE;
        put_u16(&mut out, at, field.class);
        put_u16(&mut out, at + 2, field.ty);
        put_u32(&mut out, at + 4, field.name);
    }
    for (i, method) in pools.methods.iter().enumerate() {
        let at = header.method_ids_off as usize + i * METHOD_ID_SIZE;
        put_u16(&mut out, at, method.class);
        put_u16(&mut out, at + 2, method.proto);
        put_u32(&mut out, at + 4, method.name);
    }
    for (slot, &i) in order.iter().enumerate() {
        let class = &classes[i];
        let at = header.class_defs_off as usize + slot * CLASS_DEF_SIZE;
        let interfaces: Vec<u16> = class.interfaces.iter().map(|&t| pools.ty(t)).collect();
        let words = [
            pools.ty(class.class) as u32,
            class.access.bits(),
            class.superclass.map_or(NO_INDEX, |t| pools.ty(t) as u32),
            type_lists.get(&interfaces).copied().unwrap_or(0),
            class.source_file.map_or(NO_INDEX, |s| pools.string(s)),
            0,
            class_data_offsets[slot],
            0,
        ];
        for (w, word) in words.iter().enumerate() {
            put_u32(&mut out, at + w * 4, *word);
        }
    }

    // Map list.
    pad(&mut out);
    header.map_off = offset32(out.len(), "map list")?;
    let id_sections = [
        (MapItemType::StringId, header.string_ids_size, header.string_ids_off),
        (MapItemType::TypeId, header.type_ids_size, header.type_ids_off),
        (MapItemType::ProtoId, header.proto_ids_size, header.proto_ids_off),
        (MapItemType::FieldId, header.field_ids_size, header.field_ids_off),
        (MapItemType::MethodId, header.method_ids_size, header.method_ids_off),
        (MapItemType::ClassDef, header.class_defs_size, header.class_defs_off),
    ];
    let mut items = vec![MapItem::new(MapItemType::Header, 1, 0)];
    items.extend(
        id_sections
            .into_iter()
            .filter(|&(_, size, _)| size > 0)
            .map(|(ty, size, off)| MapItem::new(ty, size, off)),
    );
    items.extend(map);
    items.push(MapItem::new(MapItemType::MapList, 1, header.map_off));
    items.sort_by_key(|item| item.offset);

    out.extend_from_slice(&(items.len() as u32).to_le_bytes());
    for item in &items {
        out.extend_from_slice(&item.to_bytes());
    }

    header.file_size = offset32(out.len(), "file size")?;
    header.data_off = data_off as u32;
    header.data_size = header.file_size - header.data_off;
    out[..HEADER_SIZE].copy_from_slice(&header.to_bytes());
    checksum::seal(&mut out);

    log::debug!(
        "wrote container: {} classes, {} bytes",
        order.len(),
        out.len()
    );
    Ok(out)
}

fn pad(out: &mut Vec<u8>) {
    out.resize(align_up(out.len(), ITEM_ALIGN), 0);
}

fn offset32(value: usize, what: &str) -> Result<u32> {
    u32::try_from(value).map_err(|_| {
        SynthError::LayoutOverflow(format!("{what} offset {value:#x} exceeds 32 bits"))
    })
}

fn put_u16(out: &mut [u8], at: usize, value: u16) {
    out[at..at + 2].copy_from_slice(&value.to_le_bytes());
}

fn put_u32(out: &mut [u8], at: usize, value: u32) {
    out[at..at + 4].copy_from_slice(&value.to_le_bytes());
}

/// Order classes so that a supertype defined in the container precedes its
/// subtypes. Stable otherwise.
fn class_order(classes: &[ClassDefinition], pools: &Pools) -> Result<Vec<usize>> {
    let defined: Vec<u16> = classes.iter().map(|c| pools.ty(c.class)).collect();
    for (i, ty) in defined.iter().enumerate() {
        if defined[..i].contains(ty) {
            return Err(SynthError::conflict(
                classes[i].descriptor.clone(),
                "class defined more than once",
            ));
        }
    }

    let mut placed = vec![false; classes.len()];
    let mut order = Vec::with_capacity(classes.len());
    while order.len() < classes.len() {
        let ready = (0..classes.len()).find(|&i| {
            !placed[i]
                && classes[i].supertypes().all(|t| {
                    let t = pools.ty(t);
                    defined
                        .iter()
                        .position(|&d| d == t)
                        .is_none_or(|j| placed[j])
                })
        });
        let Some(i) = ready else {
            let stuck = (0..classes.len()).find(|&i| !placed[i]).unwrap_or(0);
            return Err(SynthError::conflict(
                classes[stuck].descriptor.clone(),
                "cyclic class hierarchy",
            ));
        };
        placed[i] = true;
        order.push(i);
    }
    Ok(order)
}

fn write_code_item(out: &mut Vec<u8>, method: &MethodDefinition, pools: &Pools) -> Result<()> {
    let encoded = &method.encoded;
    let mut insns = Vec::new();
    for insn in &encoded.code {
        lower(insn, pools)?.encode(&mut insns);
    }
    let insns_size = u32::try_from(insns.len()).map_err(|_| {
        SynthError::LayoutOverflow(format!(
            "{}: {} code units exceed the code item size field",
            encoded.spec.signature(),
            insns.len()
        ))
    })?;

    out.reserve(CODE_ITEM_HEADER + insns.len() * 2);
    out.extend_from_slice(&encoded.registers.to_le_bytes());
    out.extend_from_slice(&encoded.ins.to_le_bytes());
    out.extend_from_slice(&encoded.outs.to_le_bytes());
    out.extend_from_slice(&0u16.to_le_bytes()); // tries_size
    out.extend_from_slice(&0u32.to_le_bytes()); // debug_info_off
    out.extend_from_slice(&insns_size.to_le_bytes());
    for unit in insns {
        out.extend_from_slice(&unit.to_le_bytes());
    }
    Ok(())
}

fn write_class_data(out: &mut Vec<u8>, class: &ClassDefinition, code: &[u32], pools: &Pools) {
    let direct_count = class.direct_methods.len();
    let mut direct: Vec<(u32, u32, u32)> = class
        .direct_methods
        .iter()
        .zip(code)
        .map(|(m, &off)| (pools.method(m.encoded.method) as u32, m.access.bits(), off))
        .collect();
    let mut virtual_: Vec<(u32, u32, u32)> = class
        .virtual_methods
        .iter()
        .zip(&code[direct_count..])
        .map(|(m, &off)| (pools.method(m.encoded.method) as u32, m.access.bits(), off))
        .collect();
    direct.sort_unstable();
    virtual_.sort_unstable();

    let fields = |defs: &[FieldDefinition]| {
        let mut v: Vec<(u32, u32)> = defs
            .iter()
            .map(|f| (pools.field(f.field) as u32, f.access.bits()))
            .collect();
        v.sort_unstable();
        v
    };
    let static_fields = fields(&class.static_fields);
    let instance_fields = fields(&class.instance_fields);

    for count in [
        static_fields.len(),
        instance_fields.len(),
        direct.len(),
        virtual_.len(),
    ] {
        leb128::write_uleb128(out, count as u32);
    }
    for list in [&static_fields, &instance_fields] {
        let mut prev = 0;
        for &(idx, access) in list {
            leb128::write_uleb128(out, idx - prev);
            leb128::write_uleb128(out, access);
            prev = idx;
        }
    }
    for list in [&direct, &virtual_] {
        let mut prev = 0;
        for &(idx, access, code_off) in list {
            leb128::write_uleb128(out, idx - prev);
            leb128::write_uleb128(out, access);
            leb128::write_uleb128(out, code_off);
            prev = idx;
        }
    }
}

fn nibble(reg: u8) -> Result<u8> {
    if reg < 16 {
        Ok(reg)
    } else {
        Err(SynthError::Encoding(format!(
            "register v{reg} does not fit a 4-bit operand"
        )))
    }
}

/// Lower one symbolic instruction with final pool indices.
pub fn lower(insn: &Insn, pools: &Pools) -> Result<Instruction> {
    Ok(match *insn {
        Insn::ReturnVoid => Instruction::ReturnVoid,
        Insn::Return { reg } => Instruction::Return { reg },
        Insn::ReturnWide { reg } => Instruction::ReturnWide { reg },
        Insn::ReturnObject { reg } => Instruction::ReturnObject { reg },
        Insn::MoveResult { dst } => Instruction::MoveResult { dst },
        Insn::MoveResultWide { dst } => Instruction::MoveResultWide { dst },
        Insn::MoveResultObject { dst } => Instruction::MoveResultObject { dst },
        Insn::MoveObject { dst, src } => Instruction::MoveObjectFrom16 { dst, src },
        Insn::Const { dst, value } => {
            if dst < 16 && (-8..=7).contains(&value) {
                Instruction::Const4 {
                    dst,
                    value: value as i8,
                }
            } else if let Ok(value) = i16::try_from(value) {
                Instruction::Const16 { dst, value }
            } else {
                Instruction::Const { dst, value }
            }
        }
        Insn::ConstString { dst, string } => {
            let string = pools.string(string);
            match u16::try_from(string) {
                Ok(string) => Instruction::ConstString { dst, string },
                Err(_) => Instruction::ConstStringJumbo { dst, string },
            }
        }
        Insn::CheckCast { reg, ty } => Instruction::CheckCast {
            reg,
            ty: pools.ty(ty),
        },
        Insn::NewArray { dst, size, ty } => Instruction::NewArray {
            dst: nibble(dst)?,
            size: nibble(size)?,
            ty: pools.ty(ty),
        },
        Insn::AgetObject { dst, array, index } => Instruction::AgetObject { dst, array, index },
        Insn::AputObject { src, array, index } => Instruction::AputObject { src, array, index },
        Insn::IgetObject { dst, object, field } => Instruction::IgetObject {
            dst: nibble(dst)?,
            object: nibble(object)?,
            field: pools.field(field),
        },
        Insn::IputObject { src, object, field } => Instruction::IputObject {
            src: nibble(src)?,
            object: nibble(object)?,
            field: pools.field(field),
        },
        Insn::SgetObject { dst, field } => Instruction::SgetObject {
            dst,
            field: pools.field(field),
        },
        Insn::Invoke {
            kind,
            method,
            ref args,
        } => {
            let method = pools.method(method);
            if args.len() <= 5 && args.iter().all(|&r| r < 16) {
                Instruction::Invoke {
                    kind,
                    method,
                    args: args.iter().map(|&r| r as u8).collect(),
                }
            } else {
                let first = args.first().copied().unwrap_or(0);
                let contiguous = args.iter().zip(first..).all(|(&r, want)| r == want);
                let count = u8::try_from(args.len()).ok().filter(|_| contiguous);
                let Some(count) = count else {
                    return Err(SynthError::Encoding(format!(
                        "invoke arguments {args:?} are neither narrow nor contiguous"
                    )));
                };
                Instruction::InvokeRange {
                    kind,
                    method,
                    first,
                    count,
                }
            }
        }
    })
}
