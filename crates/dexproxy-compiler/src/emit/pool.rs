//! Binary pool builder.
//!
//! Collects the strings, types, prototypes, field references and method
//! references a container needs. Entries are deduplicated and receive a
//! provisional index in insertion order. [`PoolBuilder::finish`] sorts every
//! pool into the order the DEX format requires and returns [`Pools`], which
//! translates provisional indices into final ones.

use std::cmp::Ordering;
use std::sync::{Mutex, MutexGuard, PoisonError};

use indexmap::IndexSet;

use dexproxy_bytecode::mutf8;
use dexproxy_core::ProtoDescriptor;

use crate::error::{Result, SynthError};

/// Longest string a `string_data_item` can describe, in UTF-16 code units.
pub const MAX_STRING_UNITS: usize = u16::MAX as usize;

/// Entries addressable by the 16-bit index fields of id items and instructions.
pub const MAX_INDEXED: usize = u16::MAX as usize + 1;

macro_rules! provisional_index {
    ($($(#[$meta:meta])* $name:ident;)*) => {
        $(
            $(#[$meta])*
            #[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Debug)]
            pub struct $name(u32);

            impl $name {
                pub fn get(self) -> u32 {
                    self.0
                }
            }
        )*
    };
}

provisional_index! {
    /// Provisional index into the string pool.
    StringIdx;
    /// Provisional index into the type pool.
    TypeIdx;
    /// Provisional index into the prototype pool.
    ProtoIdx;
    /// Provisional index into the field reference pool.
    FieldIdx;
    /// Provisional index into the method reference pool.
    MethodIdx;
}

#[derive(Clone, PartialEq, Eq, Hash, Debug)]
struct ProtoKey {
    shorty: StringIdx,
    return_type: TypeIdx,
    params: Vec<TypeIdx>,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
struct FieldKey {
    class: TypeIdx,
    name: StringIdx,
    ty: TypeIdx,
}

#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
struct MethodKey {
    class: TypeIdx,
    name: StringIdx,
    proto: ProtoIdx,
}

/// Pool operations the encoder and assembler intern through.
///
/// Implemented by [`PoolBuilder`] for single-threaded synthesis and by
/// `&SharedPoolBuilder` for batches encoded on several threads.
pub trait Intern {
    fn intern_string(&mut self, text: &str) -> Result<StringIdx>;
    fn intern_type(&mut self, descriptor: &str) -> Result<TypeIdx>;
    fn intern_proto(&mut self, proto: &ProtoDescriptor) -> Result<ProtoIdx>;
    fn intern_field(&mut self, class: &str, name: &str, ty: &str) -> Result<FieldIdx>;
    fn intern_method(&mut self, class: &str, name: &str, proto: &ProtoDescriptor)
    -> Result<MethodIdx>;
}

/// Deduplicating, insertion-ordered pools.
#[derive(Debug, Default)]
pub struct PoolBuilder {
    strings: IndexSet<String>,
    types: IndexSet<StringIdx>,
    protos: IndexSet<ProtoKey>,
    fields: IndexSet<FieldKey>,
    methods: IndexSet<MethodKey>,
}

/// Oversized pools are rejected by `finish`, not here.
fn index(i: usize) -> u32 {
    i as u32
}

impl PoolBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn string_count(&self) -> usize {
        self.strings.len()
    }

    pub fn type_count(&self) -> usize {
        self.types.len()
    }

    pub fn proto_count(&self) -> usize {
        self.protos.len()
    }

    pub fn field_count(&self) -> usize {
        self.fields.len()
    }

    pub fn method_count(&self) -> usize {
        self.methods.len()
    }

    /// Text of a provisional string.
    pub fn string(&self, idx: StringIdx) -> Option<&str> {
        self.strings.get_index(idx.0 as usize).map(String::as_str)
    }

    /// Sort every pool and compute the provisional-to-final remap tables.
    pub fn finish(self) -> Result<Pools> {
        check_count("types", self.types.len())?;
        check_count("protos", self.protos.len())?;
        check_count("fields", self.fields.len())?;
        check_count("methods", self.methods.len())?;

        let strings: Vec<String> = self.strings.into_iter().collect();
        let string_order = sorted_order(&strings, |a, b| mutf8::compare_utf16(a, b));
        let string_remap = invert(&string_order);

        let type_keys: Vec<u32> = self
            .types
            .iter()
            .map(|s| string_remap[s.0 as usize])
            .collect();
        let type_order = sorted_order(&type_keys, Ord::cmp);
        let type_remap = invert(&type_order);
        let ty = |t: TypeIdx| type_remap[t.0 as usize] as u16;

        let proto_entries: Vec<ProtoEntry> = self
            .protos
            .iter()
            .map(|p| ProtoEntry {
                shorty: string_remap[p.shorty.0 as usize],
                return_type: ty(p.return_type),
                params: p.params.iter().map(|&t| ty(t)).collect(),
            })
            .collect();
        let proto_order = sorted_order(&proto_entries, |a, b| {
            (a.return_type, &a.params).cmp(&(b.return_type, &b.params))
        });
        let proto_remap = invert(&proto_order);

        let field_entries: Vec<FieldEntry> = self
            .fields
            .iter()
            .map(|f| FieldEntry {
                class: ty(f.class),
                ty: ty(f.ty),
                name: string_remap[f.name.0 as usize],
            })
            .collect();
        let field_order = sorted_order(&field_entries, |a, b| {
            (a.class, a.name, a.ty).cmp(&(b.class, b.name, b.ty))
        });
        let field_remap = invert(&field_order);

        let method_entries: Vec<MethodEntry> = self
            .methods
            .iter()
            .map(|m| MethodEntry {
                class: ty(m.class),
                proto: proto_remap[m.proto.0 as usize] as u16,
                name: string_remap[m.name.0 as usize],
            })
            .collect();
        let method_order = sorted_order(&method_entries, |a, b| {
            (a.class, a.name, a.proto).cmp(&(b.class, b.name, b.proto))
        });
        let method_remap = invert(&method_order);

        log::debug!(
            "pools finished: {} strings, {} types, {} protos, {} fields, {} methods",
            strings.len(),
            type_keys.len(),
            proto_entries.len(),
            field_entries.len(),
            method_entries.len()
        );

        Ok(Pools {
            strings: permute(strings, &string_order),
            types: permute(type_keys, &type_order),
            protos: permute(proto_entries, &proto_order),
            fields: permute(field_entries, &field_order),
            methods: permute(method_entries, &method_order),
            string_remap,
            type_remap,
            proto_remap,
            field_remap,
            method_remap,
        })
    }
}

impl Intern for PoolBuilder {
    fn intern_string(&mut self, text: &str) -> Result<StringIdx> {
        if let Some(i) = self.strings.get_index_of(text) {
            return Ok(StringIdx(index(i)));
        }
        let units = text.encode_utf16().count();
        if units > MAX_STRING_UNITS {
            return Err(SynthError::Encoding(format!(
                "string of {units} UTF-16 units exceeds {MAX_STRING_UNITS}"
            )));
        }
        let (i, _) = self.strings.insert_full(text.to_string());
        log::trace!("string #{i}: {text:?}");
        Ok(StringIdx(index(i)))
    }

    fn intern_type(&mut self, descriptor: &str) -> Result<TypeIdx> {
        let name = self.intern_string(descriptor)?;
        let (i, _) = self.types.insert_full(name);
        Ok(TypeIdx(index(i)))
    }

    fn intern_proto(&mut self, proto: &ProtoDescriptor) -> Result<ProtoIdx> {
        let shorty = self.intern_string(&proto.shorty())?;
        let return_type = self.intern_type(proto.return_type.as_str())?;
        let params = proto
            .params
            .iter()
            .map(|p| self.intern_type(p.as_str()))
            .collect::<Result<Vec<_>>>()?;
        let (i, _) = self.protos.insert_full(ProtoKey {
            shorty,
            return_type,
            params,
        });
        Ok(ProtoIdx(index(i)))
    }

    fn intern_field(&mut self, class: &str, name: &str, ty: &str) -> Result<FieldIdx> {
        let key = FieldKey {
            class: self.intern_type(class)?,
            name: self.intern_string(name)?,
            ty: self.intern_type(ty)?,
        };
        let (i, _) = self.fields.insert_full(key);
        Ok(FieldIdx(index(i)))
    }

    fn intern_method(
        &mut self,
        class: &str,
        name: &str,
        proto: &ProtoDescriptor,
    ) -> Result<MethodIdx> {
        let key = MethodKey {
            class: self.intern_type(class)?,
            name: self.intern_string(name)?,
            proto: self.intern_proto(proto)?,
        };
        let (i, _) = self.methods.insert_full(key);
        Ok(MethodIdx(index(i)))
    }
}

fn check_count(pool: &str, count: usize) -> Result<()> {
    if count > MAX_INDEXED {
        return Err(SynthError::Encoding(format!(
            "too many {pool}: {count} (max {MAX_INDEXED})"
        )));
    }
    Ok(())
}

/// Positions of `items` in sorted order (stable).
fn sorted_order<T>(items: &[T], cmp: impl Fn(&T, &T) -> Ordering) -> Vec<usize> {
    let mut order: Vec<usize> = (0..items.len()).collect();
    order.sort_by(|&a, &b| cmp(&items[a], &items[b]));
    order
}

/// `order[final] = provisional` into `remap[provisional] = final`.
fn invert(order: &[usize]) -> Vec<u32> {
    let mut remap = vec![0u32; order.len()];
    for (final_idx, &provisional) in order.iter().enumerate() {
        remap[provisional] = final_idx as u32;
    }
    remap
}

fn permute<T>(items: Vec<T>, order: &[usize]) -> Vec<T> {
    let mut slots: Vec<Option<T>> = items.into_iter().map(Some).collect();
    order.iter().filter_map(|&i| slots[i].take()).collect()
}

/// A `proto_id_item` with final indices.
#[derive(Clone, PartialEq, Eq, Debug)]
pub struct ProtoEntry {
    pub shorty: u32,
    pub return_type: u16,
    pub params: Vec<u16>,
}

/// A `field_id_item` with final indices.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct FieldEntry {
    pub class: u16,
    pub ty: u16,
    pub name: u32,
}

/// A `method_id_item` with final indices.
#[derive(Clone, Copy, PartialEq, Eq, Debug)]
pub struct MethodEntry {
    pub class: u16,
    pub proto: u16,
    pub name: u32,
}

/// Sorted pools plus the remap tables from provisional indices.
#[derive(Debug)]
pub struct Pools {
    pub strings: Vec<String>,
    /// Final string index of each type descriptor.
    pub types: Vec<u32>,
    pub protos: Vec<ProtoEntry>,
    pub fields: Vec<FieldEntry>,
    pub methods: Vec<MethodEntry>,
    string_remap: Vec<u32>,
    type_remap: Vec<u32>,
    proto_remap: Vec<u32>,
    field_remap: Vec<u32>,
    method_remap: Vec<u32>,
}

impl Pools {
    pub fn string(&self, idx: StringIdx) -> u32 {
        self.string_remap[idx.0 as usize]
    }

    pub fn ty(&self, idx: TypeIdx) -> u16 {
        self.type_remap[idx.0 as usize] as u16
    }

    pub fn proto(&self, idx: ProtoIdx) -> u16 {
        self.proto_remap[idx.0 as usize] as u16
    }

    pub fn field(&self, idx: FieldIdx) -> u16 {
        self.field_remap[idx.0 as usize] as u16
    }

    pub fn method(&self, idx: MethodIdx) -> u16 {
        self.method_remap[idx.0 as usize] as u16
    }

    /// Descriptor of a final type index.
    pub fn type_descriptor(&self, final_idx: u16) -> &str {
        &self.strings[self.types[final_idx as usize] as usize]
    }
}

/// A [`PoolBuilder`] shared between threads.
///
/// Each intern call holds the lock for its own duration only. Final indices
/// do not depend on interleaving because [`PoolBuilder::finish`] orders
/// pools by content.
#[derive(Debug, Default)]
pub struct SharedPoolBuilder {
    inner: Mutex<PoolBuilder>,
}

impl SharedPoolBuilder {
    pub fn new() -> Self {
        Self::default()
    }

    fn lock(&self) -> MutexGuard<'_, PoolBuilder> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn into_inner(self) -> PoolBuilder {
        self.inner
            .into_inner()
            .unwrap_or_else(PoisonError::into_inner)
    }
}

impl Intern for &SharedPoolBuilder {
    fn intern_string(&mut self, text: &str) -> Result<StringIdx> {
        self.lock().intern_string(text)
    }

    fn intern_type(&mut self, descriptor: &str) -> Result<TypeIdx> {
        self.lock().intern_type(descriptor)
    }

    fn intern_proto(&mut self, proto: &ProtoDescriptor) -> Result<ProtoIdx> {
        self.lock().intern_proto(proto)
    }

    fn intern_field(&mut self, class: &str, name: &str, ty: &str) -> Result<FieldIdx> {
        self.lock().intern_field(class, name, ty)
    }

    fn intern_method(
        &mut self,
        class: &str,
        name: &str,
        proto: &ProtoDescriptor,
    ) -> Result<MethodIdx> {
        self.lock().intern_method(class, name, proto)
    }
}
