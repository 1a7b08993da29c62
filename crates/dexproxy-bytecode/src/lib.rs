//! DEX container format for dexproxy.
//!
//! This crate contains:
//! - Format definitions (header, map item types, constants)
//! - Primitive encodings (ULEB128, MUTF-8) and integrity checksums
//! - The Dalvik instruction subset used by synthesized proxies
//! - A verifying reader ([`DexFile`]) and a human-readable [`dump`]

pub mod bytecode;

// Re-export commonly used items at crate root
pub use bytecode::{
    ClassData, ClassDefItem, CodeItem, DexError, DexFile, ENDIAN_CONSTANT, EncodedField,
    EncodedMethod, FieldIdItem, HEADER_SIZE, Header, ITEM_ALIGN, Instruction, InvokeKind, MAGIC,
    MapItem, MapItemType, MemberRef, MethodIdItem, NO_INDEX, ProtoIdItem, RefKind, Reference,
    VERSION, align_up, checksum, dump, leb128, mutf8,
};
