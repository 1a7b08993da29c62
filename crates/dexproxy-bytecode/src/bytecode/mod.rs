//! DEX format definitions and the verifying reader.

pub mod checksum;
mod dex_file;
mod dump;
mod header;
mod instructions;
pub mod leb128;
mod map;
pub mod mutf8;

#[cfg(test)]
mod header_tests;

pub use dex_file::{
    ClassData, ClassDefItem, CodeItem, DexError, DexFile, EncodedField, EncodedMethod,
    FieldIdItem, MemberRef, MethodIdItem, ProtoIdItem,
};
pub use dump::dump;
pub use header::Header;
pub use instructions::{Instruction, InvokeKind, RefKind, Reference};
pub use map::{MapItem, MapItemType};

/// Magic bytes of a version 035 DEX file: `dex\n035\0`.
pub const MAGIC: [u8; 8] = *b"dex\n035\0";

/// Format version written into the magic.
pub const VERSION: u32 = 35;

/// Size of the file header in bytes.
pub const HEADER_SIZE: usize = 0x70;

/// Little-endian byte order marker.
pub const ENDIAN_CONSTANT: u32 = 0x1234_5678;

/// Absent index in 32-bit index fields (superclass, source file).
pub const NO_INDEX: u32 = 0xffff_ffff;

/// Alignment of id sections and 4-aligned data items.
pub const ITEM_ALIGN: usize = 4;

/// Round `value` up to a multiple of `align` (a power of two).
#[inline]
pub fn align_up(value: usize, align: usize) -> usize {
    (value + align - 1) & !(align - 1)
}
