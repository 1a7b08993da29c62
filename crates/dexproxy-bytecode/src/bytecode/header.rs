//! DEX file header (112 bytes).
//!
//! Layout:
//! - 0-31: identity and integrity (magic, Adler-32 checksum, SHA-1 signature)
//! - 32-55: file_size, header_size, endian_tag, link_size, link_off, map_off
//! - 56-111: (size, offset) pairs for string_ids, type_ids, proto_ids,
//!   field_ids, method_ids, class_defs and the data section

use super::{ENDIAN_CONSTANT, HEADER_SIZE, MAGIC};

/// File header: the first 112 bytes of a DEX file.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct Header {
    /// `dex\n035\0`
    pub magic: [u8; 8],
    /// Adler-32 of everything after this field (bytes 12..)
    pub checksum: u32,
    /// SHA-1 of everything after this field (bytes 32..)
    pub signature: [u8; 20],
    pub file_size: u32,
    pub header_size: u32,
    pub endian_tag: u32,
    pub link_size: u32,
    pub link_off: u32,
    pub map_off: u32,
    pub string_ids_size: u32,
    pub string_ids_off: u32,
    pub type_ids_size: u32,
    pub type_ids_off: u32,
    pub proto_ids_size: u32,
    pub proto_ids_off: u32,
    pub field_ids_size: u32,
    pub field_ids_off: u32,
    pub method_ids_size: u32,
    pub method_ids_off: u32,
    pub class_defs_size: u32,
    pub class_defs_off: u32,
    pub data_size: u32,
    pub data_off: u32,
}

impl Default for Header {
    fn default() -> Self {
        Self {
            magic: MAGIC,
            checksum: 0,
            signature: [0; 20],
            file_size: 0,
            header_size: HEADER_SIZE as u32,
            endian_tag: ENDIAN_CONSTANT,
            link_size: 0,
            link_off: 0,
            map_off: 0,
            string_ids_size: 0,
            string_ids_off: 0,
            type_ids_size: 0,
            type_ids_off: 0,
            proto_ids_size: 0,
            proto_ids_off: 0,
            field_ids_size: 0,
            field_ids_off: 0,
            method_ids_size: 0,
            method_ids_off: 0,
            class_defs_size: 0,
            class_defs_off: 0,
            data_size: 0,
            data_off: 0,
        }
    }
}

#[inline]
fn read_u32(bytes: &[u8], offset: usize) -> u32 {
    u32::from_le_bytes([
        bytes[offset],
        bytes[offset + 1],
        bytes[offset + 2],
        bytes[offset + 3],
    ])
}

impl Header {
    /// Decode the header from the first 112 bytes.
    pub fn from_bytes(bytes: &[u8]) -> Self {
        assert!(bytes.len() >= HEADER_SIZE, "header too short");

        let mut magic = [0u8; 8];
        magic.copy_from_slice(&bytes[0..8]);
        let mut signature = [0u8; 20];
        signature.copy_from_slice(&bytes[12..32]);

        Self {
            magic,
            checksum: read_u32(bytes, 8),
            signature,
            file_size: read_u32(bytes, 32),
            header_size: read_u32(bytes, 36),
            endian_tag: read_u32(bytes, 40),
            link_size: read_u32(bytes, 44),
            link_off: read_u32(bytes, 48),
            map_off: read_u32(bytes, 52),
            string_ids_size: read_u32(bytes, 56),
            string_ids_off: read_u32(bytes, 60),
            type_ids_size: read_u32(bytes, 64),
            type_ids_off: read_u32(bytes, 68),
            proto_ids_size: read_u32(bytes, 72),
            proto_ids_off: read_u32(bytes, 76),
            field_ids_size: read_u32(bytes, 80),
            field_ids_off: read_u32(bytes, 84),
            method_ids_size: read_u32(bytes, 88),
            method_ids_off: read_u32(bytes, 92),
            class_defs_size: read_u32(bytes, 96),
            class_defs_off: read_u32(bytes, 100),
            data_size: read_u32(bytes, 104),
            data_off: read_u32(bytes, 108),
        }
    }

    /// Encode the header to 112 bytes.
    pub fn to_bytes(&self) -> [u8; HEADER_SIZE] {
        let mut bytes = [0u8; HEADER_SIZE];
        bytes[0..8].copy_from_slice(&self.magic);
        bytes[8..12].copy_from_slice(&self.checksum.to_le_bytes());
        bytes[12..32].copy_from_slice(&self.signature);

        let words = [
            self.file_size,
            self.header_size,
            self.endian_tag,
            self.link_size,
            self.link_off,
            self.map_off,
            self.string_ids_size,
            self.string_ids_off,
            self.type_ids_size,
            self.type_ids_off,
            self.proto_ids_size,
            self.proto_ids_off,
            self.field_ids_size,
            self.field_ids_off,
            self.method_ids_size,
            self.method_ids_off,
            self.class_defs_size,
            self.class_defs_off,
            self.data_size,
            self.data_off,
        ];
        for (i, word) in words.iter().enumerate() {
            let at = 32 + i * 4;
            bytes[at..at + 4].copy_from_slice(&word.to_le_bytes());
        }
        bytes
    }

    pub fn validate_magic(&self) -> bool {
        &self.magic[..4] == b"dex\n" && self.magic[7] == 0
    }

    /// Version digits from the magic, e.g. 35 for `035`.
    pub fn version(&self) -> Option<u32> {
        let digits = &self.magic[4..7];
        if !digits.iter().all(u8::is_ascii_digit) {
            return None;
        }
        Some(digits.iter().fold(0, |acc, d| acc * 10 + (d - b'0') as u32))
    }

    pub fn validate_endian(&self) -> bool {
        self.endian_tag == ENDIAN_CONSTANT
    }
}
