use super::{ENDIAN_CONSTANT, HEADER_SIZE, Header, MAGIC, VERSION};

#[test]
fn default_header_is_valid() {
    let header = Header::default();

    assert!(header.validate_magic());
    assert!(header.validate_endian());
    assert_eq!(header.version(), Some(VERSION));
    assert_eq!(header.header_size, HEADER_SIZE as u32);
}

#[test]
fn header_roundtrip() {
    let header = Header {
        checksum: 0xdead_beef,
        signature: [7; 20],
        file_size: 0x1234,
        link_size: 0,
        link_off: 0,
        map_off: 0x1200,
        string_ids_size: 12,
        string_ids_off: 0x70,
        type_ids_size: 6,
        type_ids_off: 0xa0,
        proto_ids_size: 3,
        proto_ids_off: 0xb8,
        field_ids_size: 1,
        field_ids_off: 0xdc,
        method_ids_size: 4,
        method_ids_off: 0xe4,
        class_defs_size: 1,
        class_defs_off: 0x104,
        data_size: 0x10dc,
        data_off: 0x124,
        ..Header::default()
    };

    let bytes = header.to_bytes();
    assert_eq!(bytes.len(), HEADER_SIZE);
    assert_eq!(Header::from_bytes(&bytes), header);
}

#[test]
fn header_field_offsets() {
    let header = Header {
        file_size: 0x0102_0304,
        map_off: 0x0a0b_0c0d,
        data_off: 0x1122_3344,
        ..Header::default()
    };

    let bytes = header.to_bytes();
    assert_eq!(&bytes[0..8], &MAGIC);
    assert_eq!(&bytes[32..36], &[0x04, 0x03, 0x02, 0x01]);
    assert_eq!(&bytes[36..40], &(HEADER_SIZE as u32).to_le_bytes());
    assert_eq!(&bytes[40..44], &ENDIAN_CONSTANT.to_le_bytes());
    assert_eq!(&bytes[52..56], &[0x0d, 0x0c, 0x0b, 0x0a]);
    assert_eq!(&bytes[108..112], &[0x44, 0x33, 0x22, 0x11]);
}

#[test]
fn version_parses_magic_digits() {
    let mut header = Header::default();
    header.magic = *b"dex\n039\0";
    assert!(header.validate_magic());
    assert_eq!(header.version(), Some(39));

    header.magic = *b"dex\n0x5\0";
    assert_eq!(header.version(), None);
}

#[test]
fn invalid_magic() {
    let mut header = Header::default();
    header.magic = *b"dey\n035\0";
    assert!(!header.validate_magic());
}

#[test]
fn swapped_endian_rejected() {
    let header = Header {
        endian_tag: 0x7856_3412,
        ..Header::default()
    };
    assert!(!header.validate_endian());
}
