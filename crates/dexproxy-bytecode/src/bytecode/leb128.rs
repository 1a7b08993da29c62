//! LEB128 variable-length integers as used by DEX data items.

/// Append `value` as unsigned LEB128.
pub fn write_uleb128(out: &mut Vec<u8>, mut value: u32) {
    loop {
        let byte = (value & 0x7f) as u8;
        value >>= 7;
        if value == 0 {
            out.push(byte);
            return;
        }
        out.push(byte | 0x80);
    }
}

/// Encoded length of `value` in bytes.
pub fn uleb128_len(value: u32) -> usize {
    match value {
        0..=0x7f => 1,
        0x80..=0x3fff => 2,
        0x4000..=0x1f_ffff => 3,
        0x20_0000..=0x0fff_ffff => 4,
        _ => 5,
    }
}

/// Read an unsigned LEB128 at `*offset`, advancing it.
///
/// Returns `None` when the input ends early or the encoding exceeds five
/// bytes / 32 bits.
pub fn read_uleb128(bytes: &[u8], offset: &mut usize) -> Option<u32> {
    let mut result: u32 = 0;
    for i in 0..5 {
        let byte = *bytes.get(*offset)?;
        *offset += 1;
        let payload = (byte & 0x7f) as u32;
        if i == 4 && payload > 0x0f {
            return None;
        }
        result |= payload << (7 * i);
        if byte & 0x80 == 0 {
            return Some(result);
        }
    }
    None
}
