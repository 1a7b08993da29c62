//! Modified UTF-8, the string encoding of DEX `string_data_item`s.
//!
//! Differences from standard UTF-8: U+0000 is written as `C0 80`, and
//! supplementary characters are written as two three-byte surrogates.

/// Encode `text` as MUTF-8 (without the trailing NUL).
///
/// Returns the bytes and the length in UTF-16 code units, which is the value
/// the string data item's size prefix records.
pub fn encode(text: &str) -> (Vec<u8>, u32) {
    let mut out = Vec::with_capacity(text.len());
    let mut units = 0u32;
    for unit in text.encode_utf16() {
        units += 1;
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
    (out, units)
}

/// Decode NUL-terminated MUTF-8 starting at `bytes[0]`.
///
/// Returns the string and the number of bytes consumed, including the
/// terminator. `None` on truncated or ill-formed input.
pub fn decode(bytes: &[u8]) -> Option<(String, usize)> {
    let mut units: Vec<u16> = Vec::new();
    let mut i = 0;
    loop {
        let b0 = *bytes.get(i)?;
        if b0 == 0 {
            i += 1;
            break;
        }
        if b0 < 0x80 {
            units.push(b0 as u16);
            i += 1;
        } else if b0 & 0xe0 == 0xc0 {
            let b1 = continuation(bytes, i + 1)?;
            units.push((((b0 & 0x1f) as u16) << 6) | b1);
            i += 2;
        } else if b0 & 0xf0 == 0xe0 {
            let b1 = continuation(bytes, i + 1)?;
            let b2 = continuation(bytes, i + 2)?;
            units.push((((b0 & 0x0f) as u16) << 12) | (b1 << 6) | b2);
            i += 3;
        } else {
            return None;
        }
    }

    let text = char::decode_utf16(units)
        .collect::<Result<String, _>>()
        .ok()?;
    Some((text, i))
}

fn continuation(bytes: &[u8], at: usize) -> Option<u16> {
    let b = *bytes.get(at)?;
    (b & 0xc0 == 0x80).then_some((b & 0x3f) as u16)
}

/// Compare two strings the way DEX orders its string pool: by UTF-16 code
/// units, not by code points or bytes.
pub fn compare_utf16(a: &str, b: &str) -> std::cmp::Ordering {
    a.encode_utf16().cmp(b.encode_utf16())
}
