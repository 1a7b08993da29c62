//! DEX 035 simple names: class name segments, method and field names.
//!
//! ```text
//! SimpleName     = SimpleNameChar+
//! SimpleNameChar = 'A'..'Z' | 'a'..'z' | '0'..'9' | '$' | '-' | '_'
//!                | U+00a1..U+1fff | U+2010..U+2027 | U+2030..U+d7ff
//!                | U+e000..U+ffef | U+10000..U+10ffff
//! ```
//!
//! Space, U+00a0 and U+202f only became legal in version 040 and are
//! rejected here.

/// Whether `c` may appear in a simple name.
pub fn is_simple_name_char(c: char) -> bool {
    matches!(c,
        'A'..='Z'
        | 'a'..='z'
        | '0'..='9'
        | '$'
        | '-'
        | '_'
        | '\u{a1}'..='\u{1fff}'
        | '\u{2010}'..='\u{2027}'
        | '\u{2030}'..='\u{d7ff}'
        | '\u{e000}'..='\u{ffef}'
        | '\u{10000}'..='\u{10ffff}')
}

/// Whether `name` is a non-empty simple name.
pub fn is_simple_name(name: &str) -> bool {
    !name.is_empty() && name.chars().all(is_simple_name_char)
}
