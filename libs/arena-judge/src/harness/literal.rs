//! String-literal encoders for embedding data into generated programs.
//!
//! Everything a harness embeds goes through one of these, so a test input
//! can never terminate the literal it lives in. Output is pure printable
//! ASCII; every other code point is written as an escape sequence in the
//! target language's own syntax.

use std::fmt::Write;

/// Double-quoted JavaScript / TypeScript string literal
///
/// Astral code points become UTF-16 surrogate pairs (`\uD83D\uDE00`).
pub fn javascript(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            ' '..='~' => out.push(c),
            _ => {
                let mut units = [0u16; 2];
                for unit in c.encode_utf16(&mut units) {
                    let _ = write!(out, "\\u{:04X}", unit);
                }
            }
        }
    }
    out.push('"');
    out
}

/// Double-quoted Python 3 string literal
///
/// Python does not join surrogate pairs, so astral code points use the
/// eight-digit `\U0001F600` form.
pub fn python(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for c in value.chars() {
        match c {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            ' '..='~' => out.push(c),
            c if (c as u32) <= 0xFF => {
                let _ = write!(out, "\\x{:02x}", c as u32);
            }
            c if (c as u32) <= 0xFFFF => {
                let _ = write!(out, "\\u{:04x}", c as u32);
            }
            c => {
                let _ = write!(out, "\\U{:08x}", c as u32);
            }
        }
    }
    out.push('"');
    out
}
