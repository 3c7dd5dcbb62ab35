//! `bytea` text encodings.
//!
//! The server prints `bytea` values in text format either as hex
//! (`\x48656c6c6f`, the default since 9.0) or in the legacy escape form
//! (`Hello\000world`, `bytea_output = escape`).

use crate::pq::error::{PqError, PqResult};

const HEX: &[u8; 16] = b"0123456789abcdef";

/// Encode bytes in the hex form the server accepts as `bytea` input.
pub fn escape_bytea(bytes: &[u8]) -> String {
    let mut out = String::with_capacity(2 + bytes.len() * 2);
    out.push_str("\\x");
    for &b in bytes {
        out.push(HEX[(b >> 4) as usize] as char);
        out.push(HEX[(b & 0x0f) as usize] as char);
    }
    out
}

fn hex_value(c: u8) -> Option<u8> {
    match c {
        b'0'..=b'9' => Some(c - b'0'),
        b'a'..=b'f' => Some(c - b'a' + 10),
        b'A'..=b'F' => Some(c - b'A' + 10),
        _ => None,
    }
}

/// Decode the text form of a `bytea` value.
///
/// Hex input must consist of digit pairs, optionally separated by ASCII
/// whitespace. Escape-form input follows libpq: `\\` is a backslash, `\ooo`
/// an octal byte, and any other backslash is dropped.
pub fn unescape_bytea(text: &[u8]) -> PqResult<Vec<u8>> {
    match text.strip_prefix(b"\\x") {
        Some(hex) => unescape_hex(hex),
        None => Ok(unescape_escape_form(text)),
    }
}

fn unescape_hex(hex: &[u8]) -> PqResult<Vec<u8>> {
    let mut out = Vec::with_capacity(hex.len() / 2);
    let mut iter = hex.iter().copied().filter(|c| !c.is_ascii_whitespace());
    while let Some(high) = iter.next() {
        let low = iter
            .next()
            .ok_or_else(|| PqError::Decode("bytea hex text: odd number of digits".into()))?;
        match (hex_value(high), hex_value(low)) {
            (Some(h), Some(l)) => out.push((h << 4) | l),
            _ => {
                return Err(PqError::Decode(format!(
                    "bytea hex text: invalid digit pair {:?}",
                    [high as char, low as char]
                )));
            }
        }
    }
    Ok(out)
}

fn is_octal(c: u8) -> bool {
    (b'0'..=b'7').contains(&c)
}

fn unescape_escape_form(text: &[u8]) -> Vec<u8> {
    let mut out = Vec::with_capacity(text.len());
    let mut i = 0;
    while let Some(&c) = text.get(i) {
        if c != b'\\' {
            out.push(c);
            i += 1;
            continue;
        }
        if text.get(i + 1) == Some(&b'\\') {
            out.push(b'\\');
            i += 2;
            continue;
        }
        match text.get(i + 1..i + 4) {
            Some(&[d1, d2, d3]) if (b'0'..=b'3').contains(&d1) && is_octal(d2) && is_octal(d3) => {
                out.push(((d1 - b'0') << 6) | ((d2 - b'0') << 3) | (d3 - b'0'));
                i += 4;
            }
            _ => i += 1,
        }
    }
    out
}
