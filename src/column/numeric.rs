//! Binary `numeric` cells.
//!
//! Layout: `ndigits`, `weight`, `sign` and `dscale` as 16-bit big-endian
//! words, then `ndigits` base-10000 digits. The first digit is worth
//! `10000^weight`.

use super::Column;
use crate::error::{Error, Result};

const NUMERIC_POS: u16 = 0x0000;
const NUMERIC_NEG: u16 = 0x4000;
const NUMERIC_NAN: u16 = 0xC000;
const NUMERIC_PINF: u16 = 0xD000;
const NUMERIC_NINF: u16 = 0xF000;

fn invalid(column: &Column, reason: &str) -> Error {
    Error::Type(format!(
        "column \"{}\": invalid binary numeric: {}",
        column.name(),
        reason
    ))
}

fn word(bytes: &[u8], index: usize) -> Option<u16> {
    let at = index.checked_mul(2)?;
    let pair = bytes.get(at..at.checked_add(2)?)?;
    pair.try_into().ok().map(u16::from_be_bytes)
}

/// Render a binary `numeric` the way the server prints it in text format.
pub(crate) fn numeric_text(column: &Column, bytes: &[u8]) -> Result<String> {
    let header = |index| word(bytes, index).ok_or_else(|| invalid(column, "short header"));
    let ndigits = usize::from(header(0)?);
    let weight = i64::from(header(1)? as i16);
    let sign = header(2)?;
    let dscale = usize::from(header(3)?);

    match sign {
        NUMERIC_NAN => return Ok("NaN".to_string()),
        NUMERIC_PINF => return Ok("Infinity".to_string()),
        NUMERIC_NINF => return Ok("-Infinity".to_string()),
        NUMERIC_POS | NUMERIC_NEG => {}
        other => return Err(invalid(column, &format!("sign {:#06x}", other))),
    }
    if bytes.len() != 8 + ndigits * 2 {
        return Err(invalid(column, "length does not match the digit count"));
    }
    let digits = (0..ndigits)
        .map(|i| match word(bytes, i + 4) {
            Some(d) if d < 10_000 => Ok(d),
            _ => Err(invalid(column, "digit out of range")),
        })
        .collect::<Result<Vec<u16>>>()?;
    // digit at `index` of the base-10000 expansion, zero outside the stored ones
    let digit = |index: i64| {
        usize::try_from(index)
            .ok()
            .and_then(|i| digits.get(i).copied())
            .unwrap_or(0)
    };

    let mut text = String::with_capacity(ndigits * 4 + dscale + 2);
    if sign == NUMERIC_NEG {
        text.push('-');
    }
    if weight < 0 {
        text.push('0');
    } else {
        text.push_str(&digit(0).to_string());
        for index in 1..=weight {
            text.push_str(&format!("{:04}", digit(index)));
        }
    }
    if dscale > 0 {
        let mut fraction = String::with_capacity(dscale + 4);
        let mut index = weight + 1;
        while fraction.len() < dscale {
            fraction.push_str(&format!("{:04}", digit(index)));
            index += 1;
        }
        fraction.truncate(dscale);
        text.push('.');
        text.push_str(&fraction);
    }
    Ok(text)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pq::FieldInfo;
    use crate::protocol::types::{FormatCode, oid};

    fn numeric(weight: i16, sign: u16, dscale: u16, digits: &[u16]) -> Vec<u8> {
        let mut bytes = Vec::new();
        bytes.extend_from_slice(&(digits.len() as u16).to_be_bytes());
        bytes.extend_from_slice(&weight.to_be_bytes());
        bytes.extend_from_slice(&sign.to_be_bytes());
        bytes.extend_from_slice(&dscale.to_be_bytes());
        for d in digits {
            bytes.extend_from_slice(&d.to_be_bytes());
        }
        bytes
    }

    fn render(bytes: &[u8]) -> Result<String> {
        let column = Column::from_field(&FieldInfo::new("n", oid::NUMERIC, FormatCode::Binary));
        numeric_text(&column, bytes)
    }

    #[test]
    fn integers_and_fractions() {
        assert_eq!(render(&numeric(1, NUMERIC_POS, 0, &[1, 2345])).unwrap(), "12345");
        assert_eq!(render(&numeric(0, NUMERIC_POS, 2, &[123, 4500])).unwrap(), "123.45");
        assert_eq!(render(&numeric(0, NUMERIC_NEG, 2, &[123, 4500])).unwrap(), "-123.45");
        assert_eq!(render(&numeric(-1, NUMERIC_POS, 4, &[1])).unwrap(), "0.0001");
        assert_eq!(render(&numeric(-2, NUMERIC_POS, 6, &[12])).unwrap(), "0.000000");
        // trailing zero groups are not stored
        assert_eq!(render(&numeric(2, NUMERIC_POS, 0, &[1])).unwrap(), "100000000");
    }

    #[test]
    fn zero_keeps_its_scale() {
        assert_eq!(render(&numeric(0, NUMERIC_POS, 0, &[])).unwrap(), "0");
        assert_eq!(render(&numeric(0, NUMERIC_POS, 3, &[])).unwrap(), "0.000");
    }

    #[test]
    fn special_values() {
        assert_eq!(render(&numeric(0, NUMERIC_NAN, 0, &[])).unwrap(), "NaN");
        assert_eq!(render(&numeric(0, NUMERIC_PINF, 0, &[])).unwrap(), "Infinity");
        assert_eq!(render(&numeric(0, NUMERIC_NINF, 0, &[])).unwrap(), "-Infinity");
    }

    #[test]
    fn malformed() {
        assert!(render(&[0, 1]).is_err());
        assert!(render(&numeric(0, 0x1234, 0, &[1])).is_err());
        assert!(render(&numeric(0, NUMERIC_POS, 0, &[10_000])).is_err());
        let mut short = numeric(0, NUMERIC_POS, 0, &[1, 2]);
        short.pop();
        assert!(render(&short).is_err());
    }
}
