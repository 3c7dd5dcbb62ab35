//! COPY protocol backend messages.

use crate::pq::error::PqResult;
use crate::protocol::codec::{read_u8, read_u16};
use crate::protocol::types::FormatCode;

/// CopyInResponse, CopyOutResponse or CopyBothResponse.
///
/// The three messages share one layout; the message type byte tells them apart.
#[derive(Debug, Clone)]
pub struct CopyResponse {
    /// Overall format (0=text, 1=binary)
    pub format: FormatCode,
    pub column_formats: Vec<FormatCode>,
}

impl CopyResponse {
    /// Parse a Copy*Response message from payload bytes.
    pub fn parse(payload: &[u8]) -> PqResult<Self> {
        let (format_byte, rest) = read_u8(payload)?;
        let format = FormatCode::from_u16(format_byte as u16);

        let (num_columns, mut rest) = read_u16(rest)?;
        let mut column_formats = Vec::with_capacity(num_columns as usize);
        for _ in 0..num_columns {
            let (fmt, remaining) = read_u16(rest)?;
            column_formats.push(FormatCode::from_u16(fmt));
            rest = remaining;
        }

        Ok(Self {
            format,
            column_formats,
        })
    }

    pub fn is_binary(&self) -> bool {
        matches!(self.format, FormatCode::Binary)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_copy_response() {
        let payload = [0, 0, 2, 0, 0, 0, 0];
        let resp = CopyResponse::parse(&payload).unwrap();
        assert!(!resp.is_binary());
        assert_eq!(resp.column_formats, vec![FormatCode::Text, FormatCode::Text]);
        assert!(CopyResponse::parse(&[1, 0, 1]).is_err());
    }
}
