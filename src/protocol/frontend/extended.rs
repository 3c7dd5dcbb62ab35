//! Extended query protocol messages.
//!
//! Every statement runs as the unnamed statement and the unnamed portal:
//! Parse, Bind, Describe portal, Execute, Sync.

use crate::protocol::codec::MessageBuilder;
use crate::protocol::types::{FormatCode, Oid};

/// Write a Parse message for the unnamed statement.
///
/// `param_types` entries of 0 let the server infer the type.
pub fn write_parse(buf: &mut Vec<u8>, query: &str, param_types: &[Oid]) {
    let mut msg = MessageBuilder::new(buf, super::msg_type::PARSE);
    msg.write_cstr("");
    msg.write_cstr(query);
    msg.write_i16(param_types.len() as i16);
    for &oid in param_types {
        msg.write_i32(oid as i32);
    }
    msg.finish();
}

/// Write a Bind message binding the unnamed statement to the unnamed portal.
///
/// `values` and `formats` are parallel; `None` is sent as SQL NULL.
/// All result columns are requested in `result_format`.
pub fn write_bind(
    buf: &mut Vec<u8>,
    values: &[Option<&[u8]>],
    formats: &[FormatCode],
    result_format: FormatCode,
) {
    let mut msg = MessageBuilder::new(buf, super::msg_type::BIND);
    msg.write_cstr("");
    msg.write_cstr("");

    msg.write_i16(formats.len() as i16);
    for &fmt in formats {
        msg.write_i16(fmt.as_i16());
    }

    msg.write_i16(values.len() as i16);
    for value in values {
        match value {
            Some(bytes) => {
                msg.write_i32(bytes.len() as i32);
                msg.write_bytes(bytes);
            }
            None => msg.write_i32(-1),
        }
    }

    msg.write_i16(1);
    msg.write_i16(result_format.as_i16());
    msg.finish();
}

/// Write a Describe message for the unnamed portal.
pub fn write_describe_portal(buf: &mut Vec<u8>) {
    let mut msg = MessageBuilder::new(buf, super::msg_type::DESCRIBE);
    msg.write_u8(b'P');
    msg.write_cstr("");
    msg.finish();
}

/// Write an Execute message for the unnamed portal with no row limit.
pub fn write_execute(buf: &mut Vec<u8>) {
    let mut msg = MessageBuilder::new(buf, super::msg_type::EXECUTE);
    msg.write_cstr("");
    msg.write_i32(0);
    msg.finish();
}

/// Write a Sync message.
///
/// Ends the extended query sequence: implicit COMMIT on success outside a
/// transaction block, and the server answers with ReadyForQuery.
pub fn write_sync(buf: &mut Vec<u8>) {
    MessageBuilder::new(buf, super::msg_type::SYNC).finish();
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_layout() {
        let mut buf = Vec::new();
        write_parse(&mut buf, "SELECT $1", &[23]);
        assert_eq!(buf[0], b'P');
        let len = i32::from_be_bytes([buf[1], buf[2], buf[3], buf[4]]);
        assert_eq!(len as usize, buf.len() - 1);
        assert!(buf.ends_with(&[0, 1, 0, 0, 0, 23]));
    }

    #[test]
    fn bind_writes_null_and_values() {
        let mut buf = Vec::new();
        write_bind(
            &mut buf,
            &[None, Some(&b"42"[..])],
            &[FormatCode::Text, FormatCode::Text],
            FormatCode::Binary,
        );
        let expected_tail: &[u8] = &[
            0, 2, 0, 0, 0, 0, // two text formats
            0, 2, // two values
            0xff, 0xff, 0xff, 0xff, // NULL
            0, 0, 0, 2, b'4', b'2', // "42"
            0, 1, 0, 1, // one binary result format
        ];
        assert_eq!(&buf[7..], expected_tail);
    }

    #[test]
    fn execute_and_sync() {
        let mut buf = Vec::new();
        write_execute(&mut buf);
        assert_eq!(buf, [b'E', 0, 0, 0, 9, 0, 0, 0, 0, 0]);

        buf.clear();
        write_sync(&mut buf);
        assert_eq!(buf, [b'S', 0, 0, 0, 4]);
    }
}
