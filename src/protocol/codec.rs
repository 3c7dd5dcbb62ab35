//! PostgreSQL wire protocol encoding and decoding primitives.
//!
//! PostgreSQL uses big-endian (network byte order) for all integers.

use zerocopy::FromBytes;
use zerocopy::byteorder::big_endian::{I32 as I32BE, U16 as U16BE, U32 as U32BE};

use crate::pq::error::{PqError, PqResult};

fn too_short(what: &str, have: usize, need: usize) -> PqError {
    PqError::Protocol(format!("{what}: buffer too short: {have} < {need}"))
}

/// Read 1-byte unsigned integer.
#[inline]
pub fn read_u8(data: &[u8]) -> PqResult<(u8, &[u8])> {
    match data.split_first() {
        Some((first, rest)) => Ok((*first, rest)),
        None => Err(PqError::Protocol("read_u8: empty buffer".into())),
    }
}

/// Read 2-byte big-endian unsigned integer.
#[inline]
pub fn read_u16(data: &[u8]) -> PqResult<(u16, &[u8])> {
    let (value, rest) =
        U16BE::read_from_prefix(data).map_err(|_short| too_short("read_u16", data.len(), 2))?;
    Ok((value.get(), rest))
}

/// Read 4-byte big-endian signed integer.
#[inline]
pub fn read_i32(data: &[u8]) -> PqResult<(i32, &[u8])> {
    let (value, rest) =
        I32BE::read_from_prefix(data).map_err(|_short| too_short("read_i32", data.len(), 4))?;
    Ok((value.get(), rest))
}

/// Read 4-byte big-endian unsigned integer.
#[inline]
pub fn read_u32(data: &[u8]) -> PqResult<(u32, &[u8])> {
    let (value, rest) =
        U32BE::read_from_prefix(data).map_err(|_short| too_short("read_u32", data.len(), 4))?;
    Ok((value.get(), rest))
}

/// Read fixed-length bytes.
#[inline]
pub fn read_bytes(data: &[u8], len: usize) -> PqResult<(&[u8], &[u8])> {
    data.split_at_checked(len)
        .ok_or_else(|| too_short("read_bytes", data.len(), len))
}

/// Read null-terminated string (PostgreSQL String type).
/// Returns the string bytes (without the null terminator) and remaining data.
#[inline]
pub fn read_cstring(data: &[u8]) -> PqResult<(&[u8], &[u8])> {
    match memchr::memchr(0, data) {
        Some(pos) => Ok((&data[..pos], &data[pos + 1..])),
        None => Err(PqError::Protocol(
            "read_cstring: no null terminator found".into(),
        )),
    }
}

/// Read null-terminated string as &str.
#[inline]
pub fn read_cstr(data: &[u8]) -> PqResult<(&str, &[u8])> {
    let (bytes, rest) = read_cstring(data)?;
    let s = simdutf8::compat::from_utf8(bytes)
        .map_err(|e| PqError::Protocol(format!("read_cstr: invalid UTF-8: {e}")))?;
    Ok((s, rest))
}

/// Message builder that back-fills the length field.
///
/// PostgreSQL message format:
/// - Type byte (1 byte) - NOT included in length
/// - Length (4 bytes) - includes itself
/// - Payload (Length - 4 bytes)
pub struct MessageBuilder<'a> {
    buf: &'a mut Vec<u8>,
    start: usize,
}

impl<'a> MessageBuilder<'a> {
    /// Start building a message with a type byte.
    pub fn new(buf: &'a mut Vec<u8>, type_byte: u8) -> Self {
        buf.push(type_byte);
        let start = buf.len();
        buf.extend_from_slice(&[0, 0, 0, 0]);
        Self { buf, start }
    }

    /// Start building a startup-phase message (no type byte).
    pub fn new_startup(buf: &'a mut Vec<u8>) -> Self {
        let start = buf.len();
        buf.extend_from_slice(&[0, 0, 0, 0]);
        Self { buf, start }
    }

    pub fn write_u8(&mut self, value: u8) {
        self.buf.push(value);
    }

    pub fn write_i16(&mut self, value: i16) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_i32(&mut self, value: i32) {
        self.buf.extend_from_slice(&value.to_be_bytes());
    }

    pub fn write_bytes(&mut self, data: &[u8]) {
        self.buf.extend_from_slice(data);
    }

    /// Write a null-terminated string.
    pub fn write_cstr(&mut self, s: &str) {
        self.buf.extend_from_slice(s.as_bytes());
        self.buf.push(0);
    }

    /// Finish building the message and fill in the length field.
    pub fn finish(self) {
        let len = (self.buf.len() - self.start) as i32;
        self.buf[self.start..self.start + 4].copy_from_slice(&len.to_be_bytes());
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn read_integers() {
        let data = [0x00, 0x2a, 0xff, 0xff, 0xff, 0xfe, 0x07];
        let (a, rest) = read_u16(&data).unwrap();
        let (b, rest) = read_i32(rest).unwrap();
        assert_eq!(a, 42);
        assert_eq!(b, -2);
        assert_eq!(rest, &[0x07]);
        assert!(read_i32(rest).is_err());
    }

    #[test]
    fn read_cstring_requires_terminator() {
        let (s, rest) = read_cstr(b"abc\0def").unwrap();
        assert_eq!(s, "abc");
        assert_eq!(rest, b"def");
        assert!(read_cstr(b"no terminator").is_err());
    }

    #[test]
    fn builder_backfills_length() {
        let mut buf = Vec::new();
        let mut msg = MessageBuilder::new(&mut buf, b'Q');
        msg.write_cstr("SELECT 1");
        msg.finish();
        assert_eq!(buf[0], b'Q');
        assert_eq!(&buf[1..5], &13_i32.to_be_bytes());
    }
}
