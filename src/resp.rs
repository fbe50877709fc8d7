//! # RESP2: Redis Serialization Protocol, version 2
//!
//! RESP2 is a text/byte hybrid framing with five value types: simple
//! string, error, integer, bulk string, and array. Clients send commands
//! to the server as an array of bulk strings; the server's reply type is
//! command-specific.
//!
//! This module implements a streaming-friendly [`Decoder`] that tolerates
//! arbitrarily fragmented TCP reads (it never requires a complete frame
//! to be available; an incomplete tail simply means "need more bytes"),
//! and a byte-exact [`Value::encode`] that is the decoder's inverse on
//! every type.
//!
//! [Protocol spec](https://redis.io/docs/latest/develop/reference/protocol-spec/)

use crate::constants::MAX_BULK_LEN;
use crate::errors::RespError;
use bytes::{Bytes, BytesMut};
use memchr::memchr;

/// A decoded RESP2 value.
///
/// `BulkString` and `Array` carry an `Option` to represent the RESP2 null
/// forms (`$-1\r\n` and `*-1\r\n`) distinctly from the empty string/array.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Value {
    SimpleString(Bytes),
    Error(Bytes),
    Integer(i64),
    BulkString(Option<Bytes>),
    Array(Option<Vec<Value>>),
}

impl Value {
    pub fn bulk(b: impl Into<Bytes>) -> Self {
        Value::BulkString(Some(b.into()))
    }

    pub fn nil_bulk() -> Self {
        Value::BulkString(None)
    }

    pub fn simple(s: impl Into<Bytes>) -> Self {
        Value::SimpleString(s.into())
    }

    pub fn error(s: impl Into<Bytes>) -> Self {
        Value::Error(s.into())
    }

    /// Serializes this value to bytes exactly per the RESP2 grammar. This
    /// is a byte-exact inverse of [`decode_one`] on every type:
    /// `decode(encode(v)) == v` for any `v`.
    pub fn encode(&self, out: &mut BytesMut) {
        match self {
            Value::SimpleString(s) => {
                out.extend_from_slice(b"+");
                out.extend_from_slice(s);
                out.extend_from_slice(b"\r\n");
            }
            Value::Error(s) => {
                out.extend_from_slice(b"-");
                out.extend_from_slice(s);
                out.extend_from_slice(b"\r\n");
            }
            Value::Integer(n) => {
                out.extend_from_slice(b":");
                out.extend_from_slice(n.to_string().as_bytes());
                out.extend_from_slice(b"\r\n");
            }
            Value::BulkString(None) => {
                out.extend_from_slice(b"$-1\r\n");
            }
            Value::BulkString(Some(b)) => {
                out.extend_from_slice(b"$");
                out.extend_from_slice(b.len().to_string().as_bytes());
                out.extend_from_slice(b"\r\n");
                out.extend_from_slice(b);
                out.extend_from_slice(b"\r\n");
            }
            Value::Array(None) => {
                out.extend_from_slice(b"*-1\r\n");
            }
            Value::Array(Some(items)) => {
                out.extend_from_slice(b"*");
                out.extend_from_slice(items.len().to_string().as_bytes());
                out.extend_from_slice(b"\r\n");
                for item in items {
                    item.encode(out);
                }
            }
        }
    }

    /// Convenience wrapper around [`Value::encode`] returning a fresh buffer.
    pub fn to_bytes(&self) -> BytesMut {
        let mut buf = BytesMut::new();
        self.encode(&mut buf);
        buf
    }
}

/// Decodes a single RESP2 value from the front of `buf`.
///
/// Returns `Ok(Some((value, consumed)))` when a complete value was parsed,
/// where `consumed` is the number of leading bytes of `buf` that made up
/// that value. Returns `Ok(None)` when `buf` holds a truncated (but so far
/// valid) prefix of a frame — the caller should read more bytes and retry
/// without discarding `buf`. Returns `Err` only for a genuine protocol
/// violation, never for mere incompleteness.
pub fn decode_one(buf: &[u8]) -> Result<Option<(Value, usize)>, RespError> {
    if buf.is_empty() {
        return Ok(None);
    }
    match buf[0] {
        b'+' => decode_line(buf, 1).map(|o| o.map(|(s, n)| (Value::SimpleString(s), n))),
        b'-' => decode_line(buf, 1).map(|o| o.map(|(s, n)| (Value::Error(s), n))),
        b':' => decode_integer_line(buf),
        b'$' => decode_bulk_string(buf),
        b'*' => decode_array(buf),
        other => Err(RespError::UnsupportedType(other)),
    }
}

/// Scans for the CRLF that terminates a line starting at `start` (the byte
/// right after the type marker), returning the line's contents and the
/// total number of bytes consumed (including the marker and the CRLF).
fn decode_line(buf: &[u8], start: usize) -> Result<Option<(Bytes, usize)>, RespError> {
    match memchr(b'\r', &buf[start..]) {
        None => Ok(None),
        Some(rel_cr) => {
            let cr = start + rel_cr;
            if cr + 1 >= buf.len() {
                return Ok(None);
            }
            if buf[cr + 1] != b'\n' {
                return Err(RespError::MissingCrlf);
            }
            let contents = Bytes::copy_from_slice(&buf[start..cr]);
            Ok(Some((contents, cr + 2)))
        }
    }
}

/// Parses the decimal (optionally signed) integer occupying a full line,
/// per the grammar used by both `:<int>\r\n` replies and the `<len>` field
/// of bulk strings/arrays. Returns the parsed value and bytes consumed
/// from `start` to (and including) the terminating CRLF.
fn parse_signed_line(buf: &[u8], start: usize) -> Result<Option<(i64, usize)>, RespError> {
    let (line, consumed) = match decode_line(buf, start)? {
        None => return Ok(None),
        Some(v) => v,
    };
    let text = std::str::from_utf8(&line).map_err(|_| RespError::MalformedInteger)?;
    let value: i64 = text.parse().map_err(|_| RespError::MalformedInteger)?;
    Ok(Some((value, consumed)))
}

fn decode_integer_line(buf: &[u8]) -> Result<Option<(Value, usize)>, RespError> {
    match parse_signed_line(buf, 1)? {
        None => Ok(None),
        Some((n, consumed)) => Ok(Some((Value::Integer(n), consumed))),
    }
}

fn decode_bulk_string(buf: &[u8]) -> Result<Option<(Value, usize)>, RespError> {
    let (len, header_len) = match parse_signed_line(buf, 1)? {
        None => return Ok(None),
        Some(v) => v,
    };
    if len == -1 {
        return Ok(Some((Value::BulkString(None), header_len)));
    }
    if len < -1 || len > MAX_BULK_LEN {
        return Err(RespError::LengthOutOfRange(len, MAX_BULK_LEN));
    }
    let len = len as usize;
    let payload_end = header_len + len;
    if buf.len() < payload_end + 2 {
        return Ok(None);
    }
    if &buf[payload_end..payload_end + 2] != b"\r\n" {
        return Err(RespError::MissingCrlf);
    }
    let data = Bytes::copy_from_slice(&buf[header_len..payload_end]);
    Ok(Some((Value::BulkString(Some(data)), payload_end + 2)))
}

fn decode_array(buf: &[u8]) -> Result<Option<(Value, usize)>, RespError> {
    let (count, mut offset) = match parse_signed_line(buf, 1)? {
        None => return Ok(None),
        Some(v) => v,
    };
    if count == -1 {
        return Ok(Some((Value::Array(None), offset)));
    }
    if count < -1 || count > MAX_BULK_LEN {
        return Err(RespError::LengthOutOfRange(count, MAX_BULK_LEN));
    }
    let mut items = Vec::with_capacity(count as usize);
    for _ in 0..count {
        match decode_one(&buf[offset..])? {
            None => return Ok(None),
            Some((value, consumed)) => {
                items.push(value);
                offset += consumed;
            }
        }
    }
    Ok(Some((Value::Array(Some(items)), offset)))
}

/// Accumulates bytes read from a connection and yields complete RESP2
/// values as they become available, preserving any trailing incomplete
/// bytes across calls.
#[derive(Debug, Default)]
pub struct Decoder {
    buf: BytesMut,
}

impl Decoder {
    pub fn new() -> Self {
        Self {
            buf: BytesMut::with_capacity(crate::constants::READ_BUF_INITIAL_CAP),
        }
    }

    /// Appends freshly-read bytes to the internal buffer.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.buf.extend_from_slice(bytes);
    }

    /// Attempts to decode one complete value from the front of the
    /// buffer, removing its bytes on success. `Ok(None)` means the
    /// buffered bytes are a valid but incomplete prefix; call [`Self::feed`]
    /// with more bytes and retry.
    pub fn decode_one(&mut self) -> Result<Option<Value>, RespError> {
        match decode_one(&self.buf)? {
            None => Ok(None),
            Some((value, consumed)) => {
                let _ = self.buf.split_to(consumed);
                Ok(Some(value))
            }
        }
    }

    /// `true` once no further complete value can be decoded without more
    /// input (the buffer is empty or holds only a partial frame).
    pub fn is_empty(&self) -> bool {
        self.buf.is_empty()
    }
}
