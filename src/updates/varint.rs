// created = "2026-10-17"
// modified = "2026-10-17"

//! Variable-length integers, strings and byte buffers.
//!
//! Unsigned integers use 7 bits per byte with the high bit marking
//! continuation. Signed integers carry the sign in bit 6 of the first byte,
//! leaving 6 magnitude bits there, so that a negative zero can be written.
//! Run-length columns use that spare state as a flag.

use crate::error::DecodeError;

// ============================================================================
// Writing
// ============================================================================

/// Append an unsigned variable-length integer.
pub fn write_var_u64(buf: &mut Vec<u8>, mut n: u64) {
    while n >= 0x80 {
        buf.push((n as u8 & 0x7f) | 0x80);
        n >>= 7;
    }
    buf.push(n as u8);
}

/// Append a signed integer given as magnitude and sign. `negative` with a
/// zero magnitude encodes negative zero.
pub fn write_signed(buf: &mut Vec<u8>, magnitude: u64, negative: bool) {
    let mut first = (magnitude & 0x3f) as u8;
    if negative {
        first |= 0x40;
    }
    let mut rest = magnitude >> 6;
    if rest > 0 {
        first |= 0x80;
    }
    buf.push(first);
    while rest > 0 {
        let mut byte = (rest & 0x7f) as u8;
        rest >>= 7;
        if rest > 0 {
            byte |= 0x80;
        }
        buf.push(byte);
    }
}

/// Append a signed variable-length integer.
pub fn write_var_i64(buf: &mut Vec<u8>, n: i64) {
    write_signed(buf, n.unsigned_abs(), n < 0);
}

/// Append a length-prefixed byte buffer.
pub fn write_buf(buf: &mut Vec<u8>, bytes: &[u8]) {
    write_var_u64(buf, bytes.len() as u64);
    buf.extend_from_slice(bytes);
}

/// Append a length-prefixed UTF-8 string.
pub fn write_string(buf: &mut Vec<u8>, s: &str) {
    write_buf(buf, s.as_bytes());
}

// ============================================================================
// Reading
// ============================================================================

/// A forward-only reader over a byte slice.
#[derive(Debug, Clone)]
pub struct Cursor<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> Cursor<'a> {
    pub fn new(buf: &'a [u8]) -> Cursor<'a> {
        return Cursor { buf, pos: 0 };
    }

    /// Number of unread bytes.
    #[inline]
    pub fn remaining(&self) -> usize {
        return self.buf.len() - self.pos;
    }

    #[inline]
    pub fn has_content(&self) -> bool {
        return self.pos < self.buf.len();
    }

    pub fn read_u8(&mut self) -> Result<u8, DecodeError> {
        let byte = *self.buf.get(self.pos).ok_or(DecodeError::UnexpectedEof)?;
        self.pos += 1;
        return Ok(byte);
    }

    pub fn read_exact(&mut self, len: usize) -> Result<&'a [u8], DecodeError> {
        if self.remaining() < len {
            return Err(DecodeError::UnexpectedEof);
        }
        let slice = &self.buf[self.pos..self.pos + len];
        self.pos += len;
        return Ok(slice);
    }

    /// Everything not yet read.
    pub fn read_rest(&mut self) -> &'a [u8] {
        let slice = &self.buf[self.pos..];
        self.pos = self.buf.len();
        return slice;
    }

    pub fn read_var_u64(&mut self) -> Result<u64, DecodeError> {
        let mut value: u64 = 0;
        let mut shift = 0u32;
        loop {
            let byte = self.read_u8()?;
            let chunk = (byte & 0x7f) as u64;
            if shift >= 64 || (chunk << shift) >> shift != chunk {
                return Err(DecodeError::VarIntOverflow);
            }
            value |= chunk << shift;
            if byte & 0x80 == 0 {
                return Ok(value);
            }
            shift += 7;
        }
    }

    pub fn read_var_u32(&mut self) -> Result<u32, DecodeError> {
        let value = self.read_var_u64()?;
        return u32::try_from(value).map_err(|_| DecodeError::VarIntOverflow);
    }

    /// Read a signed integer as magnitude and sign.
    pub fn read_signed(&mut self) -> Result<(u64, bool), DecodeError> {
        let first = self.read_u8()?;
        let negative = first & 0x40 != 0;
        let mut magnitude = (first & 0x3f) as u64;
        let mut shift = 6u32;
        let mut more = first & 0x80 != 0;
        while more {
            let byte = self.read_u8()?;
            let chunk = (byte & 0x7f) as u64;
            if shift >= 64 || (chunk << shift) >> shift != chunk {
                return Err(DecodeError::VarIntOverflow);
            }
            magnitude |= chunk << shift;
            shift += 7;
            more = byte & 0x80 != 0;
        }
        return Ok((magnitude, negative));
    }

    pub fn read_var_i64(&mut self) -> Result<i64, DecodeError> {
        let (magnitude, negative) = self.read_signed()?;
        let value = i64::try_from(magnitude).map_err(|_| DecodeError::VarIntOverflow)?;
        return Ok(if negative { -value } else { value });
    }

    pub fn read_buf(&mut self) -> Result<&'a [u8], DecodeError> {
        let len = self.read_var_u64()?;
        let len = usize::try_from(len).map_err(|_| DecodeError::VarIntOverflow)?;
        return self.read_exact(len);
    }

    pub fn read_string(&mut self) -> Result<&'a str, DecodeError> {
        let bytes = self.read_buf()?;
        return std::str::from_utf8(bytes).map_err(|_| DecodeError::InvalidUtf8);
    }

    /// Fail if anything is left unread.
    pub fn finish(&self) -> Result<(), DecodeError> {
        if self.has_content() {
            return Err(DecodeError::TrailingBytes(self.remaining()));
        }
        return Ok(());
    }
}
