// created = "2026-10-17"
// modified = "2026-10-17"

//! Column encoders for the v2 update format.
//!
//! The v2 format splits every field of every block into its own column and
//! compresses each column with a scheme suited to its values: plain runs for
//! info bytes, optional runs for client ids and lengths, and runs of equal
//! differences for clocks.

use crate::error::DecodeError;
use crate::updates::varint::{Cursor, write_signed, write_string, write_var_i64, write_var_u64};

// ============================================================================
// Plain runs
// ============================================================================

/// Encodes `value, count - 1` pairs.
#[derive(Debug, Default)]
pub struct RleEncoder {
    buf: Vec<u8>,
    last: Option<u8>,
    count: u64,
}

impl RleEncoder {
    pub fn write(&mut self, value: u8) {
        if self.last == Some(value) {
            self.count += 1;
            return;
        }
        self.flush();
        self.buf.push(value);
        self.last = Some(value);
        self.count = 1;
    }

    fn flush(&mut self) {
        if self.count > 0 {
            write_var_u64(&mut self.buf, self.count - 1);
        }
        self.count = 0;
    }

    pub fn finish(mut self) -> Vec<u8> {
        self.flush();
        return self.buf;
    }
}

#[derive(Debug)]
pub struct RleDecoder<'a> {
    cursor: Cursor<'a>,
    value: u8,
    count: u64,
}

impl<'a> RleDecoder<'a> {
    pub fn new(buf: &'a [u8]) -> RleDecoder<'a> {
        return RleDecoder { cursor: Cursor::new(buf), value: 0, count: 0 };
    }

    pub fn read(&mut self) -> Result<u8, DecodeError> {
        if self.count == 0 {
            self.value = self.cursor.read_u8()?;
            self.count = self.cursor.read_var_u64()?.checked_add(1).ok_or(DecodeError::VarIntOverflow)?;
        }
        self.count -= 1;
        return Ok(self.value);
    }

    pub fn finish(&self) -> Result<(), DecodeError> {
        if self.count > 0 {
            return Err(DecodeError::TrailingBytes(self.cursor.remaining()));
        }
        return self.cursor.finish();
    }
}

// ============================================================================
// Optional runs of unsigned integers
// ============================================================================

/// A lone value is written as a positive signed integer. A run is written as
/// a negative signed integer followed by `count - 2`.
#[derive(Debug, Default)]
pub struct UIntOptRleEncoder {
    buf: Vec<u8>,
    value: u64,
    count: u64,
}

impl UIntOptRleEncoder {
    pub fn write(&mut self, value: u64) {
        if self.count > 0 && self.value == value {
            self.count += 1;
            return;
        }
        self.flush();
        self.value = value;
        self.count = 1;
    }

    fn flush(&mut self) {
        if self.count == 1 {
            write_signed(&mut self.buf, self.value, false);
        } else if self.count > 1 {
            write_signed(&mut self.buf, self.value, true);
            write_var_u64(&mut self.buf, self.count - 2);
        }
        self.count = 0;
    }

    pub fn finish(mut self) -> Vec<u8> {
        self.flush();
        return self.buf;
    }
}

#[derive(Debug)]
pub struct UIntOptRleDecoder<'a> {
    cursor: Cursor<'a>,
    value: u64,
    count: u64,
}

impl<'a> UIntOptRleDecoder<'a> {
    pub fn new(buf: &'a [u8]) -> UIntOptRleDecoder<'a> {
        return UIntOptRleDecoder { cursor: Cursor::new(buf), value: 0, count: 0 };
    }

    pub fn read(&mut self) -> Result<u64, DecodeError> {
        if self.count == 0 {
            let (value, is_run) = self.cursor.read_signed()?;
            self.value = value;
            self.count = if is_run {
                self.cursor.read_var_u64()?.checked_add(2).ok_or(DecodeError::VarIntOverflow)?
            } else {
                1
            };
        }
        self.count -= 1;
        return Ok(self.value);
    }

    pub fn read_u32(&mut self) -> Result<u32, DecodeError> {
        return u32::try_from(self.read()?).map_err(|_| DecodeError::VarIntOverflow);
    }

    pub fn finish(&self) -> Result<(), DecodeError> {
        if self.count > 0 {
            return Err(DecodeError::TrailingBytes(self.cursor.remaining()));
        }
        return self.cursor.finish();
    }
}

// ============================================================================
// Optional runs of equal differences
// ============================================================================

/// Encodes `diff * 2 + has_count`, followed by `count - 2` when the same
/// difference repeats.
#[derive(Debug, Default)]
pub struct IntDiffOptRleEncoder {
    buf: Vec<u8>,
    last: u32,
    diff: i64,
    count: u64,
}

impl IntDiffOptRleEncoder {
    pub fn write(&mut self, value: u32) {
        let diff = value as i64 - self.last as i64;
        if self.count > 0 && diff == self.diff {
            self.last = value;
            self.count += 1;
            return;
        }
        self.flush();
        self.diff = diff;
        self.last = value;
        self.count = 1;
    }

    fn flush(&mut self) {
        if self.count > 0 {
            let encoded = self.diff * 2 + if self.count == 1 { 0 } else { 1 };
            write_var_i64(&mut self.buf, encoded);
            if self.count > 1 {
                write_var_u64(&mut self.buf, self.count - 2);
            }
        }
        self.count = 0;
    }

    pub fn finish(mut self) -> Vec<u8> {
        self.flush();
        return self.buf;
    }
}

#[derive(Debug)]
pub struct IntDiffOptRleDecoder<'a> {
    cursor: Cursor<'a>,
    last: u32,
    diff: i64,
    count: u64,
}

impl<'a> IntDiffOptRleDecoder<'a> {
    pub fn new(buf: &'a [u8]) -> IntDiffOptRleDecoder<'a> {
        return IntDiffOptRleDecoder { cursor: Cursor::new(buf), last: 0, diff: 0, count: 0 };
    }

    pub fn read(&mut self) -> Result<u32, DecodeError> {
        if self.count == 0 {
            let encoded = self.cursor.read_var_i64()?;
            self.diff = encoded >> 1;
            self.count = if encoded & 1 == 1 {
                self.cursor.read_var_u64()?.checked_add(2).ok_or(DecodeError::VarIntOverflow)?
            } else {
                1
            };
        }
        let next = self.last as i64 + self.diff;
        self.last = u32::try_from(next).map_err(|_| DecodeError::VarIntOverflow)?;
        self.count -= 1;
        return Ok(self.last);
    }

    pub fn finish(&self) -> Result<(), DecodeError> {
        if self.count > 0 {
            return Err(DecodeError::TrailingBytes(self.cursor.remaining()));
        }
        return self.cursor.finish();
    }
}

// ============================================================================
// Strings
// ============================================================================

/// All strings concatenated into one, with their byte lengths in a separate
/// optional-run column.
#[derive(Debug, Default)]
pub struct StringEncoder {
    text: String,
    lens: UIntOptRleEncoder,
}

impl StringEncoder {
    pub fn write(&mut self, s: &str) {
        self.text.push_str(s);
        self.lens.write(s.len() as u64);
    }

    pub fn finish(self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.text.len() + 8);
        write_string(&mut buf, &self.text);
        buf.extend_from_slice(&self.lens.finish());
        return buf;
    }
}

#[derive(Debug)]
pub struct StringDecoder<'a> {
    text: &'a str,
    pos: usize,
    lens: UIntOptRleDecoder<'a>,
}

impl<'a> StringDecoder<'a> {
    pub fn new(buf: &'a [u8]) -> Result<StringDecoder<'a>, DecodeError> {
        let mut cursor = Cursor::new(buf);
        let text = cursor.read_string()?;
        let lens = UIntOptRleDecoder::new(cursor.read_rest());
        return Ok(StringDecoder { text, pos: 0, lens });
    }

    pub fn read(&mut self) -> Result<&'a str, DecodeError> {
        let len = usize::try_from(self.lens.read()?).map_err(|_| DecodeError::VarIntOverflow)?;
        let end = self.pos.checked_add(len).ok_or(DecodeError::VarIntOverflow)?;
        if end > self.text.len() {
            return Err(DecodeError::UnexpectedEof);
        }
        let s = self.text.get(self.pos..end).ok_or(DecodeError::InvalidUtf8)?;
        self.pos = end;
        return Ok(s);
    }

    pub fn finish(&self) -> Result<(), DecodeError> {
        if self.pos != self.text.len() {
            return Err(DecodeError::TrailingBytes(self.text.len() - self.pos));
        }
        return self.lens.finish();
    }
}
