// created = "2026-10-17"
// modified = "2026-10-17"

//! Readers for the two update encodings.
//!
//! Each decoder refuses input produced by the other version:
//! v2 payloads start with [`V2_HEADER`], which no v1 payload can begin with
//! because it overflows the 32-bit count every v1 payload starts with.

use std::sync::Arc;

use crate::any::Any;
use crate::crdt::primitives::id::{ClientId, Id};
use crate::error::DecodeError;
use crate::updates::V2_HEADER;
use crate::updates::rle::{IntDiffOptRleDecoder, RleDecoder, StringDecoder, UIntOptRleDecoder};
use crate::updates::varint::Cursor;

/// Source of the fields written by an [`Encoder`](crate::updates::encoder::Encoder).
pub trait Decoder<'a> {
    fn read_var_u32(&mut self) -> Result<u32, DecodeError>;
    fn read_var_u64(&mut self) -> Result<u64, DecodeError>;
    fn read_left_id(&mut self) -> Result<Id, DecodeError>;
    fn read_right_id(&mut self) -> Result<Id, DecodeError>;
    fn read_client(&mut self) -> Result<ClientId, DecodeError>;
    fn read_info(&mut self) -> Result<u8, DecodeError>;
    fn read_parent_info(&mut self) -> Result<bool, DecodeError>;
    fn read_type_ref(&mut self) -> Result<u8, DecodeError>;
    fn read_len(&mut self) -> Result<u32, DecodeError>;
    fn read_string(&mut self) -> Result<&'a str, DecodeError>;
    fn read_key(&mut self) -> Result<Arc<str>, DecodeError>;
    fn read_any(&mut self) -> Result<Any, DecodeError>;
    fn reset_ds_cur_val(&mut self);
    fn read_ds_clock(&mut self) -> Result<u32, DecodeError>;
    fn read_ds_len(&mut self) -> Result<u32, DecodeError>;
    /// Whether any unread payload remains.
    fn has_content(&self) -> bool;
    /// Fail unless every byte of the payload has been consumed.
    fn finish(&self) -> Result<(), DecodeError>;
}

// ============================================================================
// Version 1
// ============================================================================

#[derive(Debug)]
pub struct DecoderV1<'a> {
    cursor: Cursor<'a>,
}

impl<'a> DecoderV1<'a> {
    pub fn new(buf: &'a [u8]) -> Result<DecoderV1<'a>, DecodeError> {
        if buf.starts_with(&V2_HEADER) {
            return Err(DecodeError::VersionMismatch);
        }
        return Ok(DecoderV1 { cursor: Cursor::new(buf) });
    }
}

impl<'a> Decoder<'a> for DecoderV1<'a> {
    fn read_var_u32(&mut self) -> Result<u32, DecodeError> {
        return self.cursor.read_var_u32();
    }

    fn read_var_u64(&mut self) -> Result<u64, DecodeError> {
        return self.cursor.read_var_u64();
    }

    fn read_left_id(&mut self) -> Result<Id, DecodeError> {
        let client = self.cursor.read_var_u64()?;
        let clock = self.cursor.read_var_u32()?;
        return Ok(Id::new(client, clock));
    }

    fn read_right_id(&mut self) -> Result<Id, DecodeError> {
        return self.read_left_id();
    }

    fn read_client(&mut self) -> Result<ClientId, DecodeError> {
        return self.cursor.read_var_u64();
    }

    fn read_info(&mut self) -> Result<u8, DecodeError> {
        return self.cursor.read_u8();
    }

    fn read_parent_info(&mut self) -> Result<bool, DecodeError> {
        return Ok(self.cursor.read_var_u32()? == 1);
    }

    fn read_type_ref(&mut self) -> Result<u8, DecodeError> {
        return self.cursor.read_u8();
    }

    fn read_len(&mut self) -> Result<u32, DecodeError> {
        return self.cursor.read_var_u32();
    }

    fn read_string(&mut self) -> Result<&'a str, DecodeError> {
        return self.cursor.read_string();
    }

    fn read_key(&mut self) -> Result<Arc<str>, DecodeError> {
        return Ok(Arc::from(self.cursor.read_string()?));
    }

    fn read_any(&mut self) -> Result<Any, DecodeError> {
        return Any::decode(&mut self.cursor);
    }

    fn reset_ds_cur_val(&mut self) {}

    fn read_ds_clock(&mut self) -> Result<u32, DecodeError> {
        return self.cursor.read_var_u32();
    }

    fn read_ds_len(&mut self) -> Result<u32, DecodeError> {
        return self.cursor.read_var_u32();
    }

    fn has_content(&self) -> bool {
        return self.cursor.has_content();
    }

    fn finish(&self) -> Result<(), DecodeError> {
        return self.cursor.finish();
    }
}

// ============================================================================
// Version 2
// ============================================================================

#[derive(Debug)]
pub struct DecoderV2<'a> {
    rest: Cursor<'a>,
    ds_cur_val: u32,
    client: UIntOptRleDecoder<'a>,
    left_clock: IntDiffOptRleDecoder<'a>,
    right_clock: IntDiffOptRleDecoder<'a>,
    info: RleDecoder<'a>,
    string: StringDecoder<'a>,
    parent_info: RleDecoder<'a>,
    type_ref: UIntOptRleDecoder<'a>,
    len: UIntOptRleDecoder<'a>,
}

impl<'a> DecoderV2<'a> {
    pub fn new(buf: &'a [u8]) -> Result<DecoderV2<'a>, DecodeError> {
        if !buf.starts_with(&V2_HEADER) {
            return Err(DecodeError::VersionMismatch);
        }
        let mut cursor = Cursor::new(&buf[V2_HEADER.len()..]);
        let client = UIntOptRleDecoder::new(cursor.read_buf()?);
        let left_clock = IntDiffOptRleDecoder::new(cursor.read_buf()?);
        let right_clock = IntDiffOptRleDecoder::new(cursor.read_buf()?);
        let info = RleDecoder::new(cursor.read_buf()?);
        let string = StringDecoder::new(cursor.read_buf()?)?;
        let parent_info = RleDecoder::new(cursor.read_buf()?);
        let type_ref = UIntOptRleDecoder::new(cursor.read_buf()?);
        let len = UIntOptRleDecoder::new(cursor.read_buf()?);
        return Ok(DecoderV2 {
            rest: cursor,
            ds_cur_val: 0,
            client,
            left_clock,
            right_clock,
            info,
            string,
            parent_info,
            type_ref,
            len,
        });
    }
}

impl<'a> Decoder<'a> for DecoderV2<'a> {
    fn read_var_u32(&mut self) -> Result<u32, DecodeError> {
        return self.rest.read_var_u32();
    }

    fn read_var_u64(&mut self) -> Result<u64, DecodeError> {
        return self.rest.read_var_u64();
    }

    fn read_left_id(&mut self) -> Result<Id, DecodeError> {
        let client = self.client.read()?;
        let clock = self.left_clock.read()?;
        return Ok(Id::new(client, clock));
    }

    fn read_right_id(&mut self) -> Result<Id, DecodeError> {
        let client = self.client.read()?;
        let clock = self.right_clock.read()?;
        return Ok(Id::new(client, clock));
    }

    fn read_client(&mut self) -> Result<ClientId, DecodeError> {
        return self.client.read();
    }

    fn read_info(&mut self) -> Result<u8, DecodeError> {
        return self.info.read();
    }

    fn read_parent_info(&mut self) -> Result<bool, DecodeError> {
        return Ok(self.parent_info.read()? == 1);
    }

    fn read_type_ref(&mut self) -> Result<u8, DecodeError> {
        return u8::try_from(self.type_ref.read()?).map_err(|_| DecodeError::VarIntOverflow);
    }

    fn read_len(&mut self) -> Result<u32, DecodeError> {
        return self.len.read_u32();
    }

    fn read_string(&mut self) -> Result<&'a str, DecodeError> {
        return self.string.read();
    }

    fn read_key(&mut self) -> Result<Arc<str>, DecodeError> {
        return Ok(Arc::from(self.string.read()?));
    }

    fn read_any(&mut self) -> Result<Any, DecodeError> {
        return Any::decode(&mut self.rest);
    }

    fn reset_ds_cur_val(&mut self) {
        self.ds_cur_val = 0;
    }

    fn read_ds_clock(&mut self) -> Result<u32, DecodeError> {
        let diff = self.rest.read_var_u32()?;
        self.ds_cur_val = self.ds_cur_val.checked_add(diff).ok_or(DecodeError::VarIntOverflow)?;
        return Ok(self.ds_cur_val);
    }

    fn read_ds_len(&mut self) -> Result<u32, DecodeError> {
        let len = self.rest.read_var_u32()?.checked_add(1).ok_or(DecodeError::VarIntOverflow)?;
        self.ds_cur_val = self.ds_cur_val.checked_add(len).ok_or(DecodeError::VarIntOverflow)?;
        return Ok(len);
    }

    fn has_content(&self) -> bool {
        return self.rest.has_content();
    }

    fn finish(&self) -> Result<(), DecodeError> {
        self.client.finish()?;
        self.left_clock.finish()?;
        self.right_clock.finish()?;
        self.info.finish()?;
        self.string.finish()?;
        self.parent_info.finish()?;
        self.type_ref.finish()?;
        self.len.finish()?;
        return self.rest.finish();
    }
}
