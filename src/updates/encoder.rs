// created = "2026-10-17"
// modified = "2026-10-17"

//! Writers for the two update encodings.
//!
//! Update serialization is written once against the [`Encoder`] trait. The
//! v1 encoder lays fields out in order of appearance; the v2 encoder routes
//! each field into its own compressed column.

use crate::any::Any;
use crate::crdt::primitives::id::{ClientId, Id};
use crate::updates::V2_HEADER;
use crate::updates::rle::{IntDiffOptRleEncoder, RleEncoder, StringEncoder, UIntOptRleEncoder};
use crate::updates::varint;

/// Sink for the fields of an update, state vector or delete set.
pub trait Encoder {
    /// A plain unsigned integer: counts, clocks, client ids in the state
    /// vector.
    fn write_var(&mut self, n: u64);
    fn write_left_id(&mut self, id: &Id);
    fn write_right_id(&mut self, id: &Id);
    fn write_client(&mut self, client: ClientId);
    fn write_info(&mut self, info: u8);
    fn write_parent_info(&mut self, is_root: bool);
    fn write_type_ref(&mut self, type_ref: u8);
    fn write_len(&mut self, len: u32);
    fn write_string(&mut self, s: &str);
    fn write_key(&mut self, key: &str);
    fn write_any(&mut self, any: &Any);
    fn reset_ds_cur_val(&mut self);
    fn write_ds_clock(&mut self, clock: u32);
    fn write_ds_len(&mut self, len: u32);
    fn to_vec(self) -> Vec<u8>;
}

// ============================================================================
// Version 1
// ============================================================================

#[derive(Debug, Default)]
pub struct EncoderV1 {
    buf: Vec<u8>,
}

impl EncoderV1 {
    pub fn new() -> EncoderV1 {
        return EncoderV1::default();
    }
}

impl Encoder for EncoderV1 {
    fn write_var(&mut self, n: u64) {
        varint::write_var_u64(&mut self.buf, n);
    }

    fn write_left_id(&mut self, id: &Id) {
        varint::write_var_u64(&mut self.buf, id.client);
        varint::write_var_u64(&mut self.buf, id.clock as u64);
    }

    fn write_right_id(&mut self, id: &Id) {
        self.write_left_id(id);
    }

    fn write_client(&mut self, client: ClientId) {
        varint::write_var_u64(&mut self.buf, client);
    }

    fn write_info(&mut self, info: u8) {
        self.buf.push(info);
    }

    fn write_parent_info(&mut self, is_root: bool) {
        varint::write_var_u64(&mut self.buf, is_root as u64);
    }

    fn write_type_ref(&mut self, type_ref: u8) {
        self.buf.push(type_ref);
    }

    fn write_len(&mut self, len: u32) {
        varint::write_var_u64(&mut self.buf, len as u64);
    }

    fn write_string(&mut self, s: &str) {
        varint::write_string(&mut self.buf, s);
    }

    fn write_key(&mut self, key: &str) {
        varint::write_string(&mut self.buf, key);
    }

    fn write_any(&mut self, any: &Any) {
        any.encode(&mut self.buf);
    }

    fn reset_ds_cur_val(&mut self) {}

    fn write_ds_clock(&mut self, clock: u32) {
        varint::write_var_u64(&mut self.buf, clock as u64);
    }

    fn write_ds_len(&mut self, len: u32) {
        varint::write_var_u64(&mut self.buf, len as u64);
    }

    fn to_vec(self) -> Vec<u8> {
        return self.buf;
    }
}

// ============================================================================
// Version 2
// ============================================================================

#[derive(Debug, Default)]
pub struct EncoderV2 {
    rest: Vec<u8>,
    ds_cur_val: u32,
    client: UIntOptRleEncoder,
    left_clock: IntDiffOptRleEncoder,
    right_clock: IntDiffOptRleEncoder,
    info: RleEncoder,
    string: StringEncoder,
    parent_info: RleEncoder,
    type_ref: UIntOptRleEncoder,
    len: UIntOptRleEncoder,
}

impl EncoderV2 {
    pub fn new() -> EncoderV2 {
        return EncoderV2::default();
    }
}

impl Encoder for EncoderV2 {
    fn write_var(&mut self, n: u64) {
        varint::write_var_u64(&mut self.rest, n);
    }

    fn write_left_id(&mut self, id: &Id) {
        self.client.write(id.client);
        self.left_clock.write(id.clock);
    }

    fn write_right_id(&mut self, id: &Id) {
        self.client.write(id.client);
        self.right_clock.write(id.clock);
    }

    fn write_client(&mut self, client: ClientId) {
        self.client.write(client);
    }

    fn write_info(&mut self, info: u8) {
        self.info.write(info);
    }

    fn write_parent_info(&mut self, is_root: bool) {
        self.parent_info.write(is_root as u8);
    }

    fn write_type_ref(&mut self, type_ref: u8) {
        self.type_ref.write(type_ref as u64);
    }

    fn write_len(&mut self, len: u32) {
        self.len.write(len as u64);
    }

    fn write_string(&mut self, s: &str) {
        self.string.write(s);
    }

    fn write_key(&mut self, key: &str) {
        self.string.write(key);
    }

    fn write_any(&mut self, any: &Any) {
        any.encode(&mut self.rest);
    }

    fn reset_ds_cur_val(&mut self) {
        self.ds_cur_val = 0;
    }

    fn write_ds_clock(&mut self, clock: u32) {
        let diff = clock - self.ds_cur_val;
        self.ds_cur_val = clock;
        varint::write_var_u64(&mut self.rest, diff as u64);
    }

    fn write_ds_len(&mut self, len: u32) {
        debug_assert!(len > 0);
        varint::write_var_u64(&mut self.rest, (len - 1) as u64);
        self.ds_cur_val += len;
    }

    fn to_vec(self) -> Vec<u8> {
        let mut buf = Vec::with_capacity(self.rest.len() + 32);
        buf.extend_from_slice(&V2_HEADER);
        varint::write_buf(&mut buf, &self.client.finish());
        varint::write_buf(&mut buf, &self.left_clock.finish());
        varint::write_buf(&mut buf, &self.right_clock.finish());
        varint::write_buf(&mut buf, &self.info.finish());
        varint::write_buf(&mut buf, &self.string.finish());
        varint::write_buf(&mut buf, &self.parent_info.finish());
        varint::write_buf(&mut buf, &self.type_ref.finish());
        varint::write_buf(&mut buf, &self.len.finish());
        buf.extend_from_slice(&self.rest);
        return buf;
    }
}
