// created = "2026-10-17"
// modified = "2026-10-17"

//! Binary update codec.
//!
//! Two formats exist. Version 1 writes every field inline with varints.
//! Version 2 starts with [`V2_HEADER`] and splits fields into run-length
//! encoded columns. Both carry the same [`update::Update`].

pub mod decoder;
pub mod encoder;
pub(crate) mod rle;
pub mod update;
pub mod varint;

/// Prefix of every version 2 payload. A version 1 payload can never start
/// with it, since no update holds that many client groups.
pub(crate) const V2_HEADER: [u8; 5] = [0xff, 0xff, 0xff, 0xff, 0x7f];
