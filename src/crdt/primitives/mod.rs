// created = "2026-10-17"
// modified = "2026-10-17"

//! Identifiers, clocks and id ranges shared by the store and the codec.

pub mod clock;
pub mod id;
pub mod id_set;
