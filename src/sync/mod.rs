// created = "2026-10-17"
// modified = "2026-10-17"

//! Protocol helpers that travel next to document updates.

pub mod awareness;
