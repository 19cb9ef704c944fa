// created = "2026-10-17"
// modified = "2026-10-17"

//! The block store and the integration algorithm behind every shared type.
//!
//! Items live in a [`store::Store`] arena and are addressed by index.
//! [`integrate`] places remote and local items, splits them, deletes them
//! and re-creates them for undo. [`btree_list`] indexes the sequence of
//! every branch by position.

pub mod branch;
pub mod btree_list;
pub mod integrate;
pub mod item;
pub mod primitives;
pub mod store;
