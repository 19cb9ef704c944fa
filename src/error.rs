// created = "2026-10-17"
// modified = "2026-10-17"

//! Error types shared by every layer of the crate.
//!
//! Local edits fail with [`Error`] and never leave a partially applied
//! change behind. Binary input that cannot be parsed, or that violates the
//! causal structure of the document, fails with [`DecodeError`] before the
//! store is touched.

use thiserror::Error;

use std::sync::Arc;

use crate::crdt::branch::TypeRef;
use crate::crdt::primitives::id::Id;

/// Failures reported by local edits and by update application.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum Error {
    #[error("index {index} is out of bounds for length {len}")]
    OutOfBounds { index: i64, len: u32 },

    #[error("failed to decode update: {0}")]
    Decode(#[from] DecodeError),

    #[error("invalid undo scope: {0}")]
    InvalidScope(String),

    #[error("anchor node does not belong to this parent")]
    InvalidAnchor,

    #[error("root {name:?} already exists as {existing:?}")]
    TypeMismatch { name: Arc<str>, existing: TypeRef },
}

/// Failures reported while parsing or validating binary payloads.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum DecodeError {
    #[error("unexpected end of input")]
    UnexpectedEof,

    #[error("variable-length integer does not fit the target width")]
    VarIntOverflow,

    #[error("string is not valid UTF-8")]
    InvalidUtf8,

    #[error("unknown content reference {0}")]
    UnknownContent(u8),

    #[error("unknown value tag {0}")]
    UnknownAny(u8),

    #[error("unknown shared type reference {0}")]
    UnknownTypeRef(u8),

    #[error("payload was produced by a different encoding version")]
    VersionMismatch,

    #[error("{0} trailing bytes after payload")]
    TrailingBytes(usize),

    #[error("operation {0:?} references an operation it cannot depend on")]
    CausalityViolation(Id),

    #[error("operation {0:?} names a parent that is not a shared type")]
    InvalidParent(Id),

    #[error("invalid JSON state: {0}")]
    InvalidJson(String),
}

/// Result alias used throughout the crate.
pub type Result<T> = std::result::Result<T, Error>;
