// created = "2026-10-17"
// modified = "2026-10-17"

//! Identifiers for operations.
//!
//! Every replica draws a random [`ClientId`] and numbers the units it
//! creates with a dense, monotonically increasing clock. A run of `n` units
//! starting at clock `c` occupies ids `c..c + n`, so an `Id` addresses one
//! unit (a character, an array element, a map write) rather than one
//! operation.

use std::cmp::Ordering;
use std::fmt;

/// Identifies a replica.
pub type ClientId = u64;

/// Globally unique identifier of a single unit of content.
#[derive(Clone, Copy, PartialEq, Eq, Hash)]
pub struct Id {
    /// The replica that created the unit.
    pub client: ClientId,
    /// Position of the unit in its creator's sequence.
    pub clock: u32,
}

impl Id {
    /// Create a new id.
    pub const fn new(client: ClientId, clock: u32) -> Id {
        return Id { client, clock };
    }

    /// The id `offset` units further along the same client sequence.
    #[inline]
    pub fn offset(&self, offset: u32) -> Id {
        return Id::new(self.client, self.clock + offset);
    }
}

impl PartialOrd for Id {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        return Some(self.cmp(other));
    }
}

impl Ord for Id {
    fn cmp(&self, other: &Self) -> Ordering {
        match self.client.cmp(&other.client) {
            Ordering::Equal => self.clock.cmp(&other.clock),
            other => other,
        }
    }
}

impl fmt::Debug for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        return write!(f, "<{}#{}>", self.client, self.clock);
    }
}

impl fmt::Display for Id {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        return write!(f, "{}#{}", self.client, self.clock);
    }
}
