// created = "2026-10-17"
// modified = "2026-10-17"

//! Clock primitives.
//!
//! # State Vector
//!
//! A vector clock over replicas: for every client it records the next clock
//! value this replica expects, so `contains(id)` holds exactly for the
//! operations already integrated. Two replicas that exchange state vectors
//! can compute the minimal update each one is missing.
//!
//! # Wall Clock
//!
//! The undo manager groups edits made within a short time window. It reads
//! time through the [`Clock`] trait so tests can drive it by hand.

use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{SystemTime, UNIX_EPOCH};

use rustc_hash::FxHashMap;

use crate::crdt::primitives::id::{ClientId, Id};
use crate::error::DecodeError;
use crate::updates::decoder::{Decoder, DecoderV1, DecoderV2};
use crate::updates::encoder::{Encoder, EncoderV1, EncoderV2};

// ============================================================================
// State Vector
// ============================================================================

/// Next expected clock per client.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct StateVector(FxHashMap<ClientId, u32>);

impl StateVector {
    pub fn new() -> StateVector {
        return StateVector::default();
    }

    /// Next expected clock for `client`, zero when unknown.
    #[inline]
    pub fn get(&self, client: &ClientId) -> u32 {
        return self.0.get(client).copied().unwrap_or(0);
    }

    /// Whether the operation `id` is covered.
    #[inline]
    pub fn contains(&self, id: &Id) -> bool {
        return id.clock < self.get(&id.client);
    }

    /// Raise the entry for `client` to at least `clock`.
    pub fn set_max(&mut self, client: ClientId, clock: u32) {
        let entry = self.0.entry(client).or_insert(0);
        *entry = (*entry).max(clock);
    }

    /// Pointwise maximum with `other`.
    pub fn merge(&mut self, other: &StateVector) {
        for (client, clock) in other.iter() {
            self.set_max(*client, *clock);
        }
    }

    pub fn iter(&self) -> impl Iterator<Item = (&ClientId, &u32)> {
        return self.0.iter();
    }

    pub fn len(&self) -> usize {
        return self.0.len();
    }

    pub fn is_empty(&self) -> bool {
        return self.0.is_empty();
    }

    /// Whether every entry of `self` is at least the matching entry of
    /// `other`.
    pub fn dominates(&self, other: &StateVector) -> bool {
        return other.iter().all(|(client, clock)| self.get(client) >= *clock);
    }

    pub fn encode<E: Encoder>(&self, encoder: &mut E) {
        let mut entries: Vec<(ClientId, u32)> = self.0.iter().map(|(c, k)| (*c, *k)).collect();
        entries.sort_unstable();
        encoder.write_var(entries.len() as u64);
        for (client, clock) in entries {
            encoder.write_var(client);
            encoder.write_var(clock as u64);
        }
    }

    pub fn decode<'a, D: Decoder<'a>>(decoder: &mut D) -> Result<StateVector, DecodeError> {
        let len = decoder.read_var_u32()?;
        let mut map = FxHashMap::default();
        for _ in 0..len {
            let client = decoder.read_var_u64()?;
            let clock = decoder.read_var_u32()?;
            map.insert(client, clock);
        }
        return Ok(StateVector(map));
    }

    pub fn encode_v1(&self) -> Vec<u8> {
        let mut encoder = EncoderV1::new();
        self.encode(&mut encoder);
        return encoder.to_vec();
    }

    pub fn encode_v2(&self) -> Vec<u8> {
        let mut encoder = EncoderV2::new();
        self.encode(&mut encoder);
        return encoder.to_vec();
    }

    pub fn decode_v1(bytes: &[u8]) -> Result<StateVector, DecodeError> {
        let mut decoder = DecoderV1::new(bytes)?;
        let sv = StateVector::decode(&mut decoder)?;
        decoder.finish()?;
        return Ok(sv);
    }

    pub fn decode_v2(bytes: &[u8]) -> Result<StateVector, DecodeError> {
        let mut decoder = DecoderV2::new(bytes)?;
        let sv = StateVector::decode(&mut decoder)?;
        decoder.finish()?;
        return Ok(sv);
    }
}

impl FromIterator<(ClientId, u32)> for StateVector {
    fn from_iter<T: IntoIterator<Item = (ClientId, u32)>>(iter: T) -> StateVector {
        return StateVector(iter.into_iter().collect());
    }
}

// ============================================================================
// Wall Clock
// ============================================================================

/// Source of millisecond timestamps.
pub trait Clock: Send + Sync {
    fn now(&self) -> u64;
}

/// Milliseconds since the Unix epoch.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> u64 {
        return SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_millis() as u64)
            .unwrap_or(0);
    }
}

/// A clock that only moves when told to. Clones share the same time.
#[derive(Debug, Default, Clone)]
pub struct ManualClock(Arc<AtomicU64>);

impl ManualClock {
    pub fn new(start: u64) -> ManualClock {
        return ManualClock(Arc::new(AtomicU64::new(start)));
    }

    pub fn set(&self, millis: u64) {
        self.0.store(millis, Ordering::SeqCst);
    }

    pub fn advance(&self, millis: u64) {
        self.0.fetch_add(millis, Ordering::SeqCst);
    }
}

impl Clock for ManualClock {
    fn now(&self) -> u64 {
        return self.0.load(Ordering::SeqCst);
    }
}
