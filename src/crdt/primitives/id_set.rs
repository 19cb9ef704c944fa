// created = "2026-10-17"
// modified = "2026-10-17"

//! Sets of operation ids, stored as sorted clock ranges per client.
//!
//! The same structure serves as the delete set of an update, the tombstone
//! summary of a document and the insertion/deletion record of an undo stack
//! item.
//!
//! Complexity:
//! - insert: O(log n) to locate, O(n) worst case to splice
//! - contains: O(log n)
//! - merge: O(m log n)

use std::ops::Range;

use rustc_hash::FxHashMap;

use crate::crdt::primitives::id::{ClientId, Id};
use crate::error::DecodeError;
use crate::updates::decoder::Decoder;
use crate::updates::encoder::Encoder;

/// Sorted, disjoint, non-adjacent clock ranges of a single client.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IdRanges(Vec<Range<u32>>);

impl IdRanges {
    /// Add a range, coalescing with any range it overlaps or touches.
    pub fn insert(&mut self, range: Range<u32>) {
        if range.is_empty() {
            return;
        }
        if let Some(last) = self.0.last_mut() {
            if range.start > last.end {
                self.0.push(range);
                return;
            }
            if range.start >= last.start {
                last.end = last.end.max(range.end);
                return;
            }
        } else {
            self.0.push(range);
            return;
        }

        let first = self.0.partition_point(|r| r.end < range.start);
        let mut start = range.start;
        let mut end = range.end;
        let mut last = first;
        while last < self.0.len() && self.0[last].start <= end {
            start = start.min(self.0[last].start);
            end = end.max(self.0[last].end);
            last += 1;
        }
        self.0.splice(first..last, [start..end]);
    }

    pub fn contains(&self, clock: u32) -> bool {
        let idx = self.0.partition_point(|r| r.end <= clock);
        return idx < self.0.len() && self.0[idx].start <= clock;
    }

    pub fn iter(&self) -> impl Iterator<Item = &Range<u32>> {
        return self.0.iter();
    }

    pub fn len(&self) -> usize {
        return self.0.len();
    }

    pub fn is_empty(&self) -> bool {
        return self.0.is_empty();
    }
}

/// A set of ids grouped by client.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct IdSet(FxHashMap<ClientId, IdRanges>);

/// The ids removed by an update or transaction.
pub type DeleteSet = IdSet;

impl IdSet {
    pub fn new() -> IdSet {
        return IdSet::default();
    }

    /// Add the `len` consecutive ids starting at `id`.
    pub fn insert(&mut self, id: Id, len: u32) {
        if len == 0 {
            return;
        }
        self.0.entry(id.client).or_default().insert(id.clock..id.clock + len);
    }

    pub fn insert_range(&mut self, client: ClientId, range: Range<u32>) {
        if range.is_empty() {
            return;
        }
        self.0.entry(client).or_default().insert(range);
    }

    pub fn contains(&self, id: &Id) -> bool {
        return self.0.get(&id.client).is_some_and(|ranges| ranges.contains(id.clock));
    }

    pub fn merge(&mut self, other: &IdSet) {
        for (client, ranges) in other.0.iter() {
            let target = self.0.entry(*client).or_default();
            for range in ranges.iter() {
                target.insert(range.clone());
            }
        }
    }

    pub fn is_empty(&self) -> bool {
        return self.0.values().all(IdRanges::is_empty);
    }

    pub fn ranges(&self, client: &ClientId) -> Option<&IdRanges> {
        return self.0.get(client);
    }

    /// Entries in ascending client order.
    pub fn iter(&self) -> impl Iterator<Item = (&ClientId, &IdRanges)> {
        let mut entries: Vec<(&ClientId, &IdRanges)> = self.0.iter().collect();
        entries.sort_unstable_by_key(|(client, _)| **client);
        return entries.into_iter();
    }

    pub fn encode<E: Encoder>(&self, encoder: &mut E) {
        let entries: Vec<(&ClientId, &IdRanges)> = self.iter().filter(|(_, r)| !r.is_empty()).collect();
        encoder.write_var(entries.len() as u64);
        for (client, ranges) in entries {
            encoder.reset_ds_cur_val();
            encoder.write_var(*client);
            encoder.write_var(ranges.len() as u64);
            for range in ranges.iter() {
                encoder.write_ds_clock(range.start);
                encoder.write_ds_len(range.end - range.start);
            }
        }
    }

    pub fn decode<'a, D: Decoder<'a>>(decoder: &mut D) -> Result<IdSet, DecodeError> {
        let mut set = IdSet::new();
        let clients = decoder.read_var_u32()?;
        for _ in 0..clients {
            decoder.reset_ds_cur_val();
            let client = decoder.read_var_u64()?;
            let count = decoder.read_var_u32()?;
            for _ in 0..count {
                let clock = decoder.read_ds_clock()?;
                let len = decoder.read_ds_len()?;
                let end = clock.checked_add(len).ok_or(DecodeError::VarIntOverflow)?;
                set.insert_range(client, clock..end);
            }
        }
        return Ok(set);
    }
}
