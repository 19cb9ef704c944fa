// created = "2026-10-17"
// modified = "2026-10-17"

//! Collaborative maps.
//!
//! Concurrent writes to the same key are resolved last writer wins: the
//! write with the higher clock survives, ties going to the larger client
//! id. A write always replaces the value its author could see, even when
//! that value came from a client whose clock ran ahead. Every replica
//! settles on the same value whatever order the writes arrive in.

use std::collections::HashMap;
use std::sync::Arc;

use crate::any::Any;
use crate::crdt::branch::BranchPtr;
use crate::transaction::{ReadTxn, TransactionMut};
use crate::types::{inserted, In, Out, SharedRef};

/// Handle to a map shared type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MapRef(BranchPtr);

impl SharedRef for MapRef {
    fn branch_ptr(&self) -> BranchPtr {
        return self.0;
    }
}

impl MapRef {
    pub(crate) fn from_branch(branch: BranchPtr) -> MapRef {
        return MapRef(branch);
    }

    /// Number of live entries.
    pub fn len<T: ReadTxn>(&self, txn: &T) -> u32 {
        let store = txn.store();
        return store.branch(self.0).map.values().filter(|ptr| !store.item(**ptr).deleted).count() as u32;
    }

    pub fn is_empty<T: ReadTxn>(&self, txn: &T) -> bool {
        return self.len(txn) == 0;
    }

    /// Write `value` under `key`, replacing any previous value.
    pub fn insert<K, V>(&self, txn: &mut TransactionMut<'_>, key: K, value: V) -> Out
    where
        K: Into<Arc<str>>,
        V: Into<In>,
    {
        let ptr = super::map_insert(txn, self.0, key.into(), value.into());
        return inserted(txn, ptr);
    }

    pub fn get<T: ReadTxn>(&self, txn: &T, key: &str) -> Option<Out> {
        return super::map_get(txn.store(), self.0, key);
    }

    pub fn contains_key<T: ReadTxn>(&self, txn: &T, key: &str) -> bool {
        let store = txn.store();
        return store.branch(self.0).map.get(key).is_some_and(|ptr| !store.item(*ptr).deleted);
    }

    /// Remove `key`, returning the value it held.
    pub fn remove(&self, txn: &mut TransactionMut<'_>, key: &str) -> Option<Out> {
        let ptr = *txn.store.branch(self.0).map.get(key)?;
        let previous = self.get(&*txn, key)?;
        txn.delete_item(ptr);
        return Some(previous);
    }

    /// Live keys, sorted.
    pub fn keys<T: ReadTxn>(&self, txn: &T) -> Vec<Arc<str>> {
        return super::map_entries(txn.store(), self.0).into_iter().map(|(key, _)| key).collect();
    }

    /// Live entries, sorted by key.
    pub fn iter<T: ReadTxn>(&self, txn: &T) -> impl Iterator<Item = (Arc<str>, Out)> {
        return super::map_entries(txn.store(), self.0).into_iter();
    }

    pub fn clear(&self, txn: &mut TransactionMut<'_>) {
        let entries: Vec<_> = txn.store.branch(self.0).map.values().copied().collect();
        for ptr in entries {
            txn.delete_item(ptr);
        }
    }

    pub fn to_json<T: ReadTxn>(&self, txn: &T) -> Any {
        let entries: HashMap<String, Any> =
            self.iter(txn).map(|(key, value)| (key.to_string(), value.to_json(txn))).collect();
        return Any::from(entries);
    }
}
