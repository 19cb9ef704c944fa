// created = "2026-10-17"
// modified = "2026-10-17"

//! Transactions.
//!
//! All reads go through a [`ReadTxn`] and all writes through a
//! [`TransactionMut`]. A mutable transaction records what it inserted
//! (the state vector before and after) and what it deleted. When it is
//! committed, explicitly or on drop, it notifies the document's observers:
//! first the after-transaction observers, then the update observers with the
//! incremental update in the requested encoding.

use std::fmt;
use std::sync::Arc;

use rustc_hash::{FxHashMap, FxHashSet};
use smallvec::SmallVec;

use crate::crdt::branch::{BranchPtr, TypeRef};
use crate::crdt::primitives::clock::StateVector;
use crate::crdt::primitives::id_set::DeleteSet;
use crate::crdt::store::Store;
use crate::doc::DocEvents;
use crate::types::array::ArrayRef;
use crate::types::map::MapRef;
use crate::types::text::TextRef;
use crate::types::xml::XmlFragmentRef;
use crate::updates::encoder::{Encoder, EncoderV1, EncoderV2};
use crate::updates::update::encode_diff;

// ============================================================================
// Origin
// ============================================================================

/// Opaque tag attached to a transaction, used to tell local edits, remote
/// updates and undo operations apart.
#[derive(Clone, PartialEq, Eq, Hash, Default)]
pub struct Origin(SmallVec<[u8; 16]>);

impl Origin {
    pub fn as_bytes(&self) -> &[u8] {
        return &self.0;
    }
}

impl From<&[u8]> for Origin {
    fn from(bytes: &[u8]) -> Origin {
        return Origin(SmallVec::from_slice(bytes));
    }
}

impl From<&str> for Origin {
    fn from(s: &str) -> Origin {
        return Origin::from(s.as_bytes());
    }
}

impl From<String> for Origin {
    fn from(s: String) -> Origin {
        return Origin::from(s.as_bytes());
    }
}

impl From<u64> for Origin {
    fn from(n: u64) -> Origin {
        return Origin::from(&n.to_be_bytes()[..]);
    }
}

impl fmt::Debug for Origin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        return match std::str::from_utf8(&self.0) {
            Ok(s) => write!(f, "Origin({:?})", s),
            Err(_) => write!(f, "Origin({:?})", self.0.as_slice()),
        };
    }
}

// ============================================================================
// Reading
// ============================================================================

/// Read access to a document.
pub trait ReadTxn {
    fn store(&self) -> &Store;

    fn state_vector(&self) -> StateVector {
        return self.store().state_vector();
    }

    fn encode_state_vector_v1(&self) -> Vec<u8> {
        return self.state_vector().encode_v1();
    }

    fn encode_state_vector_v2(&self) -> Vec<u8> {
        return self.state_vector().encode_v2();
    }

    /// Everything the holder of `sv` is missing, in the v1 encoding.
    fn encode_diff_v1(&self, sv: &StateVector) -> Vec<u8> {
        let mut encoder = EncoderV1::new();
        encode_diff(self.store(), sv, &self.store().delete_set(), &mut encoder);
        return encoder.to_vec();
    }

    /// Everything the holder of `sv` is missing, in the v2 encoding.
    fn encode_diff_v2(&self, sv: &StateVector) -> Vec<u8> {
        let mut encoder = EncoderV2::new();
        encode_diff(self.store(), sv, &self.store().delete_set(), &mut encoder);
        return encoder.to_vec();
    }

    fn root_names(&self) -> Vec<Arc<str>> {
        return self.store().root_names();
    }

    fn get_text(&self, name: &str) -> Option<TextRef> {
        return self.store().root(name).map(TextRef::from_branch);
    }

    fn get_array(&self, name: &str) -> Option<ArrayRef> {
        return self.store().root(name).map(ArrayRef::from_branch);
    }

    fn get_map(&self, name: &str) -> Option<MapRef> {
        return self.store().root(name).map(MapRef::from_branch);
    }

    fn get_xml_fragment(&self, name: &str) -> Option<XmlFragmentRef> {
        return self.store().root(name).map(XmlFragmentRef::from_branch);
    }
}

/// A read-only transaction.
pub struct Transaction<'doc> {
    store: &'doc Store,
}

impl<'doc> Transaction<'doc> {
    pub(crate) fn new(store: &'doc Store) -> Transaction<'doc> {
        return Transaction { store };
    }
}

impl ReadTxn for Transaction<'_> {
    fn store(&self) -> &Store {
        return self.store;
    }
}

// ============================================================================
// Writing
// ============================================================================

/// A read-write transaction. Changes are published when it is committed or
/// dropped.
pub struct TransactionMut<'doc> {
    pub(crate) store: &'doc mut Store,
    events: &'doc DocEvents,
    origin: Option<Origin>,
    pub(crate) before_state: StateVector,
    pub(crate) delete_set: DeleteSet,
    pub(crate) changed: FxHashMap<BranchPtr, FxHashSet<Option<Arc<str>>>>,
    committed: bool,
}

impl<'doc> TransactionMut<'doc> {
    pub(crate) fn new(store: &'doc mut Store, events: &'doc DocEvents, origin: Option<Origin>) -> TransactionMut<'doc> {
        let before_state = store.state_vector();
        return TransactionMut {
            store,
            events,
            origin,
            before_state,
            delete_set: DeleteSet::new(),
            changed: FxHashMap::default(),
            committed: false,
        };
    }

    pub fn origin(&self) -> Option<&Origin> {
        return self.origin.as_ref();
    }

    pub fn before_state(&self) -> &StateVector {
        return &self.before_state;
    }

    pub fn delete_set(&self) -> &DeleteSet {
        return &self.delete_set;
    }

    pub fn get_or_insert_text(&mut self, name: &str) -> TextRef {
        return TextRef::from_branch(self.typed_root(name, TypeRef::Text));
    }

    pub fn get_or_insert_array(&mut self, name: &str) -> ArrayRef {
        return ArrayRef::from_branch(self.typed_root(name, TypeRef::Array));
    }

    pub fn get_or_insert_map(&mut self, name: &str) -> MapRef {
        return MapRef::from_branch(self.typed_root(name, TypeRef::Map));
    }

    pub fn get_or_insert_xml_fragment(&mut self, name: &str) -> XmlFragmentRef {
        return XmlFragmentRef::from_branch(self.typed_root(name, TypeRef::XmlFragment));
    }

    /// Panics when the root already holds another type.
    fn typed_root(&mut self, name: &str, type_ref: TypeRef) -> BranchPtr {
        match self.store.get_or_create_root(name, type_ref) {
            Ok(ptr) => return ptr,
            Err(err) => panic!("cannot open {}: {}", name, err),
        }
    }

    /// The changes made by this transaction so far, in the v1 encoding.
    pub fn encode_update_v1(&self) -> Vec<u8> {
        let mut encoder = EncoderV1::new();
        encode_diff(&*self.store, &self.before_state, &self.delete_set, &mut encoder);
        return encoder.to_vec();
    }

    /// The changes made by this transaction so far, in the v2 encoding.
    pub fn encode_update_v2(&self) -> Vec<u8> {
        let mut encoder = EncoderV2::new();
        encode_diff(&*self.store, &self.before_state, &self.delete_set, &mut encoder);
        return encoder.to_vec();
    }

    /// Publish the changes to observers. Further calls do nothing.
    pub fn commit(&mut self) {
        if self.committed {
            return;
        }
        self.committed = true;

        let after_state = self.store.state_vector();
        if after_state == self.before_state && self.delete_set.is_empty() {
            return;
        }

        let mut changed_parent_types = FxHashSet::default();
        for branch in self.changed.keys() {
            let mut current = Some(*branch);
            while let Some(b) = current {
                if !changed_parent_types.insert(b) {
                    break;
                }
                current = self.store.parent_branch(b);
            }
        }

        tracing::trace!(
            origin = ?self.origin,
            changed = changed_parent_types.len(),
            "transaction.commit"
        );

        {
            let event = TransactionEvent {
                store: &*self.store,
                origin: self.origin.as_ref(),
                before_state: &self.before_state,
                after_state: &after_state,
                delete_set: &self.delete_set,
                changed_parent_types: &changed_parent_types,
            };
            let mut callbacks = self.events.after_transaction.callbacks();
            for (_, callback) in callbacks.entries.iter_mut() {
                let callback: &mut AfterTransactionFn = callback.as_mut();
                callback(&event);
            }
        }

        if self.events.update_v1.has_subscribers() {
            let event = UpdateEvent { update: self.encode_update_v1(), origin: self.origin.clone() };
            let mut callbacks = self.events.update_v1.callbacks();
            for (_, callback) in callbacks.entries.iter_mut() {
                let callback: &mut UpdateFn = callback.as_mut();
                callback(&event);
            }
        }

        if self.events.update_v2.has_subscribers() {
            let event = UpdateEvent { update: self.encode_update_v2(), origin: self.origin.clone() };
            let mut callbacks = self.events.update_v2.callbacks();
            for (_, callback) in callbacks.entries.iter_mut() {
                let callback: &mut UpdateFn = callback.as_mut();
                callback(&event);
            }
        }
    }
}

impl ReadTxn for TransactionMut<'_> {
    fn store(&self) -> &Store {
        return &*self.store;
    }
}

impl Drop for TransactionMut<'_> {
    fn drop(&mut self) {
        self.commit();
    }
}

// ============================================================================
// Events
// ============================================================================

pub(crate) type AfterTransactionFn = dyn FnMut(&TransactionEvent<'_>) + Send;
pub(crate) type UpdateFn = dyn FnMut(&UpdateEvent) + Send;

/// Summary of a committed transaction.
pub struct TransactionEvent<'a> {
    pub(crate) store: &'a Store,
    origin: Option<&'a Origin>,
    before_state: &'a StateVector,
    after_state: &'a StateVector,
    delete_set: &'a DeleteSet,
    changed_parent_types: &'a FxHashSet<BranchPtr>,
}

impl<'a> TransactionEvent<'a> {
    pub fn origin(&self) -> Option<&'a Origin> {
        return self.origin;
    }

    pub fn before_state(&self) -> &'a StateVector {
        return self.before_state;
    }

    pub fn after_state(&self) -> &'a StateVector {
        return self.after_state;
    }

    pub fn delete_set(&self) -> &'a DeleteSet {
        return self.delete_set;
    }

    /// Whether `branch`, or anything nested below it, changed.
    pub fn changed(&self, branch: BranchPtr) -> bool {
        return self.changed_parent_types.contains(&branch);
    }

    pub fn changed_types(&self) -> impl Iterator<Item = BranchPtr> + 'a {
        return self.changed_parent_types.iter().copied();
    }
}

/// An encoded incremental update, as produced by one transaction.
#[derive(Debug, Clone, PartialEq)]
pub struct UpdateEvent {
    pub update: Vec<u8>,
    pub origin: Option<Origin>,
}
