// created = "2026-10-17"
// modified = "2026-10-17"

//! Documents.
//!
//! A [`Doc`] owns one replica's store and the observers registered on it.
//! Shared types are reached through named roots; edits happen inside
//! transactions; replicas converge by exchanging state vectors and updates.
//!
//! ```
//! use tandem::{Doc, ReadTxn, Text};
//!
//! let mut alice = Doc::with_client_id(1);
//! let text = alice.get_or_insert_text("body");
//! text.insert(&mut alice.transact_mut(), 0, "hello").unwrap();
//!
//! let mut bob = Doc::with_client_id(2);
//! let update = alice.encode_state_as_update_v1(Some(&bob.encode_state_vector_v1())).unwrap();
//! bob.apply_update_v1(&update).unwrap();
//! let body = bob.get_or_insert_text("body");
//! assert_eq!(body.get_string(&bob.transact()), "hello");
//! ```

use std::sync::Arc;

use rand_core::{OsRng, RngCore};

use crate::crdt::primitives::clock::StateVector;
use crate::crdt::primitives::id::ClientId;
use crate::crdt::store::Store;
use crate::error::Error;
use crate::observer::{Observer, Subscription};
use crate::transaction::{
    AfterTransactionFn, Origin, ReadTxn, Transaction, TransactionEvent, TransactionMut, UpdateEvent, UpdateFn,
};
use crate::types::array::ArrayRef;
use crate::types::map::MapRef;
use crate::types::text::TextRef;
use crate::types::xml::XmlFragmentRef;
use crate::updates::update::Update;

/// The unit in which text lengths and offsets are counted. It only
/// affects the local API: ids and updates are the same for every setting.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum OffsetKind {
    /// Unicode scalar values.
    #[default]
    Chars,
    /// UTF-8 bytes.
    Bytes,
    /// UTF-16 code units, as counted by JavaScript strings.
    Utf16,
}

impl OffsetKind {
    /// Length of `s` in this unit.
    pub fn measure(&self, s: &str) -> u32 {
        return match self {
            OffsetKind::Chars => s.chars().count() as u32,
            OffsetKind::Bytes => s.len() as u32,
            OffsetKind::Utf16 => s.encode_utf16().count() as u32,
        };
    }

    /// Number of leading chars of `s` needed to cover `units` units. A unit
    /// inside a character pulls in the whole character.
    pub fn chars_covering(&self, s: &str, units: u32) -> u32 {
        if *self == OffsetKind::Chars {
            return units.min(s.chars().count() as u32);
        }
        let mut covered = 0u32;
        let mut chars = 0u32;
        for c in s.chars() {
            if covered >= units {
                break;
            }
            covered += match self {
                OffsetKind::Bytes => c.len_utf8() as u32,
                _ => c.len_utf16() as u32,
            };
            chars += 1;
        }
        return chars;
    }
}

/// Document configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Options {
    /// Identity of this replica. Must be unique among collaborating
    /// replicas.
    pub client_id: ClientId,
    /// Unique id of the document itself.
    pub guid: Arc<str>,
    /// Optional grouping key for documents that belong together.
    pub collection_id: Option<Arc<str>>,
    /// How text offsets are counted.
    pub offset_kind: OffsetKind,
}

impl Options {
    pub fn with_client_id(client_id: ClientId) -> Options {
        return Options { client_id, guid: random_guid(), collection_id: None, offset_kind: OffsetKind::default() };
    }
}

impl Default for Options {
    fn default() -> Options {
        return Options::with_client_id(random_client_id());
    }
}

/// A random client id that fits in 53 bits.
pub fn random_client_id() -> ClientId {
    return OsRng.next_u64() & ((1u64 << 53) - 1);
}

fn random_guid() -> Arc<str> {
    let mut bytes = [0u8; 16];
    OsRng.fill_bytes(&mut bytes);
    bytes[6] = (bytes[6] & 0x0f) | 0x40;
    bytes[8] = (bytes[8] & 0x3f) | 0x80;
    let hex: String = bytes.iter().map(|b| format!("{:02x}", b)).collect();
    let guid = format!("{}-{}-{}-{}-{}", &hex[0..8], &hex[8..12], &hex[12..16], &hex[16..20], &hex[20..32]);
    return Arc::from(guid);
}

/// Observers registered on a document.
#[derive(Default)]
pub(crate) struct DocEvents {
    pub after_transaction: Observer<AfterTransactionFn>,
    pub update_v1: Observer<UpdateFn>,
    pub update_v2: Observer<UpdateFn>,
}

/// One replica of a shared document.
pub struct Doc {
    options: Options,
    store: Store,
    events: DocEvents,
}

impl Doc {
    pub fn new() -> Doc {
        return Doc::with_options(Options::default());
    }

    pub fn with_client_id(client_id: ClientId) -> Doc {
        return Doc::with_options(Options::with_client_id(client_id));
    }

    pub fn with_options(options: Options) -> Doc {
        tracing::debug!(client_id = options.client_id, guid = %options.guid, offset_kind = ?options.offset_kind, "doc.new");
        let store = Store::new(options.client_id, options.offset_kind);
        return Doc { store, options, events: DocEvents::default() };
    }

    pub fn client_id(&self) -> ClientId {
        return self.options.client_id;
    }

    pub fn guid(&self) -> &str {
        return &self.options.guid;
    }

    pub fn collection_id(&self) -> Option<&str> {
        return self.options.collection_id.as_deref();
    }

    pub fn options(&self) -> &Options {
        return &self.options;
    }

    pub(crate) fn store(&self) -> &Store {
        return &self.store;
    }

    // ========================================================================
    // Roots
    // ========================================================================

    // Each of these panics when `name` already holds a different type.

    pub fn get_or_insert_text(&mut self, name: &str) -> TextRef {
        return self.transact_mut().get_or_insert_text(name);
    }

    pub fn get_or_insert_array(&mut self, name: &str) -> ArrayRef {
        return self.transact_mut().get_or_insert_array(name);
    }

    pub fn get_or_insert_map(&mut self, name: &str) -> MapRef {
        return self.transact_mut().get_or_insert_map(name);
    }

    pub fn get_or_insert_xml_fragment(&mut self, name: &str) -> XmlFragmentRef {
        return self.transact_mut().get_or_insert_xml_fragment(name);
    }

    // ========================================================================
    // Transactions
    // ========================================================================

    pub fn transact(&self) -> Transaction<'_> {
        return Transaction::new(&self.store);
    }

    pub fn transact_mut(&mut self) -> TransactionMut<'_> {
        return TransactionMut::new(&mut self.store, &self.events, None);
    }

    /// A transaction tagged with `origin`, which observers and the undo
    /// manager can inspect.
    pub fn transact_mut_with<O: Into<Origin>>(&mut self, origin: O) -> TransactionMut<'_> {
        return TransactionMut::new(&mut self.store, &self.events, Some(origin.into()));
    }

    // ========================================================================
    // Observers
    // ========================================================================

    /// Called after every transaction that changed the document.
    pub fn observe_after_transaction<F>(&self, callback: F) -> Subscription
    where
        F: FnMut(&TransactionEvent<'_>) + Send + 'static,
    {
        return self.events.after_transaction.subscribe(Box::new(callback));
    }

    /// Called with the v1-encoded changes of every transaction.
    pub fn observe_update_v1<F>(&self, callback: F) -> Subscription
    where
        F: FnMut(&UpdateEvent) + Send + 'static,
    {
        return self.events.update_v1.subscribe(Box::new(callback));
    }

    /// Called with the v2-encoded changes of every transaction.
    pub fn observe_update_v2<F>(&self, callback: F) -> Subscription
    where
        F: FnMut(&UpdateEvent) + Send + 'static,
    {
        return self.events.update_v2.subscribe(Box::new(callback));
    }

    // ========================================================================
    // Synchronization
    // ========================================================================

    pub fn state_vector(&self) -> StateVector {
        return self.store.state_vector();
    }

    pub fn encode_state_vector_v1(&self) -> Vec<u8> {
        return self.transact().encode_state_vector_v1();
    }

    pub fn encode_state_vector_v2(&self) -> Vec<u8> {
        return self.transact().encode_state_vector_v2();
    }

    /// Everything the holder of the v1-encoded `state_vector` is missing.
    /// With no state vector, the whole document.
    pub fn encode_state_as_update_v1(&self, state_vector: Option<&[u8]>) -> Result<Vec<u8>, Error> {
        let sv = match state_vector {
            Some(bytes) => StateVector::decode_v1(bytes)?,
            None => StateVector::new(),
        };
        return Ok(self.transact().encode_diff_v1(&sv));
    }

    /// Everything the holder of the v2-encoded `state_vector` is missing.
    /// With no state vector, the whole document.
    pub fn encode_state_as_update_v2(&self, state_vector: Option<&[u8]>) -> Result<Vec<u8>, Error> {
        let sv = match state_vector {
            Some(bytes) => StateVector::decode_v2(bytes)?,
            None => StateVector::new(),
        };
        return Ok(self.transact().encode_diff_v2(&sv));
    }

    pub fn apply_update_v1(&mut self, update: &[u8]) -> Result<(), Error> {
        let update = Update::decode_v1(update).inspect_err(|err| {
            tracing::warn!(error = %err, "update.rejected");
        })?;
        return self.transact_mut().apply_update(update);
    }

    pub fn apply_update_v2(&mut self, update: &[u8]) -> Result<(), Error> {
        let update = Update::decode_v2(update).inspect_err(|err| {
            tracing::warn!(error = %err, "update.rejected");
        })?;
        return self.transact_mut().apply_update(update);
    }
}

impl Default for Doc {
    fn default() -> Doc {
        return Doc::new();
    }
}

impl std::fmt::Debug for Doc {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        return f
            .debug_struct("Doc")
            .field("client_id", &self.options.client_id)
            .field("guid", &self.options.guid)
            .finish();
    }
}
