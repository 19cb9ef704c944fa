// created = "2026-10-17"
// modified = "2026-10-17"

//! Undo and redo.
//!
//! An [`UndoManager`] watches the transactions of one document. Every
//! transaction that touches one of its scope types is recorded as a
//! [`StackItem`]: the ids it inserted and the ids it deleted. Transactions
//! that follow each other within the capture timeout are merged into the
//! same item. Undoing an item deletes what it inserted and restores what it
//! deleted; the restoring transaction is itself recorded on the redo stack,
//! so redo is the same operation in the other direction.
//!
//! Restored content is always a fresh copy with new ids, which keeps undo a
//! plain sequence of inserts and deletes that every replica can integrate.
//!
//! ```
//! use tandem::undo::{Options, UndoManager};
//! use tandem::{Doc, ReadTxn, Text};
//!
//! let mut doc = Doc::with_client_id(1);
//! let text = doc.get_or_insert_text("t");
//! let undo = UndoManager::new(&doc, &text, Options::default()).unwrap();
//!
//! text.insert(&mut doc.transact_mut(), 0, "Hello").unwrap();
//! undo.stop_capturing();
//! text.insert(&mut doc.transact_mut(), 5, "!").unwrap();
//!
//! assert!(undo.undo(&mut doc));
//! assert_eq!(text.get_string(&doc.transact()), "Hello");
//! assert!(undo.undo(&mut doc));
//! assert_eq!(text.get_string(&doc.transact()), "");
//! assert!(!undo.undo(&mut doc));
//! ```

use std::collections::HashMap;
use std::fmt;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};

use rustc_hash::FxHashSet;

use crate::any::Any;
use crate::crdt::branch::{BranchPtr, TypeRef};
use crate::crdt::item::ItemPtr;
use crate::crdt::primitives::clock::{Clock, SystemClock};
use crate::crdt::primitives::id_set::{DeleteSet, IdSet};
use crate::crdt::store::Store;
use crate::doc::Doc;
use crate::error::Error;
use crate::observer::{Observer, Subscription};
use crate::transaction::{Origin, TransactionEvent, TransactionMut};
use crate::types::SharedRef;

/// Arbitrary data attached to a stack item by observers.
pub type Meta = HashMap<Arc<str>, Any>;

// ============================================================================
// Stack items and events
// ============================================================================

/// One reversible step.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct StackItem {
    insertions: IdSet,
    deletions: DeleteSet,
    meta: Meta,
}

impl StackItem {
    /// Ids created by the captured transactions.
    pub fn insertions(&self) -> &IdSet {
        return &self.insertions;
    }

    /// Ids deleted by the captured transactions.
    pub fn deletions(&self) -> &DeleteSet {
        return &self.deletions;
    }

    pub fn meta(&self) -> &Meta {
        return &self.meta;
    }
}

/// The stack an item belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EventKind {
    Undo,
    Redo,
}

/// Passed to [`UndoObserver`] callbacks.
#[derive(Debug)]
pub struct UndoEvent<'a> {
    pub kind: EventKind,
    pub origin: Option<&'a Origin>,
    pub item: &'a StackItem,
}

/// What to do with a newly captured stack item.
#[derive(Debug, Clone, PartialEq, Default)]
pub enum Decision {
    /// Keep the item as it is.
    #[default]
    Passthrough,
    /// Keep the item and merge these entries into its metadata.
    Annotate(Meta),
    /// Drop the item. The change stays in the document but cannot be undone.
    Reject,
}

/// Hooks into the life of stack items.
///
/// Callbacks run outside of the manager's lock but while the document is
/// borrowed, so they may inspect the manager but not the document.
pub trait UndoObserver: Send {
    fn stack_item_added(&mut self, event: &UndoEvent<'_>) -> Decision {
        let _ = event;
        return Decision::Passthrough;
    }

    /// A transaction was merged into the top item.
    fn stack_item_updated(&mut self, event: &UndoEvent<'_>) {
        let _ = event;
    }

    /// An item was undone or redone.
    fn stack_item_popped(&mut self, event: &UndoEvent<'_>) {
        let _ = event;
    }
}

type Observers = Observer<dyn UndoObserver>;

// ============================================================================
// Options
// ============================================================================

#[derive(Clone)]
pub struct Options {
    /// Transactions closer together than this are merged into one item.
    pub capture_timeout_millis: u64,
    /// When not empty, only transactions with one of these origins are
    /// recorded. Undo and redo of this manager are always recorded.
    pub tracked_origins: FxHashSet<Origin>,
    /// Transactions with one of these origins are never recorded.
    pub excluded_origins: FxHashSet<Origin>,
    /// Maximum number of items per stack. The oldest item is dropped first.
    pub capacity: Option<usize>,
    pub clock: Arc<dyn Clock>,
}

impl Default for Options {
    fn default() -> Options {
        return Options {
            capture_timeout_millis: 500,
            tracked_origins: FxHashSet::default(),
            excluded_origins: FxHashSet::default(),
            capacity: None,
            clock: Arc::new(SystemClock),
        };
    }
}

impl fmt::Debug for Options {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        return f
            .debug_struct("Options")
            .field("capture_timeout_millis", &self.capture_timeout_millis)
            .field("tracked_origins", &self.tracked_origins)
            .field("excluded_origins", &self.excluded_origins)
            .field("capacity", &self.capacity)
            .finish_non_exhaustive();
    }
}

// ============================================================================
// Manager
// ============================================================================

static NEXT_MANAGER: AtomicU64 = AtomicU64::new(0);

struct Inner {
    scope: FxHashSet<BranchPtr>,
    options: Options,
    origin: Origin,
    undo_stack: Vec<StackItem>,
    redo_stack: Vec<StackItem>,
    undoing: bool,
    redoing: bool,
    last_change: u64,
    /// Metadata of the item being undone or redone, handed to the item the
    /// reversal produces.
    carried_meta: Option<Meta>,
}

impl Inner {
    fn tracks(&self, origin: Option<&Origin>) -> bool {
        if origin.is_some_and(|o| self.options.excluded_origins.contains(o)) {
            return false;
        }
        return self.options.tracked_origins.is_empty()
            || origin == Some(&self.origin)
            || origin.is_some_and(|o| self.options.tracked_origins.contains(o));
    }

    fn stack_mut(&mut self, kind: EventKind) -> &mut Vec<StackItem> {
        return match kind {
            EventKind::Undo => &mut self.undo_stack,
            EventKind::Redo => &mut self.redo_stack,
        };
    }
}

fn lock(inner: &Mutex<Inner>) -> MutexGuard<'_, Inner> {
    return inner.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
}

/// Records changes to a set of shared types and reverts them on request.
pub struct UndoManager {
    guid: Arc<str>,
    inner: Arc<Mutex<Inner>>,
    observers: Arc<Observers>,
    _subscription: Subscription,
}

impl UndoManager {
    /// Track changes to `scope` in `doc`.
    pub fn new<S: SharedRef>(doc: &Doc, scope: &S, options: Options) -> Result<UndoManager, Error> {
        check_scope(doc.store(), scope.branch_ptr())?;
        let id = NEXT_MANAGER.fetch_add(1, Ordering::Relaxed);
        let mut origin_bytes = b"undo:".to_vec();
        origin_bytes.extend_from_slice(&id.to_be_bytes());
        let inner = Arc::new(Mutex::new(Inner {
            scope: FxHashSet::from_iter([scope.branch_ptr()]),
            options,
            origin: Origin::from(origin_bytes.as_slice()),
            undo_stack: Vec::new(),
            redo_stack: Vec::new(),
            undoing: false,
            redoing: false,
            last_change: 0,
            carried_meta: None,
        }));
        let observers: Arc<Observers> = Arc::new(Observer::new());

        let subscription = {
            let inner = inner.clone();
            let observers = observers.clone();
            doc.observe_after_transaction(move |event| record(&inner, &observers, event))
        };
        return Ok(UndoManager { guid: Arc::from(doc.guid()), inner, observers, _subscription: subscription });
    }

    /// Also track changes to `scope`.
    pub fn expand_scope<S: SharedRef>(&self, doc: &Doc, scope: &S) -> Result<(), Error> {
        check_scope(doc.store(), scope.branch_ptr())?;
        lock(&self.inner).scope.insert(scope.branch_ptr());
        return Ok(());
    }

    pub fn include_origin<O: Into<Origin>>(&self, origin: O) {
        lock(&self.inner).options.tracked_origins.insert(origin.into());
    }

    pub fn exclude_origin<O: Into<Origin>>(&self, origin: O) {
        lock(&self.inner).options.excluded_origins.insert(origin.into());
    }

    /// Origin of the transactions this manager uses to undo and redo.
    pub fn origin(&self) -> Origin {
        return lock(&self.inner).origin.clone();
    }

    pub fn add_observer<O: UndoObserver + 'static>(&self, observer: O) -> Subscription {
        return self.observers.subscribe(Box::new(observer));
    }

    pub fn can_undo(&self) -> bool {
        return !lock(&self.inner).undo_stack.is_empty();
    }

    pub fn can_redo(&self) -> bool {
        return !lock(&self.inner).redo_stack.is_empty();
    }

    pub fn undo_stack(&self) -> Vec<StackItem> {
        return lock(&self.inner).undo_stack.clone();
    }

    pub fn redo_stack(&self) -> Vec<StackItem> {
        return lock(&self.inner).redo_stack.clone();
    }

    /// Make the next change start a new stack item.
    pub fn stop_capturing(&self) {
        lock(&self.inner).last_change = 0;
    }

    /// Forget both stacks. The document is left as it is.
    pub fn clear(&self) {
        let mut inner = lock(&self.inner);
        inner.undo_stack.clear();
        inner.redo_stack.clear();
    }

    /// Revert the most recent stack item. Returns false when there was
    /// nothing to undo.
    pub fn undo(&self, doc: &mut Doc) -> bool {
        lock(&self.inner).undoing = true;
        let changed = self.pop(doc, EventKind::Undo);
        lock(&self.inner).undoing = false;
        return changed;
    }

    /// Reapply the most recently undone stack item. Returns false when there
    /// was nothing to redo.
    pub fn redo(&self, doc: &mut Doc) -> bool {
        lock(&self.inner).redoing = true;
        let changed = self.pop(doc, EventKind::Redo);
        lock(&self.inner).redoing = false;
        return changed;
    }

    /// Pop items until one of them changes the document.
    fn pop(&self, doc: &mut Doc, kind: EventKind) -> bool {
        if doc.guid() != &*self.guid {
            tracing::warn!(guid = %doc.guid(), "undo.foreign_doc");
            return false;
        }
        loop {
            let (item, scope, origin) = {
                let mut inner = lock(&self.inner);
                let Some(item) = inner.stack_mut(kind).pop() else {
                    return false;
                };
                inner.carried_meta = Some(item.meta.clone());
                (item, inner.scope.clone(), inner.origin.clone())
            };
            let changed = {
                let mut txn = doc.transact_mut_with(origin.clone());
                let changed = revert(&mut txn, &item, &scope);
                txn.commit();
                changed
            };
            lock(&self.inner).carried_meta = None;
            if changed {
                tracing::debug!(kind = ?kind, "undo.item_popped");
                let event = UndoEvent { kind, origin: Some(&origin), item: &item };
                let mut callbacks = self.observers.callbacks();
                for (_, observer) in callbacks.entries.iter_mut() {
                    observer.stack_item_popped(&event);
                }
                return true;
            }
        }
    }
}

impl fmt::Debug for UndoManager {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let inner = lock(&self.inner);
        return f
            .debug_struct("UndoManager")
            .field("undo_stack", &inner.undo_stack.len())
            .field("redo_stack", &inner.redo_stack.len())
            .finish();
    }
}

fn check_scope(store: &Store, branch: BranchPtr) -> Result<(), Error> {
    if !store.has_branch(branch) {
        return Err(Error::InvalidScope(format!("{:?} does not belong to this document", branch)));
    }
    if store.branch(branch).type_ref == TypeRef::Undefined {
        return Err(Error::InvalidScope(format!("{:?} has no type yet", branch)));
    }
    if store.is_branch_deleted(branch) {
        return Err(Error::InvalidScope(format!("{:?} has been deleted", branch)));
    }
    return Ok(());
}

// ============================================================================
// Capturing
// ============================================================================

enum Captured {
    Added(StackItem, EventKind),
    Updated(StackItem),
}

/// After-transaction hook: capture the transaction into a stack item.
fn record(inner: &Mutex<Inner>, observers: &Observers, event: &TransactionEvent<'_>) {
    let origin = event.origin();
    let captured = {
        let mut inner = lock(inner);
        if !inner.tracks(origin) || !inner.scope.iter().any(|b| event.changed(*b)) {
            return;
        }
        let (undoing, redoing) = (inner.undoing, inner.redoing);
        if undoing {
            inner.last_change = 0;
        } else if !redoing {
            inner.redo_stack.clear();
        }

        let mut insertions = IdSet::new();
        for (client, after) in event.after_state().iter() {
            let before = event.before_state().get(client);
            if *after > before {
                insertions.insert_range(*client, before..*after);
            }
        }
        let deletions = event.delete_set().clone();

        let now = inner.options.clock.now();
        let extend = !undoing
            && !redoing
            && inner.last_change > 0
            && now.saturating_sub(inner.last_change) < inner.options.capture_timeout_millis
            && !inner.undo_stack.is_empty();
        if !undoing && !redoing {
            inner.last_change = now;
        }

        if extend {
            let Some(top) = inner.undo_stack.last_mut() else {
                return;
            };
            top.insertions.merge(&insertions);
            top.deletions.merge(&deletions);
            Captured::Updated(top.clone())
        } else {
            let meta = inner.carried_meta.take().unwrap_or_default();
            let kind = if undoing { EventKind::Redo } else { EventKind::Undo };
            Captured::Added(StackItem { insertions, deletions, meta }, kind)
        }
    };

    match captured {
        Captured::Updated(item) => {
            tracing::debug!(origin = ?origin, "undo.item_updated");
            let event = UndoEvent { kind: EventKind::Undo, origin, item: &item };
            let mut callbacks = observers.callbacks();
            for (_, observer) in callbacks.entries.iter_mut() {
                observer.stack_item_updated(&event);
            }
        }
        Captured::Added(mut item, kind) => {
            let mut rejected = false;
            let mut annotations = Meta::new();
            {
                let event = UndoEvent { kind, origin, item: &item };
                let mut callbacks = observers.callbacks();
                for (_, observer) in callbacks.entries.iter_mut() {
                    match observer.stack_item_added(&event) {
                        Decision::Passthrough => {}
                        Decision::Annotate(meta) => annotations.extend(meta),
                        Decision::Reject => rejected = true,
                    }
                }
            }
            if rejected {
                tracing::debug!(kind = ?kind, "undo.item_rejected");
                return;
            }
            item.meta.extend(annotations);

            let mut inner = lock(inner);
            let capacity = inner.options.capacity;
            let stack = inner.stack_mut(kind);
            stack.push(item);
            if let Some(capacity) = capacity {
                let excess = stack.len().saturating_sub(capacity);
                stack.drain(..excess);
            }
            tracing::debug!(kind = ?kind, len = stack.len(), "undo.item_added");
        }
    }
}

// ============================================================================
// Reverting
// ============================================================================

/// Delete what `item` inserted and restore what it deleted, limited to
/// content below `scope`. Returns whether anything changed.
fn revert(txn: &mut TransactionMut<'_>, item: &StackItem, scope: &FxHashSet<BranchPtr>) -> bool {
    let in_scope = |store: &Store, ptr: ItemPtr| scope.iter().any(|b| store.is_parent_of(*b, ptr));

    let mut to_delete: Vec<ItemPtr> = Vec::new();
    let mut replaceable: FxHashSet<ItemPtr> = FxHashSet::default();
    for (client, ranges) in item.insertions.iter() {
        for range in ranges.iter() {
            for ptr in txn.store.items_in_range(client, range.clone()) {
                replaceable.insert(ptr);
                let mut target = ptr;
                if txn.store.item(ptr).redone.is_some() {
                    let id = txn.store.item(ptr).id;
                    let Some((redone, diff)) = txn.store.follow_redone(&id) else {
                        continue;
                    };
                    target = redone;
                    if diff > 0 {
                        let start = txn.store.item(redone).id;
                        let Some(split) = txn.store.get_item_clean_start(&start.offset(diff)) else {
                            continue;
                        };
                        target = split;
                    }
                }
                replaceable.insert(target);
                if !txn.store.item(target).deleted && in_scope(&*txn.store, target) {
                    to_delete.push(target);
                }
            }
        }
    }

    let mut to_redo: Vec<ItemPtr> = Vec::new();
    for (client, ranges) in item.deletions.iter() {
        for range in ranges.iter() {
            for ptr in txn.store.items_in_range(client, range.clone()) {
                let id = txn.store.item(ptr).id;
                if in_scope(&*txn.store, ptr) && !item.insertions.contains(&id) {
                    to_redo.push(ptr);
                }
            }
        }
    }
    let redo_set: FxHashSet<ItemPtr> = to_redo.iter().copied().collect();

    let mut changed = false;
    for ptr in &to_redo {
        if txn.redo_item(*ptr, &redo_set, &replaceable).is_some() {
            changed = true;
        }
    }
    // Children before parents.
    for ptr in to_delete.iter().rev() {
        if txn.delete_item(*ptr) {
            changed = true;
        }
    }
    return changed;
}
