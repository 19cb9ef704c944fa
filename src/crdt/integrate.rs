// created = "2026-10-17"
// modified = "2026-10-17"

//! Integration of local and remote operations.
//!
//! # Ordering
//!
//! New items are placed with the YATA rule. An item remembers the ids of its
//! left neighbour (`origin`) and right neighbour (`right_origin`) at the time
//! it was created. When several items were inserted concurrently between the
//! same neighbours, every replica scans the conflicting region from left to
//! right and orders them by their origins, falling back to the client id as
//! a tie breaker. The result is identical on every replica regardless of
//! the order in which the items arrive.
//!
//! # Map entries
//!
//! Writes to the same key of a map are linked the same way, but only one of
//! them is the value of the key. Each write gets a rank: its own clock, or
//! one more than the rank of the write it overwrote if that is higher. The
//! write with the highest rank wins, ties going to the larger client id,
//! and every other write to the key is deleted. A write therefore always
//! beats the value its author saw, and concurrent writes are decided by
//! clock first.
//!
//! # Remote updates
//!
//! An update is fully decoded and validated before anything is touched.
//! Blocks are then integrated per client in clock order. A block whose
//! dependencies or parent have not arrived yet stays in the store's pending
//! update and is retried when later updates arrive; deletions of unknown ids
//! are parked the same way.

use std::sync::Arc;

use rustc_hash::FxHashSet;

use crate::crdt::branch::BranchPtr;
use crate::crdt::item::{Content, Item, ItemPtr};
use crate::crdt::primitives::id::{ClientId, Id};
use crate::crdt::primitives::id_set::DeleteSet;
use crate::error::{DecodeError, Error};
use crate::transaction::TransactionMut;
use crate::updates::update::{Block, ParentRef, Payload, Update};

impl TransactionMut<'_> {
    // ========================================================================
    // Local operations
    // ========================================================================

    /// Create an item authored by this replica between `left` and `right`
    /// and integrate it.
    pub(crate) fn create_item(
        &mut self,
        parent: BranchPtr,
        left: Option<ItemPtr>,
        right: Option<ItemPtr>,
        parent_sub: Option<Arc<str>>,
        content: Content,
    ) -> ItemPtr {
        let client = self.store.client_id;
        let id = Id::new(client, self.store.get_state(&client));
        let origin = left.map(|l| self.store.item(l).last_id());
        let right_origin = right.map(|r| self.store.item(r).id);
        let item = Item::new(id, left, origin, right, right_origin, parent, parent_sub, content);
        let ptr = self.store.alloc_item(item);
        self.integrate(ptr);
        return ptr;
    }

    /// Mark an item deleted. Nested types delete their whole subtree.
    /// Returns false if the item was already deleted.
    pub(crate) fn delete_item(&mut self, ptr: ItemPtr) -> bool {
        let (id, len, parent, parent_sub, nested) = {
            let item = self.store.item(ptr);
            if item.deleted {
                return false;
            }
            let nested = match &item.content {
                Content::Type(branch) => Some(*branch),
                _ => None,
            };
            (item.id, item.len, item.parent, item.parent_sub.clone(), nested)
        };
        self.store.item_mut(ptr).deleted = true;
        if parent_sub.is_none() {
            self.store.reweigh(ptr);
        }
        self.delete_set.insert(id, len);
        self.add_changed(parent, parent_sub);

        if let Some(branch) = nested {
            let mut child = self.store.branch(branch).start;
            while let Some(current) = child {
                child = self.store.item(current).right;
                self.delete_item(current);
            }
            let entries: Vec<ItemPtr> = self.store.branch(branch).map.values().copied().collect();
            for entry in entries {
                self.delete_item(entry);
            }
        }
        return true;
    }

    /// Record that `parent` changed, unless it was created by this
    /// transaction.
    fn add_changed(&mut self, parent: BranchPtr, parent_sub: Option<Arc<str>>) {
        let existed = match self.store.branch(parent).item {
            None => true,
            Some(holder) => {
                let item = self.store.item(holder);
                item.id.clock < self.before_state.get(&item.id.client) && !item.deleted
            }
        };
        if existed {
            self.changed.entry(parent).or_default().insert(parent_sub);
        }
    }

    // ========================================================================
    // YATA
    // ========================================================================

    /// Link an allocated item into its parent.
    pub(crate) fn integrate(&mut self, ptr: ItemPtr) {
        let (id, origin, right_origin, parent, parent_sub, right) = {
            let item = self.store.item(ptr);
            (item.id, item.origin, item.right_origin, item.parent, item.parent_sub.clone(), item.right)
        };
        let mut left = self.store.item(ptr).left;

        let conflict = match left {
            Some(l) => self.store.item(l).right != right,
            None => match right {
                Some(r) => self.store.item(r).left.is_some(),
                None => true,
            },
        };

        if conflict {
            let mut o = match left {
                Some(l) => self.store.item(l).right,
                None => match &parent_sub {
                    Some(key) => {
                        let mut o = self.store.branch(parent).map.get(key).copied();
                        while let Some(p) = o {
                            match self.store.item(p).left {
                                Some(l) => o = Some(l),
                                None => break,
                            }
                        }
                        o
                    }
                    None => self.store.branch(parent).start,
                },
            };

            let mut conflicting: FxHashSet<ItemPtr> = FxHashSet::default();
            let mut before_origin: FxHashSet<ItemPtr> = FxHashSet::default();
            while let Some(current) = o {
                if Some(current) == right {
                    break;
                }
                before_origin.insert(current);
                conflicting.insert(current);
                let other = self.store.item(current);
                if other.origin == origin {
                    if other.id.client < id.client {
                        left = Some(current);
                        conflicting.clear();
                    } else if other.right_origin == right_origin {
                        break;
                    }
                } else {
                    let other_origin = other.origin.and_then(|o| self.store.get_item(&o));
                    match other_origin {
                        Some(op) if before_origin.contains(&op) => {
                            if !conflicting.contains(&op) {
                                left = Some(current);
                                conflicting.clear();
                            }
                        }
                        _ => break,
                    }
                }
                o = self.store.item(current).right;
            }
            self.store.item_mut(ptr).left = left;
        }

        let right = match left {
            Some(l) => {
                let r = self.store.item(l).right;
                self.store.item_mut(l).right = Some(ptr);
                r
            }
            None => match &parent_sub {
                Some(key) => {
                    let mut r = self.store.branch(parent).map.get(key).copied();
                    while let Some(p) = r {
                        match self.store.item(p).left {
                            Some(l) => r = Some(l),
                            None => break,
                        }
                    }
                    r
                }
                None => {
                    let r = self.store.branch(parent).start;
                    self.store.branch_mut(parent).start = Some(ptr);
                    r
                }
            },
        };
        self.store.item_mut(ptr).right = right;
        if let Some(r) = right {
            self.store.item_mut(r).left = Some(ptr);
        }
        if parent_sub.is_none() {
            self.store.index_item(ptr);
        }

        let (len, deleted, nested) = {
            let item = self.store.item(ptr);
            let nested = match &item.content {
                Content::Type(branch) => Some(*branch),
                _ => None,
            };
            (item.len, item.deleted, nested)
        };
        self.store.push_block(ptr);
        if let Some(branch) = nested {
            self.store.branch_mut(branch).item = Some(ptr);
        }
        if deleted {
            self.delete_set.insert(id, len);
        }
        self.add_changed(parent, parent_sub.clone());

        if let Some(key) = &parent_sub {
            self.settle_entry(parent, key, ptr);
        }
        if self.store.is_branch_deleted(parent) && !self.store.item(ptr).deleted {
            self.delete_item(ptr);
        }
    }

    /// Decide whether the freshly linked map write `ptr` becomes the value
    /// of `key`, deleting whichever write loses.
    fn settle_entry(&mut self, parent: BranchPtr, key: &Arc<str>, ptr: ItemPtr) {
        let (id, origin) = (self.store.item(ptr).id, self.store.item(ptr).origin);
        let overwritten = origin.and_then(|o| self.store.get_item(&o)).map(|o| self.store.item(o).rank);
        let rank = match overwritten {
            Some(previous) => id.clock.max(previous + 1),
            None => id.clock,
        };
        self.store.item_mut(ptr).rank = rank;

        let current = self.store.branch(parent).map.get(key).copied();
        let wins = match current {
            None => true,
            Some(c) => {
                let other = self.store.item(c);
                (rank, id.client) > (other.rank, other.id.client)
            }
        };
        if wins {
            self.store.branch_mut(parent).map.insert(key.clone(), ptr);
            if let Some(c) = current {
                self.delete_item(c);
            }
        } else {
            self.delete_item(ptr);
        }
    }

    // ========================================================================
    // Remote updates
    // ========================================================================

    /// Integrate a decoded update. Fails without touching the document when
    /// the update cannot be valid; blocks with missing dependencies are kept
    /// for later.
    pub fn apply_update(&mut self, update: Update) -> Result<(), Error> {
        if let Err(err) = self.validate_update(&update) {
            tracing::warn!(error = %err, "update.rejected");
            return Err(err.into());
        }

        let mut update = update;
        if let Some(pending) = self.store.pending.take() {
            update.merge(pending);
        }
        if let Some(pending_ds) = self.store.pending_ds.take() {
            update.delete_set.merge(&pending_ds);
        }
        let Update { mut blocks, delete_set } = update;

        let mut clients: Vec<ClientId> = blocks.keys().copied().collect();
        clients.sort_unstable();

        let mut integrated = 0usize;
        loop {
            let mut progressed = false;
            for client in clients.iter() {
                let Some(list) = blocks.get_mut(client) else {
                    continue;
                };
                while let Some(block) = list.front() {
                    let local = self.store.get_state(client);
                    if block.id.clock > local {
                        break;
                    }
                    if block.id.clock + block.len() <= local {
                        list.pop_front();
                        continue;
                    }
                    if self.missing_dependency(block).is_some() {
                        break;
                    }
                    let Some(mut block) = list.pop_front() else {
                        break;
                    };
                    block.trim_front(local - block.id.clock);
                    match self.integrate_block(block) {
                        Ok(()) => {
                            integrated += 1;
                            progressed = true;
                        }
                        Err(block) => {
                            tracing::warn!(id = %block.id, "update.unresolved_parent");
                            list.push_front(block);
                            break;
                        }
                    }
                }
            }
            if !progressed {
                break;
            }
        }

        blocks.retain(|_, list| !list.is_empty());
        let waiting: usize = blocks.values().map(|list| list.len()).sum();
        if !blocks.is_empty() {
            self.store.pending = Some(Update { blocks, delete_set: DeleteSet::new() });
        }

        let unapplied = self.apply_delete_set(&delete_set);
        let deletes_waiting = !unapplied.is_empty();
        if deletes_waiting {
            self.store.pending_ds = Some(unapplied);
        }

        if waiting > 0 || deletes_waiting {
            tracing::trace!(waiting, deletes_waiting, "update.pending");
        }
        tracing::debug!(integrated, deleted = !self.delete_set.is_empty(), waiting, "update.apply");
        return Ok(());
    }

    /// Reject updates that name as a parent an item that does not hold a
    /// shared type, whether that item is integrated, part of the update or
    /// still waiting in the pending set.
    fn validate_update(&self, update: &Update) -> Result<(), DecodeError> {
        let pending = self.store.pending.as_ref();
        for list in update.blocks.values() {
            for block in list {
                let ParentRef::Item(parent) = &block.parent else {
                    continue;
                };
                let holds_type = match self.store.get_item(parent) {
                    Some(holder) => Some(matches!(self.store.item(holder).content, Content::Type(_))),
                    None => update
                        .find_block(parent)
                        .or_else(|| pending.and_then(|p| p.find_block(parent)))
                        .map(|holder| matches!(holder.payload, Payload::Type(_))),
                };
                if holds_type == Some(false) {
                    return Err(DecodeError::InvalidParent(block.id));
                }
            }
        }
        return Ok(());
    }

    /// The first dependency of `block` that has not been integrated.
    fn missing_dependency(&self, block: &Block) -> Option<Id> {
        return block
            .dependencies()
            .find(|dep| dep.client != block.id.client && dep.clock >= self.store.get_state(&dep.client));
    }

    /// Integrate a block whose dependencies are present. The block is
    /// handed back when its parent cannot be resolved.
    fn integrate_block(&mut self, block: Block) -> Result<(), Block> {
        let left = block.origin.and_then(|o| self.store.get_item_clean_end(&o));
        let right = block.right_origin.and_then(|r| self.store.get_item_clean_start(&r));

        let resolved = match &block.parent {
            ParentRef::Root(name) => Some((self.store.remote_root(name), block.parent_sub.clone())),
            ParentRef::Item(holder) => self
                .store
                .get_item(holder)
                .and_then(|ptr| self.store.nested_branch(ptr))
                .map(|branch| (branch, block.parent_sub.clone())),
            ParentRef::Inherit => left.or(right).map(|neighbour| {
                let item = self.store.item(neighbour);
                (item.parent, item.parent_sub.clone())
            }),
        };
        let Some((parent, parent_sub)) = resolved else {
            return Err(block);
        };

        let Block { id, origin, right_origin, payload, .. } = block;
        let content = match payload {
            Payload::Any(values) => Content::Any(values),
            Payload::String(s) => Content::String(s),
            Payload::Embed(value) => Content::Embed(value),
            Payload::Format(key, value) => Content::Format(key, value),
            Payload::Deleted(len) => Content::Deleted(len),
            Payload::Type(type_ref) => Content::Type(self.store.create_branch(type_ref)),
        };
        let item = Item::new(id, left, origin, right, right_origin, parent, parent_sub, content);
        let ptr = self.store.alloc_item(item);
        self.integrate(ptr);
        return Ok(());
    }

    /// Delete every known id in `ds`. Returns the ids that are not known
    /// yet.
    pub(crate) fn apply_delete_set(&mut self, ds: &DeleteSet) -> DeleteSet {
        let mut unapplied = DeleteSet::new();
        for (client, ranges) in ds.iter() {
            let state = self.store.get_state(client);
            for range in ranges.iter() {
                if range.end > state {
                    unapplied.insert_range(*client, range.start.max(state)..range.end);
                }
                if range.start < state {
                    let items = self.store.items_in_range(client, range.start..range.end.min(state));
                    for ptr in items {
                        self.delete_item(ptr);
                    }
                }
            }
        }
        return unapplied;
    }

    // ========================================================================
    // Redo
    // ========================================================================

    /// Recreate a deleted item as a new item authored by this replica,
    /// as close as possible to its old position. Returns `None` when the
    /// item cannot be restored because its parent is gone for good, or,
    /// for a map entry, because the key now holds a value outside
    /// `replaceable`.
    pub(crate) fn redo_item(
        &mut self,
        ptr: ItemPtr,
        redo_items: &FxHashSet<ItemPtr>,
        replaceable: &FxHashSet<ItemPtr>,
    ) -> Option<ItemPtr> {
        if let Some(redone) = self.store.item(ptr).redone {
            return self.store.get_item_clean_start(&redone);
        }

        let own_parent = self.store.item(ptr).parent;
        let mut parent_item = self.store.branch(own_parent).item;
        if let Some(holder) = parent_item {
            if self.store.item(holder).deleted {
                if self.store.item(holder).redone.is_none()
                    && (!redo_items.contains(&holder) || self.redo_item(holder, redo_items, replaceable).is_none())
                {
                    return None;
                }
                let mut current = holder;
                while let Some(redone) = self.store.item(current).redone {
                    current = self.store.get_item_clean_start(&redone)?;
                }
                parent_item = Some(current);
            }
        }
        let parent = match parent_item {
            Some(holder) => self.store.nested_branch(holder)?,
            None => own_parent,
        };

        let parent_sub = self.store.item(ptr).parent_sub.clone();
        let (left, right) = match &parent_sub {
            None => {
                let left = self.trace_neighbour(self.store.item(ptr).left, parent_item, |item| item.left);
                let right = self.trace_neighbour(Some(ptr), parent_item, |item| item.right);
                (left, right)
            }
            Some(key) => {
                let winner = self.store.branch(parent).map.get(key).copied();
                if let Some(w) = winner {
                    if w != ptr && !replaceable.contains(&w) {
                        // Overwritten by a value that is not being undone.
                        return None;
                    }
                }
                (winner, None)
            }
        };

        let content = self.copy_content(ptr);
        let new_ptr = self.create_item(parent, left, right, parent_sub, content);
        let new_id = self.store.item(new_ptr).id;
        self.store.item_mut(ptr).redone = Some(new_id);
        return Some(new_ptr);
    }

    /// Walk from `start` in one direction until an item is found that,
    /// following its redone chain, lives under `parent_item`.
    fn trace_neighbour(
        &mut self,
        start: Option<ItemPtr>,
        parent_item: Option<ItemPtr>,
        step: impl Fn(&Item) -> Option<ItemPtr>,
    ) -> Option<ItemPtr> {
        let mut candidate = start;
        while let Some(current) = candidate {
            let mut trace = Some(current);
            while let Some(t) = trace {
                if self.store.branch(self.store.item(t).parent).item == parent_item {
                    return Some(t);
                }
                trace = match self.store.item(t).redone {
                    Some(redone) => self.store.get_item_clean_start(&redone),
                    None => None,
                };
            }
            candidate = step(self.store.item(current));
        }
        return None;
    }

    /// A fresh copy of an item's content. Nested types are copied empty;
    /// their children are restored separately.
    fn copy_content(&mut self, ptr: ItemPtr) -> Content {
        let content = self.store.item(ptr).content.clone();
        return match content {
            Content::Type(branch) => {
                let type_ref = self.store.branch(branch).type_ref.clone();
                Content::Type(self.store.create_branch(type_ref))
            }
            other => other,
        };
    }
}

#[cfg(test)]
mod tests {
    use std::collections::{HashMap, VecDeque};

    use rustc_hash::FxHashMap;

    use crate::any::Any;
    use crate::crdt::primitives::id::Id;
    use crate::crdt::primitives::id_set::DeleteSet;
    use crate::doc::Doc;
    use crate::error::{DecodeError, Error};
    use crate::transaction::ReadTxn;
    use crate::types::text::Text;
    use crate::types::{In, Out};
    use crate::updates::update::{Block, ParentRef, Payload, Update};

    fn updates_of(doc: &mut Doc, edits: impl FnOnce(&mut Doc)) -> Vec<Vec<u8>> {
        let (tx, rx) = std::sync::mpsc::channel();
        let _sub = doc.observe_update_v1(move |e| {
            let _ = tx.send(e.update.clone());
        });
        edits(doc);
        return rx.try_iter().collect();
    }

    #[test]
    fn concurrent_inserts_at_same_position_converge() {
        let mut a = Doc::with_client_id(1);
        let mut b = Doc::with_client_id(2);
        let ta = a.get_or_insert_text("t");
        let tb = b.get_or_insert_text("t");
        ta.insert(&mut a.transact_mut(), 0, "aa").unwrap();
        tb.insert(&mut b.transact_mut(), 0, "bb").unwrap();

        let ua = a.encode_state_as_update_v1(None).unwrap();
        let ub = b.encode_state_as_update_v1(None).unwrap();
        a.apply_update_v1(&ub).unwrap();
        b.apply_update_v1(&ua).unwrap();

        let sa = ta.get_string(&a.transact());
        let sb = tb.get_string(&b.transact());
        assert_eq!(sa, sb);
        assert_eq!(sa, "aabb");
    }

    #[test]
    fn out_of_order_blocks_wait_in_pending() {
        let mut source = Doc::with_client_id(1);
        let text = source.get_or_insert_text("t");
        let mut updates = Vec::new();
        let _sub = {
            let (tx, rx) = std::sync::mpsc::channel();
            let sub = source.observe_update_v1(move |e| {
                let _ = tx.send(e.update.clone());
            });
            text.insert(&mut source.transact_mut(), 0, "a").unwrap();
            text.insert(&mut source.transact_mut(), 1, "b").unwrap();
            updates.extend(rx.try_iter());
            sub
        };
        assert_eq!(updates.len(), 2);

        let mut target = Doc::with_client_id(2);
        target.apply_update_v1(&updates[1]).unwrap();
        assert_eq!(target.transact().get_text("t").map(|t| t.get_string(&target.transact())), None);
        assert!(target.store().pending.is_some());
        target.apply_update_v1(&updates[0]).unwrap();
        let t = target.get_or_insert_text("t");
        assert_eq!(t.get_string(&target.transact()), "ab");
        assert!(target.store().pending.is_none());
    }

    #[test]
    fn deletes_of_unknown_ids_are_parked() {
        let mut source = Doc::with_client_id(1);
        let text = source.get_or_insert_text("t");
        text.insert(&mut source.transact_mut(), 0, "xyz").unwrap();
        let insert = source.encode_state_as_update_v1(None).unwrap();
        let sv = source.state_vector();
        text.remove_range(&mut source.transact_mut(), 1, 1).unwrap();
        let delete = source.encode_state_as_update_v1(Some(&sv.encode_v1())).unwrap();

        let mut target = Doc::with_client_id(2);
        target.apply_update_v1(&delete).unwrap();
        assert!(target.store().pending_ds.is_some());
        target.apply_update_v1(&insert).unwrap();
        let t = target.get_or_insert_text("t");
        assert_eq!(t.get_string(&target.transact()), "xz");
    }

    #[test]
    fn nested_children_wait_for_their_parent() {
        let mut a = Doc::with_client_id(1);
        let mut b = Doc::with_client_id(2);
        let root = a.get_or_insert_map("m");
        let Out::Map(inner) = root.insert(&mut a.transact_mut(), "inner", In::Map(HashMap::new())) else {
            panic!("expected a nested map");
        };
        let parent_update = a.encode_state_as_update_v1(None).unwrap();
        b.apply_update_v1(&parent_update).unwrap();

        let Some(Out::Map(inner_b)) = b.get_or_insert_map("m").get(&b.transact(), "inner") else {
            panic!("expected a nested map");
        };
        let child_update = updates_of(&mut b, |b| {
            inner_b.insert(&mut b.transact_mut(), "k", "v");
        });
        assert_eq!(child_update.len(), 1);

        let mut c = Doc::with_client_id(3);
        c.apply_update_v1(&child_update[0]).unwrap();
        assert!(c.store().pending.is_some());
        c.apply_update_v1(&parent_update).unwrap();
        assert!(c.store().pending.is_none());

        let Some(Out::Map(inner_c)) = c.get_or_insert_map("m").get(&c.transact(), "inner") else {
            panic!("expected a nested map");
        };
        assert_eq!(inner_c.get(&c.transact(), "k"), Some(Out::Any(Any::from("v"))));
        assert_eq!(inner.get(&a.transact(), "k"), None);
    }

    #[test]
    fn pending_parents_must_hold_a_type() {
        let mut source = Doc::with_client_id(1);
        let text = source.get_or_insert_text("t");
        let updates = updates_of(&mut source, |doc| {
            text.insert(&mut doc.transact_mut(), 0, "x").unwrap();
            text.insert(&mut doc.transact_mut(), 1, "y").unwrap();
        });

        let mut target = Doc::with_client_id(2);
        target.apply_update_v1(&updates[1]).unwrap();
        assert!(target.store().pending.is_some());

        // a block attached to the pending string "y"
        let block = Block {
            id: Id::new(3, 0),
            origin: None,
            right_origin: None,
            parent: ParentRef::Item(Id::new(1, 1)),
            parent_sub: None,
            payload: Payload::Any(vec![Any::from(1)]),
        };
        let mut blocks = FxHashMap::default();
        blocks.insert(3, VecDeque::from([block]));
        let update = Update { blocks, delete_set: DeleteSet::new() };
        let result = target.transact_mut().apply_update(update);
        assert_eq!(result, Err(Error::Decode(DecodeError::InvalidParent(Id::new(3, 0)))));
        assert!(target.store().pending.is_some());

        target.apply_update_v1(&updates[0]).unwrap();
        let t = target.get_or_insert_text("t");
        assert_eq!(t.get_string(&target.transact()), "xy");
    }
}
