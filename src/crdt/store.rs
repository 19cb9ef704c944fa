// created = "2026-10-17"
// modified = "2026-10-17"

//! The block store of a document.
//!
//! Items and branches live in two arenas and refer to each other by index,
//! which keeps the doubly linked sequences and the parent/child links free of
//! shared ownership. Per client, items are kept in a map keyed by their
//! first clock, so every id resolves by a range lookup. Every branch keeps
//! a position index over its sequence (see [`BTreeList`]).
//!
//! Complexity:
//! - get_item: O(log n) in the number of blocks of that client
//! - split_item: O(log n) for the block map and the branch index
//! - state_vector: O(c) in the number of clients

use std::collections::BTreeMap;
use std::ops::Range;
use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};

use rustc_hash::FxHashMap;

use crate::crdt::branch::{Branch, BranchPtr, TypeRef};
use crate::crdt::btree_list::{BTreeList, Weight};
use crate::crdt::item::{Content, Item, ItemPtr};
use crate::crdt::primitives::clock::StateVector;
use crate::crdt::primitives::id::{ClientId, Id};
use crate::crdt::primitives::id_set::DeleteSet;
use crate::doc::OffsetKind;
use crate::error::Error;
use crate::updates::update::Update;

/// Tags the branch handles of each store, so that a handle from another
/// document is never mistaken for a local one.
static NEXT_STORE_TAG: AtomicU32 = AtomicU32::new(0);

/// Everything a document knows: integrated items, shared types and the
/// updates that are still waiting for their dependencies.
#[derive(Debug)]
pub struct Store {
    pub(crate) client_id: ClientId,
    pub(crate) offset_kind: OffsetKind,
    tag: u32,
    items: Vec<Item>,
    branches: Vec<Branch>,
    blocks: FxHashMap<ClientId, BTreeMap<u32, ItemPtr>>,
    roots: FxHashMap<Arc<str>, BranchPtr>,
    /// Blocks received before their dependencies.
    pub(crate) pending: Option<Update>,
    /// Deletions of ids this store has not seen yet.
    pub(crate) pending_ds: Option<DeleteSet>,
}

impl Store {
    pub(crate) fn new(client_id: ClientId, offset_kind: OffsetKind) -> Store {
        return Store {
            client_id,
            offset_kind,
            tag: NEXT_STORE_TAG.fetch_add(1, Ordering::Relaxed),
            items: Vec::new(),
            branches: Vec::new(),
            blocks: FxHashMap::default(),
            roots: FxHashMap::default(),
            pending: None,
            pending_ds: None,
        };
    }

    pub fn client_id(&self) -> ClientId {
        return self.client_id;
    }

    // ========================================================================
    // Arenas
    // ========================================================================

    #[inline]
    pub(crate) fn item(&self, ptr: ItemPtr) -> &Item {
        return &self.items[ptr.0 as usize];
    }

    #[inline]
    pub(crate) fn item_mut(&mut self, ptr: ItemPtr) -> &mut Item {
        return &mut self.items[ptr.0 as usize];
    }

    #[inline]
    pub(crate) fn branch(&self, ptr: BranchPtr) -> &Branch {
        return &self.branches[ptr.index as usize];
    }

    #[inline]
    pub(crate) fn branch_mut(&mut self, ptr: BranchPtr) -> &mut Branch {
        return &mut self.branches[ptr.index as usize];
    }

    /// Whether `ptr` was handed out by this store.
    pub(crate) fn has_branch(&self, ptr: BranchPtr) -> bool {
        return ptr.store == self.tag && (ptr.index as usize) < self.branches.len();
    }

    /// Put an item into the arena. It is not yet linked or indexed.
    pub(crate) fn alloc_item(&mut self, item: Item) -> ItemPtr {
        let ptr = ItemPtr(self.items.len() as u32);
        self.items.push(item);
        return ptr;
    }

    /// Index an item whose clock equals the current state of its client.
    pub(crate) fn push_block(&mut self, ptr: ItemPtr) {
        let id = self.item(ptr).id;
        self.blocks.entry(id.client).or_default().insert(id.clock, ptr);
    }

    pub(crate) fn create_branch(&mut self, type_ref: TypeRef) -> BranchPtr {
        let ptr = BranchPtr { store: self.tag, index: self.branches.len() as u32 };
        self.branches.push(Branch::new(type_ref));
        return ptr;
    }

    /// Look up a root by name, creating it on first use. A root created by a
    /// remote update has an undefined type until it is requested locally.
    /// Requesting an existing root as a different type fails.
    pub(crate) fn get_or_create_root(&mut self, name: &str, type_ref: TypeRef) -> Result<BranchPtr, Error> {
        if let Some(ptr) = self.roots.get(name).copied() {
            let branch = self.branch_mut(ptr);
            if branch.type_ref == TypeRef::Undefined {
                branch.type_ref = type_ref;
            } else if type_ref != TypeRef::Undefined && branch.type_ref != type_ref {
                return Err(Error::TypeMismatch { name: Arc::from(name), existing: branch.type_ref.clone() });
            }
            return Ok(ptr);
        }
        let name: Arc<str> = Arc::from(name);
        let ptr = self.create_branch(type_ref);
        self.branch_mut(ptr).name = Some(name.clone());
        self.roots.insert(name, ptr);
        return Ok(ptr);
    }

    /// A root named by a remote update. Its type is left as it is.
    pub(crate) fn remote_root(&mut self, name: &str) -> BranchPtr {
        if let Some(ptr) = self.roots.get(name).copied() {
            return ptr;
        }
        let name: Arc<str> = Arc::from(name);
        let ptr = self.create_branch(TypeRef::Undefined);
        self.branch_mut(ptr).name = Some(name.clone());
        self.roots.insert(name, ptr);
        return ptr;
    }

    pub(crate) fn root(&self, name: &str) -> Option<BranchPtr> {
        return self.roots.get(name).copied();
    }

    /// Names of all roots, sorted.
    pub fn root_names(&self) -> Vec<Arc<str>> {
        let mut names: Vec<Arc<str>> = self.roots.keys().cloned().collect();
        names.sort();
        return names;
    }

    // ========================================================================
    // State
    // ========================================================================

    /// Next clock expected from `client`.
    pub fn get_state(&self, client: &ClientId) -> u32 {
        return self
            .blocks
            .get(client)
            .and_then(|list| list.last_key_value())
            .map(|(_, ptr)| {
                let item = self.item(*ptr);
                item.id.clock + item.len
            })
            .unwrap_or(0);
    }

    pub fn state_vector(&self) -> StateVector {
        return self.blocks.keys().map(|client| (*client, self.get_state(client))).collect();
    }

    /// Clients with at least one integrated item, ascending.
    pub(crate) fn clients(&self) -> Vec<ClientId> {
        let mut clients: Vec<ClientId> = self.blocks.keys().copied().collect();
        clients.sort_unstable();
        return clients;
    }

    /// Items of `client` from the one containing `clock` onwards, in clock
    /// order.
    pub(crate) fn blocks_from(&self, client: &ClientId, clock: u32) -> impl Iterator<Item = ItemPtr> + '_ {
        let list = self.blocks.get(client);
        let start = list.and_then(|l| l.range(..=clock).next_back()).map_or(0, |(start, _)| *start);
        return list.into_iter().flat_map(move |l| l.range(start..)).map(|(_, ptr)| *ptr);
    }

    /// Every deleted id, as ranges.
    pub fn delete_set(&self) -> DeleteSet {
        let mut ds = DeleteSet::new();
        for (client, list) in self.blocks.iter() {
            for ptr in list.values() {
                let item = self.item(*ptr);
                if item.deleted {
                    ds.insert_range(*client, item.id.clock..item.id.clock + item.len);
                }
            }
        }
        return ds;
    }

    // ========================================================================
    // Positions
    // ========================================================================

    /// Positions an item occupies in its parent, in the document's offset
    /// unit.
    pub(crate) fn units(&self, ptr: ItemPtr) -> u32 {
        let item = self.item(ptr);
        return match &item.content {
            Content::String(s) => self.offset_kind.measure(s),
            _ => item.len,
        };
    }

    /// How many units of `ptr` are needed to cover its first `units`
    /// positions. A position inside a character covers the whole character.
    pub(crate) fn units_to_len(&self, ptr: ItemPtr, units: u32) -> u32 {
        let item = self.item(ptr);
        return match &item.content {
            Content::String(s) => self.offset_kind.chars_covering(s, units),
            _ => units.min(item.len),
        };
    }

    /// Weight of a sequence item in its branch's position index.
    pub(crate) fn seq_weight(&self, ptr: ItemPtr) -> Weight {
        let item = self.item(ptr);
        if item.deleted {
            return Weight::ZERO;
        }
        return match &item.content {
            Content::Format(_, _) => Weight::mark(),
            Content::Deleted(_) => Weight::ZERO,
            _ => Weight::units(self.units(ptr)),
        };
    }

    /// Refresh the weight of `ptr` after its visibility changed.
    pub(crate) fn reweigh(&mut self, ptr: ItemPtr) {
        let parent = self.item(ptr).parent;
        let weight = self.seq_weight(ptr);
        self.branch_mut(parent).index.set_weight(&ptr, weight);
    }

    /// Add a linked sequence item to its branch's position index.
    pub(crate) fn index_item(&mut self, ptr: ItemPtr) {
        let (parent, left) = (self.item(ptr).parent, self.item(ptr).left);
        let weight = self.seq_weight(ptr);
        self.branch_mut(parent).index.insert_after(left.as_ref(), ptr, weight);
    }

    /// The item covering visible position `index` of `branch` and the
    /// offset of the position inside it.
    pub(crate) fn find_position(&self, branch: BranchPtr, index: u32) -> Option<(ItemPtr, u32)> {
        return self.branch(branch).index.find(index);
    }

    // ========================================================================
    // Lookup and splitting
    // ========================================================================

    /// The item containing `id`.
    pub(crate) fn get_item(&self, id: &Id) -> Option<ItemPtr> {
        let (_, ptr) = self.blocks.get(&id.client)?.range(..=id.clock).next_back()?;
        if self.item(*ptr).contains(id) {
            return Some(*ptr);
        }
        return None;
    }

    /// The item starting exactly at `id`, splitting if necessary.
    pub(crate) fn get_item_clean_start(&mut self, id: &Id) -> Option<ItemPtr> {
        let ptr = self.get_item(id)?;
        let start = self.item(ptr).id.clock;
        if start < id.clock {
            return Some(self.split_item(ptr, id.clock - start));
        }
        return Some(ptr);
    }

    /// The item ending exactly at `id`, splitting if necessary.
    pub(crate) fn get_item_clean_end(&mut self, id: &Id) -> Option<ItemPtr> {
        let ptr = self.get_item(id)?;
        let (start, len) = (self.item(ptr).id.clock, self.item(ptr).len);
        if id.clock != start + len - 1 {
            self.split_item(ptr, id.clock - start + 1);
        }
        return Some(ptr);
    }

    /// Split `ptr` after `diff` units. The left part keeps its pointer; the
    /// right part is returned.
    pub(crate) fn split_item(&mut self, ptr: ItemPtr, diff: u32) -> ItemPtr {
        let right_item = {
            let item = self.item_mut(ptr);
            debug_assert!(diff > 0 && diff < item.len);
            let content = item.content.splice(diff);
            let right = Item {
                id: item.id.offset(diff),
                len: item.len - diff,
                left: Some(ptr),
                right: item.right,
                origin: Some(item.id.offset(diff - 1)),
                right_origin: item.right_origin,
                parent: item.parent,
                parent_sub: item.parent_sub.clone(),
                content,
                deleted: item.deleted,
                redone: item.redone.map(|id| id.offset(diff)),
                rank: item.rank,
            };
            item.len = diff;
            right
        };
        let id = right_item.id;
        let old_right = right_item.right;
        let parent = right_item.parent;
        let parent_sub = right_item.parent_sub.clone();

        let right_ptr = self.alloc_item(right_item);
        self.item_mut(ptr).right = Some(right_ptr);
        if let Some(r) = old_right {
            self.item_mut(r).left = Some(right_ptr);
        }
        match parent_sub {
            Some(key) => {
                let map = &mut self.branch_mut(parent).map;
                if map.get(&key) == Some(&ptr) {
                    map.insert(key, right_ptr);
                }
            }
            None => {
                if self.branch(parent).index.contains(&ptr) {
                    let (left_weight, right_weight) = (self.seq_weight(ptr), self.seq_weight(right_ptr));
                    let index = &mut self.branch_mut(parent).index;
                    index.set_weight(&ptr, left_weight);
                    index.insert_after(Some(&ptr), right_ptr, right_weight);
                }
            }
        }
        self.blocks.entry(id.client).or_default().insert(id.clock, right_ptr);
        return right_ptr;
    }

    /// Items covering `range` of `client`, split so that they start and end
    /// exactly on the range bounds. Clocks past the current state are
    /// ignored.
    pub(crate) fn items_in_range(&mut self, client: &ClientId, range: Range<u32>) -> Vec<ItemPtr> {
        let end = range.end.min(self.get_state(client));
        if range.start >= end || self.get_item_clean_start(&Id::new(*client, range.start)).is_none() {
            return Vec::new();
        }
        let covered: Vec<ItemPtr> = match self.blocks.get(client) {
            Some(list) => list.range(range.start..end).map(|(_, ptr)| *ptr).collect(),
            None => Vec::new(),
        };
        for ptr in covered.iter() {
            let (start, len) = (self.item(*ptr).id.clock, self.item(*ptr).len);
            if start + len > end {
                self.split_item(*ptr, end - start);
            }
        }
        return covered;
    }

    // ========================================================================
    // Tree navigation
    // ========================================================================

    /// The branch that contains `branch`, `None` for roots.
    pub(crate) fn parent_branch(&self, branch: BranchPtr) -> Option<BranchPtr> {
        let item = self.branch(branch).item?;
        return Some(self.item(item).parent);
    }

    /// Whether `ptr` lives somewhere below `parent`.
    pub(crate) fn is_parent_of(&self, parent: BranchPtr, ptr: ItemPtr) -> bool {
        let mut current = self.item(ptr).parent;
        loop {
            if current == parent {
                return true;
            }
            match self.parent_branch(current) {
                Some(next) => current = next,
                None => return false,
            }
        }
    }

    /// Whether the branch or any of its ancestors has been deleted.
    pub(crate) fn is_branch_deleted(&self, branch: BranchPtr) -> bool {
        return self.branch(branch).item.is_some_and(|ptr| self.item(ptr).deleted);
    }

    /// Follow the chain of `redone` links from `id`. Returns the final item
    /// and the offset of the id within it.
    pub(crate) fn follow_redone(&self, id: &Id) -> Option<(ItemPtr, u32)> {
        let mut next = *id;
        loop {
            let ptr = self.get_item(&next)?;
            let item = self.item(ptr);
            let diff = next.clock - item.id.clock;
            match item.redone {
                Some(redone) => next = redone.offset(diff),
                None => return Some((ptr, diff)),
            }
        }
    }

    /// The branch nested in an item, when the item holds a shared type.
    pub(crate) fn nested_branch(&self, ptr: ItemPtr) -> Option<BranchPtr> {
        return match &self.item(ptr).content {
            Content::Type(branch) => Some(*branch),
            _ => None,
        };
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn push_text(store: &mut Store, parent: BranchPtr, client: ClientId, text: &str) -> ItemPtr {
        let clock = store.get_state(&client);
        let item = Item::new(
            Id::new(client, clock),
            None,
            None,
            None,
            None,
            parent,
            None,
            Content::String(text.to_string()),
        );
        let ptr = store.alloc_item(item);
        store.push_block(ptr);
        return ptr;
    }

    #[test]
    fn state_follows_block_ends() {
        let mut store = Store::new(1, OffsetKind::Chars);
        let root = store.get_or_create_root("text", TypeRef::Text).unwrap();
        push_text(&mut store, root, 1, "abc");
        push_text(&mut store, root, 1, "de");
        assert_eq!(store.get_state(&1), 5);
        assert_eq!(store.state_vector().get(&1), 5);
        assert_eq!(store.get_state(&2), 0);
    }

    #[test]
    fn split_keeps_ids_resolvable() {
        let mut store = Store::new(1, OffsetKind::Chars);
        let root = store.get_or_create_root("text", TypeRef::Text).unwrap();
        let ptr = push_text(&mut store, root, 1, "hello");
        let right = store.get_item_clean_start(&Id::new(1, 2)).unwrap();
        assert_ne!(ptr, right);
        assert_eq!(store.item(ptr).content, Content::String("he".to_string()));
        assert_eq!(store.item(right).content, Content::String("llo".to_string()));
        assert_eq!(store.item(right).origin, Some(Id::new(1, 1)));
        assert_eq!(store.get_item(&Id::new(1, 4)), Some(right));
        assert_eq!(store.get_item(&Id::new(1, 0)), Some(ptr));
        assert_eq!(store.item(ptr).right, Some(right));
    }

    #[test]
    fn clean_end_splits_after_id() {
        let mut store = Store::new(1, OffsetKind::Chars);
        let root = store.get_or_create_root("text", TypeRef::Text).unwrap();
        let ptr = push_text(&mut store, root, 1, "hello");
        let left = store.get_item_clean_end(&Id::new(1, 0)).unwrap();
        assert_eq!(left, ptr);
        assert_eq!(store.item(left).len, 1);
    }

    #[test]
    fn range_is_split_at_both_ends() {
        let mut store = Store::new(1, OffsetKind::Chars);
        let root = store.get_or_create_root("text", TypeRef::Text).unwrap();
        push_text(&mut store, root, 1, "hello");
        let items = store.items_in_range(&1, 1..3);
        assert_eq!(items.len(), 1);
        assert_eq!(store.item(items[0]).content, Content::String("el".to_string()));
        assert_eq!(store.blocks_from(&1, 0).count(), 3);
        assert_eq!(store.blocks_from(&1, 2).count(), 2);
    }

    #[test]
    fn roots_upgrade_from_undefined() {
        let mut store = Store::new(1, OffsetKind::Chars);
        let a = store.remote_root("x");
        let b = store.get_or_create_root("x", TypeRef::Map).unwrap();
        assert_eq!(a, b);
        assert_eq!(store.branch(a).type_ref, TypeRef::Map);
        assert_eq!(store.root_names(), vec![Arc::<str>::from("x")]);
    }

    #[test]
    fn roots_keep_their_type() {
        let mut store = Store::new(1, OffsetKind::Chars);
        store.get_or_create_root("x", TypeRef::Map).unwrap();
        assert_eq!(
            store.get_or_create_root("x", TypeRef::Text),
            Err(Error::TypeMismatch { name: Arc::from("x"), existing: TypeRef::Map })
        );
        let x = store.remote_root("x");
        assert_eq!(store.branch(x).type_ref, TypeRef::Map);
    }

    #[test]
    fn branches_of_other_stores_are_foreign() {
        let mut a = Store::new(1, OffsetKind::Chars);
        let mut b = Store::new(2, OffsetKind::Chars);
        let ra = a.get_or_create_root("t", TypeRef::Text).unwrap();
        let rb = b.get_or_create_root("t", TypeRef::Text).unwrap();
        assert!(a.has_branch(ra));
        assert!(!a.has_branch(rb));
        assert!(!b.has_branch(ra));
    }

    #[test]
    fn split_updates_the_position_index() {
        let mut store = Store::new(1, OffsetKind::Utf16);
        let root = store.get_or_create_root("text", TypeRef::Text).unwrap();
        let ptr = push_text(&mut store, root, 1, "a😀bc");
        store.index_item(ptr);
        assert_eq!(store.branch(root).len(), 5);
        assert_eq!(store.find_position(root, 2), Some((ptr, 2)));

        let right = store.split_item(ptr, 2);
        assert_eq!(store.units(ptr), 3);
        assert_eq!(store.find_position(root, 2), Some((ptr, 2)));
        assert_eq!(store.find_position(root, 3), Some((right, 0)));
        assert_eq!(store.units_to_len(ptr, 2), 2);
        assert_eq!(store.units_to_len(ptr, 1), 1);
        assert_eq!(store.branch(root).len(), 5);
    }
}
