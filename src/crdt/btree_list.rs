// created = "2026-10-17"
// modified = "2026-10-17"

//! B-tree Weighted List
//!
//! The position index of a branch: its sequence items in document order,
//! each weighted by the positions it occupies and by whether it is a live
//! format marker. Subtree weights make positional lookups logarithmic
//! instead of a walk over the linked list.
//!
//! Structure:
//! - Leaf nodes store up to LEAF_SIZE entries with their weights
//! - Internal nodes store up to NODE_SIZE children with subtree weights
//! - All nodes are stored in Vecs (no raw pointers)
//! - A side table maps every entry to its leaf
//!
//! Entries are never removed: deleted items stay in the index with a zero
//! weight, exactly as they stay in the linked sequence.
//!
//! Operations:
//! - insert_after: O(log n) amortized - may trigger splits
//! - set_weight: O(log n) - update the leaf and its ancestors
//! - find: O(log n) - descend by cumulative weight
//! - marks_before: O(log n + m) for m live markers before the entry

use std::hash::Hash;
use std::ops::{Add, AddAssign, Sub, SubAssign};

use rustc_hash::FxHashMap;

const LEAF_SIZE: usize = 64;
const NODE_SIZE: usize = 32;

/// Index into the leaf array.
type LeafIdx = u32;
/// Index into the node array.
type NodeIdx = u32;
/// Sentinel value for no parent.
const NONE: u32 = u32::MAX;

// ============================================================================
// Weights
// ============================================================================

/// What one entry contributes to the totals of its subtree.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub(crate) struct Weight {
    /// Positions occupied, in the unit its parent counts.
    pub units: u32,
    /// 1 for a live format marker.
    pub marks: u32,
}

impl Weight {
    pub const ZERO: Weight = Weight { units: 0, marks: 0 };

    pub fn units(units: u32) -> Weight {
        return Weight { units, marks: 0 };
    }

    pub fn mark() -> Weight {
        return Weight { units: 0, marks: 1 };
    }
}

impl Add for Weight {
    type Output = Weight;

    fn add(self, other: Weight) -> Weight {
        return Weight { units: self.units + other.units, marks: self.marks + other.marks };
    }
}

impl Sub for Weight {
    type Output = Weight;

    fn sub(self, other: Weight) -> Weight {
        return Weight { units: self.units - other.units, marks: self.marks - other.marks };
    }
}

impl AddAssign for Weight {
    fn add_assign(&mut self, other: Weight) {
        *self = *self + other;
    }
}

impl SubAssign for Weight {
    fn sub_assign(&mut self, other: Weight) {
        *self = *self - other;
    }
}

// ============================================================================
// Nodes
// ============================================================================

#[derive(Clone, Debug)]
struct Leaf<T> {
    entries: Vec<(T, Weight)>,
    total: Weight,
    /// Parent node index (NONE for root leaf).
    parent: NodeIdx,
    /// Index of this leaf in the parent's children array.
    index_in_parent: u8,
}

impl<T> Leaf<T> {
    fn new() -> Leaf<T> {
        return Leaf { entries: Vec::with_capacity(LEAF_SIZE), total: Weight::ZERO, parent: NONE, index_in_parent: 0 };
    }

    #[inline(always)]
    fn is_full(&self) -> bool {
        return self.entries.len() >= LEAF_SIZE;
    }

    /// Split this leaf, returning the right half.
    fn split(&mut self) -> Leaf<T> {
        let mid = self.entries.len() / 2;
        let entries: Vec<(T, Weight)> = self.entries.drain(mid..).collect();
        let mut total = Weight::ZERO;
        for (_, weight) in entries.iter() {
            total += *weight;
        }
        self.total -= total;
        return Leaf { entries, total, parent: NONE, index_in_parent: 0 };
    }
}

/// An internal node containing child indices and subtree weights.
#[derive(Clone, Debug)]
struct Node {
    /// For height > 1, these are NodeIdx into nodes array.
    /// For height == 1, these are LeafIdx into leaves array.
    children: Vec<u32>,
    child_weights: Vec<Weight>,
    total: Weight,
    parent: NodeIdx,
    index_in_parent: u8,
}

impl Node {
    fn new() -> Node {
        return Node {
            children: Vec::with_capacity(NODE_SIZE),
            child_weights: Vec::with_capacity(NODE_SIZE),
            total: Weight::ZERO,
            parent: NONE,
            index_in_parent: 0,
        };
    }

    #[inline(always)]
    fn is_full(&self) -> bool {
        return self.children.len() >= NODE_SIZE;
    }

    /// The child covering unit `pos`, and the offset inside it.
    #[inline]
    fn find_child(&self, pos: u32) -> Option<(usize, u32)> {
        let mut cumulative = 0u32;
        for (i, weight) in self.child_weights.iter().enumerate() {
            let next = cumulative + weight.units;
            if next > pos {
                return Some((i, pos - cumulative));
            }
            cumulative = next;
        }
        return None;
    }

    /// Split this node, returning the right half.
    fn split(&mut self) -> Node {
        let mid = self.children.len() / 2;
        let children: Vec<u32> = self.children.drain(mid..).collect();
        let child_weights: Vec<Weight> = self.child_weights.drain(mid..).collect();
        let mut total = Weight::ZERO;
        for weight in child_weights.iter() {
            total += *weight;
        }
        self.total -= total;
        return Node { children, child_weights, total, parent: NONE, index_in_parent: 0 };
    }
}

// ============================================================================
// List
// ============================================================================

/// A weighted list implemented as a B-tree, addressable by entry.
#[derive(Clone, Debug)]
pub(crate) struct BTreeList<T> {
    leaves: Vec<Leaf<T>>,
    nodes: Vec<Node>,
    /// Root index. If height == 0, this is a LeafIdx. Otherwise NodeIdx.
    root: u32,
    /// Tree height. 0 means root is a leaf.
    height: usize,
    total: Weight,
    /// Leaf holding each entry.
    locate: FxHashMap<T, LeafIdx>,
}

impl<T: Copy + Eq + Hash> BTreeList<T> {
    pub fn new() -> BTreeList<T> {
        return BTreeList {
            leaves: vec![Leaf::new()],
            nodes: Vec::new(),
            root: 0,
            height: 0,
            total: Weight::ZERO,
            locate: FxHashMap::default(),
        };
    }

    #[inline(always)]
    pub fn total(&self) -> Weight {
        return self.total;
    }

    #[inline(always)]
    pub fn len(&self) -> usize {
        return self.locate.len();
    }

    #[inline(always)]
    pub fn contains(&self, entry: &T) -> bool {
        return self.locate.contains_key(entry);
    }

    pub fn weight_of(&self, entry: &T) -> Option<Weight> {
        let (leaf, slot) = self.slot(entry)?;
        return Some(self.leaves[leaf as usize].entries[slot].1);
    }

    /// Leaf and position inside it.
    fn slot(&self, entry: &T) -> Option<(LeafIdx, usize)> {
        let leaf = *self.locate.get(entry)?;
        let slot = self.leaves[leaf as usize].entries.iter().position(|(e, _)| e == entry)?;
        return Some((leaf, slot));
    }

    fn first_leaf(&self) -> LeafIdx {
        let mut idx = self.root;
        let mut height = self.height;
        while height > 0 {
            idx = self.nodes[idx as usize].children[0];
            height -= 1;
        }
        return idx;
    }

    fn alloc_leaf(&mut self, leaf: Leaf<T>) -> LeafIdx {
        let idx = self.leaves.len() as LeafIdx;
        self.leaves.push(leaf);
        return idx;
    }

    fn alloc_node(&mut self, node: Node) -> NodeIdx {
        let idx = self.nodes.len() as NodeIdx;
        self.nodes.push(node);
        return idx;
    }

    /// Insert `entry` directly after `anchor`, or at the front when there is
    /// no anchor. An unknown anchor also inserts at the front.
    pub fn insert_after(&mut self, anchor: Option<&T>, entry: T, weight: Weight) {
        let (leaf_idx, slot) = match anchor.and_then(|a| self.slot(a)) {
            Some((leaf, slot)) => (leaf, slot + 1),
            None => (self.first_leaf(), 0),
        };
        let leaf = &mut self.leaves[leaf_idx as usize];
        leaf.entries.insert(slot, (entry, weight));
        leaf.total += weight;
        self.total += weight;
        self.locate.insert(entry, leaf_idx);
        self.update_ancestors(leaf_idx, Weight::ZERO, weight);

        if self.leaves[leaf_idx as usize].is_full() {
            self.split_leaf(leaf_idx);
        }
    }

    /// Replace the weight of `entry`. Returns the old weight.
    pub fn set_weight(&mut self, entry: &T, weight: Weight) -> Option<Weight> {
        let (leaf_idx, slot) = self.slot(entry)?;
        let leaf = &mut self.leaves[leaf_idx as usize];
        let old = leaf.entries[slot].1;
        if old == weight {
            return Some(old);
        }
        leaf.entries[slot].1 = weight;
        leaf.total = leaf.total - old + weight;
        self.total = self.total - old + weight;
        self.update_ancestors(leaf_idx, old, weight);
        return Some(old);
    }

    fn update_ancestors(&mut self, leaf_idx: LeafIdx, old: Weight, new: Weight) {
        let leaf = &self.leaves[leaf_idx as usize];
        let mut parent = leaf.parent;
        let mut child_index = leaf.index_in_parent as usize;
        while parent != NONE {
            let node = &mut self.nodes[parent as usize];
            node.child_weights[child_index] = node.child_weights[child_index] - old + new;
            node.total = node.total - old + new;
            child_index = node.index_in_parent as usize;
            parent = node.parent;
        }
    }

    /// The entry covering unit `pos`, and the offset of `pos` inside it.
    pub fn find(&self, pos: u32) -> Option<(T, u32)> {
        if pos >= self.total.units {
            return None;
        }
        let mut idx = self.root;
        let mut offset = pos;
        let mut height = self.height;
        while height > 0 {
            let node = &self.nodes[idx as usize];
            let (child, inner) = node.find_child(offset)?;
            idx = node.children[child];
            offset = inner;
            height -= 1;
        }
        let mut cumulative = 0u32;
        for (entry, weight) in self.leaves[idx as usize].entries.iter() {
            let next = cumulative + weight.units;
            if next > offset {
                return Some((*entry, offset - cumulative));
            }
            cumulative = next;
        }
        return None;
    }

    /// Entries with a mark weight that come before `entry`, nearest first.
    pub fn marks_before(&self, entry: &T) -> Vec<T> {
        let mut out = Vec::new();
        let Some((leaf_idx, slot)) = self.slot(entry) else {
            return out;
        };
        let leaf = &self.leaves[leaf_idx as usize];
        for (e, weight) in leaf.entries[..slot].iter().rev() {
            if weight.marks > 0 {
                out.push(*e);
            }
        }
        let mut parent = leaf.parent;
        let mut child_index = leaf.index_in_parent as usize;
        let mut height = 1;
        while parent != NONE {
            let node = &self.nodes[parent as usize];
            for i in (0..child_index).rev() {
                if node.child_weights[i].marks > 0 {
                    self.collect_marks(node.children[i], height - 1, &mut out);
                }
            }
            child_index = node.index_in_parent as usize;
            parent = node.parent;
            height += 1;
        }
        return out;
    }

    /// Marks of a subtree, last first.
    fn collect_marks(&self, idx: u32, height: usize, out: &mut Vec<T>) {
        if height == 0 {
            for (e, weight) in self.leaves[idx as usize].entries.iter().rev() {
                if weight.marks > 0 {
                    out.push(*e);
                }
            }
            return;
        }
        let node = &self.nodes[idx as usize];
        for i in (0..node.children.len()).rev() {
            if node.child_weights[i].marks > 0 {
                self.collect_marks(node.children[i], height - 1, out);
            }
        }
    }

    /// Split a full leaf.
    fn split_leaf(&mut self, leaf_idx: LeafIdx) {
        let right = self.leaves[leaf_idx as usize].split();
        let right_weight = right.total;
        let right_idx = self.alloc_leaf(right);
        for (entry, _) in self.leaves[right_idx as usize].entries.iter() {
            self.locate.insert(*entry, right_idx);
        }

        if self.height == 0 {
            let left_weight = self.leaves[leaf_idx as usize].total;
            let mut root = Node::new();
            root.children.extend([leaf_idx, right_idx]);
            root.child_weights.extend([left_weight, right_weight]);
            root.total = left_weight + right_weight;
            let new_root = self.alloc_node(root);

            self.leaves[leaf_idx as usize].parent = new_root;
            self.leaves[leaf_idx as usize].index_in_parent = 0;
            self.leaves[right_idx as usize].parent = new_root;
            self.leaves[right_idx as usize].index_in_parent = 1;
            self.root = new_root;
            self.height = 1;
            return;
        }

        let parent = self.leaves[leaf_idx as usize].parent;
        let idx_in_parent = self.leaves[leaf_idx as usize].index_in_parent as usize;
        let left_weight = self.leaves[leaf_idx as usize].total;
        {
            let node = &mut self.nodes[parent as usize];
            node.child_weights[idx_in_parent] = left_weight;
            node.children.insert(idx_in_parent + 1, right_idx);
            node.child_weights.insert(idx_in_parent + 1, right_weight);
        }
        for i in (idx_in_parent + 1)..self.nodes[parent as usize].children.len() {
            let child = self.nodes[parent as usize].children[i];
            self.leaves[child as usize].parent = parent;
            self.leaves[child as usize].index_in_parent = i as u8;
        }
        if self.nodes[parent as usize].is_full() {
            self.split_node(parent, 1);
        }
    }

    /// Split a full internal node at the given height.
    fn split_node(&mut self, node_idx: NodeIdx, height: usize) {
        let right = self.nodes[node_idx as usize].split();
        let right_weight = right.total;
        let right_idx = self.alloc_node(right);

        let right_children: Vec<u32> = self.nodes[right_idx as usize].children.clone();
        for (i, child) in right_children.iter().enumerate() {
            if height == 1 {
                self.leaves[*child as usize].parent = right_idx;
                self.leaves[*child as usize].index_in_parent = i as u8;
            } else {
                self.nodes[*child as usize].parent = right_idx;
                self.nodes[*child as usize].index_in_parent = i as u8;
            }
        }

        let left_weight = self.nodes[node_idx as usize].total;
        if self.nodes[node_idx as usize].parent == NONE {
            let mut root = Node::new();
            root.children.extend([node_idx, right_idx]);
            root.child_weights.extend([left_weight, right_weight]);
            root.total = left_weight + right_weight;
            let new_root = self.alloc_node(root);

            self.nodes[node_idx as usize].parent = new_root;
            self.nodes[node_idx as usize].index_in_parent = 0;
            self.nodes[right_idx as usize].parent = new_root;
            self.nodes[right_idx as usize].index_in_parent = 1;
            self.root = new_root;
            self.height += 1;
            return;
        }

        let parent = self.nodes[node_idx as usize].parent;
        let idx_in_parent = self.nodes[node_idx as usize].index_in_parent as usize;
        {
            let node = &mut self.nodes[parent as usize];
            node.child_weights[idx_in_parent] = left_weight;
            node.children.insert(idx_in_parent + 1, right_idx);
            node.child_weights.insert(idx_in_parent + 1, right_weight);
        }
        for i in (idx_in_parent + 1)..self.nodes[parent as usize].children.len() {
            let child = self.nodes[parent as usize].children[i];
            self.nodes[child as usize].parent = parent;
            self.nodes[child as usize].index_in_parent = i as u8;
        }
        if self.nodes[parent as usize].is_full() {
            self.split_node(parent, height + 1);
        }
    }

    /// Entries in order.
    pub fn iter(&self) -> impl Iterator<Item = T> + '_ {
        let mut order = Vec::new();
        self.collect_leaves(self.root, self.height, &mut order);
        return order.into_iter().flat_map(move |leaf| self.leaves[leaf as usize].entries.iter().map(|(e, _)| *e));
    }

    fn collect_leaves(&self, idx: u32, height: usize, out: &mut Vec<LeafIdx>) {
        if height == 0 {
            out.push(idx);
            return;
        }
        for child in self.nodes[idx as usize].children.iter() {
            self.collect_leaves(*child, height - 1, out);
        }
    }
}

impl<T: Copy + Eq + Hash> Default for BTreeList<T> {
    fn default() -> Self {
        return Self::new();
    }
}
