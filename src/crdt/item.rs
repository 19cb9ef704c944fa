// created = "2026-10-17"
// modified = "2026-10-17"

//! Items: the integrated units of a document.
//!
//! Each item is a run of content created by one client with consecutive
//! clocks. Items are linked left/right into the sequence of their parent
//! branch, and remember the neighbours they were inserted between
//! (`origin` and `right_origin`) so that concurrent inserts can be ordered
//! deterministically on every replica.

use std::sync::Arc;

use crate::any::Any;
use crate::crdt::branch::BranchPtr;
use crate::crdt::primitives::id::Id;

/// Index of an item in the store arena.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ItemPtr(pub(crate) u32);

/// The payload of an item.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Content {
    /// Consecutive JSON-like values (array elements, map values).
    Any(Vec<Any>),
    /// A run of text. Length is counted in Unicode scalar values.
    String(String),
    /// A single embedded value inside text.
    Embed(Any),
    /// A formatting marker inside text. A `Null` value ends the attribute.
    Format(Arc<str>, Any),
    /// A nested shared type.
    Type(BranchPtr),
    /// Placeholder for content that was deleted before it arrived.
    Deleted(u32),
}

// Content reference numbers on the wire.
pub(crate) const CONTENT_DELETED: u8 = 1;
pub(crate) const CONTENT_STRING: u8 = 4;
pub(crate) const CONTENT_EMBED: u8 = 5;
pub(crate) const CONTENT_FORMAT: u8 = 6;
pub(crate) const CONTENT_TYPE: u8 = 7;
pub(crate) const CONTENT_ANY: u8 = 8;

impl Content {
    pub fn len(&self) -> u32 {
        return match self {
            Content::Any(values) => values.len() as u32,
            Content::String(s) => s.chars().count() as u32,
            Content::Deleted(len) => *len,
            Content::Embed(_) | Content::Format(_, _) | Content::Type(_) => 1,
        };
    }

    /// Whether the content contributes to the length of its parent.
    #[inline]
    pub fn is_countable(&self) -> bool {
        return !matches!(self, Content::Format(_, _) | Content::Deleted(_));
    }

    pub fn ref_number(&self) -> u8 {
        return match self {
            Content::Any(_) => CONTENT_ANY,
            Content::String(_) => CONTENT_STRING,
            Content::Embed(_) => CONTENT_EMBED,
            Content::Format(_, _) => CONTENT_FORMAT,
            Content::Type(_) => CONTENT_TYPE,
            Content::Deleted(_) => CONTENT_DELETED,
        };
    }

    /// Cut the content at `offset`, keeping the left part and returning the
    /// right one.
    pub fn splice(&mut self, offset: u32) -> Content {
        return match self {
            Content::Any(values) => Content::Any(values.split_off(offset as usize)),
            Content::String(s) => {
                let at = char_to_byte(s, offset);
                Content::String(s.split_off(at))
            }
            Content::Deleted(len) => {
                let right = *len - offset;
                *len = offset;
                Content::Deleted(right)
            }
            Content::Embed(_) | Content::Format(_, _) | Content::Type(_) => {
                unreachable!("content of length 1 cannot be split")
            }
        };
    }
}

/// Byte index of the `offset`-th char of `s`, or `s.len()` past the end.
pub(crate) fn char_to_byte(s: &str, offset: u32) -> usize {
    return s.char_indices().nth(offset as usize).map(|(i, _)| i).unwrap_or(s.len());
}

#[derive(Clone, Debug)]
pub(crate) struct Item {
    pub id: Id,
    pub len: u32,
    pub left: Option<ItemPtr>,
    pub right: Option<ItemPtr>,
    pub origin: Option<Id>,
    pub right_origin: Option<Id>,
    pub parent: BranchPtr,
    /// Key under which this item is stored when it is a map entry.
    pub parent_sub: Option<Arc<str>>,
    pub content: Content,
    pub deleted: bool,
    /// Set when an undo or redo recreated this item under a new id.
    pub redone: Option<Id>,
    /// Precedence of a map entry among the writes to its key: its own clock,
    /// raised above the entry it overwrote.
    pub rank: u32,
}

impl Item {
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        id: Id,
        left: Option<ItemPtr>,
        origin: Option<Id>,
        right: Option<ItemPtr>,
        right_origin: Option<Id>,
        parent: BranchPtr,
        parent_sub: Option<Arc<str>>,
        content: Content,
    ) -> Item {
        let len = content.len();
        let deleted = matches!(content, Content::Deleted(_));
        return Item {
            id,
            len,
            left,
            right,
            origin,
            right_origin,
            parent,
            parent_sub,
            content,
            deleted,
            redone: None,
            rank: id.clock,
        };
    }

    /// Id of the last unit in this run.
    #[inline]
    pub fn last_id(&self) -> Id {
        return self.id.offset(self.len - 1);
    }

    #[inline]
    pub fn is_countable(&self) -> bool {
        return self.content.is_countable();
    }

    /// Visible and counted by its parent.
    #[inline]
    pub fn is_visible(&self) -> bool {
        return !self.deleted && self.content.is_countable();
    }

    #[inline]
    pub fn contains(&self, id: &Id) -> bool {
        return self.id.client == id.client && id.clock >= self.id.clock && id.clock < self.id.clock + self.len;
    }
}
