// created = "2026-10-17"
// modified = "2026-10-17"

//! Shared types.
//!
//! Every shared type is a lightweight, copyable handle to a branch of the
//! document. Reads take any [`ReadTxn`]; writes take a [`TransactionMut`].
//! Values go in as [`In`] (plain values or preliminary nested types) and
//! come out as [`Out`] (plain values or handles to nested types).

pub mod array;
pub mod map;
pub mod text;
pub mod xml;

use std::collections::HashMap;
use std::sync::Arc;

use crate::any::Any;
use crate::crdt::branch::{BranchPtr, TypeRef};
use crate::crdt::item::{Content, ItemPtr};
use crate::crdt::store::Store;
use crate::error::Error;
use crate::transaction::{ReadTxn, TransactionMut};

use self::array::ArrayRef;
use self::map::MapRef;
use self::text::{TextPrelim, TextRef};
use self::xml::{XmlElementPrelim, XmlElementRef, XmlFragmentRef, XmlIn, XmlTextPrelim, XmlTextRef};

/// A handle to a shared type.
pub trait SharedRef {
    fn branch_ptr(&self) -> BranchPtr;

    /// The kind of the shared type behind this handle.
    fn type_ref<T: ReadTxn>(&self, txn: &T) -> TypeRef {
        return txn.store().branch(self.branch_ptr()).type_ref.clone();
    }
}

// ============================================================================
// Values in and out
// ============================================================================

/// A value to insert: either a plain value or the initial contents of a new
/// nested shared type.
#[derive(Debug, Clone, PartialEq)]
pub enum In {
    Any(Any),
    Text(TextPrelim),
    Array(Vec<In>),
    Map(HashMap<String, In>),
    XmlElement(XmlElementPrelim),
    XmlFragment(Vec<XmlIn>),
    XmlText(XmlTextPrelim),
}

impl<T: Into<Any>> From<T> for In {
    fn from(value: T) -> In {
        return In::Any(value.into());
    }
}

impl From<TextPrelim> for In {
    fn from(value: TextPrelim) -> In {
        return In::Text(value);
    }
}

impl From<XmlElementPrelim> for In {
    fn from(value: XmlElementPrelim) -> In {
        return In::XmlElement(value);
    }
}

impl From<XmlTextPrelim> for In {
    fn from(value: XmlTextPrelim) -> In {
        return In::XmlText(value);
    }
}

impl From<XmlIn> for In {
    fn from(value: XmlIn) -> In {
        return match value {
            XmlIn::Element(element) => In::XmlElement(element),
            XmlIn::Text(text) => In::XmlText(text),
        };
    }
}

impl In {
    fn type_ref(&self) -> Option<TypeRef> {
        return match self {
            In::Any(_) => None,
            In::Text(_) => Some(TypeRef::Text),
            In::Array(_) => Some(TypeRef::Array),
            In::Map(_) => Some(TypeRef::Map),
            In::XmlElement(element) => Some(TypeRef::XmlElement(element.tag.clone())),
            In::XmlFragment(_) => Some(TypeRef::XmlFragment),
            In::XmlText(_) => Some(TypeRef::XmlText),
        };
    }

    /// Fill a freshly created branch with the preliminary contents.
    fn integrate(self, txn: &mut TransactionMut<'_>, branch: BranchPtr) {
        match self {
            In::Any(_) => {}
            In::Text(prelim) => prelim.integrate(txn, branch),
            In::XmlText(prelim) => prelim.integrate(txn, branch),
            In::Array(values) => {
                let mut left = None;
                for value in values {
                    left = Some(insert_value(txn, branch, left, None, None, value));
                }
            }
            In::Map(entries) => {
                let mut entries: Vec<(String, In)> = entries.into_iter().collect();
                entries.sort_by(|a, b| a.0.cmp(&b.0));
                for (key, value) in entries {
                    map_insert(txn, branch, Arc::from(key), value);
                }
            }
            In::XmlElement(prelim) => prelim.integrate(txn, branch),
            In::XmlFragment(children) => {
                let mut left = None;
                for child in children {
                    left = Some(insert_value(txn, branch, left, None, None, child.into()));
                }
            }
        }
    }
}

/// A value read from a shared type.
#[derive(Debug, Clone, PartialEq)]
pub enum Out {
    Any(Any),
    Text(TextRef),
    Array(ArrayRef),
    Map(MapRef),
    XmlElement(XmlElementRef),
    XmlFragment(XmlFragmentRef),
    XmlText(XmlTextRef),
    /// A root seen only through remote updates.
    UndefinedRef(BranchPtr),
}

impl Out {
    pub(crate) fn from_branch(store: &Store, branch: BranchPtr) -> Out {
        return match store.branch(branch).type_ref {
            TypeRef::Array => Out::Array(ArrayRef::from_branch(branch)),
            TypeRef::Map => Out::Map(MapRef::from_branch(branch)),
            TypeRef::Text => Out::Text(TextRef::from_branch(branch)),
            TypeRef::XmlElement(_) => Out::XmlElement(XmlElementRef::from_branch(branch)),
            TypeRef::XmlFragment => Out::XmlFragment(XmlFragmentRef::from_branch(branch)),
            TypeRef::XmlText => Out::XmlText(XmlTextRef::from_branch(branch)),
            TypeRef::Undefined => Out::UndefinedRef(branch),
        };
    }

    /// The plain value, if this is not a shared type.
    pub fn as_any(&self) -> Option<&Any> {
        return match self {
            Out::Any(value) => Some(value),
            _ => None,
        };
    }

    /// Render as a JSON-like value. Text and XML become strings.
    pub fn to_json<T: ReadTxn>(&self, txn: &T) -> Any {
        return match self {
            Out::Any(value) => value.clone(),
            Out::Text(text) => Any::from(text::Text::get_string(text, txn)),
            Out::Array(array) => array.to_json(txn),
            Out::Map(map) => map.to_json(txn),
            Out::XmlElement(element) => Any::from(element.get_string(txn)),
            Out::XmlFragment(fragment) => Any::from(fragment.get_string(txn)),
            Out::XmlText(text) => Any::from(text.get_string(txn)),
            Out::UndefinedRef(_) => Any::Undefined,
        };
    }

    /// A preliminary deep copy, suitable for inserting elsewhere.
    pub(crate) fn to_prelim(&self, store: &Store) -> In {
        return match self {
            Out::Any(value) => In::Any(value.clone()),
            Out::Text(text) => In::Text(TextPrelim::from_branch(store, text.branch_ptr())),
            Out::XmlText(text) => In::XmlText(XmlTextPrelim::from_branch(store, text.branch_ptr())),
            Out::Array(array) => In::Array(
                list_values(store, array.branch_ptr()).iter().map(|v| v.to_prelim(store)).collect(),
            ),
            Out::Map(map) => In::Map(
                map_entries(store, map.branch_ptr())
                    .into_iter()
                    .map(|(k, v)| (k.to_string(), v.to_prelim(store)))
                    .collect(),
            ),
            Out::XmlElement(element) => In::XmlElement(XmlElementPrelim::from_branch(store, element.branch_ptr())),
            Out::XmlFragment(fragment) => In::XmlFragment(
                list_values(store, fragment.branch_ptr())
                    .iter()
                    .filter_map(|v| match v.to_prelim(store) {
                        In::XmlElement(e) => Some(XmlIn::Element(e)),
                        In::XmlText(t) => Some(XmlIn::Text(t)),
                        _ => None,
                    })
                    .collect(),
            ),
            Out::UndefinedRef(_) => In::Any(Any::Undefined),
        };
    }
}

// ============================================================================
// Indexing
// ============================================================================

/// Resolve a possibly negative insertion index against `len`. Negative
/// indices count from the end.
pub(crate) fn normalize_index(index: i64, len: u32) -> Result<u32, Error> {
    let resolved = if index < 0 { len as i64 + index } else { index };
    if resolved < 0 || resolved > len as i64 {
        return Err(Error::OutOfBounds { index, len });
    }
    return Ok(resolved as u32);
}

/// Resolve a range `[index, index + count)` against `len`.
pub(crate) fn normalize_range(index: i64, count: u32, len: u32) -> Result<u32, Error> {
    let start = normalize_index(index, len)?;
    if start as u64 + count as u64 > len as u64 {
        return Err(Error::OutOfBounds { index: start as i64 + count as i64, len });
    }
    return Ok(start);
}

// ============================================================================
// Sequence helpers
// ============================================================================

/// The visible item that ends exactly at `index`, splitting if needed.
/// `None` means the insertion point is the start of the sequence.
pub(crate) fn split_at_index(txn: &mut TransactionMut<'_>, branch: BranchPtr, index: u32) -> Option<ItemPtr> {
    if index == 0 {
        return None;
    }
    let (ptr, offset) = txn.store.find_position(branch, index - 1)?;
    let len = txn.store.units_to_len(ptr, offset + 1);
    if len < txn.store.item(ptr).len {
        txn.store.split_item(ptr, len);
    }
    return Some(ptr);
}

/// Insert `value` between `left` and `right` and return the new item.
pub(crate) fn insert_value(
    txn: &mut TransactionMut<'_>,
    branch: BranchPtr,
    left: Option<ItemPtr>,
    right: Option<ItemPtr>,
    parent_sub: Option<Arc<str>>,
    value: In,
) -> ItemPtr {
    let right = match (left, right) {
        (_, Some(r)) => Some(r),
        (Some(l), None) if parent_sub.is_none() => txn.store.item(l).right,
        (None, None) if parent_sub.is_none() => txn.store.branch(branch).start,
        _ => None,
    };
    match value.type_ref() {
        None => {
            let In::Any(any) = value else {
                unreachable!("plain values have no type reference");
            };
            return txn.create_item(branch, left, right, parent_sub, Content::Any(vec![any]));
        }
        Some(type_ref) => {
            let nested = txn.store.create_branch(type_ref);
            let ptr = txn.create_item(branch, left, right, parent_sub, Content::Type(nested));
            value.integrate(txn, nested);
            return ptr;
        }
    }
}

/// Insert at a visible index of a sequence.
pub(crate) fn insert_at(txn: &mut TransactionMut<'_>, branch: BranchPtr, index: u32, value: In) -> ItemPtr {
    let left = split_at_index(txn, branch, index);
    return insert_value(txn, branch, left, None, None, value);
}

/// Write `value` under `key`.
pub(crate) fn map_insert(txn: &mut TransactionMut<'_>, branch: BranchPtr, key: Arc<str>, value: In) -> ItemPtr {
    let left = txn.store.branch(branch).map.get(&key).copied();
    return insert_value(txn, branch, left, None, Some(key), value);
}

/// Delete `count` visible units starting at `index`.
pub(crate) fn remove_range(txn: &mut TransactionMut<'_>, branch: BranchPtr, index: u32, count: u32) {
    let left = split_at_index(txn, branch, index);
    let mut current = match left {
        Some(l) => txn.store.item(l).right,
        None => txn.store.branch(branch).start,
    };
    let mut remaining = count;
    while remaining > 0 {
        let Some(ptr) = current else {
            break;
        };
        if txn.store.item(ptr).is_visible() {
            let len = txn.store.units_to_len(ptr, remaining);
            if len < txn.store.item(ptr).len {
                txn.store.split_item(ptr, len);
            }
            remaining = remaining.saturating_sub(txn.store.units(ptr));
            txn.delete_item(ptr);
        }
        current = txn.store.item(ptr).right;
    }
}

/// Move the element at `source` in front of the element currently at
/// `target`. The element is re-created at its new position and nested types
/// are copied.
pub(crate) fn move_to(txn: &mut TransactionMut<'_>, branch: BranchPtr, source: u32, target: u32) -> Result<(), Error> {
    let len = txn.store.branch(branch).len();
    if source >= len {
        return Err(Error::OutOfBounds { index: source as i64, len });
    }
    if target > len {
        return Err(Error::OutOfBounds { index: target as i64, len });
    }
    if source == target || source + 1 == target {
        return Ok(());
    }
    let Some(value) = list_get(&*txn.store, branch, source) else {
        return Ok(());
    };
    let prelim = value.to_prelim(&*txn.store);
    remove_range(txn, branch, source, 1);
    let target = if target > source { target - 1 } else { target };
    insert_at(txn, branch, target, prelim);
    return Ok(());
}

/// The value a freshly inserted item holds.
pub(crate) fn inserted(txn: &TransactionMut<'_>, ptr: ItemPtr) -> Out {
    return item_value(&*txn.store, ptr, 0).unwrap_or(Out::Any(Any::Undefined));
}

/// The value held by a single unit of an item.
pub(crate) fn item_value(store: &Store, ptr: ItemPtr, offset: u32) -> Option<Out> {
    return match &store.item(ptr).content {
        Content::Any(values) => values.get(offset as usize).cloned().map(Out::Any),
        Content::Embed(value) => Some(Out::Any(value.clone())),
        Content::String(s) => s.chars().nth(offset as usize).map(|c| Out::Any(Any::from(c.to_string()))),
        Content::Type(branch) => Some(Out::from_branch(store, *branch)),
        Content::Format(_, _) | Content::Deleted(_) => None,
    };
}

/// The value at a visible index of a sequence.
pub(crate) fn list_get(store: &Store, branch: BranchPtr, index: u32) -> Option<Out> {
    let (ptr, offset) = store.find_position(branch, index)?;
    return item_value(store, ptr, offset);
}

/// All visible values of a sequence, in order.
pub(crate) fn list_values(store: &Store, branch: BranchPtr) -> Vec<Out> {
    let mut out = Vec::new();
    let mut current = store.branch(branch).start;
    while let Some(ptr) = current {
        let item = store.item(ptr);
        if item.is_visible() {
            for offset in 0..item.len {
                if let Some(value) = item_value(store, ptr, offset) {
                    out.push(value);
                }
            }
        }
        current = item.right;
    }
    return out;
}

/// The live entries of a map-like branch, sorted by key.
pub(crate) fn map_entries(store: &Store, branch: BranchPtr) -> Vec<(Arc<str>, Out)> {
    let mut entries: Vec<(Arc<str>, Out)> = store
        .branch(branch)
        .map
        .iter()
        .filter(|(_, ptr)| !store.item(**ptr).deleted)
        .filter_map(|(key, ptr)| {
            let len = store.item(*ptr).len;
            item_value(store, *ptr, len - 1).map(|value| (key.clone(), value))
        })
        .collect();
    entries.sort_by(|a, b| a.0.cmp(&b.0));
    return entries;
}

/// The live value under `key`.
pub(crate) fn map_get(store: &Store, branch: BranchPtr, key: &str) -> Option<Out> {
    let ptr = *store.branch(branch).map.get(key)?;
    let item = store.item(ptr);
    if item.deleted {
        return None;
    }
    return item_value(store, ptr, item.len - 1);
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn negative_indices_count_from_end() {
        assert_eq!(normalize_index(-1, 5), Ok(4));
        assert_eq!(normalize_index(-5, 5), Ok(0));
        assert_eq!(normalize_index(5, 5), Ok(5));
        assert_eq!(normalize_index(-6, 5), Err(Error::OutOfBounds { index: -6, len: 5 }));
        assert_eq!(normalize_index(6, 5), Err(Error::OutOfBounds { index: 6, len: 5 }));
    }

    #[test]
    fn ranges_must_fit() {
        assert_eq!(normalize_range(1, 4, 5), Ok(1));
        assert!(normalize_range(2, 4, 5).is_err());
        assert_eq!(normalize_range(-2, 2, 5), Ok(3));
    }
}
