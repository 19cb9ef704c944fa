// created = "2026-10-17"
// modified = "2026-10-17"

//! Collaborative rich text.
//!
//! Text is a sequence of string runs and embeds. Formatting is stored inline
//! as zero-length format markers: a marker `key = value` applies to
//! everything after it until a later marker for the same key changes it, and
//! a `null` value ends the attribute. Insertions and formatting place the
//! fewest markers needed so that concurrent edits of neighbouring ranges
//! don't clobber each other's attributes.
//!
//! Offsets are counted in the document's [`OffsetKind`], Unicode scalar
//! values by default. Embeds count as one.

use std::collections::HashMap;
use std::sync::Arc;

use crate::any::Any;
use crate::crdt::branch::BranchPtr;
use crate::crdt::item::{Content, ItemPtr};
use crate::crdt::store::Store;
use crate::doc::OffsetKind;
use crate::error::Error;
use crate::transaction::{ReadTxn, TransactionMut};
use crate::types::{normalize_index, normalize_range, SharedRef};

/// Formatting attributes. A `Null` value removes the attribute.
pub type Attrs = HashMap<Arc<str>, Any>;

/// One step of a rich-text change, or one run of a rich-text snapshot.
#[derive(Debug, Clone, PartialEq)]
pub enum Delta {
    Insert { value: Any, attributes: Option<Attrs> },
    Retain { len: u32, attributes: Option<Attrs> },
    Delete { len: u32 },
}

impl Delta {
    pub fn insert<V: Into<Any>>(value: V) -> Delta {
        return Delta::Insert { value: value.into(), attributes: None };
    }

    pub fn insert_with<V: Into<Any>>(value: V, attributes: Attrs) -> Delta {
        return Delta::Insert { value: value.into(), attributes: Some(attributes) };
    }

    pub fn retain(len: u32) -> Delta {
        return Delta::Retain { len, attributes: None };
    }

    pub fn retain_with(len: u32, attributes: Attrs) -> Delta {
        return Delta::Retain { len, attributes: Some(attributes) };
    }

    pub fn delete(len: u32) -> Delta {
        return Delta::Delete { len };
    }
}

// ============================================================================
// Handle
// ============================================================================

/// Handle to a text shared type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TextRef(BranchPtr);

impl TextRef {
    pub(crate) fn from_branch(branch: BranchPtr) -> TextRef {
        return TextRef(branch);
    }
}

impl SharedRef for TextRef {
    fn branch_ptr(&self) -> BranchPtr {
        return self.0;
    }
}

impl Text for TextRef {}

/// Rich-text operations, shared by plain text and XML text nodes.
pub trait Text: SharedRef {
    /// Number of characters and embeds, in the document's offset unit.
    fn len<T: ReadTxn>(&self, txn: &T) -> u32 {
        return txn.store().branch(self.branch_ptr()).len();
    }

    fn is_empty<T: ReadTxn>(&self, txn: &T) -> bool {
        return self.len(txn) == 0;
    }

    /// The plain string content, without embeds or formatting.
    fn get_string<T: ReadTxn>(&self, txn: &T) -> String {
        return text_string(txn.store(), self.branch_ptr());
    }

    /// Insert `chunk` at `index`, taking on the formatting in effect there.
    fn insert(&self, txn: &mut TransactionMut<'_>, index: i64, chunk: &str) -> Result<(), Error> {
        let branch = self.branch_ptr();
        let index = normalize_index(index, txn.store.branch(branch).len())?;
        if chunk.is_empty() {
            return Ok(());
        }
        let mut pos = find_position(txn, branch, index);
        let attributes = pos.attrs.clone();
        insert_text(txn, branch, &mut pos, Content::String(chunk.to_owned()), attributes);
        return Ok(());
    }

    /// Insert `chunk` at `index` with exactly `attributes`.
    fn insert_with_attributes(
        &self,
        txn: &mut TransactionMut<'_>,
        index: i64,
        chunk: &str,
        attributes: Attrs,
    ) -> Result<(), Error> {
        let branch = self.branch_ptr();
        let index = normalize_index(index, txn.store.branch(branch).len())?;
        if chunk.is_empty() {
            return Ok(());
        }
        let mut pos = find_position(txn, branch, index);
        insert_text(txn, branch, &mut pos, Content::String(chunk.to_owned()), attributes);
        return Ok(());
    }

    /// Insert a non-text value occupying one position.
    fn insert_embed<V: Into<Any>>(&self, txn: &mut TransactionMut<'_>, index: i64, embed: V) -> Result<(), Error> {
        let branch = self.branch_ptr();
        let index = normalize_index(index, txn.store.branch(branch).len())?;
        let mut pos = find_position(txn, branch, index);
        let attributes = pos.attrs.clone();
        insert_text(txn, branch, &mut pos, Content::Embed(embed.into()), attributes);
        return Ok(());
    }

    fn remove_range(&self, txn: &mut TransactionMut<'_>, index: i64, len: u32) -> Result<(), Error> {
        let branch = self.branch_ptr();
        let start = normalize_range(index, len, txn.store.branch(branch).len())?;
        if len == 0 {
            return Ok(());
        }
        let mut pos = find_position(txn, branch, start);
        delete_text(txn, &mut pos, len);
        return Ok(());
    }

    /// Apply `attributes` to `len` characters starting at `index`.
    fn format(&self, txn: &mut TransactionMut<'_>, index: i64, len: u32, attributes: Attrs) -> Result<(), Error> {
        let branch = self.branch_ptr();
        let start = normalize_range(index, len, txn.store.branch(branch).len())?;
        if len == 0 || attributes.is_empty() {
            return Ok(());
        }
        let mut pos = find_position(txn, branch, start);
        format_text(txn, branch, &mut pos, len, &attributes);
        return Ok(());
    }

    /// The content as a list of inserts, one per run of equal formatting.
    fn to_delta<T: ReadTxn>(&self, txn: &T) -> Vec<Delta> {
        return text_delta(txn.store(), self.branch_ptr());
    }

    /// Apply a sequence of retains, inserts and deletes from the start of
    /// the text. Nothing is changed if the delta reaches past the end.
    fn apply_delta<I>(&self, txn: &mut TransactionMut<'_>, delta: I) -> Result<(), Error>
    where
        I: IntoIterator<Item = Delta>,
    {
        let branch = self.branch_ptr();
        let delta: Vec<Delta> = delta.into_iter().collect();
        check_delta(&delta, txn.store.branch(branch).len(), txn.store.offset_kind)?;

        let mut pos = TextPosition::start(&*txn.store, branch);
        for step in delta {
            match step {
                Delta::Insert { value, attributes } => {
                    let content = match value {
                        Any::String(s) if s.is_empty() => continue,
                        Any::String(s) => Content::String(s.to_string()),
                        other => Content::Embed(other),
                    };
                    insert_text(txn, branch, &mut pos, content, attributes.unwrap_or_default());
                }
                Delta::Retain { len, attributes: Some(attributes) } => {
                    format_text(txn, branch, &mut pos, len, &attributes);
                }
                Delta::Retain { len, attributes: None } => advance(txn, &mut pos, len),
                Delta::Delete { len } => delete_text(txn, &mut pos, len),
            }
        }
        return Ok(());
    }
}

fn check_delta(delta: &[Delta], len: u32, kind: OffsetKind) -> Result<(), Error> {
    let mut cursor: u64 = 0;
    let mut len = len as u64;
    for step in delta {
        match step {
            Delta::Insert { value, .. } => {
                let n = match value {
                    Any::String(s) => kind.measure(s) as u64,
                    _ => 1,
                };
                cursor += n;
                len += n;
            }
            Delta::Retain { len: n, .. } => {
                if cursor + *n as u64 > len {
                    return Err(Error::OutOfBounds { index: (cursor + *n as u64) as i64, len: len as u32 });
                }
                cursor += *n as u64;
            }
            Delta::Delete { len: n } => {
                if cursor + *n as u64 > len {
                    return Err(Error::OutOfBounds { index: (cursor + *n as u64) as i64, len: len as u32 });
                }
                len -= *n as u64;
            }
        }
    }
    return Ok(());
}

// ============================================================================
// Positions
// ============================================================================

/// A cursor between two items, tracking the attributes in effect there.
struct TextPosition {
    left: Option<ItemPtr>,
    right: Option<ItemPtr>,
    index: u32,
    attrs: Attrs,
}

impl TextPosition {
    fn start(store: &Store, branch: BranchPtr) -> TextPosition {
        return TextPosition { left: None, right: store.branch(branch).start, index: 0, attrs: Attrs::new() };
    }

    /// Step over the item to the right.
    fn forward(&mut self, store: &Store) {
        let Some(right) = self.right else {
            return;
        };
        let item = store.item(right);
        if !item.deleted {
            match &item.content {
                Content::Format(key, value) => update_attrs(&mut self.attrs, key, value),
                _ if item.is_countable() => self.index += store.units(right),
                _ => {}
            }
        }
        self.left = Some(right);
        self.right = item.right;
    }
}

fn update_attrs(attrs: &mut Attrs, key: &Arc<str>, value: &Any) {
    if *value == Any::Null {
        attrs.remove(key);
    } else {
        attrs.insert(key.clone(), value.clone());
    }
}

/// Make the visible item `ptr` cover no more than `units` positions.
fn truncate_to(store: &mut Store, ptr: ItemPtr, units: u32) {
    let len = store.units_to_len(ptr, units);
    if len < store.item(ptr).len {
        store.split_item(ptr, len);
    }
}

/// Move `count` visible units to the right, splitting the last item.
fn advance(txn: &mut TransactionMut<'_>, pos: &mut TextPosition, count: u32) {
    let mut remaining = count;
    while let Some(right) = pos.right {
        if remaining == 0 {
            break;
        }
        if txn.store.item(right).is_visible() {
            truncate_to(txn.store, right, remaining);
            remaining = remaining.saturating_sub(txn.store.units(right));
        }
        pos.forward(&*txn.store);
    }
}

/// The position just after the first `index` visible units, with the
/// attributes of the format markers before it.
fn find_position(txn: &mut TransactionMut<'_>, branch: BranchPtr, index: u32) -> TextPosition {
    let mut pos = TextPosition::start(&*txn.store, branch);
    if index == 0 {
        return pos;
    }
    let Some((ptr, offset)) = txn.store.find_position(branch, index - 1) else {
        advance(txn, &mut pos, index);
        return pos;
    };
    truncate_to(txn.store, ptr, offset + 1);
    let markers = txn.store.branch(branch).index.marks_before(&ptr);
    for marker in markers.into_iter().rev() {
        if let Content::Format(key, value) = &txn.store.item(marker).content {
            update_attrs(&mut pos.attrs, key, value);
        }
    }
    pos.left = Some(ptr);
    pos.right = txn.store.item(ptr).right;
    pos.index = index - (offset + 1) + txn.store.units(ptr);
    return pos;
}

// ============================================================================
// Editing
// ============================================================================

/// Skip deleted items and markers that already match `attrs`.
fn minimize_attr_changes(store: &Store, pos: &mut TextPosition, attrs: &Attrs) {
    while let Some(right) = pos.right {
        let item = store.item(right);
        let redundant = item.deleted
            || match &item.content {
                Content::Format(key, value) => attrs.get(key).unwrap_or(&Any::Null) == value,
                _ => false,
            };
        if !redundant {
            break;
        }
        pos.forward(store);
    }
}

fn sorted_keys(attrs: &Attrs) -> Vec<Arc<str>> {
    let mut keys: Vec<Arc<str>> = attrs.keys().cloned().collect();
    keys.sort();
    return keys;
}

/// Insert markers for every attribute that differs from what is in effect.
/// Returns the attributes that must be restored afterwards.
fn insert_attributes(txn: &mut TransactionMut<'_>, branch: BranchPtr, pos: &mut TextPosition, attrs: &Attrs) -> Attrs {
    let mut negated = Attrs::new();
    for key in sorted_keys(attrs) {
        let value = &attrs[&key];
        let current = pos.attrs.get(&key).cloned().unwrap_or(Any::Null);
        if current == *value {
            continue;
        }
        negated.insert(key.clone(), current);
        let ptr = txn.create_item(branch, pos.left, pos.right, None, Content::Format(key, value.clone()));
        pos.right = Some(ptr);
        pos.forward(&*txn.store);
    }
    return negated;
}

/// Restore the attributes that were in effect before an insertion.
fn insert_negated_attributes(txn: &mut TransactionMut<'_>, branch: BranchPtr, pos: &mut TextPosition, mut negated: Attrs) {
    while let Some(right) = pos.right {
        let item = txn.store.item(right);
        if !item.deleted {
            match &item.content {
                Content::Format(key, value) if negated.get(key) == Some(value) => {
                    let key = key.clone();
                    negated.remove(&key);
                }
                _ => break,
            }
        }
        pos.forward(&*txn.store);
    }
    for key in sorted_keys(&negated) {
        let value = negated[&key].clone();
        let ptr = txn.create_item(branch, pos.left, pos.right, None, Content::Format(key, value));
        pos.right = Some(ptr);
        pos.forward(&*txn.store);
    }
}

fn insert_text(txn: &mut TransactionMut<'_>, branch: BranchPtr, pos: &mut TextPosition, content: Content, mut attributes: Attrs) {
    for key in pos.attrs.keys() {
        if !attributes.contains_key(key) {
            attributes.insert(key.clone(), Any::Null);
        }
    }
    minimize_attr_changes(&*txn.store, pos, &attributes);
    let negated = insert_attributes(txn, branch, pos, &attributes);
    let ptr = txn.create_item(branch, pos.left, pos.right, None, content);
    pos.right = Some(ptr);
    pos.forward(&*txn.store);
    insert_negated_attributes(txn, branch, pos, negated);
}

fn format_text(txn: &mut TransactionMut<'_>, branch: BranchPtr, pos: &mut TextPosition, len: u32, attributes: &Attrs) {
    minimize_attr_changes(&*txn.store, pos, attributes);
    let mut negated = insert_attributes(txn, branch, pos, attributes);
    let mut remaining = len;
    while let Some(right) = pos.right {
        let (deleted, format) = {
            let item = txn.store.item(right);
            let format = match &item.content {
                Content::Format(key, value) => Some((key.clone(), value.clone())),
                _ => None,
            };
            (item.deleted, format)
        };
        if remaining == 0 && !(!negated.is_empty() && (deleted || format.is_some())) {
            break;
        }
        if !deleted {
            match format {
                Some((key, value)) => match attributes.get(&key) {
                    Some(wanted) => {
                        if *wanted == value {
                            negated.remove(&key);
                        } else {
                            if remaining == 0 {
                                break;
                            }
                            negated.insert(key, value);
                        }
                        txn.delete_item(right);
                    }
                    None => update_attrs(&mut pos.attrs, &key, &value),
                },
                None => {
                    truncate_to(txn.store, right, remaining);
                    remaining = remaining.saturating_sub(txn.store.units(right));
                }
            }
        }
        pos.forward(&*txn.store);
    }
    insert_negated_attributes(txn, branch, pos, negated);
}

fn delete_text(txn: &mut TransactionMut<'_>, pos: &mut TextPosition, len: u32) {
    let mut remaining = len;
    while let Some(right) = pos.right {
        if remaining == 0 {
            break;
        }
        if txn.store.item(right).is_visible() {
            truncate_to(txn.store, right, remaining);
            remaining = remaining.saturating_sub(txn.store.units(right));
            txn.delete_item(right);
        }
        pos.forward(&*txn.store);
    }
}

// ============================================================================
// Reading
// ============================================================================

pub(crate) fn text_string(store: &Store, branch: BranchPtr) -> String {
    let mut out = String::new();
    let mut current = store.branch(branch).start;
    while let Some(ptr) = current {
        let item = store.item(ptr);
        if !item.deleted {
            if let Content::String(s) = &item.content {
                out.push_str(s);
            }
        }
        current = item.right;
    }
    return out;
}

/// Append a run, joining it to the previous one when both are strings
/// with the same formatting.
fn push_insert(deltas: &mut Vec<Delta>, value: Any, attrs: &Attrs, joinable: bool) {
    let attributes = if attrs.is_empty() { None } else { Some(attrs.clone()) };
    if let (true, Some(Delta::Insert { value: Any::String(last), attributes: last_attrs }), Any::String(s)) =
        (joinable, deltas.last_mut(), &value)
    {
        if *last_attrs == attributes {
            let mut joined = last.to_string();
            joined.push_str(s);
            *last = Arc::from(joined);
            return;
        }
    }
    deltas.push(Delta::Insert { value, attributes });
}

pub(crate) fn text_delta(store: &Store, branch: BranchPtr) -> Vec<Delta> {
    let mut deltas = Vec::new();
    let mut attrs = Attrs::new();
    let mut joinable = false;
    let mut current = store.branch(branch).start;
    while let Some(ptr) = current {
        let item = store.item(ptr);
        if !item.deleted {
            match &item.content {
                Content::String(s) => {
                    push_insert(&mut deltas, Any::from(s.as_str()), &attrs, joinable);
                    joinable = true;
                }
                Content::Embed(value) => {
                    push_insert(&mut deltas, value.clone(), &attrs, false);
                    joinable = false;
                }
                Content::Format(key, value) => update_attrs(&mut attrs, key, value),
                _ => {}
            }
        }
        current = item.right;
    }
    return deltas;
}

// ============================================================================
// Preliminary text
// ============================================================================

/// Initial contents of a text that has not been inserted yet.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct TextPrelim {
    chunks: Vec<(Any, Attrs)>,
}

impl TextPrelim {
    pub fn new(text: &str) -> TextPrelim {
        return TextPrelim::default().push(text, Attrs::new());
    }

    /// Append a string or embed with the given formatting.
    pub fn push<V: Into<Any>>(mut self, value: V, attributes: Attrs) -> TextPrelim {
        self.chunks.push((value.into(), attributes));
        return self;
    }

    pub(crate) fn from_branch(store: &Store, branch: BranchPtr) -> TextPrelim {
        let chunks = text_delta(store, branch)
            .into_iter()
            .filter_map(|delta| match delta {
                Delta::Insert { value, attributes } => Some((value, attributes.unwrap_or_default())),
                _ => None,
            })
            .collect();
        return TextPrelim { chunks };
    }

    pub(crate) fn integrate(self, txn: &mut TransactionMut<'_>, branch: BranchPtr) {
        let mut pos = TextPosition::start(&*txn.store, branch);
        for (value, attributes) in self.chunks {
            let content = match value {
                Any::String(s) if s.is_empty() => continue,
                Any::String(s) => Content::String(s.to_string()),
                other => Content::Embed(other),
            };
            insert_text(txn, branch, &mut pos, content, attributes);
        }
    }
}

impl From<&str> for TextPrelim {
    fn from(text: &str) -> TextPrelim {
        return TextPrelim::new(text);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc::Doc;

    fn bold() -> Attrs {
        return Attrs::from([(Arc::from("bold"), Any::Bool(true))]);
    }

    #[test]
    fn positions_in_a_long_document() {
        let mut doc = Doc::with_client_id(1);
        let text = doc.get_or_insert_text("t");
        let mut model = String::new();
        for i in 0..4000u32 {
            let c = char::from(b'a' + (i % 26) as u8);
            let at = (i * 7919) % (model.len() as u32 + 1);
            text.insert(&mut doc.transact_mut(), at as i64, &c.to_string()).unwrap();
            model.insert(at as usize, c);
        }
        for i in 0..500u32 {
            let at = (i * 104_729) % (model.len() as u32 - 2);
            text.remove_range(&mut doc.transact_mut(), at as i64, 2).unwrap();
            model.replace_range(at as usize..at as usize + 2, "");
        }
        let txn = doc.transact();
        assert_eq!(text.len(&txn), model.len() as u32);
        assert_eq!(text.get_string(&txn), model);
    }

    #[test]
    fn byte_offsets_cover_whole_characters() {
        let options = crate::doc::Options { offset_kind: OffsetKind::Bytes, ..crate::doc::Options::with_client_id(1) };
        let mut doc = Doc::with_options(options);
        let text = doc.get_or_insert_text("t");
        text.insert(&mut doc.transact_mut(), 0, "h\u{e9}llo").unwrap();
        assert_eq!(text.len(&doc.transact()), 6);
        text.insert(&mut doc.transact_mut(), 3, "-").unwrap();
        assert_eq!(text.get_string(&doc.transact()), "h\u{e9}-llo");
        text.remove_range(&mut doc.transact_mut(), 1, 1).unwrap();
        assert_eq!(text.get_string(&doc.transact()), "h-llo");
    }

    #[test]
    fn insert_and_remove() {
        let mut doc = Doc::with_client_id(1);
        let text = doc.get_or_insert_text("t");
        let mut txn = doc.transact_mut();
        text.insert(&mut txn, 0, "hello").unwrap();
        text.insert(&mut txn, 5, " world").unwrap();
        text.insert(&mut txn, -6, ",").unwrap();
        assert_eq!(text.get_string(&txn), "hello, world");
        text.remove_range(&mut txn, 5, 1).unwrap();
        assert_eq!(text.get_string(&txn), "hello world");
        assert_eq!(text.len(&txn), 11);
    }

    #[test]
    fn out_of_bounds_is_rejected() {
        let mut doc = Doc::with_client_id(1);
        let text = doc.get_or_insert_text("t");
        let mut txn = doc.transact_mut();
        text.insert(&mut txn, 0, "abc").unwrap();
        assert_eq!(text.insert(&mut txn, 4, "x"), Err(Error::OutOfBounds { index: 4, len: 3 }));
        assert!(text.remove_range(&mut txn, 2, 2).is_err());
        assert_eq!(text.get_string(&txn), "abc");
    }

    #[test]
    fn offsets_count_scalar_values() {
        let mut doc = Doc::with_client_id(1);
        let text = doc.get_or_insert_text("t");
        let mut txn = doc.transact_mut();
        text.insert(&mut txn, 0, "añb😀c").unwrap();
        assert_eq!(text.len(&txn), 5);
        text.remove_range(&mut txn, 1, 3).unwrap();
        assert_eq!(text.get_string(&txn), "ac");
    }

    #[test]
    fn format_splits_runs() {
        let mut doc = Doc::with_client_id(1);
        let text = doc.get_or_insert_text("t");
        let mut txn = doc.transact_mut();
        text.insert(&mut txn, 0, "hello world").unwrap();
        text.format(&mut txn, 0, 5, bold()).unwrap();
        assert_eq!(
            text.to_delta(&txn),
            vec![Delta::insert_with("hello", bold()), Delta::insert(" world")]
        );
    }

    #[test]
    fn plain_insert_inherits_formatting() {
        let mut doc = Doc::with_client_id(1);
        let text = doc.get_or_insert_text("t");
        let mut txn = doc.transact_mut();
        text.insert_with_attributes(&mut txn, 0, "bold", bold()).unwrap();
        text.insert(&mut txn, 4, "er").unwrap();
        text.insert_with_attributes(&mut txn, 6, " plain", Attrs::new()).unwrap();
        assert_eq!(
            text.to_delta(&txn),
            vec![Delta::insert_with("bolder", bold()), Delta::insert(" plain")]
        );
    }

    #[test]
    fn null_attribute_clears_formatting() {
        let mut doc = Doc::with_client_id(1);
        let text = doc.get_or_insert_text("t");
        let mut txn = doc.transact_mut();
        text.insert_with_attributes(&mut txn, 0, "abcd", bold()).unwrap();
        text.format(&mut txn, 1, 2, Attrs::from([(Arc::from("bold"), Any::Null)])).unwrap();
        assert_eq!(
            text.to_delta(&txn),
            vec![Delta::insert_with("a", bold()), Delta::insert("bc"), Delta::insert_with("d", bold())]
        );
    }

    #[test]
    fn embeds_take_one_position() {
        let mut doc = Doc::with_client_id(1);
        let text = doc.get_or_insert_text("t");
        let mut txn = doc.transact_mut();
        text.insert(&mut txn, 0, "ab").unwrap();
        text.insert_embed(&mut txn, 1, Any::from("image")).unwrap();
        assert_eq!(text.len(&txn), 3);
        assert_eq!(text.get_string(&txn), "ab");
        assert_eq!(
            text.to_delta(&txn),
            vec![Delta::insert("a"), Delta::insert("image"), Delta::insert("b")]
        );
        text.remove_range(&mut txn, 1, 1).unwrap();
        assert_eq!(text.to_delta(&txn), vec![Delta::insert("ab")]);
    }

    #[test]
    fn apply_delta_edits_in_place() {
        let mut doc = Doc::with_client_id(1);
        let text = doc.get_or_insert_text("t");
        let mut txn = doc.transact_mut();
        text.insert(&mut txn, 0, "hello world").unwrap();
        text.apply_delta(
            &mut txn,
            vec![Delta::retain_with(5, bold()), Delta::delete(6), Delta::insert("!")],
        )
        .unwrap();
        assert_eq!(text.get_string(&txn), "hello!");
        assert_eq!(
            text.to_delta(&txn),
            vec![Delta::insert_with("hello", bold()), Delta::insert("!")]
        );
    }

    #[test]
    fn apply_delta_past_end_changes_nothing() {
        let mut doc = Doc::with_client_id(1);
        let text = doc.get_or_insert_text("t");
        let mut txn = doc.transact_mut();
        text.insert(&mut txn, 0, "abc").unwrap();
        let result = text.apply_delta(&mut txn, vec![Delta::delete(1), Delta::retain(3)]);
        assert!(matches!(result, Err(Error::OutOfBounds { .. })));
        assert_eq!(text.get_string(&txn), "abc");
    }
}
