// created = "2026-10-17"
// modified = "2026-10-17"

//! Collaborative XML trees.
//!
//! A fragment is an ordered list of element and text nodes. An element is a
//! fragment with a tag and string attributes. XML text is rich text; its
//! formatting is rendered as nested tags. Parent and sibling links are
//! derived from the item structure, so nodes never own each other.

use std::collections::BTreeMap;
use std::sync::Arc;

use crate::any::Any;
use crate::crdt::branch::{BranchPtr, TypeRef};
use crate::crdt::item::{Content, ItemPtr};
use crate::crdt::store::Store;
use crate::error::Error;
use crate::transaction::{ReadTxn, TransactionMut};
use crate::types::text::{text_delta, Delta, Text, TextPrelim};
use crate::types::{In, Out, SharedRef};

// ============================================================================
// Values
// ============================================================================

/// A node to insert.
#[derive(Debug, Clone, PartialEq)]
pub enum XmlIn {
    Element(XmlElementPrelim),
    Text(XmlTextPrelim),
}

impl From<XmlElementPrelim> for XmlIn {
    fn from(value: XmlElementPrelim) -> XmlIn {
        return XmlIn::Element(value);
    }
}

impl From<XmlTextPrelim> for XmlIn {
    fn from(value: XmlTextPrelim) -> XmlIn {
        return XmlIn::Text(value);
    }
}

/// A live XML node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum XmlOut {
    Element(XmlElementRef),
    Fragment(XmlFragmentRef),
    Text(XmlTextRef),
}

impl XmlOut {
    fn from_branch(store: &Store, branch: BranchPtr) -> Option<XmlOut> {
        return match store.branch(branch).type_ref {
            TypeRef::XmlElement(_) => Some(XmlOut::Element(XmlElementRef(branch))),
            TypeRef::XmlFragment => Some(XmlOut::Fragment(XmlFragmentRef(branch))),
            TypeRef::XmlText => Some(XmlOut::Text(XmlTextRef(branch))),
            _ => None,
        };
    }

    fn from_item(store: &Store, ptr: ItemPtr) -> Option<XmlOut> {
        return match &store.item(ptr).content {
            Content::Type(branch) => XmlOut::from_branch(store, *branch),
            _ => None,
        };
    }

    pub fn get_string<T: ReadTxn>(&self, txn: &T) -> String {
        return match self {
            XmlOut::Element(element) => element.get_string(txn),
            XmlOut::Fragment(fragment) => fragment.get_string(txn),
            XmlOut::Text(text) => text.get_string(txn),
        };
    }

    pub fn as_element(&self) -> Option<XmlElementRef> {
        return match self {
            XmlOut::Element(element) => Some(*element),
            _ => None,
        };
    }

    pub fn as_text(&self) -> Option<XmlTextRef> {
        return match self {
            XmlOut::Text(text) => Some(*text),
            _ => None,
        };
    }
}

impl SharedRef for XmlOut {
    fn branch_ptr(&self) -> BranchPtr {
        return match self {
            XmlOut::Element(element) => element.0,
            XmlOut::Fragment(fragment) => fragment.0,
            XmlOut::Text(text) => text.0,
        };
    }
}

impl XmlNode for XmlOut {}

/// Preliminary element: a tag, attributes and children.
#[derive(Debug, Clone, PartialEq)]
pub struct XmlElementPrelim {
    pub(crate) tag: Arc<str>,
    attributes: BTreeMap<String, String>,
    children: Vec<XmlIn>,
}

impl XmlElementPrelim {
    pub fn new<I>(tag: &str, children: I) -> XmlElementPrelim
    where
        I: IntoIterator<Item = XmlIn>,
    {
        return XmlElementPrelim { tag: Arc::from(tag), attributes: BTreeMap::new(), children: children.into_iter().collect() };
    }

    pub fn empty(tag: &str) -> XmlElementPrelim {
        return XmlElementPrelim::new(tag, []);
    }

    pub fn with_attribute(mut self, key: &str, value: &str) -> XmlElementPrelim {
        self.attributes.insert(key.to_owned(), value.to_owned());
        return self;
    }

    pub(crate) fn from_branch(store: &Store, branch: BranchPtr) -> XmlElementPrelim {
        let tag = match &store.branch(branch).type_ref {
            TypeRef::XmlElement(tag) => tag.clone(),
            _ => Arc::from(""),
        };
        let attributes = super::map_entries(store, branch)
            .into_iter()
            .filter_map(|(key, value)| attribute_string(&value).map(|v| (key.to_string(), v)))
            .collect();
        let children = child_prelims(store, branch);
        return XmlElementPrelim { tag, attributes, children };
    }

    pub(crate) fn integrate(self, txn: &mut TransactionMut<'_>, branch: BranchPtr) {
        for (key, value) in self.attributes {
            super::map_insert(txn, branch, Arc::from(key), In::from(value));
        }
        let mut left = None;
        for child in self.children {
            left = Some(super::insert_value(txn, branch, left, None, None, child.into()));
        }
    }
}

/// Preliminary XML text.
#[derive(Debug, Clone, PartialEq, Default)]
pub struct XmlTextPrelim(TextPrelim);

impl XmlTextPrelim {
    pub fn new(text: &str) -> XmlTextPrelim {
        return XmlTextPrelim(TextPrelim::new(text));
    }

    pub(crate) fn from_branch(store: &Store, branch: BranchPtr) -> XmlTextPrelim {
        return XmlTextPrelim(TextPrelim::from_branch(store, branch));
    }

    pub(crate) fn integrate(self, txn: &mut TransactionMut<'_>, branch: BranchPtr) {
        self.0.integrate(txn, branch);
    }
}

impl From<&str> for XmlTextPrelim {
    fn from(text: &str) -> XmlTextPrelim {
        return XmlTextPrelim::new(text);
    }
}

impl From<TextPrelim> for XmlTextPrelim {
    fn from(text: TextPrelim) -> XmlTextPrelim {
        return XmlTextPrelim(text);
    }
}

fn child_prelims(store: &Store, branch: BranchPtr) -> Vec<XmlIn> {
    return super::list_values(store, branch)
        .iter()
        .filter_map(|value| match value.to_prelim(store) {
            In::XmlElement(element) => Some(XmlIn::Element(element)),
            In::XmlText(text) => Some(XmlIn::Text(text)),
            _ => None,
        })
        .collect();
}

fn attribute_string(value: &Out) -> Option<String> {
    return match value {
        Out::Any(Any::String(s)) => Some(s.to_string()),
        Out::Any(other) => Some(other.to_string()),
        _ => None,
    };
}

// ============================================================================
// Containers
// ============================================================================

/// Ordered children, shared by fragments and elements.
pub trait XmlFragment: SharedRef {
    /// Number of children.
    fn len<T: ReadTxn>(&self, txn: &T) -> u32 {
        return txn.store().branch(self.branch_ptr()).len();
    }

    fn is_empty<T: ReadTxn>(&self, txn: &T) -> bool {
        return self.len(txn) == 0;
    }

    fn insert<V: Into<XmlIn>>(&self, txn: &mut TransactionMut<'_>, index: i64, node: V) -> Result<XmlOut, Error> {
        let branch = self.branch_ptr();
        let index = super::normalize_index(index, txn.store.branch(branch).len())?;
        let ptr = super::insert_at(txn, branch, index, xml_in(node));
        return Ok(inserted_node(txn, ptr));
    }

    /// Insert right after `anchor`, or first when there is no anchor.
    /// The anchor must be a live child of this node.
    fn insert_after<V: Into<XmlIn>>(
        &self,
        txn: &mut TransactionMut<'_>,
        anchor: Option<&XmlOut>,
        node: V,
    ) -> Result<XmlOut, Error> {
        let branch = self.branch_ptr();
        let left = match anchor {
            None => None,
            Some(anchor) => {
                let item = txn.store.branch(anchor.branch_ptr()).item.ok_or(Error::InvalidAnchor)?;
                let child = txn.store.item(item);
                if child.deleted || child.parent != branch {
                    return Err(Error::InvalidAnchor);
                }
                Some(item)
            }
        };
        let ptr = super::insert_value(txn, branch, left, None, None, xml_in(node));
        return Ok(inserted_node(txn, ptr));
    }

    fn push_back<V: Into<XmlIn>>(&self, txn: &mut TransactionMut<'_>, node: V) -> XmlOut {
        let branch = self.branch_ptr();
        let len = txn.store.branch(branch).len();
        let ptr = super::insert_at(txn, branch, len, xml_in(node));
        return inserted_node(txn, ptr);
    }

    fn push_front<V: Into<XmlIn>>(&self, txn: &mut TransactionMut<'_>, node: V) -> XmlOut {
        let ptr = super::insert_at(txn, self.branch_ptr(), 0, xml_in(node));
        return inserted_node(txn, ptr);
    }

    fn remove_range(&self, txn: &mut TransactionMut<'_>, index: i64, len: u32) -> Result<(), Error> {
        let branch = self.branch_ptr();
        let start = super::normalize_range(index, len, txn.store.branch(branch).len())?;
        super::remove_range(txn, branch, start, len);
        return Ok(());
    }

    fn get<T: ReadTxn>(&self, txn: &T, index: u32) -> Option<XmlOut> {
        return match super::list_get(txn.store(), self.branch_ptr(), index)? {
            Out::XmlElement(element) => Some(XmlOut::Element(element)),
            Out::XmlText(text) => Some(XmlOut::Text(text)),
            Out::XmlFragment(fragment) => Some(XmlOut::Fragment(fragment)),
            _ => None,
        };
    }

    fn first_child<T: ReadTxn>(&self, txn: &T) -> Option<XmlOut> {
        return self.get(txn, 0);
    }

    fn children<T: ReadTxn>(&self, txn: &T) -> Vec<XmlOut> {
        let store = txn.store();
        return super::list_values(store, self.branch_ptr())
            .into_iter()
            .filter_map(|value| XmlOut::from_branch(store, out_branch(&value)?))
            .collect();
    }

    /// Move the child at `source` in front of the child currently at
    /// `target`.
    fn move_to(&self, txn: &mut TransactionMut<'_>, source: u32, target: u32) -> Result<(), Error> {
        return super::move_to(txn, self.branch_ptr(), source, target);
    }
}

fn xml_in<V: Into<XmlIn>>(node: V) -> In {
    let node: XmlIn = node.into();
    return In::from(node);
}

fn out_branch(value: &Out) -> Option<BranchPtr> {
    return match value {
        Out::XmlElement(element) => Some(element.0),
        Out::XmlText(text) => Some(text.0),
        Out::XmlFragment(fragment) => Some(fragment.0),
        _ => None,
    };
}

fn inserted_node(txn: &TransactionMut<'_>, ptr: ItemPtr) -> XmlOut {
    let store = txn.store();
    return match XmlOut::from_item(store, ptr) {
        Some(node) => node,
        None => XmlOut::Fragment(XmlFragmentRef(store.item(ptr).parent)),
    };
}

fn children_string(store: &Store, branch: BranchPtr) -> String {
    let mut out = String::new();
    let mut current = store.branch(branch).start;
    while let Some(ptr) = current {
        let item = store.item(ptr);
        if !item.deleted {
            if let Content::Type(child) = &item.content {
                out.push_str(&node_string(store, *child));
            }
        }
        current = item.right;
    }
    return out;
}

fn node_string(store: &Store, branch: BranchPtr) -> String {
    return match &store.branch(branch).type_ref {
        TypeRef::XmlElement(tag) => element_string(store, branch, tag),
        TypeRef::XmlText => text_xml_string(store, branch),
        _ => children_string(store, branch),
    };
}

fn element_string(store: &Store, branch: BranchPtr, tag: &str) -> String {
    let mut out = String::new();
    out.push('<');
    out.push_str(tag);
    for (key, value) in super::map_entries(store, branch) {
        if let Some(value) = attribute_string(&value) {
            push_attribute(&mut out, &key, &value);
        }
    }
    out.push('>');
    out.push_str(&children_string(store, branch));
    push_closing(&mut out, tag);
    return out;
}

fn push_attribute(out: &mut String, key: &str, value: &str) {
    out.push(' ');
    out.push_str(key);
    out.push_str("=\"");
    out.push_str(value);
    out.push('"');
}

fn push_closing(out: &mut String, name: &str) {
    out.push_str("</");
    out.push_str(name);
    out.push('>');
}

fn text_xml_string(store: &Store, branch: BranchPtr) -> String {
    let mut out = String::new();
    for delta in text_delta(store, branch) {
        let Delta::Insert { value, attributes } = delta else {
            continue;
        };
        let mut nodes: Vec<(Arc<str>, Vec<(String, String)>)> = attributes
            .unwrap_or_default()
            .into_iter()
            .map(|(name, value)| {
                let mut attrs: Vec<(String, String)> = match value {
                    Any::Map(map) => map.iter().map(|(k, v)| (k.clone(), v.to_string())).collect(),
                    _ => Vec::new(),
                };
                attrs.sort();
                (name, attrs)
            })
            .collect();
        nodes.sort_by(|a, b| a.0.cmp(&b.0));
        for (name, attrs) in &nodes {
            out.push('<');
            out.push_str(name);
            for (key, value) in attrs {
                push_attribute(&mut out, key, value);
            }
            out.push('>');
        }
        out.push_str(&value.to_string());
        for (name, _) in nodes.iter().rev() {
            push_closing(&mut out, name);
        }
    }
    return out;
}

// ============================================================================
// Navigation
// ============================================================================

/// Tree navigation for nodes that live inside a fragment or element.
pub trait XmlNode: SharedRef {
    /// The element or fragment containing this node.
    fn parent<T: ReadTxn>(&self, txn: &T) -> Option<XmlOut> {
        let store = txn.store();
        let item = store.branch(self.branch_ptr()).item?;
        return XmlOut::from_branch(store, store.item(item).parent);
    }

    fn next_sibling<T: ReadTxn>(&self, txn: &T) -> Option<XmlOut> {
        let store = txn.store();
        let item = store.branch(self.branch_ptr()).item?;
        return sibling(store, store.item(item).right, |ptr| store.item(ptr).right);
    }

    fn prev_sibling<T: ReadTxn>(&self, txn: &T) -> Option<XmlOut> {
        let store = txn.store();
        let item = store.branch(self.branch_ptr()).item?;
        return sibling(store, store.item(item).left, |ptr| store.item(ptr).left);
    }
}

fn sibling(store: &Store, start: Option<ItemPtr>, step: impl Fn(ItemPtr) -> Option<ItemPtr>) -> Option<XmlOut> {
    let mut current = start;
    while let Some(ptr) = current {
        if !store.item(ptr).deleted {
            if let Some(node) = XmlOut::from_item(store, ptr) {
                return Some(node);
            }
        }
        current = step(ptr);
    }
    return None;
}

// ============================================================================
// Handles
// ============================================================================

/// Handle to an XML fragment.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct XmlFragmentRef(BranchPtr);

impl XmlFragmentRef {
    pub(crate) fn from_branch(branch: BranchPtr) -> XmlFragmentRef {
        return XmlFragmentRef(branch);
    }

    /// The children rendered as XML, concatenated.
    pub fn get_string<T: ReadTxn>(&self, txn: &T) -> String {
        return children_string(txn.store(), self.0);
    }
}

impl SharedRef for XmlFragmentRef {
    fn branch_ptr(&self) -> BranchPtr {
        return self.0;
    }
}

impl XmlFragment for XmlFragmentRef {}

/// Handle to an XML element.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct XmlElementRef(BranchPtr);

impl XmlElementRef {
    pub(crate) fn from_branch(branch: BranchPtr) -> XmlElementRef {
        return XmlElementRef(branch);
    }

    pub fn tag<T: ReadTxn>(&self, txn: &T) -> Arc<str> {
        return match &txn.store().branch(self.0).type_ref {
            TypeRef::XmlElement(tag) => tag.clone(),
            _ => Arc::from(""),
        };
    }

    pub fn insert_attribute(&self, txn: &mut TransactionMut<'_>, key: &str, value: &str) {
        super::map_insert(txn, self.0, Arc::from(key), In::from(value));
    }

    pub fn get_attribute<T: ReadTxn>(&self, txn: &T, key: &str) -> Option<String> {
        return attribute_string(&super::map_get(txn.store(), self.0, key)?);
    }

    pub fn remove_attribute(&self, txn: &mut TransactionMut<'_>, key: &str) {
        let entry = txn.store.branch(self.0).map.get(key).copied();
        if let Some(ptr) = entry {
            txn.delete_item(ptr);
        }
    }

    /// All attributes, sorted by key.
    pub fn attributes<T: ReadTxn>(&self, txn: &T) -> Vec<(Arc<str>, String)> {
        return super::map_entries(txn.store(), self.0)
            .into_iter()
            .filter_map(|(key, value)| attribute_string(&value).map(|v| (key, v)))
            .collect();
    }

    /// `<tag key="value">children</tag>`, attributes sorted by key.
    pub fn get_string<T: ReadTxn>(&self, txn: &T) -> String {
        let store = txn.store();
        return element_string(store, self.0, &self.tag(txn));
    }
}

impl SharedRef for XmlElementRef {
    fn branch_ptr(&self) -> BranchPtr {
        return self.0;
    }
}

impl XmlFragment for XmlElementRef {}
impl XmlNode for XmlElementRef {}

/// Handle to an XML text node.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct XmlTextRef(BranchPtr);

impl XmlTextRef {
    pub(crate) fn from_branch(branch: BranchPtr) -> XmlTextRef {
        return XmlTextRef(branch);
    }

    /// The text with formatting rendered as tags.
    pub fn get_string<T: ReadTxn>(&self, txn: &T) -> String {
        return text_xml_string(txn.store(), self.0);
    }
}

impl SharedRef for XmlTextRef {
    fn branch_ptr(&self) -> BranchPtr {
        return self.0;
    }
}

impl Text for XmlTextRef {}
impl XmlNode for XmlTextRef {}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc::Doc;
    use crate::types::text::Attrs;
    use std::collections::HashMap;

    #[test]
    fn nested_prelim_renders() {
        let mut doc = Doc::with_client_id(1);
        let fragment = doc.get_or_insert_xml_fragment("f");
        let mut txn = doc.transact_mut();
        let div = XmlElementPrelim::new(
            "div",
            [XmlIn::from(XmlElementPrelim::empty("div")), XmlIn::from(XmlTextPrelim::from("x"))],
        );
        let node = fragment.insert(&mut txn, 0, div).unwrap();
        assert_eq!(node.get_string(&txn), "<div><div></div>x</div>");
        assert_eq!(fragment.get_string(&txn), "<div><div></div>x</div>");
    }

    #[test]
    fn attributes_render_sorted() {
        let mut doc = Doc::with_client_id(1);
        let fragment = doc.get_or_insert_xml_fragment("f");
        let mut txn = doc.transact_mut();
        let element = fragment.push_back(&mut txn, XmlElementPrelim::empty("p")).as_element().unwrap();
        element.insert_attribute(&mut txn, "z", "1");
        element.insert_attribute(&mut txn, "a", "2");
        assert_eq!(element.get_string(&txn), "<p a=\"2\" z=\"1\"></p>");
        assert_eq!(element.get_attribute(&txn, "a"), Some("2".to_string()));
        element.remove_attribute(&mut txn, "a");
        assert_eq!(element.attributes(&txn), vec![(Arc::from("z"), "1".to_string())]);
        assert_eq!(element.tag(&txn).as_ref(), "p");
    }

    #[test]
    fn siblings_and_parent() {
        let mut doc = Doc::with_client_id(1);
        let fragment = doc.get_or_insert_xml_fragment("f");
        let mut txn = doc.transact_mut();
        let a = fragment.push_back(&mut txn, XmlElementPrelim::empty("a"));
        let c = fragment.push_back(&mut txn, XmlElementPrelim::empty("c"));
        let b = fragment.insert_after(&mut txn, Some(&a), XmlTextPrelim::new("b")).unwrap();
        assert_eq!(fragment.get_string(&txn), "<a></a>b<c></c>");
        assert_eq!(a.next_sibling(&txn), Some(b));
        assert_eq!(c.prev_sibling(&txn), Some(b));
        assert_eq!(a.prev_sibling(&txn), None);
        assert_eq!(b.parent(&txn), Some(XmlOut::Fragment(fragment)));
        assert_eq!(fragment.first_child(&txn), Some(a));
        assert_eq!(fragment.children(&txn), vec![a, b, c]);

        fragment.remove_range(&mut txn, 1, 1).unwrap();
        assert_eq!(a.next_sibling(&txn), Some(c));
        assert_eq!(
            fragment.insert_after(&mut txn, Some(&b), XmlTextPrelim::new("x")),
            Err(Error::InvalidAnchor)
        );
        let first = fragment.insert_after(&mut txn, None, XmlTextPrelim::new("0")).unwrap();
        assert_eq!(fragment.first_child(&txn), Some(first));
    }

    #[test]
    fn formatted_text_renders_as_tags() {
        let mut doc = Doc::with_client_id(1);
        let fragment = doc.get_or_insert_xml_fragment("f");
        let mut txn = doc.transact_mut();
        let text = fragment.push_back(&mut txn, XmlTextPrelim::new("hello")).as_text().unwrap();
        let link = Any::from(HashMap::from([("href".to_string(), Any::from("x"))]));
        text.format(&mut txn, 0, 2, Attrs::from([(Arc::from("b"), Any::Bool(true)), (Arc::from("a"), link)]))
            .unwrap();
        assert_eq!(text.get_string(&txn), "<a href=\"x\"><b>he</b></a>llo");
        assert_eq!(Text::get_string(&text, &txn), "hello");
    }

    #[test]
    fn moved_element_keeps_subtree() {
        let mut doc = Doc::with_client_id(1);
        let fragment = doc.get_or_insert_xml_fragment("f");
        let mut txn = doc.transact_mut();
        fragment.push_back(&mut txn, XmlTextPrelim::new("t"));
        let ul = XmlElementPrelim::new("ul", [XmlIn::from(XmlElementPrelim::empty("li"))]).with_attribute("id", "l");
        fragment.push_back(&mut txn, ul);
        fragment.move_to(&mut txn, 1, 0).unwrap();
        assert_eq!(fragment.get_string(&txn), "<ul id=\"l\"><li></li></ul>t");
    }
}
