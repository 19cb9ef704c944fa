// created = "2026-10-17"
// modified = "2026-10-17"

//! Branches: the nodes that own items.
//!
//! Every shared type (root or nested) is a branch. A branch holds a
//! sequence of items starting at `start`, and a map from keys to the item
//! currently winning that key. Which half is used depends on the type: text
//! and arrays use the sequence, maps use the map, XML elements use both
//! (children and attributes).

use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::crdt::btree_list::BTreeList;
use crate::crdt::item::ItemPtr;
use crate::error::DecodeError;
use crate::updates::decoder::Decoder;
use crate::updates::encoder::Encoder;

/// Handle to a shared type inside a document. Handles are only valid for
/// the document that produced them.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct BranchPtr {
    pub(crate) store: u32,
    pub(crate) index: u32,
}

/// The kind of a shared type.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TypeRef {
    Array,
    Map,
    Text,
    XmlElement(Arc<str>),
    XmlFragment,
    XmlText,
    /// A root that has only been seen through remote updates and not yet
    /// requested locally.
    Undefined,
}

const TYPE_ARRAY: u8 = 0;
const TYPE_MAP: u8 = 1;
const TYPE_TEXT: u8 = 2;
const TYPE_XML_ELEMENT: u8 = 3;
const TYPE_XML_FRAGMENT: u8 = 4;
const TYPE_XML_TEXT: u8 = 6;
const TYPE_UNDEFINED: u8 = 15;

impl TypeRef {
    pub fn tag(&self) -> u8 {
        return match self {
            TypeRef::Array => TYPE_ARRAY,
            TypeRef::Map => TYPE_MAP,
            TypeRef::Text => TYPE_TEXT,
            TypeRef::XmlElement(_) => TYPE_XML_ELEMENT,
            TypeRef::XmlFragment => TYPE_XML_FRAGMENT,
            TypeRef::XmlText => TYPE_XML_TEXT,
            TypeRef::Undefined => TYPE_UNDEFINED,
        };
    }

    pub fn encode<E: Encoder>(&self, encoder: &mut E) {
        encoder.write_type_ref(self.tag());
        if let TypeRef::XmlElement(name) = self {
            encoder.write_key(name);
        }
    }

    pub fn decode<'a, D: Decoder<'a>>(decoder: &mut D) -> Result<TypeRef, DecodeError> {
        let tag = decoder.read_type_ref()?;
        return match tag {
            TYPE_ARRAY => Ok(TypeRef::Array),
            TYPE_MAP => Ok(TypeRef::Map),
            TYPE_TEXT => Ok(TypeRef::Text),
            TYPE_XML_ELEMENT => Ok(TypeRef::XmlElement(decoder.read_key()?)),
            TYPE_XML_FRAGMENT => Ok(TypeRef::XmlFragment),
            TYPE_XML_TEXT => Ok(TypeRef::XmlText),
            TYPE_UNDEFINED => Ok(TypeRef::Undefined),
            other => Err(DecodeError::UnknownTypeRef(other)),
        };
    }
}

#[derive(Debug)]
pub(crate) struct Branch {
    pub type_ref: TypeRef,
    /// First item of the sequence, including deleted ones.
    pub start: Option<ItemPtr>,
    /// Winning item per key, which may be deleted.
    pub map: FxHashMap<Arc<str>, ItemPtr>,
    /// The item that holds this branch, `None` for roots.
    pub item: Option<ItemPtr>,
    /// Root name, `None` for nested types.
    pub name: Option<Arc<str>>,
    /// Sequence items in order, weighted by visible units.
    pub index: BTreeList<ItemPtr>,
}

impl Branch {
    pub fn new(type_ref: TypeRef) -> Branch {
        return Branch {
            type_ref,
            start: None,
            map: FxHashMap::default(),
            item: None,
            name: None,
            index: BTreeList::new(),
        };
    }

    /// Number of visible units in the sequence.
    #[inline]
    pub fn len(&self) -> u32 {
        return self.index.total().units;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::updates::decoder::DecoderV1;
    use crate::updates::encoder::EncoderV1;

    #[test]
    fn element_tag_travels_with_type_ref() {
        let mut enc = EncoderV1::new();
        TypeRef::XmlElement(Arc::from("div")).encode(&mut enc);
        let bytes = enc.to_vec();
        let mut dec = DecoderV1::new(&bytes).unwrap();
        assert_eq!(TypeRef::decode(&mut dec).unwrap(), TypeRef::XmlElement(Arc::from("div")));
    }

    #[test]
    fn unknown_type_ref_is_rejected() {
        let bytes = [9u8];
        let mut dec = DecoderV1::new(&bytes).unwrap();
        assert_eq!(TypeRef::decode(&mut dec), Err(DecodeError::UnknownTypeRef(9)));
    }
}
