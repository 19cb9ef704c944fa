// created = "2026-10-17"
// modified = "2026-10-17"

//! Decoded updates and the block writer that produces them.
//!
//! An update lists, per client, a run of blocks with consecutive clocks,
//! followed by a delete set. Blocks carry everything needed to integrate
//! them on another replica: their origins, their parent (a root name or the
//! id of the item holding a nested type) and their content.

use std::collections::VecDeque;
use std::sync::Arc;

use rustc_hash::FxHashMap;

use crate::any::Any;
use crate::crdt::branch::TypeRef;
use crate::crdt::item::{
    CONTENT_ANY, CONTENT_DELETED, CONTENT_EMBED, CONTENT_FORMAT, CONTENT_STRING, CONTENT_TYPE, Content,
    ItemPtr, char_to_byte,
};
use crate::crdt::primitives::clock::StateVector;
use crate::crdt::primitives::id::{ClientId, Id};
use crate::crdt::primitives::id_set::DeleteSet;
use crate::crdt::store::Store;
use crate::error::DecodeError;
use crate::updates::decoder::{Decoder, DecoderV1, DecoderV2};
use crate::updates::encoder::Encoder;

const HAS_ORIGIN: u8 = 0x80;
const HAS_RIGHT_ORIGIN: u8 = 0x40;
const HAS_PARENT_SUB: u8 = 0x20;
const CONTENT_MASK: u8 = 0x1f;

// ============================================================================
// Decoded blocks
// ============================================================================

/// Block content as it appears on the wire. Nested types are described by
/// their type reference until integration creates their branch.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum Payload {
    Any(Vec<Any>),
    String(String),
    Embed(Any),
    Format(Arc<str>, Any),
    Type(TypeRef),
    Deleted(u32),
}

impl Payload {
    pub fn len(&self) -> u32 {
        return match self {
            Payload::Any(values) => values.len() as u32,
            Payload::String(s) => s.chars().count() as u32,
            Payload::Deleted(len) => *len,
            Payload::Embed(_) | Payload::Format(_, _) | Payload::Type(_) => 1,
        };
    }

    /// Drop the first `offset` units.
    pub fn trim_front(&mut self, offset: u32) {
        match self {
            Payload::Any(values) => {
                values.drain(..offset as usize);
            }
            Payload::String(s) => {
                let at = char_to_byte(s, offset);
                s.drain(..at);
            }
            Payload::Deleted(len) => *len -= offset,
            Payload::Embed(_) | Payload::Format(_, _) | Payload::Type(_) => {}
        }
    }

    fn decode<'a, D: Decoder<'a>>(decoder: &mut D, content_ref: u8) -> Result<Payload, DecodeError> {
        let payload = match content_ref {
            CONTENT_DELETED => Payload::Deleted(decoder.read_len()?),
            CONTENT_STRING => Payload::String(decoder.read_string()?.to_owned()),
            CONTENT_EMBED => Payload::Embed(decoder.read_any()?),
            CONTENT_FORMAT => {
                let key = decoder.read_key()?;
                let value = decoder.read_any()?;
                Payload::Format(key, value)
            }
            CONTENT_TYPE => Payload::Type(TypeRef::decode(decoder)?),
            CONTENT_ANY => {
                let len = decoder.read_len()?;
                let mut values = Vec::with_capacity(len.min(1024) as usize);
                for _ in 0..len {
                    values.push(decoder.read_any()?);
                }
                Payload::Any(values)
            }
            other => return Err(DecodeError::UnknownContent(other)),
        };
        return Ok(payload);
    }
}

/// Where a block is attached.
#[derive(Clone, Debug, PartialEq)]
pub(crate) enum ParentRef {
    /// A root type, by name.
    Root(Arc<str>),
    /// The nested type held by the item with this id.
    Item(Id),
    /// Same parent as the block's origin or right origin.
    Inherit,
}

#[derive(Clone, Debug, PartialEq)]
pub(crate) struct Block {
    pub id: Id,
    pub origin: Option<Id>,
    pub right_origin: Option<Id>,
    pub parent: ParentRef,
    pub parent_sub: Option<Arc<str>>,
    pub payload: Payload,
}

impl Block {
    pub fn len(&self) -> u32 {
        return self.payload.len();
    }

    /// Ids that must be integrated before this block.
    pub fn dependencies(&self) -> impl Iterator<Item = Id> + '_ {
        let parent = match &self.parent {
            ParentRef::Item(id) => Some(*id),
            _ => None,
        };
        return self.origin.into_iter().chain(self.right_origin).chain(parent);
    }

    /// Drop the first `offset` units, which are already integrated.
    pub fn trim_front(&mut self, offset: u32) {
        if offset == 0 {
            return;
        }
        self.payload.trim_front(offset);
        self.id = self.id.offset(offset);
        self.origin = Some(Id::new(self.id.client, self.id.clock - 1));
    }
}

// ============================================================================
// Update
// ============================================================================

/// A decoded update: blocks per client and a delete set.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Update {
    pub(crate) blocks: FxHashMap<ClientId, VecDeque<Block>>,
    pub(crate) delete_set: DeleteSet,
}

impl Update {
    pub fn new() -> Update {
        return Update::default();
    }

    pub fn decode_v1(bytes: &[u8]) -> Result<Update, DecodeError> {
        let mut decoder = DecoderV1::new(bytes)?;
        let update = Update::decode(&mut decoder)?;
        decoder.finish()?;
        return Ok(update);
    }

    pub fn decode_v2(bytes: &[u8]) -> Result<Update, DecodeError> {
        let mut decoder = DecoderV2::new(bytes)?;
        let update = Update::decode(&mut decoder)?;
        decoder.finish()?;
        return Ok(update);
    }

    pub fn decode<'a, D: Decoder<'a>>(decoder: &mut D) -> Result<Update, DecodeError> {
        let mut blocks: FxHashMap<ClientId, VecDeque<Block>> = FxHashMap::default();
        let clients = decoder.read_var_u32()?;
        for _ in 0..clients {
            let count = decoder.read_var_u32()?;
            let client = decoder.read_client()?;
            let mut clock = decoder.read_var_u32()?;
            let list = blocks.entry(client).or_default();
            for _ in 0..count {
                let block = decode_block(decoder, Id::new(client, clock))?;
                clock = clock.checked_add(block.len()).ok_or(DecodeError::VarIntOverflow)?;
                list.push_back(block);
            }
        }
        for list in blocks.values_mut() {
            list.make_contiguous().sort_by_key(|b| b.id.clock);
        }
        let delete_set = DeleteSet::decode(decoder)?;
        let update = Update { blocks, delete_set };
        update.check_local_parents()?;
        return Ok(update);
    }

    pub fn is_empty(&self) -> bool {
        return self.blocks.values().all(VecDeque::is_empty) && self.delete_set.is_empty();
    }

    pub fn delete_set(&self) -> &DeleteSet {
        return &self.delete_set;
    }

    /// Highest clock covered per client.
    pub fn state_vector(&self) -> StateVector {
        let mut sv = StateVector::new();
        for (client, list) in self.blocks.iter() {
            if let Some(last) = list.back() {
                sv.set_max(*client, last.id.clock + last.len());
            }
        }
        return sv;
    }

    /// Find the block that contains `id`.
    pub(crate) fn find_block(&self, id: &Id) -> Option<&Block> {
        let list = self.blocks.get(&id.client)?;
        return list.iter().find(|b| id.clock >= b.id.clock && id.clock < b.id.clock + b.len());
    }

    /// Blocks that name another block of this update as their parent must
    /// find a shared type there.
    fn check_local_parents(&self) -> Result<(), DecodeError> {
        for list in self.blocks.values() {
            for block in list {
                if let ParentRef::Item(parent) = &block.parent {
                    if let Some(holder) = self.find_block(parent) {
                        if !matches!(holder.payload, Payload::Type(_)) {
                            return Err(DecodeError::InvalidParent(block.id));
                        }
                    }
                }
            }
        }
        return Ok(());
    }

    /// Combine with another update. Blocks stay sorted by clock per client.
    pub(crate) fn merge(&mut self, other: Update) {
        for (client, list) in other.blocks {
            let target = self.blocks.entry(client).or_default();
            target.extend(list);
            target.make_contiguous().sort_by_key(|b| b.id.clock);
        }
        self.delete_set.merge(&other.delete_set);
    }
}

fn decode_block<'a, D: Decoder<'a>>(decoder: &mut D, id: Id) -> Result<Block, DecodeError> {
    let info = decoder.read_info()?;
    let content_ref = info & CONTENT_MASK;
    if !matches!(
        content_ref,
        CONTENT_DELETED | CONTENT_STRING | CONTENT_EMBED | CONTENT_FORMAT | CONTENT_TYPE | CONTENT_ANY
    ) {
        return Err(DecodeError::UnknownContent(content_ref));
    }
    let origin = if info & HAS_ORIGIN != 0 { Some(decoder.read_left_id()?) } else { None };
    let right_origin = if info & HAS_RIGHT_ORIGIN != 0 { Some(decoder.read_right_id()?) } else { None };
    let mut parent = ParentRef::Inherit;
    let mut parent_sub = None;
    if origin.is_none() && right_origin.is_none() {
        parent = if decoder.read_parent_info()? {
            ParentRef::Root(Arc::from(decoder.read_string()?))
        } else {
            ParentRef::Item(decoder.read_left_id()?)
        };
        if info & HAS_PARENT_SUB != 0 {
            parent_sub = Some(Arc::from(decoder.read_string()?));
        }
    }
    let payload = Payload::decode(decoder, content_ref)?;
    let block = Block { id, origin, right_origin, parent, parent_sub, payload };
    if block.len() == 0 {
        return Err(DecodeError::UnexpectedEof);
    }
    for dep in block.dependencies() {
        if dep.client == id.client && dep.clock >= id.clock {
            return Err(DecodeError::CausalityViolation(id));
        }
    }
    return Ok(block);
}

// ============================================================================
// Writing blocks from a store
// ============================================================================

/// Write every block the holder of `sv` is missing, then `ds`.
pub(crate) fn encode_diff<E: Encoder>(store: &Store, sv: &StateVector, ds: &DeleteSet, encoder: &mut E) {
    let mut clients = Vec::new();
    for client in store.clients() {
        let known = sv.get(&client);
        if store.get_state(&client) > known {
            let list: Vec<ItemPtr> = store.blocks_from(&client, known).collect();
            clients.push((client, known, list));
        }
    }
    encoder.write_var(clients.len() as u64);
    for (client, clock, list) in clients {
        let Some((&head, rest)) = list.split_first() else {
            continue;
        };
        let first = store.item(head);
        let offset = clock.saturating_sub(first.id.clock);
        encoder.write_var(list.len() as u64);
        encoder.write_client(client);
        encoder.write_var((first.id.clock + offset) as u64);
        write_item(store, head, offset, encoder);
        for ptr in rest {
            write_item(store, *ptr, 0, encoder);
        }
    }
    ds.encode(encoder);
}

fn write_item<E: Encoder>(store: &Store, ptr: ItemPtr, offset: u32, encoder: &mut E) {
    let item = store.item(ptr);
    let origin = if offset > 0 { Some(item.id.offset(offset - 1)) } else { item.origin };
    let mut info = item.content.ref_number();
    if origin.is_some() {
        info |= HAS_ORIGIN;
    }
    if item.right_origin.is_some() {
        info |= HAS_RIGHT_ORIGIN;
    }
    if item.parent_sub.is_some() {
        info |= HAS_PARENT_SUB;
    }
    encoder.write_info(info);
    if let Some(origin) = origin {
        encoder.write_left_id(&origin);
    }
    if let Some(right_origin) = item.right_origin {
        encoder.write_right_id(&right_origin);
    }
    if origin.is_none() && item.right_origin.is_none() {
        let branch = store.branch(item.parent);
        match (&branch.name, branch.item) {
            (_, Some(holder)) => {
                encoder.write_parent_info(false);
                encoder.write_left_id(&store.item(holder).id);
            }
            (Some(name), None) => {
                encoder.write_parent_info(true);
                encoder.write_string(name);
            }
            (None, None) => unreachable!("branch without name or holder"),
        }
        if let Some(sub) = &item.parent_sub {
            encoder.write_string(sub);
        }
    }
    match &item.content {
        Content::Deleted(len) => encoder.write_len(len - offset),
        Content::String(s) => encoder.write_string(&s[char_to_byte(s, offset)..]),
        Content::Embed(value) => encoder.write_any(value),
        Content::Format(key, value) => {
            encoder.write_key(key);
            encoder.write_any(value);
        }
        Content::Type(branch) => store.branch(*branch).type_ref.encode(encoder),
        Content::Any(values) => {
            encoder.write_len(values.len() as u32 - offset);
            for value in &values[offset as usize..] {
                encoder.write_any(value);
            }
        }
    }
}
