// created = "2026-10-17"
// modified = "2026-10-17"

//! Collaborative arrays.

use crate::any::Any;
use crate::crdt::branch::BranchPtr;
use crate::error::Error;
use crate::transaction::{ReadTxn, TransactionMut};
use crate::types::{inserted, In, Out, SharedRef};

/// Handle to an array shared type.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ArrayRef(BranchPtr);

impl SharedRef for ArrayRef {
    fn branch_ptr(&self) -> BranchPtr {
        return self.0;
    }
}

impl ArrayRef {
    pub(crate) fn from_branch(branch: BranchPtr) -> ArrayRef {
        return ArrayRef(branch);
    }

    pub fn len<T: ReadTxn>(&self, txn: &T) -> u32 {
        return txn.store().branch(self.0).len();
    }

    pub fn is_empty<T: ReadTxn>(&self, txn: &T) -> bool {
        return self.len(txn) == 0;
    }

    /// Insert `value` at `index`. Nested types are returned as live handles.
    pub fn insert<V: Into<In>>(&self, txn: &mut TransactionMut<'_>, index: i64, value: V) -> Result<Out, Error> {
        let index = super::normalize_index(index, self.len(&*txn))?;
        let ptr = super::insert_at(txn, self.0, index, value.into());
        return Ok(inserted(txn, ptr));
    }

    /// Insert several values at `index`, keeping their order.
    pub fn insert_range<I, V>(&self, txn: &mut TransactionMut<'_>, index: i64, values: I) -> Result<(), Error>
    where
        I: IntoIterator<Item = V>,
        V: Into<In>,
    {
        let index = super::normalize_index(index, self.len(&*txn))?;
        let mut left = super::split_at_index(txn, self.0, index);
        for value in values {
            left = Some(super::insert_value(txn, self.0, left, None, None, value.into()));
        }
        return Ok(());
    }

    pub fn push_back<V: Into<In>>(&self, txn: &mut TransactionMut<'_>, value: V) -> Out {
        let len = self.len(&*txn);
        let ptr = super::insert_at(txn, self.0, len, value.into());
        return inserted(txn, ptr);
    }

    pub fn push_front<V: Into<In>>(&self, txn: &mut TransactionMut<'_>, value: V) -> Out {
        let ptr = super::insert_at(txn, self.0, 0, value.into());
        return inserted(txn, ptr);
    }

    pub fn remove_range(&self, txn: &mut TransactionMut<'_>, index: i64, len: u32) -> Result<(), Error> {
        let start = super::normalize_range(index, len, self.len(&*txn))?;
        super::remove_range(txn, self.0, start, len);
        return Ok(());
    }

    pub fn remove(&self, txn: &mut TransactionMut<'_>, index: i64) -> Result<(), Error> {
        return self.remove_range(txn, index, 1);
    }

    /// The value at `index`. Negative indices count from the end.
    pub fn get<T: ReadTxn>(&self, txn: &T, index: i64) -> Option<Out> {
        let len = self.len(txn);
        let index = super::normalize_index(index, len).ok().filter(|i| *i < len)?;
        return super::list_get(txn.store(), self.0, index);
    }

    pub fn iter<T: ReadTxn>(&self, txn: &T) -> impl Iterator<Item = Out> {
        return super::list_values(txn.store(), self.0).into_iter();
    }

    pub fn to_json<T: ReadTxn>(&self, txn: &T) -> Any {
        let values: Vec<Any> = self.iter(txn).map(|value| value.to_json(txn)).collect();
        return Any::from(values);
    }

    /// Move the element at `source` so that it ends up in front of the
    /// element currently at `target`.
    pub fn move_to(&self, txn: &mut TransactionMut<'_>, source: u32, target: u32) -> Result<(), Error> {
        return super::move_to(txn, self.0, source, target);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::doc::Doc;
    use crate::types::map::MapRef;
    use crate::types::text::{Text, TextPrelim};
    use std::collections::HashMap;

    fn numbers<T: ReadTxn>(array: &ArrayRef, txn: &T) -> Vec<Any> {
        return array.iter(txn).filter_map(|v| v.as_any().cloned()).collect();
    }

    #[test]
    fn insert_get_remove() {
        let mut doc = Doc::with_client_id(1);
        let array = doc.get_or_insert_array("a");
        let mut txn = doc.transact_mut();
        array.insert_range(&mut txn, 0, [1, 2, 3]).unwrap();
        array.push_front(&mut txn, 0);
        array.push_back(&mut txn, 4);
        assert_eq!(numbers(&array, &txn), vec![Any::from(0), Any::from(1), Any::from(2), Any::from(3), Any::from(4)]);
        assert_eq!(array.get(&txn, -1), Some(Out::Any(Any::from(4))));
        assert_eq!(array.get(&txn, 5), None);
        array.remove_range(&mut txn, 1, 3).unwrap();
        assert_eq!(numbers(&array, &txn), vec![Any::from(0), Any::from(4)]);
        assert!(array.remove_range(&mut txn, 1, 2).is_err());
    }

    #[test]
    fn nested_types_are_live() {
        let mut doc = Doc::with_client_id(1);
        let array = doc.get_or_insert_array("a");
        let mut txn = doc.transact_mut();
        let Out::Text(text) = array.push_back(&mut txn, TextPrelim::new("ab")) else {
            panic!("expected text");
        };
        text.insert(&mut txn, 2, "c").unwrap();
        let nested = array.push_back(&mut txn, In::Map(HashMap::from([("k".to_string(), In::from(1))])));
        assert!(matches!(nested, Out::Map(_)));
        assert_eq!(
            array.to_json(&txn),
            Any::from(vec![Any::from("abc"), Any::from(HashMap::from([("k".to_string(), Any::from(1))]))])
        );
    }

    #[test]
    fn move_reorders_and_copies() {
        let mut doc = Doc::with_client_id(1);
        let array = doc.get_or_insert_array("a");
        let mut txn = doc.transact_mut();
        array.insert_range(&mut txn, 0, ["a", "b", "c"]).unwrap();
        array.move_to(&mut txn, 0, 3).unwrap();
        assert_eq!(numbers(&array, &txn), vec![Any::from("b"), Any::from("c"), Any::from("a")]);
        array.move_to(&mut txn, 2, 0).unwrap();
        assert_eq!(numbers(&array, &txn), vec![Any::from("a"), Any::from("b"), Any::from("c")]);
        assert!(array.move_to(&mut txn, 3, 0).is_err());

        let map = array.push_back(&mut txn, In::Map(HashMap::from([("x".to_string(), In::from(true))])));
        assert!(matches!(map, Out::Map(_)));
        array.move_to(&mut txn, 3, 0).unwrap();
        let Some(Out::Map(moved)) = array.get(&txn, 0) else {
            panic!("expected map");
        };
        assert_eq!(MapRef::get(&moved, &txn, "x"), Some(Out::Any(Any::Bool(true))));
    }
}
