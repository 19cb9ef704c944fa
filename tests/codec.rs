// created = "2026-10-17"
// modified = "2026-10-17"

//! Update and state vector encoding in both wire versions.

use std::sync::{Arc, Mutex};

use tandem::{
    Any, ArrayRef, DecodeError, Doc, Error, In, MapRef, Out, StateVector, Text, TextPrelim, Update, UpdateEvent,
};

fn sample_doc() -> Doc {
    let mut doc = Doc::with_client_id(11);
    let text = doc.get_or_insert_text("text");
    let array = doc.get_or_insert_array("array");
    let map = doc.get_or_insert_map("map");
    let mut txn = doc.transact_mut();
    text.insert(&mut txn, 0, "hello wörld").unwrap();
    text.remove_range(&mut txn, 5, 1).unwrap();
    array.push_back(&mut txn, 1);
    array.push_back(&mut txn, "two");
    array.push_back(&mut txn, vec![0u8, 1, 2]);
    array.push_back(&mut txn, TextPrelim::new("nested"));
    map.insert(&mut txn, "flag", true);
    map.insert(&mut txn, "none", Any::Null);
    map.insert(&mut txn, "list", In::Array(vec![In::from(1), In::from("x")]));
    drop(txn);
    return doc;
}

fn contents(doc: &mut Doc) -> (String, Any, Any) {
    let text = doc.get_or_insert_text("text");
    let array: ArrayRef = doc.get_or_insert_array("array");
    let map: MapRef = doc.get_or_insert_map("map");
    let txn = doc.transact();
    return (text.get_string(&txn), array.to_json(&txn), map.to_json(&txn));
}

#[test]
fn full_state_round_trips_in_both_versions() {
    let mut source = sample_doc();
    let expected = contents(&mut source);
    assert_eq!(expected.0, "hellowörld");

    let mut v1 = Doc::with_client_id(1);
    v1.apply_update_v1(&source.encode_state_as_update_v1(None).unwrap()).unwrap();
    assert_eq!(contents(&mut v1), expected);

    let mut v2 = Doc::with_client_id(2);
    v2.apply_update_v2(&source.encode_state_as_update_v2(None).unwrap()).unwrap();
    assert_eq!(contents(&mut v2), expected);
    assert_eq!(v2.state_vector(), source.state_vector());
}

#[test]
fn diff_against_state_vector_carries_only_missing_operations() {
    let source = sample_doc();
    let mut peer = Doc::with_client_id(2);
    peer.apply_update_v1(&source.encode_state_as_update_v1(None).unwrap()).unwrap();

    let sv = peer.encode_state_vector_v1();
    let diff = source.encode_state_as_update_v1(Some(&sv)).unwrap();
    let update = Update::decode_v1(&diff).unwrap();
    assert!(update.is_empty());

    let before = peer.state_vector();
    peer.apply_update_v1(&diff).unwrap();
    assert_eq!(peer.state_vector(), before);
}

#[test]
fn state_vectors_round_trip() {
    let doc = sample_doc();
    let sv = doc.state_vector();
    assert_eq!(StateVector::decode_v1(&doc.encode_state_vector_v1()).unwrap(), sv);
    assert_eq!(StateVector::decode_v2(&doc.encode_state_vector_v2()).unwrap(), sv);
    assert!(sv.get(&11) > 11);
    assert_eq!(sv.get(&12), 0);
}

#[test]
fn versions_are_not_interchangeable() {
    let doc = sample_doc();
    let v1 = doc.encode_state_as_update_v1(None).unwrap();
    let v2 = doc.encode_state_as_update_v2(None).unwrap();

    let mut target = Doc::with_client_id(2);
    assert_eq!(target.apply_update_v1(&v2), Err(Error::Decode(DecodeError::VersionMismatch)));
    assert_eq!(target.apply_update_v2(&v1), Err(Error::Decode(DecodeError::VersionMismatch)));
    assert!(target.state_vector().is_empty());
}

#[test]
fn malformed_updates_leave_the_document_untouched() {
    let source = sample_doc();
    let update = source.encode_state_as_update_v1(None).unwrap();

    let mut target = Doc::with_client_id(2);
    let text = target.get_or_insert_text("text");
    text.insert(&mut target.transact_mut(), 0, "mine").unwrap();
    let before = target.encode_state_as_update_v1(None).unwrap();

    for cut in [1, update.len() / 2, update.len() - 1] {
        assert!(target.apply_update_v1(&update[..cut]).is_err());
    }
    let mut trailing = update.clone();
    trailing.push(0);
    assert!(matches!(
        target.apply_update_v1(&trailing),
        Err(Error::Decode(DecodeError::TrailingBytes(_)))
    ));
    assert_eq!(target.encode_state_as_update_v1(None).unwrap(), before);
    assert_eq!(text.get_string(&target.transact()), "mine");
}

#[test]
fn out_of_order_updates_wait_for_their_dependencies() {
    let mut source = Doc::with_client_id(5);
    let text = source.get_or_insert_text("text");
    let updates: Arc<Mutex<Vec<UpdateEvent>>> = Arc::default();
    let sink = updates.clone();
    let _sub = source.observe_update_v2(move |e| sink.lock().unwrap().push(e.clone()));

    text.insert(&mut source.transact_mut(), 0, "abc").unwrap();
    text.insert(&mut source.transact_mut(), 3, "def").unwrap();
    text.remove_range(&mut source.transact_mut(), 1, 4).unwrap();
    let updates = updates.lock().unwrap().clone();
    assert_eq!(updates.len(), 3);

    let mut target = Doc::with_client_id(6);
    let remote = target.get_or_insert_text("text");
    target.apply_update_v2(&updates[2].update).unwrap();
    target.apply_update_v2(&updates[1].update).unwrap();
    assert_eq!(remote.get_string(&target.transact()), "");
    target.apply_update_v2(&updates[0].update).unwrap();
    assert_eq!(remote.get_string(&target.transact()), "af");
}

#[test]
fn nested_type_updates_follow_their_parent() {
    let mut source = Doc::with_client_id(5);
    let array = source.get_or_insert_array("array");
    let nested = array.push_back(&mut source.transact_mut(), TextPrelim::new("x"));
    let Out::Text(nested) = nested else {
        panic!("expected a text");
    };
    let base = source.encode_state_as_update_v1(None).unwrap();
    let sv = source.encode_state_vector_v1();
    nested.insert(&mut source.transact_mut(), 1, "y").unwrap();
    let child = source.encode_state_as_update_v1(Some(&sv)).unwrap();

    let mut target = Doc::with_client_id(6);
    target.apply_update_v1(&base).unwrap();
    target.apply_update_v1(&child).unwrap();
    let remote = target.get_or_insert_array("array");
    assert_eq!(remote.to_json(&target.transact()), Any::from(vec![Any::from("xy")]));
}

#[test]
fn any_values_survive_the_wire() {
    let mut source = Doc::with_client_id(3);
    let map = source.get_or_insert_map("map");
    let value = Any::from(serde_json::json!({
        "n": 1.5,
        "s": "text",
        "b": false,
        "list": [1, "two", null],
        "nested": { "deep": [true] }
    }));
    map.insert(&mut source.transact_mut(), "value", value.clone());
    map.insert(&mut source.transact_mut(), "big", Any::BigInt(1 << 60));

    for v2 in [false, true] {
        let mut target = Doc::with_client_id(4);
        if v2 {
            target.apply_update_v2(&source.encode_state_as_update_v2(None).unwrap()).unwrap();
        } else {
            target.apply_update_v1(&source.encode_state_as_update_v1(None).unwrap()).unwrap();
        }
        let remote = target.get_or_insert_map("map");
        let txn = target.transact();
        assert_eq!(remote.get(&txn, "value").and_then(|v| v.as_any().cloned()), Some(value.clone()));
        assert_eq!(remote.get(&txn, "big").and_then(|v| v.as_any().cloned()), Some(Any::BigInt(1 << 60)));
    }
}
