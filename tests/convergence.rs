// created = "2026-10-17"
// modified = "2026-10-17"

//! Replicas that exchange updates end up with the same content, whatever
//! the order of edits and deliveries.

use std::collections::HashMap;
use std::sync::{Arc, Mutex};

use proptest::prelude::*;
use rand::rngs::StdRng;
use rand::seq::SliceRandom;
use rand::{Rng, SeedableRng};
use tandem::undo::{self, UndoManager};
use tandem::{
    Any, ArrayRef, Attrs, Doc, In, ManualClock, MapRef, Out, Subscription, Text, TextPrelim, TextRef, Update,
    XmlElementPrelim, XmlFragment, XmlFragmentRef, XmlIn, XmlOut, XmlTextPrelim,
};

// =============================================================================
// Test helpers
// =============================================================================

struct Replica {
    doc: Doc,
    text: TextRef,
    array: ArrayRef,
    map: MapRef,
    xml: XmlFragmentRef,
}

impl Replica {
    fn new(client_id: u64) -> Replica {
        let mut doc = Doc::with_client_id(client_id);
        let text = doc.get_or_insert_text("text");
        let array = doc.get_or_insert_array("array");
        let map = doc.get_or_insert_map("map");
        let xml = doc.get_or_insert_xml_fragment("xml");
        return Replica { doc, text, array, map, xml };
    }

    fn snapshot(&self) -> (Vec<tandem::Delta>, Any, Any, String) {
        let txn = self.doc.transact();
        return (
            self.text.to_delta(&txn),
            self.array.to_json(&txn),
            self.map.to_json(&txn),
            self.xml.get_string(&txn),
        );
    }
}

/// Send `to` whatever it is missing from `from`.
fn sync(from: &Replica, to: &mut Replica, v2: bool) {
    if v2 {
        let sv = to.doc.encode_state_vector_v2();
        let update = from.doc.encode_state_as_update_v2(Some(&sv)).unwrap();
        to.doc.apply_update_v2(&update).unwrap();
    } else {
        let sv = to.doc.encode_state_vector_v1();
        let update = from.doc.encode_state_as_update_v1(Some(&sv)).unwrap();
        to.doc.apply_update_v1(&update).unwrap();
    }
}

fn sync_all(replicas: &mut [Replica]) {
    for i in 0..replicas.len() {
        for j in 0..replicas.len() {
            if i == j {
                continue;
            }
            let (from, to) = pair(replicas, i, j);
            sync(from, to, (i + j) % 2 == 0);
        }
    }
}

/// Everything `from` has that `to` lacks, applied as a remote transaction.
fn deliver(from: &Doc, to: &mut Doc) {
    let sv = to.encode_state_vector_v1();
    let bytes = from.encode_state_as_update_v1(Some(&sv)).unwrap();
    let update = Update::decode_v1(&bytes).unwrap();
    to.transact_mut_with("remote").apply_update(update).unwrap();
}

/// Updates emitted by a document, one per transaction, in both encodings.
#[derive(Default)]
struct Recorded {
    v1: Vec<Vec<u8>>,
    v2: Vec<Vec<u8>>,
}

fn record(doc: &Doc) -> (Arc<Mutex<Recorded>>, [Subscription; 2]) {
    let recorded: Arc<Mutex<Recorded>> = Arc::default();
    let (v1, v2) = (recorded.clone(), recorded.clone());
    let subs = [
        doc.observe_update_v1(move |e| v1.lock().unwrap().v1.push(e.update.clone())),
        doc.observe_update_v2(move |e| v2.lock().unwrap().v2.push(e.update.clone())),
    ];
    return (recorded, subs);
}

fn pair(replicas: &mut [Replica], from: usize, to: usize) -> (&Replica, &mut Replica) {
    if from < to {
        let (left, right) = replicas.split_at_mut(to);
        return (&left[from], &mut right[0]);
    }
    let (left, right) = replicas.split_at_mut(from);
    return (&right[0], &mut left[to]);
}

#[derive(Clone, Debug)]
enum EditOp {
    InsertText { pos_pct: f64, content: String },
    DeleteText { pos_pct: f64, len_pct: f64 },
    FormatText { pos_pct: f64, len_pct: f64, bold: bool },
    PushArray { front: bool, value: i32 },
    RemoveArray { pos_pct: f64 },
    SetKey { key: u8, value: i32 },
    RemoveKey { key: u8 },
    SetNested { key: u8, value: i32 },
    AppendNestedText { content: String },
    InsertXml { pos_pct: f64, tag: u8, content: String },
    RemoveXml { pos_pct: f64 },
    SetXmlAttribute { pos_pct: f64, value: u8 },
    EditXmlText { pos_pct: f64, content: String },
}

fn arbitrary_edit_op() -> impl Strategy<Value = EditOp> {
    prop_oneof![
        4 => (0.0..=1.0f64, "[a-z]{1,6}")
            .prop_map(|(pos_pct, content)| EditOp::InsertText { pos_pct, content }),
        2 => (0.0..=1.0f64, 0.0..=0.5f64)
            .prop_map(|(pos_pct, len_pct)| EditOp::DeleteText { pos_pct, len_pct }),
        1 => (0.0..=1.0f64, 0.0..=0.5f64, any::<bool>())
            .prop_map(|(pos_pct, len_pct, bold)| EditOp::FormatText { pos_pct, len_pct, bold }),
        2 => (any::<bool>(), -100..100i32).prop_map(|(front, value)| EditOp::PushArray { front, value }),
        1 => (0.0..=1.0f64).prop_map(|pos_pct| EditOp::RemoveArray { pos_pct }),
        2 => (0..4u8, -100..100i32).prop_map(|(key, value)| EditOp::SetKey { key, value }),
        1 => (0..4u8).prop_map(|key| EditOp::RemoveKey { key }),
        1 => (0..3u8, -100..100i32).prop_map(|(key, value)| EditOp::SetNested { key, value }),
        1 => "[a-z]{1,4}".prop_map(|content| EditOp::AppendNestedText { content }),
        2 => (0.0..=1.0f64, 0..3u8, "[a-z]{1,4}")
            .prop_map(|(pos_pct, tag, content)| EditOp::InsertXml { pos_pct, tag, content }),
        1 => (0.0..=1.0f64).prop_map(|pos_pct| EditOp::RemoveXml { pos_pct }),
        1 => (0.0..=1.0f64, any::<u8>()).prop_map(|(pos_pct, value)| EditOp::SetXmlAttribute { pos_pct, value }),
        1 => (0.0..=1.0f64, "[a-z]{1,4}").prop_map(|(pos_pct, content)| EditOp::EditXmlText { pos_pct, content }),
    ]
}

fn scaled(pct: f64, len: u32) -> u32 {
    return ((pct * len as f64) as u32).min(len);
}

fn apply_edit(replica: &mut Replica, op: &EditOp) {
    let Replica { doc, text, array, map, xml } = replica;
    let mut txn = doc.transact_mut();
    match op {
        EditOp::InsertText { pos_pct, content } => {
            let pos = scaled(*pos_pct, text.len(&txn));
            text.insert(&mut txn, pos as i64, content).unwrap();
        }
        EditOp::DeleteText { pos_pct, len_pct } => {
            let len = text.len(&txn);
            let start = scaled(*pos_pct, len);
            let count = scaled(*len_pct, len - start);
            text.remove_range(&mut txn, start as i64, count).unwrap();
        }
        EditOp::FormatText { pos_pct, len_pct, bold } => {
            let len = text.len(&txn);
            let start = scaled(*pos_pct, len);
            let count = scaled(*len_pct, len - start);
            let value = if *bold { Any::Bool(true) } else { Any::Null };
            let attrs = Attrs::from([(Arc::from("bold"), value)]);
            text.format(&mut txn, start as i64, count, attrs).unwrap();
        }
        EditOp::PushArray { front: true, value } => {
            array.push_front(&mut txn, *value);
        }
        EditOp::PushArray { front: false, value } => {
            array.push_back(&mut txn, *value);
        }
        EditOp::RemoveArray { pos_pct } => {
            let len = array.len(&txn);
            if len > 0 {
                let pos = scaled(*pos_pct, len - 1);
                array.remove(&mut txn, pos as i64).unwrap();
            }
        }
        EditOp::SetKey { key, value } => {
            map.insert(&mut txn, format!("k{key}"), *value);
        }
        EditOp::RemoveKey { key } => {
            map.remove(&mut txn, &format!("k{key}"));
        }
        EditOp::SetNested { key, value } => {
            if let Some(Out::Map(nested)) = map.get(&txn, "nested") {
                nested.insert(&mut txn, format!("n{key}"), *value);
            } else {
                let entries = HashMap::from([(format!("n{key}"), In::from(*value))]);
                map.insert(&mut txn, "nested", In::Map(entries));
            }
        }
        EditOp::AppendNestedText { content } => {
            let last = array.len(&txn).checked_sub(1).and_then(|i| array.get(&txn, i as i64));
            if let Some(Out::Text(nested)) = last {
                let end = nested.len(&txn);
                nested.insert(&mut txn, end as i64, content).unwrap();
            } else {
                array.push_back(&mut txn, TextPrelim::new(content));
            }
        }
        EditOp::InsertXml { pos_pct, tag, content } => {
            let pos = scaled(*pos_pct, xml.len(&txn));
            let node = XmlElementPrelim::new(&format!("e{tag}"), [XmlIn::from(XmlTextPrelim::new(content))]);
            xml.insert(&mut txn, pos as i64, node).unwrap();
        }
        EditOp::RemoveXml { pos_pct } => {
            let len = xml.len(&txn);
            if len > 0 {
                xml.remove_range(&mut txn, scaled(*pos_pct, len - 1) as i64, 1).unwrap();
            }
        }
        EditOp::SetXmlAttribute { pos_pct, value } => {
            let len = xml.len(&txn);
            if len > 0 {
                if let Some(XmlOut::Element(element)) = xml.get(&txn, scaled(*pos_pct, len - 1)) {
                    element.insert_attribute(&mut txn, "v", &value.to_string());
                }
            }
        }
        EditOp::EditXmlText { pos_pct, content } => {
            let len = xml.len(&txn);
            let element = match xml.get(&txn, scaled(*pos_pct, len.saturating_sub(1))) {
                Some(XmlOut::Element(element)) if len > 0 => element,
                _ => return,
            };
            if let Some(XmlOut::Text(inner)) = element.get(&txn, 0) {
                inner.insert(&mut txn, 0, content).unwrap();
            }
        }
    }
}

#[derive(Clone, Debug)]
enum UndoStep {
    Edit { replica: usize, op: EditOp },
    Undo,
    Redo,
    Deliver { to_first: bool },
}

fn arbitrary_undo_step() -> impl Strategy<Value = UndoStep> {
    prop_oneof![
        6 => (0..2usize, arbitrary_edit_op()).prop_map(|(replica, op)| UndoStep::Edit { replica, op }),
        2 => Just(UndoStep::Undo),
        1 => Just(UndoStep::Redo),
        2 => any::<bool>().prop_map(|to_first| UndoStep::Deliver { to_first }),
    ]
}

// =============================================================================
// Properties
// =============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(64))]

    /// Three replicas editing concurrently, syncing partially between rounds,
    /// agree once everything has been exchanged.
    #[test]
    fn replicas_converge(
        rounds in prop::collection::vec(
            (prop::collection::vec((0..3usize, arbitrary_edit_op()), 1..12), 0..3usize, 0..3usize),
            1..6,
        ),
    ) {
        let mut replicas = vec![Replica::new(1), Replica::new(2), Replica::new(3)];
        for (edits, from, to) in &rounds {
            for (target, op) in edits {
                apply_edit(&mut replicas[*target], op);
            }
            if from != to {
                let (source, dest) = pair(&mut replicas, *from, *to);
                sync(source, dest, false);
            }
        }
        sync_all(&mut replicas);

        let expected = replicas[0].snapshot();
        for replica in &replicas[1..] {
            prop_assert_eq!(&replica.snapshot(), &expected);
        }
    }

    /// Delivering the same updates twice or in reverse order changes nothing.
    #[test]
    fn redelivery_is_idempotent(
        first in prop::collection::vec(arbitrary_edit_op(), 1..10),
        second in prop::collection::vec(arbitrary_edit_op(), 1..10),
    ) {
        let mut source = Replica::new(7);
        let mut updates = Vec::new();
        for batch in [&first, &second] {
            let before = source.doc.encode_state_vector_v1();
            for op in batch {
                apply_edit(&mut source, op);
            }
            updates.push(source.doc.encode_state_as_update_v1(Some(&before)).unwrap());
        }

        let mut target = Replica::new(8);
        target.doc.apply_update_v1(&updates[1]).unwrap();
        target.doc.apply_update_v1(&updates[0]).unwrap();
        target.doc.apply_update_v1(&updates[1]).unwrap();
        target.doc.apply_update_v1(&updates[0]).unwrap();
        prop_assert_eq!(target.snapshot(), source.snapshot());
        prop_assert_eq!(target.doc.state_vector(), source.doc.state_vector());
    }

    /// A replica fed every transaction of every peer, shuffled and in mixed
    /// encodings, ends up where the peers do.
    #[test]
    fn shuffled_transactions_converge(
        edits in prop::collection::vec((0..3usize, arbitrary_edit_op(), any::<bool>()), 1..40),
        seed in any::<u64>(),
    ) {
        let mut replicas = vec![Replica::new(1), Replica::new(2), Replica::new(3)];
        let recorders: Vec<_> = replicas.iter().map(|r| record(&r.doc)).collect();
        for (target, op, share) in &edits {
            apply_edit(&mut replicas[*target], op);
            if *share {
                let next = (*target + 1) % replicas.len();
                let (source, dest) = pair(&mut replicas, *target, next);
                sync(source, dest, false);
            }
        }

        let mut updates = Vec::new();
        for (recorded, _) in &recorders {
            let recorded = recorded.lock().unwrap();
            prop_assert_eq!(recorded.v1.len(), recorded.v2.len());
            updates.extend(recorded.v1.iter().cloned().zip(recorded.v2.iter().cloned()));
        }
        let mut rng = StdRng::seed_from_u64(seed);
        updates.shuffle(&mut rng);

        let mut target = Replica::new(9);
        for (v1, v2) in &updates {
            if rng.r#gen() {
                target.doc.apply_update_v2(v2).unwrap();
            } else {
                target.doc.apply_update_v1(v1).unwrap();
            }
        }
        sync_all(&mut replicas);
        prop_assert_eq!(target.snapshot(), replicas[0].snapshot());
        prop_assert_eq!(target.doc.state_vector(), replicas[0].doc.state_vector());
    }

    /// Undo and redo on one replica interleaved with a peer's concurrent
    /// edits still converge, and undoing everything leaves both in step.
    #[test]
    fn undo_with_concurrent_remote_edits(steps in prop::collection::vec(arbitrary_undo_step(), 1..30)) {
        let clock = ManualClock::new(0);
        let mut replicas = vec![Replica::new(1), Replica::new(2)];
        let options = undo::Options { clock: Arc::new(clock.clone()), ..undo::Options::default() };
        let manager = UndoManager::new(&replicas[0].doc, &replicas[0].text, options).unwrap();
        manager.expand_scope(&replicas[0].doc, &replicas[0].array).unwrap();
        manager.expand_scope(&replicas[0].doc, &replicas[0].map).unwrap();
        manager.expand_scope(&replicas[0].doc, &replicas[0].xml).unwrap();
        manager.exclude_origin("remote");

        for step in &steps {
            match step {
                UndoStep::Edit { replica, op } => {
                    apply_edit(&mut replicas[*replica], op);
                    manager.stop_capturing();
                }
                UndoStep::Undo => {
                    manager.undo(&mut replicas[0].doc);
                }
                UndoStep::Redo => {
                    manager.redo(&mut replicas[0].doc);
                }
                UndoStep::Deliver { to_first } => {
                    let (from, to) = if *to_first { (1, 0) } else { (0, 1) };
                    let (source, dest) = pair(&mut replicas, from, to);
                    deliver(&source.doc, &mut dest.doc);
                }
            }
        }
        sync_all(&mut replicas);
        prop_assert_eq!(replicas[1].snapshot(), replicas[0].snapshot());

        while manager.undo(&mut replicas[0].doc) {}
        sync_all(&mut replicas);
        prop_assert_eq!(replicas[1].snapshot(), replicas[0].snapshot());
    }

    /// Concurrent writes to one key keep the write with the highest clock,
    /// the larger client id breaking ties.
    #[test]
    fn map_keeps_the_latest_write(pads in prop::collection::vec(0..6u32, 2..5)) {
        let mut replicas: Vec<Replica> = (1..=pads.len() as u64).map(Replica::new).collect();
        for (i, replica) in replicas.iter_mut().enumerate() {
            let mut txn = replica.doc.transact_mut();
            for n in 0..pads[i] {
                replica.map.insert(&mut txn, "pad", n as i32);
            }
            replica.map.insert(&mut txn, "k", i as i32);
        }
        sync_all(&mut replicas);

        let winner = (0..pads.len()).max_by_key(|i| (pads[*i], *i)).unwrap();
        for replica in &replicas {
            let value = replica.map.get(&replica.doc.transact(), "k");
            prop_assert_eq!(value, Some(Out::Any(Any::from(winner as i32))));
        }
    }
}

// =============================================================================
// Deterministic traces
// =============================================================================

#[test]
fn seeded_trace_converges() {
    let mut rng = StdRng::seed_from_u64(0x7a4d_e111);
    let mut replicas: Vec<Replica> = (1..=4).map(Replica::new).collect();

    for _ in 0..300 {
        let target = rng.gen_range(0..replicas.len());
        let op = match rng.gen_range(0..5) {
            0 | 1 => EditOp::InsertText {
                pos_pct: rng.r#gen(),
                content: (0..rng.gen_range(1..4)).map(|_| rng.gen_range('a'..='z')).collect(),
            },
            2 => EditOp::DeleteText { pos_pct: rng.r#gen(), len_pct: rng.gen_range(0.0..0.3) },
            3 => EditOp::PushArray { front: rng.r#gen(), value: rng.gen_range(0..10) },
            _ => EditOp::SetKey { key: rng.gen_range(0..3), value: rng.gen_range(0..10) },
        };
        apply_edit(&mut replicas[target], &op);

        if rng.gen_ratio(1, 8) {
            let from = rng.gen_range(0..replicas.len());
            let to = rng.gen_range(0..replicas.len());
            if from != to {
                let (source, dest) = pair(&mut replicas, from, to);
                sync(source, dest, rng.r#gen());
            }
        }
    }
    sync_all(&mut replicas);

    let expected = replicas[0].snapshot();
    for replica in &replicas[1..] {
        assert_eq!(replica.snapshot(), expected);
    }
    let text = replicas[0].text.get_string(&replicas[0].doc.transact());
    assert_eq!(text.chars().count() as u32, replicas[0].text.len(&replicas[0].doc.transact()));
}

#[test]
fn concurrent_inserts_at_same_position_interleave_identically() {
    let mut a = Replica::new(1);
    let mut b = Replica::new(2);
    a.text.insert(&mut a.doc.transact_mut(), 0, "xy").unwrap();
    sync(&a, &mut b, false);

    a.text.insert(&mut a.doc.transact_mut(), 1, "A").unwrap();
    b.text.insert(&mut b.doc.transact_mut(), 1, "B").unwrap();
    sync(&a, &mut b, true);
    sync(&b, &mut a, false);

    let left = a.text.get_string(&a.doc.transact());
    let right = b.text.get_string(&b.doc.transact());
    assert_eq!(left, right);
    assert!(left == "xABy" || left == "xBAy");
}
