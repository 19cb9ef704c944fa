// created = "2026-10-17"
// modified = "2026-10-17"

//! Presence states shared by a small group of peers.

use std::sync::{Arc, Mutex};

use serde_json::json;
use tandem::{Awareness, AwarenessEvent, DecodeError, Error, ManualClock, Origin};

fn peers(clock: &ManualClock, ids: &[u64]) -> Vec<Awareness> {
    return ids.iter().map(|id| Awareness::with_clock(*id, Arc::new(clock.clone()))).collect();
}

/// Everyone receives everyone else's full state.
fn broadcast(peers: &mut [Awareness]) {
    let updates: Vec<Vec<u8>> = peers.iter().map(Awareness::encode_update).collect();
    for (i, peer) in peers.iter_mut().enumerate() {
        for (j, update) in updates.iter().enumerate() {
            if i != j {
                peer.apply_update(update).unwrap();
            }
        }
    }
}

#[test]
fn peers_agree_after_broadcast() {
    let clock = ManualClock::new(0);
    let mut group = peers(&clock, &[1, 2, 3]);
    group[0].set_local_state(json!({ "user": "ann" }));
    group[1].set_local_state(json!({ "user": "bo", "cursor": { "anchor": 3, "head": 5 } }));
    broadcast(&mut group);

    for peer in &group {
        assert_eq!(peer.clients(), vec![1, 2, 3]);
        assert_eq!(peer.state(1), Some(&json!({ "user": "ann" })));
        assert_eq!(peer.state(2).and_then(|s| s.pointer("/cursor/head")), Some(&json!(5)));
        assert_eq!(peer.state(3), Some(&json!({})));
    }
}

#[test]
fn stale_updates_are_ignored() {
    let clock = ManualClock::new(0);
    let mut group = peers(&clock, &[1, 2]);
    group[0].set_local_state(json!({ "v": 1 }));
    let old = group[0].encode_update();
    group[0].set_local_state(json!({ "v": 2 }));
    let new = group[0].encode_update();

    let event = group[1].apply_update(&new).unwrap();
    assert_eq!(event.added, vec![1]);
    let event = group[1].apply_update(&old).unwrap();
    assert!(event.is_empty());
    assert_eq!(group[1].state(1), Some(&json!({ "v": 2 })));
}

#[test]
fn leaving_peers_disappear_everywhere() {
    let clock = ManualClock::new(0);
    let mut group = peers(&clock, &[1, 2, 3]);
    broadcast(&mut group);

    let events: Arc<Mutex<Vec<AwarenessEvent>>> = Arc::default();
    let sink = events.clone();
    let _sub = group[2].on_update(move |e| sink.lock().unwrap().push(e.clone()));

    group[0].clean_local_state();
    let goodbye = group[0].encode_update_for(&[1]);
    group[1].apply_update(&goodbye).unwrap();
    group[2].apply_update(&goodbye).unwrap();

    assert_eq!(group[1].clients(), vec![2, 3]);
    assert_eq!(group[2].clients(), vec![2, 3]);
    let events = events.lock().unwrap();
    assert_eq!(events.len(), 1);
    assert_eq!(events[0].removed, vec![1]);
}

#[test]
fn silent_peers_time_out() {
    let clock = ManualClock::new(0);
    let mut group = peers(&clock, &[1, 2, 3]);
    broadcast(&mut group);

    clock.advance(10_000);
    group[1].set_local_state(json!({ "alive": true }));
    let refresh = group[1].encode_update_for(&[2]);
    group[2].apply_update(&refresh).unwrap();
    clock.advance(25_000);

    assert_eq!(group[2].remove_outdated_states(30_000), vec![1]);
    assert_eq!(group[2].clients(), vec![2, 3]);
    assert_eq!(group[2].local_state(), Some(&json!({})));
}

#[test]
fn truncated_updates_are_rejected() {
    let clock = ManualClock::new(0);
    let mut group = peers(&clock, &[1, 2]);
    group[0].set_local_state(json!({ "name": "a long enough name" }));
    let update = group[0].encode_update();

    let result = group[1].apply_update(&update[..update.len() - 3]);
    assert_eq!(result, Err(Error::Decode(DecodeError::UnexpectedEof)));
    assert_eq!(group[1].clients(), vec![2]);
}

#[test]
fn periodic_rebroadcasts_are_not_changes() {
    let clock = ManualClock::new(0);
    let mut group = peers(&clock, &[1, 2]);
    group[0].set_local_state(json!({ "user": "ann" }));
    broadcast(&mut group);

    let updates: Arc<Mutex<Vec<AwarenessEvent>>> = Arc::default();
    let changes: Arc<Mutex<Vec<AwarenessEvent>>> = Arc::default();
    let (u, c) = (updates.clone(), changes.clone());
    let _u = group[1].on_update(move |e| u.lock().unwrap().push(e.clone()));
    let _c = group[1].on_change(move |e| c.lock().unwrap().push(e.clone()));

    for _ in 0..3 {
        clock.advance(15_000);
        group[0].set_local_state(json!({ "user": "ann" }));
        let refresh = group[0].encode_update_for(&[1]);
        group[1].apply_update_with(&refresh, Some(Origin::from("relay"))).unwrap();
    }
    assert_eq!(group[1].remove_outdated_states(30_000), Vec::<u64>::new());

    let updates = updates.lock().unwrap();
    assert_eq!(updates.len(), 3);
    assert!(updates.iter().all(|e| e.origin == Some(Origin::from("relay"))));
    assert!(changes.lock().unwrap().is_empty());
}
