// created = "2026-10-17"
// modified = "2026-10-17"

//! Awareness: ephemeral per-client state such as cursors and user names.
//!
//! Each client owns one JSON state and a clock that it bumps on every
//! change. Updates carry `(client, clock, state)` triples and are applied
//! only when their clock is newer, so they can be broadcast freely and in
//! any order. A `null` state means the client went away. A remote peer can
//! never remove the local state; the local clock is bumped instead so the
//! next broadcast reasserts it.
//!
//! Two kinds of notification exist. [`Awareness::on_change`] fires when a
//! state was added, removed or now holds a different value.
//! [`Awareness::on_update`] fires on every accepted entry, including
//! heartbeats that only bump a clock and keep the same state.
//!
//! Wire format: a varint count, then per entry the client id and clock as
//! varints and the state as a length-prefixed JSON string.

use rustc_hash::FxHashMap;
use serde_json::Value;

use crate::crdt::primitives::clock::{Clock, SystemClock};
use crate::crdt::primitives::id::ClientId;
use crate::error::{DecodeError, Error};
use crate::observer::{Observer, Subscription};
use crate::transaction::Origin;
use crate::updates::varint::{write_string, write_var_u64, Cursor};
use std::sync::Arc;

/// Clients touched by one operation, by kind of change.
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct AwarenessEvent {
    pub added: Vec<ClientId>,
    pub updated: Vec<ClientId>,
    pub removed: Vec<ClientId>,
    /// Set by [`Awareness::apply_update_with`]. `None` for local changes.
    pub origin: Option<Origin>,
}

impl AwarenessEvent {
    pub fn is_empty(&self) -> bool {
        return self.added.is_empty() && self.updated.is_empty() && self.removed.is_empty();
    }
}

type AwarenessFn = dyn FnMut(&AwarenessEvent) + Send;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct MetaClock {
    clock: u32,
    last_updated: u64,
}

/// The awareness states known to one client.
pub struct Awareness {
    client_id: ClientId,
    states: FxHashMap<ClientId, Value>,
    meta: FxHashMap<ClientId, MetaClock>,
    clock: Arc<dyn Clock>,
    on_update: Observer<AwarenessFn>,
    on_change: Observer<AwarenessFn>,
}

impl Awareness {
    /// Starts with an empty object as the local state.
    pub fn new(client_id: ClientId) -> Awareness {
        return Awareness::with_clock(client_id, Arc::new(SystemClock));
    }

    pub fn with_clock(client_id: ClientId, clock: Arc<dyn Clock>) -> Awareness {
        let now = clock.now();
        let mut awareness = Awareness {
            client_id,
            states: FxHashMap::default(),
            meta: FxHashMap::default(),
            clock,
            on_update: Observer::new(),
            on_change: Observer::new(),
        };
        awareness.states.insert(client_id, Value::Object(Default::default()));
        awareness.meta.insert(client_id, MetaClock { clock: 0, last_updated: now });
        return awareness;
    }

    pub fn client_id(&self) -> ClientId {
        return self.client_id;
    }

    /// Clients with a state, sorted.
    pub fn clients(&self) -> Vec<ClientId> {
        let mut clients: Vec<ClientId> = self.states.keys().copied().collect();
        clients.sort_unstable();
        return clients;
    }

    pub fn state(&self, client: ClientId) -> Option<&Value> {
        return self.states.get(&client);
    }

    pub fn local_state(&self) -> Option<&Value> {
        return self.states.get(&self.client_id);
    }

    /// Called for every accepted entry. Refreshes that keep the same state
    /// are listed under `updated`.
    pub fn on_update<F>(&self, callback: F) -> Subscription
    where
        F: FnMut(&AwarenessEvent) + Send + 'static,
    {
        return self.on_update.subscribe(Box::new(callback));
    }

    /// Called only when a state was added, removed or replaced by a
    /// different value.
    pub fn on_change<F>(&self, callback: F) -> Subscription
    where
        F: FnMut(&AwarenessEvent) + Send + 'static,
    {
        return self.on_change.subscribe(Box::new(callback));
    }

    pub fn set_local_state(&mut self, state: Value) {
        let now = self.clock.now();
        let clock = self.meta.get(&self.client_id).map_or(0, |m| m.clock + 1);
        let previous = self.states.insert(self.client_id, state.clone());
        self.meta.insert(self.client_id, MetaClock { clock, last_updated: now });

        let mut update = AwarenessEvent::default();
        let mut change = AwarenessEvent::default();
        match previous {
            None => {
                update.added.push(self.client_id);
                change.added.push(self.client_id);
            }
            Some(previous) => {
                update.updated.push(self.client_id);
                if previous != state {
                    change.updated.push(self.client_id);
                }
            }
        }
        self.emit(&update, &change);
    }

    /// Mark the local client as gone.
    pub fn clean_local_state(&mut self) {
        let client = self.client_id;
        self.remove_states(&[client]);
    }

    /// Drop the states of `clients`. Removing the local state bumps its
    /// clock so that peers learn about it.
    pub fn remove_states(&mut self, clients: &[ClientId]) {
        let now = self.clock.now();
        let mut event = AwarenessEvent::default();
        for client in clients {
            if self.states.remove(client).is_none() {
                continue;
            }
            if *client == self.client_id {
                if let Some(meta) = self.meta.get_mut(client) {
                    meta.clock += 1;
                    meta.last_updated = now;
                }
            }
            event.removed.push(*client);
        }
        self.emit(&event, &event);
    }

    /// Drop remote states that have not been refreshed for `timeout_millis`.
    pub fn remove_outdated_states(&mut self, timeout_millis: u64) -> Vec<ClientId> {
        let now = self.clock.now();
        let mut outdated: Vec<ClientId> = self
            .meta
            .iter()
            .filter(|(client, meta)| {
                **client != self.client_id
                    && self.states.contains_key(client)
                    && now.saturating_sub(meta.last_updated) >= timeout_millis
            })
            .map(|(client, _)| *client)
            .collect();
        outdated.sort_unstable();
        self.remove_states(&outdated);
        return outdated;
    }

    /// Every known client, including those that went away.
    pub fn encode_update(&self) -> Vec<u8> {
        let mut clients: Vec<ClientId> = self.meta.keys().copied().collect();
        clients.sort_unstable();
        return self.encode_update_for(&clients);
    }

    /// The listed clients. Unknown clients are skipped.
    pub fn encode_update_for(&self, clients: &[ClientId]) -> Vec<u8> {
        let known: Vec<(ClientId, MetaClock)> =
            clients.iter().filter_map(|c| self.meta.get(c).map(|m| (*c, *m))).collect();
        let mut buf = Vec::new();
        write_var_u64(&mut buf, known.len() as u64);
        for (client, meta) in known {
            write_var_u64(&mut buf, client);
            write_var_u64(&mut buf, meta.clock as u64);
            let state = self.states.get(&client).unwrap_or(&Value::Null);
            write_string(&mut buf, &state.to_string());
        }
        return buf;
    }

    /// Merge a remote update. Nothing is applied if any entry is malformed.
    /// Returns the clients whose state actually changed.
    pub fn apply_update(&mut self, update: &[u8]) -> Result<AwarenessEvent, Error> {
        return self.apply_update_with(update, None);
    }

    /// Like [`Awareness::apply_update`], tagging both notifications with
    /// `origin`.
    pub fn apply_update_with(&mut self, update: &[u8], origin: Option<Origin>) -> Result<AwarenessEvent, Error> {
        let entries = decode_entries(update).inspect_err(|err| {
            tracing::warn!(error = %err, "awareness.rejected");
        })?;
        let now = self.clock.now();
        let mut refresh = AwarenessEvent { origin: origin.clone(), ..AwarenessEvent::default() };
        let mut event = AwarenessEvent { origin, ..AwarenessEvent::default() };

        for (client, mut clock, state) in entries {
            let known = self.meta.get(&client).copied();
            let newer = match known {
                None => true,
                Some(meta) => {
                    meta.clock < clock || (meta.clock == clock && state.is_null() && self.states.contains_key(&client))
                }
            };
            if !newer {
                continue;
            }
            let previous = self.states.get(&client).cloned();
            let is_local = client == self.client_id;
            if state.is_null() {
                if is_local && previous.is_some() {
                    clock += 1;
                } else {
                    self.states.remove(&client);
                }
            } else {
                self.states.insert(client, state.clone());
            }
            self.meta.insert(client, MetaClock { clock, last_updated: now });

            match (&previous, state.is_null()) {
                (None, false) => {
                    refresh.added.push(client);
                    event.added.push(client);
                }
                (Some(_), true) if !is_local => {
                    refresh.removed.push(client);
                    event.removed.push(client);
                }
                (Some(previous), false) => {
                    refresh.updated.push(client);
                    if *previous != state {
                        event.updated.push(client);
                    }
                }
                _ => {}
            }
        }

        tracing::trace!(
            added = event.added.len(),
            updated = event.updated.len(),
            removed = event.removed.len(),
            refreshed = refresh.updated.len(),
            "awareness.apply"
        );
        self.emit(&refresh, &event);
        return Ok(event);
    }

    fn emit(&self, update: &AwarenessEvent, change: &AwarenessEvent) {
        notify(&self.on_update, update);
        notify(&self.on_change, change);
    }
}

impl std::fmt::Debug for Awareness {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        return f
            .debug_struct("Awareness")
            .field("client_id", &self.client_id)
            .field("states", &self.states)
            .finish_non_exhaustive();
    }
}

fn notify(observer: &Observer<AwarenessFn>, event: &AwarenessEvent) {
    if event.is_empty() {
        return;
    }
    let mut callbacks = observer.callbacks();
    for (_, callback) in callbacks.entries.iter_mut() {
        let callback: &mut AwarenessFn = callback.as_mut();
        callback(event);
    }
}

fn decode_entries(update: &[u8]) -> Result<Vec<(ClientId, u32, Value)>, DecodeError> {
    let mut cursor = Cursor::new(update);
    let count = cursor.read_var_u64()?;
    let mut entries = Vec::new();
    for _ in 0..count {
        let client = cursor.read_var_u64()?;
        let clock = cursor.read_var_u32()?;
        let json = cursor.read_string()?;
        let state: Value = serde_json::from_str(json).map_err(|e| DecodeError::InvalidJson(e.to_string()))?;
        entries.push((client, clock, state));
    }
    cursor.finish()?;
    return Ok(entries);
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crdt::primitives::clock::ManualClock;
    use serde_json::json;
    use std::sync::Mutex;

    fn peer(client: ClientId, clock: &ManualClock) -> Awareness {
        return Awareness::with_clock(client, Arc::new(clock.clone()));
    }

    #[test]
    fn states_propagate() {
        let clock = ManualClock::new(0);
        let mut a = peer(1, &clock);
        let mut b = peer(2, &clock);
        a.set_local_state(json!({ "name": "ann", "cursor": 4 }));

        let event = b.apply_update(&a.encode_update()).unwrap();
        assert_eq!(event.added, vec![1]);
        assert_eq!(b.state(1), Some(&json!({ "name": "ann", "cursor": 4 })));
        assert_eq!(b.clients(), vec![1, 2]);

        let again = b.apply_update(&a.encode_update()).unwrap();
        assert!(again.is_empty());

        a.set_local_state(json!({ "name": "ann", "cursor": 5 }));
        let event = b.apply_update(&a.encode_update_for(&[1])).unwrap();
        assert_eq!(event.updated, vec![1]);
    }

    #[test]
    fn removal_is_broadcast() {
        let clock = ManualClock::new(0);
        let mut a = peer(1, &clock);
        let mut b = peer(2, &clock);
        b.apply_update(&a.encode_update()).unwrap();

        a.clean_local_state();
        assert_eq!(a.local_state(), None);
        let event = b.apply_update(&a.encode_update()).unwrap();
        assert_eq!(event.removed, vec![1]);
        assert_eq!(b.clients(), vec![2]);
    }

    #[test]
    fn remote_cannot_remove_local_state() {
        let clock = ManualClock::new(0);
        let mut a = peer(1, &clock);
        let mut b = peer(2, &clock);
        b.apply_update(&a.encode_update()).unwrap();
        let mut forged = Vec::new();
        write_var_u64(&mut forged, 1);
        write_var_u64(&mut forged, 1);
        write_var_u64(&mut forged, 1);
        write_string(&mut forged, "null");
        b.apply_update(&forged).unwrap();
        assert_eq!(b.clients(), vec![2]);

        let event = a.apply_update(&forged).unwrap();
        assert!(event.removed.is_empty());
        assert!(a.local_state().is_some());

        let event = b.apply_update(&a.encode_update()).unwrap();
        assert_eq!(event.added, vec![1]);
    }

    #[test]
    fn observers_and_outdated_states() {
        let clock = ManualClock::new(0);
        let a = peer(1, &clock);
        let mut b = peer(2, &clock);
        let seen: Arc<Mutex<Vec<AwarenessEvent>>> = Arc::default();
        let sink = seen.clone();
        let _sub = b.on_update(move |e| sink.lock().unwrap().push(e.clone()));

        b.apply_update(&a.encode_update()).unwrap();
        clock.advance(30_000);
        assert_eq!(b.remove_outdated_states(30_000), vec![1]);
        let events = seen.lock().unwrap();
        assert_eq!(events.len(), 2);
        assert_eq!(events[1].removed, vec![1]);
    }

    #[test]
    fn heartbeats_update_without_changing() {
        let clock = ManualClock::new(0);
        let mut a = peer(1, &clock);
        let mut b = peer(2, &clock);
        a.set_local_state(json!({ "cursor": 1 }));
        b.apply_update(&a.encode_update()).unwrap();

        let updates: Arc<Mutex<Vec<AwarenessEvent>>> = Arc::default();
        let changes: Arc<Mutex<Vec<AwarenessEvent>>> = Arc::default();
        let update_sink = updates.clone();
        let change_sink = changes.clone();
        let _u = b.on_update(move |e| update_sink.lock().unwrap().push(e.clone()));
        let _c = b.on_change(move |e| change_sink.lock().unwrap().push(e.clone()));

        // same state, newer clock
        a.set_local_state(json!({ "cursor": 1 }));
        let event = b.apply_update_with(&a.encode_update(), Some(Origin::from("ws"))).unwrap();
        assert!(event.is_empty());
        assert_eq!(updates.lock().unwrap().len(), 1);
        assert_eq!(updates.lock().unwrap()[0].updated, vec![1]);
        assert_eq!(updates.lock().unwrap()[0].origin, Some(Origin::from("ws")));
        assert!(changes.lock().unwrap().is_empty());

        a.set_local_state(json!({ "cursor": 2 }));
        b.apply_update_with(&a.encode_update(), Some(Origin::from("ws"))).unwrap();
        assert_eq!(updates.lock().unwrap().len(), 2);
        let changes = changes.lock().unwrap();
        assert_eq!(changes.len(), 1);
        assert_eq!(changes[0].updated, vec![1]);
        assert_eq!(changes[0].origin, Some(Origin::from("ws")));
    }

    #[test]
    fn local_notifications_have_no_origin() {
        let clock = ManualClock::new(0);
        let mut a = peer(1, &clock);
        let changes: Arc<Mutex<Vec<AwarenessEvent>>> = Arc::default();
        let sink = changes.clone();
        let _c = a.on_change(move |e| sink.lock().unwrap().push(e.clone()));

        a.set_local_state(json!({}));
        assert!(changes.lock().unwrap().is_empty());
        a.set_local_state(json!({ "typing": true }));
        a.clean_local_state();
        let changes = changes.lock().unwrap();
        assert_eq!(changes.len(), 2);
        assert_eq!(changes[0].updated, vec![1]);
        assert_eq!(changes[1].removed, vec![1]);
        assert!(changes.iter().all(|e| e.origin.is_none()));
    }

    #[test]
    fn malformed_updates_change_nothing() {
        let clock = ManualClock::new(0);
        let mut b = peer(2, &clock);
        let mut buf = Vec::new();
        write_var_u64(&mut buf, 2);
        write_var_u64(&mut buf, 7);
        write_var_u64(&mut buf, 1);
        write_string(&mut buf, "{\"ok\":true}");
        write_var_u64(&mut buf, 8);
        write_var_u64(&mut buf, 1);
        write_string(&mut buf, "{not json");
        assert!(matches!(b.apply_update(&buf), Err(Error::Decode(DecodeError::InvalidJson(_)))));
        assert_eq!(b.clients(), vec![2]);
        assert!(matches!(b.apply_update(&[1]), Err(Error::Decode(DecodeError::UnexpectedEof))));
    }
}
