// created = "2026-10-17"
// modified = "2026-10-17"

//! Callback registries.
//!
//! Observers are stored behind a shared mutex so that the returned
//! [`Subscription`] can unregister its callback from wherever it is dropped.

use std::sync::{Arc, Mutex, MutexGuard, Weak};

/// Registered callbacks, in subscription order.
pub(crate) struct Callbacks<F: ?Sized> {
    next_id: u32,
    pub entries: Vec<(u32, Box<F>)>,
}

/// A list of callbacks of type `F`.
pub(crate) struct Observer<F: ?Sized> {
    inner: Arc<Mutex<Callbacks<F>>>,
}

impl<F: ?Sized + Send + 'static> Observer<F> {
    pub fn new() -> Observer<F> {
        return Observer { inner: Arc::new(Mutex::new(Callbacks { next_id: 0, entries: Vec::new() })) };
    }

    /// Register `callback` until the returned subscription is dropped.
    pub fn subscribe(&self, callback: Box<F>) -> Subscription {
        let id = {
            let mut inner = lock(&self.inner);
            let id = inner.next_id;
            inner.next_id += 1;
            inner.entries.push((id, callback));
            id
        };
        let weak: Weak<Mutex<Callbacks<F>>> = Arc::downgrade(&self.inner);
        return Subscription {
            cancel: Some(Box::new(move || {
                if let Some(inner) = weak.upgrade() {
                    lock(&inner).entries.retain(|(entry, _)| *entry != id);
                }
            })),
        };
    }

    pub fn has_subscribers(&self) -> bool {
        return !lock(&self.inner).entries.is_empty();
    }

    /// Exclusive access to the callbacks for the duration of a notification.
    pub fn callbacks(&self) -> MutexGuard<'_, Callbacks<F>> {
        return lock(&self.inner);
    }
}

impl<F: ?Sized + Send + 'static> Default for Observer<F> {
    fn default() -> Observer<F> {
        return Observer::new();
    }
}

fn lock<T: ?Sized>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    return mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner());
}

/// Keeps a callback registered. Dropping it unregisters the callback.
#[must_use = "the callback is unregistered as soon as the subscription is dropped"]
pub struct Subscription {
    cancel: Option<Box<dyn FnOnce() + Send>>,
}

impl std::fmt::Debug for Subscription {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        return f.write_str("Subscription");
    }
}

impl Drop for Subscription {
    fn drop(&mut self) {
        if let Some(cancel) = self.cancel.take() {
            cancel();
        }
    }
}
