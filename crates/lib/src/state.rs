//! Observable state holder shared between an owning subsystem and its viewers.
//!
//! A `StateCell` wraps one value. Mutations are synchronous and notify every
//! subscriber; readers either clone the current value or borrow it briefly.

use std::sync::Arc;
use tokio::sync::watch;

/// Cloneable handle to one piece of observable state. Clones share the same value.
pub struct StateCell<T> {
    tx: Arc<watch::Sender<T>>,
}

impl<T> Clone for StateCell<T> {
    fn clone(&self) -> Self {
        Self {
            tx: Arc::clone(&self.tx),
        }
    }
}

impl<T: Default> Default for StateCell<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}

impl<T> StateCell<T> {
    pub fn new(initial: T) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx: Arc::new(tx) }
    }

    /// Read the current value without cloning it. Do not hold other locks inside `f`.
    pub fn with<R>(&self, f: impl FnOnce(&T) -> R) -> R {
        f(&self.tx.borrow())
    }

    /// Replace the value and notify subscribers.
    pub fn set(&self, value: T) {
        self.tx.send_replace(value);
    }

    /// Compute the new value from the previous one and notify subscribers.
    pub fn update(&self, f: impl FnOnce(&T) -> T) {
        self.tx.send_modify(|current| {
            let next = f(current);
            *current = next;
        });
    }

    /// Mutate in place; subscribers are notified only when `f` returns true.
    pub fn modify(&self, f: impl FnOnce(&mut T) -> bool) -> bool {
        self.tx.send_if_modified(f)
    }

    /// Receiver that observes every subsequent notification.
    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.tx.subscribe()
    }
}

impl<T: Clone> StateCell<T> {
    pub fn get(&self) -> T {
        self.tx.borrow().clone()
    }
}
