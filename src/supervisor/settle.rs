//! Settle-once value shared between racing tasks.

use std::sync::Arc;

use tokio::sync::watch;

/// A value that can be resolved exactly once.
///
/// The first call to [`Settle::settle`] stores the value and wakes every
/// waiter; later calls are ignored and return `false`. Clones share the same
/// slot.
#[derive(Debug)]
pub struct Settle<T> {
    slot: Arc<watch::Sender<Option<T>>>,
}

impl<T> Clone for Settle<T> {
    fn clone(&self) -> Self {
        Self {
            slot: Arc::clone(&self.slot),
        }
    }
}

impl<T: Clone> Default for Settle<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T: Clone> Settle<T> {
    #[must_use]
    pub fn new() -> Self {
        let (slot, _) = watch::channel(None);
        Self {
            slot: Arc::new(slot),
        }
    }

    /// Resolve with `value`. Returns `true` only for the winning call.
    pub fn settle(&self, value: T) -> bool {
        let mut value = Some(value);
        self.slot.send_if_modified(|slot| {
            if slot.is_some() {
                return false;
            }
            *slot = value.take();
            true
        })
    }

    #[must_use]
    pub fn is_settled(&self) -> bool {
        self.slot.borrow().is_some()
    }

    /// The settled value, if any.
    #[must_use]
    pub fn peek(&self) -> Option<T> {
        self.slot.borrow().clone()
    }

    /// Wait until the value is settled and return a copy of it.
    pub async fn wait(&self) -> T {
        let mut rx = self.slot.subscribe();
        loop {
            if let Some(value) = rx.borrow_and_update().clone() {
                return value;
            }
            if rx.changed().await.is_err() {
                // `self` keeps the sender alive, so this never resolves.
                std::future::pending::<()>().await;
            }
        }
    }
}
