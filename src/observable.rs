//! Publish-on-change state cell.
//!
//! Every mutation publishes a fresh `Arc`, so readers holding the previous
//! value keep an unchanged snapshot and `Arc::ptr_eq` tells them whether
//! anything changed.

use std::sync::Arc;

use tokio::sync::watch;

/// Copy-on-write value with change notification.
#[derive(Debug)]
pub struct Observable<T> {
    tx: watch::Sender<Arc<T>>,
}

impl<T> Observable<T> {
    /// Create a cell holding `value`.
    pub fn new(value: T) -> Self {
        let (tx, _rx) = watch::channel(Arc::new(value));
        Self { tx }
    }

    /// Current snapshot.
    pub fn get(&self) -> Arc<T> {
        Arc::clone(&*self.tx.borrow())
    }

    /// Publish `value` as the new snapshot.
    pub fn replace(&self, value: T) {
        self.tx.send_replace(Arc::new(value));
    }

    /// Publish `f(current)` as the new snapshot.
    pub fn update<F>(&self, f: F)
    where
        F: FnOnce(&T) -> T,
    {
        self.tx.send_modify(|current| {
            *current = Arc::new(f(current));
        });
    }

    /// Receiver notified on every publish.
    pub fn subscribe(&self) -> watch::Receiver<Arc<T>> {
        self.tx.subscribe()
    }
}

impl<T: Default> Default for Observable<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}
