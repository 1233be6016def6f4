//! Minimal observable cell used for every piece of published state.
//!
//! Built directly on [`tokio::sync::watch`]: the owner of an [`Observable`]
//! is the only writer, and every shell gets read-only [`watch::Receiver`]s
//! through [`Observable::subscribe`]. Receivers coalesce intermediate values,
//! which is exactly the semantics the dashboard wants (render latest, not a
//! replay of history).

use tokio::sync::watch;

#[derive(Debug)]
pub struct Observable<T> {
    tx: watch::Sender<T>,
}

impl<T: Clone> Observable<T> {
    #[must_use]
    pub fn new(initial: T) -> Self {
        let (tx, _rx) = watch::channel(initial);
        Self { tx }
    }

    /// Snapshot of the current value.
    #[must_use]
    pub fn get(&self) -> T {
        self.tx.borrow().clone()
    }

    /// Replaces the value and notifies subscribers, even when no receiver is
    /// currently alive.
    pub fn set(&self, value: T) {
        self.tx.send_replace(value);
    }

    /// In-place mutation under the channel lock; one notification.
    pub fn update(&self, f: impl FnOnce(&mut T)) {
        self.tx.send_modify(f);
    }

    /// Read-only handle for shells. The receiver starts at the current value;
    /// `changed().await` wakes on every subsequent [`set`](Self::set).
    #[must_use]
    pub fn subscribe(&self) -> watch::Receiver<T> {
        self.tx.subscribe()
    }
}

impl<T: Clone + Default> Default for Observable<T> {
    fn default() -> Self {
        Self::new(T::default())
    }
}
