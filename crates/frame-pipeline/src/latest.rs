//! Single-slot overwrite cell.
//!
//! Holds at most one value. Publishing replaces whatever is stored, so readers
//! only ever observe the most recent value and may miss intermediate ones.
//! Suitable for sampling live state (progress, sensor readings); never use it
//! to carry work items.

use std::sync::{
    Mutex,
    atomic::{AtomicU64, Ordering},
};

#[derive(Debug)]
pub struct LatestCell<T> {
    slot: Mutex<Option<T>>,
    published: AtomicU64,
    overwritten: AtomicU64,
}

impl<T> Default for LatestCell<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> LatestCell<T> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            published: AtomicU64::new(0),
            overwritten: AtomicU64::new(0),
        }
    }

    /// Store `value`, dropping any value nobody has taken yet.
    pub fn publish(&self, value: T) {
        let mut guard = match self.slot.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        };
        if guard.replace(value).is_some() {
            self.overwritten.fetch_add(1, Ordering::Relaxed);
        }
        self.published.fetch_add(1, Ordering::Relaxed);
    }

    /// Remove and return the stored value, if any.
    pub fn take(&self) -> Option<T> {
        match self.slot.lock() {
            Ok(mut guard) => guard.take(),
            Err(poisoned) => poisoned.into_inner().take(),
        }
    }

    /// Total number of [`publish`](Self::publish) calls.
    pub fn published(&self) -> u64 {
        self.published.load(Ordering::Relaxed)
    }

    /// Values replaced before anyone took them.
    pub fn overwritten(&self) -> u64 {
        self.overwritten.load(Ordering::Relaxed)
    }
}

impl<T: Clone> LatestCell<T> {
    /// Copy of the stored value without clearing the slot.
    pub fn peek(&self) -> Option<T> {
        match self.slot.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }
}
