//! Single-value snapshot cell with blocking reads.
//!
//! The cell holds the outcome of the most recent completed check cycle.
//! Readers that arrive while a cycle is in flight block until the cycle
//! finishes; they never observe a partially-formed or stale value.
//!
//! # Contract
//!
//! - `get` blocks while the cell is empty and returns immediately while
//!   it is full; any number of readers may call it concurrently.
//! - `set` fills the cell and wakes every blocked reader.
//! - `invalidate` empties the cell; readers already blocked stay blocked,
//!   and later readers block too, until the next `set`.

use parking_lot::{Condvar, Mutex};

/// Concurrency-safe container for the latest completed value.
pub struct SnapshotCell<T> {
    slot: Mutex<Option<T>>,
    ready: Condvar,
}

impl<T: Clone> SnapshotCell<T> {
    pub fn new() -> Self {
        Self {
            slot: Mutex::new(None),
            ready: Condvar::new(),
        }
    }

    /// Block until a value is present, then return a copy of it.
    pub fn get(&self) -> T {
        let mut slot = self.slot.lock();
        loop {
            if let Some(value) = slot.as_ref() {
                return value.clone();
            }
            self.ready.wait(&mut slot);
        }
    }

    /// Store `value` and wake all blocked readers.
    pub fn set(&self, value: T) {
        *self.slot.lock() = Some(value);
        self.ready.notify_all();
    }

    /// Empty the cell so readers block until the next `set`.
    pub fn invalidate(&self) {
        *self.slot.lock() = None;
    }

    /// Whether a `get` would currently return without blocking.
    pub fn is_ready(&self) -> bool {
        self.slot.lock().is_some()
    }
}

impl<T: Clone> Default for SnapshotCell<T> {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// Tests
// ============================================================================
