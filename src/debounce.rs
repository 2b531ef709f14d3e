//! Trailing-edge debouncer.
//!
//! Coalesces rapid triggers into a single callback after a quiet period.
//! Each `trigger` resets the timer; the callback fires only once the
//! interval has elapsed with no further triggers.

use std::sync::Arc;
use std::thread;
use std::time::Duration;

use parking_lot::Mutex;

/// Debounced invocation of a fixed callback.
///
/// A generation counter guards each scheduled invocation: triggering or
/// stopping bumps the generation, so timers armed for an older generation
/// wake up and do nothing.
pub struct Debouncer {
    interval: Duration,
    callback: Arc<dyn Fn() + Send + Sync>,
    generation: Arc<Mutex<u64>>,
}

impl Debouncer {
    pub fn new(interval: Duration, callback: impl Fn() + Send + Sync + 'static) -> Self {
        Self {
            interval,
            callback: Arc::new(callback),
            generation: Arc::new(Mutex::new(0)),
        }
    }

    /// Reset the debounce timer. If no further `trigger` call arrives
    /// within the interval, the callback is invoked once.
    pub fn trigger(&self) {
        let scheduled = {
            let mut generation = self.generation.lock();
            *generation += 1;
            *generation
        };

        let generation = Arc::clone(&self.generation);
        let callback = Arc::clone(&self.callback);
        let interval = self.interval;
        thread::spawn(move || {
            thread::sleep(interval);
            let current = *generation.lock();
            if current == scheduled {
                callback();
            }
        });
    }

    /// Cancel any pending invocation. `trigger` may be called again
    /// afterwards and behaves like a fresh trigger.
    pub fn stop(&self) {
        *self.generation.lock() += 1;
    }
}

// ============================================================================
// Tests
// ============================================================================
