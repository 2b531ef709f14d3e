//! Process-wide cap on watcher instances.
//!
//! Both filesystem and repository watchers count against one global
//! limit, so a misconfigured caller cannot exhaust OS watch handles.

use std::sync::atomic::{AtomicI32, Ordering};

use crate::error::{DaemonError, Result};

/// Global limit on concurrently live watcher instances.
pub const MAX_WATCHERS: i32 = 100;

static WATCHER_COUNT: AtomicI32 = AtomicI32::new(0);

/// Current number of live watcher instances.
pub fn watcher_count() -> i32 {
    WATCHER_COUNT.load(Ordering::SeqCst)
}

/// Reserve one watcher slot. Fails when the limit is reached.
pub(crate) fn acquire_watcher() -> Result<()> {
    acquire_slot(&WATCHER_COUNT, MAX_WATCHERS)
}

/// Release a slot taken by `acquire_watcher`. Must be called exactly once
/// per successful acquisition.
pub(crate) fn release_watcher() {
    WATCHER_COUNT.fetch_sub(1, Ordering::SeqCst);
}

fn acquire_slot(count: &AtomicI32, limit: i32) -> Result<()> {
    loop {
        let current = count.load(Ordering::SeqCst);
        if current >= limit {
            return Err(DaemonError::TooManyWatchers);
        }
        if count
            .compare_exchange(current, current + 1, Ordering::SeqCst, Ordering::SeqCst)
            .is_ok()
        {
            return Ok(());
        }
    }
}
