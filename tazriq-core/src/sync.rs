//! Process-wide synchronization for registration and first construction.
//!
//! A single re-entrant lock serializes locator updates, singleton first
//! builds and named-module creation. Re-entrancy matters: building a
//! singleton may recursively build other singletons on the same thread.

use once_cell::sync::Lazy;
use parking_lot::{ReentrantMutex, ReentrantMutexGuard};

static PROCESS_LOCK: Lazy<ReentrantMutex<()>> = Lazy::new(|| ReentrantMutex::new(()));

/// Acquires the process-wide re-entrant lock for the guard's lifetime.
pub(crate) fn synchronized() -> ReentrantMutexGuard<'static, ()> {
    PROCESS_LOCK.lock()
}
