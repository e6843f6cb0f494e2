//! Timer handles
//!
//! A `TimerHandle` names one timer record inside a [`Scheduler`](super::Scheduler).
//! Handles are allocated from a process-wide counter and are never reused, so a
//! stale handle can never alias a newer timer.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

/// Last handle value handed out. Zero is reserved for the unbound handle.
static LAST_ASSIGNED: AtomicU64 = AtomicU64::new(0);

/// Opaque identifier for a scheduled timer
///
/// The value 0 is the unbound handle. Serializes as the raw integer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct TimerHandle(u64);

impl TimerHandle {
    /// The unbound handle
    pub const INVALID: TimerHandle = TimerHandle(0);

    /// Allocate a fresh, never-before-seen handle
    pub(crate) fn allocate() -> Self {
        Self(LAST_ASSIGNED.fetch_add(1, Ordering::Relaxed) + 1)
    }

    /// Wrap a raw value (0 yields the unbound handle)
    pub const fn from_raw(raw: u64) -> Self {
        Self(raw)
    }

    /// Raw integer value
    pub const fn raw(&self) -> u64 {
        self.0
    }

    /// Whether this handle is bound to a value
    pub const fn is_valid(&self) -> bool {
        self.0 != 0
    }

    /// Reset to the unbound handle
    pub fn invalidate(&mut self) {
        self.0 = 0;
    }
}

impl std::fmt::Display for TimerHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "#{}", self.0)
    }
}

impl From<TimerHandle> for u64 {
    fn from(handle: TimerHandle) -> Self {
        handle.0
    }
}
