//! Expiry-ordered set of armed timers

use std::cmp::Ordering;

use super::TimerHandle;

/// One armed timer and the absolute expiry it was armed with
#[derive(Debug, Clone, Copy)]
struct OrderEntry {
    expire_time: f64,
    handle: TimerHandle,
}

impl OrderEntry {
    /// Firing precedence: earlier expiry first, then older handle
    fn cmp_firing(&self, other: &Self) -> Ordering {
        self.expire_time
            .total_cmp(&other.expire_time)
            .then_with(|| self.handle.cmp(&other.handle))
    }
}

/// Armed timers ordered by ascending expiry
///
/// Stored in descending order so the next timer to fire is the last element:
/// peeking and popping it is O(1), insertion is a binary search plus shift.
#[derive(Debug, Default)]
pub(crate) struct ActiveOrder {
    entries: Vec<OrderEntry>,
}

impl ActiveOrder {
    #[cfg(test)]
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            entries: Vec::with_capacity(capacity),
        }
    }

    /// Insert a handle keyed by its absolute expiry
    pub fn insert(&mut self, handle: TimerHandle, expire_time: f64) {
        debug_assert!(!self.contains(handle), "handle {} armed twice", handle);
        let entry = OrderEntry { expire_time, handle };
        // Everything that fires after `entry` stays in front of it
        let index = self
            .entries
            .partition_point(|e| e.cmp_firing(&entry) == Ordering::Greater);
        self.entries.insert(index, entry);
    }

    /// Next timer to fire and its expiry, without removing it
    pub fn peek(&self) -> Option<(TimerHandle, f64)> {
        self.entries.last().map(|e| (e.handle, e.expire_time))
    }

    /// Remove and return the timer with the smallest expiry
    pub fn pop_next_due(&mut self) -> Option<TimerHandle> {
        self.entries.pop().map(|e| e.handle)
    }

    /// Remove a specific handle, keeping the rest in order
    pub fn remove(&mut self, handle: TimerHandle) -> bool {
        match self.entries.iter().rposition(|e| e.handle == handle) {
            Some(index) => {
                self.entries.remove(index);
                true
            }
            None => false,
        }
    }

    pub fn contains(&self, handle: TimerHandle) -> bool {
        self.entries.iter().any(|e| e.handle == handle)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[cfg(test)]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Handles in firing order
    #[cfg(test)]
    pub fn iter(&self) -> impl Iterator<Item = TimerHandle> + '_ {
        self.entries.iter().rev().map(|e| e.handle)
    }

    #[cfg(test)]
    pub fn clear(&mut self) {
        self.entries.clear();
    }
}
