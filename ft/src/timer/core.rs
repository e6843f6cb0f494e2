//! Scheduler implementation

use std::collections::{BTreeSet, HashMap};

use tracing::{debug, trace, warn};

use super::order::ActiveOrder;
use super::record::TimerRecord;
use super::stats::{SchedulerStats, TimerInfo};
use super::{TimerClock, TimerHandle, TimerOptions, TimerStatus};

/// The Scheduler fires delayed and repeating callbacks once per external step.
///
/// Every record lives in exactly one of: the pending set, an active order, the
/// paused set, or the currently-executing slot. Cancelled armed records stay in
/// their active order as `ActivePendingRemoval` until the drain sweeps them.
pub struct Scheduler {
    /// Handle table, the only owner of records
    timers: HashMap<TimerHandle, TimerRecord>,

    /// Records waiting for the next tick to resolve their expiry
    pending: BTreeSet<TimerHandle>,

    /// Records parked with a relative remaining delay
    paused: BTreeSet<TimerHandle>,

    /// Armed timers on the scaled clock
    active_scaled: ActiveOrder,

    /// Armed timers on the unscaled clock
    active_unscaled: ActiveOrder,

    /// Record whose callback is running, or the unbound handle
    currently_executing: TimerHandle,

    /// Step id of the last completed tick
    last_processed_step: Option<u64>,

    /// True while `tick` is resolving and draining
    draining: bool,

    scaled_time: f64,
    unscaled_time: f64,

    stats: SchedulerStats,
}

impl Default for Scheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl Scheduler {
    /// Create an empty scheduler with both clocks at zero
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    /// Create a scheduler with room for `capacity` timers
    pub fn with_capacity(capacity: usize) -> Self {
        debug!(capacity, "Scheduler::with_capacity: called");
        Self {
            timers: HashMap::with_capacity(capacity),
            pending: BTreeSet::new(),
            paused: BTreeSet::new(),
            active_scaled: ActiveOrder::with_capacity(capacity),
            active_unscaled: ActiveOrder::with_capacity(capacity),
            currently_executing: TimerHandle::INVALID,
            last_processed_step: None,
            draining: false,
            scaled_time: 0.0,
            unscaled_time: 0.0,
            stats: SchedulerStats::default(),
        }
    }

    /// Schedule `callback` to fire after a delay, optionally repeating every `rate` seconds.
    ///
    /// A live timer already named by `handle` is cleared first. A non-positive
    /// `rate` creates nothing and leaves `handle` invalidated. On success
    /// `handle` is overwritten with the new timer's handle, which is also returned.
    pub fn set_timer<F>(
        &mut self,
        handle: &mut TimerHandle,
        callback: F,
        rate: f64,
        options: TimerOptions,
    ) -> TimerHandle
    where
        F: FnMut(&mut Scheduler) + 'static,
    {
        debug!(%handle, rate, ?options, "Scheduler::set_timer: called");
        if self.find_live(*handle).is_some() {
            debug!(%handle, "Scheduler::set_timer: replacing live timer");
            self.clear_record(*handle);
            self.stats.total_cleared += 1;
        }

        // Negated comparison so NaN is rejected too
        if !(rate > 0.0) {
            debug!(rate, "Scheduler::set_timer: non-positive rate, invalidating handle");
            handle.invalidate();
            return *handle;
        }

        let new_handle = TimerHandle::allocate();
        let mut record = TimerRecord::new(new_handle, Box::new(callback), rate, &options);

        if self.has_processed_step() {
            record.expire_time += self.current_time(record.clock);
            record.status = TimerStatus::Active;
            self.timers.insert(new_handle, record);
            self.arm(new_handle);
        } else {
            debug!(handle = %new_handle, "Scheduler::set_timer: step not processed yet, staging as pending");
            self.timers.insert(new_handle, record);
            self.pending.insert(new_handle);
        }

        self.stats.total_set += 1;
        *handle = new_handle;
        new_handle
    }

    /// Schedule `callback` to fire once on the next drain
    ///
    /// The record is armed immediately at the current unscaled time, so it fires
    /// on the first tick that advances the unscaled clock. A live timer already
    /// named by `handle` is cleared first.
    pub fn set_timer_next_tick<F>(&mut self, handle: &mut TimerHandle, callback: F) -> TimerHandle
    where
        F: FnMut(&mut Scheduler) + 'static,
    {
        debug!(%handle, "Scheduler::set_timer_next_tick: called");
        if self.find_live(*handle).is_some() {
            self.clear_record(*handle);
            self.stats.total_cleared += 1;
        }

        let new_handle = TimerHandle::allocate();
        let mut record = TimerRecord::new(new_handle, Box::new(callback), 0.0, &TimerOptions::default());
        record.expire_time = self.unscaled_time;
        record.status = TimerStatus::Active;
        self.timers.insert(new_handle, record);
        self.arm(new_handle);

        self.stats.total_set += 1;
        *handle = new_handle;
        new_handle
    }

    /// Pause a timer, keeping its remaining delay
    ///
    /// Returns false if the handle is unknown, cancelled, or already paused.
    /// Pausing an executing one-shot timer discards it: its firing already happened.
    pub fn pause(&mut self, handle: TimerHandle) -> bool {
        debug!(%handle, "Scheduler::pause: called");
        let Some(record) = self.find_live(handle) else {
            debug!(%handle, "Scheduler::pause: not found");
            return false;
        };
        let (status, clock, looping, rate, expire_time) =
            (record.status, record.clock, record.looping, record.rate, record.expire_time);

        let remaining = match status {
            TimerStatus::Paused | TimerStatus::ActivePendingRemoval => {
                debug!(%handle, %status, "Scheduler::pause: not pausable");
                return false;
            }
            TimerStatus::Pending => {
                self.pending.remove(&handle);
                expire_time
            }
            TimerStatus::Active => {
                self.order_mut(clock).remove(handle);
                (expire_time - self.current_time(clock)).max(0.0)
            }
            TimerStatus::Executing => {
                if self.currently_executing == handle {
                    self.currently_executing.invalidate();
                }
                if !looping {
                    debug!(%handle, "Scheduler::pause: executing one-shot, discarding");
                    self.timers.remove(&handle);
                    return true;
                }
                rate
            }
        };

        if let Some(record) = self.timers.get_mut(&handle) {
            record.status = TimerStatus::Paused;
            record.expire_time = remaining;
        }
        self.paused.insert(handle);
        true
    }

    /// Resume a paused timer with the delay it had left
    ///
    /// Returns false if the handle is unknown or not paused.
    pub fn resume(&mut self, handle: TimerHandle) -> bool {
        debug!(%handle, "Scheduler::resume: called");
        let Some(record) = self.find_live(handle) else {
            debug!(%handle, "Scheduler::resume: not found");
            return false;
        };
        if record.status != TimerStatus::Paused {
            debug!(%handle, status = %record.status, "Scheduler::resume: not paused");
            return false;
        }
        let clock = record.clock;

        self.paused.remove(&handle);
        if self.has_processed_step() {
            let now = self.current_time(clock);
            if let Some(record) = self.timers.get_mut(&handle) {
                record.expire_time += now;
                record.status = TimerStatus::Active;
            }
            self.arm(handle);
        } else {
            if let Some(record) = self.timers.get_mut(&handle) {
                record.status = TimerStatus::Pending;
            }
            self.pending.insert(handle);
        }
        true
    }

    /// Cancel a timer in any state
    ///
    /// Returns whether a live timer was found.
    pub fn clear(&mut self, handle: TimerHandle) -> bool {
        debug!(%handle, "Scheduler::clear: called");
        if self.find_live(handle).is_none() {
            debug!(%handle, "Scheduler::clear: not found");
            return false;
        }
        self.clear_record(handle);
        self.stats.total_cleared += 1;
        true
    }

    /// Cancel every live timer
    pub fn clear_all(&mut self) {
        let mut handles: Vec<_> = self.timers.keys().copied().collect();
        handles.sort_unstable();
        debug!(count = handles.len(), "Scheduler::clear_all: called");

        for handle in handles {
            if self.find_live(handle).is_some() {
                self.clear_record(handle);
                self.stats.total_cleared += 1;
            }
        }
    }

    /// Advance both clocks and fire every due timer
    ///
    /// Runs at most once per `step`: a repeated step id is a no-op, as is a call
    /// made from inside a timer callback. Returns whether the tick ran.
    pub fn tick(&mut self, scaled_delta: f64, unscaled_delta: f64, step: u64) -> bool {
        if self.draining {
            warn!(step, "Scheduler::tick: called from a timer callback, ignoring");
            return false;
        }
        if self.last_processed_step == Some(step) {
            debug!(step, "Scheduler::tick: step already processed, skipping");
            return false;
        }
        trace!(step, scaled_delta, unscaled_delta, "Scheduler::tick: called");

        self.draining = true;

        // Staged before this tick: count from the clock they were staged at
        self.resolve_pending();

        self.scaled_time += sanitize_delta(scaled_delta, "scaled");
        self.unscaled_time += sanitize_delta(unscaled_delta, "unscaled");

        let fired = self.drain();

        // Staged by callbacks during the drain: count from now
        self.resolve_pending();

        self.draining = false;
        self.last_processed_step = Some(step);
        self.stats.total_ticks += 1;

        trace!(step, fired, scaled_time = self.scaled_time, unscaled_time = self.unscaled_time, "Scheduler::tick: done");
        true
    }

    /// Current status of a live timer
    pub fn status(&self, handle: TimerHandle) -> Option<TimerStatus> {
        self.find_live(handle).map(|r| r.status)
    }

    /// Whether the handle names a live (not cancelled) timer
    pub fn exists(&self, handle: TimerHandle) -> bool {
        self.find_live(handle).is_some()
    }

    /// Whether the timer is counting down or firing
    pub fn is_active(&self, handle: TimerHandle) -> bool {
        matches!(
            self.status(handle),
            Some(TimerStatus::Pending | TimerStatus::Active | TimerStatus::Executing)
        )
    }

    pub fn is_paused(&self, handle: TimerHandle) -> bool {
        self.status(handle) == Some(TimerStatus::Paused)
    }

    /// Period of a live timer (0 for next-tick timers)
    pub fn rate(&self, handle: TimerHandle) -> Option<f64> {
        self.find_live(handle).map(|r| r.rate)
    }

    /// Seconds until the timer next fires, on its own clock
    pub fn time_remaining(&self, handle: TimerHandle) -> Option<f64> {
        let record = self.find_live(handle)?;
        let remaining = match record.status {
            TimerStatus::Active => (record.expire_time - self.current_time(record.clock)).max(0.0),
            TimerStatus::Pending | TimerStatus::Paused => record.expire_time,
            TimerStatus::Executing => 0.0,
            TimerStatus::ActivePendingRemoval => return None,
        };
        Some(remaining)
    }

    /// Number of live (not cancelled) timers
    pub fn timer_count(&self) -> usize {
        self.timers
            .values()
            .filter(|r| r.status != TimerStatus::ActivePendingRemoval)
            .count()
    }

    /// Accumulated time on the given clock
    pub fn current_time(&self, clock: TimerClock) -> f64 {
        match clock {
            TimerClock::Scaled => self.scaled_time,
            TimerClock::Unscaled => self.unscaled_time,
        }
    }

    /// Step id of the last tick that ran
    pub fn last_processed_step(&self) -> Option<u64> {
        self.last_processed_step
    }

    /// Handle of the timer whose callback is running
    pub fn currently_executing(&self) -> Option<TimerHandle> {
        self.currently_executing.is_valid().then_some(self.currently_executing)
    }

    pub fn stats(&self) -> SchedulerStats {
        self.stats.clone()
    }

    /// Snapshot of every live timer, ordered by handle
    pub fn timers(&self) -> Vec<TimerInfo> {
        let mut infos: Vec<_> = self
            .timers
            .values()
            .filter(|r| r.status != TimerStatus::ActivePendingRemoval)
            .map(|r| TimerInfo {
                handle: r.handle,
                status: r.status,
                rate: r.rate,
                looping: r.looping,
                clock: r.clock,
                remaining: self.time_remaining(r.handle).unwrap_or(0.0),
            })
            .collect();
        infos.sort_by_key(|i| i.handle);
        infos
    }

    /// Whether a new timer can be armed against the current clock right away
    fn has_processed_step(&self) -> bool {
        self.last_processed_step.is_some() && !self.draining
    }

    fn find_live(&self, handle: TimerHandle) -> Option<&TimerRecord> {
        if !handle.is_valid() {
            return None;
        }
        self.timers
            .get(&handle)
            .filter(|r| r.status != TimerStatus::ActivePendingRemoval)
    }

    fn order(&self, clock: TimerClock) -> &ActiveOrder {
        match clock {
            TimerClock::Scaled => &self.active_scaled,
            TimerClock::Unscaled => &self.active_unscaled,
        }
    }

    fn order_mut(&mut self, clock: TimerClock) -> &mut ActiveOrder {
        match clock {
            TimerClock::Scaled => &mut self.active_scaled,
            TimerClock::Unscaled => &mut self.active_unscaled,
        }
    }

    /// Insert an Active record into its clock's order
    fn arm(&mut self, handle: TimerHandle) {
        let Some(record) = self.timers.get(&handle) else {
            return;
        };
        let (clock, expire_time) = (record.clock, record.expire_time);
        self.order_mut(clock).insert(handle, expire_time);

        let armed = self.active_scaled.len() + self.active_unscaled.len();
        self.stats.peak_active = self.stats.peak_active.max(armed);
    }

    /// Per-state cancellation shared by `clear`, `clear_all` and `set_timer`
    fn clear_record(&mut self, handle: TimerHandle) {
        let Some(status) = self.timers.get(&handle).map(|r| r.status) else {
            return;
        };
        match status {
            TimerStatus::Pending => {
                self.pending.remove(&handle);
                self.timers.remove(&handle);
            }
            TimerStatus::Active => {
                if let Some(record) = self.timers.get_mut(&handle) {
                    record.status = TimerStatus::ActivePendingRemoval;
                }
            }
            TimerStatus::Paused => {
                self.paused.remove(&handle);
                self.timers.remove(&handle);
            }
            TimerStatus::Executing => {
                if self.currently_executing == handle {
                    self.currently_executing.invalidate();
                }
                self.timers.remove(&handle);
            }
            TimerStatus::ActivePendingRemoval => {}
        }
    }

    /// Arm every pending record against its clock's current time
    fn resolve_pending(&mut self) {
        let pending = std::mem::take(&mut self.pending);
        for handle in pending {
            let Some(record) = self.timers.get_mut(&handle) else {
                continue;
            };
            record.expire_time += match record.clock {
                TimerClock::Scaled => self.scaled_time,
                TimerClock::Unscaled => self.unscaled_time,
            };
            record.status = TimerStatus::Active;
            self.arm(handle);
        }
    }

    /// Fire due timers until neither clock has one left; returns invocations made
    fn drain(&mut self) -> u64 {
        let mut fired = 0;
        loop {
            self.sweep_removed(TimerClock::Scaled);
            self.sweep_removed(TimerClock::Unscaled);
            let Some((handle, clock)) = self.next_due() else {
                break;
            };
            fired += self.execute(handle, clock);
        }
        fired
    }

    /// Drop cancelled records sitting at the head of an order
    fn sweep_removed(&mut self, clock: TimerClock) {
        while let Some((handle, _)) = self.order(clock).peek() {
            let cancelled = self
                .timers
                .get(&handle)
                .is_none_or(|r| r.status == TimerStatus::ActivePendingRemoval);
            if !cancelled {
                break;
            }
            self.order_mut(clock).pop_next_due();
            if self.timers.remove(&handle).is_some() {
                self.stats.total_swept += 1;
            }
            trace!(%handle, "Scheduler::sweep_removed: swept cancelled timer");
        }
    }

    /// Earliest due head across both clocks
    fn next_due(&self) -> Option<(TimerHandle, TimerClock)> {
        let due = |clock: TimerClock| {
            self.order(clock)
                .peek()
                .filter(|(_, expire_time)| self.current_time(clock) > *expire_time)
                .map(|(handle, expire_time)| (handle, expire_time, clock))
        };

        match (due(TimerClock::Scaled), due(TimerClock::Unscaled)) {
            (Some(scaled), Some(unscaled)) => {
                let unscaled_first = unscaled
                    .1
                    .total_cmp(&scaled.1)
                    .then_with(|| unscaled.0.cmp(&scaled.0))
                    .is_lt();
                let (handle, _, clock) = if unscaled_first { unscaled } else { scaled };
                Some((handle, clock))
            }
            (Some((handle, _, clock)), None) | (None, Some((handle, _, clock))) => Some((handle, clock)),
            (None, None) => None,
        }
    }

    /// Whether `handle` is still the record mid-callback
    fn is_executing(&self, handle: TimerHandle) -> bool {
        self.currently_executing == handle
            && self
                .timers
                .get(&handle)
                .is_some_and(|r| r.status == TimerStatus::Executing)
    }

    /// Pop the head of `clock`'s order and run its callback; returns invocations made
    fn execute(&mut self, handle: TimerHandle, clock: TimerClock) -> u64 {
        self.order_mut(clock).pop_next_due();
        let now = self.current_time(clock);

        let Some(record) = self.timers.get_mut(&handle) else {
            return 0;
        };
        record.status = TimerStatus::Executing;
        let count = record.execution_count(now);
        let mut callback = record.callback.take();
        self.currently_executing = handle;
        trace!(%handle, count, now, "Scheduler::execute: firing");

        let mut fired = 0;
        if let Some(callback) = callback.as_mut() {
            for _ in 0..count {
                callback(self);
                fired += 1;
                // The callback may have cleared, paused or replaced this timer
                if !self.is_executing(handle) {
                    break;
                }
            }
        }
        self.stats.total_fired += fired;

        if self.is_executing(handle) {
            if let Some(record) = self.timers.get_mut(&handle) {
                if record.looping {
                    record.expire_time += count as f64 * record.rate;
                    record.status = TimerStatus::Active;
                    record.callback = callback;
                    self.arm(handle);
                } else {
                    self.timers.remove(&handle);
                }
            }
        } else if let Some(record) = self.timers.get_mut(&handle) {
            // Paused or re-staged by a callback; keep it callable
            record.callback = callback;
        }

        self.currently_executing.invalidate();
        fired
    }
}

impl std::fmt::Debug for Scheduler {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Scheduler")
            .field("timers", &self.timers.len())
            .field("pending", &self.pending.len())
            .field("paused", &self.paused.len())
            .field("active_scaled", &self.active_scaled.len())
            .field("active_unscaled", &self.active_unscaled.len())
            .field("last_processed_step", &self.last_processed_step)
            .field("scaled_time", &self.scaled_time)
            .field("unscaled_time", &self.unscaled_time)
            .finish()
    }
}

/// Clocks only move forward
fn sanitize_delta(delta: f64, clock: &str) -> f64 {
    if delta.is_finite() && delta >= 0.0 {
        delta
    } else {
        warn!(delta, clock, "Scheduler::tick: invalid delta, treating as zero");
        0.0
    }
}
