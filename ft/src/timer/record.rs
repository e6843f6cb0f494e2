//! Timer records and their configuration types

use serde::{Deserialize, Serialize};
use tracing::warn;

use super::{Scheduler, TimerHandle};

/// Callback invoked when a timer fires
///
/// The callback receives the scheduler that is firing it so it can set, pause,
/// resume or clear timers (including its own) while executing.
pub type TimerCallback = Box<dyn FnMut(&mut Scheduler)>;

/// Lifecycle state of a timer record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum TimerStatus {
    /// Staged until the next tick resolves its expiry
    Pending,
    /// Armed in the active order
    Active,
    /// Parked with a relative remaining delay
    Paused,
    /// Callback currently running
    Executing,
    /// Cancelled while armed; swept lazily by the drain
    ActivePendingRemoval,
}

impl std::fmt::Display for TimerStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let s = match self {
            Self::Pending => "pending",
            Self::Active => "active",
            Self::Paused => "paused",
            Self::Executing => "executing",
            Self::ActivePendingRemoval => "active-pending-removal",
        };
        write!(f, "{}", s)
    }
}

/// Which accumulated time base governs a timer
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TimerClock {
    /// Game time, affected by the frame clock's time scale
    Scaled,
    /// Real time, unaffected by time scale
    #[default]
    Unscaled,
}

impl std::fmt::Display for TimerClock {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Scaled => write!(f, "scaled"),
            Self::Unscaled => write!(f, "unscaled"),
        }
    }
}

/// Optional settings for [`Scheduler::set_timer`]
///
/// Defaults: one-shot, first expiry after `rate` seconds, unscaled clock.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct TimerOptions {
    /// Re-arm after every firing
    pub looping: bool,

    /// Delay before the first firing; `None` or a negative value means `rate`
    pub initial_delay: Option<f64>,

    /// Time base the timer runs on
    pub clock: TimerClock,
}

impl TimerOptions {
    /// Options for a repeating timer
    pub fn looping() -> Self {
        Self {
            looping: true,
            ..Default::default()
        }
    }

    pub fn with_initial_delay(mut self, delay: f64) -> Self {
        self.initial_delay = Some(delay);
        self
    }

    pub fn with_clock(mut self, clock: TimerClock) -> Self {
        self.clock = clock;
        self
    }

    /// Relative delay before the first firing
    pub(crate) fn first_delay(&self, rate: f64) -> f64 {
        match self.initial_delay {
            Some(delay) if delay >= 0.0 => delay,
            _ => rate,
        }
    }
}

/// Mutable state for one scheduled callback
///
/// Owned by the scheduler's handle table and referenced elsewhere only by handle.
/// While Pending or Paused `expire_time` holds a delay relative to the record's
/// clock; otherwise it is an absolute point on that clock.
pub(crate) struct TimerRecord {
    pub handle: TimerHandle,
    pub status: TimerStatus,
    pub rate: f64,
    pub expire_time: f64,
    pub looping: bool,
    pub clock: TimerClock,
    /// Taken out while the callback runs so the scheduler can be lent to it
    pub callback: Option<TimerCallback>,
}

impl TimerRecord {
    pub fn new(handle: TimerHandle, callback: TimerCallback, rate: f64, options: &TimerOptions) -> Self {
        Self {
            handle,
            status: TimerStatus::Pending,
            rate,
            expire_time: options.first_delay(rate),
            looping: options.looping,
            clock: options.clock,
            callback: Some(callback),
        }
    }

    /// Number of invocations owed when firing at `now`
    ///
    /// One-shot timers fire once. Looping timers fire once per period that
    /// elapsed since `expire_time`, so a long step catches up missed periods.
    pub fn execution_count(&self, now: f64) -> u64 {
        if !self.looping || self.rate <= 0.0 {
            return 1;
        }
        let behind = ((now - self.expire_time) / self.rate).floor();
        if !(behind.is_finite() && behind > 0.0) {
            return 1;
        }
        // Every missed period is owed, so only a degenerate rate/delta pair lands here
        if behind >= u64::MAX as f64 {
            warn!(handle = %self.handle, behind, "TimerRecord::execution_count: catch-up count saturated");
            return u64::MAX;
        }
        behind as u64 + 1
    }
}

impl std::fmt::Debug for TimerRecord {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TimerRecord")
            .field("handle", &self.handle)
            .field("status", &self.status)
            .field("rate", &self.rate)
            .field("expire_time", &self.expire_time)
            .field("looping", &self.looping)
            .field("clock", &self.clock)
            .field("has_callback", &self.callback.is_some())
            .finish()
    }
}
