//! Statistics and snapshot types for the scheduler

use serde::Serialize;

use super::{TimerClock, TimerHandle, TimerStatus};

/// Statistics for the scheduler
#[derive(Debug, Default, Clone, PartialEq, Eq, Serialize)]
pub struct SchedulerStats {
    /// Timers created by `set_timer` / `set_timer_next_tick`
    pub total_set: u64,
    /// Callback invocations, counting every catch-up repeat
    pub total_fired: u64,
    /// Successful cancellations (explicit, replaced, or cleared in bulk)
    pub total_cleared: u64,
    /// Cancelled records swept lazily out of the active order
    pub total_swept: u64,
    /// Ticks that ran (skipped duplicate steps excluded)
    pub total_ticks: u64,
    /// Largest number of simultaneously armed timers
    pub peak_active: usize,
}

/// Snapshot of one live timer for display
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TimerInfo {
    pub handle: TimerHandle,
    pub status: TimerStatus,
    pub rate: f64,
    pub looping: bool,
    pub clock: TimerClock,
    /// Seconds until the next firing on the timer's own clock
    pub remaining: f64,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_default_zeroed() {
        let stats = SchedulerStats::default();
        assert_eq!(stats.total_set, 0);
        assert_eq!(stats.total_fired, 0);
        assert_eq!(stats.peak_active, 0);
    }

    #[test]
    fn test_timer_info_serializes() {
        let info = TimerInfo {
            handle: TimerHandle::from_raw(9),
            status: TimerStatus::Paused,
            rate: 1.0,
            looping: true,
            clock: TimerClock::Scaled,
            remaining: 0.25,
        };
        let json = serde_json::to_value(&info).unwrap();
        assert_eq!(json["handle"], 9);
        assert_eq!(json["status"], "paused");
        assert_eq!(json["clock"], "scaled");
    }
}
