//! Per-step timing snapshot

use serde::Serialize;

/// Timing for one step of the frame loop, as seen by update callbacks
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct FrameTime {
    /// Step counter, starting at 1 for the first step
    pub step: u64,
    /// Scaled seconds covered by this step (the fixed timestep in the fixed phase)
    pub delta: f64,
    /// Real seconds covered by this step
    pub unscaled_delta: f64,
    /// Accumulated scaled time
    pub time: f64,
    /// Accumulated real time
    pub unscaled_time: f64,
}
