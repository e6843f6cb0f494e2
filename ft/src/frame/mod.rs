//! Frame clock
//!
//! A simulated per-step clock that drives the timer scheduler. Each step
//! supplies a scaled and an unscaled delta plus a monotonically increasing
//! step id; timers fire before any other per-step work.

mod config;
mod driver;
mod time;

pub use config::FrameConfig;
pub use driver::{FrameError, FrameLoop, UpdateFn, UpdatePhase};
pub use time::FrameTime;
