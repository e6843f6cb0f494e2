//! Timer scheduler
//!
//! Delayed and repeating callbacks driven by an external frame clock. Timers
//! are addressed by [`TimerHandle`] and move through a small state machine:
//!
//! ```text
//! Pending -> Active -> Executing -> Active (looping) | removed (one-shot)
//!            Active <-> Paused
//!            Active -> ActivePendingRemoval -> removed (swept by the drain)
//! ```
//!
//! Callbacks receive `&mut Scheduler` and may set, pause, resume or clear any
//! timer, including the one currently firing.

mod core;
mod handle;
mod order;
mod record;
mod stats;

pub use self::core::Scheduler;
pub use handle::TimerHandle;
pub use record::{TimerCallback, TimerClock, TimerOptions, TimerStatus};
pub use stats::{SchedulerStats, TimerInfo};
