//! frametimer - Frame-stepped Timer Scheduler
//!
//! Delayed, repeating and pausable callbacks driven by a simulated frame
//! clock. The host advances the scheduler once per step with a scaled and an
//! unscaled delta; due timers fire in expiry order, catching up on periods
//! missed by long steps.
//!
//! # Core Concepts
//!
//! - **Explicit stepping**: Nothing fires outside [`timer::Scheduler::tick`]
//! - **Stable handles**: Handles are never reused, so stale ones are harmless
//! - **Re-entrant callbacks**: A firing callback may mutate any timer, itself included
//! - **Two clocks**: Scaled (game) time and unscaled (real) time
//!
//! # Modules
//!
//! - [`timer`] - Scheduler, handles and timer state
//! - [`frame`] - Frame loop that drives the scheduler and per-step updates
//! - [`scenario`] - YAML scenario replay
//! - [`config`] - Configuration types and loading
//! - [`cli`] - Command-line interface

pub mod cli;
pub mod config;
pub mod frame;
pub mod scenario;
pub mod timer;

pub use frame::{FrameConfig, FrameLoop, FrameTime, UpdatePhase};
pub use scenario::{Scenario, ScenarioError, ScenarioReport};
pub use timer::{Scheduler, TimerClock, TimerHandle, TimerOptions, TimerStatus};
