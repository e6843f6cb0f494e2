//! Frame loop driver
//!
//! Owns a [`Scheduler`] and advances it once per step, ahead of every
//! registered per-step update.

use eyre::Result;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, trace};

use super::{FrameConfig, FrameTime};
use crate::timer::Scheduler;

/// Per-step update callback
pub type UpdateFn = Box<dyn FnMut(&mut Scheduler, &FrameTime)>;

/// Phase of a step an update runs in, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UpdatePhase {
    /// Once per whole fixed timestep of scaled time accumulated
    Fixed,
    /// Once per step
    Update,
    /// Once per step, after every `Update`
    Late,
}

impl std::fmt::Display for UpdatePhase {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            Self::Fixed => write!(f, "fixed"),
            Self::Update => write!(f, "update"),
            Self::Late => write!(f, "late"),
        }
    }
}

/// Errors from the update registry
#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("{phase} update '{name}' is already registered")]
    AlreadyRegistered { phase: UpdatePhase, name: String },

    #[error("{phase} update '{name}' is not registered")]
    NotRegistered { phase: UpdatePhase, name: String },
}

struct Registration {
    name: String,
    update: UpdateFn,
}

/// Drives a scheduler and per-step updates from a simulated frame clock
pub struct FrameLoop {
    config: FrameConfig,
    scheduler: Scheduler,
    step: u64,
    time: f64,
    unscaled_time: f64,
    fixed_accumulator: f64,
    last_frame: FrameTime,
    fixed: Vec<Registration>,
    update: Vec<Registration>,
    late: Vec<Registration>,
}

impl FrameLoop {
    /// Create a frame loop with a fresh scheduler; fails if `config` does not validate
    pub fn new(config: FrameConfig) -> Result<Self> {
        Self::with_scheduler(config, Scheduler::new())
    }

    /// Drive an existing scheduler
    pub fn with_scheduler(config: FrameConfig, scheduler: Scheduler) -> Result<Self> {
        debug!(?config, "FrameLoop::with_scheduler: called");
        config.validate()?;
        Ok(Self {
            config,
            scheduler,
            step: 0,
            time: 0.0,
            unscaled_time: 0.0,
            fixed_accumulator: 0.0,
            last_frame: FrameTime::default(),
            fixed: Vec::new(),
            update: Vec::new(),
            late: Vec::new(),
        })
    }

    /// Register a named update in a phase
    pub fn register<F>(&mut self, phase: UpdatePhase, name: impl Into<String>, update: F) -> Result<(), FrameError>
    where
        F: FnMut(&mut Scheduler, &FrameTime) + 'static,
    {
        let name = name.into();
        debug!(%phase, %name, "FrameLoop::register: called");
        if self.is_registered(phase, &name) {
            return Err(FrameError::AlreadyRegistered { phase, name });
        }
        self.phase_mut(phase).push(Registration {
            name,
            update: Box::new(update),
        });
        Ok(())
    }

    /// Remove a named update from a phase
    pub fn unregister(&mut self, phase: UpdatePhase, name: &str) -> Result<(), FrameError> {
        debug!(%phase, %name, "FrameLoop::unregister: called");
        let registrations = self.phase_mut(phase);
        match registrations.iter().position(|r| r.name == name) {
            Some(index) => {
                registrations.remove(index);
                Ok(())
            }
            None => Err(FrameError::NotRegistered {
                phase,
                name: name.to_string(),
            }),
        }
    }

    pub fn is_registered(&self, phase: UpdatePhase, name: &str) -> bool {
        self.phase(phase).iter().any(|r| r.name == name)
    }

    /// Advance one step by the configured delta
    pub fn step(&mut self) -> FrameTime {
        self.step_with(self.config.delta)
    }

    /// Advance one step by `unscaled_delta` real seconds
    ///
    /// Timers fire first, then the fixed, update and late phases run in
    /// registration order.
    pub fn step_with(&mut self, unscaled_delta: f64) -> FrameTime {
        let unscaled = if unscaled_delta.is_finite() && unscaled_delta > 0.0 {
            unscaled_delta
        } else {
            0.0
        };
        let scaled = unscaled.min(self.config.max_delta) * self.config.time_scale;

        self.step += 1;
        self.time += scaled;
        self.unscaled_time += unscaled;
        let frame = FrameTime {
            step: self.step,
            delta: scaled,
            unscaled_delta: unscaled,
            time: self.time,
            unscaled_time: self.unscaled_time,
        };
        trace!(?frame, "FrameLoop::step_with: called");

        self.scheduler.tick(scaled, unscaled, self.step);

        self.fixed_accumulator += scaled;
        let fixed_frame = FrameTime {
            delta: self.config.fixed_timestep,
            ..frame
        };
        while self.fixed_accumulator >= self.config.fixed_timestep {
            self.fixed_accumulator -= self.config.fixed_timestep;
            for registration in &mut self.fixed {
                (registration.update)(&mut self.scheduler, &fixed_frame);
            }
        }

        for registration in &mut self.update {
            (registration.update)(&mut self.scheduler, &frame);
        }
        for registration in &mut self.late {
            (registration.update)(&mut self.scheduler, &frame);
        }

        self.last_frame = frame;
        frame
    }

    /// Advance `frames` steps by the configured delta
    pub fn run(&mut self, frames: u64) -> FrameTime {
        debug!(frames, "FrameLoop::run: called");
        for _ in 0..frames {
            self.step();
        }
        self.last_frame
    }

    /// Timing of the most recent step
    pub fn frame_time(&self) -> FrameTime {
        self.last_frame
    }

    pub fn time_scale(&self) -> f64 {
        self.config.time_scale
    }

    /// Set the scaled clock multiplier; negative or non-finite values freeze it
    pub fn set_time_scale(&mut self, scale: f64) {
        debug!(scale, "FrameLoop::set_time_scale: called");
        self.config.time_scale = if scale.is_finite() && scale > 0.0 { scale } else { 0.0 };
    }

    pub fn config(&self) -> &FrameConfig {
        &self.config
    }

    pub fn scheduler(&self) -> &Scheduler {
        &self.scheduler
    }

    pub fn scheduler_mut(&mut self) -> &mut Scheduler {
        &mut self.scheduler
    }

    pub fn into_scheduler(self) -> Scheduler {
        self.scheduler
    }

    fn phase(&self, phase: UpdatePhase) -> &Vec<Registration> {
        match phase {
            UpdatePhase::Fixed => &self.fixed,
            UpdatePhase::Update => &self.update,
            UpdatePhase::Late => &self.late,
        }
    }

    fn phase_mut(&mut self, phase: UpdatePhase) -> &mut Vec<Registration> {
        match phase {
            UpdatePhase::Fixed => &mut self.fixed,
            UpdatePhase::Update => &mut self.update,
            UpdatePhase::Late => &mut self.late,
        }
    }
}

impl std::fmt::Debug for FrameLoop {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FrameLoop")
            .field("config", &self.config)
            .field("step", &self.step)
            .field("time", &self.time)
            .field("unscaled_time", &self.unscaled_time)
            .field("fixed", &self.fixed.len())
            .field("update", &self.update.len())
            .field("late", &self.late.len())
            .field("scheduler", &self.scheduler)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::timer::{TimerClock, TimerHandle, TimerOptions};
    use std::cell::{Cell, RefCell};
    use std::rc::Rc;

    fn config(delta: f64) -> FrameConfig {
        FrameConfig {
            delta,
            max_delta: 1.0,
            fixed_timestep: 0.25,
            ..Default::default()
        }
    }

    #[test]
    fn test_timers_fire_before_updates() {
        let mut frames = FrameLoop::new(config(0.5)).unwrap();
        let log = Rc::new(RefCell::new(Vec::new()));

        let l = log.clone();
        let mut h = TimerHandle::INVALID;
        frames
            .scheduler_mut()
            .set_timer(&mut h, move |_| l.borrow_mut().push("timer"), 0.25, TimerOptions::default());

        for (phase, name) in [
            (UpdatePhase::Late, "late"),
            (UpdatePhase::Update, "update"),
            (UpdatePhase::Fixed, "fixed"),
        ] {
            let l = log.clone();
            frames.register(phase, name, move |_, _| l.borrow_mut().push(name)).unwrap();
        }

        let frame = frames.step();
        assert_eq!(frame.step, 1);
        assert_eq!(*log.borrow(), vec!["timer", "fixed", "fixed", "update", "late"]);
    }

    #[test]
    fn test_fixed_phase_accumulates_remainder() {
        let mut frames = FrameLoop::new(config(0.125)).unwrap();
        let count = Rc::new(Cell::new(0));
        let c = count.clone();
        frames
            .register(UpdatePhase::Fixed, "physics", move |_, frame| {
                assert_eq!(frame.delta, 0.25);
                c.set(c.get() + 1);
            })
            .unwrap();

        frames.step();
        assert_eq!(count.get(), 0);
        frames.step();
        assert_eq!(count.get(), 1);
        frames.run(4);
        assert_eq!(count.get(), 3);
    }

    #[test]
    fn test_invalid_config_rejected() {
        for bad in [
            FrameConfig {
                fixed_timestep: 0.0,
                ..Default::default()
            },
            FrameConfig {
                fixed_timestep: f64::NAN,
                ..Default::default()
            },
            FrameConfig {
                max_delta: -1.0,
                ..Default::default()
            },
        ] {
            let err = FrameLoop::new(bad).unwrap_err();
            assert!(err.to_string().starts_with("frame."));
        }

        let err = FrameLoop::with_scheduler(config(-0.5), Scheduler::new()).unwrap_err();
        assert!(err.to_string().contains("frame.delta"));
    }

    #[test]
    fn test_duplicate_registration_rejected() {
        let mut frames = FrameLoop::new(FrameConfig::default()).unwrap();
        frames.register(UpdatePhase::Update, "ui", |_, _| {}).unwrap();

        let err = frames.register(UpdatePhase::Update, "ui", |_, _| {}).unwrap_err();
        assert_eq!(
            err,
            FrameError::AlreadyRegistered {
                phase: UpdatePhase::Update,
                name: "ui".to_string()
            }
        );

        // Same name in another phase is fine
        assert!(frames.register(UpdatePhase::Late, "ui", |_, _| {}).is_ok());
    }

    #[test]
    fn test_unregister() {
        let mut frames = FrameLoop::new(FrameConfig::default()).unwrap();
        frames.register(UpdatePhase::Update, "ui", |_, _| {}).unwrap();

        assert!(frames.unregister(UpdatePhase::Update, "ui").is_ok());
        assert!(!frames.is_registered(UpdatePhase::Update, "ui"));
        let err = frames.unregister(UpdatePhase::Update, "ui").unwrap_err();
        assert_eq!(err.to_string(), "update update 'ui' is not registered");
    }

    #[test]
    fn test_time_scale_only_affects_scaled_clock() {
        let mut frames = FrameLoop::new(config(0.5)).unwrap();
        frames.set_time_scale(0.0);

        let frame = frames.step();
        assert_eq!(frame.delta, 0.0);
        assert_eq!(frame.unscaled_delta, 0.5);
        assert_eq!(frames.scheduler().current_time(TimerClock::Scaled), 0.0);
        assert_eq!(frames.scheduler().current_time(TimerClock::Unscaled), 0.5);

        frames.set_time_scale(2.0);
        let frame = frames.step();
        assert_eq!(frame.time, 1.0);
    }

    #[test]
    fn test_max_delta_clamps_scaled_only() {
        let mut frames = FrameLoop::new(config(0.5)).unwrap();
        let frame = frames.step_with(4.0);
        assert_eq!(frame.delta, 1.0);
        assert_eq!(frame.unscaled_delta, 4.0);
    }

    #[test]
    fn test_update_can_schedule_timers() {
        let mut frames = FrameLoop::new(config(0.5)).unwrap();
        let fired = Rc::new(Cell::new(0));
        let f = fired.clone();
        frames
            .register(UpdatePhase::Update, "spawner", move |scheduler, frame| {
                if frame.step == 1 {
                    let f = f.clone();
                    let mut h = TimerHandle::INVALID;
                    scheduler.set_timer(&mut h, move |_| f.set(f.get() + 1), 0.75, TimerOptions::default());
                }
            })
            .unwrap();

        // Set at 0.5, due after 1.25
        frames.run(2);
        assert_eq!(fired.get(), 0);
        frames.step();
        assert_eq!(fired.get(), 1);
    }
}
