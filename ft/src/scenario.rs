//! Scenario replay
//!
//! A scenario is a YAML document describing timers to schedule and actions to
//! apply at given steps. Replaying it on a [`FrameLoop`] yields the sequence
//! of timer firings, which is what `ft run` prints.
//!
//! ```yaml
//! frames: 8
//! delta: 0.5
//! timers:
//!   - name: heartbeat
//!     rate: 1.0
//!     loop: true
//!   - name: fuse
//!     rate: 2.5
//!     clock: scaled
//! actions:
//!   - { step: 2, op: pause, timer: heartbeat }
//!   - { step: 4, op: resume, timer: heartbeat }
//!   - { step: 5, op: time-scale, value: 0.0 }
//! ```

use std::cell::{Cell, RefCell};
use std::collections::{BTreeMap, HashMap, HashSet};
use std::fs;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};

use crate::frame::{FrameConfig, FrameLoop};
use crate::timer::{Scheduler, SchedulerStats, TimerClock, TimerHandle, TimerOptions, TimerStatus};

/// Errors from loading or replaying a scenario
#[derive(Debug, Error)]
pub enum ScenarioError {
    #[error("failed to read scenario file {}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to parse scenario YAML in {}", path.display())]
    Parse {
        path: PathBuf,
        #[source]
        source: serde_yaml::Error,
    },

    #[error("failed to parse scenario YAML")]
    Yaml(#[from] serde_yaml::Error),

    #[error("duplicate timer name '{0}'")]
    DuplicateTimer(String),

    #[error("action at step {step} references unknown timer '{name}'")]
    UnknownTimer { name: String, step: u64 },

    #[error("invalid action at step {step}: {reason}")]
    InvalidAction { step: u64, reason: String },

    #[error("scenario must simulate at least one frame")]
    InvalidFrames,

    #[error("invalid frame settings: {0}")]
    InvalidConfig(String),
}

fn default_true() -> bool {
    true
}

/// A timer declared by a scenario
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct TimerSpec {
    pub name: String,

    /// Period in seconds; zero or negative schedules nothing
    #[serde(default)]
    pub rate: f64,

    #[serde(default, rename = "loop")]
    pub looping: bool,

    /// First expiry; defaults to `rate`
    #[serde(default)]
    pub delay: Option<f64>,

    #[serde(default)]
    pub clock: TimerClock,

    /// Fire once on the next tick instead of after `rate`
    #[serde(default)]
    pub next_tick: bool,

    /// Schedule before the first step (otherwise only a `set` action starts it)
    #[serde(default = "default_true")]
    pub start: bool,
}

impl TimerSpec {
    fn options(&self) -> TimerOptions {
        TimerOptions {
            looping: self.looping,
            initial_delay: self.delay,
            clock: self.clock,
        }
    }
}

/// Operation applied by a scenario action
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ActionOp {
    /// (Re)start the named timer as declared
    Set,
    Pause,
    Resume,
    Clear,
    ClearAll,
    /// Change the frame loop's time scale from the next step on
    TimeScale,
}

impl ActionOp {
    fn needs_timer(&self) -> bool {
        matches!(self, Self::Set | Self::Pause | Self::Resume | Self::Clear)
    }
}

/// Something done at the end of a step, after timers fired
///
/// Step 0 runs before the first step.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Action {
    pub step: u64,
    pub op: ActionOp,
    #[serde(default)]
    pub timer: Option<String>,
    #[serde(default)]
    pub value: Option<f64>,
}

/// A scripted run of the frame loop
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct Scenario {
    /// Steps to simulate
    pub frames: u64,

    /// Overrides the configured per-step delta
    #[serde(default)]
    pub delta: Option<f64>,

    /// Overrides the configured time scale
    #[serde(default)]
    pub time_scale: Option<f64>,

    #[serde(default)]
    pub timers: Vec<TimerSpec>,

    #[serde(default)]
    pub actions: Vec<Action>,
}

/// One callback invocation observed during a replay
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FireEvent {
    pub step: u64,
    pub timer: String,
    pub scaled_time: f64,
    pub unscaled_time: f64,
}

/// Outcome of replaying a scenario
#[derive(Debug, Clone, Serialize)]
pub struct ScenarioReport {
    pub frames: u64,
    pub events: Vec<FireEvent>,
    /// Final status of every declared timer (`None` once gone)
    pub final_status: BTreeMap<String, Option<TimerStatus>>,
    pub stats: SchedulerStats,
}

impl ScenarioReport {
    /// How many times the named timer fired
    pub fn fire_count(&self, timer: &str) -> usize {
        self.events.iter().filter(|e| e.timer == timer).count()
    }

    /// Steps at which the named timer fired, one entry per invocation
    pub fn fire_steps(&self, timer: &str) -> Vec<u64> {
        self.events.iter().filter(|e| e.timer == timer).map(|e| e.step).collect()
    }
}

impl Scenario {
    /// Load and validate a scenario file
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ScenarioError> {
        let path = path.as_ref();
        debug!(path = %path.display(), "Scenario::load: called");
        let content = fs::read_to_string(path).map_err(|source| ScenarioError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        let scenario: Scenario = serde_yaml::from_str(&content).map_err(|source| ScenarioError::Parse {
            path: path.to_path_buf(),
            source,
        })?;
        scenario.validate()?;
        info!(
            path = %path.display(),
            frames = scenario.frames,
            timers = scenario.timers.len(),
            actions = scenario.actions.len(),
            "Loaded scenario"
        );
        Ok(scenario)
    }

    /// Parse and validate a scenario from YAML text
    pub fn from_yaml(content: &str) -> Result<Self, ScenarioError> {
        let scenario: Scenario = serde_yaml::from_str(content)?;
        scenario.validate()?;
        Ok(scenario)
    }

    /// Check names and action arguments
    pub fn validate(&self) -> Result<(), ScenarioError> {
        if self.frames == 0 {
            return Err(ScenarioError::InvalidFrames);
        }

        let mut names = HashSet::new();
        for timer in &self.timers {
            if !names.insert(timer.name.as_str()) {
                return Err(ScenarioError::DuplicateTimer(timer.name.clone()));
            }
        }

        for action in &self.actions {
            if action.op.needs_timer() {
                let Some(name) = &action.timer else {
                    return Err(ScenarioError::InvalidAction {
                        step: action.step,
                        reason: format!("{:?} needs a timer name", action.op),
                    });
                };
                if !names.contains(name.as_str()) {
                    return Err(ScenarioError::UnknownTimer {
                        name: name.clone(),
                        step: action.step,
                    });
                }
            }
            if action.op == ActionOp::TimeScale && action.value.is_none() {
                return Err(ScenarioError::InvalidAction {
                    step: action.step,
                    reason: "time-scale needs a value".to_string(),
                });
            }
        }

        Ok(())
    }

    /// Frame settings after applying this scenario's overrides
    pub fn frame_config(&self, base: &FrameConfig) -> Result<FrameConfig, ScenarioError> {
        let mut config = base.clone();
        if let Some(delta) = self.delta {
            config.delta = delta;
        }
        if let Some(time_scale) = self.time_scale {
            config.time_scale = time_scale;
        }
        config
            .validate()
            .map_err(|e| ScenarioError::InvalidConfig(e.to_string()))?;
        Ok(config)
    }

    /// Replay the scenario for `self.frames` steps
    pub fn run(&self, base: &FrameConfig) -> Result<ScenarioReport, ScenarioError> {
        self.run_frames(base, self.frames)
    }

    /// Replay the scenario for an explicit number of steps
    pub fn run_frames(&self, base: &FrameConfig, frames: u64) -> Result<ScenarioReport, ScenarioError> {
        self.validate()?;
        let config = self.frame_config(base)?;
        debug!(frames, ?config, "Scenario::run_frames: called");

        let frame_loop = FrameLoop::new(config).map_err(|e| ScenarioError::InvalidConfig(e.to_string()))?;
        let mut replay = Replay::new(self, frame_loop);
        replay.apply_actions(0);
        for _ in 0..frames {
            replay.step();
        }

        let final_status = self
            .timers
            .iter()
            .map(|t| {
                let handle = replay.handles.get(&t.name).copied().unwrap_or_default();
                (t.name.clone(), replay.frames.scheduler().status(handle))
            })
            .collect();

        let report = ScenarioReport {
            frames,
            events: replay.log.take(),
            final_status,
            stats: replay.frames.scheduler().stats(),
        };
        info!(frames, fired = report.events.len(), "Scenario replay complete");
        Ok(report)
    }
}

/// Mutable state of one replay
struct Replay<'a> {
    scenario: &'a Scenario,
    frames: FrameLoop,
    handles: HashMap<String, TimerHandle>,
    log: Rc<RefCell<Vec<FireEvent>>>,
    /// Step the callbacks attribute their firings to
    step: Rc<Cell<u64>>,
}

impl<'a> Replay<'a> {
    fn new(scenario: &'a Scenario, frames: FrameLoop) -> Self {
        let mut replay = Self {
            scenario,
            frames,
            handles: HashMap::new(),
            log: Rc::new(RefCell::new(Vec::new())),
            step: Rc::new(Cell::new(0)),
        };
        for spec in scenario.timers.iter().filter(|t| t.start) {
            replay.start_timer(spec);
        }
        replay
    }

    fn step(&mut self) {
        self.step.set(self.step.get() + 1);
        let frame = self.frames.step();
        self.apply_actions(frame.step);
    }

    fn apply_actions(&mut self, step: u64) {
        let scenario = self.scenario;
        for action in scenario.actions.iter().filter(|a| a.step == step) {
            debug!(step, op = ?action.op, timer = ?action.timer, "Replay::apply_actions: applying");
            let handle = action
                .timer
                .as_ref()
                .and_then(|name| self.handles.get(name))
                .copied()
                .unwrap_or_default();
            match action.op {
                ActionOp::Set => {
                    if let Some(spec) = action.timer.as_ref().and_then(|n| scenario.timers.iter().find(|t| &t.name == n)) {
                        self.start_timer(spec);
                    }
                }
                ActionOp::Pause => {
                    self.frames.scheduler_mut().pause(handle);
                }
                ActionOp::Resume => {
                    self.frames.scheduler_mut().resume(handle);
                }
                ActionOp::Clear => {
                    self.frames.scheduler_mut().clear(handle);
                }
                ActionOp::ClearAll => self.frames.scheduler_mut().clear_all(),
                ActionOp::TimeScale => {
                    if let Some(value) = action.value {
                        self.frames.set_time_scale(value);
                    }
                }
            }
        }
    }

    fn start_timer(&mut self, spec: &TimerSpec) {
        let log = self.log.clone();
        let step = self.step.clone();
        let name = spec.name.clone();
        let callback = move |s: &mut Scheduler| {
            log.borrow_mut().push(FireEvent {
                step: step.get(),
                timer: name.clone(),
                scaled_time: s.current_time(TimerClock::Scaled),
                unscaled_time: s.current_time(TimerClock::Unscaled),
            });
        };

        let mut handle = self.handles.get(&spec.name).copied().unwrap_or_default();
        let scheduler = self.frames.scheduler_mut();
        if spec.next_tick {
            scheduler.set_timer_next_tick(&mut handle, callback);
        } else {
            scheduler.set_timer(&mut handle, callback, spec.rate, spec.options());
        }
        self.handles.insert(spec.name.clone(), handle);
    }
}
