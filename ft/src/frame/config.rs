//! Frame clock configuration

use eyre::{Result, eyre};
use serde::{Deserialize, Serialize};

/// Frame clock configuration
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub struct FrameConfig {
    /// Unscaled seconds per step when stepping without an explicit delta
    #[serde(default = "default_delta")]
    pub delta: f64,

    /// Multiplier applied to the scaled clock (0 freezes game time)
    #[serde(default = "default_time_scale")]
    pub time_scale: f64,

    /// Upper bound on a single step's scaled delta, before scaling
    #[serde(default = "default_max_delta")]
    pub max_delta: f64,

    /// Period of the fixed update phase, in scaled seconds
    #[serde(default = "default_fixed_timestep")]
    pub fixed_timestep: f64,
}

fn default_delta() -> f64 {
    1.0 / 60.0
}

fn default_time_scale() -> f64 {
    1.0
}

fn default_max_delta() -> f64 {
    1.0 / 3.0
}

fn default_fixed_timestep() -> f64 {
    0.02
}

impl Default for FrameConfig {
    fn default() -> Self {
        Self {
            delta: default_delta(),
            time_scale: default_time_scale(),
            max_delta: default_max_delta(),
            fixed_timestep: default_fixed_timestep(),
        }
    }
}

impl FrameConfig {
    /// Check that every duration is usable
    pub fn validate(&self) -> Result<()> {
        for (name, value) in [
            ("delta", self.delta),
            ("max-delta", self.max_delta),
            ("fixed-timestep", self.fixed_timestep),
        ] {
            if !value.is_finite() || value <= 0.0 {
                return Err(eyre!("frame.{} must be a positive number, got {}", name, value));
            }
        }
        if !self.time_scale.is_finite() || self.time_scale < 0.0 {
            return Err(eyre!(
                "frame.time-scale must be zero or positive, got {}",
                self.time_scale
            ));
        }
        Ok(())
    }
}
