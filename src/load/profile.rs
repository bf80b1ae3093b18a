//! Load profile definitions
//!
//! A scenario carries exactly one load shape, selected by the `type` tag:
//!
//! ```yaml
//! profile:
//!   type: stepping
//!   num_threads: 10
//!   start_users: 2
//!   increment_users: 3
//!   increment_time_seconds: 10
//!   hold_load_seconds: 20
//! ```

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum LoadProfile {
    #[serde(alias = "STANDARD", alias = "Standard")]
    Standard(StandardProfile),
    #[serde(alias = "STEPPING", alias = "Stepping")]
    Stepping(SteppingProfile),
    #[serde(alias = "ULTIMATE", alias = "Ultimate")]
    Ultimate(UltimateProfile),
}

impl LoadProfile {
    pub fn kind(&self) -> &'static str {
        match self {
            LoadProfile::Standard(_) => "standard",
            LoadProfile::Stepping(_) => "stepping",
            LoadProfile::Ultimate(_) => "ultimate",
        }
    }
}

impl Default for LoadProfile {
    fn default() -> Self {
        LoadProfile::Standard(StandardProfile::default())
    }
}

/// Fixed ramp, or with `scheduler` a delayed ramp held for `duration_seconds`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StandardProfile {
    #[serde(alias = "numThreads")]
    pub num_threads: u32,

    #[serde(default, alias = "rampUp", alias = "rampUpSeconds")]
    pub ramp_up_seconds: u64,

    /// Chain repetitions per user without scheduler (default 1)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub loops: Option<u32>,

    #[serde(default)]
    pub scheduler: bool,

    #[serde(default, alias = "delay", alias = "delaySeconds")]
    pub delay_seconds: u64,

    #[serde(default, alias = "duration", alias = "durationSeconds")]
    pub duration_seconds: u64,
}

impl Default for StandardProfile {
    fn default() -> Self {
        Self {
            num_threads: 1,
            ramp_up_seconds: 0,
            loops: None,
            scheduler: false,
            delay_seconds: 0,
            duration_seconds: 0,
        }
    }
}

/// Users added in batches until `num_threads` is reached, then held
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SteppingProfile {
    #[serde(alias = "numThreads")]
    pub num_threads: u32,

    #[serde(default, alias = "startUsers")]
    pub start_users: u32,

    #[serde(default, alias = "incrementUsers")]
    pub increment_users: u32,

    #[serde(default, alias = "incrementTime", alias = "incrementTimeSeconds")]
    pub increment_time_seconds: u64,

    #[serde(default, alias = "holdLoad", alias = "holdLoadSeconds")]
    pub hold_load_seconds: u64,

    #[serde(default, alias = "initialDelay", alias = "initialDelaySeconds")]
    pub initial_delay_seconds: u64,
}

/// Arbitrary timed steps
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UltimateProfile {
    pub steps: Vec<UltimateStep>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct UltimateStep {
    #[serde(alias = "startTime")]
    pub start_time: u64,

    #[serde(alias = "initialLoad")]
    pub initial_load: u32,

    #[serde(default, alias = "startupTime")]
    pub startup_time: u64,

    #[serde(default, alias = "holdTime")]
    pub hold_time: u64,

    #[serde(default, alias = "shutdownTime")]
    pub shutdown_time: u64,
}

impl UltimateStep {
    /// When this step's users are gone, `None` on overflow
    pub fn end(&self) -> Option<u64> {
        self.start_time
            .checked_add(self.startup_time)?
            .checked_add(self.hold_time)?
            .checked_add(self.shutdown_time)
    }
}
