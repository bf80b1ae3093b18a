//! Load testing: profiles, injection schedules and the virtual-user driver

pub mod injection;
pub mod profile;
pub mod simulation;
pub mod stats;

pub use injection::{build_injection, InjectionPlan, InjectionStep, LoopPolicy};
pub use profile::{LoadProfile, StandardProfile, SteppingProfile, UltimateProfile, UltimateStep};
pub use simulation::{
    ChainStep, LoadRunResult, LoadRunner, OmittedResults, RunHandle, RunStatus, DEFAULT_MAX_RESULTS_PER_CASE,
};
pub use stats::{LatencyStats, LoadStats, StatsCollector};
