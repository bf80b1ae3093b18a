//! Injection schedules
//!
//! Turns a [`LoadProfile`] into the ordered list of steps that bring virtual
//! users online, the run's maximum duration and how each user loops.
//! Steps are sequential: each one starts when the previous one ends.

use std::fmt;
use std::time::Duration;
use serde::Serialize;

use super::profile::{LoadProfile, StandardProfile, SteppingProfile, UltimateProfile};
use crate::errors::{PulserunError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(tag = "step", rename_all = "snake_case")]
pub enum InjectionStep {
    NothingFor { seconds: u64 },
    AtOnceUsers { users: u32 },
    RampUsers { users: u32, over_seconds: u64 },
}

impl InjectionStep {
    pub fn users(&self) -> u32 {
        match self {
            InjectionStep::NothingFor { .. } => 0,
            InjectionStep::AtOnceUsers { users } | InjectionStep::RampUsers { users, .. } => *users,
        }
    }

    pub fn seconds(&self) -> u64 {
        match self {
            InjectionStep::NothingFor { seconds } => *seconds,
            InjectionStep::AtOnceUsers { .. } => 0,
            InjectionStep::RampUsers { over_seconds, .. } => *over_seconds,
        }
    }
}

impl fmt::Display for InjectionStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            InjectionStep::NothingFor { seconds } => write!(f, "nothingFor({}s)", seconds),
            InjectionStep::AtOnceUsers { users } => write!(f, "atOnceUsers({})", users),
            InjectionStep::RampUsers { users, over_seconds } => {
                write!(f, "rampUsers({}) during {}s", users, over_seconds)
            }
        }
    }
}

/// How a virtual user repeats its chain
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum LoopPolicy {
    /// Run the chain this many times
    Repeat(u32),
    /// Run the chain until the plan's max duration elapses
    UntilDeadline,
}

impl fmt::Display for LoopPolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LoopPolicy::Repeat(n) => write!(f, "repeat {}x", n),
            LoopPolicy::UntilDeadline => f.write_str("until deadline"),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct InjectionPlan {
    pub steps: Vec<InjectionStep>,
    pub max_duration_seconds: i64,
    pub loop_policy: LoopPolicy,
}

impl InjectionPlan {
    pub fn total_users(&self) -> u32 {
        self.steps.iter().map(InjectionStep::users).sum()
    }

    pub fn max_duration(&self) -> Duration {
        Duration::from_secs(self.max_duration_seconds.max(0) as u64)
    }

    /// Start offset of every user, in injection order.
    ///
    /// Ramped users are spread evenly over the ramp, the first one at its start.
    pub fn arrivals(&self) -> Vec<Duration> {
        let mut offsets = Vec::with_capacity(self.total_users() as usize);
        let mut cursor = Duration::ZERO;
        for step in &self.steps {
            match *step {
                InjectionStep::NothingFor { seconds } => cursor += Duration::from_secs(seconds),
                InjectionStep::AtOnceUsers { users } => {
                    offsets.extend(std::iter::repeat(cursor).take(users as usize));
                }
                InjectionStep::RampUsers { users, over_seconds } => {
                    let over = Duration::from_secs(over_seconds);
                    for i in 0..users {
                        offsets.push(cursor + over.mul_f64(i as f64 / users as f64));
                    }
                    cursor += over;
                }
            }
        }
        offsets
    }
}

fn ramp(users: u32, over_seconds: u64) -> InjectionStep {
    if over_seconds == 0 {
        InjectionStep::AtOnceUsers { users }
    } else {
        InjectionStep::RampUsers { users, over_seconds }
    }
}

fn profile_error(message: impl Into<String>) -> PulserunError {
    PulserunError::Profile(message.into())
}

fn overflow(what: &str) -> PulserunError {
    profile_error(format!("{} overflows the supported duration range", what))
}

/// Seconds as the plan's signed duration
fn to_plan_seconds(seconds: u64, what: &str) -> Result<i64> {
    i64::try_from(seconds).map_err(|_| overflow(what))
}

/// Compute the injection plan for a load profile
pub fn build_injection(profile: &LoadProfile) -> Result<InjectionPlan> {
    let plan = match profile {
        LoadProfile::Standard(p) => standard(p),
        LoadProfile::Stepping(p) => stepping(p),
        LoadProfile::Ultimate(p) => ultimate(p),
    }?;

    // Arrival offsets are sums of step durations
    let injection_seconds = plan
        .steps
        .iter()
        .try_fold(0u64, |acc, step| acc.checked_add(step.seconds()))
        .ok_or_else(|| overflow("injection schedule"))?;
    to_plan_seconds(injection_seconds, "injection schedule")?;
    Ok(plan)
}

fn standard(p: &StandardProfile) -> Result<InjectionPlan> {
    if p.num_threads == 0 {
        return Err(profile_error("standard profile needs num_threads > 0"));
    }

    if !p.scheduler {
        let loops = p.loops.unwrap_or(1);
        if loops == 0 {
            return Err(profile_error("loops must be at least 1"));
        }
        return Ok(InjectionPlan {
            steps: vec![ramp(p.num_threads, p.ramp_up_seconds)],
            max_duration_seconds: to_plan_seconds(p.ramp_up_seconds, "ramp_up_seconds")?,
            loop_policy: LoopPolicy::Repeat(loops),
        });
    }

    let mut steps = Vec::new();
    if p.delay_seconds > 0 {
        steps.push(InjectionStep::NothingFor { seconds: p.delay_seconds });
    }
    steps.push(ramp(p.num_threads, p.ramp_up_seconds));

    let max = p
        .delay_seconds
        .checked_add(p.duration_seconds)
        .ok_or_else(|| overflow("delay_seconds + duration_seconds"))?;
    Ok(InjectionPlan {
        steps,
        max_duration_seconds: to_plan_seconds(max, "delay_seconds + duration_seconds")?,
        loop_policy: LoopPolicy::UntilDeadline,
    })
}

fn stepping(p: &SteppingProfile) -> Result<InjectionPlan> {
    if p.num_threads == 0 {
        return Err(profile_error("stepping profile needs num_threads > 0"));
    }

    let mut steps = Vec::new();
    if p.initial_delay_seconds > 0 {
        steps.push(InjectionStep::NothingFor { seconds: p.initial_delay_seconds });
    }

    let first = p.start_users.min(p.num_threads);
    steps.push(ramp(first, p.increment_time_seconds));

    let mut remaining = p.num_threads - first;
    if remaining > 0 && p.increment_users == 0 {
        return Err(profile_error(format!(
            "increment_users must be positive while {} users remain to be started",
            remaining
        )));
    }

    let mut batches: u64 = 0;
    while remaining > 0 {
        let batch = p.increment_users.min(remaining);
        steps.push(ramp(batch, p.increment_time_seconds));
        remaining -= batch;
        batches += 1;
    }

    let max = (batches + 1)
        .checked_mul(p.increment_time_seconds)
        .and_then(|ramps| ramps.checked_add(p.initial_delay_seconds))
        .and_then(|total| total.checked_add(p.hold_load_seconds))
        .ok_or_else(|| overflow("stepping profile duration"))?;
    Ok(InjectionPlan {
        steps,
        max_duration_seconds: to_plan_seconds(max, "stepping profile duration")?,
        loop_policy: LoopPolicy::UntilDeadline,
    })
}

fn ultimate(p: &UltimateProfile) -> Result<InjectionPlan> {
    if p.steps.is_empty() {
        return Err(profile_error("ultimate profile needs at least one step"));
    }

    let mut sorted = p.steps.clone();
    sorted.sort_by_key(|s| s.start_time);

    let mut steps = Vec::new();
    let mut cursor = 0;
    for step in &sorted {
        if step.start_time > cursor {
            steps.push(InjectionStep::NothingFor { seconds: step.start_time - cursor });
        }
        steps.push(ramp(step.initial_load, step.startup_time));
        cursor = step
            .start_time
            .checked_add(step.startup_time)
            .ok_or_else(|| overflow("ultimate step start_time + startup_time"))?;
    }

    let mut max = 0;
    for step in &sorted {
        max = max.max(step.end().ok_or_else(|| overflow("ultimate step end"))?);
    }
    Ok(InjectionPlan {
        steps,
        max_duration_seconds: to_plan_seconds(max, "ultimate profile duration")?,
        loop_policy: LoopPolicy::UntilDeadline,
    })
}
