//! Virtual-user simulation
//!
//! Plays an [`InjectionPlan`] on the tokio runtime. Every injected user runs
//! the scenario's compiled chain according to the plan's [`LoopPolicy`],
//! rendering each request afresh on every iteration. Results stream back
//! over a channel into the stats collector. Every result feeds the stats,
//! but only a bounded number of full results is kept per case so long runs
//! do not grow without limit.
//!
//! [`LoadRunner::start`] returns immediately with a [`RunHandle`]; dropping
//! the handle does not stop the run, [`RunHandle::cancel`] does.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};
use serde::Serialize;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use super::injection::{build_injection, InjectionPlan, LoopPolicy};
use super::stats::{LoadStats, StatsCollector};
use crate::context::RunContext;
use crate::errors::{PulserunError, Result};
use crate::models::{Phase, Scenario};
use crate::pipeline::{DependencyExpander, ExecutionItem, ExecutionResult, PipelineRunner};
use crate::transport::Transport;

/// Full results kept per (origin, phase, tcid) unless overridden
pub const DEFAULT_MAX_RESULTS_PER_CASE: usize = 20;

/// One element of a user's chain
#[derive(Debug, Clone)]
pub struct ChainStep {
    pub item: ExecutionItem,
    /// Pause after the request, seconds
    pub wait_seconds: u64,
}

/// How a load run ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum RunStatus {
    Completed,
    Cancelled,
    Failed,
}

#[derive(Debug)]
pub struct LoadRunResult {
    pub scenario: String,
    pub status: RunStatus,
    pub users: u32,
    pub duration: Duration,
    pub stats: LoadStats,
    /// Retained results; see [`LoadRunner::with_max_results_per_case`]
    pub results: Vec<ExecutionResult>,
    /// Results counted in `stats` but not retained
    pub omitted: Vec<OmittedResults>,
    pub error: Option<String>,
}

/// Number of dropped results for one case
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct OmittedResults {
    pub origin_tcid: String,
    pub phase: Phase,
    pub tcid: String,
    pub count: usize,
}

impl LoadRunResult {
    fn failed(scenario: &str, error: String) -> Self {
        Self {
            scenario: scenario.to_string(),
            status: RunStatus::Failed,
            users: 0,
            duration: Duration::ZERO,
            stats: LoadStats::default(),
            results: Vec::new(),
            omitted: Vec::new(),
            error: Some(error),
        }
    }
}

/// Handle to a load run in flight
pub struct RunHandle {
    scenario: String,
    token: CancellationToken,
    join: JoinHandle<LoadRunResult>,
}

impl RunHandle {
    /// Ask the run to stop: no more users are injected and running users
    /// stop after their in-flight request
    pub fn cancel(&self) {
        self.token.cancel();
    }

    pub fn token(&self) -> CancellationToken {
        self.token.clone()
    }

    /// Wait for the run to end
    pub async fn wait(self) -> LoadRunResult {
        match self.join.await {
            Ok(result) => result,
            Err(e) => {
                warn!(scenario = %self.scenario, error = %e, "Load driver failed");
                LoadRunResult::failed(&self.scenario, format!("Load driver failed: {}", e))
            }
        }
    }
}

/// Starts scenarios under their load profiles
pub struct LoadRunner<T: Transport> {
    runner: Arc<PipelineRunner<T>>,
    ctx: Arc<RunContext>,
    tags: Vec<String>,
    max_results_per_case: Option<usize>,
}

impl<T: Transport> LoadRunner<T> {
    pub fn new(runner: Arc<PipelineRunner<T>>, ctx: Arc<RunContext>) -> Self {
        Self {
            runner,
            ctx,
            tags: Vec::new(),
            max_results_per_case: Some(DEFAULT_MAX_RESULTS_PER_CASE),
        }
    }

    /// Cap on full results kept per case. The first failing result of a
    /// case is always kept. `None` keeps everything.
    pub fn with_max_results_per_case(mut self, max: Option<usize>) -> Self {
        self.max_results_per_case = max;
        self
    }

    /// Only run steps without tags or with at least one of these
    pub fn with_tags(mut self, tags: Vec<String>) -> Self {
        self.tags = tags;
        self
    }

    /// Expand scenario steps into the chain each user runs
    pub fn compile(&self, scenario: &Scenario) -> Result<Vec<ChainStep>> {
        let store = self.runner.store();
        let expander = DependencyExpander::new(store);
        let mut chain = Vec::new();

        for step in &scenario.steps {
            if !self.tags.is_empty() && !step.tags.is_empty() && !step.tags.iter().any(|t| self.tags.contains(t)) {
                debug!(tcid = %step.tcid, "Step filtered out by tags");
                continue;
            }

            let test = store.test(&step.tcid).ok_or_else(|| PulserunError::DependencyNotFound {
                tcid: step.tcid.clone(),
                referenced_by: format!("scenario {}", scenario.name),
            })?;

            for item in expander.expand(std::slice::from_ref(&test))? {
                let wait_seconds = if item.is_main() {
                    step.wait_time.unwrap_or(item.test.wait_time)
                } else {
                    item.test.wait_time
                };
                chain.push(ChainStep { item, wait_seconds });
            }
        }

        if chain.is_empty() {
            return Err(PulserunError::Definition(format!(
                "Scenario '{}' has no runnable steps",
                scenario.name
            )));
        }
        Ok(chain)
    }

    /// Build the plan and chain, then launch the run in the background.
    ///
    /// Profile and expansion errors are returned here, before anything is sent.
    pub fn start(&self, scenario: &Scenario) -> Result<RunHandle> {
        let plan = build_injection(&scenario.profile)?;
        let chain = Arc::new(self.compile(scenario)?);
        let token = CancellationToken::new();

        info!(
            scenario = %scenario.name,
            profile = scenario.profile.kind(),
            users = plan.total_users(),
            max_duration = plan.max_duration_seconds,
            chain = chain.len(),
            "Starting load run"
        );

        let driver = Driver {
            scenario: scenario.name.clone(),
            runner: self.runner.clone(),
            ctx: self.ctx.clone(),
            chain,
            plan,
            max_results_per_case: self.max_results_per_case,
            token: token.clone(),
        };
        let join = tokio::spawn(driver.run());

        Ok(RunHandle {
            scenario: scenario.name.clone(),
            token,
            join,
        })
    }
}

struct Driver<T: Transport> {
    scenario: String,
    runner: Arc<PipelineRunner<T>>,
    ctx: Arc<RunContext>,
    chain: Arc<Vec<ChainStep>>,
    plan: InjectionPlan,
    max_results_per_case: Option<usize>,
    token: CancellationToken,
}

impl<T: Transport> Driver<T> {
    async fn run(self) -> LoadRunResult {
        let start = Instant::now();
        let Some(deadline) = start.checked_add(self.plan.max_duration()) else {
            return LoadRunResult::failed(&self.scenario, "Profile duration exceeds the clock range".to_string());
        };

        let (tx, mut rx) = mpsc::channel::<ExecutionResult>(1024);
        let mut collector = ResultCollector::new(self.max_results_per_case);
        let collector = tokio::spawn(async move {
            while let Some(result) = rx.recv().await {
                collector.record(result);
            }
            collector
        });

        let mut users = Vec::new();
        for (id, offset) in self.plan.arrivals().into_iter().enumerate() {
            let Some(arrival) = start.checked_add(offset) else {
                warn!(scenario = %self.scenario, user = id, "Arrival offset exceeds the clock range");
                break;
            };
            tokio::select! {
                _ = self.token.cancelled() => break,
                _ = tokio::time::sleep_until(arrival.into()) => {}
            }

            let user = VirtualUser {
                id,
                runner: self.runner.clone(),
                ctx: self.ctx.clone(),
                chain: self.chain.clone(),
                policy: self.plan.loop_policy,
                deadline,
                token: self.token.clone(),
                tx: tx.clone(),
            };
            users.push(tokio::spawn(user.run()));
        }
        drop(tx);

        let mut panicked = 0;
        let injected = users.len() as u32;
        for user in users {
            if user.await.is_err() {
                panicked += 1;
            }
        }

        let duration = start.elapsed();
        let (stats, results, omitted) = match collector.await {
            Ok(collector) => collector.finish(duration),
            Err(e) => return LoadRunResult::failed(&self.scenario, format!("Result collector failed: {}", e)),
        };

        let (status, error) = if panicked > 0 {
            (RunStatus::Failed, Some(format!("{} virtual user(s) panicked", panicked)))
        } else if self.token.is_cancelled() {
            (RunStatus::Cancelled, None)
        } else {
            (RunStatus::Completed, None)
        };

        info!(
            scenario = %self.scenario,
            status = ?status,
            users = injected,
            requests = stats.total_requests,
            retained = results.len(),
            "Load run finished"
        );

        LoadRunResult {
            scenario: self.scenario,
            status,
            users: injected,
            duration,
            stats,
            results,
            omitted,
            error,
        }
    }
}

type CaseKey = (String, Phase, String);

#[derive(Default)]
struct CaseTally {
    kept: usize,
    failure_kept: bool,
    omitted: usize,
}

/// Feeds every result into the stats and retains a bounded sample per case
struct ResultCollector {
    stats: StatsCollector,
    results: Vec<ExecutionResult>,
    tallies: HashMap<CaseKey, CaseTally>,
    max_per_case: Option<usize>,
}

impl ResultCollector {
    fn new(max_per_case: Option<usize>) -> Self {
        Self {
            stats: StatsCollector::new(),
            results: Vec::new(),
            tallies: HashMap::new(),
            // A case always keeps its first result
            max_per_case: max_per_case.map(|max| max.max(1)),
        }
    }

    fn record(&mut self, result: ExecutionResult) {
        self.stats.record(&result);

        let key = (result.origin_tcid.clone(), result.phase, result.tcid.clone());
        let tally = self.tallies.entry(key).or_default();
        let failed = !result.passed();
        let under_cap = self.max_per_case.map_or(true, |max| tally.kept < max);

        if under_cap || (failed && !tally.failure_kept) {
            tally.kept += 1;
            tally.failure_kept |= failed;
            self.results.push(result);
        } else {
            tally.omitted += 1;
        }
    }

    fn finish(self, duration: Duration) -> (LoadStats, Vec<ExecutionResult>, Vec<OmittedResults>) {
        let mut omitted: Vec<OmittedResults> = self
            .tallies
            .into_iter()
            .filter(|(_, tally)| tally.omitted > 0)
            .map(|((origin_tcid, phase, tcid), tally)| OmittedResults {
                origin_tcid,
                phase,
                tcid,
                count: tally.omitted,
            })
            .collect();
        omitted.sort_by(|a, b| (&a.origin_tcid, a.phase, &a.tcid).cmp(&(&b.origin_tcid, b.phase, &b.tcid)));
        (self.stats.finalize(duration), self.results, omitted)
    }
}

struct VirtualUser<T: Transport> {
    id: usize,
    runner: Arc<PipelineRunner<T>>,
    ctx: Arc<RunContext>,
    chain: Arc<Vec<ChainStep>>,
    policy: LoopPolicy,
    deadline: Instant,
    token: CancellationToken,
    tx: mpsc::Sender<ExecutionResult>,
}

impl<T: Transport> VirtualUser<T> {
    fn should_stop(&self) -> bool {
        self.token.is_cancelled()
            || (self.policy == LoopPolicy::UntilDeadline && Instant::now() >= self.deadline)
    }

    async fn run(self) {
        debug!(user = self.id, "Virtual user started");
        let mut iteration: u32 = 0;

        loop {
            if let LoopPolicy::Repeat(times) = self.policy {
                if iteration >= times {
                    break;
                }
            }

            for step in self.chain.iter() {
                if self.should_stop() {
                    debug!(user = self.id, iteration, "Virtual user stopping");
                    return;
                }

                let result = self.runner.execute_item(&step.item, &self.ctx).await;
                if self.tx.send(result).await.is_err() {
                    return;
                }

                if step.wait_seconds > 0 && !self.runner.options().skip_waits {
                    tokio::select! {
                        _ = self.token.cancelled() => return,
                        _ = tokio::time::sleep(Duration::from_secs(step.wait_seconds)) => {}
                    }
                }
            }

            iteration = iteration.saturating_add(1);
            tokio::task::yield_now().await;
        }
    }
}
