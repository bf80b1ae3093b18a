//! Functional run orchestration
//!
//! Items from the dependency expander run strictly in order. Each item is
//! rendered against the live run context right before it is sent, so values
//! captured by earlier items are visible to later ones.

use std::sync::Arc;
use std::time::{Duration, Instant};
use chrono::{DateTime, Utc};
use tracing::{debug, info, warn};

use super::checks::{CheckEvaluator, CheckReport};
use super::dependency::{select_tests, DependencyExpander, ExecutionItem, Selection};
use crate::context::RunContext;
use crate::errors::Result;
use crate::models::Phase;
use crate::signals;
use crate::store::DefinitionStore;
use crate::template::{materialize, RenderedRequest, TemplateRenderer};
use crate::transport::{RawResponse, Transport};
use crate::variables::VariableResolver;

/// Outcome of one executed item
#[derive(Debug, Clone)]
pub struct ExecutionResult {
    pub origin_tcid: String,
    pub tcid: String,
    pub name: String,
    pub suite: String,
    pub phase: Phase,
    /// `None` when the request could not be materialized
    pub request: Option<RenderedRequest>,
    /// `None` when nothing came back
    pub response: Option<RawResponse>,
    pub checks: Vec<CheckReport>,
    pub error: Option<String>,
    pub started_at: DateTime<Utc>,
    pub duration_ms: u64,
}

impl ExecutionResult {
    fn start(item: &ExecutionItem) -> Self {
        Self {
            origin_tcid: item.origin_tcid.clone(),
            tcid: item.test.tcid.clone(),
            name: item.test.name.clone(),
            suite: item.test.suite.clone(),
            phase: item.phase,
            request: None,
            response: None,
            checks: Vec::new(),
            error: None,
            started_at: Utc::now(),
            duration_ms: 0,
        }
    }

    /// No error and no failed non-optional check
    pub fn passed(&self) -> bool {
        self.error.is_none() && !self.checks.iter().any(|c| c.is_fatal_failure())
    }
}

/// Per-run settings
#[derive(Debug, Clone, Default)]
pub struct RunOptions {
    /// Endpoint environment
    pub environment: Option<String>,
    /// Ignore `wait_time` pauses
    pub skip_waits: bool,
}

/// Runs execution items through render, transport and evaluation
pub struct PipelineRunner<T: Transport> {
    store: Arc<dyn DefinitionStore>,
    resolver: Arc<VariableResolver>,
    transport: Arc<T>,
    evaluator: CheckEvaluator,
    options: RunOptions,
}

impl<T: Transport> PipelineRunner<T> {
    pub fn new(store: Arc<dyn DefinitionStore>, resolver: Arc<VariableResolver>, transport: Arc<T>) -> Self {
        Self {
            store,
            resolver,
            transport,
            evaluator: CheckEvaluator::new(),
            options: RunOptions::default(),
        }
    }

    pub fn with_evaluator(mut self, evaluator: CheckEvaluator) -> Self {
        self.evaluator = evaluator;
        self
    }

    pub fn with_options(mut self, options: RunOptions) -> Self {
        self.options = options;
        self
    }

    pub fn options(&self) -> &RunOptions {
        &self.options
    }

    pub fn store(&self) -> &dyn DefinitionStore {
        self.store.as_ref()
    }

    /// Resolve a selection and expand it into the ordered item list
    pub fn plan(&self, selection: &Selection) -> Result<Vec<ExecutionItem>> {
        let selected = select_tests(self.store.as_ref(), selection)?;
        DependencyExpander::new(self.store.as_ref()).expand(&selected)
    }

    /// Run a functional pass.
    ///
    /// Planning errors abort before any request is sent. Past that point
    /// every item yields a result, failed or not. Stops early on Ctrl+C.
    pub async fn run_functional(&self, selection: &Selection, ctx: &RunContext) -> Result<Vec<ExecutionResult>> {
        let items = self.plan(selection)?;
        info!(items = items.len(), "Starting functional run");

        let mut results = Vec::with_capacity(items.len());
        for item in &items {
            if signals::was_interrupted() {
                warn!(remaining = items.len() - results.len(), "Run interrupted, skipping remaining items");
                break;
            }

            let result = self.execute_item(item, ctx).await;
            info!(
                tcid = %result.tcid,
                origin = %result.origin_tcid,
                phase = %result.phase,
                passed = result.passed(),
                "Executed"
            );
            results.push(result);

            self.pause(item.test.wait_time).await;
        }

        Ok(results)
    }

    /// Render, send and evaluate a single item
    pub async fn execute_item(&self, item: &ExecutionItem, ctx: &RunContext) -> ExecutionResult {
        let start = Instant::now();
        let mut result = ExecutionResult::start(item);

        let renderer = TemplateRenderer::new(&self.resolver, ctx);
        let request = match materialize(
            &item.test,
            self.store.as_ref(),
            &renderer,
            self.options.environment.as_deref(),
        ) {
            Ok(request) => request,
            Err(e) => {
                warn!(tcid = %item.test.tcid, error = %e, "Cannot build request");
                result.error = Some(e.to_string());
                result.duration_ms = start.elapsed().as_millis() as u64;
                return result;
            }
        };

        for error in &request.render_errors {
            warn!(tcid = %item.test.tcid, "Render error: {}", error);
        }
        debug!(tcid = %item.test.tcid, method = %request.method, url = %request.url, "Sending request");

        match self.transport.send(&request).await {
            Ok(response) => {
                let mut checks = self.evaluator.evaluate(&item.test.checks, &response, ctx, &item.origin_tcid);
                if !item.probes.is_empty() {
                    checks.extend(self.evaluator.evaluate_in_phase(
                        &item.probes,
                        &response,
                        ctx,
                        &item.origin_tcid,
                        item.phase,
                    ));
                }
                result.checks = checks;
                result.response = Some(response);
            }
            Err(e) => {
                warn!(tcid = %item.test.tcid, error = %e, "Request failed");
                result.error = Some(e.to_string());
            }
        }

        result.request = Some(request);
        result.duration_ms = start.elapsed().as_millis() as u64;
        result
    }

    /// Sleep for a test's wait time unless waits are skipped
    pub async fn pause(&self, seconds: u64) {
        if seconds > 0 && !self.options.skip_waits {
            debug!(seconds, "Waiting");
            tokio::time::sleep(Duration::from_secs(seconds)).await;
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::Mutex;
    use crate::models::{CheckType, Endpoint, Operator, ResponseCheck, TestCase};
    use crate::store::Definitions;

    /// Answers by path suffix, records everything it sends
    #[derive(Default)]
    struct ScriptedTransport {
        routes: HashMap<String, RawResponse>,
        sent: Mutex<Vec<RenderedRequest>>,
    }

    impl ScriptedTransport {
        fn route(mut self, path: &str, response: RawResponse) -> Self {
            self.routes.insert(path.to_string(), response);
            self
        }

        fn sent(&self) -> Vec<RenderedRequest> {
            self.sent.lock().unwrap().clone()
        }
    }

    impl Transport for ScriptedTransport {
        async fn send(&self, request: &RenderedRequest) -> Result<RawResponse> {
            self.sent.lock().unwrap().push(request.clone());
            let response = self
                .routes
                .iter()
                .find(|(path, _)| request.url.ends_with(path.as_str()))
                .map(|(_, r)| r.clone())
                .unwrap_or_else(|| RawResponse::new(404, ""));
            Ok(response)
        }
    }

    fn test_case(tcid: &str, path: &str) -> TestCase {
        TestCase {
            tcid: tcid.to_string(),
            suite: "S".to_string(),
            endpoint: "api".to_string(),
            path: path.to_string(),
            checks: vec![ResponseCheck::status("200")],
            ..Default::default()
        }
    }

    fn definitions(tests: Vec<TestCase>) -> Arc<Definitions> {
        Arc::new(Definitions {
            tests,
            endpoints: vec![Endpoint {
                name: "api".to_string(),
                url: Some("http://svc".to_string()),
                ..Default::default()
            }],
            ..Default::default()
        })
    }

    fn runner(defs: Arc<Definitions>, transport: Arc<ScriptedTransport>) -> PipelineRunner<ScriptedTransport> {
        PipelineRunner::new(defs, Arc::new(VariableResolver::new()), transport)
            .with_options(RunOptions { skip_waits: true, ..Default::default() })
    }

    #[tokio::test]
    async fn test_setup_capture_feeds_main_request() {
        let mut login = test_case("LOGIN", "/login");
        login.checks.push(
            ResponseCheck::new(CheckType::JsonPath, "$.token", Operator::NotNull, None).with_save_as("token"),
        );
        let mut main = test_case("T1", "/orders");
        main.conditions = "[Setup]LOGIN".to_string();
        main.headers.insert("Authorization".to_string(), "Bearer ${T1.token}".to_string());

        let transport = Arc::new(
            ScriptedTransport::default()
                .route("/login", RawResponse::new(200, r#"{"token":"tok-1"}"#))
                .route("/orders", RawResponse::new(200, "[]")),
        );
        let runner = runner(definitions(vec![login, main]), transport.clone());
        let ctx = RunContext::new();

        let results = runner
            .run_functional(&Selection::Tests(vec!["T1".to_string()]), &ctx)
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert!(results.iter().all(|r| r.passed()));
        assert_eq!(ctx.get("T1", "token").as_deref(), Some("tok-1"));

        let sent = transport.sent();
        assert_eq!(sent[1].header("Authorization"), Some("Bearer tok-1"));
    }

    #[tokio::test]
    async fn test_missing_endpoint_becomes_failed_item() {
        let mut broken = test_case("B", "/x");
        broken.endpoint = "nowhere".to_string();
        let ok = test_case("OK", "/ok");

        let transport = Arc::new(ScriptedTransport::default().route("/ok", RawResponse::new(200, "")));
        let runner = runner(definitions(vec![broken, ok]), transport.clone());
        let ctx = RunContext::new();

        let results = runner
            .run_functional(&Selection::Suite("S".to_string()), &ctx)
            .await
            .unwrap();

        assert_eq!(results.len(), 2);
        assert!(!results[0].passed());
        assert!(results[0].request.is_none());
        assert!(results[0].error.as_deref().unwrap_or_default().contains("nowhere"));
        assert!(results[1].passed());
        assert_eq!(transport.sent().len(), 1);
    }

    #[tokio::test]
    async fn test_planning_error_sends_nothing() {
        let mut main = test_case("T1", "/t1");
        main.conditions = "[Setup]GHOST".to_string();

        let transport = Arc::new(ScriptedTransport::default());
        let runner = runner(definitions(vec![main]), transport.clone());

        let err = runner
            .run_functional(&Selection::Tests(vec!["T1".to_string()]), &RunContext::new())
            .await
            .unwrap_err();
        assert!(err.is_definition_error());
        assert!(transport.sent().is_empty());
    }

    #[tokio::test]
    async fn test_diff_probe_round_trip() {
        let balance = TestCase {
            checks: Vec::new(),
            ..test_case("BAL", "/balance")
        };
        let mut main = test_case("PAY", "/pay");
        main.checks.push(ResponseCheck::new(CheckType::Diff, "BAL.$.amount", Operator::Is, Some("0")));

        let transport = Arc::new(
            ScriptedTransport::default()
                .route("/balance", RawResponse::new(200, r#"{"amount":100}"#))
                .route("/pay", RawResponse::new(200, "{}")),
        );
        let runner = runner(definitions(vec![balance, main]), transport);
        let ctx = RunContext::new();

        let results = runner
            .run_functional(&Selection::Tests(vec!["PAY".to_string()]), &ctx)
            .await
            .unwrap();

        let phases: Vec<Phase> = results.iter().map(|r| r.phase).collect();
        assert_eq!(phases, vec![Phase::DiffPre, Phase::Main, Phase::DiffPst]);
        assert!(results.iter().all(|r| r.passed()), "{:?}", results);
        // The main item does not evaluate its DIFF check itself
        assert_eq!(results[1].checks.len(), 1);
    }
}
