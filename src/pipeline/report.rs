//! Run report aggregation and rendering
//!
//! Execution results are folded into a tree:
//! `FunctionalTestReport` (origin) → `ModeGroup` (phase) → `CaseReport`
//! (tcid) → `RequestReport` (HTTP call) → `CheckReport`.
//! Every level passes iff all of its children pass; optional checks are
//! kept in the tree but never fail a request.
//!
//! Supports HTML, JSON and JUnit XML output.

use std::fmt;
use std::fs;
use std::path::Path;
use std::str::FromStr;
use junit_report::{Duration, Report, TestCase, TestSuite};
use serde::Serialize;
use tera::{Context, Tera};
use time::OffsetDateTime;

use super::checks::CheckReport;
use super::runner::ExecutionResult;
use crate::errors::{PulserunError, Result};
use crate::models::Phase;

/// Default cap on response body samples kept in reports
pub const DEFAULT_BODY_SAMPLE_BYTES: usize = 4 * 1024;

/// Report format options
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReportFormat {
    /// Static HTML document
    #[default]
    Html,
    /// JSON format
    Json,
    /// JUnit XML format (for CI/CD systems)
    JUnit,
}

impl FromStr for ReportFormat {
    type Err = PulserunError;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "html" => Ok(ReportFormat::Html),
            "json" => Ok(ReportFormat::Json),
            "junit" | "xml" => Ok(ReportFormat::JUnit),
            other => Err(PulserunError::Argument(format!(
                "Unknown report format '{}' (expected html, json or junit)",
                other
            ))),
        }
    }
}

impl fmt::Display for ReportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ReportFormat::Html => "html",
            ReportFormat::Json => "json",
            ReportFormat::JUnit => "junit",
        })
    }
}

/// Knobs for report building
#[derive(Debug, Clone)]
pub struct ReportOptions {
    /// Run name shown in headers
    pub name: String,
    /// Response bodies are cut to this many bytes
    pub body_sample_bytes: usize,
    /// Keep at most this many requests per case (load runs repeat a lot)
    pub max_requests_per_case: Option<usize>,
}

impl Default for ReportOptions {
    fn default() -> Self {
        Self {
            name: "pulserun".to_string(),
            body_sample_bytes: DEFAULT_BODY_SAMPLE_BYTES,
            max_requests_per_case: None,
        }
    }
}

/// One HTTP call and its checks
#[derive(Debug, Clone, Serialize)]
pub struct RequestReport {
    pub method: String,
    pub url: String,
    pub request_headers: Vec<(String, String)>,
    pub request_body: Option<String>,
    pub status: Option<u16>,
    pub response_headers: Vec<(String, String)>,
    pub response_body: Option<String>,
    pub latency_ms: u64,
    pub size_bytes: u64,
    pub started_at: String,
    pub checks: Vec<CheckReport>,
    pub render_errors: Vec<String>,
    pub error: Option<String>,
    pub passed: bool,
}

/// All executions of one tcid within a phase
#[derive(Debug, Clone, Serialize)]
pub struct CaseReport {
    pub tcid: String,
    pub name: String,
    pub requests: Vec<RequestReport>,
    /// Requests dropped by `max_requests_per_case`
    pub omitted_requests: usize,
    pub passed: bool,
}

/// Cases executed in one phase
#[derive(Debug, Clone, Serialize)]
pub struct ModeGroup {
    pub phase: Phase,
    pub cases: Vec<CaseReport>,
    pub passed: bool,
}

/// Everything executed on behalf of one selected test
#[derive(Debug, Clone, Serialize)]
pub struct FunctionalTestReport {
    pub origin_tcid: String,
    pub name: String,
    pub suite: String,
    pub groups: Vec<ModeGroup>,
    pub duration_ms: u64,
    pub passed: bool,
}

impl FunctionalTestReport {
    /// Whether a MAIN phase ran and every case in it passed
    pub fn main_passed(&self) -> bool {
        let mut mains = self.groups.iter().filter(|g| g.phase == Phase::Main).peekable();
        mains.peek().is_some() && mains.all(|g| g.cases.iter().all(|c| c.passed))
    }
}

/// Per-suite counters
#[derive(Debug, Clone, Serialize)]
pub struct SuiteSummary {
    pub name: String,
    pub tests_total: usize,
    pub tests_passed: usize,
    pub passed: bool,
}

/// Aggregate counters; rates are percentages
#[derive(Debug, Clone, Default, Serialize)]
pub struct Totals {
    pub suites_total: usize,
    pub suites_passed: usize,
    pub suites_failed: usize,
    pub suite_rate: f64,
    pub tests_total: usize,
    pub tests_passed: usize,
    pub tests_failed: usize,
    pub test_rate: f64,
}

/// A whole run
#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub name: String,
    pub generated_at: String,
    pub reports: Vec<FunctionalTestReport>,
    pub suites: Vec<SuiteSummary>,
    pub totals: Totals,
}

impl RunReport {
    pub fn passed(&self) -> bool {
        self.reports.iter().all(|r| r.passed)
    }

    /// Count results that were dropped before the report was built.
    ///
    /// Returns false when no case matches.
    pub fn add_omitted(&mut self, origin_tcid: &str, phase: Phase, tcid: &str, count: usize) -> bool {
        let case = self
            .reports
            .iter_mut()
            .filter(|r| r.origin_tcid == origin_tcid)
            .flat_map(|r| r.groups.iter_mut())
            .filter(|g| g.phase == phase)
            .flat_map(|g| g.cases.iter_mut())
            .find(|c| c.tcid == tcid);
        match case {
            Some(case) => {
                case.omitted_requests += count;
                true
            }
            None => false,
        }
    }
}

/// Build the report tree with default options
pub fn build_report(results: &[ExecutionResult]) -> RunReport {
    build_report_with(results, &ReportOptions::default())
}

pub fn build_report_with(results: &[ExecutionResult], options: &ReportOptions) -> RunReport {
    let mut origins: Vec<&str> = Vec::new();
    for result in results {
        if !origins.contains(&result.origin_tcid.as_str()) {
            origins.push(&result.origin_tcid);
        }
    }

    let reports: Vec<FunctionalTestReport> = origins
        .into_iter()
        .map(|origin| {
            let own: Vec<&ExecutionResult> = results.iter().filter(|r| r.origin_tcid == origin).collect();
            build_functional_report(origin, &own, options)
        })
        .collect();

    let suites = summarize_suites(&reports);
    let totals = compute_totals(&reports, &suites);

    RunReport {
        name: options.name.clone(),
        generated_at: chrono::Utc::now().to_rfc3339(),
        reports,
        suites,
        totals,
    }
}

fn build_functional_report(origin: &str, results: &[&ExecutionResult], options: &ReportOptions) -> FunctionalTestReport {
    let main = results
        .iter()
        .find(|r| r.phase == Phase::Main)
        .or_else(|| results.first());
    let (name, suite) = main
        .map(|r| (r.name.clone(), r.suite.clone()))
        .unwrap_or_default();

    let groups: Vec<ModeGroup> = Phase::ORDER
        .iter()
        .filter_map(|phase| {
            let in_phase: Vec<&ExecutionResult> = results.iter().copied().filter(|r| r.phase == *phase).collect();
            if in_phase.is_empty() {
                return None;
            }
            let cases = build_cases(&in_phase, options);
            let passed = cases.iter().all(|c| c.passed);
            Some(ModeGroup { phase: *phase, cases, passed })
        })
        .collect();

    FunctionalTestReport {
        origin_tcid: origin.to_string(),
        name,
        suite,
        passed: groups.iter().all(|g| g.passed),
        duration_ms: results.iter().map(|r| r.duration_ms).sum(),
        groups,
    }
}

fn build_cases(results: &[&ExecutionResult], options: &ReportOptions) -> Vec<CaseReport> {
    let mut cases: Vec<CaseReport> = Vec::new();
    for result in results {
        let request = build_request_report(result, options);
        let case = match cases.iter_mut().position(|c| c.tcid == result.tcid) {
            Some(idx) => &mut cases[idx],
            None => {
                cases.push(CaseReport {
                    tcid: result.tcid.clone(),
                    name: result.name.clone(),
                    requests: Vec::new(),
                    omitted_requests: 0,
                    passed: true,
                });
                let last = cases.len() - 1;
                &mut cases[last]
            }
        };

        case.passed &= request.passed;
        let keep = options.max_requests_per_case.map_or(true, |max| case.requests.len() < max);
        if keep || !request.passed && !case.requests.iter().any(|r| !r.passed) {
            case.requests.push(request);
        } else {
            case.omitted_requests += 1;
        }
    }
    cases
}

fn build_request_report(result: &ExecutionResult, options: &ReportOptions) -> RequestReport {
    let (method, url, request_headers, request_body, render_errors) = match &result.request {
        Some(req) => (
            req.method.clone(),
            req.url.clone(),
            req.headers.clone(),
            req.body.as_deref().map(|b| sample(b, options.body_sample_bytes)),
            req.render_errors.clone(),
        ),
        None => (String::new(), String::new(), Vec::new(), None, Vec::new()),
    };

    RequestReport {
        method,
        url,
        request_headers,
        request_body,
        status: result.response.as_ref().map(|r| r.status),
        response_headers: result.response.as_ref().map(|r| r.headers.clone()).unwrap_or_default(),
        response_body: result.response.as_ref().map(|r| sample(&r.body, options.body_sample_bytes)),
        latency_ms: result.response.as_ref().map(|r| r.latency_ms).unwrap_or(0),
        size_bytes: result.response.as_ref().map(|r| r.size_bytes).unwrap_or(0),
        started_at: result.started_at.to_rfc3339(),
        checks: result.checks.clone(),
        render_errors,
        error: result.error.clone(),
        passed: result.passed(),
    }
}

/// Cut a body to at most `max` bytes on a char boundary
pub fn sample(body: &str, max: usize) -> String {
    if body.len() <= max {
        return body.to_string();
    }
    let mut end = max;
    while end > 0 && !body.is_char_boundary(end) {
        end -= 1;
    }
    format!("{}...[truncated {} bytes]", &body[..end], body.len() - end)
}

fn summarize_suites(reports: &[FunctionalTestReport]) -> Vec<SuiteSummary> {
    let mut suites: Vec<SuiteSummary> = Vec::new();
    for report in reports {
        let idx = match suites.iter().position(|s| s.name == report.suite) {
            Some(idx) => idx,
            None => {
                suites.push(SuiteSummary {
                    name: report.suite.clone(),
                    tests_total: 0,
                    tests_passed: 0,
                    passed: true,
                });
                suites.len() - 1
            }
        };
        let suite = &mut suites[idx];
        suite.tests_total += 1;
        if report.passed {
            suite.tests_passed += 1;
        }
        suite.passed &= report.main_passed();
    }
    suites
}

fn rate(passed: usize, total: usize) -> f64 {
    if total == 0 {
        0.0
    } else {
        passed as f64 * 100.0 / total as f64
    }
}

fn compute_totals(reports: &[FunctionalTestReport], suites: &[SuiteSummary]) -> Totals {
    let suites_passed = suites.iter().filter(|s| s.passed).count();
    let tests_passed = reports.iter().filter(|r| r.passed).count();
    Totals {
        suites_total: suites.len(),
        suites_passed,
        suites_failed: suites.len() - suites_passed,
        suite_rate: rate(suites_passed, suites.len()),
        tests_total: reports.len(),
        tests_passed,
        tests_failed: reports.len() - tests_passed,
        test_rate: rate(tests_passed, reports.len()),
    }
}

/// Render a report in the given format
pub fn render_report(report: &RunReport, format: ReportFormat) -> Result<String> {
    match format {
        ReportFormat::Html => render_html(report),
        ReportFormat::Json => render_json(report),
        ReportFormat::JUnit => render_junit(report),
    }
}

/// Render and write a report to a file
pub fn write_report(report: &RunReport, format: ReportFormat, path: &Path) -> Result<()> {
    let rendered = render_report(report, format)?;
    fs::write(path, rendered)?;
    Ok(())
}

pub fn render_json(report: &RunReport) -> Result<String> {
    serde_json::to_string_pretty(report)
        .map_err(|e| PulserunError::Report(format!("Failed to serialize JSON: {}", e)))
}

pub fn render_html(report: &RunReport) -> Result<String> {
    let context = Context::from_serialize(report)
        .map_err(|e| PulserunError::Report(format!("Failed to build template context: {}", e)))?;
    Tera::one_off(HTML_TEMPLATE, &context, true)
        .map_err(|e| PulserunError::Report(format!("Failed to render HTML: {}", e)))
}

/// JUnit XML: one testsuite per suite, one testcase per selected test
pub fn render_junit(report: &RunReport) -> Result<String> {
    let mut junit = Report::new();

    for summary in &report.suites {
        let suite_name = if summary.name.is_empty() { report.name.as_str() } else { summary.name.as_str() };
        let mut suite = TestSuite::new(suite_name);
        suite.set_timestamp(OffsetDateTime::now_utc());

        for test in report.reports.iter().filter(|r| r.suite == summary.name) {
            suite.add_testcase(build_test_case(test, suite_name));
        }
        junit.add_testsuite(suite);
    }

    let mut buffer = Vec::new();
    junit.write_xml(&mut buffer)
        .map_err(|e| PulserunError::Report(format!("Failed to write JUnit XML: {}", e)))?;
    String::from_utf8(buffer)
        .map_err(|e| PulserunError::Report(format!("JUnit XML is not UTF-8: {}", e)))
}

fn build_test_case(test: &FunctionalTestReport, suite_name: &str) -> TestCase {
    let duration = Duration::new(
        (test.duration_ms / 1000) as i64,
        ((test.duration_ms % 1000) * 1_000_000) as i32,
    );
    let name = if test.name.is_empty() {
        test.origin_tcid.clone()
    } else {
        format!("{} {}", test.origin_tcid, test.name)
    };
    let classname = sanitize_classname(suite_name);

    let mut errors = Vec::new();
    let mut failures = Vec::new();
    for group in &test.groups {
        for case in &group.cases {
            for request in case.requests.iter().filter(|r| !r.passed) {
                if let Some(error) = &request.error {
                    errors.push(format!("[{}] {}: {}", group.phase, case.tcid, error));
                }
                for check in request.checks.iter().filter(|c| c.is_fatal_failure()) {
                    failures.push(format!(
                        "[{}] {} {} {}: {}",
                        group.phase, case.tcid, check.check_type, check.expression, check.message
                    ));
                }
            }
        }
    }

    let mut tc = if !errors.is_empty() {
        errors.extend(failures);
        TestCase::error(&name, duration, "ExecutionError", &errors.join("\n"))
    } else if !failures.is_empty() {
        TestCase::failure(&name, duration, "CheckFailure", &failures.join("\n"))
    } else {
        TestCase::success(&name, duration)
    };
    tc.set_classname(&classname);
    tc
}

/// Sanitize a string for use as a JUnit classname
fn sanitize_classname(name: &str) -> String {
    name.chars()
        .map(|c| if c.is_alphanumeric() || c == '_' || c == '.' { c } else { '_' })
        .collect()
}

const HTML_TEMPLATE: &str = r#"<!DOCTYPE html>
<html lang="en">
<head>
<meta charset="utf-8">
<title>{{ name }} report</title>
<style>
body { font-family: sans-serif; margin: 2em; color: #222; }
table { border-collapse: collapse; margin-bottom: 1em; }
td, th { border: 1px solid #ccc; padding: 4px 8px; text-align: left; vertical-align: top; }
.pass { color: #1a7f37; }
.fail { color: #cf222e; }
pre { background: #f6f8fa; padding: 6px; white-space: pre-wrap; max-height: 20em; overflow: auto; }
details { margin-left: 1em; }
</style>
</head>
<body>
<h1>{{ name }}</h1>
<p>Generated {{ generated_at }}</p>

<h2>Summary</h2>
<table>
<tr><th></th><th>Total</th><th>Passed</th><th>Failed</th><th>Pass rate</th></tr>
<tr><td>Suites</td><td>{{ totals.suites_total }}</td><td>{{ totals.suites_passed }}</td><td>{{ totals.suites_failed }}</td><td>{{ totals.suite_rate | round(precision=1) }}%</td></tr>
<tr><td>Tests</td><td>{{ totals.tests_total }}</td><td>{{ totals.tests_passed }}</td><td>{{ totals.tests_failed }}</td><td>{{ totals.test_rate | round(precision=1) }}%</td></tr>
</table>

<table>
<tr><th>Suite</th><th>Tests</th><th>Passed</th><th>Result</th></tr>
{% for suite in suites %}
<tr><td>{{ suite.name }}</td><td>{{ suite.tests_total }}</td><td>{{ suite.tests_passed }}</td><td class="{% if suite.passed %}pass{% else %}fail{% endif %}">{% if suite.passed %}PASS{% else %}FAIL{% endif %}</td></tr>
{% endfor %}
</table>

<h2>Tests</h2>
{% for test in reports %}
<details{% if not test.passed %} open{% endif %}>
<summary class="{% if test.passed %}pass{% else %}fail{% endif %}">{{ test.origin_tcid }} {{ test.name }} ({{ test.suite }}) {{ test.duration_ms }} ms</summary>
{% for group in test.groups %}
<details{% if not group.passed %} open{% endif %}>
<summary class="{% if group.passed %}pass{% else %}fail{% endif %}">{{ group.phase }}</summary>
{% for case in group.cases %}
<details>
<summary class="{% if case.passed %}pass{% else %}fail{% endif %}">{{ case.tcid }} {{ case.name }}{% if case.omitted_requests > 0 %} (+{{ case.omitted_requests }} more){% endif %}</summary>
{% for req in case.requests %}
<h4 class="{% if req.passed %}pass{% else %}fail{% endif %}">{{ req.method }} {{ req.url }} {% if req.status %}{{ req.status }}{% else %}-{% endif %} {{ req.latency_ms }} ms</h4>
{% if req.error %}<p class="fail">{{ req.error }}</p>{% endif %}
{% for err in req.render_errors %}<p class="fail">{{ err }}</p>{% endfor %}
<table>
<tr><th>Check</th><th>Expression</th><th>Operator</th><th>Expect</th><th>Actual</th><th>Result</th><th>Message</th></tr>
{% for check in req.checks %}
<tr><td>{{ check.check_type }}</td><td>{{ check.expression }}</td><td>{{ check.operator }}</td><td>{% if check.expect %}{{ check.expect }}{% endif %}</td><td>{% if check.actual %}{{ check.actual }}{% endif %}</td><td class="{% if check.passed %}pass{% else %}fail{% endif %}">{% if check.passed %}PASS{% else %}FAIL{% endif %}{% if check.optional %} (optional){% endif %}</td><td>{{ check.message }}</td></tr>
{% endfor %}
</table>
<details><summary>Request</summary>
<pre>{% for h in req.request_headers %}{{ h.0 }}: {{ h.1 }}
{% endfor %}
{% if req.request_body %}{{ req.request_body }}{% endif %}</pre>
</details>
<details><summary>Response</summary>
<pre>{% for h in req.response_headers %}{{ h.0 }}: {{ h.1 }}
{% endfor %}
{% if req.response_body %}{{ req.response_body }}{% endif %}</pre>
</details>
{% endfor %}
</details>
{% endfor %}
</details>
{% endfor %}
</details>
{% endfor %}
</body>
</html>
"#;

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::ResponseCheck;
    use crate::pipeline::checks::CheckEvaluator;
    use crate::context::RunContext;
    use crate::transport::RawResponse;

    fn result(origin: &str, tcid: &str, suite: &str, phase: Phase, status: u16, expect: &str) -> ExecutionResult {
        let response = RawResponse::new(status, "{}");
        let ctx = RunContext::new();
        let checks = CheckEvaluator::new().evaluate(&[ResponseCheck::status(expect)], &response, &ctx, origin);
        ExecutionResult {
            origin_tcid: origin.to_string(),
            tcid: tcid.to_string(),
            name: format!("{} name", tcid),
            suite: suite.to_string(),
            phase,
            request: None,
            response: Some(response),
            checks,
            error: None,
            started_at: chrono::Utc::now(),
            duration_ms: 5,
        }
    }

    #[test]
    fn test_grouping_and_rollup() {
        let results = vec![
            result("M1", "A", "S1", Phase::Setup, 200, "200"),
            result("M1", "M1", "S1", Phase::Main, 200, "200"),
            result("M1", "C", "S1", Phase::Teardown, 500, "200"),
            result("M2", "M2", "S2", Phase::Main, 200, "200"),
        ];

        let report = build_report(&results);
        assert_eq!(report.reports.len(), 2);

        let m1 = &report.reports[0];
        assert_eq!(m1.origin_tcid, "M1");
        let phases: Vec<Phase> = m1.groups.iter().map(|g| g.phase).collect();
        assert_eq!(phases, vec![Phase::Setup, Phase::Main, Phase::Teardown]);
        assert!(!m1.passed);
        assert!(m1.main_passed());

        // The suite only looks at MAIN cases
        assert!(report.suites[0].passed);
        assert_eq!(report.totals.tests_total, 2);
        assert_eq!(report.totals.tests_passed, 1);
        assert_eq!(report.totals.test_rate, 50.0);
        assert_eq!(report.totals.suites_passed, 2);
        assert!(!report.passed());
    }

    #[test]
    fn test_suite_without_main_phase_fails() {
        // Setup ran but the run stopped before MAIN
        let results = vec![result("M1", "A", "S1", Phase::Setup, 200, "200")];

        let report = build_report(&results);
        assert!(report.reports[0].passed);
        assert!(!report.reports[0].main_passed());
        assert!(!report.suites[0].passed);
        assert_eq!(report.totals.suites_failed, 1);
    }

    #[test]
    fn test_add_omitted() {
        let results = vec![
            result("M1", "A", "S1", Phase::Setup, 200, "200"),
            result("M1", "M1", "S1", Phase::Main, 200, "200"),
        ];
        let mut report = build_report(&results);

        assert!(report.add_omitted("M1", Phase::Main, "M1", 7));
        assert!(!report.add_omitted("M1", Phase::Teardown, "M1", 1));
        assert_eq!(report.reports[0].groups[1].cases[0].omitted_requests, 7);
        assert_eq!(report.reports[0].groups[0].cases[0].omitted_requests, 0);
    }

    #[test]
    fn test_optional_failure_does_not_fail_request() {
        let response = RawResponse::new(200, "");
        let ctx = RunContext::new();
        let checks = CheckEvaluator::new().evaluate(
            &[ResponseCheck::status("200"), ResponseCheck::status("201").optional()],
            &response,
            &ctx,
            "T1",
        );
        let mut r = result("T1", "T1", "S", Phase::Main, 200, "200");
        r.checks = checks;

        let report = build_report(&[r]);
        let request = &report.reports[0].groups[0].cases[0].requests[0];
        assert_eq!(request.checks.len(), 2);
        assert!(request.passed);
        assert!(report.reports[0].passed);
    }

    #[test]
    fn test_empty_totals() {
        let report = build_report(&[]);
        assert_eq!(report.totals.test_rate, 0.0);
        assert_eq!(report.totals.suite_rate, 0.0);
    }

    #[test]
    fn test_request_cap_keeps_first_failure() {
        let mut results: Vec<_> = (0..5).map(|_| result("T1", "T1", "S", Phase::Main, 200, "200")).collect();
        results.push(result("T1", "T1", "S", Phase::Main, 500, "200"));

        let options = ReportOptions { max_requests_per_case: Some(2), ..Default::default() };
        let report = build_report_with(&results, &options);
        let case = &report.reports[0].groups[0].cases[0];
        assert_eq!(case.requests.len(), 3);
        assert_eq!(case.omitted_requests, 3);
        assert!(!case.passed);
    }

    #[test]
    fn test_sample() {
        assert_eq!(sample("short", 10), "short");
        let long = "é".repeat(10);
        let cut = sample(&long, 5);
        assert!(cut.starts_with("éé"));
        assert!(cut.contains("truncated"));
    }

    #[test]
    fn test_renderers() {
        let results = vec![
            result("M1", "M1", "S1", Phase::Main, 200, "200"),
            result("M2", "M2", "S1", Phase::Main, 404, "200"),
        ];
        let report = build_report(&results);

        let html = render_html(&report).unwrap();
        assert!(html.contains("<h1>pulserun</h1>"));
        assert!(html.contains("M2"));
        assert!(html.contains("FAIL"));

        let json = render_json(&report).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["totals"]["tests_failed"], 1);

        let xml = render_junit(&report).unwrap();
        assert!(xml.contains("testsuites"));
        assert!(xml.contains("<failure"));
        assert!(xml.contains("S1"));
    }

    #[test]
    fn test_format_parse() {
        assert_eq!("HTML".parse::<ReportFormat>().unwrap(), ReportFormat::Html);
        assert_eq!("junit".parse::<ReportFormat>().unwrap(), ReportFormat::JUnit);
        assert!("tap".parse::<ReportFormat>().is_err());
    }

    #[test]
    fn test_sanitize_classname() {
        assert_eq!(sanitize_classname("User API Flow"), "User_API_Flow");
        assert_eq!(sanitize_classname("a-b-c"), "a_b_c");
    }
}
