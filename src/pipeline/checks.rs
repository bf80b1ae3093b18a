//! Response check evaluation
//!
//! Evaluation never fails: extraction problems, bad expressions and missing
//! collaborators all become failed [`CheckReport`]s carrying a diagnostic.

use std::sync::Arc;
use regex::Regex;
use serde::Serialize;

use super::extract::{json_path, regex_first, xpath, Extracted};
use crate::context::RunContext;
use crate::errors::Result;
use crate::models::{CheckType, Operator, Phase, ResponseCheck};
use crate::transport::RawResponse;

/// Database lookup used by `DB` checks
pub trait DbProbe: Send + Sync {
    /// Run a query; the first value of the first row is the result
    fn query(&self, expression: &str) -> Result<Option<String>>;
}

/// Outcome of one check against one response
#[derive(Debug, Clone, Serialize)]
pub struct CheckReport {
    pub check_type: CheckType,
    pub expression: String,
    pub operator: Operator,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub expect: Option<String>,
    pub actual: Option<String>,
    pub passed: bool,
    /// Optional checks never fail their request
    pub optional: bool,
    pub message: String,
}

impl CheckReport {
    fn new(check: &ResponseCheck, actual: Option<String>, passed: bool, message: String) -> Self {
        Self {
            check_type: check.check_type,
            expression: check.expression.clone(),
            operator: check.operator,
            expect: check.expect.clone(),
            actual,
            passed,
            optional: check.optional,
            message,
        }
    }

    /// Whether this report makes its request fail
    pub fn is_fatal_failure(&self) -> bool {
        !self.passed && !self.optional
    }
}

/// Evaluates response checks, writing captured values into the run context
#[derive(Default, Clone)]
pub struct CheckEvaluator {
    db: Option<Arc<dyn DbProbe>>,
}

impl CheckEvaluator {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_db_probe(mut self, probe: Arc<dyn DbProbe>) -> Self {
        self.db = Some(probe);
        self
    }

    /// Evaluate a test's own checks. Probe checks are skipped; they run on
    /// their probe items through [`CheckEvaluator::evaluate_in_phase`].
    pub fn evaluate(
        &self,
        checks: &[ResponseCheck],
        response: &RawResponse,
        ctx: &RunContext,
        origin: &str,
    ) -> Vec<CheckReport> {
        checks
            .iter()
            .filter(|check| !check.check_type.is_probe())
            .map(|check| {
                let report = self.evaluate_one(check, response);
                save(check, &report, ctx, origin);
                report
            })
            .collect()
    }

    /// Evaluate an origin's probe checks against a probe item's response
    pub fn evaluate_in_phase(
        &self,
        probes: &[ResponseCheck],
        response: &RawResponse,
        ctx: &RunContext,
        origin: &str,
        phase: Phase,
    ) -> Vec<CheckReport> {
        let wanted = match phase {
            Phase::DiffPre | Phase::DiffPst => CheckType::Diff,
            Phase::PreCheck => CheckType::PreCheck,
            Phase::PstCheck => CheckType::PstCheck,
            _ => return Vec::new(),
        };

        probes
            .iter()
            .filter(|check| check.check_type == wanted)
            .map(|check| {
                let report = match phase {
                    Phase::DiffPre => snapshot(check, response, ctx, origin),
                    Phase::DiffPst => diff(check, response, ctx, origin),
                    _ => probe_compare(check, response),
                };
                if phase != Phase::DiffPre {
                    save(check, &report, ctx, origin);
                }
                report
            })
            .collect()
    }

    fn evaluate_one(&self, check: &ResponseCheck, response: &RawResponse) -> CheckReport {
        let extracted: Extracted = match check.check_type {
            CheckType::Status => Ok(Some(response.status.to_string())),
            CheckType::JsonPath => json_path(&response.body, &check.expression),
            CheckType::Xpath => xpath(&response.body, &check.expression),
            CheckType::Regex => regex_first(&response.body, &check.expression),
            CheckType::Db => match &self.db {
                Some(db) => db.query(&check.expression).map_err(|e| format!("DB query failed: {}", e)),
                None => {
                    return CheckReport::new(check, None, false, "No database probe configured".to_string());
                }
            },
            CheckType::Diff | CheckType::PreCheck | CheckType::PstCheck => {
                Err(format!("{} check is only evaluated on its probe item", check.check_type))
            }
        };

        match extracted {
            Ok(actual) => {
                let (passed, message) = compare(check.operator, actual.as_deref(), check.expect.as_deref());
                CheckReport::new(check, actual, passed, message)
            }
            Err(diagnostic) => {
                let passed = check.operator == Operator::IsNull;
                CheckReport::new(check, None, passed, diagnostic)
            }
        }
    }
}

fn save(check: &ResponseCheck, report: &CheckReport, ctx: &RunContext, origin: &str) {
    if let (Some(key), Some(actual)) = (&check.save_as, &report.actual) {
        ctx.set(origin, key, actual.clone());
    }
}

/// Run context key holding a DIFF pre-snapshot
fn snapshot_key(tcid: &str, path: &str) -> String {
    format!("__diff_pre.{}.{}", tcid, path)
}

fn probe_value(check: &ResponseCheck, response: &RawResponse) -> std::result::Result<(String, String, Option<String>), String> {
    let (tcid, path) = check
        .probe_target()
        .ok_or_else(|| format!("Probe expression '{}' must have the form tcid.jsonpath", check.expression))?;
    let value = json_path(&response.body, &path)?;
    Ok((tcid.to_string(), path, value))
}

fn snapshot(check: &ResponseCheck, response: &RawResponse, ctx: &RunContext, origin: &str) -> CheckReport {
    match probe_value(check, response) {
        Ok((tcid, path, Some(value))) if value.trim().parse::<f64>().is_ok() => {
            ctx.set(origin, &snapshot_key(&tcid, &path), value.trim());
            CheckReport::new(check, Some(value), true, format!("Captured pre value of {}", path))
        }
        Ok((_, path, Some(value))) => {
            CheckReport::new(check, Some(value), false, format!("Pre value at {} is not numeric", path))
        }
        Ok((_, path, None)) => CheckReport::new(check, None, false, format!("No value at {}", path)),
        Err(diagnostic) => CheckReport::new(check, None, false, diagnostic),
    }
}

fn diff(check: &ResponseCheck, response: &RawResponse, ctx: &RunContext, origin: &str) -> CheckReport {
    let (tcid, path, post) = match probe_value(check, response) {
        Ok(found) => found,
        Err(diagnostic) => return CheckReport::new(check, None, false, diagnostic),
    };

    let pre = match ctx.get(origin, &snapshot_key(&tcid, &path)).and_then(|v| v.parse::<f64>().ok()) {
        Some(pre) => pre,
        None => return CheckReport::new(check, None, false, format!("No pre snapshot for {}", path)),
    };
    let post = match post.as_deref().map(str::trim).and_then(|v| v.parse::<f64>().ok()) {
        Some(value) => value,
        None => return CheckReport::new(check, post.clone(), false, format!("Post value at {} is not numeric", path)),
    };

    let delta = format_number(post - pre);
    let (passed, message) = match (check.operator, check.expect.as_deref()) {
        (Operator::Is | Operator::IsNot, Some(expect)) => match expect.trim().parse::<f64>() {
            Ok(expected) => {
                let equal = ((post - pre) - expected).abs() < 1e-9;
                let passed = if check.operator == Operator::Is { equal } else { !equal };
                (passed, format!("delta {} {} {}", delta, check.operator, expect))
            }
            Err(_) => (false, format!("Expected delta '{}' is not numeric", expect)),
        },
        (operator, expect) => compare(operator, Some(delta.as_str()), expect),
    };
    CheckReport::new(check, Some(delta), passed, message)
}

fn probe_compare(check: &ResponseCheck, response: &RawResponse) -> CheckReport {
    match probe_value(check, response) {
        Ok((_, _, actual)) => {
            let (passed, message) = compare(check.operator, actual.as_deref(), check.expect.as_deref());
            CheckReport::new(check, actual, passed, message)
        }
        Err(diagnostic) => CheckReport::new(check, None, check.operator == Operator::IsNull, diagnostic),
    }
}

fn format_number(value: f64) -> String {
    if value.fract() == 0.0 && value.abs() < 1e15 {
        format!("{}", value as i64)
    } else {
        value.to_string()
    }
}

/// Apply an operator. A missing actual value only satisfies `IS_NULL`.
pub fn compare(operator: Operator, actual: Option<&str>, expect: Option<&str>) -> (bool, String) {
    let actual = match actual {
        Some(actual) => actual,
        None => {
            return match operator {
                Operator::IsNull => (true, "Value is null".to_string()),
                _ => (false, "No value extracted".to_string()),
            };
        }
    };

    let expect_str = expect.unwrap_or("");
    let describe = |passed: bool| {
        let verdict = if passed { "matches" } else { "does not match" };
        format!("'{}' {} {} '{}'", actual, verdict, operator, expect_str)
    };

    match operator {
        Operator::IsNull => (false, format!("Expected null, got '{}'", actual)),
        Operator::NotNull => (true, "Value is present".to_string()),
        _ if expect.is_none() => (false, format!("{} requires an expected value", operator)),
        Operator::Is => {
            let passed = actual == expect_str;
            (passed, describe(passed))
        }
        Operator::IsNot => {
            let passed = actual != expect_str;
            (passed, describe(passed))
        }
        Operator::Contains => {
            let passed = actual.contains(expect_str);
            (passed, describe(passed))
        }
        Operator::NotContains => {
            let passed = !actual.contains(expect_str);
            (passed, describe(passed))
        }
        Operator::GreaterThan | Operator::LessThan => {
            match (actual.trim().parse::<f64>(), expect_str.trim().parse::<f64>()) {
                (Ok(a), Ok(e)) => {
                    let passed = if operator == Operator::GreaterThan { a > e } else { a < e };
                    (passed, describe(passed))
                }
                _ => (false, format!("{} needs numeric operands, got '{}' and '{}'", operator, actual, expect_str)),
            }
        }
        Operator::Matches | Operator::NotMatches => {
            match Regex::new(&format!("^(?:{})$", expect_str)) {
                Ok(re) => {
                    let passed = re.is_match(actual) == (operator == Operator::Matches);
                    (passed, describe(passed))
                }
                Err(e) => (false, format!("Invalid regex '{}': {}", expect_str, e)),
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::errors::PulserunError;

    fn response(status: u16, body: &str) -> RawResponse {
        RawResponse::new(status, body)
    }

    #[test]
    fn test_status_check() {
        let ctx = RunContext::new();
        let evaluator = CheckEvaluator::new();

        let reports = evaluator.evaluate(&[ResponseCheck::status("200")], &response(200, ""), &ctx, "T1");
        assert!(reports[0].passed);
        assert_eq!(reports[0].actual.as_deref(), Some("200"));

        let reports = evaluator.evaluate(&[ResponseCheck::status("200")], &response(500, ""), &ctx, "T1");
        assert!(!reports[0].passed);
        assert_eq!(reports[0].actual.as_deref(), Some("500"));
    }

    #[test]
    fn test_save_as_writes_context_even_on_failure() {
        let ctx = RunContext::new();
        let evaluator = CheckEvaluator::new();
        let checks = vec![
            ResponseCheck::new(CheckType::JsonPath, "$.token", Operator::Is, Some("other")).with_save_as("token"),
            ResponseCheck::new(CheckType::JsonPath, "$.missing", Operator::NotNull, None).with_save_as("missing"),
        ];

        let reports = evaluator.evaluate(&checks, &response(200, r#"{"token":"abc"}"#), &ctx, "T1");
        assert!(!reports[0].passed);
        assert!(!reports[1].passed);
        assert_eq!(ctx.get("T1", "token").as_deref(), Some("abc"));
        assert!(!ctx.contains("T1", "missing"));
    }

    #[test]
    fn test_no_match_only_satisfies_is_null() {
        let ctx = RunContext::new();
        let evaluator = CheckEvaluator::new();
        let checks = vec![
            ResponseCheck::new(CheckType::Regex, r"id=(\d+)", Operator::IsNull, None),
            ResponseCheck::new(CheckType::Regex, r"id=(\d+)", Operator::IsNot, Some("1")),
        ];

        let reports = evaluator.evaluate(&checks, &response(200, "nothing here"), &ctx, "T1");
        assert!(reports[0].passed);
        assert!(!reports[1].passed);
    }

    #[test]
    fn test_xpath_check() {
        let ctx = RunContext::new();
        let evaluator = CheckEvaluator::new();
        let check = ResponseCheck::new(CheckType::Xpath, "/r/code", Operator::Is, Some("OK"));

        let reports = evaluator.evaluate(&[check], &response(200, "<r><code>OK</code></r>"), &ctx, "T1");
        assert!(reports[0].passed);
    }

    #[test]
    fn test_operators() {
        assert!(compare(Operator::Contains, Some("hello world"), Some("world")).0);
        assert!(compare(Operator::NotContains, Some("hello"), Some("world")).0);
        assert!(compare(Operator::GreaterThan, Some("10"), Some("9.5")).0);
        assert!(compare(Operator::LessThan, Some("-1"), Some("0")).0);
        assert!(!compare(Operator::GreaterThan, Some("abc"), Some("1")).0);
        assert!(compare(Operator::Matches, Some("abc123"), Some("[a-z]+\\d+")).0);
        assert!(!compare(Operator::Matches, Some("abc123x"), Some("[a-z]+\\d+")).0);
        assert!(compare(Operator::NotMatches, Some("abc"), Some("\\d+")).0);
        assert!(!compare(Operator::Matches, Some("abc"), Some("(")).0);
        assert!(compare(Operator::NotNull, Some(""), None).0);
        assert!(!compare(Operator::IsNull, Some("x"), None).0);
        assert!(!compare(Operator::Is, Some("x"), None).0);
        assert!(compare(Operator::IsNull, None, None).0);
        assert!(!compare(Operator::NotNull, None, None).0);
    }

    #[test]
    fn test_probe_checks_skipped_on_main() {
        let ctx = RunContext::new();
        let evaluator = CheckEvaluator::new();
        let checks = vec![
            ResponseCheck::new(CheckType::Diff, "BAL.$.amount", Operator::Is, Some("5")),
            ResponseCheck::status("200"),
        ];

        let reports = evaluator.evaluate(&checks, &response(200, "{}"), &ctx, "M");
        assert_eq!(reports.len(), 1);
        assert_eq!(reports[0].check_type, CheckType::Status);
    }

    #[test]
    fn test_diff_pre_and_post() {
        let ctx = RunContext::new();
        let evaluator = CheckEvaluator::new();
        let probes = vec![
            ResponseCheck::new(CheckType::Diff, "BAL.$.amount", Operator::Is, Some("-10")),
            ResponseCheck::new(CheckType::Diff, "BAL.amount", Operator::LessThan, Some("0")),
        ];

        let pre = evaluator.evaluate_in_phase(&probes, &response(200, r#"{"amount":100}"#), &ctx, "M", Phase::DiffPre);
        assert!(pre.iter().all(|r| r.passed));

        let post = evaluator.evaluate_in_phase(&probes, &response(200, r#"{"amount":90}"#), &ctx, "M", Phase::DiffPst);
        assert_eq!(post[0].actual.as_deref(), Some("-10"));
        assert!(post[0].passed);
        assert!(post[1].passed);

        let other = evaluator.evaluate_in_phase(&probes, &response(200, r#"{"amount":95}"#), &ctx, "M", Phase::DiffPst);
        assert!(!other[0].passed);
    }

    #[test]
    fn test_diff_without_snapshot_fails() {
        let ctx = RunContext::new();
        let evaluator = CheckEvaluator::new();
        let probes = vec![ResponseCheck::new(CheckType::Diff, "BAL.$.amount", Operator::Is, Some("0"))];

        let post = evaluator.evaluate_in_phase(&probes, &response(200, r#"{"amount":1}"#), &ctx, "M", Phase::DiffPst);
        assert!(!post[0].passed);
    }

    #[test]
    fn test_pre_and_pst_checks() {
        let ctx = RunContext::new();
        let evaluator = CheckEvaluator::new();
        let probes = vec![
            ResponseCheck::new(CheckType::PreCheck, "ST.$.state", Operator::Is, Some("open")),
            ResponseCheck::new(CheckType::PstCheck, "ST.$.state", Operator::Is, Some("closed")),
        ];
        let body = r#"{"state":"open"}"#;

        let pre = evaluator.evaluate_in_phase(&probes, &response(200, body), &ctx, "M", Phase::PreCheck);
        assert_eq!(pre.len(), 1);
        assert!(pre[0].passed);

        let pst = evaluator.evaluate_in_phase(&probes, &response(200, body), &ctx, "M", Phase::PstCheck);
        assert_eq!(pst.len(), 1);
        assert!(!pst[0].passed);
    }

    struct FixedProbe;

    impl DbProbe for FixedProbe {
        fn query(&self, expression: &str) -> Result<Option<String>> {
            if expression.contains("fail") {
                Err(PulserunError::Runtime("connection refused".to_string()))
            } else {
                Ok(Some("3".to_string()))
            }
        }
    }

    #[test]
    fn test_db_checks() {
        let ctx = RunContext::new();
        let check = ResponseCheck::new(CheckType::Db, "select count(*) from orders", Operator::Is, Some("3"));

        let without = CheckEvaluator::new().evaluate(&[check.clone()], &response(200, ""), &ctx, "T1");
        assert!(!without[0].passed);
        assert!(without[0].message.contains("No database probe"));

        let evaluator = CheckEvaluator::new().with_db_probe(Arc::new(FixedProbe));
        let with = evaluator.evaluate(&[check], &response(200, ""), &ctx, "T1");
        assert!(with[0].passed);

        let failing = ResponseCheck::new(CheckType::Db, "fail", Operator::Is, Some("3"));
        let reports = evaluator.evaluate(&[failing], &response(200, ""), &ctx, "T1");
        assert!(!reports[0].passed);
    }

    #[test]
    fn test_optional_failure_is_not_fatal() {
        let ctx = RunContext::new();
        let reports = CheckEvaluator::new().evaluate(&[ResponseCheck::status("201").optional()], &response(200, ""), &ctx, "T1");
        assert!(!reports[0].passed);
        assert!(!reports[0].is_fatal_failure());
    }
}
