//! Core definition types
//!
//! Test cases, endpoints, templates and scenarios as they come out of the
//! definition store. These records are read-only for the engine.
//!
//! Header maps use [`IndexMap`] so that user-specified order is preserved in
//! rendered requests and reports.

use std::collections::HashMap;
use std::fmt;
use indexmap::IndexMap;
use serde::{Deserialize, Deserializer, Serialize};

use super::check::ResponseCheck;
use crate::load::LoadProfile;

/// Headers dictionary - header name to value, insertion ordered
pub type HeadersDict = IndexMap<String, String>;

/// Dynamic-variable expression map (placeholder name to expression)
pub type VarExprMap = HashMap<String, String>;

/// A persisted test case
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TestCase {
    /// Unique test case id within a run
    pub tcid: String,

    /// Suite this case belongs to
    #[serde(default)]
    pub suite: String,

    /// Human-readable name
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub name: String,

    /// Disabled cases are excluded from selection (not from dependencies)
    #[serde(default = "default_enabled")]
    pub enabled: bool,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,

    /// HTTP method (GET, POST, ...)
    #[serde(default = "default_method")]
    pub method: String,

    /// Endpoint name, resolved per environment
    pub endpoint: String,

    /// Path appended to the endpoint base URL
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub path: String,

    /// Header template reference
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub header_template: Option<String>,

    /// Body template reference
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body_template: Option<String>,

    /// Inline header overrides (win over the header template)
    #[serde(default, skip_serializing_if = "IndexMap::is_empty")]
    pub headers: HeadersDict,

    /// Inline body override (wins over the body template)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub body: Option<String>,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub body_vars: VarExprMap,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub header_vars: VarExprMap,

    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub endpoint_vars: VarExprMap,

    /// Dependency phases, e.g. `[Setup]TC001,TC002;[Teardown]TC003`
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub conditions: String,

    /// Response checks; accepts a list or a serialized JSON string
    #[serde(
        default,
        alias = "response_checks",
        alias = "responseChecks",
        deserialize_with = "deserialize_checks",
        skip_serializing_if = "Vec::is_empty"
    )]
    pub checks: Vec<ResponseCheck>,

    /// Pause after execution, in seconds
    #[serde(default, skip_serializing_if = "is_zero")]
    pub wait_time: u64,
}

fn default_enabled() -> bool {
    true
}

fn default_method() -> String {
    "GET".to_string()
}

fn is_zero(v: &u64) -> bool {
    *v == 0
}

/// Checks are stored either as a list or as a JSON string column
fn deserialize_checks<'de, D>(deserializer: D) -> Result<Vec<ResponseCheck>, D::Error>
where
    D: Deserializer<'de>,
{
    #[derive(Deserialize)]
    #[serde(untagged)]
    enum ChecksRepr {
        List(Vec<ResponseCheck>),
        Serialized(String),
    }

    match ChecksRepr::deserialize(deserializer)? {
        ChecksRepr::List(list) => Ok(list),
        ChecksRepr::Serialized(s) if s.trim().is_empty() => Ok(Vec::new()),
        ChecksRepr::Serialized(s) => ResponseCheck::parse_list(&s).map_err(serde::de::Error::custom),
    }
}

impl Default for TestCase {
    fn default() -> Self {
        Self {
            tcid: String::new(),
            suite: String::new(),
            name: String::new(),
            enabled: true,
            tags: Vec::new(),
            method: default_method(),
            endpoint: String::new(),
            path: String::new(),
            header_template: None,
            body_template: None,
            headers: HeadersDict::new(),
            body: None,
            body_vars: VarExprMap::new(),
            header_vars: VarExprMap::new(),
            endpoint_vars: VarExprMap::new(),
            conditions: String::new(),
            checks: Vec::new(),
            wait_time: 0,
        }
    }
}

/// A named endpoint with per-environment base URLs
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Endpoint {
    pub name: String,

    /// Base URL used when no environment entry matches
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub url: Option<String>,

    /// Environment name to base URL
    #[serde(default, skip_serializing_if = "HashMap::is_empty")]
    pub environments: HashMap<String, String>,
}

impl Endpoint {
    /// Resolve the base URL for an environment
    pub fn resolve(&self, environment: Option<&str>) -> Option<&str> {
        environment
            .and_then(|env| self.environments.get(env))
            .map(String::as_str)
            .or(self.url.as_deref())
    }
}

/// A header or body template
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Template {
    pub name: String,

    /// Header templates hold a JSON object; body templates are free text
    pub content: String,
}

/// One step of a scenario
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ScenarioStep {
    pub tcid: String,

    /// Overrides the test case's wait time
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub wait_time: Option<u64>,

    /// Step runs only when the run's tag filter matches one of these
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub tags: Vec<String>,
}

/// An ordered list of steps plus the load shape to run them under
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scenario {
    pub name: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    pub steps: Vec<ScenarioStep>,

    pub profile: LoadProfile,
}

/// Role an executed item plays relative to its origin
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Phase {
    Setup,
    DiffPre,
    PreCheck,
    Main,
    DiffPst,
    PstCheck,
    Teardown,
}

impl Phase {
    /// Phases in report order
    pub const ORDER: [Phase; 7] = [
        Phase::Setup,
        Phase::DiffPre,
        Phase::PreCheck,
        Phase::Main,
        Phase::DiffPst,
        Phase::PstCheck,
        Phase::Teardown,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            Phase::Setup => "SETUP",
            Phase::DiffPre => "DIFF_PRE",
            Phase::PreCheck => "PRE_CHECK",
            Phase::Main => "MAIN",
            Phase::DiffPst => "DIFF_PST",
            Phase::PstCheck => "PST_CHECK",
            Phase::Teardown => "TEARDOWN",
        }
    }
}

impl fmt::Display for Phase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::check::CheckType;

    #[test]
    fn test_endpoint_resolution() {
        let endpoint = Endpoint {
            name: "api".to_string(),
            url: Some("http://default".to_string()),
            environments: HashMap::from([("qa".to_string(), "http://qa".to_string())]),
        };

        assert_eq!(endpoint.resolve(Some("qa")), Some("http://qa"));
        assert_eq!(endpoint.resolve(Some("prod")), Some("http://default"));
        assert_eq!(endpoint.resolve(None), Some("http://default"));
    }

    #[test]
    fn test_checks_from_serialized_string() {
        let yaml = r#"
tcid: T1
endpoint: api
response_checks: '[{"check_type":"STATUS","expression":"","expect":"200"}]'
"#;
        let test: TestCase = serde_yaml::from_str(yaml).unwrap();
        assert_eq!(test.checks.len(), 1);
        assert_eq!(test.checks[0].check_type, CheckType::Status);
        assert!(test.enabled);
        assert_eq!(test.method, "GET");
    }

    #[test]
    fn test_phase_order() {
        assert!(Phase::Setup < Phase::Main);
        assert!(Phase::PstCheck < Phase::Teardown);
        assert_eq!(Phase::ORDER[3], Phase::Main);
        assert_eq!(Phase::DiffPre.to_string(), "DIFF_PRE");
    }
}
