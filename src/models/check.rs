//! Response check definitions

use std::fmt;
use serde::{Deserialize, Serialize};
use crate::errors::{PulserunError, Result};

/// Where a check reads its actual value from
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum CheckType {
    Status,
    JsonPath,
    Xpath,
    Regex,
    Diff,
    PreCheck,
    PstCheck,
    Db,
}

impl CheckType {
    /// Probe checks reference another test case via `tcid.jsonpath`
    pub fn is_probe(&self) -> bool {
        matches!(self, CheckType::Diff | CheckType::PreCheck | CheckType::PstCheck)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            CheckType::Status => "STATUS",
            CheckType::JsonPath => "JSON_PATH",
            CheckType::Xpath => "XPATH",
            CheckType::Regex => "REGEX",
            CheckType::Diff => "DIFF",
            CheckType::PreCheck => "PRE_CHECK",
            CheckType::PstCheck => "PST_CHECK",
            CheckType::Db => "DB",
        }
    }
}

impl fmt::Display for CheckType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Comparison applied between actual and expected values
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum Operator {
    #[default]
    Is,
    IsNot,
    Contains,
    NotContains,
    GreaterThan,
    LessThan,
    Matches,
    NotMatches,
    IsNull,
    NotNull,
}

impl Operator {
    pub fn as_str(&self) -> &'static str {
        match self {
            Operator::Is => "IS",
            Operator::IsNot => "IS_NOT",
            Operator::Contains => "CONTAINS",
            Operator::NotContains => "NOT_CONTAINS",
            Operator::GreaterThan => "GREATER_THAN",
            Operator::LessThan => "LESS_THAN",
            Operator::Matches => "MATCHES",
            Operator::NotMatches => "NOT_MATCHES",
            Operator::IsNull => "IS_NULL",
            Operator::NotNull => "NOT_NULL",
        }
    }
}

impl fmt::Display for Operator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A check defined on a test case
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResponseCheck {
    #[serde(alias = "type")]
    pub check_type: CheckType,

    /// Extraction expression (JSONPath, XPath, regex, `tcid.jsonpath`, query)
    #[serde(default)]
    pub expression: String,

    #[serde(default)]
    pub operator: Operator,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub expect: Option<String>,

    /// Run Context key the extracted value is saved under
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub save_as: Option<String>,

    /// Optional checks are reported but never fail their request
    #[serde(default)]
    pub optional: bool,
}

impl ResponseCheck {
    pub fn new(check_type: CheckType, expression: &str, operator: Operator, expect: Option<&str>) -> Self {
        Self {
            check_type,
            expression: expression.to_string(),
            operator,
            expect: expect.map(String::from),
            save_as: None,
            optional: false,
        }
    }

    /// Status check shorthand
    pub fn status(expect: &str) -> Self {
        Self::new(CheckType::Status, "", Operator::Is, Some(expect))
    }

    pub fn with_save_as(mut self, key: &str) -> Self {
        self.save_as = Some(key.to_string());
        self
    }

    pub fn optional(mut self) -> Self {
        self.optional = true;
        self
    }

    /// Parse a serialized check list (JSON array)
    pub fn parse_list(serialized: &str) -> Result<Vec<ResponseCheck>> {
        serde_json::from_str(serialized)
            .map_err(|e| PulserunError::Definition(format!("Invalid response checks: {}", e)))
    }

    /// Split a probe expression `tcid.jsonpath` into its parts
    pub fn probe_target(&self) -> Option<(&str, String)> {
        let (tcid, path) = self.expression.trim().split_once('.')?;
        if tcid.is_empty() || path.is_empty() {
            return None;
        }
        let path = if path.starts_with('$') {
            path.to_string()
        } else {
            format!("$.{}", path)
        };
        Some((tcid, path))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_list_with_defaults() {
        let checks = ResponseCheck::parse_list(
            r#"[{"type":"JSON_PATH","expression":"$.id","save_as":"id","optional":true}]"#,
        )
        .unwrap();

        assert_eq!(checks[0].check_type, CheckType::JsonPath);
        assert_eq!(checks[0].operator, Operator::Is);
        assert_eq!(checks[0].save_as.as_deref(), Some("id"));
        assert!(checks[0].optional);
    }

    #[test]
    fn test_parse_list_rejects_garbage() {
        assert!(ResponseCheck::parse_list("not json").is_err());
    }

    #[test]
    fn test_probe_target() {
        let check = ResponseCheck::new(CheckType::Diff, "TC9.$.balance", Operator::Is, Some("10"));
        assert_eq!(check.probe_target(), Some(("TC9", "$.balance".to_string())));

        let check = ResponseCheck::new(CheckType::PreCheck, "TC9.data.count", Operator::Is, None);
        assert_eq!(check.probe_target(), Some(("TC9", "$.data.count".to_string())));

        let check = ResponseCheck::new(CheckType::Diff, "TC9", Operator::Is, None);
        assert_eq!(check.probe_target(), None);
    }
}
