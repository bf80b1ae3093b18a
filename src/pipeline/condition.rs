//! Condition string parsing
//!
//! Grammar: `( '[' PhaseName ']' tcid (',' tcid)* ';'? )*`, e.g.
//! `[Setup]TC001,TC002;[Teardown]TC003`. Phase names are case-insensitive.
//! Only `Setup` and `Teardown` are recognized; tcids under any other phase
//! are ignored.

use tracing::debug;
use crate::errors::{PulserunError, Result};

/// Dependencies declared by a test case, in declared order
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ConditionSet {
    pub setup: Vec<String>,
    pub teardown: Vec<String>,
}

impl ConditionSet {
    pub fn is_empty(&self) -> bool {
        self.setup.is_empty() && self.teardown.is_empty()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Section {
    Setup,
    Teardown,
    Ignored,
}

/// Parse a condition string
pub fn parse_conditions(conditions: &str) -> Result<ConditionSet> {
    let malformed = |message: String| PulserunError::Condition {
        conditions: conditions.to_string(),
        message,
    };

    let mut set = ConditionSet::default();
    let mut section: Option<Section> = None;
    let mut rest = conditions;

    loop {
        rest = rest.trim_start_matches(|c: char| c.is_whitespace() || c == ',' || c == ';');
        if rest.is_empty() {
            break;
        }

        if let Some(after) = rest.strip_prefix('[') {
            let close = after
                .find(']')
                .ok_or_else(|| malformed("unclosed '['".to_string()))?;
            let name = after[..close].trim();
            if name.is_empty() {
                return Err(malformed("empty phase name".to_string()));
            }

            section = Some(if name.eq_ignore_ascii_case("setup") {
                Section::Setup
            } else if name.eq_ignore_ascii_case("teardown") {
                Section::Teardown
            } else {
                debug!(phase = %name, "Ignoring unknown condition phase");
                Section::Ignored
            });
            rest = &after[close + 1..];
            continue;
        }

        let end = rest.find(['[', ',', ';']).unwrap_or(rest.len());
        let tcid = rest[..end].trim();
        rest = &rest[end..];
        if tcid.is_empty() {
            continue;
        }

        match section {
            None => return Err(malformed(format!("tcid '{}' appears before any phase header", tcid))),
            Some(Section::Setup) => set.setup.push(tcid.to_string()),
            Some(Section::Teardown) => set.teardown.push(tcid.to_string()),
            Some(Section::Ignored) => {}
        }
    }

    Ok(set)
}
