//! Execution plan expansion
//!
//! Each selected test expands into its own sequence of items:
//! SETUP, DIFF_PRE, PRE_CHECK, MAIN, DIFF_PST, PST_CHECK, TEARDOWN.
//! Setup and teardown come from the test's condition string; the probe
//! phases come from its DIFF / PRE_CHECK / PST_CHECK checks, one item per
//! distinct referenced tcid.
//!
//! Expansion is one level deep: conditions of dependency tests are not
//! followed, so there is nothing to cycle on.

use tracing::{info, warn};

use super::condition::parse_conditions;
use crate::errors::{PulserunError, Result};
use crate::models::{CheckType, Phase, ResponseCheck, TestCase};
use crate::store::DefinitionStore;

/// One test execution in the plan
#[derive(Debug, Clone)]
pub struct ExecutionItem {
    pub test: TestCase,

    /// tcid of the selected test this item was expanded for
    pub origin_tcid: String,

    pub phase: Phase,

    /// Origin checks evaluated against this item's response (probe phases only)
    pub probes: Vec<ResponseCheck>,
}

impl ExecutionItem {
    fn new(test: TestCase, origin: &str, phase: Phase, probes: Vec<ResponseCheck>) -> Self {
        Self {
            test,
            origin_tcid: origin.to_string(),
            phase,
            probes,
        }
    }

    pub fn is_main(&self) -> bool {
        self.phase == Phase::Main
    }
}

/// What the user asked to run
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Selection {
    Tests(Vec<String>),
    Suite(String),
}

/// Resolve a selection into test cases, dropping disabled ones
pub fn select_tests(store: &dyn DefinitionStore, selection: &Selection) -> Result<Vec<TestCase>> {
    let candidates = match selection {
        Selection::Tests(tcids) => tcids
            .iter()
            .map(|tcid| {
                store.test(tcid).ok_or_else(|| PulserunError::DependencyNotFound {
                    tcid: tcid.clone(),
                    referenced_by: "selection".to_string(),
                })
            })
            .collect::<Result<Vec<_>>>()?,
        Selection::Suite(suite) => {
            let tests = store.tests_in_suite(suite);
            if tests.is_empty() {
                return Err(PulserunError::Definition(format!("Suite '{}' has no tests", suite)));
            }
            tests
        }
    };

    Ok(candidates
        .into_iter()
        .filter(|test| {
            if !test.enabled {
                info!(tcid = %test.tcid, "Skipping disabled test");
            }
            test.enabled
        })
        .collect())
}

/// Expands selected tests into an ordered execution list
pub struct DependencyExpander<'a> {
    store: &'a dyn DefinitionStore,
}

impl<'a> DependencyExpander<'a> {
    pub fn new(store: &'a dyn DefinitionStore) -> Self {
        Self { store }
    }

    /// Expand all selected tests, in selection order.
    ///
    /// Any unresolvable tcid fails the whole expansion.
    pub fn expand(&self, selected: &[TestCase]) -> Result<Vec<ExecutionItem>> {
        let mut items = Vec::new();
        for main in selected {
            items.extend(self.expand_one(main)?);
        }
        Ok(items)
    }

    fn expand_one(&self, main: &TestCase) -> Result<Vec<ExecutionItem>> {
        let origin = main.tcid.as_str();
        let conditions = parse_conditions(&main.conditions)?;

        let diff = probe_groups(main, CheckType::Diff)?;
        let pre = probe_groups(main, CheckType::PreCheck)?;
        let pst = probe_groups(main, CheckType::PstCheck)?;

        let mut items = Vec::new();
        for tcid in &conditions.setup {
            items.push(ExecutionItem::new(self.lookup(tcid, main)?, origin, Phase::Setup, Vec::new()));
        }
        for (tcid, probes) in &diff {
            items.push(ExecutionItem::new(self.lookup(tcid, main)?, origin, Phase::DiffPre, probes.clone()));
        }
        for (tcid, probes) in &pre {
            items.push(ExecutionItem::new(self.lookup(tcid, main)?, origin, Phase::PreCheck, probes.clone()));
        }

        items.push(ExecutionItem::new(main.clone(), origin, Phase::Main, Vec::new()));

        for (tcid, probes) in &diff {
            items.push(ExecutionItem::new(self.lookup(tcid, main)?, origin, Phase::DiffPst, probes.clone()));
        }
        for (tcid, probes) in &pst {
            items.push(ExecutionItem::new(self.lookup(tcid, main)?, origin, Phase::PstCheck, probes.clone()));
        }
        for tcid in &conditions.teardown {
            items.push(ExecutionItem::new(self.lookup(tcid, main)?, origin, Phase::Teardown, Vec::new()));
        }

        Ok(items)
    }

    fn lookup(&self, tcid: &str, main: &TestCase) -> Result<TestCase> {
        if tcid == main.tcid {
            warn!(tcid = %tcid, "Test case references itself in its conditions");
        }
        self.store.test(tcid).ok_or_else(|| PulserunError::DependencyNotFound {
            tcid: tcid.to_string(),
            referenced_by: main.tcid.clone(),
        })
    }
}

/// Group a test's probe checks of one type by target tcid, first-seen order
fn probe_groups(main: &TestCase, check_type: CheckType) -> Result<Vec<(String, Vec<ResponseCheck>)>> {
    let mut groups: Vec<(String, Vec<ResponseCheck>)> = Vec::new();
    for check in main.checks.iter().filter(|c| c.check_type == check_type) {
        let (tcid, _) = check.probe_target().ok_or_else(|| {
            PulserunError::Definition(format!(
                "{} check '{}' on {} must have the form tcid.jsonpath",
                check_type, check.expression, main.tcid
            ))
        })?;
        match groups.iter_mut().find(|(t, _)| t == tcid) {
            Some((_, checks)) => checks.push(check.clone()),
            None => groups.push((tcid.to_string(), vec![check.clone()])),
        }
    }
    Ok(groups)
}
