//! Table output for plans, schedules and run summaries

use comfy_table::{Attribute, Cell, ContentArrangement, Table};

use crate::load::{InjectionPlan, LoadRunResult};
use crate::pipeline::{ExecutionItem, RunReport};

fn new_table(header: &[&str]) -> Table {
    let mut table = Table::new();
    table.set_content_arrangement(ContentArrangement::Dynamic);
    table.set_header(header.iter().map(|h| Cell::new(h).add_attribute(Attribute::Bold)).collect::<Vec<_>>());
    table
}

/// Execution plan, one row per item
pub fn format_plan(items: &[ExecutionItem]) -> String {
    if items.is_empty() {
        return "(empty plan)".to_string();
    }

    let mut table = new_table(&["#", "Origin", "Phase", "TCID", "Method", "Probes"]);
    for (i, item) in items.iter().enumerate() {
        table.add_row(vec![
            Cell::new(i + 1),
            Cell::new(&item.origin_tcid),
            Cell::new(item.phase),
            Cell::new(&item.test.tcid),
            Cell::new(&item.test.method),
            Cell::new(item.probes.len()),
        ]);
    }
    table.to_string()
}

/// Injection steps followed by the plan totals
pub fn format_injection(plan: &InjectionPlan) -> String {
    let mut table = new_table(&["#", "Step", "Users", "Seconds"]);
    for (i, step) in plan.steps.iter().enumerate() {
        table.add_row(vec![
            Cell::new(i + 1),
            Cell::new(step),
            Cell::new(step.users()),
            Cell::new(step.seconds()),
        ]);
    }
    format!(
        "{}\nusers: {}  max duration: {}s  loop: {}",
        table,
        plan.total_users(),
        plan.max_duration_seconds,
        plan.loop_policy
    )
}

/// Per-test outcome plus totals
pub fn format_run_summary(report: &RunReport) -> String {
    let mut table = new_table(&["Suite", "TCID", "Name", "Result", "Duration"]);
    for test in &report.reports {
        table.add_row(vec![
            Cell::new(&test.suite),
            Cell::new(&test.origin_tcid),
            Cell::new(&test.name),
            Cell::new(if test.passed { "PASS" } else { "FAIL" }),
            Cell::new(format!("{} ms", test.duration_ms)),
        ]);
    }
    let totals = &report.totals;
    format!(
        "{}\ntests: {}/{} passed ({:.1}%)  suites: {}/{} passed ({:.1}%)",
        table,
        totals.tests_passed,
        totals.tests_total,
        totals.test_rate,
        totals.suites_passed,
        totals.suites_total,
        totals.suite_rate
    )
}

/// Load run numbers
pub fn format_load_summary(result: &LoadRunResult) -> String {
    let stats = &result.stats;
    let mut table = new_table(&["Metric", "Value"]);
    let rows: Vec<(&str, String)> = vec![
        ("Status", format!("{:?}", result.status)),
        ("Users", result.users.to_string()),
        ("Duration", format!("{:.2}s", result.duration.as_secs_f64())),
        ("Requests", stats.total_requests.to_string()),
        ("Passed", stats.passed_requests.to_string()),
        ("Failed", stats.failed_requests.to_string()),
        ("Errors", stats.errored_requests.to_string()),
        ("Requests/sec", format!("{:.2}", stats.requests_per_second)),
        ("Latency mean", format!("{:.2}ms", stats.latency.mean_ms)),
        ("Latency p50", format!("{:.2}ms", stats.latency.p50_ms)),
        ("Latency p95", format!("{:.2}ms", stats.latency.p95_ms)),
        ("Latency p99", format!("{:.2}ms", stats.latency.p99_ms)),
    ];
    for (name, value) in rows {
        table.add_row(vec![Cell::new(name), Cell::new(value)]);
    }
    table.to_string()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::load::{build_injection, LoadProfile, StandardProfile};
    use crate::models::{Phase, TestCase};

    #[test]
    fn test_format_plan() {
        let items = vec![ExecutionItem {
            test: TestCase { tcid: "T1".to_string(), ..Default::default() },
            origin_tcid: "T1".to_string(),
            phase: Phase::Main,
            probes: Vec::new(),
        }];
        let out = format_plan(&items);
        assert!(out.contains("T1"));
        assert!(out.contains("MAIN"));
        assert_eq!(format_plan(&[]), "(empty plan)");
    }

    #[test]
    fn test_format_injection() {
        let plan = build_injection(&LoadProfile::Standard(StandardProfile {
            num_threads: 4,
            ramp_up_seconds: 8,
            ..Default::default()
        }))
        .unwrap();
        let out = format_injection(&plan);
        assert!(out.contains("rampUsers(4) during 8s"));
        assert!(out.contains("max duration: 8s"));
    }
}
