//! Functional test pipeline: plan, execute, check, report

pub mod checks;
pub mod condition;
pub mod dependency;
pub mod extract;
pub mod report;
pub mod runner;

pub use checks::{CheckEvaluator, CheckReport, DbProbe};
pub use condition::{parse_conditions, ConditionSet};
pub use dependency::{select_tests, DependencyExpander, ExecutionItem, Selection};
pub use report::{
    build_report, build_report_with, render_report, write_report, ReportFormat, ReportOptions, RunReport,
};
pub use runner::{ExecutionResult, PipelineRunner, RunOptions};
