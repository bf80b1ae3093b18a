//! CLI argument definitions using clap

use clap::{ArgAction, Args as ClapArgs, Parser, Subcommand};
use std::path::PathBuf;

use crate::logging::LogFormat;
use crate::pipeline::Selection;

/// pulserun - HTTP functional and load test orchestration
#[derive(Parser, Debug)]
#[command(name = "pulserun", version, about, long_about = None)]
pub struct Args {
    /// Config file (TOML). Defaults to <config dir>/pulserun/config.toml
    #[arg(long, value_name = "PATH", env = "PULSERUN_CONFIG", global = true)]
    pub config: Option<PathBuf>,

    /// More log output (-v info, -vv debug, -vvv trace)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Only log errors
    #[arg(short, long, global = true)]
    pub quiet: bool,

    /// Output format for structured logging: json (JSON Lines) or text (default)
    #[arg(long = "log-format", value_name = "FORMAT", value_enum, global = true)]
    pub log_format: Option<LogFormat>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the execution plan for a selection
    Plan(PlanArgs),
    /// Run a functional pass and write a report
    Run(RunArgs),
    /// Print the injection schedule of a scenario
    Profile(ProfileArgs),
    /// Run a scenario under its load profile
    Load(LoadArgs),
}

/// Definitions file
#[derive(ClapArgs, Debug, Clone)]
pub struct DefsArgs {
    /// Definitions file (YAML or TOML)
    #[arg(short = 'd', long = "defs", value_name = "FILE", env = "PULSERUN_DEFS")]
    pub defs: PathBuf,
}

/// Which tests to run
#[derive(ClapArgs, Debug, Clone)]
pub struct SelectionArgs {
    /// Test case ids, comma separated
    #[arg(long, value_delimiter = ',', value_name = "TCIDS", conflicts_with = "suite", required_unless_present = "suite")]
    pub tests: Vec<String>,

    /// Every enabled test of a suite
    #[arg(long, value_name = "SUITE")]
    pub suite: Option<String>,
}

impl SelectionArgs {
    pub fn selection(&self) -> Selection {
        match &self.suite {
            Some(suite) => Selection::Suite(suite.clone()),
            None => Selection::Tests(self.tests.clone()),
        }
    }
}

/// Request and report settings shared by `run` and `load`
#[derive(ClapArgs, Debug, Clone)]
pub struct ExecutionArgs {
    /// Endpoint environment
    #[arg(short = 'e', long = "env", value_name = "ENV")]
    pub env: Option<String>,

    /// Report file to write
    #[arg(short = 'o', long = "report", value_name = "PATH")]
    pub report: Option<PathBuf>,

    /// Report format: html, json or junit
    #[arg(short = 'f', long = "format", value_name = "FORMAT")]
    pub format: Option<String>,

    /// Per-request timeout, e.g. "30s"
    #[arg(long, value_name = "DURATION")]
    pub timeout: Option<String>,

    /// Skip TLS certificate verification
    #[arg(long, action = ArgAction::SetTrue)]
    pub insecure: bool,

    /// Ignore wait times between requests
    #[arg(long = "skip-waits", action = ArgAction::SetTrue)]
    pub skip_waits: bool,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct PlanArgs {
    #[command(flatten)]
    pub defs: DefsArgs,

    #[command(flatten)]
    pub selection: SelectionArgs,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct RunArgs {
    #[command(flatten)]
    pub defs: DefsArgs,

    #[command(flatten)]
    pub selection: SelectionArgs,

    #[command(flatten)]
    pub execution: ExecutionArgs,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct ProfileArgs {
    #[command(flatten)]
    pub defs: DefsArgs,

    /// Scenario name
    #[arg(short = 's', long, value_name = "NAME")]
    pub scenario: String,

    /// Print the plan as JSON
    #[arg(long, action = ArgAction::SetTrue)]
    pub json: bool,
}

#[derive(ClapArgs, Debug, Clone)]
pub struct LoadArgs {
    #[command(flatten)]
    pub defs: DefsArgs,

    /// Scenario name
    #[arg(short = 's', long, value_name = "NAME")]
    pub scenario: String,

    /// Only run scenario steps carrying one of these tags
    #[arg(long, value_delimiter = ',', value_name = "TAGS")]
    pub tags: Vec<String>,

    #[command(flatten)]
    pub execution: ExecutionArgs,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_run_with_tests() {
        let args = Args::try_parse_from([
            "pulserun", "run", "--defs", "defs.yaml", "--tests", "T1,T2", "--env", "qa", "-f", "json",
        ])
        .unwrap();

        match args.command {
            Command::Run(run) => {
                assert_eq!(run.selection.selection(), Selection::Tests(vec!["T1".into(), "T2".into()]));
                assert_eq!(run.execution.env.as_deref(), Some("qa"));
                assert_eq!(run.execution.format.as_deref(), Some("json"));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_selection_is_required_and_exclusive() {
        assert!(Args::try_parse_from(["pulserun", "plan", "--defs", "d.yaml"]).is_err());
        assert!(Args::try_parse_from(["pulserun", "plan", "--defs", "d.yaml", "--tests", "A", "--suite", "S"]).is_err());

        let args = Args::try_parse_from(["pulserun", "plan", "-d", "d.yaml", "--suite", "S"]).unwrap();
        match args.command {
            Command::Plan(plan) => assert_eq!(plan.selection.selection(), Selection::Suite("S".into())),
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_global_flags() {
        let args = Args::try_parse_from([
            "pulserun", "profile", "-d", "d.yaml", "-s", "smoke", "-vv", "--log-format", "json",
        ])
        .unwrap();
        assert_eq!(args.verbose, 2);
        assert_eq!(args.log_format, Some(LogFormat::Json));
    }
}
