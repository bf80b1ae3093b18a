use std::path::Path;
use std::sync::Arc;
use std::time::Duration;
use clap::Parser;
use tracing::{debug, info, warn};

use crate::cli::{Args, Command, ExecutionArgs, LoadArgs, PlanArgs, ProfileArgs, RunArgs};
use crate::config::Config;
use crate::context::RunContext;
use crate::errors::{PulserunError, Result};
use crate::load::{build_injection, LoadRunner, RunStatus, DEFAULT_MAX_RESULTS_PER_CASE};
use crate::logging;
use crate::pipeline::{
    build_report_with, write_report, PipelineRunner, ReportFormat, ReportOptions, RunOptions, RunReport,
};
use crate::signals;
use crate::status::ExitStatus;
use crate::store::{DefinitionStore, FileStore};
use crate::table;
use crate::transport::{ReqwestTransport, TransportConfig};
use crate::variables::VariableResolver;

/// Main entry point for the CLI.
///
/// Parses arguments, loads config, sets up logging and dispatches to the
/// subcommand handler on a tokio runtime.
pub fn run(args: Vec<String>) -> ExitStatus {
    let parsed = match Args::try_parse_from(&args) {
        Ok(args) => args,
        Err(e) => {
            e.print().ok();
            return if e.kind() == clap::error::ErrorKind::DisplayHelp
                || e.kind() == clap::error::ErrorKind::DisplayVersion {
                ExitStatus::Success
            } else {
                ExitStatus::Error
            };
        }
    };

    let config = match Config::load(parsed.config.as_deref()) {
        Ok(config) => config,
        Err(e) => return handle_error(e),
    };

    let format = parsed.log_format.or(config.log.format).unwrap_or_default();
    let level = if parsed.verbose > 0 || parsed.quiet {
        logging::level_for(parsed.verbose, parsed.quiet).to_string()
    } else {
        config.log.level.clone().unwrap_or_else(|| logging::level_for(0, false).to_string())
    };
    if let Err(e) = logging::init(format, &level) {
        eprintln!("Warning: {}", e);
    }

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => return handle_error(PulserunError::Runtime(format!("Failed to create tokio runtime: {}", e))),
    };

    match runtime.block_on(program(parsed, config)) {
        Ok(status) => status,
        Err(e) => handle_error(e),
    }
}

pub async fn program(args: Args, config: Config) -> Result<ExitStatus> {
    match args.command {
        Command::Plan(plan) => show_plan(plan),
        Command::Profile(profile) => show_profile(profile),
        Command::Run(run) => run_functional(run, &config).await,
        Command::Load(load) => run_load(load, &config).await,
    }
}

fn open_store(path: &Path) -> Result<Arc<FileStore>> {
    let store = FileStore::open(path)?;
    info!(path = %path.display(), "Loaded definitions");
    Ok(Arc::new(store))
}

/// Resolver with the store's custom variables loaded
fn build_resolver(store: &FileStore) -> Result<Arc<VariableResolver>> {
    let resolver = VariableResolver::new();
    let loaded = resolver.reload(store)?;
    if loaded > 0 {
        info!(converters = loaded, "Loaded custom variables");
    }
    Ok(Arc::new(resolver))
}

fn build_runner(
    store: Arc<FileStore>,
    execution: &ExecutionArgs,
    config: &Config,
) -> Result<PipelineRunner<ReqwestTransport>> {
    let timeout = match &execution.timeout {
        Some(t) => Some(
            humantime::parse_duration(t)
                .map_err(|e| PulserunError::Argument(format!("Invalid --timeout '{}': {}", t, e)))?,
        ),
        None => config.request_timeout()?,
    };
    let transport = ReqwestTransport::new(&TransportConfig {
        timeout: timeout.or(Some(Duration::from_secs(30))),
        insecure: execution.insecure || config.run.insecure,
        ..Default::default()
    })?;

    let resolver = build_resolver(&store)?;
    let options = RunOptions {
        environment: execution.env.clone().or_else(|| config.run.environment.clone()),
        skip_waits: execution.skip_waits || config.run.skip_waits,
    };

    Ok(PipelineRunner::new(store, resolver, Arc::new(transport)).with_options(options))
}

fn report_format(execution: &ExecutionArgs, config: &Config) -> Result<ReportFormat> {
    match &execution.format {
        Some(format) => format.parse(),
        None => Ok(config.report_format()?.unwrap_or_default()),
    }
}

fn emit_report(report: &RunReport, execution: &ExecutionArgs, config: &Config) -> Result<()> {
    let format = report_format(execution, config)?;
    let output = execution.report.clone().or_else(|| config.report.output.clone());
    if let Some(path) = output {
        write_report(report, format, &path)?;
        eprintln!("{} report written to: {}", format, path.display());
    }
    Ok(())
}

fn show_plan(args: PlanArgs) -> Result<ExitStatus> {
    let store = open_store(&args.defs.defs)?;
    let selected = crate::pipeline::select_tests(store.as_ref(), &args.selection.selection())?;
    let items = crate::pipeline::DependencyExpander::new(store.as_ref()).expand(&selected)?;
    println!("{}", table::format_plan(&items));
    Ok(ExitStatus::Success)
}

fn show_profile(args: ProfileArgs) -> Result<ExitStatus> {
    let store = open_store(&args.defs.defs)?;
    let scenario = store
        .scenario(&args.scenario)
        .ok_or_else(|| PulserunError::Definition(format!("Scenario '{}' not found", args.scenario)))?;
    let plan = build_injection(&scenario.profile)?;

    if args.json {
        println!("{}", serde_json::to_string_pretty(&plan)?);
    } else {
        println!("{} ({})", scenario.name, scenario.profile.kind());
        println!("{}", table::format_injection(&plan));
    }
    Ok(ExitStatus::Success)
}

async fn run_functional(args: RunArgs, config: &Config) -> Result<ExitStatus> {
    let store = open_store(&args.defs.defs)?;
    let runner = build_runner(store, &args.execution, config)?;
    let ctx = RunContext::new();

    let results = runner.run_functional(&args.selection.selection(), &ctx).await?;

    let options = ReportOptions {
        body_sample_bytes: config.run.body_sample_bytes,
        ..Default::default()
    };
    let report = build_report_with(&results, &options);
    println!("{}", table::format_run_summary(&report));
    emit_report(&report, &args.execution, config)?;

    if signals::was_interrupted() {
        return Ok(ExitStatus::Interrupted);
    }
    Ok(ExitStatus::from_run(report.passed()))
}

async fn run_load(args: LoadArgs, config: &Config) -> Result<ExitStatus> {
    let store = open_store(&args.defs.defs)?;
    let scenario = store
        .scenario(&args.scenario)
        .ok_or_else(|| PulserunError::Definition(format!("Scenario '{}' not found", args.scenario)))?;

    let max_requests_per_case = config.run.max_report_requests.unwrap_or(DEFAULT_MAX_RESULTS_PER_CASE);
    let runner = Arc::new(build_runner(store, &args.execution, config)?);
    let load = LoadRunner::new(runner, Arc::new(RunContext::new()))
        .with_tags(args.tags.clone())
        .with_max_results_per_case(Some(max_requests_per_case));

    let handle = load.start(&scenario)?;
    signals::register_run(handle.token());
    let result = handle.wait().await;
    signals::clear_run();

    if let Some(error) = &result.error {
        warn!(scenario = %scenario.name, "{}", error);
    }
    println!("{}", table::format_load_summary(&result));

    let options = ReportOptions {
        name: format!("{} (load)", scenario.name),
        body_sample_bytes: config.run.body_sample_bytes,
        max_requests_per_case: Some(max_requests_per_case),
    };
    let mut report = build_report_with(&result.results, &options);
    for omitted in &result.omitted {
        if !report.add_omitted(&omitted.origin_tcid, omitted.phase, &omitted.tcid, omitted.count) {
            debug!(tcid = %omitted.tcid, count = omitted.count, "Omitted results have no case in the report");
        }
    }
    emit_report(&report, &args.execution, config)?;

    Ok(match result.status {
        RunStatus::Cancelled => ExitStatus::Interrupted,
        RunStatus::Failed => ExitStatus::Error,
        RunStatus::Completed => ExitStatus::from_run(report.passed()),
    })
}

fn handle_error(error: PulserunError) -> ExitStatus {
    eprintln!("Error: {}", error);

    // All errors return the same exit code (1) following Unix conventions
    ExitStatus::Error
}
