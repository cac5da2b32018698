mod logging;
mod session;

use std::path::PathBuf;
use std::sync::Arc;

use chrono::{TimeDelta, Utc};
use clap::{Args, Parser, Subcommand, ValueEnum};
use parityguard_core::{Error as CoreError, RunKind, ValidationRun};
use parityguard_dashboard::{DashboardError, DashboardParser};
use parityguard_mapping::MappingError;
use parityguard_monitor::history::HistoryStore;
use parityguard_monitor::reporter::render_validation_report;
use parityguard_monitor::trend::analyze_trends;
use parityguard_monitor::{DriftDetector, MonitorError, Reporter};
use parityguard_validate::ParityValidator;
use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use logging::init_logging;
use session::{Session, load_config, open_history};

#[derive(Debug, Error)]
pub enum CliError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("core error: {0}")]
    Core(#[from] CoreError),
    #[error("mapping error: {0}")]
    Mapping(#[from] MappingError),
    #[error("dashboard error: {0}")]
    Dashboard(#[from] DashboardError),
    #[error("monitor error: {0}")]
    Monitor(#[from] MonitorError),
    #[error("logging error: {0}")]
    Logging(String),
}

#[derive(Parser, Debug)]
#[command(name = "parityguard", version, about = "Telemetry pipeline parity validation")]
struct Cli {
    /// Append JSON log events to this file.
    #[arg(long, global = true)]
    log_file: Option<PathBuf>,
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Parse a dashboard and print its summary.
    ParseDashboard(ParseDashboardArgs),
    /// Load and check a configuration file and a mapping document.
    CheckConfig(CheckConfigArgs),
    /// Run one validation and print its report.
    Validate(ValidateArgs),
    /// Compare every mapped metric once.
    ValidateMetrics(SourceArgs),
    /// Run the scheduled validations until interrupted.
    Watch(SourceArgs),
    /// Analyze drift of the latest recorded run against history.
    Drift(HistoryArgs),
    /// Analyze accuracy trends across recorded runs.
    Trends(HistoryArgs),
}

#[derive(Args, Debug)]
struct ParseDashboardArgs {
    /// Dashboard definition (JSON).
    dashboard: PathBuf,
    /// Also write the parsed widgets as JSON here.
    #[arg(long)]
    out: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct CheckConfigArgs {
    /// Monitor configuration (TOML).
    #[arg(long)]
    config: Option<PathBuf>,
    /// Mapping document (JSON or TOML).
    #[arg(long)]
    mappings: Option<PathBuf>,
}

/// Inputs shared by every command that queries both pipelines.
#[derive(Args, Debug, Clone)]
pub struct SourceArgs {
    /// Monitor configuration (TOML). Defaults apply without one.
    #[arg(long)]
    pub config: Option<PathBuf>,
    /// Mapping document (JSON or TOML).
    #[arg(long)]
    pub mappings: PathBuf,
    /// Dashboard definition (JSON).
    #[arg(long)]
    pub dashboard: PathBuf,
    /// Recorded legacy pipeline responses.
    #[arg(long)]
    pub legacy_fixture: PathBuf,
    /// Recorded new pipeline responses.
    #[arg(long)]
    pub new_fixture: PathBuf,
    /// Run history directory; overrides `validation.history_dir`.
    #[arg(long)]
    pub history_dir: Option<PathBuf>,
}

#[derive(Args, Debug)]
struct ValidateArgs {
    #[command(flatten)]
    sources: SourceArgs,
    #[arg(long, value_enum, default_value_t = KindArg::Comprehensive)]
    kind: KindArg,
    /// Print the run record as JSON instead of the markdown report.
    #[arg(long, default_value_t = false)]
    json: bool,
}

#[derive(Args, Debug)]
struct HistoryArgs {
    #[arg(long)]
    config: Option<PathBuf>,
    #[arg(long)]
    history_dir: Option<PathBuf>,
    /// Save a report through the configured reporter as well.
    #[arg(long, default_value_t = false)]
    report: bool,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum KindArg {
    Quick,
    Comprehensive,
}

impl From<KindArg> for RunKind {
    fn from(kind: KindArg) -> Self {
        match kind {
            KindArg::Quick => RunKind::Quick,
            KindArg::Comprehensive => RunKind::Comprehensive,
        }
    }
}

#[tokio::main]
async fn main() -> Result<(), CliError> {
    let cli = Cli::parse();
    init_logging(cli.log_file.as_deref())?;

    match cli.command {
        Command::ParseDashboard(args) => run_parse_dashboard(args),
        Command::CheckConfig(args) => run_check_config(args),
        Command::Validate(args) => run_validate(args).await,
        Command::ValidateMetrics(args) => run_validate_metrics(args).await,
        Command::Watch(args) => run_watch(args).await,
        Command::Drift(args) => run_drift(args),
        Command::Trends(args) => run_trends(args),
    }
}

fn run_parse_dashboard(args: ParseDashboardArgs) -> Result<(), CliError> {
    let mut parser = DashboardParser::new();
    let widgets = parser.parse_file(&args.dashboard)?;
    if let Some(out) = &args.out {
        std::fs::write(out, serde_json::to_vec_pretty(&widgets)?)?;
        tracing::info!(event = "widgets_written", path = %out.display(), widgets = widgets.len());
    }
    print_json(&parser.summary())
}

fn run_check_config(args: CheckConfigArgs) -> Result<(), CliError> {
    let config = load_config(args.config.as_deref())?;
    for name in &config.validation.critical_widgets {
        tracing::debug!(event = "critical_widget", widget = %name);
    }

    let mut summary = serde_json::json!({
        "config": args.config.as_ref().map(|path| path.display().to_string()),
        "critical_widgets": config.validation.critical_widgets.len(),
        "remediation_strategies": config.auto_remediation.strategies.len(),
    });
    if let Some(path) = &args.mappings {
        let registry = parityguard_mapping::MappingRegistry::load(path)?;
        summary["metrics"] = serde_json::Value::from(registry.metrics().count());
        summary["events"] = serde_json::Value::from(registry.events().count());
    }
    tracing::info!(event = "config_checked");
    print_json(&summary)
}

async fn run_validate(args: ValidateArgs) -> Result<(), CliError> {
    let session = Session::open(&args.sources)?;
    let monitor = session.continuous();
    let cancel = interrupt_token();

    let run = monitor.run_once(args.kind.into(), &cancel).await?;
    if args.json {
        print_json(&run)
    } else {
        println!("{}", render_validation_report(&run));
        Ok(())
    }
}

async fn run_validate_metrics(args: SourceArgs) -> Result<(), CliError> {
    let session = Session::open(&args)?;
    let run = metrics_run(&session.validator, &interrupt_token()).await?;
    session.history.append(&run)?;
    print_json(&run)
}

/// Compare every mapped metric. An interrupted run is discarded.
async fn metrics_run(validator: &ParityValidator, cancel: &CancellationToken) -> Result<ValidationRun, CliError> {
    let started = std::time::Instant::now();
    let timestamp = Utc::now();
    let results = validator.validate_all_metrics(cancel).await;
    if cancel.is_cancelled() {
        return Err(CoreError::Cancelled.into());
    }
    let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
    Ok(ValidationRun::from_results(
        parityguard_monitor::ids::new_run_id(timestamp),
        RunKind::Comprehensive,
        timestamp,
        duration_ms,
        results,
    ))
}

async fn run_watch(args: SourceArgs) -> Result<(), CliError> {
    let session = Session::open(&args)?;
    tracing::info!(
        event = "watch_started",
        widgets = session.widgets.len(),
        metrics = session.registry.metrics().count()
    );
    let monitor = session.continuous();
    monitor.start().await?;

    let interrupted = tokio::signal::ctrl_c().await;
    monitor.stop().await;
    interrupted?;
    let last_run = monitor.last_run().await;
    tracing::info!(event = "watch_finished", last_run = ?last_run);
    Ok(())
}

fn run_drift(args: HistoryArgs) -> Result<(), CliError> {
    let config = load_config(args.config.as_deref())?;
    let history = Arc::new(open_history(&config, args.history_dir.as_deref())?);
    let runs = history.query(Utc::now() - config.drift_detection.baseline_window())?;
    let Some(latest) = runs.last() else {
        tracing::warn!(event = "drift_skipped", reason = "no recorded runs");
        return print_json(&serde_json::Value::Null);
    };

    let detector = DriftDetector::new(
        history.clone(),
        config.drift_detection.clone(),
        config.thresholds.drift_threshold,
    );
    // The baseline window ends just before the run under analysis.
    let analysis = detector.analyze_drift_at(&latest.results, latest.timestamp - TimeDelta::milliseconds(1))?;
    if args.report {
        Reporter::new(config.reporting.clone()).save_drift_report(&analysis)?;
    }
    print_json(&analysis)
}

fn run_trends(args: HistoryArgs) -> Result<(), CliError> {
    let config = load_config(args.config.as_deref())?;
    let history = open_history(&config, args.history_dir.as_deref())?;
    let runs = history.query(Utc::now() - config.drift_detection.baseline_window())?;
    let trends = analyze_trends(&runs, config.thresholds.drift_threshold);
    if args.report {
        Reporter::new(config.reporting.clone()).save_trend_report(&trends)?;
    }
    print_json(&trends)
}

/// Cancelled on Ctrl-C so an interrupted run stops between widgets.
fn interrupt_token() -> CancellationToken {
    let cancel = CancellationToken::new();
    let on_signal = cancel.clone();
    tokio::spawn(async move {
        if tokio::signal::ctrl_c().await.is_ok() {
            tracing::warn!(event = "interrupted");
            on_signal.cancel();
        }
    });
    cancel
}

fn print_json<T: Serialize>(value: &T) -> Result<(), CliError> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}
