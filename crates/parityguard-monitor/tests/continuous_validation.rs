use std::sync::Arc;
use std::sync::atomic::{AtomicU32, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use chrono::{TimeDelta, Utc};
use parityguard_core::{DriftSeverity, Row, RunKind, ValidationResult, ValidationRun, ValidationStatus};
use parityguard_dashboard::{NrqlParser, QueryParser, Widget};
use parityguard_mapping::{DocumentFormat, MappingRegistry, TransformRegistry, parse_document};
use parityguard_monitor::config::{ActionKind, RemediationAction, RemediationStrategy};
use parityguard_monitor::{
    ActionExecutor, ActionOutcome, AlertChannel, Alerter, AutoRemediator, ContinuousValidator, HistoryStore,
    MemoryHistoryStore, MonitorConfig, MonitorError, ReportFormat,
};
use parityguard_validate::{DataSource, ParityConfig, ParityValidator, ReplaySource};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

const SLOW_QUERIES: &str = "SELECT latest(avg_elapsed_time_ms) FROM PostgresSlowQueries FACET query_id";
const SLOW_QUERY_IDS: &str = "SELECT uniques(query_id) FROM PostgresSlowQueries";
const NEVER: &str = "0 0 0 1 1 *";

fn registry() -> Arc<MappingRegistry> {
    let transforms = TransformRegistry::with_builtins();
    let document = parse_document(
        r#"{
            "events": {
                "PostgresSlowQueries": {
                    "new_source": "Metric",
                    "new_filter": "db.system = 'postgresql'"
                }
            },
            "attribute_mappings": {
                "query_id": "db.query.id",
                "avg_elapsed_time_ms": "db.query.duration_ms"
            }
        }"#,
        DocumentFormat::Json,
        &transforms,
    )
    .expect("mapping document");
    Arc::new(MappingRegistry::from_document(document, transforms).expect("registry"))
}

fn widget(title: &str, query: &str) -> Widget {
    let mut parsed = NrqlParser.parse_nrql(query);
    parsed.widget_title = title.to_string();
    Widget {
        page: "Query Performance".to_string(),
        title: title.to_string(),
        visualization: "viz.table".to_string(),
        query: parsed,
    }
}

fn rows(values: Vec<Value>) -> Vec<Row> {
    values
        .into_iter()
        .map(|value| serde_json::from_value(value).expect("row"))
        .collect()
}

fn build_validator(legacy: ReplaySource, new: ReplaySource) -> Arc<ParityValidator> {
    let legacy: Arc<dyn DataSource> = Arc::new(legacy);
    let new: Arc<dyn DataSource> = Arc::new(new);
    Arc::new(ParityValidator::new(legacy, new, registry(), ParityConfig::default()).expect("validator"))
}

fn translated(query: &str) -> String {
    build_validator(ReplaySource::new("legacy"), ReplaySource::new("new"))
        .translate(query)
        .expect("translate")
        .query
}

/// One widget that matches across pipelines and one whose new side is empty.
fn mixed_validator() -> Arc<ParityValidator> {
    let (legacy, new) = mixed_sources();
    build_validator(legacy, new)
}

fn mixed_sources() -> (ReplaySource, ReplaySource) {
    let legacy = ReplaySource::new("legacy")
        .with_query(
            SLOW_QUERIES,
            rows(vec![
                json!({"query_id": "q1", "avg_elapsed_time_ms": 100.0}),
                json!({"query_id": "q2", "avg_elapsed_time_ms": 40.0}),
            ]),
        )
        .with_query(SLOW_QUERY_IDS, rows(vec![json!({"query_id": "q1"})]));
    let new = ReplaySource::new("new")
        .with_query(
            &translated(SLOW_QUERIES),
            rows(vec![
                json!({"db.query.id": "q1", "db.query.duration_ms": 100.0}),
                json!({"db.query.id": "q2", "db.query.duration_ms": 40.0}),
            ]),
        )
        .with_query(&translated(SLOW_QUERY_IDS), vec![]);
    (legacy, new)
}

fn widgets() -> Vec<Widget> {
    vec![
        widget("Slowest queries", SLOW_QUERIES),
        widget("Slow query ids", SLOW_QUERY_IDS),
    ]
}

fn config(dir: &std::path::Path) -> MonitorConfig {
    let mut config = MonitorConfig::default();
    config.schedules.quick_validation = NEVER.to_string();
    config.schedules.comprehensive_validation = NEVER.to_string();
    config.schedules.trend_analysis = NEVER.to_string();
    config.schedules.drift_detection = NEVER.to_string();
    config.alerting.channels = vec![AlertChannel::File];
    config.alerting.alert_file = Some(dir.join("alerts.ndjson"));
    config.alerting.throttle_secs = 0;
    config.reporting.output_dir = dir.join("reports");
    config.reporting.formats = vec![ReportFormat::Json, ReportFormat::Markdown];
    config.validation.critical_widgets = vec!["Slowest queries".to_string()];
    config
}

fn monitor(dir: &std::path::Path, history: Arc<MemoryHistoryStore>) -> ContinuousValidator {
    let config = config(dir);
    let alerter = Arc::new(Alerter::new(config.alerting.clone()));
    ContinuousValidator::new(mixed_validator(), widgets(), history, alerter, config)
}

fn alert_messages(dir: &std::path::Path) -> Vec<String> {
    std::fs::read_to_string(dir.join("alerts.ndjson"))
        .unwrap_or_default()
        .lines()
        .map(|line| {
            let alert: Value = serde_json::from_str(line).expect("alert line");
            alert["message"].as_str().unwrap_or_default().to_string()
        })
        .collect()
}

#[tokio::test]
async fn comprehensive_run_records_reports_and_alerts() {
    let dir = tempfile::tempdir().expect("tempdir");
    let history = Arc::new(MemoryHistoryStore::new());
    let monitor = monitor(dir.path(), Arc::clone(&history));

    let run = monitor
        .run_once(RunKind::Comprehensive, &CancellationToken::new())
        .await
        .expect("run");

    assert!(run.id.starts_with("run_"));
    assert_eq!(run.kind, RunKind::Comprehensive);
    assert_eq!(run.total_widgets, 2);
    assert_eq!(run.passed_widgets, 1);
    assert_eq!(run.failed_widgets, 1);
    assert_eq!(run.results[0].status, ValidationStatus::Passed);
    assert_eq!(run.results[1].status, ValidationStatus::Failed);
    assert_eq!(run.issues.len(), 1);
    assert_eq!(
        run.drift_analysis.as_ref().map(|drift| drift.severity),
        Some(DriftSeverity::None)
    );

    assert_eq!(history.len(), 1);
    assert_eq!(monitor.last_run().await, Some(run.timestamp));

    let reports: Vec<_> = std::fs::read_dir(dir.path().join("reports"))
        .expect("reports dir")
        .filter_map(|entry| entry.ok())
        .collect();
    assert_eq!(reports.len(), 2);

    let alerts = alert_messages(dir.path());
    assert!(
        alerts.iter().any(|message| message.starts_with("Critical accuracy threshold breached")),
        "alerts: {alerts:?}"
    );
}

#[tokio::test]
async fn quick_run_covers_only_critical_widgets() {
    let dir = tempfile::tempdir().expect("tempdir");
    let history = Arc::new(MemoryHistoryStore::new());
    let monitor = monitor(dir.path(), Arc::clone(&history));

    let run = monitor
        .run_once(RunKind::Quick, &CancellationToken::new())
        .await
        .expect("run");

    assert_eq!(run.total_widgets, 1);
    assert_eq!(run.results[0].metric_name, "Slowest queries");
    assert_eq!(run.results[0].status, ValidationStatus::Passed);
    assert!(run.drift_analysis.is_none());
    assert!(!dir.path().join("reports").exists());
    assert!(alert_messages(dir.path()).is_empty());
}

#[tokio::test]
async fn metric_threshold_raises_metric_alert() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = config(dir.path());
    config
        .thresholds
        .metric_thresholds
        .insert("Slow query ids".to_string(), 0.99);
    let alerter = Arc::new(Alerter::new(config.alerting.clone()));
    let monitor = ContinuousValidator::new(
        mixed_validator(),
        widgets(),
        Arc::new(MemoryHistoryStore::new()),
        alerter,
        config,
    );

    monitor
        .run_once(RunKind::Comprehensive, &CancellationToken::new())
        .await
        .expect("run");

    let alerts = alert_messages(dir.path());
    assert!(alerts.iter().any(|message| message.starts_with("Metric Slow query ids accuracy")));
}

struct CountingExecutor {
    calls: AtomicU32,
}

#[async_trait]
impl ActionExecutor for CountingExecutor {
    async fn execute(
        &self,
        _action: &RemediationAction,
        _cancel: &CancellationToken,
    ) -> parityguard_monitor::Result<ActionOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Ok(ActionOutcome::Completed)
    }
}

#[tokio::test]
async fn failing_run_triggers_matching_remediation() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = config(dir.path());
    config.auto_remediation.enabled = true;
    config.auto_remediation.strategies = vec![RemediationStrategy {
        name: "restart collector".to_string(),
        trigger: "missing-data".to_string(),
        actions: vec![RemediationAction {
            kind: ActionKind::RestartCollector,
            params: Default::default(),
            command: None,
            timeout_secs: 5,
        }],
        max_attempts: 1,
    }];

    let executor = Arc::new(CountingExecutor {
        calls: AtomicU32::new(0),
    });
    let remediator = AutoRemediator::with_executor(config.auto_remediation.clone(), executor.clone());
    let alerter = Arc::new(Alerter::new(config.alerting.clone()));
    let monitor = ContinuousValidator::with_remediator(
        mixed_validator(),
        widgets(),
        Arc::new(MemoryHistoryStore::new()),
        alerter,
        remediator,
        config,
    );

    monitor
        .run_once(RunKind::Comprehensive, &CancellationToken::new())
        .await
        .expect("run");
    assert_eq!(executor.calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn trend_analysis_needs_enough_history() {
    let dir = tempfile::tempdir().expect("tempdir");
    let history = Arc::new(MemoryHistoryStore::new());
    let monitor = monitor(dir.path(), Arc::clone(&history));

    assert!(monitor.run_trend_analysis().await.expect("trends").is_empty());

    let cancel = CancellationToken::new();
    for _ in 0..3 {
        monitor.run_once(RunKind::Comprehensive, &cancel).await.expect("run");
    }
    let trends = monitor.run_trend_analysis().await.expect("trends");
    let names: Vec<&str> = trends.iter().map(|trend| trend.metric_name.as_str()).collect();
    assert_eq!(names, vec!["Slow query ids", "Slowest queries"]);
}

#[tokio::test]
async fn drift_detection_on_empty_history_is_clean() {
    let dir = tempfile::tempdir().expect("tempdir");
    let monitor = monitor(dir.path(), Arc::new(MemoryHistoryStore::new()));
    let analysis = monitor
        .run_drift_detection(&CancellationToken::new())
        .await
        .expect("drift");
    assert_eq!(analysis.severity, DriftSeverity::None);
    assert!(analysis.affected_metrics.is_empty());
}

#[tokio::test]
async fn start_stop_and_restart() {
    let dir = tempfile::tempdir().expect("tempdir");
    let history = Arc::new(MemoryHistoryStore::new());
    let monitor = monitor(dir.path(), Arc::clone(&history));

    assert!(!monitor.is_running().await);
    monitor.start().await.expect("start");
    assert!(monitor.is_running().await);
    assert!(matches!(monitor.start().await, Err(MonitorError::AlreadyRunning)));

    for _ in 0..50 {
        if monitor.last_run().await.is_some() {
            break;
        }
        tokio::time::sleep(Duration::from_millis(20)).await;
    }
    assert!(monitor.last_run().await.is_some(), "initial quick run never finished");

    monitor.stop().await;
    assert!(!monitor.is_running().await);
    monitor.stop().await;

    monitor.start().await.expect("restart");
    assert!(monitor.is_running().await);
    monitor.stop().await;
    assert!(!monitor.is_running().await);
    assert!(!history.query(chrono::DateTime::<chrono::Utc>::MIN_UTC).expect("history").is_empty());
}

#[tokio::test]
async fn invalid_schedule_prevents_start() {
    let dir = tempfile::tempdir().expect("tempdir");
    let mut config = config(dir.path());
    config.schedules.trend_analysis = "every tuesday".to_string();
    let alerter = Arc::new(Alerter::new(config.alerting.clone()));
    let monitor = ContinuousValidator::new(
        mixed_validator(),
        widgets(),
        Arc::new(MemoryHistoryStore::new()),
        alerter,
        config,
    );

    assert!(matches!(monitor.start().await, Err(MonitorError::Schedule { .. })));
    assert!(!monitor.is_running().await);
}

#[tokio::test]
async fn cancelled_run_is_not_recorded() {
    let dir = tempfile::tempdir().expect("tempdir");
    let history = Arc::new(MemoryHistoryStore::new());
    let monitor = monitor(dir.path(), Arc::clone(&history));
    let cancel = CancellationToken::new();
    cancel.cancel();

    let outcome = monitor.run_once(RunKind::Comprehensive, &cancel).await;

    assert!(matches!(
        outcome,
        Err(MonitorError::Core(parityguard_core::Error::Cancelled))
    ));
    assert_eq!(history.len(), 0);
    assert_eq!(monitor.last_run().await, None);
    assert!(!dir.path().join("reports").exists());
    assert!(alert_messages(dir.path()).is_empty());
}

#[tokio::test(flavor = "multi_thread", worker_threads = 2)]
async fn stop_cancels_an_in_flight_run() {
    let dir = tempfile::tempdir().expect("tempdir");
    let (legacy, new) = mixed_sources();
    let validator = build_validator(
        legacy.with_delay(Duration::from_secs(5)),
        new.with_delay(Duration::from_secs(5)),
    );
    let config = config(dir.path());
    let alerter = Arc::new(Alerter::new(config.alerting.clone()));
    let history = Arc::new(MemoryHistoryStore::new());
    let monitor = Arc::new(ContinuousValidator::new(
        validator,
        widgets(),
        history.clone(),
        alerter,
        config,
    ));

    let starter = Arc::clone(&monitor);
    tokio::spawn(async move { starter.start().await })
        .await
        .expect("join")
        .expect("start");
    tokio::time::sleep(Duration::from_millis(100)).await;

    let started = std::time::Instant::now();
    monitor.stop().await;
    assert!(started.elapsed() < Duration::from_secs(2), "stop waited for the slow run");
    assert!(!monitor.is_running().await);
    assert_eq!(history.len(), 0);
    assert_eq!(monitor.last_run().await, None);
    assert!(alert_messages(dir.path()).is_empty());
}

struct FailingExecutor {
    calls: AtomicU32,
}

#[async_trait]
impl ActionExecutor for FailingExecutor {
    async fn execute(
        &self,
        _action: &RemediationAction,
        _cancel: &CancellationToken,
    ) -> parityguard_monitor::Result<ActionOutcome> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(MonitorError::Remediation("collector unreachable".to_string()))
    }
}

fn recorded(minutes_ago: i64, accuracy: f64, status: ValidationStatus) -> ValidationRun {
    let mut result = ValidationResult::skipped("Slow query ids", "fixture");
    result.accuracy = accuracy;
    result.status = status;
    result.metadata.clear();
    ValidationRun::from_results(
        format!("run_{minutes_ago}"),
        RunKind::Comprehensive,
        Utc::now() - TimeDelta::minutes(minutes_ago),
        1,
        vec![result],
    )
}

#[tokio::test]
async fn failed_drift_remediation_is_alerted() {
    let dir = tempfile::tempdir().expect("tempdir");
    let history = Arc::new(MemoryHistoryStore::new());
    for hours in 2..8 {
        history
            .append(&recorded(hours * 60, 1.0, ValidationStatus::Passed))
            .expect("append");
    }
    history
        .append(&recorded(10, 0.0, ValidationStatus::Failed))
        .expect("append");

    let mut config = config(dir.path());
    config.auto_remediation.enabled = true;
    config.auto_remediation.max_retries = 1;
    config.auto_remediation.retry_interval_secs = 0;
    config.auto_remediation.strategies = vec![RemediationStrategy {
        name: "restart on drift".to_string(),
        trigger: "drift".to_string(),
        actions: vec![RemediationAction {
            kind: ActionKind::RestartCollector,
            params: Default::default(),
            command: None,
            timeout_secs: 5,
        }],
        max_attempts: 3,
    }];
    let executor = Arc::new(FailingExecutor {
        calls: AtomicU32::new(0),
    });
    let remediator = AutoRemediator::with_executor(config.auto_remediation.clone(), executor.clone());
    let alerter = Arc::new(Alerter::new(config.alerting.clone()));
    let monitor = ContinuousValidator::with_remediator(
        mixed_validator(),
        widgets(),
        history,
        alerter,
        remediator,
        config,
    );

    let analysis = monitor
        .run_drift_detection(&CancellationToken::new())
        .await
        .expect("drift");

    assert_eq!(analysis.severity, DriftSeverity::Critical);
    assert_eq!(executor.calls.load(Ordering::SeqCst), 2);
    let alerts = alert_messages(dir.path());
    assert!(alerts.iter().any(|message| message == "Critical drift detected"), "alerts: {alerts:?}");
    assert!(
        alerts
            .iter()
            .any(|message| message.starts_with("Error in remediation strategy restart on drift")
                && message.contains("collector unreachable")),
        "alerts: {alerts:?}"
    );
}
