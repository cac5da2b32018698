use std::sync::Arc;
use std::time::Instant;

use chrono::{DateTime, TimeDelta, Utc};
use parityguard_core::{DriftSeverity, RunKind, Trend, TrendAnalysis, TrendSeverity, ValidationResult, ValidationRun};
use parityguard_dashboard::Widget;
use parityguard_validate::ParityValidator;
use serde_json::Value;
use tokio::sync::RwLock;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;

use crate::alerter::Alerter;
use crate::config::MonitorConfig;
use crate::drift::DriftDetector;
use crate::errors::{MonitorError, Result, blocking};
use crate::history::HistoryStore;
use crate::ids::new_run_id;
use crate::remediation::{AutoRemediator, RemediationReport};
use crate::reporter::Reporter;
use crate::scheduler::{JobFn, Scheduler, SchedulerHandle, job_fn};
use crate::trend::analyze_trends;

/// Schedule names, in registration order.
pub const QUICK_JOB: &str = "quick";
pub const COMPREHENSIVE_JOB: &str = "comprehensive";
pub const TREND_JOB: &str = "trend";
pub const DRIFT_JOB: &str = "drift";

enum State {
    Stopped,
    Running {
        scheduler: SchedulerHandle,
        initial_run: JoinHandle<()>,
    },
}

/// Shared by the scheduled jobs.
struct Inner {
    validator: Arc<ParityValidator>,
    widgets: Vec<Widget>,
    history: Arc<dyn HistoryStore>,
    drift: DriftDetector,
    alerter: Arc<Alerter>,
    reporter: Reporter,
    remediator: AutoRemediator,
    config: MonitorConfig,
    last_run: RwLock<Option<DateTime<Utc>>>,
}

/// Runs parity validations on schedules and reacts to their outcome.
///
/// `start` moves the validator from stopped to running; a second `start`
/// fails with [`MonitorError::AlreadyRunning`]. `stop` cancels every job,
/// waits for them, and allows a later restart.
pub struct ContinuousValidator {
    inner: Arc<Inner>,
    state: RwLock<State>,
}

impl ContinuousValidator {
    pub fn new(
        validator: Arc<ParityValidator>,
        widgets: Vec<Widget>,
        history: Arc<dyn HistoryStore>,
        alerter: Arc<Alerter>,
        config: MonitorConfig,
    ) -> Self {
        let remediator = AutoRemediator::new(config.auto_remediation.clone());
        Self::with_remediator(validator, widgets, history, alerter, remediator, config)
    }

    pub fn with_remediator(
        validator: Arc<ParityValidator>,
        widgets: Vec<Widget>,
        history: Arc<dyn HistoryStore>,
        alerter: Arc<Alerter>,
        remediator: AutoRemediator,
        config: MonitorConfig,
    ) -> Self {
        let drift = DriftDetector::new(
            Arc::clone(&history),
            config.drift_detection.clone(),
            config.thresholds.drift_threshold,
        );
        let reporter = Reporter::new(config.reporting.clone());
        Self {
            inner: Arc::new(Inner {
                validator,
                widgets,
                history,
                drift,
                alerter,
                reporter,
                remediator,
                config,
                last_run: RwLock::new(None),
            }),
            state: RwLock::new(State::Stopped),
        }
    }

    pub async fn is_running(&self) -> bool {
        matches!(*self.state.read().await, State::Running { .. })
    }

    pub async fn last_run(&self) -> Option<DateTime<Utc>> {
        *self.inner.last_run.read().await
    }

    /// Register the schedules, start them, and kick off a quick run.
    pub async fn start(&self) -> Result<()> {
        let mut state = self.state.write().await;
        if matches!(*state, State::Running { .. }) {
            return Err(MonitorError::AlreadyRunning);
        }

        let scheduler = self.build_scheduler()?;
        let jobs = scheduler.job_names().join(",");
        let cancel = CancellationToken::new();
        let handle = scheduler.start(cancel.clone());

        let inner = Arc::clone(&self.inner);
        let initial_run = tokio::spawn(async move {
            if let Err(err) = inner.run_quick(&cancel).await {
                if !matches!(err, MonitorError::Core(parityguard_core::Error::Cancelled)) {
                    tracing::error!(event = "initial_run_failed", error = %err);
                    inner.alerter.error("initial quick validation", &err).await;
                }
            }
        });

        *state = State::Running {
            scheduler: handle,
            initial_run,
        };
        tracing::info!(event = "continuous_validation_started", jobs = %jobs);
        Ok(())
    }

    /// Cancel all jobs and wait for them. Stopping a stopped validator is a no-op.
    pub async fn stop(&self) {
        let mut state = self.state.write().await;
        let State::Running {
            scheduler,
            initial_run,
        } = std::mem::replace(&mut *state, State::Stopped)
        else {
            return;
        };

        scheduler.shutdown().await;
        if let Err(err) = initial_run.await {
            tracing::warn!(event = "initial_run_join_failed", error = %err);
        }
        tracing::info!(event = "continuous_validation_stopped");
    }

    /// Run one validation now, outside any schedule.
    pub async fn run_once(&self, kind: RunKind, cancel: &CancellationToken) -> Result<ValidationRun> {
        match kind {
            RunKind::Quick => self.inner.run_quick(cancel).await,
            RunKind::Comprehensive => self.inner.run_comprehensive(cancel).await,
        }
    }

    pub async fn run_trend_analysis(&self) -> Result<Vec<TrendAnalysis>> {
        self.inner.run_trend_analysis().await
    }

    pub async fn run_drift_detection(&self, cancel: &CancellationToken) -> Result<parityguard_core::DriftAnalysis> {
        self.inner.run_drift_detection(cancel).await
    }

    fn build_scheduler(&self) -> Result<Scheduler> {
        let config = &self.inner.config;
        let mut scheduler = Scheduler::new(config.validation.job_timeout(), Arc::clone(&self.inner.alerter));

        let schedules = &config.schedules;
        let mut entries: Vec<(&str, &str, JobFn)> = vec![
            (QUICK_JOB, schedules.quick_validation.as_str(), self.job(|inner, cancel| async move {
                inner.run_quick(&cancel).await.map(|_| ())
            })),
            (
                COMPREHENSIVE_JOB,
                schedules.comprehensive_validation.as_str(),
                self.job(|inner, cancel| async move { inner.run_comprehensive(&cancel).await.map(|_| ()) }),
            ),
            (
                TREND_JOB,
                schedules.trend_analysis.as_str(),
                self.job(|inner, _cancel| async move { inner.run_trend_analysis().await.map(|_| ()) }),
            ),
        ];
        if config.drift_detection.enabled {
            entries.push((
                DRIFT_JOB,
                schedules.drift_detection.as_str(),
                self.job(|inner, cancel| async move { inner.run_drift_detection(&cancel).await.map(|_| ()) }),
            ));
        }

        for (name, expression, job) in entries {
            if expression.trim().is_empty() {
                tracing::info!(event = "job_disabled", job = name);
                continue;
            }
            scheduler.add(name, expression, job)?;
        }
        Ok(scheduler)
    }

    fn job<F, Fut>(&self, body: F) -> JobFn
    where
        F: Fn(Arc<Inner>, CancellationToken) -> Fut + Send + Sync + 'static,
        Fut: std::future::Future<Output = Result<()>> + Send + 'static,
    {
        let inner = Arc::clone(&self.inner);
        job_fn(move |cancel| body(Arc::clone(&inner), cancel))
    }
}

impl Inner {
    async fn run_quick(&self, cancel: &CancellationToken) -> Result<ValidationRun> {
        let critical = &self.config.validation.critical_widgets;
        let widgets: Vec<Widget> = self
            .widgets
            .iter()
            .filter(|widget| critical.iter().any(|title| title == &widget.title))
            .cloned()
            .collect();
        self.execute_run(RunKind::Quick, &widgets, cancel).await
    }

    async fn run_comprehensive(&self, cancel: &CancellationToken) -> Result<ValidationRun> {
        self.execute_run(RunKind::Comprehensive, &self.widgets, cancel).await
    }

    async fn execute_run(&self, kind: RunKind, widgets: &[Widget], cancel: &CancellationToken) -> Result<ValidationRun> {
        let timestamp = Utc::now();
        let started = Instant::now();
        let id = new_run_id(timestamp);
        tracing::info!(event = "validation_run_started", run_id = %id, kind = %kind, widgets = widgets.len());

        let results = self.validator.validate_all(cancel, widgets).await;
        if cancel.is_cancelled() {
            tracing::info!(event = "validation_run_cancelled", run_id = %id, kind = %kind);
            return Err(parityguard_core::Error::Cancelled.into());
        }
        let duration_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);
        let mut run = ValidationRun::from_results(id, kind, timestamp, duration_ms, results);

        self.check_thresholds(&run).await;

        if kind == RunKind::Comprehensive && self.config.drift_detection.enabled {
            match self.drift.analyze_drift_at(&run.results, timestamp) {
                Ok(analysis) => {
                    if analysis.severity >= DriftSeverity::High {
                        self.alerter.drift(&analysis).await;
                    }
                    run.drift_analysis = Some(analysis);
                }
                Err(err) => {
                    tracing::warn!(event = "drift_analysis_failed", run_id = %run.id, error = %err);
                    self.alerter.error("drift analysis", &err).await;
                }
            }
        }

        self.record(&run).await?;

        if kind == RunKind::Comprehensive {
            let reporter = self.reporter.clone();
            let snapshot = run.clone();
            if let Err(err) = blocking(move || reporter.save_validation_report(&snapshot)).await {
                tracing::warn!(event = "report_failed", run_id = %run.id, error = %err);
                self.alerter.error("validation report", &err).await;
            }
            if self.remediator.is_enabled() && !run.issues.is_empty() {
                let reports = self.remediator.remediate_issues(cancel, &run.issues).await;
                self.alert_failed_remediations(&reports).await;
            }
        }

        tracing::info!(
            event = "validation_run_finished",
            run_id = %run.id,
            kind = %kind,
            total = run.total_widgets,
            passed = run.passed_widgets,
            failed = run.failed_widgets,
            average_accuracy = run.average_accuracy,
            duration_ms = run.duration_ms
        );
        Ok(run)
    }

    async fn alert_failed_remediations(&self, reports: &[RemediationReport]) {
        for report in reports.iter().filter(|report| !report.succeeded) {
            let err = MonitorError::Remediation(report.error.clone().unwrap_or_default());
            self.alerter
                .error(&format!("remediation strategy {}", report.strategy), &err)
                .await;
        }
    }

    async fn check_thresholds(&self, run: &ValidationRun) {
        let thresholds = &self.config.thresholds;
        let summary = run_summary(run);
        if run.average_accuracy < thresholds.critical_accuracy {
            self.alerter
                .critical(
                    format!(
                        "Critical accuracy threshold breached: {:.2}%",
                        run.average_accuracy * 100.0
                    ),
                    summary,
                )
                .await;
        } else if run.average_accuracy < thresholds.warning_accuracy {
            self.alerter
                .warning(
                    format!(
                        "Warning accuracy threshold breached: {:.2}%",
                        run.average_accuracy * 100.0
                    ),
                    summary,
                )
                .await;
        }

        for result in &run.results {
            if let Some(threshold) = thresholds.metric_thresholds.get(&result.metric_name) {
                if result.accuracy < *threshold {
                    self.alerter.metric(&result.metric_name, result.accuracy, *threshold).await;
                }
            }
        }
    }

    async fn record(&self, run: &ValidationRun) -> Result<()> {
        self.history.append(run)?;
        *self.last_run.write().await = Some(run.timestamp);

        // Never prune inside the drift baseline window.
        let retention = TimeDelta::try_days(i64::from(self.config.reporting.retention_days))
            .unwrap_or(TimeDelta::MAX)
            .max(self.config.drift_detection.baseline_window());
        if let Some(cutoff) = run.timestamp.checked_sub_signed(retention) {
            if let Err(err) = self.history.prune(cutoff) {
                tracing::warn!(event = "history_prune_failed", error = %err);
            }
        }
        Ok(())
    }

    async fn run_trend_analysis(&self) -> Result<Vec<TrendAnalysis>> {
        let history = self
            .history
            .query(Utc::now() - self.config.drift_detection.baseline_window())?;
        if history.len() < self.config.drift_detection.min_data_points {
            tracing::info!(event = "trend_analysis_skipped", runs = history.len());
            return Ok(Vec::new());
        }

        let trends = analyze_trends(&history, self.config.thresholds.drift_threshold);
        for trend in &trends {
            if trend.direction == Trend::Degrading && trend.severity >= TrendSeverity::High {
                self.alerter.trend(trend).await;
            }
        }
        let reporter = self.reporter.clone();
        let snapshot = trends.clone();
        blocking(move || reporter.save_trend_report(&snapshot)).await?;
        Ok(trends)
    }

    async fn run_drift_detection(&self, cancel: &CancellationToken) -> Result<parityguard_core::DriftAnalysis> {
        let now = Utc::now();
        let recent = self
            .history
            .query(now - self.config.drift_detection.detection_window())?;
        let results: Vec<ValidationResult> = recent.into_iter().flat_map(|run| run.results).collect();

        let analysis = self.drift.analyze_drift_at(&results, now)?;
        let data = serde_json::to_value(&analysis).unwrap_or(Value::Null);
        match analysis.severity {
            DriftSeverity::Critical => {
                self.alerter.critical("Critical drift detected", data).await;
                if self.remediator.is_enabled() {
                    let reports = self.remediator.remediate_drift(cancel, &analysis).await;
                    self.alert_failed_remediations(&reports).await;
                }
            }
            DriftSeverity::High => {
                self.alerter.drift(&analysis).await;
            }
            DriftSeverity::Medium => {
                self.alerter.warning("Medium drift detected", data).await;
            }
            DriftSeverity::Low | DriftSeverity::None => {}
        }
        Ok(analysis)
    }
}

fn run_summary(run: &ValidationRun) -> Value {
    serde_json::json!({
        "run_id": run.id,
        "type": run.kind,
        "total_widgets": run.total_widgets,
        "passed_widgets": run.passed_widgets,
        "failed_widgets": run.failed_widgets,
        "average_accuracy": run.average_accuracy,
    })
}
