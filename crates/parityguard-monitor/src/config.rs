use std::collections::BTreeMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

use chrono::TimeDelta;
use parityguard_validate::ParityConfig;
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::errors::{MonitorError, Result};

/// Widgets validated by the quick schedule unless configured otherwise.
pub const DEFAULT_CRITICAL_WIDGETS: [&str; 4] = [
    "Database Query Distribution",
    "Average Execution Time",
    "Top Wait Events",
    "Execution Counts Timeline",
];

/// Top-level configuration file.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct MonitorConfig {
    pub parity: ParityConfig,
    pub schedules: ScheduleConfig,
    pub thresholds: ThresholdConfig,
    pub alerting: AlertingConfig,
    pub reporting: ReportingConfig,
    pub drift_detection: DriftDetectionConfig,
    pub auto_remediation: AutoRemediationConfig,
    pub validation: ValidationSettings,
}

/// Cron expressions (with a leading seconds field). Empty disables a job.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ScheduleConfig {
    pub quick_validation: String,
    pub comprehensive_validation: String,
    pub trend_analysis: String,
    pub drift_detection: String,
}

impl Default for ScheduleConfig {
    fn default() -> Self {
        Self {
            quick_validation: "0 0 * * * *".to_string(),
            comprehensive_validation: "0 0 2 * * *".to_string(),
            trend_analysis: "0 0 3 * * Sun".to_string(),
            drift_detection: "0 0/15 * * * *".to_string(),
        }
    }
}

impl ScheduleConfig {
    fn entries(&self) -> [(&'static str, &str); 4] {
        [
            ("quick_validation", &self.quick_validation),
            ("comprehensive_validation", &self.comprehensive_validation),
            ("trend_analysis", &self.trend_analysis),
            ("drift_detection", &self.drift_detection),
        ]
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThresholdConfig {
    pub critical_accuracy: f64,
    pub warning_accuracy: f64,
    /// Accuracy change across a trend window still considered stable.
    pub drift_threshold: f64,
    pub metric_thresholds: BTreeMap<String, f64>,
}

impl Default for ThresholdConfig {
    fn default() -> Self {
        Self {
            critical_accuracy: 0.90,
            warning_accuracy: 0.95,
            drift_threshold: 0.02,
            metric_thresholds: BTreeMap::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertChannel {
    Log,
    File,
    Webhook,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AlertingConfig {
    pub enabled: bool,
    pub channels: Vec<AlertChannel>,
    pub webhook_url: Option<String>,
    pub webhook_timeout_secs: u64,
    /// NDJSON file used by the `file` channel.
    pub alert_file: Option<PathBuf>,
    /// Identical alerts inside this window are suppressed.
    pub throttle_secs: u64,
    /// Alert levels let through; empty allows every level.
    pub severity_filters: Vec<String>,
}

impl Default for AlertingConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            channels: vec![AlertChannel::Log],
            webhook_url: None,
            webhook_timeout_secs: 10,
            alert_file: None,
            throttle_secs: 300,
            severity_filters: Vec::new(),
        }
    }
}

impl AlertingConfig {
    pub fn throttle(&self) -> TimeDelta {
        i64::try_from(self.throttle_secs)
            .ok()
            .and_then(TimeDelta::try_seconds)
            .unwrap_or(TimeDelta::MAX)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReportFormat {
    Json,
    Markdown,
}

impl ReportFormat {
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Markdown => "md",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ReportingConfig {
    pub output_dir: PathBuf,
    pub formats: Vec<ReportFormat>,
    pub retention_days: u32,
    /// Keep per-result metadata (translated queries, counts) in JSON reports.
    pub include_raw_data: bool,
}

impl Default for ReportingConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("parityguard-reports"),
            formats: vec![ReportFormat::Json, ReportFormat::Markdown],
            retention_days: 30,
            include_raw_data: false,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DriftDetectionConfig {
    pub enabled: bool,
    pub baseline_window_hours: u64,
    pub detection_window_hours: u64,
    pub min_data_points: usize,
    /// Drift percentage beyond which a metric is reported.
    pub anomaly_threshold: f64,
}

impl Default for DriftDetectionConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            baseline_window_hours: 24 * 7,
            detection_window_hours: 1,
            min_data_points: 3,
            anomaly_threshold: 2.0,
        }
    }
}

impl DriftDetectionConfig {
    pub fn baseline_window(&self) -> TimeDelta {
        hours(self.baseline_window_hours)
    }

    pub fn detection_window(&self) -> TimeDelta {
        hours(self.detection_window_hours)
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionKind {
    AdjustSampling,
    RestartCollector,
    ClearCache,
    RecalibrateBaseline,
}

impl ActionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AdjustSampling => "adjust_sampling",
            Self::RestartCollector => "restart_collector",
            Self::ClearCache => "clear_cache",
            Self::RecalibrateBaseline => "recalibrate_baseline",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemediationAction {
    #[serde(rename = "type")]
    pub kind: ActionKind,
    #[serde(default)]
    pub params: BTreeMap<String, Value>,
    /// Program and arguments run by the command executor.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub command: Option<Vec<String>>,
    #[serde(default = "default_action_timeout_secs")]
    pub timeout_secs: u64,
}

fn default_action_timeout_secs() -> u64 {
    60
}

impl RemediationAction {
    pub fn timeout(&self) -> Duration {
        Duration::from_secs(self.timeout_secs.max(1))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemediationStrategy {
    pub name: String,
    /// Issue type, issue severity, or `drift`.
    pub trigger: String,
    #[serde(default)]
    pub actions: Vec<RemediationAction>,
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
}

fn default_max_attempts() -> u32 {
    1
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AutoRemediationConfig {
    pub enabled: bool,
    pub max_retries: u32,
    pub retry_interval_secs: u64,
    pub strategies: Vec<RemediationStrategy>,
}

impl Default for AutoRemediationConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_retries: 2,
            retry_interval_secs: 30,
            strategies: Vec::new(),
        }
    }
}

impl AutoRemediationConfig {
    pub fn retry_interval(&self) -> Duration {
        Duration::from_secs(self.retry_interval_secs)
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct ValidationSettings {
    pub critical_widgets: Vec<String>,
    pub job_timeout_secs: u64,
    /// Root of the run history (`<dir>/runs/<id>.json`).
    pub history_dir: PathBuf,
}

impl Default for ValidationSettings {
    fn default() -> Self {
        Self {
            critical_widgets: DEFAULT_CRITICAL_WIDGETS.iter().map(|w| w.to_string()).collect(),
            job_timeout_secs: 600,
            history_dir: PathBuf::from("parityguard-data"),
        }
    }
}

impl ValidationSettings {
    pub fn job_timeout(&self) -> Duration {
        Duration::from_secs(self.job_timeout_secs.max(1))
    }
}

impl MonitorConfig {
    /// Read and validate a TOML configuration file.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_toml_str(&contents)
    }

    pub fn from_toml_str(contents: &str) -> Result<Self> {
        let config: MonitorConfig = toml::from_str(contents)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        self.parity.validate()?;

        for (name, expression) in self.schedules.entries() {
            if expression.trim().is_empty() {
                continue;
            }
            parse_schedule(name, expression)?;
        }

        let thresholds = &self.thresholds;
        check_unit("thresholds.critical_accuracy", thresholds.critical_accuracy)?;
        check_unit("thresholds.warning_accuracy", thresholds.warning_accuracy)?;
        check_unit("thresholds.drift_threshold", thresholds.drift_threshold)?;
        for (name, value) in &thresholds.metric_thresholds {
            check_unit(&format!("thresholds.metric_thresholds.{name}"), *value)?;
        }
        if thresholds.warning_accuracy < thresholds.critical_accuracy {
            return Err(MonitorError::Config(format!(
                "thresholds.warning_accuracy ({}) is below critical_accuracy ({})",
                thresholds.warning_accuracy, thresholds.critical_accuracy
            )));
        }

        if self.alerting.channels.contains(&AlertChannel::Webhook) && self.alerting.webhook_url.is_none() {
            return Err(MonitorError::Config(
                "alerting.channels includes webhook but webhook_url is not set".to_string(),
            ));
        }
        if self.alerting.channels.contains(&AlertChannel::File) && self.alerting.alert_file.is_none() {
            return Err(MonitorError::Config(
                "alerting.channels includes file but alert_file is not set".to_string(),
            ));
        }

        if self.drift_detection.anomaly_threshold < 0.0 {
            return Err(MonitorError::Config(
                "drift_detection.anomaly_threshold must not be negative".to_string(),
            ));
        }

        for strategy in &self.auto_remediation.strategies {
            if strategy.name.trim().is_empty() || strategy.trigger.trim().is_empty() {
                return Err(MonitorError::Config(
                    "remediation strategies need a name and a trigger".to_string(),
                ));
            }
        }

        Ok(())
    }
}

/// Parse a cron expression, naming the schedule in errors.
pub fn parse_schedule(name: &str, expression: &str) -> Result<cron::Schedule> {
    cron::Schedule::from_str(expression.trim()).map_err(|err| MonitorError::Schedule {
        name: name.to_string(),
        message: err.to_string(),
    })
}

fn check_unit(name: &str, value: f64) -> Result<()> {
    if value > 0.0 && value <= 1.0 {
        Ok(())
    } else {
        Err(MonitorError::Config(format!("{name} must be in (0, 1], got {value}")))
    }
}

fn hours(value: u64) -> TimeDelta {
    i64::try_from(value)
        .ok()
        .and_then(TimeDelta::try_hours)
        .unwrap_or(TimeDelta::MAX)
}
