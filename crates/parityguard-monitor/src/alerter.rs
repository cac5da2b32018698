use std::collections::HashMap;
use std::fmt;
use std::future::Future;
use std::io::Write;
use std::sync::Mutex;
use std::time::Duration;

use chrono::{DateTime, Utc};
use parityguard_core::{DriftAnalysis, TrendAnalysis};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::config::{AlertChannel, AlertingConfig};
use crate::errors::{MonitorError, Result, blocking};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AlertLevel {
    Critical,
    Drift,
    Warning,
    Metric,
    Trend,
    Error,
}

impl AlertLevel {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Critical => "critical",
            Self::Drift => "drift",
            Self::Warning => "warning",
            Self::Metric => "metric",
            Self::Trend => "trend",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for AlertLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Alert {
    pub level: AlertLevel,
    pub message: String,
    #[serde(default)]
    pub data: Value,
    pub timestamp: DateTime<Utc>,
}

/// What happened to an alert handed to [`Alerter::send`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Dispatch {
    Sent,
    Throttled,
    Filtered,
    Disabled,
}

/// Fans alerts out to the configured channels.
///
/// One instance per process; the throttle map lives here, keyed by
/// `level:message`.
pub struct Alerter {
    config: AlertingConfig,
    last_sent: Mutex<HashMap<String, DateTime<Utc>>>,
    client: reqwest::Client,
}

impl Alerter {
    pub fn new(config: AlertingConfig) -> Self {
        Self {
            config,
            last_sent: Mutex::new(HashMap::new()),
            client: reqwest::Client::new(),
        }
    }

    pub fn config(&self) -> &AlertingConfig {
        &self.config
    }

    pub async fn critical(&self, message: impl Into<String>, data: Value) -> Dispatch {
        self.send(AlertLevel::Critical, message, data).await
    }

    pub async fn warning(&self, message: impl Into<String>, data: Value) -> Dispatch {
        self.send(AlertLevel::Warning, message, data).await
    }

    pub async fn drift(&self, analysis: &DriftAnalysis) -> Dispatch {
        let data = serde_json::to_value(analysis).unwrap_or(Value::Null);
        self.send(AlertLevel::Drift, "Metric drift detected", data).await
    }

    pub async fn metric(&self, metric: &str, accuracy: f64, threshold: f64) -> Dispatch {
        let message = format!(
            "Metric {metric} accuracy {:.2}% below threshold {:.2}%",
            accuracy * 100.0,
            threshold * 100.0
        );
        let data = serde_json::json!({
            "metric": metric,
            "accuracy": accuracy,
            "threshold": threshold,
        });
        self.send(AlertLevel::Metric, message, data).await
    }

    pub async fn trend(&self, trend: &TrendAnalysis) -> Dispatch {
        let data = serde_json::to_value(trend).unwrap_or(Value::Null);
        let message = format!("Negative trend detected for {}", trend.metric_name);
        self.send(AlertLevel::Trend, message, data).await
    }

    /// The message is rendered before the returned future is created, so the
    /// future does not borrow `error`.
    pub fn error<'a>(
        &'a self,
        context: &str,
        error: &dyn fmt::Display,
    ) -> impl Future<Output = Dispatch> + Send + use<'a> {
        let message = format!("Error in {context}: {error}");
        self.send(AlertLevel::Error, message, Value::Null)
    }

    /// Deliver an alert unless it is filtered or throttled. Channel failures
    /// are logged and do not propagate.
    pub async fn send(&self, level: AlertLevel, message: impl Into<String>, data: Value) -> Dispatch {
        let message = message.into();
        if !self.config.enabled {
            return Dispatch::Disabled;
        }
        if !self.allows(level) {
            tracing::debug!(event = "alert_filtered", level = %level, message = %message);
            return Dispatch::Filtered;
        }

        let now = Utc::now();
        if !self.claim(&format!("{level}:{message}"), now) {
            tracing::debug!(event = "alert_throttled", level = %level, message = %message);
            return Dispatch::Throttled;
        }

        let alert = Alert {
            level,
            message,
            data,
            timestamp: now,
        };
        for channel in &self.config.channels {
            let delivered = match channel {
                AlertChannel::Log => {
                    log_alert(&alert);
                    Ok(())
                }
                AlertChannel::File => self.append_to_file(&alert).await,
                AlertChannel::Webhook => self.post_webhook(&alert).await,
            };
            if let Err(err) = delivered {
                tracing::warn!(
                    event = "alert_delivery_failed",
                    channel = ?channel,
                    level = %alert.level,
                    error = %err
                );
            }
        }
        Dispatch::Sent
    }

    fn allows(&self, level: AlertLevel) -> bool {
        self.config.severity_filters.is_empty()
            || self
                .config
                .severity_filters
                .iter()
                .any(|filter| filter.trim().eq_ignore_ascii_case(level.as_str()))
    }

    /// Record `key` as sent at `now` unless it fired inside the throttle window.
    /// Entries whose window has passed are dropped.
    fn claim(&self, key: &str, now: DateTime<Utc>) -> bool {
        let throttle = self.config.throttle();
        let mut last_sent = self
            .last_sent
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        last_sent.retain(|_, sent| now - *sent < throttle);
        if last_sent.contains_key(key) {
            return false;
        }
        last_sent.insert(key.to_string(), now);
        true
    }

    async fn append_to_file(&self, alert: &Alert) -> Result<()> {
        let path = self
            .config
            .alert_file
            .clone()
            .ok_or_else(|| MonitorError::Config("alert_file is not set".to_string()))?;
        let mut line = serde_json::to_vec(alert)?;
        line.push(b'\n');
        blocking(move || {
            if let Some(parent) = path.parent().filter(|parent| !parent.as_os_str().is_empty()) {
                std::fs::create_dir_all(parent)?;
            }
            let mut file = std::fs::OpenOptions::new().create(true).append(true).open(&path)?;
            file.write_all(&line)?;
            Ok(())
        })
        .await
    }

    async fn post_webhook(&self, alert: &Alert) -> Result<()> {
        let url = self
            .config
            .webhook_url
            .as_deref()
            .ok_or_else(|| MonitorError::Config("webhook_url is not set".to_string()))?;
        self.client
            .post(url)
            .timeout(Duration::from_secs(self.config.webhook_timeout_secs.max(1)))
            .json(alert)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|err| MonitorError::Webhook(err.to_string()))?;
        Ok(())
    }
}

fn log_alert(alert: &Alert) {
    match alert.level {
        AlertLevel::Critical | AlertLevel::Error => tracing::error!(
            event = "alert",
            level = %alert.level,
            message = %alert.message,
            data = %alert.data
        ),
        AlertLevel::Drift | AlertLevel::Warning | AlertLevel::Metric | AlertLevel::Trend => tracing::warn!(
            event = "alert",
            level = %alert.level,
            message = %alert.message,
            data = %alert.data
        ),
    }
}
