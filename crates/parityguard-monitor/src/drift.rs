//! Statistical drift of per-metric accuracy against a historical baseline.

use std::collections::BTreeMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use parityguard_core::{
    DriftAnalysis, DriftSeverity, MetricDrift, ValidationResult, ValidationRun, ValidationStatus,
};

use crate::config::DriftDetectionConfig;
use crate::errors::Result;
use crate::history::HistoryStore;
use crate::trend::{fit_series, overall_direction};

/// Drift percentage above which a metric gets a recommendation.
const RECOMMENDATION_THRESHOLD: f64 = 10.0;

/// Reads history, never writes it.
pub struct DriftDetector {
    history: Arc<dyn HistoryStore>,
    config: DriftDetectionConfig,
    stable_band: f64,
}

struct Sample {
    timestamp: DateTime<Utc>,
    accuracy: f64,
    status: ValidationStatus,
}

impl DriftDetector {
    /// `stable_band` is the accuracy change still treated as a stable trend.
    pub fn new(history: Arc<dyn HistoryStore>, config: DriftDetectionConfig, stable_band: f64) -> Self {
        Self {
            history,
            config,
            stable_band,
        }
    }

    pub fn config(&self) -> &DriftDetectionConfig {
        &self.config
    }

    pub fn analyze_drift(&self, current: &[ValidationResult]) -> Result<DriftAnalysis> {
        self.analyze_drift_at(current, Utc::now())
    }

    /// Compare `current` against the baseline window ending at `now`.
    ///
    /// Only runs inside `[now - baseline_window, now]` are read, so the same
    /// inputs and stored history always give the same analysis.
    pub fn analyze_drift_at(&self, current: &[ValidationResult], now: DateTime<Utc>) -> Result<DriftAnalysis> {
        let history: Vec<ValidationRun> = self
            .history
            .query(now - self.config.baseline_window())?
            .into_iter()
            .filter(|run| run.timestamp <= now)
            .collect();

        let series = metric_series(&history);
        let current_by_metric = current_accuracy(current);
        let threshold = self.config.anomaly_threshold;

        let mut affected_metrics = Vec::new();
        for (metric, current_accuracy) in &current_by_metric {
            let Some(samples) = series.get(metric.as_str()) else {
                continue;
            };
            if samples.len() < self.config.min_data_points.max(1) {
                continue;
            }
            let baseline = samples.iter().map(|sample| sample.accuracy).sum::<f64>() / samples.len() as f64;
            if baseline == 0.0 {
                continue;
            }

            let drift_percentage = drift_of(baseline, *current_accuracy);
            if drift_percentage.abs() <= threshold {
                continue;
            }

            let first_detected = samples
                .iter()
                .find(|sample| drift_of(baseline, sample.accuracy).abs() > threshold)
                .map(|sample| sample.timestamp)
                .unwrap_or(now);
            let accuracies: Vec<f64> = samples.iter().map(|sample| sample.accuracy).collect();

            affected_metrics.push(MetricDrift {
                metric_name: metric.clone(),
                baseline_accuracy: baseline,
                current_accuracy: *current_accuracy,
                drift_percentage,
                trend: fit_series(&accuracies, self.stable_band).direction,
                first_detected,
                consecutive_failures: consecutive_failures(samples, current, metric),
            });
        }

        let max_drift = affected_metrics
            .iter()
            .map(|drift| drift.drift_percentage.abs())
            .fold(0.0_f64, f64::max);
        let severity = if affected_metrics.is_empty() {
            DriftSeverity::None
        } else {
            DriftSeverity::from_drift_percentage(max_drift)
        };

        let recommendations = affected_metrics
            .iter()
            .filter(|drift| drift.drift_percentage > RECOMMENDATION_THRESHOLD)
            .map(|drift| {
                format!(
                    "Investigate {}: accuracy degraded by {:.1}% against its baseline",
                    drift.metric_name, drift.drift_percentage
                )
            })
            .collect();

        let analysis = DriftAnalysis {
            timestamp: now,
            severity,
            affected_metrics,
            recommendations,
            trend_direction: overall_direction(&history, self.stable_band),
        };

        tracing::info!(
            event = "drift_analyzed",
            severity = analysis.severity.as_str(),
            affected = analysis.affected_metrics.len(),
            baseline_runs = history.len()
        );
        Ok(analysis)
    }
}

/// `(baseline - current) / baseline * 100`; positive means degradation.
pub fn drift_of(baseline: f64, current: f64) -> f64 {
    (baseline - current) / baseline * 100.0
}

/// Skipped results were never compared and carry no accuracy signal.
fn compared(result: &ValidationResult) -> bool {
    result.status != ValidationStatus::Skipped
}

fn metric_series(history: &[ValidationRun]) -> BTreeMap<&str, Vec<Sample>> {
    let mut series: BTreeMap<&str, Vec<Sample>> = BTreeMap::new();
    for run in history {
        for result in run.results.iter().filter(|result| compared(result)) {
            series.entry(result.metric_name.as_str()).or_default().push(Sample {
                timestamp: run.timestamp,
                accuracy: result.accuracy,
                status: result.status,
            });
        }
    }
    series
}

fn current_accuracy(current: &[ValidationResult]) -> BTreeMap<String, f64> {
    let mut sums: BTreeMap<String, (f64, usize)> = BTreeMap::new();
    for result in current.iter().filter(|result| compared(result)) {
        let entry = sums.entry(result.metric_name.clone()).or_insert((0.0, 0));
        entry.0 += result.accuracy;
        entry.1 += 1;
    }
    sums.into_iter()
        .map(|(metric, (sum, count))| (metric, sum / count as f64))
        .collect()
}

/// Trailing `Failed` statuses across history followed by the current results.
fn consecutive_failures(samples: &[Sample], current: &[ValidationResult], metric: &str) -> usize {
    samples
        .iter()
        .map(|sample| sample.status)
        .chain(
            current
                .iter()
                .filter(|result| result.metric_name == metric && compared(result))
                .map(|result| result.status),
        )
        .rev()
        .take_while(|status| *status == ValidationStatus::Failed)
        .count()
}
