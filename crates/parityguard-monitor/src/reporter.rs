use std::path::PathBuf;

use chrono::{DateTime, TimeDelta, Utc};
use parityguard_core::{DriftAnalysis, TrendAnalysis, ValidationRun, ValidationStatus};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::atomic::write_bytes_atomic;
use crate::config::{ReportFormat, ReportingConfig};
use crate::errors::Result;

/// Machine-readable trend report.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendReport {
    pub generated_at: DateTime<Utc>,
    pub trends: Vec<TrendAnalysis>,
}

/// Writes validation and trend reports in the configured formats.
#[derive(Debug, Clone)]
pub struct Reporter {
    config: ReportingConfig,
}

impl Reporter {
    pub fn new(config: ReportingConfig) -> Self {
        Self { config }
    }

    pub fn output_dir(&self) -> &std::path::Path {
        &self.config.output_dir
    }

    pub fn save_validation_report(&self, run: &ValidationRun) -> Result<Vec<PathBuf>> {
        let mut json = serde_json::to_value(run)?;
        if !self.config.include_raw_data {
            strip_result_metadata(&mut json);
        }
        let markdown = render_validation_report(run);
        self.save(&format!("validation_{}", run.id), &json, &markdown, Utc::now())
    }

    pub fn save_trend_report(&self, trends: &[TrendAnalysis]) -> Result<Vec<PathBuf>> {
        let now = Utc::now();
        let report = TrendReport {
            generated_at: now,
            trends: trends.to_vec(),
        };
        let json = serde_json::to_value(&report)?;
        let markdown = render_trend_report(&report);
        self.save("trend_analysis", &json, &markdown, now)
    }

    pub fn save_drift_report(&self, analysis: &DriftAnalysis) -> Result<Vec<PathBuf>> {
        let json = serde_json::to_value(analysis)?;
        let markdown = render_drift_report(analysis);
        self.save("drift_analysis", &json, &markdown, Utc::now())
    }

    /// Write `<name>_<YYYYmmdd_HHMMSS>.<ext>` per format, then apply retention.
    /// A numeric suffix keeps reports saved within the same second apart.
    fn save(&self, name: &str, json: &Value, markdown: &str, now: DateTime<Utc>) -> Result<Vec<PathBuf>> {
        let stem = self.free_stem(&format!("{name}_{}", now.format("%Y%m%d_%H%M%S")));
        let mut written = Vec::with_capacity(self.config.formats.len());
        for format in &self.config.formats {
            let path = self
                .config
                .output_dir
                .join(format!("{stem}.{}", format.extension()));
            match format {
                ReportFormat::Json => write_bytes_atomic(&path, &serde_json::to_vec_pretty(json)?)?,
                ReportFormat::Markdown => write_bytes_atomic(&path, markdown.as_bytes())?,
            }
            tracing::info!(event = "report_saved", path = %path.display());
            written.push(path);
        }

        if let Err(err) = self.cleanup(now) {
            tracing::warn!(event = "report_cleanup_failed", error = %err);
        }
        Ok(written)
    }

    fn free_stem(&self, base: &str) -> String {
        let taken = |stem: &str| {
            self.config
                .formats
                .iter()
                .any(|format| self.config.output_dir.join(format!("{stem}.{}", format.extension())).exists())
        };
        let mut stem = base.to_string();
        let mut suffix = 1;
        while taken(&stem) {
            stem = format!("{base}_{suffix}");
            suffix += 1;
        }
        stem
    }

    /// Remove report files last modified before `now - retention_days`.
    pub fn cleanup(&self, now: DateTime<Utc>) -> Result<usize> {
        let cutoff = now - TimeDelta::days(i64::from(self.config.retention_days));
        let entries = match std::fs::read_dir(&self.config.output_dir) {
            Ok(entries) => entries,
            Err(err) if err.kind() == std::io::ErrorKind::NotFound => return Ok(0),
            Err(err) => return Err(err.into()),
        };

        let mut removed = 0;
        for entry in entries {
            let entry = entry?;
            let path = entry.path();
            let is_report = path
                .extension()
                .and_then(|ext| ext.to_str())
                .is_some_and(|ext| ext == "json" || ext == "md");
            if !is_report {
                continue;
            }
            let modified: DateTime<Utc> = entry.metadata()?.modified()?.into();
            if modified < cutoff {
                std::fs::remove_file(&path)?;
                removed += 1;
            }
        }
        if removed > 0 {
            tracing::info!(event = "reports_pruned", removed);
        }
        Ok(removed)
    }
}

fn strip_result_metadata(report: &mut Value) {
    if let Some(results) = report.get_mut("results").and_then(Value::as_array_mut) {
        for result in results {
            if let Some(object) = result.as_object_mut() {
                object.remove("metadata");
            }
        }
    }
}

/// Human-readable summary of one run.
pub fn render_validation_report(run: &ValidationRun) -> String {
    let mut lines = Vec::new();

    lines.push("# Parity Validation Report".to_string());
    lines.push(String::new());
    lines.push("## Run summary".to_string());
    lines.push(format!("- run_id: {}", run.id));
    lines.push(format!("- type: {}", run.kind));
    lines.push(format!("- timestamp: {}", run.timestamp.to_rfc3339()));
    lines.push(format!("- duration_ms: {}", run.duration_ms));
    lines.push(format!(
        "- widgets: {} total, {} passed, {} failed",
        run.total_widgets, run.passed_widgets, run.failed_widgets
    ));
    lines.push(format!("- average_accuracy: {:.2}%", run.average_accuracy * 100.0));
    lines.push(String::new());

    lines.push("## Results".to_string());
    lines.push("| widget | status | accuracy | issues |".to_string());
    lines.push("| --- | --- | --- | --- |".to_string());
    for result in &run.results {
        lines.push(format!(
            "| {} | {} | {:.2}% | {} |",
            escape_cell(&result.metric_name),
            result.status,
            result.accuracy * 100.0,
            result.issues.len()
        ));
    }
    lines.push(String::new());

    if !run.issues.is_empty() {
        lines.push("## Issues".to_string());
        for issue in &run.issues {
            let suggestion = issue
                .suggestion
                .as_ref()
                .map(|suggestion| format!(" (suggestion: {suggestion})"))
                .unwrap_or_default();
            lines.push(format!(
                "- [{}] {}: {}{}",
                issue.severity.as_str(),
                issue.issue_type.as_str(),
                issue.message,
                suggestion
            ));
        }
        lines.push(String::new());
    }

    if let Some(drift) = &run.drift_analysis {
        lines.push("## Drift".to_string());
        lines.push(format!("- severity: {}", drift.severity.as_str()));
        lines.push(format!("- overall trend: {}", drift.trend_direction.as_str()));
        for metric in &drift.affected_metrics {
            lines.push(format!(
                "- {}: baseline {:.2}%, current {:.2}%, drift {:.1}% ({})",
                metric.metric_name,
                metric.baseline_accuracy * 100.0,
                metric.current_accuracy * 100.0,
                metric.drift_percentage,
                metric.trend.as_str()
            ));
        }
        for recommendation in &drift.recommendations {
            lines.push(format!("- {recommendation}"));
        }
        lines.push(String::new());
    }

    let skipped = run
        .results
        .iter()
        .filter(|result| result.status == ValidationStatus::Skipped)
        .count();
    if skipped > 0 {
        lines.push(format!("{skipped} widget(s) skipped."));
    }
    lines.join("\n")
}

pub fn render_trend_report(report: &TrendReport) -> String {
    let mut lines = Vec::new();
    lines.push("# Parity Trend Report".to_string());
    lines.push(String::new());
    lines.push(format!("- generated_at: {}", report.generated_at.to_rfc3339()));
    lines.push(String::new());
    lines.push("| metric | direction | severity | confidence | samples | slope |".to_string());
    lines.push("| --- | --- | --- | --- | --- | --- |".to_string());
    for trend in &report.trends {
        lines.push(format!(
            "| {} | {} | {:?} | {:.2} | {} | {:.4} |",
            escape_cell(&trend.metric_name),
            trend.direction.as_str(),
            trend.severity,
            trend.confidence,
            trend.samples,
            trend.slope
        ));
    }
    lines.join("\n")
}

pub fn render_drift_report(analysis: &DriftAnalysis) -> String {
    let mut lines = Vec::new();
    lines.push("# Parity Drift Report".to_string());
    lines.push(String::new());
    lines.push(format!("- generated_at: {}", analysis.timestamp.to_rfc3339()));
    lines.push(format!("- severity: {}", analysis.severity.as_str()));
    lines.push(format!("- overall trend: {}", analysis.trend_direction.as_str()));
    lines.push(String::new());
    if analysis.affected_metrics.is_empty() {
        lines.push("No metric drifted from its baseline.".to_string());
        return lines.join("\n");
    }

    lines.push("| metric | baseline | current | drift | trend | consecutive failures |".to_string());
    lines.push("| --- | --- | --- | --- | --- | --- |".to_string());
    for metric in &analysis.affected_metrics {
        lines.push(format!(
            "| {} | {:.2}% | {:.2}% | {:.1}% | {} | {} |",
            escape_cell(&metric.metric_name),
            metric.baseline_accuracy * 100.0,
            metric.current_accuracy * 100.0,
            metric.drift_percentage,
            metric.trend.as_str(),
            metric.consecutive_failures
        ));
    }
    if !analysis.recommendations.is_empty() {
        lines.push(String::new());
        for recommendation in &analysis.recommendations {
            lines.push(format!("- {recommendation}"));
        }
    }
    lines.join("\n")
}

fn escape_cell(text: &str) -> String {
    text.replace('|', "\\|")
}
