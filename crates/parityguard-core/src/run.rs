use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::drift::DriftAnalysis;
use crate::result::{ValidationIssue, ValidationResult, ValidationStatus};

/// Kind of scheduled execution that produced a run.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RunKind {
    Quick,
    Comprehensive,
}

impl fmt::Display for RunKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Quick => f.write_str("quick"),
            Self::Comprehensive => f.write_str("comprehensive"),
        }
    }
}

/// Aggregated results of one scheduled validation execution.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationRun {
    pub record_version: String,
    pub id: String,
    pub timestamp: DateTime<Utc>,
    #[serde(rename = "type")]
    pub kind: RunKind,
    pub duration_ms: u64,
    pub total_widgets: usize,
    pub passed_widgets: usize,
    pub failed_widgets: usize,
    pub average_accuracy: f64,
    pub results: Vec<ValidationResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub drift_analysis: Option<DriftAnalysis>,
    #[serde(default)]
    pub issues: Vec<ValidationIssue>,
}

impl ValidationRun {
    /// Build a run from its results, computing totals and the mean accuracy.
    ///
    /// The mean covers compared results only; skipped results count towards
    /// `total_widgets` but not towards `average_accuracy`. A run where every
    /// result was skipped scores 1.0. Issues of failed results are lifted to
    /// the run level.
    pub fn from_results(
        id: impl Into<String>,
        kind: RunKind,
        timestamp: DateTime<Utc>,
        duration_ms: u64,
        results: Vec<ValidationResult>,
    ) -> Self {
        let mut passed_widgets = 0;
        let mut failed_widgets = 0;
        let mut issues = Vec::new();
        let mut total_accuracy = 0.0;
        let mut compared = 0usize;

        for result in &results {
            if result.status != ValidationStatus::Skipped {
                total_accuracy += result.accuracy;
                compared += 1;
            }
            match result.status {
                ValidationStatus::Passed => passed_widgets += 1,
                ValidationStatus::Failed => {
                    failed_widgets += 1;
                    issues.extend(result.issues.iter().cloned());
                }
                ValidationStatus::Warning | ValidationStatus::Skipped => {}
            }
        }

        let average_accuracy = if results.is_empty() {
            0.0
        } else if compared == 0 {
            1.0
        } else {
            total_accuracy / compared as f64
        };

        Self {
            record_version: crate::RECORD_VERSION.to_string(),
            id: id.into(),
            timestamp,
            kind,
            duration_ms,
            total_widgets: results.len(),
            passed_widgets,
            failed_widgets,
            average_accuracy,
            results,
            drift_analysis: None,
            issues,
        }
    }
}
