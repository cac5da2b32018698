use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Overall drift severity, ordered from none to critical.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum DriftSeverity {
    None,
    Low,
    Medium,
    High,
    Critical,
}

impl DriftSeverity {
    /// Bucket an absolute drift percentage.
    pub fn from_drift_percentage(max_abs_drift: f64) -> Self {
        if max_abs_drift > 20.0 {
            Self::Critical
        } else if max_abs_drift > 10.0 {
            Self::High
        } else if max_abs_drift > 5.0 {
            Self::Medium
        } else if max_abs_drift > 2.0 {
            Self::Low
        } else {
            Self::None
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "NONE",
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }
}

/// Direction of an accuracy series over time.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Trend {
    Improving,
    Degrading,
    Stable,
    Volatile,
}

impl Trend {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Improving => "improving",
            Self::Degrading => "degrading",
            Self::Stable => "stable",
            Self::Volatile => "volatile",
        }
    }
}

/// Drift of a single metric against its baseline.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MetricDrift {
    pub metric_name: String,
    pub baseline_accuracy: f64,
    pub current_accuracy: f64,
    pub drift_percentage: f64,
    pub trend: Trend,
    pub first_detected: DateTime<Utc>,
    pub consecutive_failures: usize,
}

/// Drift analysis embedded in a validation run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DriftAnalysis {
    pub timestamp: DateTime<Utc>,
    pub severity: DriftSeverity,
    pub affected_metrics: Vec<MetricDrift>,
    pub recommendations: Vec<String>,
    pub trend_direction: Trend,
}

impl DriftAnalysis {
    pub fn is_clean(&self) -> bool {
        self.affected_metrics.is_empty()
    }
}

/// Severity of a long-window trend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TrendSeverity {
    Low,
    Medium,
    High,
}

/// Trend of one metric's accuracy across the history window.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TrendAnalysis {
    pub metric_name: String,
    pub direction: Trend,
    pub severity: TrendSeverity,
    /// Absolute correlation of accuracy with time, in `[0, 1]`.
    pub confidence: f64,
    pub samples: usize,
    /// Accuracy change per sample from a least-squares fit.
    pub slope: f64,
}
