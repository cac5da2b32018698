use std::collections::BTreeMap;
use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A single result row returned by a data source.
pub type Row = BTreeMap<String, Value>;

/// Outcome of one comparison.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ValidationStatus {
    Passed,
    Warning,
    Failed,
    Skipped,
}

impl fmt::Display for ValidationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Passed => "PASSED",
            Self::Warning => "WARNING",
            Self::Failed => "FAILED",
            Self::Skipped => "SKIPPED",
        };
        f.write_str(label)
    }
}

/// Category of a validation issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueType {
    MissingData,
    ValueMismatch,
    TypeMismatch,
    CardinalityHigh,
    TimingSkew,
}

impl IssueType {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::MissingData => "MISSING_DATA",
            Self::ValueMismatch => "VALUE_MISMATCH",
            Self::TypeMismatch => "TYPE_MISMATCH",
            Self::CardinalityHigh => "CARDINALITY_HIGH",
            Self::TimingSkew => "TIMING_SKEW",
        }
    }
}

/// Severity of a validation issue, ordered from least to most severe.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum IssueSeverity {
    Low,
    Medium,
    High,
    Critical,
}

impl IssueSeverity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "LOW",
            Self::Medium => "MEDIUM",
            Self::High => "HIGH",
            Self::Critical => "CRITICAL",
        }
    }
}

/// Structured finding attached to a validation result.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationIssue {
    #[serde(rename = "type")]
    pub issue_type: IssueType,
    pub severity: IssueSeverity,
    pub message: String,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub details: BTreeMap<String, Value>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub suggestion: Option<String>,
}

impl ValidationIssue {
    /// Create an issue without details or suggestion.
    pub fn new(issue_type: IssueType, severity: IssueSeverity, message: impl Into<String>) -> Self {
        Self {
            issue_type,
            severity,
            message: message.into(),
            details: BTreeMap::new(),
            suggestion: None,
        }
    }

    pub fn with_detail(mut self, key: impl Into<String>, value: impl Into<Value>) -> Self {
        self.details.insert(key.into(), value.into());
        self
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }
}

/// Result of comparing one metric or widget across both pipelines.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationResult {
    pub timestamp: DateTime<Utc>,
    pub metric_name: String,
    #[serde(default)]
    pub legacy_value: Value,
    #[serde(default)]
    pub new_value: Value,
    pub accuracy: f64,
    pub status: ValidationStatus,
    #[serde(default)]
    pub issues: Vec<ValidationIssue>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub metadata: BTreeMap<String, Value>,
}

impl ValidationResult {
    /// Failed result for a comparison that could not be carried out.
    pub fn failure(metric_name: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            timestamp: Utc::now(),
            metric_name: metric_name.into(),
            legacy_value: Value::Null,
            new_value: Value::Null,
            accuracy: 0.0,
            status: ValidationStatus::Failed,
            issues: vec![ValidationIssue::new(
                IssueType::MissingData,
                IssueSeverity::Critical,
                message,
            )],
            metadata: BTreeMap::new(),
        }
    }

    /// Skipped result with a reason recorded in metadata.
    pub fn skipped(metric_name: impl Into<String>, reason: &str) -> Self {
        let mut metadata = BTreeMap::new();
        metadata.insert("skip_reason".to_string(), Value::from(reason));
        Self {
            timestamp: Utc::now(),
            metric_name: metric_name.into(),
            legacy_value: Value::Null,
            new_value: Value::Null,
            accuracy: 1.0,
            status: ValidationStatus::Skipped,
            issues: Vec::new(),
            metadata,
        }
    }

    pub fn is_passed(&self) -> bool {
        self.status == ValidationStatus::Passed
    }
}
