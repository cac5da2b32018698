//! Core contracts and helpers for parityguard.
//!
//! This crate defines the canonical mapping, result, run and drift types,
//! accuracy scoring, and utilities shared by the validator, the monitor and
//! the CLI.

pub mod drift;
pub mod error;
pub mod mapping;
pub mod redaction;
pub mod result;
pub mod run;
pub mod scoring;

pub use drift::{DriftAnalysis, DriftSeverity, MetricDrift, Trend, TrendAnalysis, TrendSeverity};
pub use error::{Error, Result};
pub use mapping::{AttributeMapping, EventMapping, MetricMapping, MetricType};
pub use redaction::{anonymize_literals, PLACEHOLDER};
pub use result::{IssueSeverity, IssueType, Row, ValidationIssue, ValidationResult, ValidationStatus};
pub use run::{RunKind, ValidationRun};
pub use scoring::{accuracy, determine_status, ratio};

/// Current record contract version for persisted run files.
pub const RECORD_VERSION: &str = "0.1";
