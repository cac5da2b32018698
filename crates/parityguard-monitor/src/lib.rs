//! Continuous parity monitoring: scheduled validation runs, run history,
//! drift and trend analysis, alerting, reports, and auto-remediation.

pub mod alerter;
pub mod atomic;
pub mod config;
pub mod continuous;
pub mod drift;
pub mod errors;
pub mod history;
pub mod ids;
pub mod remediation;
pub mod reporter;
pub mod scheduler;
pub mod trend;

pub use alerter::{Alert, AlertLevel, Alerter, Dispatch};
pub use config::{
    AlertChannel, AlertingConfig, AutoRemediationConfig, DriftDetectionConfig, MonitorConfig, ReportFormat,
    ReportingConfig, ScheduleConfig, ThresholdConfig, ValidationSettings,
};
pub use continuous::ContinuousValidator;
pub use drift::DriftDetector;
pub use errors::{MonitorError, Result};
pub use history::{FileHistoryStore, HistoryStore, MemoryHistoryStore};
pub use remediation::{ActionExecutor, ActionOutcome, AutoRemediator, CommandExecutor, RemediationReport};
pub use reporter::Reporter;
pub use scheduler::{JobFn, Scheduler, SchedulerHandle, job_fn};
