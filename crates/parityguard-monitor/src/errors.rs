use std::io;

use thiserror::Error;

/// Errors raised by the monitoring layer.
#[derive(Debug, Error)]
pub enum MonitorError {
    #[error("io error: {0}")]
    Io(#[from] io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("toml decode error: {0}")]
    TomlDecode(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Config(String),
    #[error("invalid schedule '{name}': {message}")]
    Schedule { name: String, message: String },
    #[error("continuous validator is already running")]
    AlreadyRunning,
    #[error("job '{job}' timed out after {secs}s")]
    JobTimeout { job: String, secs: u64 },
    #[error("remediation failed: {0}")]
    Remediation(String),
    #[error("webhook delivery failed: {0}")]
    Webhook(String),
    #[error("background task failed: {0}")]
    Task(String),
    #[error("invalid path: {0}")]
    InvalidPath(String),
    #[error(transparent)]
    Core(#[from] parityguard_core::Error),
}

pub type Result<T> = std::result::Result<T, MonitorError>;

/// Run blocking file work on tokio's blocking pool.
pub async fn blocking<T, F>(work: F) -> Result<T>
where
    F: FnOnce() -> Result<T> + Send + 'static,
    T: Send + 'static,
{
    tokio::task::spawn_blocking(work)
        .await
        .map_err(|err| MonitorError::Task(err.to_string()))?
}
