use thiserror::Error;

/// Errors raised while reading a dashboard definition.
#[derive(Debug, Error)]
pub enum DashboardError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse dashboard JSON: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid dashboard: {0}")]
    InvalidDocument(String),
}

pub type Result<T> = std::result::Result<T, DashboardError>;
