use thiserror::Error;

/// Core error type shared across parityguard crates.
#[derive(Debug, Error)]
pub enum Error {
    /// Malformed mapping, schedule or threshold configuration.
    #[error("config error: {0}")]
    Config(String),
    /// A query or metric has no known mapping in the new pipeline.
    #[error("translation error: {0}")]
    Translation(String),
    /// A data-source client failed, timed out or was unreachable.
    #[error("data source error: {0}")]
    DataSource(String),
    /// A registered transformation rejected its input.
    #[error("transform error: {0}")]
    Transform(String),
    /// The surrounding run was cancelled.
    #[error("operation cancelled")]
    Cancelled,
}

/// Convenience alias for results returned by parityguard crates.
pub type Result<T> = std::result::Result<T, Error>;
