use thiserror::Error;

/// Severity level for document issues.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum IssueSeverity {
    Error,
    Warning,
}

/// Structured problem found in a mapping document, with location and hint.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct DocumentIssue {
    pub severity: IssueSeverity,
    pub code: String,
    pub path: String,
    pub message: String,
    pub hint: Option<String>,
}

impl DocumentIssue {
    pub fn new(
        severity: IssueSeverity,
        code: impl Into<String>,
        path: impl Into<String>,
        message: impl Into<String>,
        hint: Option<String>,
    ) -> Self {
        Self {
            severity,
            code: code.into(),
            path: path.into(),
            message: message.into(),
            hint,
        }
    }

    pub fn error(code: impl Into<String>, path: impl Into<String>, message: impl Into<String>) -> Self {
        Self::new(IssueSeverity::Error, code, path, message, None)
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

/// Aggregated errors and warnings for one document.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct DocumentReport {
    pub errors: Vec<DocumentIssue>,
    pub warnings: Vec<DocumentIssue>,
}

impl DocumentReport {
    /// Returns true when there are no errors.
    pub fn is_ok(&self) -> bool {
        self.errors.is_empty()
    }

    pub fn push_error(&mut self, issue: DocumentIssue) {
        self.errors.push(issue);
    }

    pub fn push_warning(&mut self, issue: DocumentIssue) {
        self.warnings.push(issue);
    }

    /// One line per error, `path: message`.
    pub fn summary(&self) -> String {
        self.errors
            .iter()
            .map(|issue| format!("{} [{}]: {}", issue.path, issue.code, issue.message))
            .collect::<Vec<_>>()
            .join("; ")
    }
}

/// Errors raised while loading a mapping document.
#[derive(Debug, Error)]
pub enum MappingError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("json error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("toml error: {0}")]
    Toml(#[from] toml::de::Error),
    #[error("schema error: {0}")]
    Schema(String),
    #[error("invalid mapping document: {}", .0.summary())]
    Invalid(DocumentReport),
    #[error(transparent)]
    Core(#[from] parityguard_core::Error),
}

impl MappingError {
    /// Structured issues, when the failure came from document validation.
    pub fn report(&self) -> Option<&DocumentReport> {
        match self {
            Self::Invalid(report) => Some(report),
            _ => None,
        }
    }
}

impl From<MappingError> for parityguard_core::Error {
    fn from(err: MappingError) -> Self {
        match err {
            MappingError::Core(inner) => inner,
            other => parityguard_core::Error::Config(other.to_string()),
        }
    }
}

pub type Result<T> = std::result::Result<T, MappingError>;
