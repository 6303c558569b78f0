use std::fmt;

use thiserror::Error;

/// Error taxonomy shared by every layer of the control plane.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Bad request: {0}")]
    BadRequest(String),

    #[error("{resource} not found: {id}")]
    NotFound { resource: String, id: String },

    #[error("{resource} already exists: {id}")]
    AlreadyExists { resource: String, id: String },

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Unauthenticated: {0}")]
    Unauthenticated(String),

    #[error("Permission denied: {0}")]
    PermissionDenied(String),

    #[error("Cluster API error ({status}): {message}")]
    ClusterApi { status: u16, message: String },

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("Serialization error: {0}")]
    Serialization(String),

    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Internal error: {0}")]
    Internal(String),

    #[error("{context}: {source}")]
    Wrapped {
        context: String,
        #[source]
        source: Box<PipelineError>,
    },

    #[error("{}", format_aggregate(.0))]
    Aggregate(Vec<PipelineError>),
}

/// Coarse classification used by callers that branch on the kind of failure
/// rather than on the concrete variant.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    NotFound,
    AlreadyExists,
    Unauthenticated,
    PermissionDenied,
    Internal,
    Aggregate,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            ErrorKind::InvalidInput => "InvalidInput",
            ErrorKind::NotFound => "NotFound",
            ErrorKind::AlreadyExists => "AlreadyExists",
            ErrorKind::Unauthenticated => "Unauthenticated",
            ErrorKind::PermissionDenied => "PermissionDenied",
            ErrorKind::Internal => "Internal",
            ErrorKind::Aggregate => "Aggregate",
        };
        f.write_str(name)
    }
}

fn format_aggregate(errors: &[PipelineError]) -> String {
    match errors.len() {
        0 => "no errors".to_string(),
        1 => errors[0].to_string(),
        _ => {
            let joined = errors
                .iter()
                .map(|e| e.to_string())
                .collect::<Vec<_>>()
                .join(", ");
            format!("[{joined}]")
        }
    }
}

impl PipelineError {
    pub fn not_found(resource: impl Into<String>, id: impl Into<String>) -> Self {
        PipelineError::NotFound {
            resource: resource.into(),
            id: id.into(),
        }
    }

    pub fn already_exists(resource: impl Into<String>, id: impl Into<String>) -> Self {
        PipelineError::AlreadyExists {
            resource: resource.into(),
            id: id.into(),
        }
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        PipelineError::InvalidInput(message.into())
    }

    /// Internal failure carrying the downstream cause in its message.
    pub fn internal(cause: impl fmt::Display, context: impl Into<String>) -> Self {
        PipelineError::Internal(format!("{}: {}", context.into(), cause))
    }

    /// Adds operation context while keeping the kind of the cause.
    pub fn wrap(self, context: impl Into<String>) -> Self {
        PipelineError::Wrapped {
            context: context.into(),
            source: Box::new(self),
        }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            PipelineError::InvalidInput(_) | PipelineError::BadRequest(_) => {
                ErrorKind::InvalidInput
            }
            PipelineError::NotFound { .. } => ErrorKind::NotFound,
            PipelineError::AlreadyExists { .. } | PipelineError::Conflict(_) => {
                ErrorKind::AlreadyExists
            }
            PipelineError::Unauthenticated(_) => ErrorKind::Unauthenticated,
            PipelineError::PermissionDenied(_) => ErrorKind::PermissionDenied,
            PipelineError::Wrapped { source, .. } => source.kind(),
            PipelineError::Aggregate(_) => ErrorKind::Aggregate,
            PipelineError::ClusterApi { status: 404, .. } => ErrorKind::NotFound,
            PipelineError::ClusterApi { .. }
            | PipelineError::Database(_)
            | PipelineError::Serialization(_)
            | PipelineError::Configuration(_)
            | PipelineError::Internal(_) => ErrorKind::Internal,
        }
    }

    pub fn is_not_found(&self) -> bool {
        self.kind() == ErrorKind::NotFound
    }

    pub fn is_already_exists(&self) -> bool {
        self.kind() == ErrorKind::AlreadyExists
    }

    /// Whether a backoff loop may try the same call again.
    pub fn is_retryable(&self) -> bool {
        match self {
            PipelineError::Conflict(_) => true,
            PipelineError::ClusterApi { status, .. } => *status == 429 || *status >= 500,
            PipelineError::Database(_) => true,
            PipelineError::Wrapped { source, .. } => source.is_retryable(),
            _ => false,
        }
    }
}

impl From<serde_json::Error> for PipelineError {
    fn from(err: serde_json::Error) -> Self {
        PipelineError::Serialization(err.to_string())
    }
}

impl From<serde_yaml::Error> for PipelineError {
    fn from(err: serde_yaml::Error) -> Self {
        PipelineError::Serialization(err.to_string())
    }
}

impl From<config::ConfigError> for PipelineError {
    fn from(err: config::ConfigError) -> Self {
        PipelineError::Configuration(err.to_string())
    }
}

/// Unified result type
pub type PipelineResult<T> = std::result::Result<T, PipelineError>;

/// Extension for attaching operation context to fallible calls.
pub trait ResultExt<T> {
    fn context(self, context: &str) -> PipelineResult<T>;
}

impl<T> ResultExt<T> for PipelineResult<T> {
    fn context(self, context: &str) -> PipelineResult<T> {
        self.map_err(|e| e.wrap(context))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_wrapped_error_keeps_kind() {
        let err = PipelineError::not_found("run", "abc").wrap("Retry run failed");
        assert_eq!(err.kind(), ErrorKind::NotFound);
        assert!(err.is_not_found());
        assert_eq!(err.to_string(), "Retry run failed: run not found: abc");
    }

    #[test]
    fn test_cluster_404_is_not_found() {
        let err = PipelineError::ClusterApi {
            status: 404,
            message: "pipelineruns.tekton.dev \"x\" not found".to_string(),
        };
        assert!(err.is_not_found());
        assert!(!err.is_retryable());
    }

    #[test]
    fn test_retryable_classification() {
        assert!(PipelineError::Conflict("resource version".into()).is_retryable());
        assert!(PipelineError::ClusterApi {
            status: 503,
            message: "unavailable".into()
        }
        .is_retryable());
        assert!(!PipelineError::invalid_input("bad").is_retryable());
        assert!(!PipelineError::not_found("workflow", "w").is_retryable());
    }

    #[test]
    fn test_aggregate_display() {
        let err = PipelineError::Aggregate(vec![
            PipelineError::Unauthenticated("no header".into()),
            PipelineError::Unauthenticated("no token".into()),
        ]);
        assert_eq!(err.kind(), ErrorKind::Aggregate);
        assert_eq!(
            err.to_string(),
            "[Unauthenticated: no header, Unauthenticated: no token]"
        );
    }

    #[test]
    fn test_context_extension() {
        let result: PipelineResult<()> = Err(PipelineError::invalid_input("x"));
        let err = result.context("Create run failed").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
        assert!(err.to_string().starts_with("Create run failed"));
    }
}
