/// Error types for the Quill editorial workflow core.
use crate::identity::Role;
use std::fmt;
use thiserror::Error;

/// Core error type for store operations.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum StoreError {
    #[error("Record not found: {0}")]
    NotFound(String),

    #[error("Version conflict on {id}: expected {expected}, found {found}")]
    VersionConflict { id: String, expected: i64, found: i64 },

    #[error("Database error: {0}")]
    DatabaseError(String),

    #[error("Serialization error: {0}")]
    SerializationError(String),
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

/// Why a transition was refused by a user-correctable precondition.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValidationFailure {
    /// The destination state requires an actor in this role and none is attached.
    MissingRole(Role),

    /// A step validator rejected the transition.
    Rejected { validator: String, message: String },
}

impl ValidationFailure {
    /// Stable message key, suitable for lookups in a UI message bundle.
    pub fn code(&self) -> &'static str {
        match self {
            ValidationFailure::MissingRole(_) => "MISSING_ROLE",
            ValidationFailure::Rejected { .. } => "VALIDATOR_REJECTED",
        }
    }
}

impl fmt::Display for ValidationFailure {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ValidationFailure::MissingRole(role) => write!(f, "MISSING_ROLE({})", role),
            ValidationFailure::Rejected { validator, message } => {
                write!(f, "{}: {}", validator, message)
            }
        }
    }
}

/// Core error type for workflow transitions.
#[derive(Error, Debug)]
pub enum WorkflowError {
    #[error("Content item {0} has already been started")]
    DuplicateExecution(String),

    #[error("Actor with role {0} is missing")]
    MissingActorRole(Role),

    #[error("Validation failed: {0}")]
    ValidationFailed(ValidationFailure),

    #[error("Transition failed: {0}")]
    TransitionFailed(String),

    #[error("Version conflict: {0}")]
    VersionConflict(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid workflow definition: {0}")]
    InvalidDefinition(String),

    #[error("Store error: {0}")]
    Store(StoreError),
}

impl WorkflowError {
    /// Only concurrent modification is worth retrying, after reloading the item.
    pub fn is_retryable(&self) -> bool {
        matches!(self, WorkflowError::VersionConflict(_))
    }
}

impl From<StoreError> for WorkflowError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::VersionConflict { .. } => WorkflowError::VersionConflict(err.to_string()),
            StoreError::NotFound(msg) => WorkflowError::NotFound(msg),
            other => WorkflowError::Store(other),
        }
    }
}

/// Result type for workflow operations.
pub type WorkflowResult<T> = Result<T, WorkflowError>;

/// Core error type for the plugin job queue.
#[derive(Error, Debug)]
pub enum JobQueueError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Invalid job state: {0}")]
    InvalidState(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Result type for job queue operations.
pub type JobQueueResult<T> = Result<T, JobQueueError>;

/// Core error type for search indexing.
#[derive(Error, Debug)]
pub enum IndexError {
    /// The entity to index no longer exists.
    #[error("Entity not found: {0}")]
    NotFound(String),

    #[error("Indexing failed: {0}")]
    Failed(String),

    #[error("Store error: {0}")]
    Store(#[from] StoreError),
}

/// Result type for indexing operations.
pub type IndexResult<T> = Result<T, IndexError>;

/// Error returned by validators and actions.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum PluginError {
    /// Target or configuration vanished; never retried.
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Plugin failed: {message}")]
    Failed { message: String, permanent: bool },
}

impl PluginError {
    /// A failure the job queue will retry on its next drain.
    pub fn transient(message: impl Into<String>) -> Self {
        PluginError::Failed {
            message: message.into(),
            permanent: false,
        }
    }

    /// A failure the job queue will never retry.
    pub fn permanent(message: impl Into<String>) -> Self {
        PluginError::Failed {
            message: message.into(),
            permanent: true,
        }
    }

    /// The message without the variant prefix.
    pub fn message(&self) -> &str {
        match self {
            PluginError::NotFound(message) => message,
            PluginError::Failed { message, .. } => message,
        }
    }

    pub fn is_permanent(&self) -> bool {
        match self {
            PluginError::NotFound(_) => true,
            PluginError::Failed { permanent, .. } => *permanent,
        }
    }
}

/// Result type for plugin invocations.
pub type PluginResult<T> = Result<T, PluginError>;

/// Core error type for identity resolution.
#[derive(Error, Debug, Clone)]
pub enum IdentityError {
    #[error("No authenticated caller")]
    Unauthenticated,

    #[error("User lookup failed: {0}")]
    Lookup(String),
}

/// Core error type for the content facade.
#[derive(Error, Debug)]
pub enum ContentError {
    #[error("Workflow error: {0}")]
    Workflow(#[from] WorkflowError),

    #[error("Index queue error: {0}")]
    Index(#[from] IndexError),

    #[error("Store error: {0}")]
    Store(StoreError),
}

impl From<StoreError> for ContentError {
    fn from(err: StoreError) -> Self {
        match err {
            StoreError::VersionConflict { .. } | StoreError::NotFound(_) => {
                ContentError::Workflow(WorkflowError::from(err))
            }
            other => ContentError::Store(other),
        }
    }
}

/// Result type for content facade operations.
pub type ContentResult<T> = Result<T, ContentError>;

/// Core error type for configuration handling.
#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Failed to parse config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("Invalid configuration: {0}")]
    Invalid(String),
}

/// Result type for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
