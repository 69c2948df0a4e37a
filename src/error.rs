use std::fmt;
use std::time::Duration;

use serde::Serialize;

/// Crate-wide error type. Every fallible function returns `Result<T, AppError>`.
/// Serializes as `{ error, kind }` so the CLI can emit machine-readable failures.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// The request never produced a usable response (connect failure, I/O timeout,
    /// undecodable body).
    #[error("Transport error: {0}")]
    Transport(String),

    /// Kafka Connect answered with a hard error status.
    #[error("Kafka Connect error ({status}): {message}")]
    Service { status: u16, message: String },

    /// A synchronous wait ran out of time; the operation may still complete later.
    #[error("timeout on {operation} connector {connector} sync after {}s", .after.as_secs())]
    Timeout {
        operation: SyncOperation,
        connector: String,
        after: Duration,
    },

    #[error("Cancelled while {0}")]
    Cancelled(SyncOperation),

    #[error("{0}")]
    Deploy(DeployErrors),

    #[error("Validation error: {0}")]
    Validation(String),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serde(#[from] serde_json::Error),

    #[error("{0}")]
    Internal(String),
}

impl AppError {
    pub fn kind(&self) -> &'static str {
        match self {
            AppError::Transport(_) => "transport",
            AppError::Service { .. } => "service",
            AppError::Timeout { .. } => "timeout",
            AppError::Cancelled(_) => "cancelled",
            AppError::Deploy(_) => "deploy",
            AppError::Validation(_) => "validation",
            AppError::Config(_) => "config",
            AppError::Io(_) => "io",
            AppError::Serde(_) => "serde",
            AppError::Internal(_) => "internal",
        }
    }

    /// True when the failure came from a bounded wait rather than from the service.
    pub fn is_timeout(&self) -> bool {
        matches!(self, AppError::Timeout { .. })
    }
}

/// We serialize as `{ error: "...", kind: "..." }` for `--json-log` consumers.
impl Serialize for AppError {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeStruct;
        let mut s = serializer.serialize_struct("AppError", 2)?;
        s.serialize_field("error", &self.to_string())?;
        s.serialize_field("kind", self.kind())?;
        s.end()
    }
}

// ============================================================================
// Synchronous operation families
// ============================================================================

/// Operation family a bounded wait belongs to.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncOperation {
    Create,
    Update,
    Delete,
    Pause,
    Resume,
    /// A whole reconciliation, cancelled before it could finish or start.
    Deploy,
}

impl fmt::Display for SyncOperation {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let verb = match self {
            SyncOperation::Create => "creating",
            SyncOperation::Update => "updating",
            SyncOperation::Delete => "deleting",
            SyncOperation::Pause => "pausing",
            SyncOperation::Resume => "resuming",
            SyncOperation::Deploy => "deploying",
        };
        f.write_str(verb)
    }
}

// ============================================================================
// Bulk deploy failures
// ============================================================================

/// One failed reconciliation inside a bulk deploy.
#[derive(Debug)]
pub struct DeployFailure {
    pub connector: String,
    pub error: AppError,
}

/// Every failure of a bulk deploy, keyed by connector name, in completion order.
#[derive(Debug, Default)]
pub struct DeployErrors {
    failures: Vec<DeployFailure>,
}

impl DeployErrors {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, connector: impl Into<String>, error: AppError) {
        self.failures.push(DeployFailure {
            connector: connector.into(),
            error,
        });
    }

    pub fn is_empty(&self) -> bool {
        self.failures.is_empty()
    }

    pub fn len(&self) -> usize {
        self.failures.len()
    }

    pub fn failures(&self) -> &[DeployFailure] {
        &self.failures
    }

    /// Names of the connectors that failed, for reporting.
    pub fn connectors(&self) -> impl Iterator<Item = &str> {
        self.failures.iter().map(|f| f.connector.as_str())
    }

    /// `Ok(())` when nothing failed, otherwise the aggregate as an `AppError`.
    pub fn into_result(self) -> Result<(), AppError> {
        if self.is_empty() {
            Ok(())
        } else {
            Err(AppError::Deploy(self))
        }
    }
}

impl fmt::Display for DeployErrors {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let noun = if self.len() == 1 { "connector" } else { "connectors" };
        write!(f, "{} {} failed to deploy:", self.len(), noun)?;
        for failure in self.failures() {
            write!(
                f,
                "\n\t* error while deploying: {}: {}",
                failure.connector, failure.error
            )?;
        }
        Ok(())
    }
}
