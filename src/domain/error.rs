// Error taxonomy for store access and caller input validation
use thiserror::Error;

/// Failure kinds surfaced by the query engine. Timeout and
/// ConnectionUnavailable are the only retried causes; they carry the number
/// of attempts made before giving up.
#[derive(Debug, Error)]
pub enum TelemetryError {
    #[error("store query timed out after {attempts} attempt(s)")]
    Timeout { attempts: u32 },

    #[error("store unreachable after {attempts} attempt(s): {message}")]
    ConnectionUnavailable { attempts: u32, message: String },

    #[error("store rejected credentials: {0}")]
    AuthenticationFailed(String),

    #[error("not found: {0}")]
    ResourceNotFound(String),

    #[error("store rejected query as malformed: {0}")]
    QuerySyntaxInvalid(String),

    #[error("invalid time range: {0}")]
    InvalidRange(String),

    #[error("unexpected store failure: {0}")]
    Unknown(String),
}

pub type TelemetryResult<T> = Result<T, TelemetryError>;
