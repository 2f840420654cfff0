//! Error types for the Lambda integration layer.

use thiserror::Error;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised while adapting events, talking to AWS or running handlers.
#[derive(Error, Debug)]
pub enum Error {
    /// A required field (header, environment value, event attribute) was absent
    #[error("Missing field: {0}")]
    MissingField(String),

    /// Operation the underlying service cannot provide
    #[error("Operation not supported: {0}")]
    Unsupported(String),

    /// Trigger payload did not match the expected event shape
    #[error("Invalid event: {0}")]
    InvalidEvent(String),

    /// Request or response body could not be decoded
    #[error("Invalid body: {0}")]
    InvalidBody(String),

    /// Validation error
    #[error("Validation error: {0}")]
    Validation(String),

    /// Not found error
    #[error("Not found: {0}")]
    NotFound(String),

    /// AWS SDK error
    #[error("AWS error: {0}")]
    Aws(String),

    /// Configuration error
    #[error("Configuration error: {0}")]
    Config(String),

    /// Request signing error
    #[error("Signing error: {0}")]
    Signing(String),

    /// Database error
    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    /// Serialization error
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// DynamoDB attribute conversion error
    #[error("DynamoDB conversion error: {0}")]
    Dynamo(#[from] serde_dynamo::Error),

    /// Failure raised by an application handler
    #[error("Handler error: {0:#}")]
    Handler(#[from] anyhow::Error),
}

impl Error {
    /// Get HTTP status code for this error.
    pub fn status_code(&self) -> u16 {
        match self {
            Error::MissingField(_)
            | Error::InvalidEvent(_)
            | Error::InvalidBody(_)
            | Error::Validation(_) => 400,
            Error::NotFound(_) => 404,
            Error::Unsupported(_) => 501,
            _ => 500,
        }
    }
}
