use thiserror::Error;

/// Custom error types for the traffic guard
#[derive(Error, Debug)]
pub enum GuardError {
    /// Configuration related errors
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    /// Redis related errors
    #[error("Redis error: {0}")]
    Redis(#[from] redis::RedisError),

    /// Reverse DNS lookup errors. Only ever seen inside the crawler
    /// classifier, which turns them into a negative match.
    #[error("DNS error: {0}")]
    Dns(String),

    /// Invalid request errors
    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    /// Internal server errors
    #[error("Internal server error: {0}")]
    Internal(String),
}

/// Result type for traffic guard operations
pub type GuardResult<T> = Result<T, GuardError>;

impl From<hickory_resolver::ResolveError> for GuardError {
    fn from(err: hickory_resolver::ResolveError) -> Self {
        GuardError::Dns(err.to_string())
    }
}
