use std::fmt;

/// Custom error types for Helmsman
#[derive(Debug, Clone)]
pub enum HelmsmanError {
    /// Configuration related errors
    Config(String),
    /// Malformed request / missing required fields
    Validation(String),
    /// Unknown id
    NotFound(String),
    /// Placement failures from the scheduler
    Scheduling(String),
    /// Database/Store errors
    Database(String),
    /// Transport errors between manager and agents
    Network(String),
    /// Host integration errors (executors, collectors, filesystem)
    System(String),
    /// General internal errors
    Internal(String),
}

impl fmt::Display for HelmsmanError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HelmsmanError::Config(msg) => write!(f, "Configuration error: {}", msg),
            HelmsmanError::Validation(msg) => write!(f, "{}", msg),
            HelmsmanError::NotFound(msg) => write!(f, "{}", msg),
            HelmsmanError::Scheduling(msg) => write!(f, "{}", msg),
            HelmsmanError::Database(msg) => write!(f, "Database error: {}", msg),
            HelmsmanError::Network(msg) => write!(f, "Network error: {}", msg),
            HelmsmanError::System(msg) => write!(f, "System error: {}", msg),
            HelmsmanError::Internal(msg) => write!(f, "Internal error: {}", msg),
        }
    }
}

impl std::error::Error for HelmsmanError {}

impl From<sqlx::Error> for HelmsmanError {
    fn from(err: sqlx::Error) -> Self {
        HelmsmanError::Database(err.to_string())
    }
}

impl From<reqwest::Error> for HelmsmanError {
    fn from(err: reqwest::Error) -> Self {
        HelmsmanError::Network(err.to_string())
    }
}

impl From<serde_json::Error> for HelmsmanError {
    fn from(err: serde_json::Error) -> Self {
        HelmsmanError::Internal(format!("JSON parsing error: {}", err))
    }
}

impl From<std::io::Error> for HelmsmanError {
    fn from(err: std::io::Error) -> Self {
        HelmsmanError::System(format!("IO error: {}", err))
    }
}

/// Result type alias for Helmsman operations
pub type HelmsmanResult<T> = Result<T, HelmsmanError>;
