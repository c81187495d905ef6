//! Model error types with retry classification.
//!
//! Separates connection problems with the AlpyneServer (retried) from
//! errors the server reports about the model itself (surfaced as-is).

use std::time::Duration;

use crate::data::SimStatus;

/// Error from talking to an exported model through the AlpyneServer.
#[derive(Debug)]
pub struct ModelError {
    /// The kind of error
    pub kind: ModelErrorKind,
    /// HTTP status code, if applicable
    pub status_code: Option<u16>,
    /// Error message
    pub message: String,
    /// Request path the error was raised for, if any
    pub url: Option<String>,
}

impl ModelError {
    /// The app could not be started or did not answer its version endpoint.
    pub fn startup(message: impl Into<String>) -> Self {
        Self {
            kind: ModelErrorKind::Startup,
            status_code: None,
            message: message.into(),
            url: None,
        }
    }

    /// Create an error from a non-success HTTP response.
    pub fn http(status_code: u16, message: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            kind: classify_http_status(status_code),
            status_code: Some(status_code),
            message: message.into(),
            url: Some(url.into()),
        }
    }

    /// Create a network error (refused connection, reset, ...).
    pub fn network(message: impl Into<String>, url: impl Into<String>) -> Self {
        Self {
            kind: ModelErrorKind::Network,
            status_code: None,
            message: message.into(),
            url: Some(url.into()),
        }
    }

    /// The request exceeded its deadline; usually the model threw and the server hung.
    pub fn timeout(url: impl Into<String>) -> Self {
        Self {
            kind: ModelErrorKind::Timeout,
            status_code: None,
            message: "timeout|model exception (see alpyne.log)".to_string(),
            url: Some(url.into()),
        }
    }

    /// Create a parse error.
    pub fn parse(message: impl Into<String>) -> Self {
        Self {
            kind: ModelErrorKind::Parse,
            status_code: None,
            message: message.into(),
            url: None,
        }
    }

    /// The server refused a reset or action request.
    pub fn rejected(status_code: u16, message: impl Into<String>) -> Self {
        Self {
            kind: ModelErrorKind::Rejected,
            status_code: Some(status_code),
            message: message.into(),
            url: None,
        }
    }

    /// Check if this error is transient and the request should be retried.
    pub fn is_transient(&self) -> bool {
        self.kind.is_transient()
    }
}

impl std::fmt::Display for ModelError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match (self.status_code, &self.url) {
            (Some(code), Some(url)) => {
                write!(f, "{} (HTTP {}) at {}: {}", self.kind, code, url, self.message)
            }
            (Some(code), None) => write!(f, "{} (HTTP {}): {}", self.kind, code, self.message),
            (None, Some(url)) => write!(f, "{} at {}: {}", self.kind, url, self.message),
            (None, None) => write!(f, "{}: {}", self.kind, self.message),
        }
    }
}

impl std::error::Error for ModelError {}

/// Classification of model errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ModelErrorKind {
    /// App failed to start or answer
    Startup,
    /// Connection refused/reset - transient while the server boots
    Network,
    /// Request deadline exceeded
    Timeout,
    /// Server reported a failure (5xx), typically a model exception
    Server,
    /// Bad request against the model (4xx)
    Client,
    /// Reset or action was not accepted
    Rejected,
    /// Response body did not match the expected shape
    Parse,
}

impl ModelErrorKind {
    pub fn is_transient(&self) -> bool {
        matches!(self, ModelErrorKind::Network)
    }
}

impl std::fmt::Display for ModelErrorKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ModelErrorKind::Startup => write!(f, "Startup error"),
            ModelErrorKind::Network => write!(f, "Network error"),
            ModelErrorKind::Timeout => write!(f, "Timeout"),
            ModelErrorKind::Server => write!(f, "Model server error"),
            ModelErrorKind::Client => write!(f, "Model request error"),
            ModelErrorKind::Rejected => write!(f, "Request rejected"),
            ModelErrorKind::Parse => write!(f, "Parse error"),
        }
    }
}

/// Map an HTTP status code to an error kind.
pub fn classify_http_status(status: u16) -> ModelErrorKind {
    match status {
        408 => ModelErrorKind::Timeout,
        400..=499 => ModelErrorKind::Client,
        _ => ModelErrorKind::Server,
    }
}

/// Retry behaviour for requests to a server that may still be booting.
#[derive(Debug, Clone)]
pub struct RetryConfig {
    /// Maximum number of retry attempts after the first failure
    pub max_retries: u32,
    /// Fixed pause between attempts
    pub delay: Duration,
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_retries: 10,
            delay: Duration::from_millis(100),
        }
    }
}

impl RetryConfig {
    pub fn should_retry(&self, error: &ModelError, attempt: u32) -> bool {
        error.is_transient() && attempt < self.max_retries
    }
}

/// Raised when a lock request expires before the engine reaches a wanted state.
#[derive(Debug, thiserror::Error)]
#[error("Failed to reach any of '{wanted}' before timeout ({timeout_secs}s). Current status: {status}")]
pub struct LockTimeout {
    pub wanted: String,
    pub timeout_secs: u64,
    pub status: Box<SimStatus>,
}
