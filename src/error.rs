//! Error types for the orchestration core

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Application error type
#[derive(Debug, Error)]
pub enum AppError {
    #[error("Configuration error: {0}")]
    Config(#[from] config::ConfigError),

    #[error("Invalid request: {0}")]
    InvalidRequest(String),

    #[error("Provider not found: {0}")]
    ProviderNotFound(String),

    #[error("Task not found: {0}")]
    TaskNotFound(String),

    #[error("HTTP client error: {0}")]
    HttpClient(#[from] reqwest::Error),

    #[error("Internal error: {0}")]
    Internal(String),
}

/// Result type alias using AppError
pub type Result<T> = std::result::Result<T, AppError>;

/// Stable machine-readable error codes surfaced to callers.
///
/// The HTTP layer maps these to user-facing messages; it must never have to
/// string-match on prose.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorCode {
    /// Missing or malformed credentials/configuration
    InvalidConfig,
    /// Request violates a declared capability or is structurally invalid
    InvalidRequest,
    /// An input image exceeds the provider's declared byte-size limit
    ImageTooLarge,
    /// Outbound call exceeded its timeout
    Timeout,
    /// Backend rejected the call due to rate limiting
    RateLimited,
    /// Account quota or billing limit reached
    QuotaExceeded,
    /// Backend refused the content on policy grounds
    ContentPolicy,
    /// Transient backend failure (5xx, transport error)
    BackendError,
    /// Task was cancelled before completion
    Cancelled,
    /// Unexpected internal fault
    Internal,
}

impl ErrorCode {
    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorCode::InvalidConfig => "invalid_config",
            ErrorCode::InvalidRequest => "invalid_request",
            ErrorCode::ImageTooLarge => "image_too_large",
            ErrorCode::Timeout => "timeout",
            ErrorCode::RateLimited => "rate_limited",
            ErrorCode::QuotaExceeded => "quota_exceeded",
            ErrorCode::ContentPolicy => "content_policy",
            ErrorCode::BackendError => "backend_error",
            ErrorCode::Cancelled => "cancelled",
            ErrorCode::Internal => "internal",
        }
    }

    /// Whether a failure with this code may succeed on a later attempt
    /// with the same input.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ErrorCode::Timeout | ErrorCode::RateLimited | ErrorCode::BackendError
        )
    }
}

impl std::fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A classified failure from one model-variant attempt.
#[derive(Debug, Clone)]
pub struct ProviderError {
    pub code: ErrorCode,
    pub message: String,
}

impl ProviderError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
        }
    }

    /// Classify an HTTP error response from a generation backend.
    pub fn from_status(status: u16, body: &str) -> Self {
        let lower = body.to_lowercase();
        let code = match status {
            429 => {
                if lower.contains("quota") || lower.contains("billing") {
                    ErrorCode::QuotaExceeded
                } else {
                    ErrorCode::RateLimited
                }
            }
            400 | 422 if lower.contains("safety")
                || lower.contains("policy")
                || lower.contains("blocked") =>
            {
                ErrorCode::ContentPolicy
            }
            400 | 404 | 422 => ErrorCode::InvalidRequest,
            401 | 403 => ErrorCode::InvalidConfig,
            408 => ErrorCode::Timeout,
            _ => ErrorCode::BackendError,
        };

        Self::new(code, format!("backend returned {}: {}", status, truncate(body, 300)))
    }
}

impl From<reqwest::Error> for ProviderError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::new(ErrorCode::Timeout, format!("request timed out: {}", e))
        } else {
            Self::new(ErrorCode::BackendError, format!("request failed: {}", e))
        }
    }
}

impl std::fmt::Display for ProviderError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for ProviderError {}

fn truncate(s: &str, max: usize) -> &str {
    match s.char_indices().nth(max) {
        Some((idx, _)) => &s[..idx],
        None => s,
    }
}
