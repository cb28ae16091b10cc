//! Error types for the LLM client.

use crate::config::ConfigError;
use thiserror::Error;

/// Result type for LLM operations.
pub type LlmResult<T> = Result<T, LlmError>;

/// Errors raised by LLM clients.
#[derive(Error, Debug)]
pub enum LlmError {
    #[error("configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("transport error: {0}")]
    Transport(#[from] reqwest::Error),

    #[error("rate limited by upstream (429)")]
    RateLimited,

    #[error("upstream error (status {status}): {message}")]
    Upstream { status: u16, message: String },

    #[error("invalid upstream response: {0}")]
    InvalidResponse(String),

    #[error("request timed out")]
    Timeout,

    #[error("request cancelled")]
    Cancelled,

    #[error("retries exhausted after {attempts} attempts: {last}")]
    RetriesExhausted { attempts: u32, last: String },
}

impl LlmError {
    /// Whether the error is transient and eligible for retry.
    ///
    /// Transport failures, 429, and 5xx are retryable; any other upstream
    /// status, timeouts, and cancellation are surfaced immediately.
    pub fn is_retryable(&self) -> bool {
        match self {
            LlmError::Transport(e) => !e.is_timeout(),
            LlmError::RateLimited => true,
            LlmError::Upstream { status, .. } => *status >= 500,
            _ => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn upstream_5xx_is_retryable() {
        let err = LlmError::Upstream {
            status: 503,
            message: "unavailable".to_string(),
        };
        assert!(err.is_retryable());
    }

    #[test]
    fn upstream_4xx_is_fatal() {
        let err = LlmError::Upstream {
            status: 400,
            message: "bad request".to_string(),
        };
        assert!(!err.is_retryable());
    }

    #[test]
    fn rate_limit_is_retryable() {
        assert!(LlmError::RateLimited.is_retryable());
    }

    #[test]
    fn timeout_and_cancel_are_fatal() {
        assert!(!LlmError::Timeout.is_retryable());
        assert!(!LlmError::Cancelled.is_retryable());
    }
}
