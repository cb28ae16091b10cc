//! Error types for the message bus.

use thiserror::Error;

/// Result type for bus operations.
pub type BusResult<T> = Result<T, BusError>;

/// Errors raised by the message bus.
#[derive(Error, Debug)]
pub enum BusError {
    #[error("receiver '{0}' is not registered")]
    UnknownReceiver(String),

    #[error("agent '{0}' is not registered")]
    UnknownAgent(String),

    #[error("agent '{0}' is already registered")]
    DuplicateAgent(String),

    #[error("message has no receiver")]
    MissingReceiver,

    #[error("inbox for '{receiver}' is full")]
    Backpressure { receiver: String },

    #[error("request timed out waiting for a reply")]
    Timeout,
}

impl BusError {
    /// Whether a retry of the same send could succeed.
    ///
    /// Backpressure clears as the receiver drains its inbox; an unknown
    /// receiver does not.
    pub fn is_retryable(&self) -> bool {
        matches!(self, BusError::Backpressure { .. })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn retryable_classification() {
        assert!(BusError::Backpressure {
            receiver: "a".to_string()
        }
        .is_retryable());
        assert!(!BusError::UnknownReceiver("a".to_string()).is_retryable());
        assert!(!BusError::Timeout.is_retryable());
    }
}
