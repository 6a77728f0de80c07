//! Dispatch error types.

use adu_queue::QueueError;
use thiserror::Error;

use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum DispatchError {
    /// Endpoint reference missing from the registry or unresolvable at dispatch time.
    #[error("configuration error: {0}")]
    Configuration(String),

    /// Transport failure or non-success status from the external system.
    #[error("delivery failed: {0}")]
    Delivery(String),

    /// Success status, but the body did not carry an external id.
    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("queue error: {0}")]
    Queue(#[from] QueueError),

    #[error("registry nesting exceeds {max} levels")]
    DepthExceeded { max: usize },

    #[error("unknown system: {0}")]
    UnknownSystem(String),

    #[error("artifact error: {0}")]
    Artifact(String),
}

impl DispatchError {
    /// Whether the failed attempt should go through the node's retry policy.
    pub fn is_retryable(&self) -> bool {
        match self {
            // The submission was rolled back; nothing left to deliver for.
            Self::Store(StoreError::NotFound(_)) => false,
            Self::Delivery(_)
            | Self::MalformedResponse(_)
            | Self::Store(_)
            | Self::Queue(_)
            | Self::Artifact(_) => true,
            Self::Configuration(_) | Self::DepthExceeded { .. } | Self::UnknownSystem(_) => false,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn configuration_errors_are_not_retried() {
        assert!(!DispatchError::Configuration("DBI_SYSTEM_URL".into()).is_retryable());
        assert!(!DispatchError::DepthExceeded { max: 8 }.is_retryable());
        assert!(!DispatchError::UnknownSystem("x".into()).is_retryable());
        assert!(!DispatchError::Store(StoreError::NotFound(1)).is_retryable());
    }

    #[test]
    fn delivery_errors_are_retried() {
        assert!(DispatchError::Delivery("status 503".into()).is_retryable());
        assert!(DispatchError::MalformedResponse("no data.id".into()).is_retryable());
        assert!(DispatchError::Store(StoreError::Backend("timeout".into())).is_retryable());
    }
}
