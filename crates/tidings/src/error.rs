//! Error types for dispatch and waiting

use std::time::Duration;

use thiserror::Error;

use crate::key::EventKey;

/// Errors surfaced by [`Dispatcher`](crate::Dispatcher) operations
#[derive(Debug, Error)]
pub enum DispatchError {
    /// `wait_for` saw no matching event before its deadline
    #[error("Wait timed out after {0:?}")]
    Timeout(Duration),

    /// The cancellation token of a `wait_for` fired
    #[error("Wait aborted")]
    Aborted,

    /// A handler returned an error while an event was dispatched
    #[error("Handler for '{key}' failed: {source}")]
    Handler {
        key: EventKey,
        #[source]
        source: anyhow::Error,
    },

    /// A `wait_for` filter returned an error
    #[error("Wait filter failed: {0}")]
    Filter(#[source] anyhow::Error),

    /// Invalid configuration
    #[error("Invalid configuration: {0}")]
    Config(String),
}

impl DispatchError {
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::Timeout(_))
    }

    pub fn is_aborted(&self) -> bool {
        matches!(self, Self::Aborted)
    }

    /// Get the underlying handler error, if this is a handler failure.
    pub fn handler_source(&self) -> Option<&anyhow::Error> {
        match self {
            Self::Handler { source, .. } => Some(source),
            _ => None,
        }
    }
}

/// Result type for dispatch operations
pub type DispatchResult<T> = Result<T, DispatchError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handler_error_display() {
        let err = DispatchError::Handler {
            key: EventKey::from("user.created"),
            source: anyhow::anyhow!("boom"),
        };
        assert_eq!(err.to_string(), "Handler for 'user.created' failed: boom");
        assert_eq!(err.handler_source().map(|e| e.to_string()), Some("boom".into()));
    }

    #[test]
    fn test_kind_predicates() {
        assert!(DispatchError::Timeout(Duration::from_millis(50)).is_timeout());
        assert!(DispatchError::Aborted.is_aborted());
        assert!(!DispatchError::Config("bad".into()).is_timeout());
    }
}
