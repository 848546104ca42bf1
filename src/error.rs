//! # Receiver Error Types
//!
//! Structured error handling for the persistent receiver using thiserror.
//!
//! Two families matter to callers: [`ReceiverError::IllegalState`] when an
//! operation is attempted in the wrong lifecycle phase, and
//! [`ReceiverError::Client`] when the native transport rejected an operation.
//! A `receive_message` timeout is not an error; it yields `Ok(None)`.

use crate::messaging::transport::{SubCode, TransportError};
use crate::state_machine::LifecycleState;
use thiserror::Error;

/// Comprehensive receiver error types
#[derive(Error, Debug, Clone, PartialEq)]
pub enum ReceiverError {
    #[error("Illegal state: cannot {operation} while receiver is {state}")]
    IllegalState {
        operation: String,
        state: LifecycleState,
    },

    #[error("Client error: {operation} failed for [{identifier}]: {message} (sub code: {sub_code})")]
    Client {
        operation: String,
        identifier: String,
        sub_code: SubCode,
        message: String,
    },

    #[error("Configuration error: {component}: {message}")]
    Configuration { component: String, message: String },

    #[error("Internal receiver error: {message}")]
    Internal { message: String },
}

impl ReceiverError {
    /// Create an illegal state error
    pub fn illegal_state(operation: impl Into<String>, state: LifecycleState) -> Self {
        Self::IllegalState {
            operation: operation.into(),
            state,
        }
    }

    /// Create a client error from a rejected native operation
    pub fn client(
        operation: impl Into<String>,
        identifier: impl Into<String>,
        error: TransportError,
    ) -> Self {
        Self::Client {
            operation: operation.into(),
            identifier: identifier.into(),
            sub_code: error.sub_code,
            message: error.message,
        }
    }

    /// Create a configuration error
    pub fn configuration(component: impl Into<String>, message: impl Into<String>) -> Self {
        Self::Configuration {
            component: component.into(),
            message: message.into(),
        }
    }

    /// Create an internal error
    pub fn internal(message: impl Into<String>) -> Self {
        Self::Internal {
            message: message.into(),
        }
    }

    pub fn is_illegal_state(&self) -> bool {
        matches!(self, Self::IllegalState { .. })
    }

    pub fn is_client_error(&self) -> bool {
        matches!(self, Self::Client { .. })
    }

    /// Native sub code carried by a client error
    pub fn sub_code(&self) -> Option<SubCode> {
        match self {
            Self::Client { sub_code, .. } => Some(*sub_code),
            _ => None,
        }
    }
}

impl From<config::ConfigError> for ReceiverError {
    fn from(err: config::ConfigError) -> Self {
        ReceiverError::configuration("config", err.to_string())
    }
}

impl From<TransportError> for ReceiverError {
    fn from(err: TransportError) -> Self {
        ReceiverError::client("transport", "unknown", err)
    }
}

/// Result type alias for receiver operations
pub type ReceiverResult<T> = Result<T, ReceiverError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_receiver_error_creation() {
        let err = ReceiverError::illegal_state("acknowledge", LifecycleState::NotStarted);
        assert!(err.is_illegal_state());
        assert!(!err.is_client_error());
        assert_eq!(err.sub_code(), None);

        let err = ReceiverError::client(
            "subscribe",
            "orders/>",
            TransportError::new(SubCode::SubscriptionAlreadyPresent, "duplicate"),
        );
        assert!(err.is_client_error());
        assert_eq!(err.sub_code(), Some(SubCode::SubscriptionAlreadyPresent));
    }

    #[test]
    fn test_error_display() {
        let err = ReceiverError::illegal_state("add subscription", LifecycleState::Terminating);
        let display_str = format!("{err}");
        assert!(display_str.contains("add subscription"));
        assert!(display_str.contains("terminating"));

        let err = ReceiverError::client(
            "acknowledge",
            "42",
            TransportError::new(SubCode::InvalidFlow, "flow is gone"),
        );
        let display_str = format!("{err}");
        assert!(display_str.contains("acknowledge"));
        assert!(display_str.contains("[42]"));
        assert!(display_str.contains("flow is gone"));
    }

    #[test]
    fn test_transport_error_conversion() {
        let err: ReceiverError = TransportError::new(SubCode::NotConnected, "down").into();
        assert_eq!(err.sub_code(), Some(SubCode::NotConnected));
    }
}
