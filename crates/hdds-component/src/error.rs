// SPDX-License-Identifier: Apache-2.0 OR MIT
// Copyright (c) 2025-2026 naskel.com

//! Error types for the component runtime.

use crate::config::ConfigError;
use thiserror::Error;

/// Result type for component operations.
pub type ComponentResult<T> = Result<T, ComponentError>;

/// Errors raised by a duplex stream half.
#[derive(Debug, Error)]
pub enum TransportError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Protocol error: {0}")]
    Protocol(String),

    /// The peer half of the stream is gone.
    #[error("Stream closed")]
    Closed,
}

/// Errors surfaced by dispatch, the ack loop, the multiplexer and the service layer.
#[derive(Debug, Error)]
pub enum ComponentError {
    /// The caller's context ended before the consumer acknowledged the message.
    #[error("ack has timed out")]
    AckTimeout,

    /// No pending acknowledgement exists for this id (late, duplicate or unknown ack).
    #[error("message {0} not found or not specified")]
    MessageNotFound(String),

    #[error("error when sending message {message_id}: {source}")]
    SendFailed {
        message_id: String,
        #[source]
        source: TransportError,
    },

    /// Error reported by the consumer inside the acknowledgement.
    #[error("{0}")]
    Remote(String),

    #[error("ack channel for message {0} closed without a result")]
    AckChannelClosed(String),

    #[error("Transport error: {0}")]
    Transport(#[from] TransportError),

    #[error("operation cancelled")]
    Cancelled,

    #[error("failed to create instance '{key}': {reason}")]
    Construction { key: String, reason: String },

    #[error("at least one component service should be defined")]
    NoComponents,

    #[error("no components were registered")]
    NothingRegistered,

    #[error("component does not implement {0}")]
    Unsupported(String),

    #[error("Server already running")]
    AlreadyRunning,

    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Error returned by a component implementation.
    #[error("{0}")]
    Component(String),
}

impl ComponentError {
    /// Create an error from a component implementation message.
    pub fn component(message: impl Into<String>) -> Self {
        Self::Component(message.into())
    }

    /// True when the error only means the local wait was abandoned.
    pub fn is_timeout(&self) -> bool {
        matches!(self, Self::AckTimeout)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_remote_error_display_is_verbatim() {
        let err = ComponentError::Remote("boom".into());
        assert_eq!(err.to_string(), "boom");
    }

    #[test]
    fn test_send_failed_keeps_message_id_and_source() {
        let err = ComponentError::SendFailed {
            message_id: "m1".into(),
            source: TransportError::Closed,
        };
        assert!(err.to_string().contains("m1"));
        assert!(std::error::Error::source(&err).is_some());
    }

    #[test]
    fn test_transport_error_display() {
        let err = TransportError::Protocol("invalid".into());
        assert!(err.to_string().contains("Protocol"));

        let err: ComponentError = TransportError::Closed.into();
        assert!(matches!(err, ComponentError::Transport(TransportError::Closed)));
    }

    #[test]
    fn test_is_timeout() {
        assert!(ComponentError::AckTimeout.is_timeout());
        assert!(!ComponentError::Cancelled.is_timeout());
    }
}
