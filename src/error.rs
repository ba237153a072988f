//! Error types for the session and channel layers.
//!
//! The protocol core never fails: malformed frames degrade to the plain-text
//! fallback and offset mismatches are answered on the wire. Errors exist
//! only at the seams (the transport channel and the session task) and all
//! implement `std::error::Error` with structured context.
//!
//! ```rust
//! use restitch::ProtocolError;
//!
//! let error = ProtocolError::channel_error("socket reset by peer");
//! if error.is_retryable() {
//!     println!("transient: {error}");
//! }
//! ```

use std::time::Duration;
use thiserror::Error;

/// Result type alias for session and channel operations.
pub type Result<T, E = ProtocolError> = std::result::Result<T, E>;

/// Errors surfaced by the channel collaborator or the session task.
#[derive(Error, Debug)]
#[non_exhaustive]
pub enum ProtocolError {
    #[error("channel receive failed: {reason}")]
    Channel {
        reason: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("failed to send frame {frame:?}")]
    Send {
        frame: String,
        #[source]
        source: Option<Box<dyn std::error::Error + Send + Sync>>,
    },

    #[error("operation timed out after {duration:?}")]
    Timeout { duration: Duration },

    #[error("session task is no longer running")]
    SessionClosed,
}

impl ProtocolError {
    /// Whether the operation may succeed if simply tried again.
    pub fn is_retryable(&self) -> bool {
        match self {
            ProtocolError::Channel { .. } => true,
            ProtocolError::Send { .. } => true,
            ProtocolError::Timeout { .. } => true,
            ProtocolError::SessionClosed => false,
        }
    }

    /// Helper constructor for channel receive errors.
    pub fn channel_error(reason: impl Into<String>) -> Self {
        ProtocolError::Channel { reason: reason.into(), source: None }
    }

    /// Helper constructor for channel receive errors with a source.
    pub fn channel_error_with_source(
        reason: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        ProtocolError::Channel { reason: reason.into(), source: Some(source) }
    }

    /// Helper constructor for send errors.
    pub fn send_error(frame: impl Into<String>) -> Self {
        ProtocolError::Send { frame: frame.into(), source: None }
    }

    /// Helper constructor for send errors with a source.
    pub fn send_error_with_source(
        frame: impl Into<String>,
        source: Box<dyn std::error::Error + Send + Sync>,
    ) -> Self {
        ProtocolError::Send { frame: frame.into(), source: Some(source) }
    }
}

impl From<std::io::Error> for ProtocolError {
    fn from(err: std::io::Error) -> Self {
        ProtocolError::Channel { reason: err.to_string(), source: Some(Box::new(err)) }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn error_traits_validation() {
        // Compile-time check: ProtocolError must be Send + Sync + 'static
        fn assert_send_sync_static<T: Send + Sync + 'static>() {}
        assert_send_sync_static::<ProtocolError>();

        let error = ProtocolError::channel_error("test");
        let _: &dyn std::error::Error = &error;
    }

    #[test]
    fn retryable_classification() {
        assert!(ProtocolError::channel_error("reset").is_retryable());
        assert!(ProtocolError::send_error("<INDEX:5>").is_retryable());
        assert!(ProtocolError::Timeout { duration: Duration::from_secs(1) }.is_retryable());
        assert!(!ProtocolError::SessionClosed.is_retryable());
    }

    #[test]
    fn io_errors_convert_with_source_preserved() {
        let io_err = std::io::Error::new(std::io::ErrorKind::ConnectionReset, "reset by peer");
        let converted: ProtocolError = io_err.into();
        match converted {
            ProtocolError::Channel { reason, source } => {
                assert_eq!(reason, "reset by peer");
                assert!(source.is_some());
            }
            other => panic!("expected Channel variant, got {other:?}"),
        }
    }

    mod property_tests {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #[test]
            fn error_messages_contain_their_context(reason in ".*", frame in ".*") {
                let channel = ProtocolError::channel_error(reason.clone());
                prop_assert!(channel.to_string().contains(&reason));

                let send = ProtocolError::send_error(frame.clone());
                prop_assert!(!send.to_string().is_empty());
            }

            #[test]
            fn source_chains_are_traversable(reason in ".*", base in ".*") {
                let io_err = std::io::Error::other(base.clone());
                let error = ProtocolError::channel_error_with_source(reason, Box::new(io_err));

                let source = std::error::Error::source(&error)
                    .expect("channel error with source must chain");
                prop_assert_eq!(source.to_string(), base);
            }
        }
    }
}
