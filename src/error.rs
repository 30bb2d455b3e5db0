//! Error types for the AGI engine

use thiserror::Error;

/// Result type alias using AgiError
pub type AgiResult<T> = Result<T, AgiError>;

/// Errors surfaced by the protocol engine, the server and the command wrappers
#[derive(Debug, Error)]
#[non_exhaustive]
pub enum AgiError {
    /// Socket read or write failed
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// The connection went away before the operation could complete
    #[error("connection closed")]
    ConnectionClosed,

    /// The channel is already disconnected
    #[error("channel is not connected")]
    NotConnected,

    /// No reply arrived within the configured command timeout
    #[error("no reply within {timeout_ms}ms")]
    Timeout { timeout_ms: u64 },

    /// Framing or encoding violation
    #[error("protocol error: {message}")]
    ProtocolError { message: String },

    /// A command wrapper got a reply outside the set it accepts
    #[error("{message}")]
    CommandFailed {
        message: String,
        code: Option<u16>,
        result: i64,
    },

    /// An event subscriber fell behind and events were dropped
    #[error("event queue full, {dropped} events dropped")]
    QueueFull { dropped: u64 },

    /// A status variable held a value with no typed counterpart
    #[error("unknown {kind}: {value}")]
    UnknownStatus { kind: &'static str, value: String },
}

impl AgiError {
    pub(crate) fn protocol_error(message: impl Into<String>) -> Self {
        AgiError::ProtocolError {
            message: message.into(),
        }
    }

    pub(crate) fn command_failed(message: impl Into<String>, code: Option<u16>, result: i64) -> Self {
        AgiError::CommandFailed {
            message: message.into(),
            code,
            result,
        }
    }

    /// `true` when the error means the call's socket is gone.
    pub fn is_disconnect(&self) -> bool {
        matches!(
            self,
            AgiError::ConnectionClosed | AgiError::NotConnected | AgiError::Io(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn command_failed_displays_operation_message() {
        let err = AgiError::command_failed("Could not answer call", Some(200), -1);
        assert_eq!(err.to_string(), "Could not answer call");
        assert!(!err.is_disconnect());
    }

    #[test]
    fn io_errors_count_as_disconnect() {
        let err: AgiError = std::io::Error::new(std::io::ErrorKind::BrokenPipe, "gone").into();
        assert!(err.is_disconnect());
        assert!(AgiError::ConnectionClosed.is_disconnect());
    }
}
