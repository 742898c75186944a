use std::io;
use thiserror::Error;

use crate::protocol::{CodecError, ErrorKind, ServerMessage};
use crate::timecode::TimecodeError;

/// Fatal server-level errors.
#[derive(Debug, Error)]
pub enum ServerError {
    /// The listener could not bind the configured address
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// The address that could not be bound
        addr: String,
        /// The underlying bind failure
        #[source]
        source: io::Error,
    },

    /// Network I/O failure outside any single connection
    #[error("network error: {0}")]
    Io(#[from] io::Error),
}

/// Result type alias for server operations.
pub type Result<T> = std::result::Result<T, ServerError>;

/// A request-level fault, reported to the client as an `error` message
/// while the connection stays open (except `MessageTooLarge`).
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{kind:?}: {message}")]
pub struct RequestError {
    /// Stable wire error class
    pub kind: ErrorKind,
    /// Human-readable detail
    pub message: String,
}

impl RequestError {
    /// Build an error of the given class.
    #[must_use]
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
        }
    }

    /// The client is not a member of any session.
    #[must_use]
    pub fn not_in_session() -> Self {
        Self::new(ErrorKind::NotInSession, "not in a session")
    }

    /// No session exists under the given id.
    #[must_use]
    pub fn session_not_found(session_id: &str) -> Self {
        Self::new(
            ErrorKind::SessionNotFound,
            format!("session not found: {session_id}"),
        )
    }

    /// The framerate key is not in the supported set.
    #[must_use]
    pub fn unknown_framerate(key: &str) -> Self {
        Self::new(
            ErrorKind::UnknownFramerate,
            format!("unsupported framerate: {key}"),
        )
    }

    /// The wire `error` message for this fault.
    #[must_use]
    pub fn to_message(&self) -> ServerMessage {
        ServerMessage::Error {
            kind: self.kind,
            message: self.message.clone(),
        }
    }
}

impl From<TimecodeError> for RequestError {
    fn from(err: TimecodeError) -> Self {
        Self::new(ErrorKind::InvalidTimecode, err.to_string())
    }
}

impl From<CodecError> for RequestError {
    fn from(err: CodecError) -> Self {
        Self::new(err.kind(), err.to_string())
    }
}
