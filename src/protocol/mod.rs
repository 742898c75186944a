//! Wire protocol: line-delimited JSON framing and message schema
//!
//! One JSON object per `\n`-terminated UTF-8 line; a `\r` before the `\n`
//! is tolerated. Requests and server messages are internally tagged on a
//! `type` field, so decoding is a tagged-variant parse and dispatch is an
//! exhaustive `match`.

use bytes::BytesMut;
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Default maximum accepted line length (64 KiB).
pub const DEFAULT_MAX_LINE_LEN: usize = 64 * 1024;

/// Requests a client may send.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum Request {
    /// Create a session and auto-join it
    CreateSession {
        /// Framerate key from the supported set
        framerate: String,
        /// Starting timecode, defaults to `00:00:00:00`
        #[serde(default, skip_serializing_if = "Option::is_none")]
        initial_timecode: Option<String>,
    },
    /// Join an existing session, leaving any prior one
    JoinSession {
        /// Target session id
        session_id: String,
    },
    /// Leave the current session
    LeaveSession,
    /// Start the current session's ticker
    StartTimecode,
    /// Stop the current session's ticker
    StopTimecode,
    /// Set the current session's timecode
    ResetTimecode {
        /// New timecode, defaults to `00:00:00:00`
        #[serde(default, skip_serializing_if = "Option::is_none")]
        timecode: Option<String>,
    },
}

/// Messages the server sends.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ServerMessage {
    /// First message on every connection
    Welcome {
        /// Id assigned to this client
        client_id: String,
        /// Framerate keys the server accepts
        supported_framerates: Vec<String>,
    },
    /// Reply to `create_session`
    SessionCreated {
        /// Id of the new session
        session_id: String,
        /// Its framerate key
        framerate: String,
        /// Its starting timecode
        timecode: String,
    },
    /// Membership confirmation, carrying current session state
    SessionJoined {
        /// Id of the joined session
        session_id: String,
        /// Its framerate key
        framerate: String,
        /// Its current timecode
        timecode: String,
        /// Whether its ticker is running
        running: bool,
    },
    /// Final session-scoped message after leaving
    SessionLeft {
        /// Id of the session that was left
        session_id: String,
    },
    /// Broadcast when the ticker starts
    TimecodeStarted {
        /// Timecode at start
        timecode: String,
    },
    /// Broadcast when the ticker stops
    TimecodeStopped {
        /// Final timecode
        timecode: String,
    },
    /// Broadcast when the session timecode is reset
    TimecodeReset {
        /// The new timecode
        timecode: String,
    },
    /// One tick
    TimecodeUpdate {
        /// The current timecode
        timecode: String,
    },
    /// The server is shutting down
    ServerShutdown,
    /// A request failed
    Error {
        /// Stable error class
        kind: ErrorKind,
        /// Human-readable detail
        message: String,
    },
}

/// Stable error classes reported in [`ServerMessage::Error`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum ErrorKind {
    /// Malformed JSON or schema violation
    BadRequest,
    /// Framerate key not in the supported set
    UnknownFramerate,
    /// Timecode parse failed or named a dropped frame
    InvalidTimecode,
    /// `join_session` for an unknown id
    SessionNotFound,
    /// Session-control request without membership
    NotInSession,
    /// Line exceeded the size limit; the connection is closed
    MessageTooLarge,
    /// Unexpected server fault
    InternalError,
}

/// Errors from the line codec.
#[derive(Debug, Error)]
pub enum CodecError {
    /// A line exceeded the configured maximum
    #[error("line exceeds {max} bytes")]
    LineTooLong {
        /// The configured limit
        max: usize,
    },

    /// The line was not a valid request object
    #[error("invalid request: {0}")]
    Invalid(String),
}

impl CodecError {
    /// The wire error class this codec failure maps to.
    #[must_use]
    pub fn kind(&self) -> ErrorKind {
        match self {
            CodecError::LineTooLong { .. } => ErrorKind::MessageTooLarge,
            CodecError::Invalid(_) => ErrorKind::BadRequest,
        }
    }
}

/// Sans-IO decoder for newline-framed requests.
///
/// Feed raw bytes with [`feed`](LineCodec::feed), then drain complete
/// requests with [`decode`](LineCodec::decode) until it returns `None`.
#[derive(Debug)]
pub struct LineCodec {
    buffer: BytesMut,
    max_line: usize,
}

impl LineCodec {
    /// Codec with the default 64 KiB line limit.
    #[must_use]
    pub fn new() -> Self {
        Self::with_max_line(DEFAULT_MAX_LINE_LEN)
    }

    /// Codec with a custom line limit.
    #[must_use]
    pub fn with_max_line(max_line: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(4096),
            max_line,
        }
    }

    /// Append received bytes.
    pub fn feed(&mut self, bytes: &[u8]) {
        self.buffer.extend_from_slice(bytes);
    }

    /// Try to decode the next complete request.
    ///
    /// Returns `Ok(None)` when more bytes are needed. Blank lines are
    /// skipped. The offending line is consumed on `Invalid`, so the
    /// connection may keep the codec after replying with an error.
    ///
    /// # Errors
    /// [`CodecError::LineTooLong`] once the unterminated line passes the
    /// limit; [`CodecError::Invalid`] for lines that are not a valid
    /// request object.
    pub fn decode(&mut self) -> Result<Option<Request>, CodecError> {
        loop {
            let Some(end) = self.buffer.iter().position(|&b| b == b'\n') else {
                if self.buffer.len() > self.max_line {
                    return Err(CodecError::LineTooLong { max: self.max_line });
                }
                return Ok(None);
            };

            if end > self.max_line {
                return Err(CodecError::LineTooLong { max: self.max_line });
            }

            let mut line = self.buffer.split_to(end + 1);
            line.truncate(end);
            if line.last() == Some(&b'\r') {
                line.truncate(line.len() - 1);
            }
            if line.is_empty() {
                continue;
            }

            let text = std::str::from_utf8(&line)
                .map_err(|_| CodecError::Invalid("not valid UTF-8".to_string()))?;
            return serde_json::from_str(text)
                .map(Some)
                .map_err(|e| CodecError::Invalid(e.to_string()));
        }
    }

    /// Bytes currently buffered (for tests and diagnostics).
    #[must_use]
    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }
}

impl Default for LineCodec {
    fn default() -> Self {
        Self::new()
    }
}

/// Encode a server message as one compact JSON line.
#[must_use]
pub fn encode(message: &ServerMessage) -> String {
    // Compact serde_json output never contains a raw newline.
    let mut line = serde_json::to_string(message)
        .unwrap_or_else(|_| r#"{"type":"error","kind":"InternalError","message":"encode failed"}"#.to_string());
    line.push('\n');
    line
}
