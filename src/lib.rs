//! # smptesync
//!
//! A SMPTE timecode synchronization server: hosts independent timecode
//! sessions at professional broadcast framerates (drop-frame included)
//! and streams frame-accurate `timecode_update` messages to every client
//! joined to a session, over a line-delimited JSON TCP protocol.
//!
//! ## Features
//!
//! - Frame-number timecode arithmetic with SMPTE drop-frame rules
//! - Drift-corrected per-session tickers scheduled against a fixed epoch
//! - Concurrent session/client registry with slow-consumer protection
//! - Graceful shutdown with a bounded handler drain
//!
//! ## Example
//!
//! ```rust,no_run
//! use smptesync::{ServerConfig, TimecodeServer};
//!
//! # async fn example() -> smptesync::Result<()> {
//! let config = ServerConfig::default().host("127.0.0.1").port(9000);
//! let server = TimecodeServer::bind(config).await?;
//! let handle = server.handle();
//!
//! // ... wire `handle.shutdown()` to a signal ...
//! server.serve().await?;
//! # Ok(())
//! # }
//! ```

#![warn(missing_docs)]
#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![allow(clippy::module_name_repetitions)]

/// Error types
pub mod error;
/// Wire protocol codec and schema
pub mod protocol;
/// Session/client registry
pub mod registry;
/// Listener and shutdown coordination
pub mod server;
/// Timecode sessions and their tickers
pub mod session;
/// Timecode arithmetic
pub mod timecode;

// Re-exports
pub use error::{RequestError, Result, ServerError};
pub use protocol::{ErrorKind, Request, ServerMessage};
pub use registry::{Registry, ServerStatus, SessionStatus};
pub use server::{ServerConfig, ServerHandle, TimecodeServer};
pub use session::{LifecycleOutcome, Session};
pub use timecode::{Framerate, Timecode, TimecodeError};
