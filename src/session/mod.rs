//! Timecode sessions
//!
//! A [`Session`] owns a current timecode, its member set, and (while
//! running) a ticker task. All mutable state sits behind one async mutex,
//! which is the session's serialization domain: every state change and
//! every broadcast happens inside it, so members observe ticks in strictly
//! increasing frame order. Enqueueing to members never blocks; a member
//! whose outbound queue is full is removed and reported for disconnect.

pub(crate) mod ticker;

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex};
use tokio::time::Instant;

use crate::protocol::ServerMessage;
use crate::timecode::{Framerate, Timecode, TimecodeError};

/// Result of an idempotent `start` or `stop`.
#[derive(Debug, Clone, Copy)]
pub struct LifecycleOutcome {
    /// False when the request was a no-op (already in the target state)
    pub changed: bool,
    /// Session timecode after the operation
    pub timecode: Timecode,
}

/// Reference point for drift-corrected scheduling. Replaced on every
/// start and reset, so tick indices stay small and missed frames are
/// never replayed.
#[derive(Debug)]
pub(crate) struct TickEpoch {
    pub(crate) wall: Instant,
    pub(crate) frame: u64,
    /// Frames emitted since `wall`; the next tick is due at
    /// `wall + (ticks + 1) * frame_duration`.
    pub(crate) ticks: u64,
}

#[derive(Debug)]
pub(crate) struct SessionState {
    pub(crate) timecode: Timecode,
    pub(crate) running: bool,
    pub(crate) members: HashMap<String, mpsc::Sender<ServerMessage>>,
    pub(crate) ticker: Option<ticker::TickerHandle>,
    pub(crate) epoch: TickEpoch,
}

/// A timecode session and its members.
#[derive(Debug)]
pub struct Session {
    id: String,
    framerate: Framerate,
    created_by: String,
    created_at: Instant,
    /// Client ids whose outbound queue overflowed; the server reaps them.
    kicks: mpsc::UnboundedSender<String>,
    state: Mutex<SessionState>,
}

impl Session {
    pub(crate) fn new(
        id: String,
        framerate: Framerate,
        initial: Timecode,
        created_by: String,
        kicks: mpsc::UnboundedSender<String>,
    ) -> Arc<Self> {
        Arc::new(Self {
            id,
            framerate,
            created_by,
            created_at: Instant::now(),
            kicks,
            state: Mutex::new(SessionState {
                timecode: initial,
                running: false,
                members: HashMap::new(),
                ticker: None,
                epoch: TickEpoch {
                    wall: Instant::now(),
                    frame: initial.frame_number(),
                    ticks: 0,
                },
            }),
        })
    }

    /// The session id.
    #[must_use]
    pub fn id(&self) -> &str {
        &self.id
    }

    /// The session framerate.
    #[must_use]
    pub fn framerate(&self) -> Framerate {
        self.framerate
    }

    /// Id of the client that created the session.
    #[must_use]
    pub fn created_by(&self) -> &str {
        &self.created_by
    }

    /// Time since creation.
    #[must_use]
    pub fn age(&self) -> Duration {
        self.created_at.elapsed()
    }

    /// The current timecode.
    pub async fn timecode(&self) -> Timecode {
        self.state.lock().await.timecode
    }

    /// Whether the ticker is running.
    pub async fn is_running(&self) -> bool {
        self.state.lock().await.running
    }

    /// Number of joined clients.
    pub async fn member_count(&self) -> usize {
        self.state.lock().await.members.len()
    }

    /// One-lock snapshot of `(timecode, running, member count)`.
    pub async fn snapshot(&self) -> (Timecode, bool, usize) {
        let state = self.state.lock().await;
        (state.timecode, state.running, state.members.len())
    }

    /// Start the ticker. Idempotent: starting a running session changes
    /// nothing and broadcasts nothing.
    pub async fn start(self: &Arc<Self>) -> LifecycleOutcome {
        let mut state = self.state.lock().await;
        if state.running {
            return LifecycleOutcome {
                changed: false,
                timecode: state.timecode,
            };
        }
        state.running = true;
        state.epoch = TickEpoch {
            wall: Instant::now(),
            frame: state.timecode.frame_number(),
            ticks: 0,
        };
        state.ticker = Some(ticker::spawn(Arc::clone(self)));
        let timecode = state.timecode;
        self.broadcast_locked(
            &mut state,
            ServerMessage::TimecodeStarted {
                timecode: timecode.to_string(),
            },
        );
        tracing::info!(session = %self.id, timecode = %timecode, "timecode started");
        LifecycleOutcome {
            changed: true,
            timecode,
        }
    }

    /// Stop the ticker and wait for it to exit (observable within one
    /// frame period). Idempotent. No `timecode_update` follows the
    /// `timecode_stopped` broadcast.
    pub async fn stop(&self) -> LifecycleOutcome {
        let (handle, timecode) = {
            let mut state = self.state.lock().await;
            if !state.running {
                return LifecycleOutcome {
                    changed: false,
                    timecode: state.timecode,
                };
            }
            state.running = false;
            let handle = state.ticker.take();
            let timecode = state.timecode;
            // Enqueued while `running` flips, so no update can land after
            // it: the ticker re-checks the flag before every emit.
            self.broadcast_locked(
                &mut state,
                ServerMessage::TimecodeStopped {
                    timecode: timecode.to_string(),
                },
            );
            (handle, timecode)
        };
        if let Some(handle) = handle {
            handle.shutdown().await;
        }
        tracing::info!(session = %self.id, timecode = %timecode, "timecode stopped");
        LifecycleOutcome {
            changed: true,
            timecode,
        }
    }

    /// Set the timecode (default `00:00:00:00`) and restart the tick
    /// epoch. Legal whether running or stopped; never toggles `running`.
    ///
    /// # Errors
    /// Returns [`TimecodeError`] for unparseable, out-of-range, or
    /// dropped-frame values; the session is left unchanged.
    pub async fn reset(&self, timecode: Option<&str>) -> Result<Timecode, TimecodeError> {
        let timecode = match timecode {
            Some(text) => Timecode::parse(text, self.framerate)?,
            None => Timecode::zero(self.framerate),
        };
        let mut state = self.state.lock().await;
        state.timecode = timecode;
        state.epoch = TickEpoch {
            wall: Instant::now(),
            frame: timecode.frame_number(),
            ticks: 0,
        };
        self.broadcast_locked(
            &mut state,
            ServerMessage::TimecodeReset {
                timecode: timecode.to_string(),
            },
        );
        tracing::info!(session = %self.id, timecode = %timecode, "timecode reset");
        Ok(timecode)
    }

    /// Add a member and confirm with `session_joined`.
    pub(crate) async fn join(&self, client_id: &str, tx: mpsc::Sender<ServerMessage>) {
        let mut state = self.state.lock().await;
        state.members.insert(client_id.to_string(), tx);
        let message = ServerMessage::SessionJoined {
            session_id: self.id.clone(),
            framerate: self.framerate.key().to_string(),
            timecode: state.timecode.to_string(),
            running: state.running,
        };
        self.send_locked(&mut state, client_id, message);
        tracing::info!(session = %self.id, client = %client_id, "client joined");
    }

    /// Remove a member, sending `session_left` as its final session
    /// message. Returns the remaining member count. No-op for
    /// non-members.
    pub(crate) async fn leave(&self, client_id: &str) -> usize {
        let mut state = self.state.lock().await;
        if state.members.contains_key(client_id) {
            let message = ServerMessage::SessionLeft {
                session_id: self.id.clone(),
            };
            self.send_locked(&mut state, client_id, message);
            state.members.remove(client_id);
            tracing::info!(session = %self.id, client = %client_id, "client left");
        }
        state.members.len()
    }

    /// Remove a member without notifying it (disconnect path). Returns
    /// the remaining member count.
    pub(crate) async fn remove_member(&self, client_id: &str) -> usize {
        let mut state = self.state.lock().await;
        state.members.remove(client_id);
        state.members.len()
    }

    /// Enqueue a message to every member.
    pub(crate) async fn broadcast(&self, message: ServerMessage) {
        let mut state = self.state.lock().await;
        self.broadcast_locked(&mut state, message);
    }

    /// Drop every member sender (server shutdown path); with the client
    /// entries gone too, this closes each member's outbound channel.
    pub(crate) async fn clear_members(&self) {
        self.state.lock().await.members.clear();
    }

    /// Cancel the ticker without any protocol traffic (teardown path).
    pub(crate) async fn shutdown_ticker(&self) {
        let handle = {
            let mut state = self.state.lock().await;
            state.running = false;
            state.ticker.take()
        };
        if let Some(handle) = handle {
            handle.shutdown().await;
        }
    }

    fn send_locked(&self, state: &mut SessionState, client_id: &str, message: ServerMessage) {
        let outcome = match state.members.get(client_id) {
            Some(tx) => tx.try_send(message),
            None => return,
        };
        match outcome {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                state.members.remove(client_id);
                let _ = self.kicks.send(client_id.to_string());
                tracing::warn!(session = %self.id, client = %client_id, "dropping slow consumer");
            }
            Err(TrySendError::Closed(_)) => {
                // Receiver already tearing down; membership cleanup only.
                state.members.remove(client_id);
            }
        }
    }

    fn broadcast_locked(&self, state: &mut SessionState, message: ServerMessage) {
        let mut dropped = Vec::new();
        for (client_id, tx) in &state.members {
            match tx.try_send(message.clone()) {
                Ok(()) => {}
                Err(TrySendError::Full(_)) => {
                    dropped.push(client_id.clone());
                    let _ = self.kicks.send(client_id.clone());
                    tracing::warn!(session = %self.id, client = %client_id, "dropping slow consumer");
                }
                Err(TrySendError::Closed(_)) => {
                    dropped.push(client_id.clone());
                }
            }
        }
        for client_id in dropped {
            state.members.remove(&client_id);
        }
    }
}

#[cfg(test)]
mod tests;
