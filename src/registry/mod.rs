//! Process-wide session and client registry
//!
//! Single owner of the `session id -> session` and `client id -> client`
//! maps. Map mutations happen in the registry's own serial domain; the
//! cross-domain order is always registry first, then session, so a task
//! never waits on the registry while holding a session.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::error::TrySendError;
use tokio::sync::{mpsc, Mutex};

use crate::error::RequestError;
use crate::protocol::{ErrorKind, ServerMessage};
use crate::session::Session;
use crate::timecode::{Framerate, Timecode};

/// Generate a 128-bit random id as 32 hex chars.
pub(crate) fn generate_id() -> String {
    use rand::Rng;
    let id: u128 = rand::thread_rng().r#gen();
    format!("{id:032x}")
}

#[derive(Debug)]
struct ClientEntry {
    tx: mpsc::Sender<ServerMessage>,
    session_id: Option<String>,
}

#[derive(Debug)]
struct Inner {
    sessions: HashMap<String, Arc<Session>>,
    clients: HashMap<String, ClientEntry>,
}

/// Snapshot of one session for status reporting.
#[derive(Debug, Clone)]
pub struct SessionStatus {
    /// Session id
    pub id: String,
    /// Framerate key
    pub framerate: &'static str,
    /// Current timecode text
    pub timecode: String,
    /// Whether the ticker is running
    pub running: bool,
    /// Joined client count
    pub member_count: usize,
    /// Time since creation
    pub uptime: Duration,
}

/// Snapshot of the whole registry for status reporting.
#[derive(Debug, Clone)]
pub struct ServerStatus {
    /// Connected client count
    pub client_count: usize,
    /// Per-session snapshots
    pub sessions: Vec<SessionStatus>,
}

/// The session/client registry.
#[derive(Debug)]
pub struct Registry {
    inner: Mutex<Inner>,
    /// Cloned into every session; carries ids of slow consumers for the
    /// server's reaper task to disconnect.
    kicks: mpsc::UnboundedSender<String>,
}

impl Registry {
    /// Create a registry plus the receiving end of its slow-consumer
    /// channel. The caller must drain the receiver and call
    /// [`Registry::on_client_disconnect`] for each id.
    #[must_use]
    pub fn new() -> (Arc<Self>, mpsc::UnboundedReceiver<String>) {
        let (kicks, kicks_rx) = mpsc::unbounded_channel();
        let registry = Arc::new(Self {
            inner: Mutex::new(Inner {
                sessions: HashMap::new(),
                clients: HashMap::new(),
            }),
            kicks,
        });
        (registry, kicks_rx)
    }

    /// Register a connected client and its outbound channel.
    pub async fn register_client(&self, client_id: &str, tx: mpsc::Sender<ServerMessage>) {
        let mut inner = self.inner.lock().await;
        inner.clients.insert(
            client_id.to_string(),
            ClientEntry {
                tx,
                session_id: None,
            },
        );
    }

    /// Enqueue a message to one client. A full queue triggers the
    /// slow-consumer policy: the client is disconnected.
    pub async fn send_to(&self, client_id: &str, message: ServerMessage) {
        let overflow = {
            let inner = self.inner.lock().await;
            match inner.clients.get(client_id) {
                Some(entry) => matches!(entry.tx.try_send(message), Err(TrySendError::Full(_))),
                None => false,
            }
        };
        if overflow {
            tracing::warn!(client = %client_id, "dropping slow consumer");
            self.on_client_disconnect(client_id).await;
        }
    }

    /// Create a session under `framerate_key`, starting at
    /// `initial_timecode` (default `00:00:00:00`), and auto-join the
    /// creator, leaving any prior session first. Sends `session_created`
    /// followed by the `session_joined` confirmation.
    ///
    /// # Errors
    /// `UnknownFramerate`, `InvalidTimecode`, or `InternalError` for an
    /// unregistered creator.
    pub async fn create_session(
        &self,
        client_id: &str,
        framerate_key: &str,
        initial_timecode: Option<&str>,
    ) -> Result<Arc<Session>, RequestError> {
        let rate = Framerate::from_key(framerate_key)
            .ok_or_else(|| RequestError::unknown_framerate(framerate_key))?;
        let initial = match initial_timecode {
            Some(text) => Timecode::parse(text, rate)?,
            None => Timecode::zero(rate),
        };

        self.leave_session(client_id).await;

        let session = Session::new(
            generate_id(),
            rate,
            initial,
            client_id.to_string(),
            self.kicks.clone(),
        );
        let tx = {
            let mut inner = self.inner.lock().await;
            let Some(entry) = inner.clients.get_mut(client_id) else {
                return Err(RequestError::new(
                    ErrorKind::InternalError,
                    "client not registered",
                ));
            };
            entry.session_id = Some(session.id().to_string());
            let tx = entry.tx.clone();
            inner
                .sessions
                .insert(session.id().to_string(), Arc::clone(&session));
            tx
        };

        // Creation ack precedes the auto-join confirmation.
        self.send_to(
            client_id,
            ServerMessage::SessionCreated {
                session_id: session.id().to_string(),
                framerate: rate.key().to_string(),
                timecode: initial.to_string(),
            },
        )
        .await;
        session.join(client_id, tx).await;

        tracing::info!(session = %session.id(), framerate = rate.key(), "session created");
        Ok(session)
    }

    /// Join an existing session, leaving any prior one first.
    ///
    /// # Errors
    /// `SessionNotFound` for an unknown id; `InternalError` for an
    /// unregistered client.
    pub async fn join_session(
        &self,
        client_id: &str,
        session_id: &str,
    ) -> Result<Arc<Session>, RequestError> {
        let (session, tx, prior) = {
            let inner = self.inner.lock().await;
            let session = inner
                .sessions
                .get(session_id)
                .cloned()
                .ok_or_else(|| RequestError::session_not_found(session_id))?;
            let entry = inner.clients.get(client_id).ok_or_else(|| {
                RequestError::new(ErrorKind::InternalError, "client not registered")
            })?;
            (session, entry.tx.clone(), entry.session_id.clone())
        };

        // Rejoining the current session just refreshes the confirmation;
        // bouncing through leave would garbage-collect a sole-member
        // session out from under the join.
        if prior.as_deref() != Some(session_id) {
            self.leave_session(client_id).await;
            let mut inner = self.inner.lock().await;
            if let Some(entry) = inner.clients.get_mut(client_id) {
                entry.session_id = Some(session_id.to_string());
            }
        }

        session.join(client_id, tx).await;
        Ok(session)
    }

    /// Leave the current session, if any. Returns whether a session was
    /// left. Empty sessions are garbage-collected.
    pub async fn leave_session(&self, client_id: &str) -> bool {
        let session = {
            let mut guard = self.inner.lock().await;
            let inner = &mut *guard;
            let Some(entry) = inner.clients.get_mut(client_id) else {
                return false;
            };
            let Some(session_id) = entry.session_id.take() else {
                return false;
            };
            inner.sessions.get(&session_id).cloned()
        };
        let Some(session) = session else {
            return false;
        };
        if session.leave(client_id).await == 0 {
            self.collect_if_empty(&session).await;
        }
        true
    }

    /// The session the client is currently a member of.
    ///
    /// # Errors
    /// `NotInSession` when the client has no (live) session.
    pub async fn session_of(&self, client_id: &str) -> Result<Arc<Session>, RequestError> {
        let mut guard = self.inner.lock().await;
        let inner = &mut *guard;
        let Some(entry) = inner.clients.get_mut(client_id) else {
            return Err(RequestError::not_in_session());
        };
        let Some(session_id) = entry.session_id.clone() else {
            return Err(RequestError::not_in_session());
        };
        match inner.sessions.get(&session_id) {
            Some(session) => Ok(Arc::clone(session)),
            None => {
                // Stale mapping to a collected session
                entry.session_id = None;
                Err(RequestError::not_in_session())
            }
        }
    }

    /// Remove a disconnected client: clear any session membership
    /// (silently), garbage-collect an emptied session, and drop the
    /// client's outbound sender, closing its channel.
    pub async fn on_client_disconnect(&self, client_id: &str) {
        let removed = {
            let mut guard = self.inner.lock().await;
            let inner = &mut *guard;
            match inner.clients.remove(client_id) {
                Some(entry) => {
                    let session = entry
                        .session_id
                        .as_ref()
                        .and_then(|id| inner.sessions.get(id).cloned());
                    Some(session)
                }
                None => None,
            }
        };
        let Some(session) = removed else {
            return;
        };
        if let Some(session) = session {
            if session.remove_member(client_id).await == 0 {
                self.collect_if_empty(&session).await;
            }
        }
        tracing::info!(client = %client_id, "client disconnected");
    }

    /// Stop every ticker, notify every client, and close every outbound
    /// channel. The registry is empty afterwards.
    pub async fn shutdown(&self) {
        let (sessions, clients) = {
            let mut guard = self.inner.lock().await;
            let inner = &mut *guard;
            (
                inner.sessions.drain().map(|(_, s)| s).collect::<Vec<_>>(),
                inner.clients.drain().map(|(_, c)| c).collect::<Vec<_>>(),
            )
        };
        for session in &sessions {
            session.shutdown_ticker().await;
        }
        for client in &clients {
            let _ = client.tx.try_send(ServerMessage::ServerShutdown);
        }
        for session in &sessions {
            session.clear_members().await;
        }
        // Dropping the entries closes every client channel.
        tracing::info!(
            sessions = sessions.len(),
            clients = clients.len(),
            "registry shut down"
        );
    }

    /// Status snapshot for the periodic reporter.
    pub async fn status(&self) -> ServerStatus {
        let (sessions, client_count) = {
            let inner = self.inner.lock().await;
            (
                inner.sessions.values().cloned().collect::<Vec<_>>(),
                inner.clients.len(),
            )
        };
        let mut out = Vec::with_capacity(sessions.len());
        for session in sessions {
            let (timecode, running, member_count) = session.snapshot().await;
            out.push(SessionStatus {
                id: session.id().to_string(),
                framerate: session.framerate().key(),
                timecode: timecode.to_string(),
                running,
                member_count,
                uptime: session.age(),
            });
        }
        ServerStatus {
            client_count,
            sessions: out,
        }
    }

    /// Remove a session that has no members left, stopping its ticker.
    /// Re-checks membership under the registry lock so a join that raced
    /// the last leave keeps the session alive.
    async fn collect_if_empty(&self, session: &Arc<Session>) {
        let removed = {
            let mut inner = self.inner.lock().await;
            if session.member_count().await == 0 {
                inner.sessions.remove(session.id()).is_some()
            } else {
                false
            }
        };
        if removed {
            session.shutdown_ticker().await;
            tracing::info!(session = %session.id(), "session cleaned up, no clients remaining");
        }
    }
}

#[cfg(test)]
mod tests;
