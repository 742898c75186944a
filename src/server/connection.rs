//! Per-client connection handling
//!
//! Each connection multiplexes two flows in one task: the read loop
//! feeding the line codec, and the writer draining the client's bounded
//! outbound queue. Either side failing tears both down.

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::net::TcpStream;
use tokio::sync::{mpsc, watch};

use crate::error::RequestError;
use crate::protocol::{self, CodecError, LineCodec, Request, ServerMessage};
use crate::registry::{generate_id, Registry};
use crate::timecode::Framerate;

pub(crate) async fn handle_client(
    mut stream: TcpStream,
    peer: SocketAddr,
    registry: Arc<Registry>,
    channel_capacity: usize,
    max_line_len: usize,
    mut shutdown: watch::Receiver<bool>,
) {
    let client_id = generate_id();
    let (tx, mut rx) = mpsc::channel(channel_capacity);

    let welcome = ServerMessage::Welcome {
        client_id: client_id.clone(),
        supported_framerates: Framerate::supported_keys()
            .iter()
            .map(ToString::to_string)
            .collect(),
    };
    let _ = tx.try_send(welcome);
    registry.register_client(&client_id, tx).await;

    tracing::info!(client = %client_id, %peer, "client connected");

    let (mut rd, mut wr) = stream.split();
    let mut codec = LineCodec::with_max_line(max_line_len);
    let mut buf = vec![0u8; 4096];

    loop {
        tokio::select! {
            outbound = rx.recv() => match outbound {
                Some(message) => {
                    if wr.write_all(protocol::encode(&message).as_bytes()).await.is_err() {
                        break;
                    }
                }
                // Channel closed: kicked as a slow consumer, or server
                // shutdown dropped our senders.
                None => break,
            },
            read = rd.read(&mut buf) => match read {
                Ok(0) => break,
                Ok(n) => {
                    codec.feed(&buf[..n]);
                    if !drain_requests(&mut codec, &registry, &client_id).await {
                        break;
                    }
                }
                Err(err) => {
                    tracing::debug!(client = %client_id, %err, "read failed");
                    break;
                }
            },
            _ = shutdown.changed() => break,
        }
    }

    registry.on_client_disconnect(&client_id).await;

    // Best-effort flush of whatever was queued before teardown, the
    // server_shutdown notice included.
    while let Ok(message) = rx.try_recv() {
        if wr.write_all(protocol::encode(&message).as_bytes()).await.is_err() {
            break;
        }
    }
    let _ = wr.shutdown().await;
}

/// Decode and dispatch every complete request in the codec buffer.
/// Returns false when the connection must close.
async fn drain_requests(
    codec: &mut LineCodec,
    registry: &Arc<Registry>,
    client_id: &str,
) -> bool {
    loop {
        match codec.decode() {
            Ok(Some(request)) => {
                if let Err(err) = dispatch(registry, client_id, request).await {
                    registry.send_to(client_id, err.to_message()).await;
                }
            }
            Ok(None) => return true,
            Err(err @ CodecError::LineTooLong { .. }) => {
                let fault = RequestError::from(err);
                registry.send_to(client_id, fault.to_message()).await;
                return false;
            }
            Err(err) => {
                // The offending line is consumed; the connection stays
                // usable after the error reply.
                let fault = RequestError::from(err);
                registry.send_to(client_id, fault.to_message()).await;
            }
        }
    }
}

async fn dispatch(
    registry: &Arc<Registry>,
    client_id: &str,
    request: Request,
) -> Result<(), RequestError> {
    match request {
        Request::CreateSession {
            framerate,
            initial_timecode,
        } => {
            registry
                .create_session(client_id, &framerate, initial_timecode.as_deref())
                .await?;
        }
        Request::JoinSession { session_id } => {
            registry.join_session(client_id, &session_id).await?;
        }
        Request::LeaveSession => {
            registry.leave_session(client_id).await;
        }
        Request::StartTimecode => {
            let session = registry.session_of(client_id).await?;
            let outcome = session.start().await;
            if !outcome.changed {
                // Idempotent start still acks the requester
                registry
                    .send_to(
                        client_id,
                        ServerMessage::TimecodeStarted {
                            timecode: outcome.timecode.to_string(),
                        },
                    )
                    .await;
            }
        }
        Request::StopTimecode => {
            let session = registry.session_of(client_id).await?;
            let outcome = session.stop().await;
            if !outcome.changed {
                registry
                    .send_to(
                        client_id,
                        ServerMessage::TimecodeStopped {
                            timecode: outcome.timecode.to_string(),
                        },
                    )
                    .await;
            }
        }
        Request::ResetTimecode { timecode } => {
            let session = registry.session_of(client_id).await?;
            session.reset(timecode.as_deref()).await?;
        }
    }
    Ok(())
}
