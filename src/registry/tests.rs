use super::*;
use crate::protocol::ErrorKind;

async fn connect(
    registry: &Registry,
    client_id: &str,
) -> tokio::sync::mpsc::Receiver<ServerMessage> {
    let (tx, rx) = mpsc::channel(64);
    registry.register_client(client_id, tx).await;
    rx
}

async fn expect<F>(rx: &mut tokio::sync::mpsc::Receiver<ServerMessage>, check: F)
where
    F: FnOnce(&ServerMessage) -> bool,
{
    let msg = rx.recv().await.expect("channel closed");
    assert!(check(&msg), "unexpected message: {msg:?}");
}

#[tokio::test]
async fn test_create_session_acks_then_joins() {
    let (registry, _kicks) = Registry::new();
    let mut rx = connect(&registry, "c1").await;

    let session = registry
        .create_session("c1", "24", Some("01:00:00:00"))
        .await
        .unwrap();
    assert_eq!(session.created_by(), "c1");
    assert_eq!(session.id().len(), 32);

    expect(&mut rx, |m| {
        matches!(m, ServerMessage::SessionCreated { framerate, timecode, .. }
            if framerate == "24" && timecode == "01:00:00:00")
    })
    .await;
    expect(&mut rx, |m| {
        matches!(m, ServerMessage::SessionJoined { running, timecode, .. }
            if !running && timecode == "01:00:00:00")
    })
    .await;
}

#[tokio::test]
async fn test_create_session_validates_input() {
    let (registry, _kicks) = Registry::new();
    let _rx = connect(&registry, "c1").await;

    let err = registry
        .create_session("c1", "25", None)
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::UnknownFramerate);

    let err = registry
        .create_session("c1", "24", Some("99:00:00:00"))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidTimecode);

    // Drop-frame labels that do not exist are rejected at creation too
    let err = registry
        .create_session("c1", "29.97", Some("00:01:00:00"))
        .await
        .unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidTimecode);
}

#[tokio::test]
async fn test_join_unknown_session() {
    let (registry, _kicks) = Registry::new();
    let _rx = connect(&registry, "c1").await;

    let err = registry.join_session("c1", "nope").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::SessionNotFound);
}

#[tokio::test]
async fn test_join_moves_client_between_sessions() {
    let (registry, _kicks) = Registry::new();
    let mut rx1 = connect(&registry, "c1").await;
    let mut rx2 = connect(&registry, "c2").await;

    let a = registry.create_session("c1", "24", None).await.unwrap();
    let b = registry.create_session("c2", "30", None).await.unwrap();
    rx1.recv().await; // session_created a
    rx1.recv().await; // session_joined a
    rx2.recv().await; // session_created b
    rx2.recv().await; // session_joined b

    registry.join_session("c1", b.id()).await.unwrap();
    // Leaving A is confirmed before joining B
    expect(&mut rx1, |m| {
        matches!(m, ServerMessage::SessionLeft { session_id } if session_id == a.id())
    })
    .await;
    expect(&mut rx1, |m| {
        matches!(m, ServerMessage::SessionJoined { session_id, framerate, .. }
            if session_id == b.id() && framerate == "30")
    })
    .await;

    assert_eq!(b.member_count().await, 2);
    // A had no members left and was collected
    let err = registry.join_session("c2", a.id()).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::SessionNotFound);
}

#[tokio::test]
async fn test_rejoining_same_session_keeps_it_alive() {
    let (registry, _kicks) = Registry::new();
    let mut rx = connect(&registry, "c1").await;
    let session = registry.create_session("c1", "24", None).await.unwrap();
    rx.recv().await;
    rx.recv().await;

    registry.join_session("c1", session.id()).await.unwrap();
    expect(&mut rx, |m| matches!(m, ServerMessage::SessionJoined { .. })).await;
    assert_eq!(session.member_count().await, 1);
    assert!(registry.session_of("c1").await.is_ok());
}

#[tokio::test]
async fn test_empty_session_is_collected_on_leave() {
    let (registry, _kicks) = Registry::new();
    let _rx1 = connect(&registry, "c1").await;
    let _rx2 = connect(&registry, "c2").await;

    let session = registry.create_session("c1", "24", None).await.unwrap();
    registry.join_session("c2", session.id()).await.unwrap();

    assert!(registry.leave_session("c1").await);
    // c2 keeps the session alive
    assert!(registry.join_session("c1", session.id()).await.is_ok());
    assert!(registry.leave_session("c1").await);
    assert!(registry.leave_session("c2").await);

    let err = registry.join_session("c1", session.id()).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::SessionNotFound);
    assert!(registry.status().await.sessions.is_empty());
}

#[tokio::test]
async fn test_leave_without_session_is_noop() {
    let (registry, _kicks) = Registry::new();
    let _rx = connect(&registry, "c1").await;
    assert!(!registry.leave_session("c1").await);
    assert!(!registry.leave_session("stranger").await);
}

#[tokio::test]
async fn test_session_of_requires_membership() {
    let (registry, _kicks) = Registry::new();
    let _rx = connect(&registry, "c1").await;

    let err = registry.session_of("c1").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotInSession);
    let err = registry.session_of("stranger").await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::NotInSession);

    registry.create_session("c1", "24", None).await.unwrap();
    assert!(registry.session_of("c1").await.is_ok());
}

#[tokio::test(start_paused = true)]
async fn test_disconnect_stops_orphaned_ticker() {
    let (registry, _kicks) = Registry::new();
    let mut rx = connect(&registry, "c1").await;

    let session = registry.create_session("c1", "24", None).await.unwrap();
    session.start().await;
    assert!(session.is_running().await);

    registry.on_client_disconnect("c1").await;
    assert!(!session.is_running().await);
    assert!(registry.status().await.sessions.is_empty());

    // The channel is closed once the registry lets go of the sender
    while let Some(_msg) = rx.recv().await {}
}

#[tokio::test]
async fn test_shutdown_notifies_and_closes() {
    let (registry, _kicks) = Registry::new();
    let mut rx1 = connect(&registry, "c1").await;
    let mut rx2 = connect(&registry, "c2").await;

    let session = registry.create_session("c1", "29.97", None).await.unwrap();
    session.start().await;

    registry.shutdown().await;
    assert!(!session.is_running().await);

    for rx in [&mut rx1, &mut rx2] {
        let mut saw_shutdown = false;
        while let Some(msg) = rx.recv().await {
            if matches!(msg, ServerMessage::ServerShutdown) {
                saw_shutdown = true;
            }
        }
        assert!(saw_shutdown, "missing server_shutdown");
    }

    let status = registry.status().await;
    assert_eq!(status.client_count, 0);
    assert!(status.sessions.is_empty());
}

#[tokio::test]
async fn test_send_to_slow_client_disconnects_it() {
    let (registry, _kicks) = Registry::new();
    let (tx, _rx) = mpsc::channel(1);
    registry.register_client("slow", tx).await;

    registry
        .send_to(
            "slow",
            ServerMessage::TimecodeUpdate {
                timecode: "00:00:00:01".to_string(),
            },
        )
        .await;
    // First message fits; the second overflows and drops the client
    registry
        .send_to(
            "slow",
            ServerMessage::TimecodeUpdate {
                timecode: "00:00:00:02".to_string(),
            },
        )
        .await;

    assert_eq!(registry.status().await.client_count, 0);
}

#[tokio::test]
async fn test_status_snapshot() {
    let (registry, _kicks) = Registry::new();
    let _rx1 = connect(&registry, "c1").await;
    let _rx2 = connect(&registry, "c2").await;

    let session = registry
        .create_session("c1", "59.94", Some("12:00:00:00"))
        .await
        .unwrap();
    registry.join_session("c2", session.id()).await.unwrap();

    let status = registry.status().await;
    assert_eq!(status.client_count, 2);
    assert_eq!(status.sessions.len(), 1);
    let s = &status.sessions[0];
    assert_eq!(s.framerate, "59.94");
    assert_eq!(s.timecode, "12:00:00:00");
    assert_eq!(s.member_count, 2);
    assert!(!s.running);
}

#[tokio::test]
async fn test_kick_channel_carries_overflowed_member() {
    let (registry, mut kicks) = Registry::new();
    let (tx, _rx) = mpsc::channel(2);
    registry.register_client("slow", tx).await;

    let session = registry.create_session("slow", "24", None).await.unwrap();
    // Queue now holds session_created + session_joined; the broadcast
    // overflows it.
    session
        .broadcast(ServerMessage::TimecodeUpdate {
            timecode: "00:00:00:01".to_string(),
        })
        .await;

    assert_eq!(kicks.recv().await.as_deref(), Some("slow"));
    registry.on_client_disconnect("slow").await;
    assert_eq!(registry.status().await.client_count, 0);
}

#[tokio::test]
async fn test_create_leaves_prior_session() {
    let (registry, _kicks) = Registry::new();
    let mut rx = connect(&registry, "c1").await;

    let a = registry.create_session("c1", "24", None).await.unwrap();
    rx.recv().await;
    rx.recv().await;
    let b = registry.create_session("c1", "30", None).await.unwrap();

    expect(&mut rx, |m| {
        matches!(m, ServerMessage::SessionLeft { session_id } if session_id == a.id())
    })
    .await;
    expect(&mut rx, |m| {
        matches!(m, ServerMessage::SessionCreated { session_id, .. } if session_id == b.id())
    })
    .await;

    // A was collected; only B remains
    let status = registry.status().await;
    assert_eq!(status.sessions.len(), 1);
    assert_eq!(status.sessions[0].id, b.id());
}
