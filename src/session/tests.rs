use super::*;
use crate::protocol::ServerMessage;
use crate::timecode::{Framerate, Timecode};
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TryRecvError;

fn rate(key: &str) -> Framerate {
    Framerate::from_key(key).unwrap()
}

fn make_session(key: &str) -> (Arc<Session>, mpsc::UnboundedReceiver<String>) {
    let (kicks, kicks_rx) = mpsc::unbounded_channel();
    let rate = rate(key);
    let session = Session::new(
        "test-session".to_string(),
        rate,
        Timecode::zero(rate),
        "creator".to_string(),
        kicks,
    );
    (session, kicks_rx)
}

async fn join_member(
    session: &Arc<Session>,
    client_id: &str,
    capacity: usize,
) -> mpsc::Receiver<ServerMessage> {
    let (tx, mut rx) = mpsc::channel(capacity);
    session.join(client_id, tx).await;
    match rx.recv().await {
        Some(ServerMessage::SessionJoined { .. }) => {}
        other => panic!("expected session_joined, got {other:?}"),
    }
    rx
}

async fn expect_update(rx: &mut mpsc::Receiver<ServerMessage>, expected: &str) {
    match rx.recv().await {
        Some(ServerMessage::TimecodeUpdate { timecode }) => assert_eq!(timecode, expected),
        other => panic!("expected update {expected}, got {other:?}"),
    }
}

#[tokio::test]
async fn test_join_and_leave_membership() {
    let (session, _kicks) = make_session("24");
    let mut rx = join_member(&session, "c1", 8).await;
    assert_eq!(session.member_count().await, 1);

    assert_eq!(session.leave("c1").await, 0);
    match rx.recv().await {
        Some(ServerMessage::SessionLeft { session_id }) => {
            assert_eq!(session_id, "test-session");
        }
        other => panic!("expected session_left, got {other:?}"),
    }
    assert_eq!(session.member_count().await, 0);

    // Leaving again is a no-op
    assert_eq!(session.leave("c1").await, 0);
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test(start_paused = true)]
async fn test_join_reports_running_state() {
    let (session, _kicks) = make_session("24");
    session.start().await;
    let (tx, mut rx) = mpsc::channel(8);
    session.join("late", tx).await;
    match rx.recv().await {
        Some(ServerMessage::SessionJoined {
            running, timecode, framerate, ..
        }) => {
            assert!(running);
            assert_eq!(framerate, "24");
            assert_eq!(timecode, "00:00:00:00");
        }
        other => panic!("expected session_joined, got {other:?}"),
    }
    session.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_ticker_emits_frames_on_schedule() {
    let (session, _kicks) = make_session("24");
    let mut rx = join_member(&session, "c1", 64).await;

    let outcome = session.start().await;
    assert!(outcome.changed);
    match rx.recv().await {
        Some(ServerMessage::TimecodeStarted { timecode }) => assert_eq!(timecode, "00:00:00:00"),
        other => panic!("expected timecode_started, got {other:?}"),
    }

    for expected in ["00:00:00:01", "00:00:00:02", "00:00:00:03"] {
        expect_update(&mut rx, expected).await;
    }
    session.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_start_is_idempotent() {
    let (session, _kicks) = make_session("30");
    let mut rx = join_member(&session, "c1", 64).await;

    assert!(session.start().await.changed);
    match rx.recv().await {
        Some(ServerMessage::TimecodeStarted { .. }) => {}
        other => panic!("expected timecode_started, got {other:?}"),
    }

    let again = session.start().await;
    assert!(!again.changed);
    // No second broadcast and no epoch restart
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
    expect_update(&mut rx, "00:00:00:01").await;
    session.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_stop_halts_updates_within_one_frame() {
    let (session, _kicks) = make_session("24");
    let mut rx = join_member(&session, "c1", 64).await;

    session.start().await;
    match rx.recv().await {
        Some(ServerMessage::TimecodeStarted { .. }) => {}
        other => panic!("expected timecode_started, got {other:?}"),
    }
    expect_update(&mut rx, "00:00:00:01").await;

    let outcome = session.stop().await;
    assert!(outcome.changed);
    assert_eq!(outcome.timecode.to_string(), "00:00:00:01");
    match rx.recv().await {
        Some(ServerMessage::TimecodeStopped { timecode }) => assert_eq!(timecode, "00:00:00:01"),
        other => panic!("expected timecode_stopped, got {other:?}"),
    }

    // The ticker is gone: time may pass, nothing is emitted.
    tokio::time::sleep(std::time::Duration::from_secs(2)).await;
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));

    let again = session.stop().await;
    assert!(!again.changed);
}

#[tokio::test(start_paused = true)]
async fn test_reset_while_running_restarts_epoch() {
    let (session, _kicks) = make_session("24");
    let mut rx = join_member(&session, "c1", 64).await;

    session.start().await;
    match rx.recv().await {
        Some(ServerMessage::TimecodeStarted { .. }) => {}
        other => panic!("expected timecode_started, got {other:?}"),
    }
    expect_update(&mut rx, "00:00:00:01").await;

    session.reset(Some("10:00:00:00")).await.unwrap();
    match rx.recv().await {
        Some(ServerMessage::TimecodeReset { timecode }) => assert_eq!(timecode, "10:00:00:00"),
        other => panic!("expected timecode_reset, got {other:?}"),
    }

    // No double emit: the next update is exactly one frame past the reset.
    expect_update(&mut rx, "10:00:00:01").await;
    expect_update(&mut rx, "10:00:00:02").await;
    session.stop().await;
}

#[tokio::test]
async fn test_reset_while_stopped() {
    let (session, _kicks) = make_session("29.97");
    let mut rx = join_member(&session, "c1", 8).await;

    session.reset(Some("01:00:00:00")).await.unwrap();
    match rx.recv().await {
        Some(ServerMessage::TimecodeReset { timecode }) => assert_eq!(timecode, "01:00:00:00"),
        other => panic!("expected timecode_reset, got {other:?}"),
    }
    assert!(!session.is_running().await);
    assert_eq!(session.timecode().await.to_string(), "01:00:00:00");
}

#[tokio::test]
async fn test_reset_rejects_dropped_label() {
    let (session, _kicks) = make_session("29.97");
    let mut rx = join_member(&session, "c1", 8).await;

    assert!(session.reset(Some("00:01:00:00")).await.is_err());
    // Session unchanged, nothing broadcast
    assert_eq!(session.timecode().await.to_string(), "00:00:00:00");
    assert!(matches!(rx.try_recv(), Err(TryRecvError::Empty)));
}

#[tokio::test]
async fn test_reset_defaults_to_zero() {
    let (session, _kicks) = make_session("24");
    session.reset(Some("05:00:00:00")).await.unwrap();
    session.reset(None).await.unwrap();
    assert_eq!(session.timecode().await.to_string(), "00:00:00:00");
}

#[tokio::test(start_paused = true)]
async fn test_late_wakeup_skips_to_newest_frame() {
    let (session, _kicks) = make_session("24");
    let mut rx = join_member(&session, "c1", 64).await;
    let rate = session.framerate();

    session.start().await;
    match rx.recv().await {
        Some(ServerMessage::TimecodeStarted { .. }) => {}
        other => panic!("expected timecode_started, got {other:?}"),
    }
    expect_update(&mut rx, "00:00:00:01").await;

    // Pretend the loop overslept five frame periods.
    {
        let mut state = session.state.lock().await;
        state.epoch.wall = state.epoch.wall - rate.duration_for(5);
    }

    // The next wakeup emits only the newest frame; the five in between
    // are dropped from the emission stream, not the count.
    expect_update(&mut rx, "00:00:00:07").await;
    expect_update(&mut rx, "00:00:00:08").await;
    session.stop().await;
}

#[tokio::test(start_paused = true)]
async fn test_tick_wraps_at_midnight() {
    let (session, _kicks) = make_session("24");
    let mut rx = join_member(&session, "c1", 64).await;

    session.reset(Some("23:59:59:23")).await.unwrap();
    match rx.recv().await {
        Some(ServerMessage::TimecodeReset { .. }) => {}
        other => panic!("expected timecode_reset, got {other:?}"),
    }
    session.start().await;
    match rx.recv().await {
        Some(ServerMessage::TimecodeStarted { .. }) => {}
        other => panic!("expected timecode_started, got {other:?}"),
    }
    expect_update(&mut rx, "00:00:00:00").await;
    expect_update(&mut rx, "00:00:00:01").await;
    session.stop().await;
}

#[tokio::test]
async fn test_slow_consumer_is_kicked() {
    let (session, mut kicks_rx) = make_session("24");

    // Capacity 1: the join confirmation fills the queue.
    let (tx, _rx) = mpsc::channel(1);
    session.join("slow", tx).await;
    assert_eq!(session.member_count().await, 1);

    session
        .broadcast(ServerMessage::TimecodeUpdate {
            timecode: "00:00:00:01".to_string(),
        })
        .await;

    assert_eq!(kicks_rx.recv().await.as_deref(), Some("slow"));
    assert_eq!(session.member_count().await, 0);
}

#[tokio::test]
async fn test_closed_member_is_pruned_silently() {
    let (session, mut kicks_rx) = make_session("24");
    let (tx, rx) = mpsc::channel(8);
    session.join("gone", tx).await;
    drop(rx);

    session
        .broadcast(ServerMessage::TimecodeUpdate {
            timecode: "00:00:00:01".to_string(),
        })
        .await;

    assert_eq!(session.member_count().await, 0);
    // Closed receivers are cleanup, not slow consumers
    assert!(kicks_rx.try_recv().is_err());
}
