//! Drift-corrected session ticker
//!
//! Every frame is scheduled at `epoch + k * frame_duration` from exact
//! rational arithmetic, never relative to the previous wakeup, so
//! scheduling jitter does not accumulate into the emitted timecode.

use std::sync::Arc;

use tokio::sync::watch;
use tokio::task::JoinHandle;
use tokio::time::Instant;

use super::Session;
use crate::protocol::ServerMessage;
use crate::timecode::Timecode;

/// Handle to a running ticker task. Held by the session while
/// `running == true`.
#[derive(Debug)]
pub(crate) struct TickerHandle {
    stop: watch::Sender<bool>,
    task: JoinHandle<()>,
}

impl TickerHandle {
    /// Signal the ticker and wait for it to exit. The ticker observes the
    /// signal at its next wakeup, within one frame period.
    pub(crate) async fn shutdown(self) {
        let _ = self.stop.send(true);
        let _ = self.task.await;
    }
}

pub(crate) fn spawn(session: Arc<Session>) -> TickerHandle {
    let (stop, stop_rx) = watch::channel(false);
    let task = tokio::spawn(run(session, stop_rx));
    TickerHandle { stop, task }
}

async fn run(session: Arc<Session>, mut stop: watch::Receiver<bool>) {
    let rate = session.framerate();
    loop {
        // Compute the next target under the lock, then sleep outside it.
        let target = {
            let state = session.state.lock().await;
            if !state.running {
                break;
            }
            state.epoch.wall + rate.duration_for(state.epoch.ticks + 1)
        };

        tokio::select! {
            _ = tokio::time::sleep_until(target) => {}
            _ = stop.changed() => break,
        }

        let now = Instant::now();
        let mut state = session.state.lock().await;
        if !state.running || *stop.borrow() {
            break;
        }

        // A reset may have replaced the epoch while we slept; if the next
        // frame under the new epoch is not due yet, go back to sleep.
        let due = state.epoch.wall + rate.duration_for(state.epoch.ticks + 1);
        if now < due {
            continue;
        }

        // On a late wakeup this jumps past the missed frames: only the
        // newest one is emitted, but the logical count stays accurate.
        // The tick count must advance every iteration; the max() keeps
        // that structural rather than resting on the `due` check alone.
        let elapsed = rate
            .frames_elapsed(now - state.epoch.wall)
            .max(state.epoch.ticks + 1);
        state.epoch.ticks = elapsed;
        state.timecode = Timecode::new(state.epoch.frame, rate).advance(elapsed);
        let update = ServerMessage::TimecodeUpdate {
            timecode: state.timecode.to_string(),
        };
        session.broadcast_locked(&mut state, update);
    }
}
