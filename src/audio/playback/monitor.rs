use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;
use tokio::time::{Instant, MissedTickBehavior};

use super::commands::ManagerCommand;
use super::shared::{ActiveSession, SharedPlayback};
use crate::audio::events::{EventKind, NotificationPort, emit_playback_event};

#[derive(Debug, Clone, Copy)]
pub(crate) struct MonitorTiming {
    pub(crate) poll: Duration,
    pub(crate) emit_every: Duration,
}

/// Per-session progress monitor, spawned on the actor's runtime. Polls the
/// tracker, throttles progress notifications and reports the end of the
/// stream back to the actor. Exits as soon as its session is no longer the
/// published one.
pub(crate) async fn run_session_monitor(
    session: Arc<ActiveSession>,
    shared: Arc<SharedPlayback>,
    notifier: Arc<dyn NotificationPort>,
    commands: mpsc::Sender<ManagerCommand>,
    timing: MonitorTiming,
) {
    let mut ticker = tokio::time::interval(timing.poll);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    let mut last_emit: Option<Instant> = None;
    let mut last_progress = f64::NAN;
    let duration = session.region.len();

    loop {
        ticker.tick().await;
        if !shared.is_current(&session) {
            log::trace!("Monitor: Session {} replaced, exiting", session.id);
            break;
        }

        let tracker = &session.tracker;
        if tracker.is_finished() {
            match commands.try_send(ManagerCommand::SessionFinished { session_id: session.id }) {
                Ok(()) => break,
                Err(TrySendError::Full(_)) => {
                    log::warn!("Monitor: Command queue full, retrying finish of session {}", session.id);
                    continue;
                }
                Err(TrySendError::Closed(_)) => break,
            }
        }

        let now = Instant::now();
        let due = last_emit.is_none_or(|at| now.duration_since(at) >= timing.emit_every);
        let progress = tracker.progress();
        if due && progress != last_progress {
            emit_playback_event(
                notifier.as_ref(),
                EventKind::Progress,
                &session.path,
                progress,
                tracker.absolute_position(),
                duration,
                session.owner.as_deref(),
            );
            last_emit = Some(now);
            last_progress = progress;
        }
    }
}
