use crossbeam_channel::Sender;

use super::state::PlaybackState;
use crate::audio::errors::PlaybackError;
use crate::audio::types::CurrentWave;

/// One-shot reply slot. The actor never blocks on it: the channel has room
/// for exactly one message and a caller that gave up simply drops it.
pub(crate) type Reply<T> = Sender<Result<T, PlaybackError>>;

// --- Audio Manager Commands ---
#[derive(Debug)]
pub(crate) enum ManagerCommand {
    Play {
        path: String,
        looping: bool,
        start_sample: Option<u64>,
        end_sample: Option<u64>,
        owner: Option<String>,
        reply: Reply<()>,
    },
    PlayWithState {
        state: PlaybackState,
        reply: Reply<()>,
    },
    Stop {
        reply: Reply<()>,
    },
    Pause {
        reply: Reply<()>,
    },
    Resume {
        reply: Reply<()>,
    },
    Seek {
        fraction: f64,
        reply: Reply<()>,
    },
    SetCursor {
        path: String,
        fraction: f64,
        start_sample: u64,
        end_sample: u64,
        reply: Reply<()>,
    },
    UpdatePlaybackState {
        state: PlaybackState,
        reply: Reply<()>,
    },
    GetCurrentWave {
        reply: Reply<Option<CurrentWave>>,
    },
    /// Sent by a session monitor when its stream ran dry.
    SessionFinished {
        session_id: u64,
    },
    Shutdown {
        reply: Sender<()>,
    },
}

impl ManagerCommand {
    pub(crate) fn name(&self) -> &'static str {
        match self {
            ManagerCommand::Play { .. } => "play",
            ManagerCommand::PlayWithState { .. } => "play_with_state",
            ManagerCommand::Stop { .. } => "stop",
            ManagerCommand::Pause { .. } => "pause",
            ManagerCommand::Resume { .. } => "resume",
            ManagerCommand::Seek { .. } => "seek",
            ManagerCommand::SetCursor { .. } => "set_cursor",
            ManagerCommand::UpdatePlaybackState { .. } => "update_playback_state",
            ManagerCommand::GetCurrentWave { .. } => "get_current_wave",
            ManagerCommand::SessionFinished { .. } => "session_finished",
            ManagerCommand::Shutdown { .. } => "shutdown",
        }
    }
}

pub(crate) fn send_reply<T>(reply: &Reply<T>, result: Result<T, PlaybackError>) {
    if reply.try_send(result).is_err() {
        log::debug!("Audio Manager: Caller stopped waiting for a reply");
    }
}
