pub mod cursor;
pub mod query;
pub mod session;

pub(crate) use cursor::*;
pub(crate) use query::*;
pub(crate) use session::*;

use std::collections::HashMap;
use std::sync::Arc;
use std::sync::atomic::Ordering;
use std::time::{Duration, Instant};
use tokio::sync::mpsc;

use super::commands::ManagerCommand;
use super::debounce::Debouncer;
use super::monitor::{MonitorTiming, run_session_monitor};
use super::pcm_cache::PcmCache;
use super::pipeline::build_pipeline;
use super::progress::ProgressTracker;
use super::shared::{ActiveSession, SharedPlayback};
use super::state::PlaybackState;
use crate::audio::cache::{AsyncWaveCache, WaveSnapshot};
use crate::audio::decoding::WaveDecoder;
use crate::audio::errors::PlaybackError;
use crate::audio::events::{EventKind, NotificationPort, emit_playback_event};
use crate::audio::output::OutputSink;
use crate::audio::types::{CurrentWave, DecodedAudio, LoadKind, PlaybackRegion};

/// Session taken off the sink by a pause, kept until resume or stop.
#[derive(Debug, Clone)]
pub(crate) struct PausedSession {
    pub(crate) path: String,
    pub(crate) owner: Option<String>,
    pub(crate) region: PlaybackRegion,
    pub(crate) bounds: (u64, u64),
    pub(crate) sample_rate: u32,
}

/// Everything the actor thread owns. Only handler functions touch it, and
/// they run one at a time.
pub(crate) struct ActorContext {
    pub(crate) shared: Arc<SharedPlayback>,
    pub(crate) cache: Arc<AsyncWaveCache>,
    pub(crate) decoder: Arc<dyn WaveDecoder>,
    pub(crate) notifier: Arc<dyn NotificationPort>,
    /// Handed to session monitors so they can report a finished stream.
    pub(crate) commands: mpsc::Sender<ManagerCommand>,
    pub(crate) sink: Box<dyn OutputSink>,
    pub(crate) pcm: PcmCache,
    pub(crate) paused: Option<PausedSession>,
    /// Path of the most recent session, for seeks while stopped.
    pub(crate) last_path: Option<String>,
    pub(crate) edits: HashMap<String, Debouncer<PlaybackState>>,
    pub(crate) edit_window: Duration,
    pub(crate) timing: MonitorTiming,
    pub(crate) next_session_id: u64,
}

impl ActorContext {
    /// Earliest time a debounced edit becomes due.
    pub(crate) fn next_edit_deadline(&self) -> Option<Instant> {
        self.edits.values().filter_map(|d| d.deadline()).min()
    }
}

/// Snapshot with metadata for `path`, or `NotLoadedYet` after asking the
/// cache to load it.
pub(crate) fn require_metadata(cache: &AsyncWaveCache, path: &str) -> Result<Arc<WaveSnapshot>, PlaybackError> {
    match cache.get_snapshot(path) {
        Some(snapshot) if snapshot.metadata_loaded() => Ok(snapshot),
        _ => {
            cache.request_load(path, LoadKind::Metadata);
            Err(PlaybackError::NotLoadedYet {
                path: path.to_string(),
            })
        }
    }
}

/// Decoded samples for `path`, from the PCM cache or a blocking decode.
pub(crate) async fn load_pcm(ctx: &mut ActorContext, path: &str) -> Result<DecodedAudio, PlaybackError> {
    if let Some(audio) = ctx.pcm.get(path) {
        return Ok(audio);
    }
    let decoder = Arc::clone(&ctx.decoder);
    let path_clone = path.to_string();
    let decode_result = tokio::task::spawn_blocking(move || decoder.decode_all(&path_clone)).await;
    match decode_result {
        Ok(Ok(audio)) => {
            log::info!(
                "Audio Manager: Decoded '{}'. Rate: {}, Samples: {}",
                path,
                audio.sample_rate,
                audio.len()
            );
            ctx.pcm.insert(path, audio.clone());
            Ok(audio)
        }
        Ok(Err(source)) => {
            let err = PlaybackError::PlaybackDecodeError {
                path: path.to_string(),
                source,
            };
            log::error!("Audio Manager: {}", err);
            Err(err)
        }
        Err(join_error) => {
            log::error!("Audio Manager: Decode task panicked for '{}': {}", path, join_error);
            Err(PlaybackError::DecodeTaskPanic {
                path: path.to_string(),
                reason: join_error.to_string(),
            })
        }
    }
}

pub(crate) fn set_state_flags(shared: &SharedPlayback, path: &str, is_playing: bool, is_paused: bool) {
    if let Some(mut state) = shared.states.get_mut(path) {
        state.is_playing = is_playing;
        state.is_paused = is_paused;
    }
}
