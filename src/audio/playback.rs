use crossbeam_channel::RecvTimeoutError;
use std::collections::HashMap;
use std::sync::atomic::Ordering;
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::sync::mpsc::error::TrySendError;

use crate::audio::analysis::peaks;
use crate::audio::cache::AsyncWaveCache;
use crate::audio::config::{EngineConfig, INITIAL_VOLUME};
use crate::audio::decoding::WaveDecoder;
use crate::audio::errors::{EngineError, PlaybackError};
use crate::audio::events::NotificationPort;
use crate::audio::output::SinkFactory;
use crate::audio::types::{CurrentWave, LoadKind, WaveDisplayData};

mod commands;
pub mod debounce;
mod handlers;
mod monitor;
mod pcm_cache;
pub mod pipeline;
pub mod progress;
pub mod shared;
pub mod state;

use commands::{ManagerCommand, Reply, send_reply};
use handlers::ActorContext;
use monitor::MonitorTiming;
use pcm_cache::PcmCache;
use shared::SharedPlayback;
use state::PlaybackState;

/// Handle to the playback actor. Every method is safe to call from a UI
/// thread: mutations are queued to the actor and awaited with a timeout,
/// plain reads go straight to lock-free fields.
pub struct AudioManager {
    commands: mpsc::Sender<ManagerCommand>,
    shared: Arc<SharedPlayback>,
    cache: Arc<AsyncWaveCache>,
    config: EngineConfig,
    thread: Mutex<Option<JoinHandle<()>>>,
}

impl AudioManager {
    /// Spawns the actor thread and waits until its output sink is built.
    pub fn start(
        config: &EngineConfig,
        cache: Arc<AsyncWaveCache>,
        decoder: Arc<dyn WaveDecoder>,
        notifier: Arc<dyn NotificationPort>,
        sink_factory: SinkFactory,
    ) -> Result<Self, EngineError> {
        let (command_tx, command_rx) = mpsc::channel::<ManagerCommand>(config.command_queue_capacity);
        let shared = Arc::new(SharedPlayback::new(INITIAL_VOLUME));
        let (ready_tx, ready_rx) = crossbeam_channel::bounded::<Result<(), PlaybackError>>(1);

        let actor_config = config.clone();
        let actor_shared = Arc::clone(&shared);
        let actor_cache = Arc::clone(&cache);
        let actor_commands = command_tx.clone();
        let name = "audio-manager".to_string();
        let thread = std::thread::Builder::new()
            .name(name.clone())
            .spawn(move || {
                run_audio_manager(
                    actor_config,
                    actor_shared,
                    actor_cache,
                    decoder,
                    notifier,
                    sink_factory,
                    actor_commands,
                    command_rx,
                    ready_tx,
                )
            })
            .map_err(|source| EngineError::ThreadSpawn { name, source })?;

        match ready_rx.recv() {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                let _ = thread.join();
                return Err(e.into());
            }
            Err(_) => {
                let _ = thread.join();
                return Err(PlaybackError::ActorStopped.into());
            }
        }

        Ok(AudioManager {
            commands: command_tx,
            shared,
            cache,
            config: config.clone(),
            thread: Mutex::new(Some(thread)),
        })
    }

    fn request<T>(
        &self,
        timeout: Duration,
        build: impl FnOnce(Reply<T>) -> ManagerCommand,
    ) -> Result<T, PlaybackError> {
        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        let command = build(reply_tx);
        let name = command.name();
        match self.commands.try_send(command) {
            Ok(()) => {}
            Err(TrySendError::Full(_)) => {
                log::warn!("Audio Manager: Command queue full, dropped '{}'", name);
                return Err(PlaybackError::CommandQueueFull);
            }
            Err(TrySendError::Closed(_)) => return Err(PlaybackError::ActorStopped),
        }
        match reply_rx.recv_timeout(timeout) {
            Ok(result) => result,
            Err(RecvTimeoutError::Timeout) => {
                log::warn!("Audio Manager: '{}' timed out after {:?}", name, timeout);
                Err(PlaybackError::CommandTimeout { command: name })
            }
            Err(RecvTimeoutError::Disconnected) => Err(PlaybackError::ActorStopped),
        }
    }

    /// Plays `path` from the remembered cursor (or the region start).
    /// Fails fast with `NotLoadedYet` and triggers a load when the wave's
    /// metadata is not cached.
    pub fn play_wave_by_path(
        &self,
        path: &str,
        looping: bool,
        start_sample: Option<u64>,
        end_sample: Option<u64>,
    ) -> Result<(), PlaybackError> {
        handlers::require_metadata(&self.cache, path)?;
        self.request(self.config.play_timeout(), |reply| ManagerCommand::Play {
            path: path.to_string(),
            looping,
            start_sample,
            end_sample,
            owner: None,
            reply,
        })
    }

    pub fn play_with_state(&self, state: &PlaybackState) -> Result<(), PlaybackError> {
        let mut state = state.clone();
        state.validate()?;
        handlers::require_metadata(&self.cache, &state.path)?;
        self.request(self.config.play_timeout(), |reply| ManagerCommand::PlayWithState { state, reply })
    }

    pub fn stop_current(&self) -> Result<(), PlaybackError> {
        self.request(self.config.play_timeout(), |reply| ManagerCommand::Stop { reply })
    }

    pub fn pause_current(&self) -> Result<(), PlaybackError> {
        self.request(self.config.play_timeout(), |reply| ManagerCommand::Pause { reply })
    }

    pub fn resume_current(&self) -> Result<(), PlaybackError> {
        self.request(self.config.play_timeout(), |reply| ManagerCommand::Resume { reply })
    }

    /// `fraction` is relative to the active region.
    pub fn seek_to_position(&self, fraction: f64) -> Result<(), PlaybackError> {
        self.request(self.config.play_timeout(), |reply| ManagerCommand::Seek { fraction, reply })
    }

    pub fn set_cursor_position_by_path(
        &self,
        path: &str,
        fraction: f64,
        start_sample: u64,
        end_sample: u64,
    ) -> Result<(), PlaybackError> {
        self.request(self.config.play_timeout(), |reply| ManagerCommand::SetCursor {
            path: path.to_string(),
            fraction,
            start_sample,
            end_sample,
            reply,
        })
    }

    /// Debounced edit of bounds, markers and repeat mode. Returns once the
    /// edit is queued; it is committed after the quiet window.
    pub fn update_playback_state(&self, state: &PlaybackState) -> Result<(), PlaybackError> {
        let state = state.clone();
        self.request(self.config.query_timeout(), |reply| ManagerCommand::UpdatePlaybackState {
            state,
            reply,
        })
    }

    pub fn get_current_wave(&self) -> Result<Option<CurrentWave>, PlaybackError> {
        self.request(self.config.query_timeout(), |reply| ManagerCommand::GetCurrentWave { reply })
    }

    pub fn set_volume(&self, volume: f32) -> Result<(), PlaybackError> {
        if !(0.0..=1.0).contains(&volume) {
            return Err(PlaybackError::InvalidVolume(volume));
        }
        self.shared.volume.store(volume);
        log::debug!("Audio Manager: Volume set to {:.3}", volume);
        Ok(())
    }

    pub fn get_volume(&self) -> f32 {
        self.shared.volume.load()
    }

    /// Peak bins of the cached full downsample, loudest-first spacing rules
    /// applied. Triggers a full load when the bins are not there yet.
    pub fn detect_peaks_for_wave(&self, path: &str, threshold: f32) -> Result<Vec<usize>, PlaybackError> {
        let snapshot = match self.cache.get_snapshot(path) {
            Some(snapshot) if snapshot.samples_loaded() => snapshot,
            _ => {
                self.cache.request_load(path, LoadKind::Full);
                return Err(PlaybackError::NotLoadedYet {
                    path: path.to_string(),
                });
            }
        };
        let envelope = peaks::envelope(snapshot.full_bins());
        Ok(peaks::detect_peaks(&envelope, threshold, self.config.peak_min_spacing_bins))
    }

    pub fn is_playing(&self) -> bool {
        self.shared.is_playing.load(Ordering::Relaxed)
    }

    pub fn is_paused(&self) -> bool {
        self.shared.is_paused.load(Ordering::Relaxed)
    }

    pub fn current_path(&self) -> Option<String> {
        self.shared.current_path()
    }

    /// Progress of the playing session, or of the paused cursor.
    pub fn current_progress(&self) -> f64 {
        if let Some(session) = self.shared.active_session() {
            return session.tracker.progress();
        }
        self.current_path()
            .and_then(|path| self.remembered_progress(&path))
            .unwrap_or(0.0)
    }

    pub fn current_position(&self) -> Option<u64> {
        if let Some(session) = self.shared.active_session() {
            return Some(session.tracker.absolute_position());
        }
        self.current_path().and_then(|path| self.remembered_cursor(&path))
    }

    pub fn remembered_cursor(&self, path: &str) -> Option<u64> {
        self.shared.remembered_cursor(path)
    }

    pub fn playback_state(&self, path: &str) -> Option<PlaybackState> {
        self.shared.states.get(path).map(|state| state.clone())
    }

    fn remembered_progress(&self, path: &str) -> Option<f64> {
        let cursor = self.shared.remembered_cursor(path)?;
        let region = self.shared.regions.get(path).map(|region| *region)?;
        Some(region.progress_at(cursor))
    }

    /// UI-facing view of one wave, built from its snapshot and lock-free
    /// playback fields. Missing bins are requested in the background.
    pub fn get_wave_display_data(&self, path: &str) -> WaveDisplayData {
        let snapshot = self.cache.get_snapshot(path);
        let needs_load = snapshot
            .as_ref()
            .is_none_or(|s| !s.samples_loaded() && s.last_error().is_none());
        if needs_load {
            self.cache.request_load(path, LoadKind::Full);
        }

        let session = self.shared.active_session().filter(|s| s.path == path);
        let progress = match &session {
            Some(session) => session.tracker.progress(),
            None => self.remembered_progress(path).unwrap_or(0.0),
        };
        let sample_count = snapshot.as_ref().map_or(0, |s| s.sample_count());
        let (bounds_start, bounds_end) = match (self.shared.states.get(path), &session) {
            (Some(state), _) => (state.bounds_start, state.bounds_end),
            (None, Some(session)) => session.bounds,
            (None, None) => (0, sample_count),
        };

        let mut data = WaveDisplayData {
            path: path.to_string(),
            is_loading: self.cache.is_loading(path),
            is_playing: session.is_some(),
            progress,
            bounds_start,
            bounds_end,
            ..WaveDisplayData::default()
        };
        match snapshot {
            Some(snapshot) => {
                let (min_amplitude, max_amplitude) = snapshot.amplitude_range();
                data.name = snapshot.name().to_string();
                data.is_ready = snapshot.samples_loaded();
                data.has_failed = snapshot.last_error().is_some();
                data.error = snapshot.last_error().map(str::to_string);
                data.sample_rate = snapshot.sample_rate();
                data.sample_count = snapshot.sample_count();
                data.samples_per_bin = snapshot.samples_per_bin();
                data.bins = Arc::clone(snapshot.full_bins());
                data.preview = Arc::clone(snapshot.preview_bins());
                data.min_amplitude = min_amplitude;
                data.max_amplitude = max_amplitude;
            }
            None => {
                data.name = crate::audio::cache::WaveSnapshot::pending(path).name().to_string();
            }
        }
        data
    }

    /// Stops output, drains the actor and joins its thread. Idempotent.
    pub fn shutdown(&self) {
        let Some(thread) = self.thread.lock().ok().and_then(|mut guard| guard.take()) else {
            return;
        };
        let (reply_tx, reply_rx) = crossbeam_channel::bounded(1);
        let mut command = ManagerCommand::Shutdown { reply: reply_tx };
        let deadline = std::time::Instant::now() + self.config.play_timeout();
        loop {
            match self.commands.try_send(command) {
                Ok(()) => break,
                Err(TrySendError::Full(returned)) if std::time::Instant::now() < deadline => {
                    command = returned;
                    std::thread::sleep(Duration::from_millis(5));
                }
                Err(_) => {
                    log::error!("Audio Manager: Could not deliver shutdown command");
                    return;
                }
            }
        }
        if reply_rx.recv_timeout(self.config.play_timeout()).is_err() {
            log::warn!("Audio Manager: No shutdown acknowledgement");
        }
        if thread.join().is_err() {
            log::error!("Audio Manager: Actor thread panicked");
        }
    }
}

impl Drop for AudioManager {
    fn drop(&mut self) {
        self.shutdown();
    }
}

// --- Actor Thread Implementation ---

#[allow(clippy::too_many_arguments)]
fn run_audio_manager(
    config: EngineConfig,
    shared: Arc<SharedPlayback>,
    cache: Arc<AsyncWaveCache>,
    decoder: Arc<dyn WaveDecoder>,
    notifier: Arc<dyn NotificationPort>,
    sink_factory: SinkFactory,
    commands: mpsc::Sender<ManagerCommand>,
    mut receiver: mpsc::Receiver<ManagerCommand>,
    ready: crossbeam_channel::Sender<Result<(), PlaybackError>>,
) {
    log::info!("Audio Manager: Starting...");

    let rt = match tokio::runtime::Builder::new_current_thread().enable_time().build() {
        Ok(rt) => rt,
        Err(e) => {
            log::error!("Audio Manager: Failed to build Tokio runtime: {}", e);
            let _ = ready.send(Err(PlaybackError::ActorStopped));
            return;
        }
    };

    let sink = match sink_factory(&config) {
        Ok(sink) => sink,
        Err(e) => {
            log::error!("Audio Manager: Failed to open output: {}. Thread exiting.", e);
            let _ = ready.send(Err(e));
            return;
        }
    };
    log::info!("Audio Manager: Output ready.");

    let mut ctx = ActorContext {
        shared,
        cache,
        decoder,
        notifier,
        commands,
        sink,
        pcm: PcmCache::new(config.pcm_cache_entries),
        paused: None,
        last_path: None,
        edits: HashMap::new(),
        edit_window: config.edit_debounce(),
        timing: MonitorTiming {
            poll: config.monitor_interval(),
            emit_every: config.progress_emit_interval(),
        },
        next_session_id: 0,
    };
    if ready.send(Ok(())).is_err() {
        log::warn!("Audio Manager: Starter went away before the actor was ready");
        return;
    }

    rt.block_on(async move {
        log::info!("Audio Manager: Entering main loop.");
        loop {
            let edit_deadline = ctx.next_edit_deadline();
            tokio::select! {
                maybe_command = receiver.recv() => {
                    let Some(command) = maybe_command else {
                        log::info!("Audio Manager: Command channel closed. Exiting loop.");
                        break;
                    };
                    log::debug!("Audio Manager Received: {}", command.name());
                    if !dispatch(&mut ctx, command).await {
                        break;
                    }
                }
                _ = sleep_until_deadline(edit_deadline), if edit_deadline.is_some() => {
                    handlers::commit_due_edits(&mut ctx, std::time::Instant::now()).await;
                }
            }
        }
        if handlers::take_session(&mut ctx).is_some() {
            log::info!("Audio Manager: Dropped active session on exit");
        }
        log::info!("Audio Manager: Loop finished.");
    });
    log::info!("Audio Manager: Stopped.");
}

async fn sleep_until_deadline(deadline: Option<std::time::Instant>) {
    if let Some(deadline) = deadline {
        tokio::time::sleep_until(tokio::time::Instant::from_std(deadline)).await;
    }
}

/// Runs one command. Returns `false` when the loop should stop.
async fn dispatch(ctx: &mut ActorContext, command: ManagerCommand) -> bool {
    match command {
        ManagerCommand::Play {
            path,
            looping,
            start_sample,
            end_sample,
            owner,
            reply,
        } => {
            let result =
                handlers::audio_manager_handle_play(ctx, path, looping, start_sample, end_sample, owner).await;
            send_reply(&reply, result);
        }
        ManagerCommand::PlayWithState { state, reply } => {
            let result = handlers::audio_manager_handle_play_with_state(ctx, state).await;
            send_reply(&reply, result);
        }
        ManagerCommand::Stop { reply } => {
            send_reply(&reply, handlers::audio_manager_handle_stop(ctx));
        }
        ManagerCommand::Pause { reply } => {
            send_reply(&reply, handlers::audio_manager_handle_pause(ctx));
        }
        ManagerCommand::Resume { reply } => {
            let result = handlers::audio_manager_handle_resume(ctx).await;
            send_reply(&reply, result);
        }
        ManagerCommand::Seek { fraction, reply } => {
            let result = handlers::audio_manager_handle_seek(ctx, fraction).await;
            send_reply(&reply, result);
        }
        ManagerCommand::SetCursor {
            path,
            fraction,
            start_sample,
            end_sample,
            reply,
        } => {
            let result =
                handlers::audio_manager_handle_set_cursor(ctx, path, fraction, start_sample, end_sample).await;
            send_reply(&reply, result);
        }
        ManagerCommand::UpdatePlaybackState { state, reply } => {
            send_reply(&reply, handlers::audio_manager_handle_update_playback_state(ctx, state));
        }
        ManagerCommand::GetCurrentWave { reply } => {
            send_reply(&reply, Ok(handlers::audio_manager_handle_get_current_wave(ctx)));
        }
        ManagerCommand::SessionFinished { session_id } => {
            handlers::audio_manager_handle_session_finished(ctx, session_id).await;
        }
        ManagerCommand::Shutdown { reply } => {
            log::info!("Audio Manager: Shutdown received. Stopping output.");
            if let Err(e) = handlers::audio_manager_handle_stop(ctx) {
                log::warn!("Audio Manager: Stop during shutdown failed: {}", e);
            }
            if reply.send(()).is_err() {
                log::error!("Audio Manager: Failed to send shutdown completion signal.");
            }
            return false;
        }
    }
    true
}
