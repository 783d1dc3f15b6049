pub mod audio;
pub mod context;

pub use audio::cache::{AsyncWaveCache, SnapshotStore, WaveSnapshot};
pub use audio::config::EngineConfig;
pub use audio::decoding::{SymphoniaDecoder, WaveDecoder};
pub use audio::errors::{AudioDecodingError, CacheError, ConfigError, EngineError, PlaybackError};
pub use audio::events::{BroadcastNotifier, EngineEvent, EventKind, NotificationPort, NullNotifier};
pub use audio::output::{CpalOutputSink, OutputSink, PullSink, SampleSource, SinkFactory};
pub use audio::playback::AudioManager;
pub use audio::playback::state::PlaybackState;
pub use audio::types::{CurrentWave, LoadKind, PlaybackRegion, RepeatMode, WaveDisplayData};
pub use context::AudioContext;

/// Installs the `env_logger` backend, honouring `RUST_LOG` and defaulting to
/// `info`. Safe to call more than once.
pub fn init_logging() {
    let _ = env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).try_init();
}
