use symphonia::core::errors::Error as SymphoniaError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum AudioDecodingError {
    #[error("Failed to open file '{path}': {source}")]
    FileOpenError {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("Symphonia probe/format error for '{path}': {source}")]
    FormatError {
        path: String,
        #[source]
        source: SymphoniaError,
    },
    #[error("No suitable audio track in '{path}'")]
    NoSuitableTrack { path: String },
    #[error("Sample rate missing in '{path}'")]
    MissingSampleRate { path: String },
    #[error("Channel info missing in '{path}'")]
    MissingChannelInfo { path: String },
    #[error("Failed to create decoder for '{path}': {source}")]
    DecoderCreationError {
        path: String,
        #[source]
        source: SymphoniaError,
    },
    #[error("Symphonia fatal decode error in '{path}': {source}")]
    FatalDecodeError {
        path: String,
        #[source]
        source: SymphoniaError,
    },
    #[error("Symphonia I/O error reading packet for '{path}': {source}")]
    PacketReadIoError {
        path: String,
        #[source]
        source: SymphoniaError,
    },
    #[error("No samples decoded from '{path}'")]
    NoSamplesDecoded { path: String },
}

#[derive(Error, Debug)]
pub enum CacheError {
    #[error("Load queue is full, dropped request for '{path}'")]
    QueueFull { path: String },
    #[error("Wave loader pool has stopped")]
    WorkersStopped,
    #[error("Decoding failed while loading '{path}': {source}")]
    Decode {
        path: String,
        #[source]
        source: AudioDecodingError,
    },
    #[error("Downsampling '{path}' produced no bins")]
    EmptyDownsample { path: String },
}

#[derive(Error, Debug)]
pub enum PlaybackError {
    #[error("Wave '{path}' is not loaded yet")]
    NotLoadedYet { path: String },
    #[error("Invalid bounds: end ({end}) must be greater than start ({start})")]
    InvalidBounds { start: u64, end: u64 },
    #[error("Invalid slice index {index}: must be within 0..={max}")]
    InvalidSliceIndex { index: usize, max: usize },
    #[error("No samples in range {start}..{end} of '{path}'")]
    NoSamplesInRange { path: String, start: u64, end: u64 },
    #[error("Volume must be within 0.0..=1.0, got {0}")]
    InvalidVolume(f32),
    #[error("Audio command queue is full")]
    CommandQueueFull,
    #[error("Audio command '{command}' timed out waiting for a reply")]
    CommandTimeout { command: &'static str },
    #[error("Audio manager has stopped")]
    ActorStopped,
    #[error("Failed to initialize audio output stream: {0}")]
    OutputStreamInitError(String),
    #[error("Audio output device error: {0}")]
    OutputDevice(String),
    #[error("Audio decoding for playback failed for '{path}': {source}")]
    PlaybackDecodeError {
        path: String,
        #[source]
        source: AudioDecodingError,
    },
    #[error("Audio decoding task panicked for '{path}': {reason}")]
    DecodeTaskPanic { path: String, reason: String },
}

impl PlaybackError {
    /// Errors the caller is expected to retry after the next notification.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self,
            PlaybackError::NotLoadedYet { .. }
                | PlaybackError::CommandQueueFull
                | PlaybackError::CommandTimeout { .. }
        )
    }
}

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("Failed to parse engine config: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("Invalid value for '{field}': {reason}")]
    InvalidValue { field: String, reason: String },
}

#[derive(Error, Debug)]
pub enum EngineError {
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error(transparent)]
    Playback(#[from] PlaybackError),
    #[error("Failed to spawn engine thread '{name}': {source}")]
    ThreadSpawn {
        name: String,
        #[source]
        source: std::io::Error,
    },
}
