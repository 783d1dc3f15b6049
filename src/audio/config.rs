use serde::{Deserialize, Serialize};
use std::time::Duration;

use super::errors::ConfigError;

// --- Wave Cache Constants ---
pub const DEFAULT_LOAD_WORKERS: usize = 4;
pub const DEFAULT_LOAD_QUEUE_CAPACITY: usize = 256;
/// Frames handed to the downsampler per decoder callback.
pub const DEFAULT_STREAM_CHUNK_FRAMES: usize = 4096;
pub const DEFAULT_FULL_BINS: usize = 4096;
pub const DEFAULT_PREVIEW_BINS: usize = 256;

// --- Audio Manager Constants ---
pub const DEFAULT_COMMAND_QUEUE_CAPACITY: usize = 32;
pub const DEFAULT_QUERY_TIMEOUT_MS: u64 = 250;
// Play replies wait for the first decode of a file.
pub const DEFAULT_PLAY_TIMEOUT_MS: u64 = 5_000;
pub const DEFAULT_PCM_CACHE_ENTRIES: usize = 4;

// --- Progress Monitor Constants ---
/// Poll interval of the per-session monitor (~ one render quantum).
pub const DEFAULT_MONITOR_INTERVAL_MS: u64 = 12;
/// Minimum spacing of outbound progress notifications (~30/s).
pub const DEFAULT_PROGRESS_EMIT_INTERVAL_MS: u64 = 33;
pub const DEFAULT_EDIT_DEBOUNCE_MS: u64 = 120;

// --- Volume Constants ---
pub const VOLUME_FLOOR_DB: f32 = -60.0;
pub const INITIAL_VOLUME: f32 = 1.0;

// --- Peak Detection Constants ---
pub const DEFAULT_PEAK_MIN_SPACING_BINS: usize = 8;

// --- Output Constants ---
pub const FALLBACK_OUTPUT_SAMPLE_RATES: [u32; 2] = [48_000, 44_100];

/// Runtime settings for the engine. Every field has a default taken from the
/// constants above, so hosts only spell out what they override.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase", default)]
pub struct EngineConfig {
    pub load_workers: usize,
    pub load_queue_capacity: usize,
    pub stream_chunk_frames: usize,
    pub full_bins: usize,
    pub preview_bins: usize,
    pub command_queue_capacity: usize,
    pub query_timeout_ms: u64,
    pub play_timeout_ms: u64,
    pub pcm_cache_entries: usize,
    pub monitor_interval_ms: u64,
    pub progress_emit_interval_ms: u64,
    pub edit_debounce_ms: u64,
    pub peak_min_spacing_bins: usize,
    /// Fixed output buffer size in frames; `None` lets the device decide.
    pub output_buffer_frames: Option<u32>,
}

impl Default for EngineConfig {
    fn default() -> Self {
        EngineConfig {
            load_workers: DEFAULT_LOAD_WORKERS,
            load_queue_capacity: DEFAULT_LOAD_QUEUE_CAPACITY,
            stream_chunk_frames: DEFAULT_STREAM_CHUNK_FRAMES,
            full_bins: DEFAULT_FULL_BINS,
            preview_bins: DEFAULT_PREVIEW_BINS,
            command_queue_capacity: DEFAULT_COMMAND_QUEUE_CAPACITY,
            query_timeout_ms: DEFAULT_QUERY_TIMEOUT_MS,
            play_timeout_ms: DEFAULT_PLAY_TIMEOUT_MS,
            pcm_cache_entries: DEFAULT_PCM_CACHE_ENTRIES,
            monitor_interval_ms: DEFAULT_MONITOR_INTERVAL_MS,
            progress_emit_interval_ms: DEFAULT_PROGRESS_EMIT_INTERVAL_MS,
            edit_debounce_ms: DEFAULT_EDIT_DEBOUNCE_MS,
            peak_min_spacing_bins: DEFAULT_PEAK_MIN_SPACING_BINS,
            output_buffer_frames: None,
        }
    }
}

impl EngineConfig {
    /// Parses engine settings embedded in a host's JSON document.
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: EngineConfig = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let non_zero = [
            ("loadWorkers", self.load_workers),
            ("loadQueueCapacity", self.load_queue_capacity),
            ("streamChunkFrames", self.stream_chunk_frames),
            ("fullBins", self.full_bins),
            ("previewBins", self.preview_bins),
            ("commandQueueCapacity", self.command_queue_capacity),
            ("pcmCacheEntries", self.pcm_cache_entries),
        ];
        for (field, value) in non_zero {
            if value == 0 {
                return Err(ConfigError::InvalidValue {
                    field: field.to_string(),
                    reason: "must be greater than zero".to_string(),
                });
            }
        }
        if self.preview_bins > self.full_bins {
            return Err(ConfigError::InvalidValue {
                field: "previewBins".to_string(),
                reason: format!("must not exceed fullBins ({})", self.full_bins),
            });
        }
        if self.monitor_interval_ms == 0 {
            return Err(ConfigError::InvalidValue {
                field: "monitorIntervalMs".to_string(),
                reason: "must be greater than zero".to_string(),
            });
        }
        Ok(())
    }

    pub fn query_timeout(&self) -> Duration {
        Duration::from_millis(self.query_timeout_ms)
    }

    pub fn play_timeout(&self) -> Duration {
        Duration::from_millis(self.play_timeout_ms)
    }

    pub fn monitor_interval(&self) -> Duration {
        Duration::from_millis(self.monitor_interval_ms)
    }

    pub fn progress_emit_interval(&self) -> Duration {
        Duration::from_millis(self.progress_emit_interval_ms)
    }

    pub fn edit_debounce(&self) -> Duration {
        Duration::from_millis(self.edit_debounce_ms)
    }
}
