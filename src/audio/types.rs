use serde::{Deserialize, Serialize};
use std::sync::Arc;

use super::analysis::downsample::MinMaxBins;

// --- Load Kinds ---

/// What a caller needs from the wave cache. Each kind implies the previous
/// ones: a preview load reads the header first, a full load also fills the
/// preview bins.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum LoadKind {
    Metadata,
    Preview,
    Full,
}

// --- Repeat Mode ---

#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq, Default)]
#[serde(rename_all = "camelCase")]
pub enum RepeatMode {
    #[default]
    Off,
    All,
    Slice,
}

// --- Playback Region ---

/// The concrete half-open window `[start, end)` that drives the render
/// pipeline, and whether it wraps at `end`.
#[derive(Serialize, Deserialize, Debug, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "camelCase")]
pub struct PlaybackRegion {
    pub start: u64,
    pub end: u64,
    pub looping: bool,
}

impl PlaybackRegion {
    pub fn new(start: u64, end: u64, looping: bool) -> Self {
        PlaybackRegion { start, end, looping }
    }

    pub fn len(&self) -> u64 {
        self.end.saturating_sub(self.start)
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn contains(&self, sample: u64) -> bool {
        sample >= self.start && sample < self.end
    }

    /// Clamps a sample position into `[start, end - 1]`.
    pub fn clamp(&self, sample: u64) -> u64 {
        if self.is_empty() {
            return self.start;
        }
        sample.clamp(self.start, self.end - 1)
    }

    /// Fraction of the region covered at `sample`, clamped to `0.0..=1.0`.
    pub fn progress_at(&self, sample: u64) -> f64 {
        if self.is_empty() {
            return 0.0;
        }
        (sample.saturating_sub(self.start) as f64 / self.len() as f64).clamp(0.0, 1.0)
    }

    /// Restricts the region to the first `total` samples of a file.
    pub fn limited_to(&self, total: u64) -> Self {
        let end = self.end.min(total);
        PlaybackRegion {
            start: self.start.min(end),
            end,
            looping: self.looping,
        }
    }
}

// --- Decoder Data ---

/// Header information read without decoding sample data.
#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct WaveHeader {
    pub sample_rate: u32,
    pub bit_depth: Option<u32>,
    pub channels: u16,
    /// Frames per channel, when the container states it.
    pub frame_count: Option<u64>,
}

/// Fully decoded mono samples, shared between the actor and render thread.
#[derive(Debug, Clone)]
pub struct DecodedAudio {
    pub samples: Arc<Vec<f32>>,
    pub sample_rate: u32,
}

impl DecodedAudio {
    pub fn len(&self) -> u64 {
        self.samples.len() as u64
    }

    pub fn is_empty(&self) -> bool {
        self.samples.is_empty()
    }
}

// --- UI Facing Data ---

/// Everything the UI needs to draw one waveform. Built from the published
/// snapshot plus lock-free manager fields only.
#[derive(Serialize, Debug, Clone, PartialEq, Default)]
#[serde(rename_all = "camelCase")]
pub struct WaveDisplayData {
    pub path: String,
    pub name: String,
    pub is_ready: bool,
    pub is_loading: bool,
    pub has_failed: bool,
    pub error: Option<String>,
    pub is_playing: bool,
    pub progress: f64,
    pub sample_rate: u32,
    pub sample_count: u64,
    pub samples_per_bin: f64,
    pub bins: Arc<MinMaxBins>,
    pub preview: Arc<MinMaxBins>,
    pub min_amplitude: f32,
    pub max_amplitude: f32,
    pub bounds_start: u64,
    pub bounds_end: u64,
}

/// Consistent view of the session that currently owns the output sink.
#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct CurrentWave {
    pub path: String,
    pub owner: Option<String>,
    pub region: PlaybackRegion,
    pub bounds_start: u64,
    pub bounds_end: u64,
    pub sample_rate: u32,
    pub is_playing: bool,
}
