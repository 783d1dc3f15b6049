use dashmap::DashMap;
use std::path::Path;
use std::sync::Arc;

use crate::audio::analysis::downsample::MinMaxBins;
use crate::audio::errors::CacheError;
use crate::audio::types::WaveHeader;

/// Immutable picture of what is known about one wave file. Every load stage
/// produces a new value; nothing is ever mutated after publication, so a
/// reader holding an `Arc<WaveSnapshot>` sees one consistent state.
#[derive(Debug, Clone, PartialEq)]
pub struct WaveSnapshot {
    path: String,
    name: String,
    sample_rate: u32,
    bit_depth: Option<u32>,
    channels: u16,
    sample_count: u64,
    full: Arc<MinMaxBins>,
    preview: Arc<MinMaxBins>,
    min_amplitude: f32,
    max_amplitude: f32,
    metadata_loaded: bool,
    samples_loaded: bool,
    last_error: Option<String>,
}

fn display_name(path: &str) -> String {
    Path::new(path)
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or(path)
        .to_string()
}

impl WaveSnapshot {
    /// A snapshot with nothing loaded yet.
    pub fn pending(path: &str) -> Self {
        WaveSnapshot {
            path: path.to_string(),
            name: display_name(path),
            sample_rate: 0,
            bit_depth: None,
            channels: 0,
            sample_count: 0,
            full: Arc::new(MinMaxBins::default()),
            preview: Arc::new(MinMaxBins::default()),
            min_amplitude: 0.0,
            max_amplitude: 0.0,
            metadata_loaded: false,
            samples_loaded: false,
            last_error: None,
        }
    }

    pub fn with_metadata(&self, header: &WaveHeader) -> Self {
        WaveSnapshot {
            sample_rate: header.sample_rate,
            bit_depth: header.bit_depth,
            channels: header.channels,
            sample_count: header.frame_count.unwrap_or(self.sample_count),
            metadata_loaded: true,
            last_error: None,
            ..self.clone()
        }
    }

    pub fn with_preview(
        &self,
        preview: impl Into<Arc<MinMaxBins>>,
        sample_count: u64,
    ) -> Result<Self, CacheError> {
        let preview = preview.into();
        if preview.is_empty() {
            return Err(CacheError::EmptyDownsample {
                path: self.path.clone(),
            });
        }
        let (min_amplitude, max_amplitude) = preview.amplitude_range();
        Ok(WaveSnapshot {
            sample_count,
            preview,
            min_amplitude,
            max_amplitude,
            last_error: None,
            ..self.clone()
        })
    }

    /// Publishes full-resolution bins together with their preview reduction.
    /// Refuses empty bins so `samples_loaded` always comes with data.
    pub fn with_samples(
        &self,
        full: impl Into<Arc<MinMaxBins>>,
        preview: impl Into<Arc<MinMaxBins>>,
        sample_count: u64,
    ) -> Result<Self, CacheError> {
        let (full, preview) = (full.into(), preview.into());
        if full.is_empty() || preview.is_empty() {
            return Err(CacheError::EmptyDownsample {
                path: self.path.clone(),
            });
        }
        let (min_amplitude, max_amplitude) = full.amplitude_range();
        Ok(WaveSnapshot {
            sample_count,
            full,
            preview,
            min_amplitude,
            max_amplitude,
            samples_loaded: true,
            last_error: None,
            ..self.clone()
        })
    }

    pub fn with_error(&self, message: &str) -> Self {
        WaveSnapshot {
            last_error: Some(message.to_string()),
            ..self.clone()
        }
    }

    pub fn path(&self) -> &str {
        &self.path
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn sample_rate(&self) -> u32 {
        self.sample_rate
    }

    pub fn bit_depth(&self) -> Option<u32> {
        self.bit_depth
    }

    pub fn channels(&self) -> u16 {
        self.channels
    }

    pub fn sample_count(&self) -> u64 {
        self.sample_count
    }

    pub fn full_bins(&self) -> &Arc<MinMaxBins> {
        &self.full
    }

    pub fn preview_bins(&self) -> &Arc<MinMaxBins> {
        &self.preview
    }

    pub fn amplitude_range(&self) -> (f32, f32) {
        (self.min_amplitude, self.max_amplitude)
    }

    pub fn metadata_loaded(&self) -> bool {
        self.metadata_loaded
    }

    pub fn samples_loaded(&self) -> bool {
        self.samples_loaded
    }

    pub fn preview_loaded(&self) -> bool {
        !self.preview.is_empty()
    }

    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Samples represented by one full-resolution bin; the scale used to turn
    /// slice marker bins into sample positions.
    pub fn samples_per_bin(&self) -> f64 {
        if self.full.is_empty() {
            return 0.0;
        }
        self.sample_count as f64 / self.full.len() as f64
    }

    pub fn duration_secs(&self) -> f64 {
        if self.sample_rate == 0 {
            return 0.0;
        }
        self.sample_count as f64 / self.sample_rate as f64
    }
}

/// Path-keyed table of the latest published snapshot per file.
#[derive(Debug, Default)]
pub struct SnapshotStore {
    entries: DashMap<String, Arc<WaveSnapshot>>,
}

impl SnapshotStore {
    pub fn new() -> Self {
        SnapshotStore::default()
    }

    pub fn get(&self, path: &str) -> Option<Arc<WaveSnapshot>> {
        self.entries.get(path).map(|entry| Arc::clone(entry.value()))
    }

    /// Replaces the snapshot for `path` with `build(current)`. The builder
    /// runs under the entry's shard lock so two stages finishing together
    /// both land; it must only combine already computed data.
    pub fn publish_with<F>(&self, path: &str, build: F) -> Arc<WaveSnapshot>
    where
        F: FnOnce(&WaveSnapshot) -> WaveSnapshot,
    {
        let mut entry = self
            .entries
            .entry(path.to_string())
            .or_insert_with(|| Arc::new(WaveSnapshot::pending(path)));
        let next = Arc::new(build(entry.value()));
        *entry.value_mut() = Arc::clone(&next);
        next
    }

    pub fn remove(&self, path: &str) -> Option<Arc<WaveSnapshot>> {
        self.entries.remove(path).map(|(_, snapshot)| snapshot)
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
