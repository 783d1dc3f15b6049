use crossbeam_channel::{Receiver, select};
use dashmap::DashMap;
use std::panic::{self, AssertUnwindSafe};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};

use super::snapshot::{SnapshotStore, WaveSnapshot};
use crate::audio::analysis::downsample::{BinAccumulator, MinMaxBins, downsample_min_max, reduce_bins};
use crate::audio::decoding::WaveDecoder;
use crate::audio::errors::{AudioDecodingError, CacheError};
use crate::audio::events::{EventKind, NotificationPort, emit_load_event, emit_load_failed_event};
use crate::audio::types::{LoadKind, WaveHeader};

pub(crate) type LoadKey = (String, LoadKind);

#[derive(Debug, Clone)]
pub(crate) struct LoadJob {
    pub(crate) path: String,
    pub(crate) kind: LoadKind,
}

impl LoadJob {
    pub(crate) fn key(&self) -> LoadKey {
        (self.path.clone(), self.kind)
    }
}

/// Bin counts and chunking used by every worker.
#[derive(Debug, Clone, Copy)]
pub(crate) struct LoadSettings {
    pub(crate) chunk_frames: usize,
    pub(crate) full_bins: usize,
    pub(crate) preview_bins: usize,
}

/// State shared between the cache handle and its worker threads.
pub(crate) struct LoaderShared {
    pub(crate) store: Arc<SnapshotStore>,
    pub(crate) decoder: Arc<dyn WaveDecoder>,
    pub(crate) notifier: Arc<dyn NotificationPort>,
    pub(crate) settings: LoadSettings,
    pub(crate) in_flight: DashMap<LoadKey, ()>,
    pub(crate) load_counts: DashMap<LoadKey, u64>,
    pub(crate) total_loads: AtomicU64,
}

/// Whether `snapshot` already carries what a `kind` request asks for.
pub(crate) fn is_satisfied(snapshot: &WaveSnapshot, kind: LoadKind) -> bool {
    match kind {
        LoadKind::Metadata => snapshot.metadata_loaded(),
        LoadKind::Preview => snapshot.metadata_loaded() && snapshot.preview_loaded(),
        LoadKind::Full => snapshot.samples_loaded(),
    }
}

pub(crate) fn run_worker(index: usize, shared: Arc<LoaderShared>, jobs: Receiver<LoadJob>, shutdown: Receiver<()>) {
    log::debug!("Wave Loader {}: Started", index);
    loop {
        select! {
            recv(jobs) -> message => match message {
                Ok(job) => {
                    let outcome = panic::catch_unwind(AssertUnwindSafe(|| process_job(&shared, &job)));
                    if outcome.is_err() {
                        log::error!("Wave Loader {}: Load of '{}' panicked", index, job.path);
                        record_failure(&shared, &job.path, "Wave loader panicked");
                    }
                    // Cleared only after the result is published, so a request
                    // racing with completion either sees the snapshot or queues
                    // a job that finds the work already done.
                    shared.in_flight.remove(&job.key());
                }
                Err(_) => break,
            },
            recv(shutdown) -> _ => break,
        }
    }
    log::debug!("Wave Loader {}: Stopped", index);
}

fn record_failure(shared: &LoaderShared, path: &str, message: &str) {
    shared.store.publish_with(path, |current| current.with_error(message));
    emit_load_failed_event(shared.notifier.as_ref(), path, message);
}

fn process_job(shared: &LoaderShared, job: &LoadJob) {
    let path = job.path.as_str();
    if let Some(existing) = shared.store.get(path) {
        if is_satisfied(&existing, job.kind) {
            log::trace!("Wave Loader: '{}' already has {:?}, skipping", path, job.kind);
            return;
        }
    }

    *shared.load_counts.entry(job.key()).or_insert(0) += 1;
    shared.total_loads.fetch_add(1, Ordering::Relaxed);
    log::debug!("Wave Loader: Loading {:?} for '{}'", job.kind, path);

    let header = match ensure_metadata(shared, path) {
        Ok(header) => header,
        Err(e) => {
            log::warn!("Wave Loader: Metadata load failed for '{}': {}", path, e);
            record_failure(shared, path, &e.to_string());
            return;
        }
    };
    if job.kind == LoadKind::Metadata {
        return;
    }

    if let Err(e) = load_bins(shared, path, job.kind, &header) {
        log::warn!("Wave Loader: {:?} load failed for '{}': {}", job.kind, path, e);
        record_failure(shared, path, &e.to_string());
    }
}

fn ensure_metadata(shared: &LoaderShared, path: &str) -> Result<WaveHeader, CacheError> {
    if let Some(existing) = shared.store.get(path) {
        if existing.metadata_loaded() {
            return Ok(WaveHeader {
                sample_rate: existing.sample_rate(),
                bit_depth: existing.bit_depth(),
                channels: existing.channels(),
                frame_count: Some(existing.sample_count()).filter(|n| *n > 0),
            });
        }
    }
    let header = shared.decoder.read_header(path).map_err(|source| decode_error(path, source))?;
    let published = shared.store.publish_with(path, |current| current.with_metadata(&header));
    log::info!(
        "Wave Loader: Metadata for '{}': {} Hz, {} channel(s), {} frames",
        path,
        header.sample_rate,
        header.channels,
        published.sample_count()
    );
    emit_load_event(shared.notifier.as_ref(), EventKind::MetadataLoaded, path, published.sample_count());
    Ok(header)
}

fn decode_error(path: &str, source: AudioDecodingError) -> CacheError {
    CacheError::Decode {
        path: path.to_string(),
        source,
    }
}

/// Streams the whole file once and reduces it to `bins` min/max pairs.
/// Falls back to an in-memory reduction when the header has no frame count.
fn stream_bins(
    shared: &LoaderShared,
    path: &str,
    bins: usize,
    header: &WaveHeader,
) -> Result<(MinMaxBins, u64), CacheError> {
    let chunk_frames = shared.settings.chunk_frames;
    match header.frame_count.filter(|n| *n > 0) {
        Some(expected) => {
            let mut accumulator = BinAccumulator::new(expected, bins);
            shared
                .decoder
                .stream_samples(path, chunk_frames, &mut |chunk| accumulator.push(chunk))
                .map_err(|source| decode_error(path, source))?;
            let frames = accumulator.frames_seen();
            Ok((accumulator.finish(), frames))
        }
        None => {
            let mut samples: Vec<f32> = Vec::new();
            shared
                .decoder
                .stream_samples(path, chunk_frames, &mut |chunk| samples.extend_from_slice(chunk))
                .map_err(|source| decode_error(path, source))?;
            Ok((downsample_min_max(&samples, bins), samples.len() as u64))
        }
    }
}

fn load_bins(shared: &LoaderShared, path: &str, kind: LoadKind, header: &WaveHeader) -> Result<(), CacheError> {
    let settings = shared.settings;
    let published = match kind {
        LoadKind::Preview => {
            let (preview, frames) = stream_bins(shared, path, settings.preview_bins, header)?;
            if preview.is_empty() {
                return Err(CacheError::EmptyDownsample { path: path.to_string() });
            }
            let preview = Arc::new(preview);
            shared.store.publish_with(path, |current| {
                // A preview never downgrades a snapshot that already holds full bins.
                if current.samples_loaded() {
                    return current.clone();
                }
                current
                    .with_preview(Arc::clone(&preview), frames)
                    .unwrap_or_else(|_| current.clone())
            })
        }
        LoadKind::Full => {
            let (full, frames) = stream_bins(shared, path, settings.full_bins, header)?;
            let preview = reduce_bins(&full, settings.preview_bins);
            if full.is_empty() || preview.is_empty() {
                return Err(CacheError::EmptyDownsample { path: path.to_string() });
            }
            let (full, preview) = (Arc::new(full), Arc::new(preview));
            shared.store.publish_with(path, |current| {
                current
                    .with_samples(Arc::clone(&full), Arc::clone(&preview), frames)
                    .unwrap_or_else(|_| current.clone())
            })
        }
        LoadKind::Metadata => return Ok(()),
    };
    log::info!(
        "Wave Loader: {:?} bins ready for '{}' ({} frames)",
        kind,
        path,
        published.sample_count()
    );
    emit_load_event(shared.notifier.as_ref(), EventKind::SamplesLoaded, path, published.sample_count());
    Ok(())
}
