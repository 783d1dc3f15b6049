use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use super::shared::AtomicF64;
use crate::audio::output::SampleSource;
use crate::audio::types::PlaybackRegion;

/// Lock-free playback position for one session. The render thread advances
/// it; monitors and UI callers only read it.
#[derive(Debug)]
pub struct ProgressTracker {
    region: PlaybackRegion,
    start_sample: u64,
    played: AtomicU64,
    position: AtomicU64,
    progress: AtomicF64,
    finished: AtomicBool,
}

impl ProgressTracker {
    /// A tracker for a session over `region` that begins at `start_sample`
    /// (clamped into the region).
    pub fn new(region: PlaybackRegion, start_sample: u64) -> Self {
        let start_sample = region.clamp(start_sample);
        ProgressTracker {
            region,
            start_sample,
            played: AtomicU64::new(0),
            position: AtomicU64::new(start_sample),
            progress: AtomicF64::new(region.progress_at(start_sample)),
            finished: AtomicBool::new(false),
        }
    }

    /// Called from the render path after `frames` samples were delivered.
    pub fn advance(&self, frames: u64) {
        let played = self.played.fetch_add(frames, Ordering::Relaxed) + frames;
        let (position, progress) = self.locate(played);
        self.position.store(position, Ordering::Relaxed);
        self.progress.store(progress);
    }

    // Position and progress after `played` samples. Looping sessions wrap
    // inside the region; others clamp at its end.
    fn locate(&self, played: u64) -> (u64, f64) {
        let region = self.region;
        let len = region.len();
        if len == 0 {
            return (region.start, 0.0);
        }
        if region.looping {
            let offset = (self.start_sample - region.start + played) % len;
            (region.start + offset, offset as f64 / len as f64)
        } else {
            let position = (self.start_sample + played).min(region.end);
            (position, region.progress_at(position))
        }
    }

    pub fn mark_finished(&self) {
        self.finished.store(true, Ordering::Release);
    }

    pub fn is_finished(&self) -> bool {
        self.finished.load(Ordering::Acquire)
    }

    /// Absolute sample position in the file.
    pub fn absolute_position(&self) -> u64 {
        self.position.load(Ordering::Relaxed)
    }

    /// Fraction of the region covered, in `0.0..=1.0`.
    pub fn progress(&self) -> f64 {
        self.progress.load()
    }

    pub fn frames_played(&self) -> u64 {
        self.played.load(Ordering::Relaxed)
    }

    /// Completed passes through a looping region.
    pub fn loops_completed(&self) -> u64 {
        let len = self.region.len();
        if !self.region.looping || len == 0 {
            return 0;
        }
        (self.start_sample - self.region.start + self.frames_played()) / len
    }

    pub fn region(&self) -> PlaybackRegion {
        self.region
    }
}

/// Outermost pipeline stage: counts every sample the sink pulls and flags
/// the tracker when the inner stream runs dry.
pub struct ProgressStreamer<S: SampleSource> {
    inner: S,
    tracker: Arc<ProgressTracker>,
}

impl<S: SampleSource> ProgressStreamer<S> {
    pub fn new(inner: S, tracker: Arc<ProgressTracker>) -> Self {
        ProgressStreamer { inner, tracker }
    }
}

impl<S: SampleSource> SampleSource for ProgressStreamer<S> {
    fn fill(&mut self, out: &mut [f32]) -> usize {
        let written = self.inner.fill(out);
        if written > 0 {
            self.tracker.advance(written as u64);
        }
        if written < out.len() && !self.tracker.is_finished() {
            log::trace!("Progress Streamer: Stream ended at {}", self.tracker.absolute_position());
            self.tracker.mark_finished();
        }
        written
    }

    fn sample_rate(&self) -> u32 {
        self.inner.sample_rate()
    }
}
