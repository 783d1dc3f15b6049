use std::sync::{Arc, Mutex};

use super::{OutputSink, SampleSource};
use crate::audio::errors::PlaybackError;

/// Headless sink. The owner of a clone drives rendering with [`PullSink::render`]
/// instead of a device callback, which makes playback deterministic for
/// offline bouncing and tests.
#[derive(Clone, Default)]
pub struct PullSink {
    slot: Arc<Mutex<Option<Box<dyn SampleSource>>>>,
}

impl PullSink {
    pub fn new() -> Self {
        PullSink::default()
    }

    /// Pulls up to `out.len()` samples from the current source. The rest of
    /// `out` is zeroed. A source that comes up short is detached.
    pub fn render(&self, out: &mut [f32]) -> usize {
        let Ok(mut slot) = self.slot.lock() else {
            out.fill(0.0);
            return 0;
        };
        let written = match slot.as_mut() {
            Some(source) => source.fill(out),
            None => 0,
        };
        if written < out.len() {
            out[written..].fill(0.0);
            if slot.take().is_some() {
                log::trace!("Pull Sink: Source ended after {} samples", written);
            }
        }
        written
    }

    /// Convenience wrapper around [`PullSink::render`].
    pub fn render_frames(&self, frames: usize) -> Vec<f32> {
        let mut out = vec![0.0; frames];
        let written = self.render(&mut out);
        out.truncate(written);
        out
    }

    pub fn sample_rate(&self) -> Option<u32> {
        self.slot
            .lock()
            .ok()
            .and_then(|slot| slot.as_ref().map(|source| source.sample_rate()))
    }
}

impl OutputSink for PullSink {
    fn play(&mut self, source: Box<dyn SampleSource>) -> Result<(), PlaybackError> {
        let mut slot = self
            .slot
            .lock()
            .map_err(|_| PlaybackError::OutputDevice("pull sink lock poisoned".to_string()))?;
        *slot = Some(source);
        Ok(())
    }

    fn stop(&mut self) {
        if let Ok(mut slot) = self.slot.lock() {
            slot.take();
        }
    }

    fn is_active(&self) -> bool {
        self.slot.lock().map(|slot| slot.is_some()).unwrap_or(false)
    }
}
