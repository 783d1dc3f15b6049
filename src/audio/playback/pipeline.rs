use std::sync::Arc;

use super::progress::{ProgressStreamer, ProgressTracker};
use super::shared::AtomicF32;
use crate::audio::config::VOLUME_FLOOR_DB;
use crate::audio::output::SampleSource;
use crate::audio::types::{DecodedAudio, PlaybackRegion};

/// Maps a linear 0..1 control to gain over `VOLUME_FLOOR_DB..0 dB`.
/// Zero (or below) is true silence.
pub fn volume_to_gain(volume: f32) -> f32 {
    if volume <= 0.0 {
        return 0.0;
    }
    let db = VOLUME_FLOOR_DB * (1.0 - volume.min(1.0));
    10.0f32.powf(db / 20.0)
}

/// Reads decoded samples inside a region, wrapping at the end when the
/// region loops.
pub struct RegionSource {
    samples: Arc<Vec<f32>>,
    region: PlaybackRegion,
    position: u64,
    sample_rate: u32,
}

impl RegionSource {
    pub fn new(audio: &DecodedAudio, region: PlaybackRegion, start_sample: u64) -> Self {
        let region = region.limited_to(audio.len());
        RegionSource {
            samples: Arc::clone(&audio.samples),
            region,
            position: region.clamp(start_sample),
            sample_rate: audio.sample_rate,
        }
    }
}

impl SampleSource for RegionSource {
    fn fill(&mut self, out: &mut [f32]) -> usize {
        if self.region.is_empty() {
            return 0;
        }
        let mut written = 0;
        while written < out.len() {
            if self.position >= self.region.end {
                if !self.region.looping {
                    break;
                }
                self.position = self.region.start;
            }
            let available = (self.region.end - self.position) as usize;
            let n = available.min(out.len() - written);
            let from = self.position as usize;
            out[written..written + n].copy_from_slice(&self.samples[from..from + n]);
            written += n;
            self.position += n as u64;
        }
        written
    }

    fn sample_rate(&self) -> u32 {
        self.sample_rate
    }
}

/// Applies the shared volume control. Gain is recomputed only when the
/// control moves.
pub struct VolumeSource<S: SampleSource> {
    inner: S,
    volume: Arc<AtomicF32>,
    last_volume: f32,
    gain: f32,
}

impl<S: SampleSource> VolumeSource<S> {
    pub fn new(inner: S, volume: Arc<AtomicF32>) -> Self {
        let last_volume = volume.load();
        VolumeSource {
            inner,
            volume,
            last_volume,
            gain: volume_to_gain(last_volume),
        }
    }
}

impl<S: SampleSource> SampleSource for VolumeSource<S> {
    fn fill(&mut self, out: &mut [f32]) -> usize {
        let written = self.inner.fill(out);
        let volume = self.volume.load();
        if volume != self.last_volume {
            self.last_volume = volume;
            self.gain = volume_to_gain(volume);
        }
        if self.gain != 1.0 {
            for sample in &mut out[..written] {
                *sample *= self.gain;
            }
        }
        written
    }

    fn sample_rate(&self) -> u32 {
        self.inner.sample_rate()
    }
}

/// Full render chain for one session: region reader, volume, progress.
pub fn build_pipeline(
    audio: &DecodedAudio,
    region: PlaybackRegion,
    start_sample: u64,
    volume: Arc<AtomicF32>,
    tracker: Arc<ProgressTracker>,
) -> Box<dyn SampleSource> {
    let reader = RegionSource::new(audio, region, start_sample);
    Box::new(ProgressStreamer::new(VolumeSource::new(reader, volume), tracker))
}
