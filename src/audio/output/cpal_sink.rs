use cpal::traits::{DeviceTrait, HostTrait, StreamTrait};
use cpal::{Device, SampleFormat, StreamConfig, SupportedStreamConfigRange};

use super::{OutputSink, SampleSource};
use crate::audio::config::{EngineConfig, FALLBACK_OUTPUT_SAMPLE_RATES};
use crate::audio::errors::PlaybackError;

/// Default output device driven by cpal. The mono source is copied to every
/// output channel.
pub struct CpalOutputSink {
    device: Device,
    buffer_frames: Option<u32>,
    stream: Option<cpal::Stream>,
}

impl CpalOutputSink {
    pub fn open_default(config: &EngineConfig) -> Result<Self, PlaybackError> {
        let host = cpal::default_host();
        let device = host
            .default_output_device()
            .ok_or_else(|| PlaybackError::OutputDevice("no default output device".to_string()))?;
        log::info!(
            "Output: Using device '{}'",
            device.name().unwrap_or_else(|_| "unknown".to_string())
        );
        Ok(CpalOutputSink {
            device,
            buffer_frames: config.output_buffer_frames,
            stream: None,
        })
    }

    fn stream_config_for(&self, source_rate: u32) -> Result<StreamConfig, PlaybackError> {
        let ranges = match self.device.supported_output_configs() {
            Ok(configs) => configs.collect::<Vec<_>>(),
            Err(e) => {
                log::warn!("Output: Could not list supported configs, using default: {}", e);
                Vec::new()
            }
        };
        let (channels, sample_rate) = match choose_output_config(&ranges, source_rate) {
            Some(choice) => choice,
            None => {
                let default = self
                    .device
                    .default_output_config()
                    .map_err(|e| PlaybackError::OutputStreamInitError(e.to_string()))?;
                log::warn!("Output: Falling back to default output config: {:?}", default);
                (default.channels(), default.sample_rate().0)
            }
        };

        if sample_rate != source_rate {
            log::warn!(
                "Output: Sample rate mismatch. Source: {} Hz, stream: {} Hz. Playback speed will differ.",
                source_rate,
                sample_rate
            );
        }
        Ok(StreamConfig {
            channels,
            sample_rate: cpal::SampleRate(sample_rate),
            buffer_size: match self.buffer_frames {
                Some(frames) => cpal::BufferSize::Fixed(frames),
                None => cpal::BufferSize::Default,
            },
        })
    }
}

fn supports_rate(range: &SupportedStreamConfigRange, rate: u32) -> bool {
    range.min_sample_rate().0 <= rate && range.max_sample_rate().0 >= rate
}

/// Picks `(channels, sample_rate)` for an f32 stream: the source rate if any
/// range supports it, then the fallback rates, then the widest range. Stereo
/// is preferred at each step.
pub(crate) fn choose_output_config(ranges: &[SupportedStreamConfigRange], source_rate: u32) -> Option<(u16, u32)> {
    let f32_ranges: Vec<&SupportedStreamConfigRange> = ranges
        .iter()
        .filter(|range| range.sample_format() == SampleFormat::F32)
        .collect();

    let candidates = std::iter::once(source_rate).chain(FALLBACK_OUTPUT_SAMPLE_RATES);
    for rate in candidates {
        let matching: Vec<&SupportedStreamConfigRange> = f32_ranges
            .iter()
            .copied()
            .filter(|range| supports_rate(range, rate))
            .collect();
        if let Some(stereo) = matching.iter().find(|range| range.channels() == 2) {
            return Some((stereo.channels(), rate));
        }
        if let Some(range) = matching.first() {
            return Some((range.channels(), rate));
        }
    }

    f32_ranges
        .iter()
        .max_by(|a, b| {
            a.channels()
                .cmp(&b.channels())
                .then_with(|| a.max_sample_rate().cmp(&b.max_sample_rate()))
        })
        .map(|range| (range.channels(), range.max_sample_rate().0))
}

/// Mono scratch size when the device picks its own buffer size.
const MIN_SCRATCH_FRAMES: usize = 8_192;

/// Fills an interleaved device buffer from a mono source, one scratch-sized
/// block at a time so the callback never allocates. Returns true once the
/// source has ended; everything after its last sample is silence.
pub(crate) fn render_interleaved(
    source: &mut dyn SampleSource,
    scratch: &mut [f32],
    output: &mut [f32],
    channels: usize,
) -> bool {
    let block_frames = scratch.len().max(1);
    let mut ended = false;
    for block in output.chunks_mut(channels * block_frames) {
        if ended {
            block.fill(0.0);
            continue;
        }
        let frames = block.len() / channels;
        let mono = &mut scratch[..frames];
        let written = source.fill(mono);
        mono[written..].fill(0.0);
        for (frame_out, sample) in block.chunks_mut(channels).zip(mono.iter()) {
            frame_out.fill(*sample);
        }
        ended = written < frames;
    }
    ended
}

impl OutputSink for CpalOutputSink {
    fn play(&mut self, mut source: Box<dyn SampleSource>) -> Result<(), PlaybackError> {
        if self.stream.take().is_some() {
            log::debug!("Output: Dropped previous stream");
        }
        let stream_config = self.stream_config_for(source.sample_rate())?;
        let channels = stream_config.channels.max(1) as usize;

        let scratch_frames = self
            .buffer_frames
            .map_or(MIN_SCRATCH_FRAMES, |frames| (frames as usize).max(MIN_SCRATCH_FRAMES));
        let mut mono = vec![0.0f32; scratch_frames];
        let mut ended = false;
        let data_callback = move |output: &mut [f32], _info: &cpal::OutputCallbackInfo| {
            if ended {
                output.fill(0.0);
                return;
            }
            ended = render_interleaved(source.as_mut(), &mut mono, output, channels);
        };
        let error_callback = |err: cpal::StreamError| {
            log::error!("Output: CPAL stream error: {}", err);
        };

        let stream = self
            .device
            .build_output_stream(&stream_config, data_callback, error_callback, None)
            .map_err(|e| PlaybackError::OutputStreamInitError(e.to_string()))?;
        stream
            .play()
            .map_err(|e| PlaybackError::OutputStreamInitError(e.to_string()))?;
        log::info!(
            "Output: Stream started with {} channel(s) at {} Hz",
            stream_config.channels,
            stream_config.sample_rate.0
        );
        self.stream = Some(stream);
        Ok(())
    }

    fn stop(&mut self) {
        if let Some(stream) = self.stream.take() {
            if let Err(e) = stream.pause() {
                log::warn!("Output: Failed to pause stream before drop: {}", e);
            }
        }
    }

    fn is_active(&self) -> bool {
        self.stream.is_some()
    }
}
