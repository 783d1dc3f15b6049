use std::fs::File;
use std::path::Path;
use std::sync::Arc;
use symphonia::core::{
    audio::SampleBuffer,
    codecs::{CODEC_TYPE_NULL, CodecParameters, DecoderOptions},
    errors::Error as SymphoniaError,
    formats::{FormatOptions, FormatReader},
    io::MediaSourceStream,
    meta::MetadataOptions,
    probe::Hint,
};

use super::config::DEFAULT_STREAM_CHUNK_FRAMES;
use super::errors::AudioDecodingError;
use super::types::{DecodedAudio, WaveHeader};

/// Opens audio files, reads their headers and streams their samples as mono
/// `f32`. The cache workers and the audio manager only ever talk to this
/// trait, never to a codec directly.
pub trait WaveDecoder: Send + Sync {
    fn read_header(&self, path: &str) -> Result<WaveHeader, AudioDecodingError>;

    /// Streams the whole file in chunks of at most `chunk_frames` mono frames
    /// and returns the number of frames delivered.
    fn stream_samples(
        &self,
        path: &str,
        chunk_frames: usize,
        on_chunk: &mut dyn FnMut(&[f32]),
    ) -> Result<u64, AudioDecodingError>;

    fn decode_all(&self, path: &str) -> Result<DecodedAudio, AudioDecodingError> {
        let header = self.read_header(path)?;
        let capacity = header.frame_count.unwrap_or(0) as usize;
        let mut samples: Vec<f32> = Vec::with_capacity(capacity);
        self.stream_samples(path, DEFAULT_STREAM_CHUNK_FRAMES, &mut |chunk| {
            samples.extend_from_slice(chunk)
        })?;
        if samples.is_empty() {
            return Err(AudioDecodingError::NoSamplesDecoded {
                path: path.to_string(),
            });
        }
        Ok(DecodedAudio {
            samples: Arc::new(samples),
            sample_rate: header.sample_rate,
        })
    }
}

/// Symphonia-backed decoder covering the formats enabled in Cargo.toml.
#[derive(Debug, Default, Clone, Copy)]
pub struct SymphoniaDecoder;

struct OpenedTrack {
    format: Box<dyn FormatReader>,
    track_id: u32,
    codec_params: CodecParameters,
    sample_rate: u32,
    channels: usize,
}

fn open_track(path: &str) -> Result<OpenedTrack, AudioDecodingError> {
    let file = File::open(path).map_err(|e| AudioDecodingError::FileOpenError {
        path: path.to_string(),
        source: e,
    })?;
    let mss = MediaSourceStream::new(Box::new(file), Default::default());
    let mut hint = Hint::new();
    if let Some(extension) = Path::new(path).extension().and_then(|e| e.to_str()) {
        hint.with_extension(extension);
    }

    let probed = symphonia::default::get_probe()
        .format(&hint, mss, &FormatOptions::default(), &MetadataOptions::default())
        .map_err(|e| AudioDecodingError::FormatError {
            path: path.to_string(),
            source: e,
        })?;
    let format = probed.format;

    let track = format
        .tracks()
        .iter()
        .find(|t| t.codec_params.codec != CODEC_TYPE_NULL && t.codec_params.sample_rate.is_some())
        .ok_or_else(|| AudioDecodingError::NoSuitableTrack {
            path: path.to_string(),
        })?;

    let track_id = track.id;
    let codec_params = track.codec_params.clone();
    let sample_rate = codec_params
        .sample_rate
        .ok_or_else(|| AudioDecodingError::MissingSampleRate {
            path: path.to_string(),
        })?;
    let channels = codec_params
        .channels
        .ok_or_else(|| AudioDecodingError::MissingChannelInfo {
            path: path.to_string(),
        })?
        .count();

    Ok(OpenedTrack {
        format,
        track_id,
        codec_params,
        sample_rate,
        channels,
    })
}

impl WaveDecoder for SymphoniaDecoder {
    fn read_header(&self, path: &str) -> Result<WaveHeader, AudioDecodingError> {
        let opened = open_track(path)?;
        let header = WaveHeader {
            sample_rate: opened.sample_rate,
            bit_depth: opened.codec_params.bits_per_sample,
            channels: opened.channels as u16,
            frame_count: opened.codec_params.n_frames,
        };
        log::debug!("Decoder: Read header for '{}': {:?}", path, header);
        Ok(header)
    }

    fn stream_samples(
        &self,
        path: &str,
        chunk_frames: usize,
        on_chunk: &mut dyn FnMut(&[f32]),
    ) -> Result<u64, AudioDecodingError> {
        let OpenedTrack {
            mut format,
            track_id,
            codec_params,
            channels,
            ..
        } = open_track(path)?;

        let mut decoder = symphonia::default::get_codecs()
            .make(&codec_params, &DecoderOptions::default())
            .map_err(|e| AudioDecodingError::DecoderCreationError {
                path: path.to_string(),
                source: e,
            })?;

        let chunk_frames = chunk_frames.max(1);
        let mut pending: Vec<f32> = Vec::with_capacity(chunk_frames);
        let mut sample_buf: Option<SampleBuffer<f32>> = None;
        let mut total_frames: u64 = 0;

        loop {
            match format.next_packet() {
                Ok(packet) => {
                    if packet.track_id() != track_id {
                        continue;
                    }
                    match decoder.decode(&packet) {
                        Ok(audio_buf) => {
                            if sample_buf.is_none() {
                                sample_buf = Some(SampleBuffer::<f32>::new(
                                    audio_buf.capacity() as u64,
                                    *audio_buf.spec(),
                                ));
                            }
                            if let Some(buf) = sample_buf.as_mut() {
                                buf.copy_interleaved_ref(audio_buf);
                                let raw_samples = buf.samples();
                                if channels > 1 {
                                    pending.extend(
                                        raw_samples
                                            .chunks_exact(channels)
                                            .map(|frame| frame.iter().sum::<f32>() / channels as f32),
                                    );
                                } else {
                                    pending.extend_from_slice(raw_samples);
                                }
                            }
                            while pending.len() >= chunk_frames {
                                on_chunk(&pending[..chunk_frames]);
                                total_frames += chunk_frames as u64;
                                pending.drain(..chunk_frames);
                            }
                        }
                        Err(SymphoniaError::DecodeError(err_desc)) => {
                            log::warn!("Decoder: Ignoring decode error in '{}': {}", path, err_desc);
                        }
                        Err(e) => {
                            return Err(AudioDecodingError::FatalDecodeError {
                                path: path.to_string(),
                                source: e,
                            });
                        }
                    }
                }
                Err(SymphoniaError::IoError(e)) if e.kind() == std::io::ErrorKind::UnexpectedEof => {
                    log::debug!("Decoder: Reached EOF for '{}'", path);
                    break;
                }
                Err(SymphoniaError::ResetRequired) => {
                    log::warn!("Decoder: Reset required unexpectedly for '{}'", path);
                    break;
                }
                Err(e) => {
                    return Err(AudioDecodingError::PacketReadIoError {
                        path: path.to_string(),
                        source: e,
                    });
                }
            }
        }

        decoder.finalize();
        if !pending.is_empty() {
            on_chunk(&pending);
            total_frames += pending.len() as u64;
        }
        log::debug!("Decoder: Streamed {} mono frames from '{}'", total_frames, path);
        if total_frames == 0 {
            return Err(AudioDecodingError::NoSamplesDecoded {
                path: path.to_string(),
            });
        }
        Ok(total_frames)
    }
}
