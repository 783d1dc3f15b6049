//! Shared fixtures for the integration tests: an in-memory decoder with
//! call counting, a notifier that records everything, and an engine wired
//! to a `PullSink` so tests drive rendering themselves.

#![allow(dead_code)]

use dashmap::DashMap;
use sample_player_lib::audio::types::{DecodedAudio, WaveHeader};
use sample_player_lib::{
    AudioContext, AudioDecodingError, EngineConfig, EngineEvent, EventKind, LoadKind, NotificationPort, OutputSink,
    PlaybackError, PullSink, WaveDecoder,
};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};
use std::time::{Duration, Instant};

pub const WAIT: Duration = Duration::from_secs(5);

#[derive(Clone)]
struct SyntheticWave {
    samples: Arc<Vec<f32>>,
    sample_rate: u32,
    failing: bool,
}

/// Serves generated mono waves by path. Every header read and every sample
/// stream is counted, and both can be slowed down to widen race windows.
#[derive(Default)]
pub struct SyntheticDecoder {
    waves: DashMap<String, SyntheticWave>,
    delay: Mutex<Duration>,
    header_reads: AtomicUsize,
    streams: AtomicUsize,
}

impl SyntheticDecoder {
    pub fn new() -> Arc<Self> {
        Arc::new(SyntheticDecoder::default())
    }

    pub fn add_wave(&self, path: &str, samples: Vec<f32>, sample_rate: u32) {
        self.waves.insert(
            path.to_string(),
            SyntheticWave {
                samples: Arc::new(samples),
                sample_rate,
                failing: false,
            },
        );
    }

    /// A wave of `len` samples at a constant level.
    pub fn add_constant(&self, path: &str, len: usize, level: f32) {
        self.add_wave(path, vec![level; len], 10_000);
    }

    /// A path whose header can be read but whose samples cannot.
    pub fn add_corrupt(&self, path: &str) {
        self.waves.insert(
            path.to_string(),
            SyntheticWave {
                samples: Arc::new(vec![0.0; 1_000]),
                sample_rate: 10_000,
                failing: true,
            },
        );
    }

    pub fn set_delay(&self, delay: Duration) {
        if let Ok(mut current) = self.delay.lock() {
            *current = delay;
        }
    }

    pub fn header_reads(&self) -> usize {
        self.header_reads.load(Ordering::SeqCst)
    }

    pub fn streams(&self) -> usize {
        self.streams.load(Ordering::SeqCst)
    }

    fn pause(&self) {
        let delay = self.delay.lock().map(|d| *d).unwrap_or_default();
        if !delay.is_zero() {
            std::thread::sleep(delay);
        }
    }

    fn wave(&self, path: &str) -> Result<SyntheticWave, AudioDecodingError> {
        self.waves
            .get(path)
            .map(|wave| wave.clone())
            .ok_or_else(|| AudioDecodingError::FileOpenError {
                path: path.to_string(),
                source: std::io::Error::new(std::io::ErrorKind::NotFound, "no such synthetic wave"),
            })
    }
}

impl WaveDecoder for SyntheticDecoder {
    fn read_header(&self, path: &str) -> Result<WaveHeader, AudioDecodingError> {
        self.header_reads.fetch_add(1, Ordering::SeqCst);
        self.pause();
        let wave = self.wave(path)?;
        Ok(WaveHeader {
            sample_rate: wave.sample_rate,
            bit_depth: Some(32),
            channels: 1,
            frame_count: Some(wave.samples.len() as u64),
        })
    }

    fn stream_samples(
        &self,
        path: &str,
        chunk_frames: usize,
        on_chunk: &mut dyn FnMut(&[f32]),
    ) -> Result<u64, AudioDecodingError> {
        self.streams.fetch_add(1, Ordering::SeqCst);
        self.pause();
        let wave = self.wave(path)?;
        if wave.failing {
            return Err(AudioDecodingError::NoSamplesDecoded {
                path: path.to_string(),
            });
        }
        for chunk in wave.samples.chunks(chunk_frames.max(1)) {
            on_chunk(chunk);
        }
        Ok(wave.samples.len() as u64)
    }

    fn decode_all(&self, path: &str) -> Result<DecodedAudio, AudioDecodingError> {
        let wave = self.wave(path)?;
        if wave.failing {
            return Err(AudioDecodingError::NoSamplesDecoded {
                path: path.to_string(),
            });
        }
        Ok(DecodedAudio {
            samples: Arc::clone(&wave.samples),
            sample_rate: wave.sample_rate,
        })
    }
}

/// Keeps every published event in order.
#[derive(Default)]
pub struct RecordingNotifier {
    events: Mutex<Vec<EngineEvent>>,
}

impl RecordingNotifier {
    pub fn new() -> Arc<Self> {
        Arc::new(RecordingNotifier::default())
    }

    pub fn events(&self) -> Vec<EngineEvent> {
        self.events.lock().map(|events| events.clone()).unwrap_or_default()
    }

    pub fn of_kind(&self, kind: EventKind) -> Vec<EngineEvent> {
        self.events().into_iter().filter(|event| event.kind == kind).collect()
    }

    pub fn count(&self, kind: EventKind, path: &str) -> usize {
        self.of_kind(kind).iter().filter(|event| event.path == path).count()
    }

    pub fn wait_for(&self, kind: EventKind, path: &str) -> Option<EngineEvent> {
        let mut found = None;
        wait_until(|| {
            found = self.of_kind(kind).into_iter().find(|event| event.path == path);
            found.is_some()
        });
        found
    }
}

impl NotificationPort for RecordingNotifier {
    fn publish(&self, event: EngineEvent) {
        if let Ok(mut events) = self.events.lock() {
            events.push(event);
        }
    }
}

/// Polls `condition` until it holds or `WAIT` passes.
pub fn wait_until(mut condition: impl FnMut() -> bool) -> bool {
    let deadline = Instant::now() + WAIT;
    while Instant::now() < deadline {
        if condition() {
            return true;
        }
        std::thread::sleep(Duration::from_millis(2));
    }
    condition()
}

pub struct TestEngine {
    pub context: AudioContext,
    pub sink: PullSink,
    pub decoder: Arc<SyntheticDecoder>,
    pub events: Arc<RecordingNotifier>,
}

impl TestEngine {
    /// Loads metadata for `path` and waits until it is published.
    pub fn preload(&self, path: &str) {
        self.context.cache().request_load(path, LoadKind::Metadata);
        let loaded = wait_until(|| {
            self.context
                .cache()
                .get_snapshot(path)
                .is_some_and(|snapshot| snapshot.metadata_loaded())
        });
        assert!(loaded, "metadata for {path} never arrived");
    }

    /// Pulls `frames` samples from the sink in blocks of 512.
    pub fn render(&self, frames: usize) -> Vec<f32> {
        let mut rendered = Vec::with_capacity(frames);
        let mut remaining = frames;
        while remaining > 0 {
            let block = remaining.min(512);
            let mut out = vec![0.0; block];
            self.sink.render(&mut out);
            rendered.extend_from_slice(&out);
            remaining -= block;
        }
        rendered
    }
}

pub fn test_config() -> EngineConfig {
    EngineConfig {
        load_workers: 2,
        edit_debounce_ms: 30,
        monitor_interval_ms: 2,
        progress_emit_interval_ms: 5,
        play_timeout_ms: 2_000,
        query_timeout_ms: 1_000,
        full_bins: 100,
        preview_bins: 10,
        ..EngineConfig::default()
    }
}

pub fn start_engine(decoder: Arc<SyntheticDecoder>) -> TestEngine {
    start_engine_with(decoder, test_config())
}

pub fn start_engine_with(decoder: Arc<SyntheticDecoder>, config: EngineConfig) -> TestEngine {
    let sink = PullSink::new();
    let handle = sink.clone();
    let events = RecordingNotifier::new();
    let context = AudioContext::start(
        config,
        decoder.clone(),
        events.clone(),
        Box::new(move |_: &EngineConfig| -> Result<Box<dyn OutputSink>, PlaybackError> { Ok(Box::new(handle)) }),
    )
    .expect("engine starts");
    TestEngine {
        context,
        sink,
        decoder,
        events,
    }
}
