use crate::audio::config::EngineConfig;
use crate::audio::errors::PlaybackError;

pub mod cpal_sink;
pub mod pull_sink;

pub use cpal_sink::CpalOutputSink;
pub use pull_sink::PullSink;

/// A mono sample producer pulled by an output sink.
pub trait SampleSource: Send {
    /// Writes up to `out.len()` samples and returns how many were written.
    /// Returning fewer than requested means the stream has ended.
    fn fill(&mut self, out: &mut [f32]) -> usize;

    fn sample_rate(&self) -> u32;
}

/// The single audio output. Only the audio manager's actor thread holds one,
/// so implementations need not be `Send` (cpal streams are not on every
/// platform).
pub trait OutputSink {
    /// Replaces whatever is playing with `source` and starts output.
    fn play(&mut self, source: Box<dyn SampleSource>) -> Result<(), PlaybackError>;

    fn stop(&mut self);

    fn is_active(&self) -> bool;
}

/// Builds the sink on the actor thread.
pub type SinkFactory =
    Box<dyn FnOnce(&EngineConfig) -> Result<Box<dyn OutputSink>, PlaybackError> + Send>;
