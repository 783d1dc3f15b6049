use arc_swap::ArcSwapOption;
use dashmap::DashMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU32, AtomicU64, Ordering};

use super::progress::ProgressTracker;
use super::state::PlaybackState;
use crate::audio::types::PlaybackRegion;

// --- Atomic Float Cells ---

#[derive(Debug)]
pub struct AtomicF32(AtomicU32);

impl AtomicF32 {
    pub fn new(value: f32) -> Self {
        Self(AtomicU32::new(value.to_bits()))
    }

    pub fn load(&self) -> f32 {
        f32::from_bits(self.0.load(Ordering::Relaxed))
    }

    pub fn store(&self, value: f32) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }
}

#[derive(Debug)]
pub struct AtomicF64(AtomicU64);

impl AtomicF64 {
    pub fn new(value: f64) -> Self {
        Self(AtomicU64::new(value.to_bits()))
    }

    pub fn load(&self) -> f64 {
        f64::from_bits(self.0.load(Ordering::Relaxed))
    }

    pub fn store(&self, value: f64) {
        self.0.store(value.to_bits(), Ordering::Relaxed);
    }
}

impl Default for AtomicF64 {
    fn default() -> Self {
        Self::new(0.0)
    }
}

// --- Active Session ---

/// Everything that describes the session currently on the output sink.
/// Published as one pointer so the tracker and its bounds always belong to
/// the same session.
#[derive(Debug)]
pub(crate) struct ActiveSession {
    pub(crate) id: u64,
    pub(crate) path: String,
    pub(crate) owner: Option<String>,
    pub(crate) tracker: Arc<ProgressTracker>,
    pub(crate) region: PlaybackRegion,
    pub(crate) bounds: (u64, u64),
    pub(crate) sample_rate: u32,
}

/// Lock-free fields shared between the actor (sole writer of the session
/// pointer), per-session monitors and callers on the UI thread.
pub(crate) struct SharedPlayback {
    pub(crate) session: ArcSwapOption<ActiveSession>,
    /// Path of the playing or paused wave.
    pub(crate) current_path: ArcSwapOption<String>,
    pub(crate) is_playing: AtomicBool,
    pub(crate) is_paused: AtomicBool,
    pub(crate) volume: Arc<AtomicF32>,
    pub(crate) cursors: DashMap<String, u64>,
    pub(crate) regions: DashMap<String, PlaybackRegion>,
    pub(crate) states: DashMap<String, PlaybackState>,
}

impl SharedPlayback {
    pub(crate) fn new(initial_volume: f32) -> Self {
        SharedPlayback {
            session: ArcSwapOption::empty(),
            current_path: ArcSwapOption::empty(),
            is_playing: AtomicBool::new(false),
            is_paused: AtomicBool::new(false),
            volume: Arc::new(AtomicF32::new(initial_volume)),
            cursors: DashMap::new(),
            regions: DashMap::new(),
            states: DashMap::new(),
        }
    }

    pub(crate) fn active_session(&self) -> Option<Arc<ActiveSession>> {
        self.session.load_full()
    }

    pub(crate) fn is_current(&self, session: &Arc<ActiveSession>) -> bool {
        self.session
            .load()
            .as_ref()
            .is_some_and(|current| Arc::ptr_eq(current, session))
    }

    pub(crate) fn current_path(&self) -> Option<String> {
        self.current_path.load_full().map(|path| (*path).clone())
    }

    pub(crate) fn remembered_cursor(&self, path: &str) -> Option<u64> {
        self.cursors.get(path).map(|cursor| *cursor)
    }
}
