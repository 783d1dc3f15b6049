use std::time::{Duration, Instant};

/// Delay-coalescing committer for interactive edits. Each `submit` replaces
/// the pending value and restarts the quiet window; `poll` hands out the
/// pending value once the window has passed, and only when it differs from
/// the last value handed out.
#[derive(Debug, Clone)]
pub struct Debouncer<T> {
    window: Duration,
    pending: Option<(T, Instant)>,
    committed: Option<T>,
}

impl<T: Clone + PartialEq> Debouncer<T> {
    pub fn new(window: Duration) -> Self {
        Debouncer {
            window,
            pending: None,
            committed: None,
        }
    }

    /// Starts from a known committed value, so re-submitting it is a no-op.
    pub fn with_committed(window: Duration, committed: T) -> Self {
        Debouncer {
            window,
            pending: None,
            committed: Some(committed),
        }
    }

    pub fn submit(&mut self, value: T, now: Instant) {
        self.pending = Some((value, now + self.window));
    }

    /// When the pending value becomes due, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.pending.as_ref().map(|(_, due)| *due)
    }

    pub fn has_pending(&self) -> bool {
        self.pending.is_some()
    }

    pub fn poll(&mut self, now: Instant) -> Option<T> {
        match &self.pending {
            Some((_, due)) if *due <= now => {}
            _ => return None,
        }
        let (value, _) = self.pending.take()?;
        if self.committed.as_ref() == Some(&value) {
            return None;
        }
        self.committed = Some(value.clone());
        Some(value)
    }

    pub fn committed(&self) -> Option<&T> {
        self.committed.as_ref()
    }
}
