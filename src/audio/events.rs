use serde::Serialize;
use tokio::sync::broadcast;

// --- Event Kinds ---

#[derive(Serialize, Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[serde(rename_all = "camelCase")]
pub enum EventKind {
    Started,
    Progress,
    Paused,
    Stopped,
    Finished,
    MetadataLoaded,
    SamplesLoaded,
    LoadFailed,
}

impl EventKind {
    pub fn topic(&self) -> &'static str {
        match self {
            EventKind::Started => "playback://started",
            EventKind::Progress => "playback://progress",
            EventKind::Paused => "playback://paused",
            EventKind::Stopped => "playback://stopped",
            EventKind::Finished => "playback://finished",
            EventKind::MetadataLoaded => "wave://metadata-loaded",
            EventKind::SamplesLoaded => "wave://samples-loaded",
            EventKind::LoadFailed => "wave://load-failed",
        }
    }

    pub fn is_playback(&self) -> bool {
        matches!(
            self,
            EventKind::Started
                | EventKind::Progress
                | EventKind::Paused
                | EventKind::Stopped
                | EventKind::Finished
        )
    }
}

// --- Event Payload ---

#[derive(Serialize, Debug, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct EngineEvent {
    pub kind: EventKind,
    pub path: String,
    pub progress: f64,
    /// Absolute sample position in the file.
    pub position: u64,
    /// Length of the active region in samples (file length for load events).
    pub duration: u64,
    /// UI surface that started the session, for subscriber-side filtering.
    pub owner: Option<String>,
    pub error: Option<String>,
}

impl EngineEvent {
    pub fn topic(&self) -> &'static str {
        self.kind.topic()
    }

    pub fn is_for_owner(&self, owner: &str) -> bool {
        self.owner.as_deref() == Some(owner)
    }
}

/// Where the engine sends lifecycle notifications. The engine never knows who
/// listens; hosts bridge this into their own event bus.
pub trait NotificationPort: Send + Sync {
    fn publish(&self, event: EngineEvent);
}

/// Drops every notification. Useful for headless rendering.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullNotifier;

impl NotificationPort for NullNotifier {
    fn publish(&self, _event: EngineEvent) {}
}

/// Fans notifications out to any number of tokio broadcast receivers.
#[derive(Debug, Clone)]
pub struct BroadcastNotifier {
    sender: broadcast::Sender<EngineEvent>,
}

impl BroadcastNotifier {
    pub fn new(capacity: usize) -> Self {
        let (sender, _) = broadcast::channel(capacity.max(1));
        BroadcastNotifier { sender }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<EngineEvent> {
        self.sender.subscribe()
    }
}

impl NotificationPort for BroadcastNotifier {
    fn publish(&self, event: EngineEvent) {
        // No subscribers is not an error for a fire-and-forget bus.
        if self.sender.send(event).is_err() {
            log::trace!("Notifier: No subscribers for engine event");
        }
    }
}

// --- Event Emitter Helpers ---

pub(crate) fn emit_playback_event(
    port: &dyn NotificationPort,
    kind: EventKind,
    path: &str,
    progress: f64,
    position: u64,
    duration: u64,
    owner: Option<&str>,
) {
    log::trace!(
        "Emitting {} for '{}' (progress {:.3}, position {})",
        kind.topic(),
        path,
        progress,
        position
    );
    port.publish(EngineEvent {
        kind,
        path: path.to_string(),
        progress,
        position,
        duration,
        owner: owner.map(str::to_string),
        error: None,
    });
}

pub(crate) fn emit_load_event(port: &dyn NotificationPort, kind: EventKind, path: &str, sample_count: u64) {
    port.publish(EngineEvent {
        kind,
        path: path.to_string(),
        progress: 0.0,
        position: 0,
        duration: sample_count,
        owner: None,
        error: None,
    });
}

pub(crate) fn emit_load_failed_event(port: &dyn NotificationPort, path: &str, error_message: &str) {
    port.publish(EngineEvent {
        kind: EventKind::LoadFailed,
        path: path.to_string(),
        progress: 0.0,
        position: 0,
        duration: 0,
        owner: None,
        error: Some(error_message.to_string()),
    });
}
