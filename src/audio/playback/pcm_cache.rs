use std::collections::VecDeque;

use crate::audio::types::DecodedAudio;

/// Decoded buffers of the most recently played waves, newest last. Lives on
/// the actor thread only.
#[derive(Debug)]
pub(crate) struct PcmCache {
    capacity: usize,
    entries: VecDeque<(String, DecodedAudio)>,
}

impl PcmCache {
    pub(crate) fn new(capacity: usize) -> Self {
        PcmCache {
            capacity: capacity.max(1),
            entries: VecDeque::with_capacity(capacity.max(1)),
        }
    }

    pub(crate) fn get(&mut self, path: &str) -> Option<DecodedAudio> {
        let index = self.entries.iter().position(|(p, _)| p == path)?;
        let entry = self.entries.remove(index)?;
        let audio = entry.1.clone();
        self.entries.push_back(entry);
        Some(audio)
    }

    pub(crate) fn insert(&mut self, path: &str, audio: DecodedAudio) {
        self.entries.retain(|(p, _)| p != path);
        while self.entries.len() >= self.capacity {
            if let Some((evicted, _)) = self.entries.pop_front() {
                log::debug!("Audio Manager: Dropped decoded samples of '{}'", evicted);
            }
        }
        self.entries.push_back((path.to_string(), audio));
    }
}
