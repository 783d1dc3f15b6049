use std::sync::Arc;

use crate::audio::cache::{AsyncWaveCache, SnapshotStore};
use crate::audio::config::EngineConfig;
use crate::audio::decoding::WaveDecoder;
use crate::audio::errors::EngineError;
use crate::audio::events::NotificationPort;
use crate::audio::output::SinkFactory;
use crate::audio::playback::AudioManager;

/// The engine as one value: snapshot store, loader pool and playback actor,
/// built once by the host and shared by reference.
pub struct AudioContext {
    cache: Arc<AsyncWaveCache>,
    manager: AudioManager,
    config: EngineConfig,
}

impl AudioContext {
    pub fn start(
        config: EngineConfig,
        decoder: Arc<dyn WaveDecoder>,
        notifier: Arc<dyn NotificationPort>,
        sink_factory: SinkFactory,
    ) -> Result<Self, EngineError> {
        config.validate()?;
        let store = Arc::new(SnapshotStore::new());
        let cache = Arc::new(AsyncWaveCache::start(
            &config,
            store,
            Arc::clone(&decoder),
            Arc::clone(&notifier),
        )?);
        let manager = match AudioManager::start(&config, Arc::clone(&cache), decoder, notifier, sink_factory) {
            Ok(manager) => manager,
            Err(e) => {
                cache.shutdown();
                return Err(e);
            }
        };
        log::info!("Audio Context: Engine started");
        Ok(AudioContext { cache, manager, config })
    }

    pub fn cache(&self) -> &AsyncWaveCache {
        &self.cache
    }

    pub fn manager(&self) -> &AudioManager {
        &self.manager
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    /// Stops output and the actor first, then the loader workers.
    pub fn shutdown(&self) {
        log::info!("Audio Context: Shutting down");
        self.manager.shutdown();
        self.cache.shutdown();
    }
}

impl Drop for AudioContext {
    fn drop(&mut self) {
        self.shutdown();
    }
}
