use crossbeam_channel::{Sender, TrySendError};
use dashmap::DashMap;
use dashmap::mapref::entry::Entry;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::thread::JoinHandle;

use crate::audio::config::EngineConfig;
use crate::audio::decoding::WaveDecoder;
use crate::audio::errors::{CacheError, EngineError};
use crate::audio::events::NotificationPort;
use crate::audio::types::LoadKind;

pub mod snapshot;
mod worker;

pub use snapshot::{SnapshotStore, WaveSnapshot};
use worker::{LoadJob, LoadSettings, LoaderShared};

/// Background loader that turns "I need X for file F" into published
/// snapshots. Requests never block and never fail loudly: a dropped request
/// is simply issued again on the caller's next poll.
pub struct AsyncWaveCache {
    shared: Arc<LoaderShared>,
    jobs: Sender<LoadJob>,
    shutdown: Mutex<Option<Sender<()>>>,
    workers: Mutex<Vec<JoinHandle<()>>>,
}

impl AsyncWaveCache {
    pub fn start(
        config: &EngineConfig,
        store: Arc<SnapshotStore>,
        decoder: Arc<dyn WaveDecoder>,
        notifier: Arc<dyn NotificationPort>,
    ) -> Result<Self, EngineError> {
        let (job_tx, job_rx) = crossbeam_channel::bounded::<LoadJob>(config.load_queue_capacity);
        let (shutdown_tx, shutdown_rx) = crossbeam_channel::bounded::<()>(0);
        let shared = Arc::new(LoaderShared {
            store,
            decoder,
            notifier,
            settings: LoadSettings {
                chunk_frames: config.stream_chunk_frames,
                full_bins: config.full_bins,
                preview_bins: config.preview_bins,
            },
            in_flight: DashMap::new(),
            load_counts: DashMap::new(),
            total_loads: AtomicU64::new(0),
        });

        let cache = AsyncWaveCache {
            shared: Arc::clone(&shared),
            jobs: job_tx,
            shutdown: Mutex::new(Some(shutdown_tx)),
            workers: Mutex::new(Vec::with_capacity(config.load_workers)),
        };

        for index in 0..config.load_workers {
            let name = format!("wave-loader-{}", index);
            let shared = Arc::clone(&shared);
            let jobs = job_rx.clone();
            let shutdown = shutdown_rx.clone();
            let spawned = std::thread::Builder::new()
                .name(name.clone())
                .spawn(move || worker::run_worker(index, shared, jobs, shutdown));
            match spawned {
                Ok(handle) => {
                    if let Ok(mut workers) = cache.workers.lock() {
                        workers.push(handle);
                    }
                }
                Err(source) => {
                    cache.shutdown();
                    return Err(EngineError::ThreadSpawn { name, source });
                }
            }
        }
        log::info!("Wave Loader: Started {} worker(s)", config.load_workers);
        Ok(cache)
    }

    /// Fire-and-forget. A no-op when the data is already published or the
    /// same (path, kind) is queued or loading.
    pub fn request_load(&self, path: &str, kind: LoadKind) {
        if let Some(existing) = self.shared.store.get(path) {
            if worker::is_satisfied(&existing, kind) {
                return;
            }
        }
        let key = (path.to_string(), kind);
        match self.shared.in_flight.entry(key.clone()) {
            Entry::Occupied(_) => {
                log::trace!("Wave Loader: {:?} for '{}' already in flight", kind, path);
                return;
            }
            Entry::Vacant(slot) => {
                slot.insert(());
            }
        }

        let job = LoadJob {
            path: path.to_string(),
            kind,
        };
        match self.jobs.try_send(job) {
            Ok(()) => log::debug!("Wave Loader: Queued {:?} for '{}'", kind, path),
            Err(TrySendError::Full(_)) => {
                self.shared.in_flight.remove(&key);
                log::warn!("{}", CacheError::QueueFull { path: path.to_string() });
            }
            Err(TrySendError::Disconnected(_)) => {
                self.shared.in_flight.remove(&key);
                log::warn!("{} (request for '{}' dropped)", CacheError::WorkersStopped, path);
            }
        }
    }

    pub fn get_snapshot(&self, path: &str) -> Option<Arc<WaveSnapshot>> {
        self.shared.store.get(path)
    }

    pub fn is_loading(&self, path: &str) -> bool {
        [LoadKind::Metadata, LoadKind::Preview, LoadKind::Full]
            .into_iter()
            .any(|kind| self.shared.in_flight.contains_key(&(path.to_string(), kind)))
    }

    /// Forgets everything published for `path`; the next request reloads it.
    pub fn evict(&self, path: &str) -> bool {
        let removed = self.shared.store.remove(path).is_some();
        if removed {
            log::debug!("Wave Loader: Evicted '{}'", path);
        }
        removed
    }

    /// Number of loads that actually executed for `(path, kind)`.
    pub fn load_count(&self, path: &str, kind: LoadKind) -> u64 {
        self.shared
            .load_counts
            .get(&(path.to_string(), kind))
            .map(|count| *count)
            .unwrap_or(0)
    }

    pub fn total_loads(&self) -> u64 {
        self.shared.total_loads.load(Ordering::Relaxed)
    }

    pub fn store(&self) -> &Arc<SnapshotStore> {
        &self.shared.store
    }

    /// Stops the workers and waits for them. Jobs still queued are dropped.
    pub fn shutdown(&self) {
        let signal = self.shutdown.lock().ok().and_then(|mut guard| guard.take());
        if signal.is_none() {
            return;
        }
        drop(signal);
        let handles: Vec<JoinHandle<()>> = match self.workers.lock() {
            Ok(mut workers) => workers.drain(..).collect(),
            Err(_) => Vec::new(),
        };
        for handle in handles {
            if handle.join().is_err() {
                log::error!("Wave Loader: A worker thread panicked during shutdown");
            }
        }
        log::info!("Wave Loader: All workers stopped");
    }
}

impl Drop for AsyncWaveCache {
    fn drop(&mut self) {
        self.shutdown();
    }
}
