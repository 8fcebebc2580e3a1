/// Asset loading service
///
/// Orchestrates cache lookup, request deduplication, priority queueing and
/// dispatch to the decode provider. Queue, limiter and cache live behind a
/// single lock so every mutation of scheduler state happens in one linear
/// history. Decodes run outside the lock on the tokio runtime; callbacks are
/// delivered on the presentation context.

use parking_lot::Mutex;
use std::sync::Arc;
use tokio::runtime::Handle;
use tokio::sync::broadcast;
use tokio_util::sync::CancellationToken;

use super::cache::ResultCache;
use super::limiter::{ActiveLoad, ConcurrencyLimiter};
use super::present::Presenter;
use super::provider::{AssetProvider, DecodeOutcome};
use super::queue::LoadQueue;
use super::types::{AssetRef, DecodeParams, DecodeSize, LoadingTask, Priority, Quality, Resource, TaskKey};
use crate::config::LoadingConfig;

/// What `load_image` did with a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Admission {
    /// Served from the cache; the callback is already scheduled
    CacheHit,
    /// Queued for decoding
    Enqueued,
    /// The key is already queued or in flight; the request was dropped and
    /// its callback will never run
    Duplicate,
}

/// Terminal state of a queued or dispatched request
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LoadOutcome {
    Completed,
    /// Provider error or empty result; the callback received `None`
    Failed(String),
    /// Cancelled before completing; the callback never runs
    Cancelled,
}

/// Published exactly once per task that reaches a terminal state
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LoadEvent {
    pub key: TaskKey,
    pub outcome: LoadOutcome,
}

/// Point-in-time counters
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct LoaderStats {
    pub queued: usize,
    pub active: usize,
    pub cached: usize,
}

/// Cloneable handle to the loading pipeline
#[derive(Clone)]
pub struct LoadingService {
    shared: Arc<Shared>,
}

struct Shared {
    state: Mutex<Scheduler>,
    provider: Arc<dyn AssetProvider>,
    presenter: Presenter,
    events: broadcast::Sender<LoadEvent>,
    runtime: Handle,
    thumbnail_size: DecodeSize,
    preview_size: DecodeSize,
}

struct Scheduler {
    queue: LoadQueue,
    limiter: ConcurrencyLimiter,
    cache: ResultCache<TaskKey, Resource>,
    next_dispatch: u64,
}

impl LoadingService {
    pub fn new(
        config: &LoadingConfig,
        provider: Arc<dyn AssetProvider>,
        presenter: Presenter,
        runtime: Handle,
    ) -> Self {
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        let state = Scheduler {
            queue: LoadQueue::new(),
            limiter: ConcurrencyLimiter::new(config.max_concurrent_loads),
            cache: ResultCache::new(config.cache_size),
            next_dispatch: 0,
        };

        Self {
            shared: Arc::new(Shared {
                state: Mutex::new(state),
                provider,
                presenter,
                events,
                runtime,
                thumbnail_size: config.thumbnail_size,
                preview_size: config.preview_size,
            }),
        }
    }

    /// Request `asset` at `quality`
    ///
    /// A cached resource is delivered right away. Otherwise the request is
    /// queued unless the same (asset, quality) is already queued or in
    /// flight, in which case it is dropped.
    pub fn load_image<F>(&self, asset: &AssetRef, quality: Quality, priority: Priority, callback: F) -> Admission
    where
        F: FnOnce(Option<Resource>) + Send + 'static,
    {
        let key = TaskKey::new(asset.id.clone(), quality);
        let mut state = self.shared.state.lock();

        if let Some(resource) = state.cache.get(&key) {
            drop(state);
            log::trace!("Cache hit: {}", key);
            self.shared.presenter.run(move || callback(Some(resource)));
            return Admission::CacheHit;
        }

        if state.queue.contains(&key) || state.limiter.is_active(&key) {
            log::debug!("Already loading, dropping request: {}", key);
            return Admission::Duplicate;
        }

        let task = LoadingTask::new(asset.clone(), quality, priority, Box::new(callback));
        if let Err(err) = state.queue.enqueue(task) {
            log::debug!("{}", err);
            return Admission::Duplicate;
        }
        log::debug!("Queued {} at {:?} ({} waiting)", key, priority, state.queue.len());

        self.shared.drain(&mut state);
        Admission::Enqueued
    }

    /// Cancel a queued or in-flight request
    ///
    /// The pending callback never runs. Unknown keys are ignored. Returns
    /// whether anything was cancelled.
    pub fn cancel_loading(&self, key: &TaskKey) -> bool {
        let mut state = self.shared.state.lock();

        let active = state.limiter.release(key);
        if let Some(load) = &active {
            self.shared.provider.cancel(&load.token);
            log::debug!("Cancelled in-flight request: {}", key);
        }
        let queued = state.queue.remove(key).is_some();
        if queued {
            log::trace!("Removed queued request: {}", key);
        }

        let cancelled = active.is_some() || queued;
        if cancelled {
            self.shared.drain(&mut state);
        }
        drop(state);

        if cancelled {
            self.shared.publish(key.clone(), LoadOutcome::Cancelled);
        }
        cancelled
    }

    /// Cancel everything in flight, empty the queue and the cache
    pub fn cleanup(&self) {
        let mut state = self.shared.state.lock();

        let active = state.limiter.release_all();
        for (_, load) in &active {
            self.shared.provider.cancel(&load.token);
        }
        let queued = state.queue.drain_all();
        state.cache.clear();
        drop(state);

        log::info!(
            "Loading pipeline cleaned up ({} in flight, {} queued)",
            active.len(),
            queued.len()
        );

        for (key, _) in active {
            self.shared.publish(key, LoadOutcome::Cancelled);
        }
        for task in queued {
            self.shared.publish(task.key, LoadOutcome::Cancelled);
        }
    }

    /// Subscribe to terminal load events
    pub fn events(&self) -> broadcast::Receiver<LoadEvent> {
        self.shared.events.subscribe()
    }

    /// Cached resource for `key`, if any
    pub fn cached(&self, key: &TaskKey) -> Option<Resource> {
        self.shared.state.lock().cache.get(key)
    }

    /// Drop a cached resource
    pub fn invalidate(&self, key: &TaskKey) -> bool {
        self.shared.state.lock().cache.remove(key).is_some()
    }

    /// Whether `key` is queued or in flight
    pub fn is_pending(&self, key: &TaskKey) -> bool {
        let state = self.shared.state.lock();
        state.queue.contains(key) || state.limiter.is_active(key)
    }

    pub fn is_active(&self, key: &TaskKey) -> bool {
        self.shared.state.lock().limiter.is_active(key)
    }

    pub fn stats(&self) -> LoaderStats {
        let state = self.shared.state.lock();
        LoaderStats {
            queued: state.queue.len(),
            active: state.limiter.len(),
            cached: state.cache.len(),
        }
    }

    pub fn presenter(&self) -> &Presenter {
        &self.shared.presenter
    }
}

impl Shared {
    /// Dispatch queued tasks while slots are free
    fn drain(self: &Arc<Self>, state: &mut Scheduler) {
        while state.limiter.has_capacity() {
            let Ok(task) = state.queue.dequeue_highest() else {
                break;
            };
            if state.limiter.is_active(&task.key) {
                log::debug!("Skipping stale duplicate: {}", task.key);
                continue;
            }
            self.dispatch(state, task);
        }
        log::trace!(
            "Drain pass done: {} in flight, {} waiting",
            state.limiter.len(),
            state.queue.len()
        );
    }

    fn dispatch(self: &Arc<Self>, state: &mut Scheduler, task: LoadingTask) {
        let id = state.next_dispatch;
        state.next_dispatch += 1;

        let token = CancellationToken::new();
        let params = DecodeParams::for_request(
            task.quality(),
            task.priority,
            self.thumbnail_size,
            self.preview_size,
        );
        let LoadingTask {
            key,
            asset,
            priority,
            callback,
            ..
        } = task;

        let load = ActiveLoad {
            id,
            token: token.clone(),
            callback,
        };
        if state.limiter.try_acquire(key.clone(), load).is_err() {
            log::warn!("No free slot for {}, dropping request", key);
            return;
        }

        log::debug!("Loading {} at {:?}", key, priority);
        let decode = self.provider.request_decode(&asset, params, token);

        let shared = Arc::clone(self);
        self.runtime.spawn(async move {
            let outcome = decode.await;
            shared.complete(key, id, outcome);
        });
    }

    fn complete(self: &Arc<Self>, key: TaskKey, id: u64, outcome: DecodeOutcome) {
        let mut state = self.state.lock();

        let Some(load) = state.limiter.release_dispatch(&key, id) else {
            log::debug!("Discarding result of cancelled request: {}", key);
            return;
        };

        let (result, event) = match outcome {
            DecodeOutcome::Decoded(image) => {
                let resource: Resource = Arc::new(image);
                if let Some(evicted) = state.cache.put(key.clone(), Arc::clone(&resource)) {
                    log::trace!("Evicted {} from cache", evicted);
                }
                log::debug!("Loaded {}", key);
                (Some(Some(resource)), LoadOutcome::Completed)
            }
            DecodeOutcome::Empty => {
                log::warn!("Decode returned nothing: {}", key);
                (Some(None), LoadOutcome::Failed("empty result".to_string()))
            }
            DecodeOutcome::Failed(err) => {
                log::warn!("Decode failed for {}: {}", key, err);
                (Some(None), LoadOutcome::Failed(err.to_string()))
            }
            DecodeOutcome::Cancelled => {
                log::debug!("Provider cancelled {}", key);
                (None, LoadOutcome::Cancelled)
            }
        };

        self.drain(&mut state);
        drop(state);

        if let Some(result) = result {
            let callback = load.callback;
            self.presenter.run(move || callback(result));
        }
        self.publish(key, event);
    }

    fn publish(&self, key: TaskKey, outcome: LoadOutcome) {
        // No subscribers is fine
        let _ = self.events.send(LoadEvent { key, outcome });
    }
}
