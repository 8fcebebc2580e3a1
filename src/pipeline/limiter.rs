/// Concurrency limiter
///
/// Tracks the in-flight decode requests and refuses new ones once
/// `max_concurrent` are running. Releasing a slot does not dispatch anything
/// by itself; the loading service drains the queue after every release.

use std::collections::HashMap;
use std::fmt;
use tokio_util::sync::CancellationToken;

use super::types::{LoadCallback, TaskKey};

/// Bookkeeping for one in-flight decode
pub struct ActiveLoad {
    /// Unique per dispatch, so a late result for a cancelled request never
    /// releases a newer request that reused the same key
    pub id: u64,
    pub token: CancellationToken,
    pub callback: LoadCallback,
}

impl fmt::Debug for ActiveLoad {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ActiveLoad")
            .field("id", &self.id)
            .field("cancelled", &self.token.is_cancelled())
            .finish_non_exhaustive()
    }
}

#[derive(Debug)]
pub struct ConcurrencyLimiter {
    max_concurrent: usize,
    active: HashMap<TaskKey, ActiveLoad>,
}

impl ConcurrencyLimiter {
    pub fn new(max_concurrent: usize) -> Self {
        let max_concurrent = max_concurrent.max(1);
        Self {
            max_concurrent,
            active: HashMap::with_capacity(max_concurrent),
        }
    }

    /// Claim a slot for `key`
    ///
    /// Hands the load back if every slot is taken or the key is already in
    /// flight.
    pub fn try_acquire(&mut self, key: TaskKey, load: ActiveLoad) -> Result<(), ActiveLoad> {
        if !self.has_capacity() || self.active.contains_key(&key) {
            return Err(load);
        }
        self.active.insert(key, load);
        Ok(())
    }

    /// Free the slot held by `key`
    pub fn release(&mut self, key: &TaskKey) -> Option<ActiveLoad> {
        self.active.remove(key)
    }

    /// Free the slot held by `key` only if it still belongs to dispatch `id`
    pub fn release_dispatch(&mut self, key: &TaskKey, id: u64) -> Option<ActiveLoad> {
        match self.active.get(key) {
            Some(load) if load.id == id => self.active.remove(key),
            _ => None,
        }
    }

    pub fn has_capacity(&self) -> bool {
        self.active.len() < self.max_concurrent
    }

    pub fn is_active(&self, key: &TaskKey) -> bool {
        self.active.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.active.len()
    }

    pub fn is_empty(&self) -> bool {
        self.active.is_empty()
    }

    pub fn max_concurrent(&self) -> usize {
        self.max_concurrent
    }

    /// Free every slot
    pub fn release_all(&mut self) -> Vec<(TaskKey, ActiveLoad)> {
        self.active.drain().collect()
    }
}
