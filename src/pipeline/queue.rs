/// Priority load queue
///
/// Pending decode requests ordered by priority, then by enqueue time. A
/// `BTreeMap` keyed by the ordering tuple gives O(log n) insert, pop and
/// removal; a side index maps each task key to its slot for dedup and
/// cancellation.

use std::collections::{BTreeMap, HashMap};
use std::time::Instant;

use super::types::{LoadingTask, Priority, TaskKey};
use crate::error::QueueError;

/// Position of a task in the queue: (priority, enqueue time, sequence)
///
/// The sequence number breaks ties between tasks enqueued within the same
/// clock tick, so the order is total.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
struct Slot {
    priority: Priority,
    enqueued_at: Instant,
    seq: u64,
}

#[derive(Debug, Default)]
pub struct LoadQueue {
    tasks: BTreeMap<Slot, LoadingTask>,
    index: HashMap<TaskKey, Slot>,
    next_seq: u64,
}

impl LoadQueue {
    pub fn new() -> Self {
        Self::default()
    }

    /// Insert a task in priority order
    ///
    /// Fails with `Duplicate` if a task with the same key is already queued;
    /// the rejected task is dropped without invoking its callback.
    pub fn enqueue(&mut self, task: LoadingTask) -> Result<(), QueueError> {
        if self.index.contains_key(&task.key) {
            return Err(QueueError::Duplicate(task.key));
        }

        let slot = Slot {
            priority: task.priority,
            enqueued_at: task.enqueued_at,
            seq: self.next_seq,
        };
        self.next_seq += 1;

        self.index.insert(task.key.clone(), slot);
        self.tasks.insert(slot, task);
        Ok(())
    }

    /// Remove and return the most urgent task (earliest among equal priorities)
    pub fn dequeue_highest(&mut self) -> Result<LoadingTask, QueueError> {
        let (_, task) = self.tasks.pop_first().ok_or(QueueError::Empty)?;
        self.index.remove(&task.key);
        Ok(task)
    }

    /// Remove a queued task, if present
    pub fn remove(&mut self, key: &TaskKey) -> Option<LoadingTask> {
        let slot = self.index.remove(key)?;
        self.tasks.remove(&slot)
    }

    pub fn contains(&self, key: &TaskKey) -> bool {
        self.index.contains_key(key)
    }

    pub fn len(&self) -> usize {
        self.tasks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.tasks.is_empty()
    }

    /// Drop every queued task and hand them back to the caller
    pub fn drain_all(&mut self) -> Vec<LoadingTask> {
        self.index.clear();
        std::mem::take(&mut self.tasks).into_values().collect()
    }
}
