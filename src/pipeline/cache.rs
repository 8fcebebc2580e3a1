/// Bounded result cache with strict FIFO eviction
///
/// Entries are evicted in insertion order. Reading or re-inserting an
/// existing key does not move it; the oldest insertion goes first whatever
/// its access pattern.

use std::collections::{HashMap, VecDeque};
use std::hash::Hash;

#[derive(Debug)]
pub struct ResultCache<K, V> {
    entries: HashMap<K, V>,
    order: VecDeque<K>,
    capacity: usize,
}

impl<K, V> ResultCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    /// `capacity` is clamped to at least one entry
    pub fn new(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: HashMap::with_capacity(capacity),
            order: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Store a resource, evicting the oldest entry if the cache is full
    ///
    /// Returns the evicted key, if any. Replacing the value of an existing
    /// key keeps its original position.
    pub fn put(&mut self, key: K, value: V) -> Option<K> {
        if let Some(slot) = self.entries.get_mut(&key) {
            *slot = value;
            return None;
        }

        let evicted = if self.entries.len() >= self.capacity {
            let oldest = self.order.pop_front();
            if let Some(key) = &oldest {
                self.entries.remove(key);
            }
            oldest
        } else {
            None
        };

        self.order.push_back(key.clone());
        self.entries.insert(key, value);
        evicted
    }

    pub fn get(&self, key: &K) -> Option<V> {
        self.entries.get(key).cloned()
    }

    pub fn contains(&self, key: &K) -> bool {
        self.entries.contains_key(key)
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        let value = self.entries.remove(key)?;
        if let Some(pos) = self.order.iter().position(|k| k == key) {
            self.order.remove(pos);
        }
        Some(value)
    }

    pub fn clear(&mut self) {
        self.entries.clear();
        self.order.clear();
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
