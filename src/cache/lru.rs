//! LRU Store Module
//!
//! Capacity-bounded key/value store with least-recently-used eviction.
//!
//! Entries live in a slab of nodes linked into a doubly-linked recency list
//! (head = most recently used, tail = least recently used). The key map holds
//! slab indices, so lookup, promotion, insertion and eviction are all O(1).

use std::borrow::Borrow;
use std::collections::HashMap;
use std::hash::Hash;

use parking_lot::RwLock;
use tracing::warn;

use crate::cache::stats::{CacheStats, StatsRecorder};

// == Public Constants ==
/// Capacity used when a store is constructed with a capacity of zero.
pub const DEFAULT_CAPACITY: usize = 100;

// == Modify ==
/// What [`LruStore::modify`] should do with an entry after the closure ran.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Modify<R> {
    /// Keep the (possibly mutated) entry, promote it, and return `R`
    Keep(R),
    /// Drop the entry
    Remove,
}

// == Recency List ==
#[derive(Debug)]
struct Node<K, V> {
    key: K,
    value: V,
    prev: Option<usize>,
    next: Option<usize>,
}

/// Slab-backed recency list plus key index. Never exposed outside the store lock.
#[derive(Debug)]
struct RecencyList<K, V> {
    index: HashMap<K, usize>,
    nodes: Vec<Option<Node<K, V>>>,
    free: Vec<usize>,
    head: Option<usize>,
    tail: Option<usize>,
}

impl<K: Hash + Eq + Clone, V> RecencyList<K, V> {
    fn with_capacity(capacity: usize) -> Self {
        Self {
            index: HashMap::with_capacity(capacity),
            nodes: Vec::with_capacity(capacity),
            free: Vec::new(),
            head: None,
            tail: None,
        }
    }

    fn len(&self) -> usize {
        self.index.len()
    }

    fn slot<Q>(&self, key: &Q) -> Option<usize>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.index.get(key).copied()
    }

    fn node(&self, idx: usize) -> Option<&Node<K, V>> {
        self.nodes.get(idx).and_then(Option::as_ref)
    }

    fn node_mut(&mut self, idx: usize) -> Option<&mut Node<K, V>> {
        self.nodes.get_mut(idx).and_then(Option::as_mut)
    }

    fn detach(&mut self, idx: usize) {
        let Some((prev, next)) = self.node(idx).map(|n| (n.prev, n.next)) else {
            return;
        };
        match prev {
            Some(p) => {
                if let Some(node) = self.node_mut(p) {
                    node.next = next;
                }
            }
            None => self.head = next,
        }
        match next {
            Some(n) => {
                if let Some(node) = self.node_mut(n) {
                    node.prev = prev;
                }
            }
            None => self.tail = prev,
        }
        if let Some(node) = self.node_mut(idx) {
            node.prev = None;
            node.next = None;
        }
    }

    fn attach_front(&mut self, idx: usize) {
        let old_head = self.head;
        if let Some(node) = self.node_mut(idx) {
            node.prev = None;
            node.next = old_head;
        }
        if let Some(h) = old_head {
            if let Some(node) = self.node_mut(h) {
                node.prev = Some(idx);
            }
        }
        self.head = Some(idx);
        if self.tail.is_none() {
            self.tail = Some(idx);
        }
    }

    fn promote(&mut self, idx: usize) {
        if self.head != Some(idx) {
            self.detach(idx);
            self.attach_front(idx);
        }
    }

    fn insert_front(&mut self, key: K, value: V) {
        let node = Node {
            key: key.clone(),
            value,
            prev: None,
            next: None,
        };
        let idx = match self.free.pop() {
            Some(idx) => {
                self.nodes[idx] = Some(node);
                idx
            }
            None => {
                self.nodes.push(Some(node));
                self.nodes.len() - 1
            }
        };
        self.index.insert(key, idx);
        self.attach_front(idx);
    }

    fn remove_at(&mut self, idx: usize) -> Option<(K, V)> {
        self.detach(idx);
        let node = self.nodes.get_mut(idx)?.take()?;
        self.free.push(idx);
        self.index.remove(&node.key);
        Some((node.key, node.value))
    }

    fn pop_back(&mut self) -> Option<(K, V)> {
        let tail = self.tail?;
        self.remove_at(tail)
    }

    fn clear(&mut self) {
        self.index.clear();
        self.nodes.clear();
        self.free.clear();
        self.head = None;
        self.tail = None;
    }

    fn keys_by_recency(&self) -> Vec<K> {
        let mut keys = Vec::with_capacity(self.len());
        let mut cursor = self.head;
        while let Some(idx) = cursor {
            let Some(node) = self.node(idx) else { break };
            keys.push(node.key.clone());
            cursor = node.next;
        }
        keys
    }
}

// == LRU Store ==
/// Thread-safe, capacity-bounded LRU store.
///
/// Readers share a read lock; anything that reorders the recency list takes
/// the write lock. No reference into the internal structures escapes a call.
#[derive(Debug)]
pub struct LruStore<K, V> {
    capacity: usize,
    inner: RwLock<RecencyList<K, V>>,
    stats: StatsRecorder,
}

impl<K, V> LruStore<K, V>
where
    K: Hash + Eq + Clone,
{
    // == Constructor ==
    /// Creates a store holding at most `capacity` entries.
    ///
    /// A capacity of zero is replaced by [`DEFAULT_CAPACITY`].
    pub fn new(capacity: usize) -> Self {
        let capacity = if capacity == 0 {
            warn!(default = DEFAULT_CAPACITY, "LRU capacity of 0 replaced by default");
            DEFAULT_CAPACITY
        } else {
            capacity
        };

        Self {
            capacity,
            inner: RwLock::new(RecencyList::with_capacity(capacity)),
            stats: StatsRecorder::default(),
        }
    }

    // == Get ==
    /// Returns a clone of the value and promotes it to most recently used.
    ///
    /// Existence is checked under the read lock first so misses never contend
    /// for the write lock; the key is looked up again after upgrading because
    /// it may have been removed in between.
    pub fn get<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: Clone,
    {
        if self.inner.read().slot(key).is_none() {
            self.stats.record_miss();
            return None;
        }

        let mut list = self.inner.write();
        let Some(idx) = list.slot(key) else {
            self.stats.record_miss();
            return None;
        };
        list.promote(idx);
        let value = list.node(idx).map(|n| n.value.clone());
        self.stats.record_hit();
        value
    }

    // == Peek ==
    /// Returns a clone of the value without touching recency.
    pub fn peek<Q>(&self, key: &Q) -> Option<V>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        V: Clone,
    {
        let list = self.inner.read();
        list.slot(key)
            .and_then(|idx| list.node(idx))
            .map(|n| n.value.clone())
    }

    // == Put ==
    /// Inserts or overwrites a value and marks it most recently used.
    ///
    /// Inserting a new key into a full store evicts the least recently used
    /// entry first; the evicted pair is returned.
    pub fn put(&self, key: K, value: V) -> Option<(K, V)> {
        let mut list = self.inner.write();

        if let Some(idx) = list.slot(&key) {
            if let Some(node) = list.node_mut(idx) {
                node.value = value;
            }
            list.promote(idx);
            return None;
        }

        let evicted = if list.len() >= self.capacity {
            let evicted = list.pop_back();
            if evicted.is_some() {
                self.stats.record_eviction();
            }
            evicted
        } else {
            None
        };

        list.insert_front(key, value);
        evicted
    }

    // == Modify ==
    /// Runs `f` against the entry under the write lock.
    ///
    /// Returns `None` if the key is absent or `f` asked for removal. On
    /// [`Modify::Keep`] the entry is promoted.
    pub fn modify<Q, R, F>(&self, key: &Q, f: F) -> Option<R>
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
        F: FnOnce(&mut V) -> Modify<R>,
    {
        let mut list = self.inner.write();
        let idx = list.slot(key)?;
        let outcome = f(&mut list.node_mut(idx)?.value);
        match outcome {
            Modify::Keep(result) => {
                list.promote(idx);
                Some(result)
            }
            Modify::Remove => {
                list.remove_at(idx);
                None
            }
        }
    }

    // == Remove ==
    /// Removes an entry. Returns whether anything was removed.
    pub fn remove<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        let mut list = self.inner.write();
        match list.slot(key) {
            Some(idx) => list.remove_at(idx).is_some(),
            None => false,
        }
    }

    // == Remove Where ==
    /// Removes every entry matching `predicate` in one pass. Returns the count.
    pub fn remove_where<F>(&self, mut predicate: F) -> usize
    where
        F: FnMut(&K, &V) -> bool,
    {
        let mut list = self.inner.write();
        let doomed: Vec<usize> = list
            .index
            .values()
            .copied()
            .filter(|&idx| {
                list.node(idx)
                    .map(|n| predicate(&n.key, &n.value))
                    .unwrap_or(false)
            })
            .collect();

        doomed
            .into_iter()
            .filter(|&idx| list.remove_at(idx).is_some())
            .count()
    }

    // == Contains ==
    pub fn contains<Q>(&self, key: &Q) -> bool
    where
        K: Borrow<Q>,
        Q: Hash + Eq + ?Sized,
    {
        self.inner.read().slot(key).is_some()
    }

    // == Length ==
    /// Returns the current number of entries.
    pub fn len(&self) -> usize {
        self.inner.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Maximum number of entries; fixed at construction.
    pub fn capacity(&self) -> usize {
        self.capacity
    }

    // == Keys ==
    /// All keys, in no particular order.
    pub fn keys(&self) -> Vec<K> {
        self.inner.read().index.keys().cloned().collect()
    }

    /// All keys, most recently used first.
    pub fn keys_by_recency(&self) -> Vec<K> {
        self.inner.read().keys_by_recency()
    }

    // == Clear ==
    pub fn clear(&self) {
        self.inner.write().clear();
    }

    // == Stats ==
    /// Returns current hit/miss/eviction counters.
    pub fn stats(&self) -> CacheStats {
        self.stats.snapshot(self.len())
    }

    pub(crate) fn recorder(&self) -> &StatsRecorder {
        &self.stats
    }
}
