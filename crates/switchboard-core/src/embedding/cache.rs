//! In-memory embedding cache
//!
//! Entries are keyed by a SHA-256 digest of the model name and input text, so
//! switching models never returns a vector from the wrong embedding space.

use dashmap::DashMap;
use serde::Serialize;
use sha2::{Digest, Sha256};
use std::collections::VecDeque;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard};
use std::time::{Duration, Instant};
use tracing::debug;

#[derive(Clone)]
struct CacheEntry {
    vector: Arc<[f32]>,
    inserted_at: Instant,
    seq: u64,
}

/// Insertion order of live keys, oldest first
///
/// A queued `(key, seq)` whose `seq` no longer matches the stored entry is
/// stale and skipped on eviction.
#[derive(Default)]
struct InsertionOrder {
    queue: VecDeque<(String, u64)>,
    next_seq: u64,
}

/// Counters describing cache effectiveness
#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize)]
pub struct CacheStats {
    pub entries: usize,
    pub capacity: usize,
    pub hits: u64,
    pub misses: u64,
    pub evictions: u64,
}

impl CacheStats {
    /// Fraction of lookups served from the cache
    pub fn hit_rate(&self) -> f64 {
        let total = self.hits + self.misses;
        if total == 0 {
            0.0
        } else {
            self.hits as f64 / total as f64
        }
    }
}

/// Bounded, thread-safe embedding cache
pub struct EmbeddingCache {
    store: DashMap<String, CacheEntry>,
    order: Mutex<InsertionOrder>,
    capacity: usize,
    ttl: Option<Duration>,
    hits: AtomicU64,
    misses: AtomicU64,
    evictions: AtomicU64,
}

impl std::fmt::Debug for EmbeddingCache {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EmbeddingCache")
            .field("entries", &self.store.len())
            .field("capacity", &self.capacity)
            .field("ttl", &self.ttl)
            .finish()
    }
}

impl EmbeddingCache {
    /// Create a cache holding at most `capacity` vectors
    pub fn new(capacity: usize, ttl: Option<Duration>) -> Self {
        Self {
            store: DashMap::new(),
            order: Mutex::new(InsertionOrder::default()),
            capacity: capacity.max(1),
            ttl,
            hits: AtomicU64::new(0),
            misses: AtomicU64::new(0),
            evictions: AtomicU64::new(0),
        }
    }

    /// Cache key for a model/text pair
    pub fn key(model: &str, text: &str) -> String {
        let mut hasher = Sha256::new();
        hasher.update(model.as_bytes());
        hasher.update([0u8]);
        hasher.update(text.as_bytes());
        hex::encode(hasher.finalize())
    }

    /// Look up a vector, dropping it if it has expired
    pub fn get(&self, model: &str, text: &str) -> Option<Arc<[f32]>> {
        let key = Self::key(model, text);
        let found = self.store.get(&key).map(|entry| entry.clone());

        match found {
            Some(entry) if !self.is_expired(&entry) => {
                self.hits.fetch_add(1, Ordering::Relaxed);
                Some(entry.vector)
            }
            Some(_) => {
                self.store.remove(&key);
                self.misses.fetch_add(1, Ordering::Relaxed);
                debug!(key = %&key[..12], "Embedding cache entry expired");
                None
            }
            None => {
                self.misses.fetch_add(1, Ordering::Relaxed);
                None
            }
        }
    }

    /// Store a vector, evicting the oldest entries when full
    pub fn insert(&self, model: &str, text: &str, vector: Arc<[f32]>) {
        let key = Self::key(model, text);

        // Inserts are serialized so the capacity check and eviction agree
        let mut order = self.lock_order();

        if !self.store.contains_key(&key) {
            while self.store.len() >= self.capacity {
                if !self.evict_oldest(&mut order) {
                    break;
                }
            }
        }

        let seq = order.next_seq;
        order.next_seq += 1;
        order.queue.push_back((key.clone(), seq));

        self.store.insert(
            key,
            CacheEntry {
                vector,
                inserted_at: Instant::now(),
                seq,
            },
        );

        if order.queue.len() > self.capacity.saturating_mul(2) {
            self.compact(&mut order);
        }
    }

    /// Drop every entry; counters are kept
    pub fn clear(&self) {
        let mut order = self.lock_order();
        order.queue.clear();
        self.store.clear();
    }

    pub fn len(&self) -> usize {
        self.store.len()
    }

    pub fn is_empty(&self) -> bool {
        self.store.is_empty()
    }

    pub fn stats(&self) -> CacheStats {
        CacheStats {
            entries: self.store.len(),
            capacity: self.capacity,
            hits: self.hits.load(Ordering::Relaxed),
            misses: self.misses.load(Ordering::Relaxed),
            evictions: self.evictions.load(Ordering::Relaxed),
        }
    }

    fn is_expired(&self, entry: &CacheEntry) -> bool {
        self.ttl
            .map(|ttl| entry.inserted_at.elapsed() >= ttl)
            .unwrap_or(false)
    }

    fn lock_order(&self) -> MutexGuard<'_, InsertionOrder> {
        self.order.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Remove the oldest live entry; false once the queue is exhausted
    fn evict_oldest(&self, order: &mut InsertionOrder) -> bool {
        while let Some((key, seq)) = order.queue.pop_front() {
            if self.store.remove_if(&key, |_, entry| entry.seq == seq).is_some() {
                self.evictions.fetch_add(1, Ordering::Relaxed);
                return true;
            }
        }
        false
    }

    /// Drop queue slots for entries that were replaced, expired or evicted
    fn compact(&self, order: &mut InsertionOrder) {
        order.queue.retain(|(key, seq)| {
            self.store
                .get(key)
                .map(|entry| entry.seq == *seq)
                .unwrap_or(false)
        });
    }
}
