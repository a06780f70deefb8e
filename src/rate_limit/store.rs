//! Bucket Store
//!
//! Bounded map from key to [`TokenBucket`] with least-recently-used
//! eviction. Entries live in a slot arena threaded by a doubly linked list;
//! the head is the least recently used key and the tail the most recent.
//! Touch, insert and evict are all O(1).

use std::collections::HashMap;
use std::time::Instant;

use super::bucket::{self, TokenBucket};
use crate::error::{GateError, Result};

#[derive(Debug)]
struct Slot {
    key: String,
    bucket: TokenBucket,
    prev: Option<usize>,
    next: Option<usize>,
}

/// LRU-bounded bucket table
#[derive(Debug)]
pub struct BucketTable {
    /// Key to slot index
    index: HashMap<String, usize>,

    /// Slot arena, never longer than `max_buckets`
    slots: Vec<Slot>,

    /// Least recently used slot
    head: Option<usize>,

    /// Most recently used slot
    tail: Option<usize>,

    max_buckets: usize,
    capacity: f64,
    refill_rate: f64,
    evictions: u64,
}

impl BucketTable {
    /// Create an empty table whose buckets share `capacity` and `refill_rate`
    pub fn new(capacity: f64, refill_rate: f64, max_buckets: usize) -> Result<Self> {
        bucket::validate(capacity, refill_rate)?;
        if max_buckets == 0 {
            return Err(GateError::InvalidTableSize);
        }
        Ok(Self {
            index: HashMap::new(),
            slots: Vec::new(),
            head: None,
            tail: None,
            max_buckets,
            capacity,
            refill_rate,
            evictions: 0,
        })
    }

    /// Get or create the bucket for `key`, marking it most recently used
    ///
    /// Creating a key when the table is full evicts the least recently
    /// used key first.
    pub fn touch(&mut self, key: &str, now: Instant) -> Result<&mut TokenBucket> {
        if let Some(&idx) = self.index.get(key) {
            self.move_to_tail(idx);
            return Ok(&mut self.slots[idx].bucket);
        }

        let bucket = TokenBucket::new(self.capacity, self.refill_rate, now)?;
        let idx = if self.slots.len() >= self.max_buckets {
            self.evict_into(key, bucket)
        } else {
            self.slots.push(Slot {
                key: key.to_string(),
                bucket,
                prev: None,
                next: None,
            });
            self.slots.len() - 1
        };

        self.index.insert(key.to_string(), idx);
        self.push_tail(idx);
        Ok(&mut self.slots[idx].bucket)
    }

    /// Reuse the least recently used slot for a new key
    fn evict_into(&mut self, key: &str, bucket: TokenBucket) -> usize {
        // A full table with max_buckets > 0 always has a head
        let idx = self.head.unwrap_or(0);
        self.unlink(idx);

        let slot = &mut self.slots[idx];
        let evicted = std::mem::replace(&mut slot.key, key.to_string());
        slot.bucket = bucket;
        self.index.remove(&evicted);
        self.evictions += 1;

        tracing::debug!(key = %evicted, "Evicted least recently used rate limit bucket");
        crate::metrics::RATE_LIMIT_EVICTIONS_TOTAL.inc();
        idx
    }

    fn unlink(&mut self, idx: usize) {
        let (prev, next) = (self.slots[idx].prev, self.slots[idx].next);
        match prev {
            Some(p) => self.slots[p].next = next,
            None => self.head = next,
        }
        match next {
            Some(n) => self.slots[n].prev = prev,
            None => self.tail = prev,
        }
        self.slots[idx].prev = None;
        self.slots[idx].next = None;
    }

    fn push_tail(&mut self, idx: usize) {
        self.slots[idx].prev = self.tail;
        self.slots[idx].next = None;
        match self.tail {
            Some(t) => self.slots[t].next = Some(idx),
            None => self.head = Some(idx),
        }
        self.tail = Some(idx);
    }

    fn move_to_tail(&mut self, idx: usize) {
        if self.tail != Some(idx) {
            self.unlink(idx);
            self.push_tail(idx);
        }
    }

    /// Whether `key` currently has a bucket (does not count as use)
    pub fn contains(&self, key: &str) -> bool {
        self.index.contains_key(key)
    }

    /// Number of live keys
    pub fn len(&self) -> usize {
        self.index.len()
    }

    /// Whether the table has no keys
    pub fn is_empty(&self) -> bool {
        self.index.is_empty()
    }

    /// Configured key limit
    pub fn max_buckets(&self) -> usize {
        self.max_buckets
    }

    /// Keys evicted since creation
    pub fn evictions(&self) -> u64 {
        self.evictions
    }

    /// Keys from least to most recently used
    pub fn keys_lru_order(&self) -> Vec<String> {
        let mut keys = Vec::with_capacity(self.len());
        let mut cursor = self.head;
        while let Some(idx) = cursor {
            keys.push(self.slots[idx].key.clone());
            cursor = self.slots[idx].next;
        }
        keys
    }
}
