//! Size and frequency bucketed LRU lists
//!
//! Entries are spread over [`NUM_BUCKETS`] doubly linked lists, most recently
//! inserted at the head. The bucket is a function of size and access count;
//! eviction walks buckets from the highest index down, oldest entry first.

use std::collections::HashMap;
use std::hash::Hash;

pub const NUM_BUCKETS: usize = 20;

/// Bucket for an entry of `size` bytes accessed `access_count` times
pub fn bucket_index(size: usize, access_count: u32) -> usize {
    if access_count == 0 {
        return 0;
    }
    let size_log = if size == 0 { 0 } else { size.ilog2() };
    let index = (size_log / access_count) as i64 - 1;
    index.clamp(0, NUM_BUCKETS as i64 - 1) as usize
}

struct Link<K, V> {
    value: V,
    size: usize,
    bucket: usize,
    prev: Option<K>,
    next: Option<K>,
}

#[derive(Clone, Copy, Default)]
struct Bucket<K> {
    head: Option<K>,
    tail: Option<K>,
    len: usize,
}

pub struct EvictionLedger<K, V> {
    links: HashMap<K, Link<K, V>>,
    buckets: [Bucket<K>; NUM_BUCKETS],
    total_size: usize,
}

impl<K: Copy + Eq + Hash, V> Default for EvictionLedger<K, V> {
    fn default() -> Self {
        Self::new()
    }
}

impl<K: Copy + Eq + Hash, V> EvictionLedger<K, V> {
    pub fn new() -> Self {
        Self {
            links: HashMap::new(),
            buckets: [Bucket {
                head: None,
                tail: None,
                len: 0,
            }; NUM_BUCKETS],
            total_size: 0,
        }
    }

    /// Link `key` at the head of the bucket for `(size, access_count)`,
    /// unlinking any previous position first
    pub fn insert(&mut self, key: K, value: V, size: usize, access_count: u32) {
        self.remove(&key);

        let bucket = bucket_index(size, access_count);
        let old_head = self.buckets[bucket].head;
        if let Some(head) = old_head
            && let Some(link) = self.links.get_mut(&head)
        {
            link.prev = Some(key);
        }

        let list = &mut self.buckets[bucket];
        list.head = Some(key);
        if list.tail.is_none() {
            list.tail = Some(key);
        }
        list.len += 1;

        self.links.insert(
            key,
            Link {
                value,
                size,
                bucket,
                prev: None,
                next: old_head,
            },
        );
        self.total_size += size;
    }

    pub fn remove(&mut self, key: &K) -> Option<V> {
        let link = self.links.remove(key)?;

        match link.prev {
            Some(prev) => {
                if let Some(p) = self.links.get_mut(&prev) {
                    p.next = link.next;
                }
            }
            None => self.buckets[link.bucket].head = link.next,
        }
        match link.next {
            Some(next) => {
                if let Some(n) = self.links.get_mut(&next) {
                    n.prev = link.prev;
                }
            }
            None => self.buckets[link.bucket].tail = link.prev,
        }

        self.buckets[link.bucket].len -= 1;
        self.total_size -= link.size;
        Some(link.value)
    }

    pub fn contains(&self, key: &K) -> bool {
        self.links.contains_key(key)
    }

    pub fn get(&self, key: &K) -> Option<&V> {
        self.links.get(key).map(|link| &link.value)
    }

    /// Oldest entry of a bucket
    pub fn tail(&self, bucket: usize) -> Option<K> {
        self.buckets.get(bucket).and_then(|b| b.tail)
    }

    pub fn bucket_of(&self, key: &K) -> Option<usize> {
        self.links.get(key).map(|link| link.bucket)
    }

    pub fn bucket_len(&self, bucket: usize) -> usize {
        self.buckets.get(bucket).map_or(0, |b| b.len)
    }

    /// Keys of a bucket, newest first
    pub fn bucket_keys(&self, bucket: usize) -> Vec<K> {
        let mut keys = Vec::new();
        let mut cursor = self.buckets.get(bucket).and_then(|b| b.head);
        while let Some(key) = cursor {
            keys.push(key);
            cursor = self.links.get(&key).and_then(|link| link.next);
        }
        keys
    }

    /// Sum of the sizes of all linked entries
    pub fn total_size(&self) -> usize {
        self.total_size
    }

    pub fn len(&self) -> usize {
        self.links.len()
    }

    pub fn is_empty(&self) -> bool {
        self.links.is_empty()
    }

    pub fn clear(&mut self) {
        *self = Self::new();
    }
}
