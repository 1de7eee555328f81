//! Partitioned hash index structures.
//!
//! An index is a multimap from 64-bit hash keys to document ids, sharded
//! into partitions by `key % P`. Each partition owns its own read-write
//! lock; a probe touches exactly one partition and holds its reader lock
//! only for the duration of the lookup. Callers must never hold more than
//! one partition lock at a time.

use std::collections::BTreeMap;
use std::sync::RwLock;

/// Document identifier, unique within a collection.
pub type DocId = u64;

/// One shard of a hash index: an ordered multimap from hash key to ids.
///
/// Ids under a key are kept sorted ascending so lookups are deterministic.
#[derive(Debug, Default)]
pub struct IndexPartition {
    entries: BTreeMap<u64, Vec<DocId>>,
}

impl IndexPartition {
    /// Creates an empty partition.
    pub fn new() -> Self {
        Self {
            entries: BTreeMap::new(),
        }
    }

    /// Records `id` under `key`. Re-inserting an existing pair is a no-op.
    pub fn put(&mut self, key: u64, id: DocId) {
        let ids = self.entries.entry(key).or_default();
        if let Err(pos) = ids.binary_search(&id) {
            ids.insert(pos, id);
        }
    }

    /// Removes `id` from under `key`, dropping the key when it empties.
    pub fn remove(&mut self, key: u64, id: DocId) {
        if let Some(ids) = self.entries.get_mut(&key) {
            if let Ok(pos) = ids.binary_search(&id) {
                ids.remove(pos);
            }
            if ids.is_empty() {
                self.entries.remove(&key);
            }
        }
    }

    /// Returns up to `limit` ids stored under `key`; `limit == 0` means all.
    pub fn get(&self, key: u64, limit: usize) -> Vec<DocId> {
        let ids = match self.entries.get(&key) {
            Some(ids) => ids.as_slice(),
            None => return Vec::new(),
        };
        if limit > 0 && ids.len() > limit {
            ids[..limit].to_vec()
        } else {
            ids.to_vec()
        }
    }

    /// Returns the (keys, ids) pairs falling into chunk `index` when the
    /// 64-bit key space is split into `of` equal ranges.
    ///
    /// Chunks are disjoint and together cover the whole partition, so a
    /// scan visiting every chunk observes every entry exactly once.
    pub fn chunk(&self, index: usize, of: usize) -> (Vec<u64>, Vec<DocId>) {
        let of = of.max(1) as u64;
        let index = (index as u64).min(of - 1);
        let span = u64::MAX / of;
        let start = index * span;
        let end = if index + 1 == of {
            u64::MAX
        } else {
            start + span - 1
        };

        let mut keys = Vec::new();
        let mut ids = Vec::new();
        for (key, stored) in self.entries.range(start..=end) {
            for id in stored {
                keys.push(*key);
                ids.push(*id);
            }
        }
        (keys, ids)
    }

    /// Total number of (key, id) entries stored.
    pub fn len(&self) -> usize {
        self.entries.values().map(Vec::len).sum()
    }

    /// Returns true when the partition holds no entries.
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// A hash index sharded into `P` independently locked partitions.
#[derive(Debug)]
pub struct PartitionedIndex {
    parts: Vec<RwLock<IndexPartition>>,
}

impl PartitionedIndex {
    /// Creates an index with `num_parts` partitions (floor 1).
    pub fn new(num_parts: usize) -> Self {
        let num_parts = num_parts.max(1);
        let parts = (0..num_parts)
            .map(|_| RwLock::new(IndexPartition::new()))
            .collect();
        Self { parts }
    }

    /// Number of partitions.
    pub fn num_parts(&self) -> usize {
        self.parts.len()
    }

    fn part_for(&self, key: u64) -> &RwLock<IndexPartition> {
        &self.parts[(key % self.parts.len() as u64) as usize]
    }

    /// The hash-index probe primitive: looks up `key` in its owning
    /// partition under that partition's reader lock, returning up to
    /// `limit` ids (`limit == 0` means unlimited).
    pub fn probe(&self, key: u64, limit: usize) -> Vec<DocId> {
        self.part_for(key).read().unwrap().get(key, limit)
    }

    /// Direct access to one partition, for scans and mutators.
    ///
    /// Hold at most one partition lock at a time.
    pub fn partition(&self, index: usize) -> &RwLock<IndexPartition> {
        &self.parts[index]
    }

    /// Records `id` under `key` in the owning partition (writer lock).
    pub fn put(&self, key: u64, id: DocId) {
        self.part_for(key).write().unwrap().put(key, id);
    }

    /// Removes `id` from under `key` in the owning partition (writer lock).
    pub fn remove(&self, key: u64, id: DocId) {
        self.part_for(key).write().unwrap().remove(key, id);
    }
}
