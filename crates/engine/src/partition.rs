//! Deterministic assignment of directories to workers.
//!
//! Every worker walks the whole tree but only acts on the directories whose
//! path hashes to its own shard. Because the hash is a pure function of the
//! path, the shards are disjoint and together cover the tree without any
//! locking or messaging between workers.
//!
//! This only holds while the worker count stays fixed: changing it moves
//! directories between shards (costing, at worst, one full rescan).

use std::num::NonZeroUsize;
use std::path::Path;

/// Splits a tree into a fixed number of shards.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Partitioner {
    shards: NonZeroUsize,
}

impl Partitioner {
    pub fn new(shards: NonZeroUsize) -> Self {
        Self { shards }
    }

    pub fn shards(&self) -> NonZeroUsize {
        self.shards
    }

    /// The shard in `[0, shards)` that owns `path`.
    ///
    /// BLAKE3 rather than [`std::hash`]: the value must not change between
    /// processes, platforms or Rust releases.
    pub fn shard_of(&self, path: &Path) -> usize {
        let digest = blake3::hash(path.as_os_str().as_encoded_bytes());
        let mut prefix = [0u8; 8];
        prefix.copy_from_slice(&digest.as_bytes()[..8]);
        // Lossless: the remainder is below `shards`, which is a usize.
        (u64::from_le_bytes(prefix) % self.shards.get() as u64) as usize
    }

    /// The view of one worker.
    ///
    /// Returns [`None`] if `id` is not a valid shard.
    pub fn shard(&self, id: usize) -> Option<Shard> {
        (id < self.shards.get()).then_some(Shard { id, partitioner: *self })
    }

    /// Every shard, in id order.
    pub fn all(&self) -> impl Iterator<Item = Shard> + '_ {
        (0..self.shards.get()).map(|id| Shard { id, partitioner: *self })
    }
}

/// One worker's share of the tree.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Shard {
    id: usize,
    partitioner: Partitioner,
}

impl Shard {
    pub fn id(&self) -> usize {
        self.id
    }

    pub fn partitioner(&self) -> Partitioner {
        self.partitioner
    }

    /// Is this shard the one responsible for `path`?
    pub fn owns(&self, path: &Path) -> bool {
        self.partitioner.shard_of(path) == self.id
    }
}
