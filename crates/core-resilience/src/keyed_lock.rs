//! Sharded pool of async mutexes addressed by string keys
//!
//! Keys are hashed onto a fixed number of shards, so memory stays bounded no
//! matter how many distinct keys a long-running process sees. Two different
//! keys may share a shard and then serialize against each other; the same key
//! always maps to the same shard.

use std::collections::hash_map::DefaultHasher;
use std::hash::{Hash, Hasher};
use std::sync::Arc;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// Default number of shards
pub const DEFAULT_SHARDS: usize = 64;

/// Fixed-size pool of per-key exclusive locks
#[derive(Debug, Clone)]
pub struct KeyedLocks {
    shards: Arc<[Arc<Mutex<()>>]>,
}

impl Default for KeyedLocks {
    fn default() -> Self {
        Self::new(DEFAULT_SHARDS)
    }
}

impl KeyedLocks {
    /// Create a pool with `shards` mutexes (at least one)
    pub fn new(shards: usize) -> Self {
        let shards = (0..shards.max(1))
            .map(|_| Arc::new(Mutex::new(())))
            .collect::<Vec<_>>();
        Self {
            shards: shards.into(),
        }
    }

    pub fn shard_count(&self) -> usize {
        self.shards.len()
    }

    /// Shard index for `key`; stable across calls and processes
    pub fn shard_of(&self, key: &str) -> usize {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        (hasher.finish() % self.shards.len() as u64) as usize
    }

    /// Wait for exclusive access to `key`
    pub async fn lock(&self, key: &str) -> OwnedMutexGuard<()> {
        let shard = Arc::clone(&self.shards[self.shard_of(key)]);
        shard.lock_owned().await
    }

    /// Exclusive access to `key` if nobody holds it right now
    pub fn try_lock(&self, key: &str) -> Option<OwnedMutexGuard<()>> {
        let shard = Arc::clone(&self.shards[self.shard_of(key)]);
        shard.try_lock_owned().ok()
    }
}
