//! Sharded per-report lock table.
//!
//! Appends and closes of one report serialize on its mutex; distinct reports
//! proceed in parallel. The shards keep the table lookup itself from
//! becoming a global bottleneck; the shard lock is only ever held to clone
//! or drop an entry, never across I/O.

use std::collections::hash_map::DefaultHasher;
use std::collections::HashMap;
use std::hash::{Hash, Hasher};
use std::sync::{Arc, Mutex};

const SHARD_COUNT: usize = 16;

pub struct LockTable {
    shards: Vec<Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>>>,
}

impl LockTable {
    pub fn new() -> Self {
        Self {
            shards: (0..SHARD_COUNT).map(|_| Mutex::new(HashMap::new())).collect(),
        }
    }

    fn shard(&self, key: &str) -> &Mutex<HashMap<String, Arc<tokio::sync::Mutex<()>>>> {
        let mut hasher = DefaultHasher::new();
        key.hash(&mut hasher);
        &self.shards[hasher.finish() as usize % SHARD_COUNT]
    }

    /// The mutex for `key`, created on first use.
    pub fn lock_for(&self, key: &str) -> Arc<tokio::sync::Mutex<()>> {
        let mut shard = self.shard(key).lock().unwrap();
        Arc::clone(
            shard
                .entry(key.to_string())
                .or_insert_with(|| Arc::new(tokio::sync::Mutex::new(()))),
        )
    }

    /// Drop the entry for `key`. Holders of a cloned mutex are unaffected.
    pub fn release(&self, key: &str) {
        self.shard(key).lock().unwrap().remove(key);
    }

    pub fn len(&self) -> usize {
        self.shards.iter().map(|s| s.lock().unwrap().len()).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for LockTable {
    fn default() -> Self {
        Self::new()
    }
}
