use std::{collections::HashMap, sync::Arc};

use storage::ChunkId;
use tokio::sync::{Mutex, OwnedMutexGuard};

/// One lock per chunk id. Writes to the same chunk queue up, different chunks do not block
/// each other.
#[derive(Debug, Default)]
pub struct ChunkLocks {
    locks: Mutex<HashMap<ChunkId, Arc<Mutex<()>>>>,
}

impl ChunkLocks {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn lock(&self, chunk_id: ChunkId) -> OwnedMutexGuard<()> {
        let lock = self
            .locks
            .lock()
            .await
            .entry(chunk_id)
            .or_default()
            .clone();
        lock.lock_owned().await
    }
}
