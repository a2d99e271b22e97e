use std::{collections::HashMap, sync::Arc};

use tokio::sync::RwLock;
use tracing::{instrument, trace};
use utilities::error::FsError;

use crate::{
    ChunkId,
    storage::{Result, Storage},
};

/// Chunk store held entirely in memory. Clones share the same chunks.
#[derive(Clone, Debug, Default)]
pub struct MemoryStorage {
    chunks: Arc<RwLock<HashMap<ChunkId, Vec<u8>>>>,
}

impl MemoryStorage {
    pub fn new() -> Self {
        Self::default()
    }
}

impl Storage for MemoryStorage {
    #[instrument(name = "memory_storage_write", skip(self, data), fields(len = data.len()))]
    async fn write(&self, chunk_id: ChunkId, data: Vec<u8>) -> Result<bool> {
        let previous = self.chunks.write().await.insert(chunk_id, data);
        trace!(admitted = previous.is_none(), "chunk stored");
        Ok(previous.is_none())
    }
    #[instrument(name = "memory_storage_read", skip(self))]
    async fn read(&self, chunk_id: ChunkId) -> Result<Vec<u8>> {
        self.chunks
            .read()
            .await
            .get(&chunk_id)
            .cloned()
            .ok_or_else(|| FsError::NotFound(format!("chunk {chunk_id} is not present")))
    }
    async fn contains(&self, chunk_id: ChunkId) -> bool {
        self.chunks.read().await.contains_key(&chunk_id)
    }
    async fn available_chunks(&self) -> Vec<ChunkId> {
        let mut chunk_ids: Vec<ChunkId> = self.chunks.read().await.keys().copied().collect();
        chunk_ids.sort_unstable();
        chunk_ids
    }
    async fn used_bytes(&self) -> u64 {
        self.chunks
            .read()
            .await
            .values()
            .map(|data| data.len() as u64)
            .sum()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::tests::storage_test;

    #[tokio::test]
    async fn memory_storage_test() -> Result<()> {
        storage_test(MemoryStorage::new()).await
    }

    #[tokio::test]
    async fn clones_share_chunks() -> Result<()> {
        let storage = MemoryStorage::new();
        let other = storage.clone();
        storage.write(1, vec![1, 2, 3]).await?;
        assert_eq!(other.read(1).await?, vec![1, 2, 3]);
        Ok(())
    }
}
