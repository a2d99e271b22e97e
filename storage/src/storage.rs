use crate::ChunkId;
use utilities::error::FsError;

pub type Result<T> = std::result::Result<T, FsError>;

/// Local chunk store of a chunk server. A chunk goes from absent to present on its first
/// write and is never evicted.
pub trait Storage {
    /// Stores `data` under `chunk_id`, replacing any previous content. Returns true when the
    /// chunk was not present before.
    async fn write(&self, chunk_id: ChunkId, data: Vec<u8>) -> Result<bool>;
    async fn read(&self, chunk_id: ChunkId) -> Result<Vec<u8>>;
    async fn contains(&self, chunk_id: ChunkId) -> bool;
    /// Ids of every stored chunk, ascending.
    async fn available_chunks(&self) -> Vec<ChunkId>;
    async fn used_bytes(&self) -> u64;
}

#[cfg(test)]
pub mod tests {
    use super::*;

    pub async fn storage_test(storage: impl Storage) -> Result<()> {
        let chunk_id: ChunkId = 7;
        let original_data = b"hello world".to_vec();

        assert!(!storage.contains(chunk_id).await);
        assert!(matches!(
            storage.read(chunk_id).await,
            Err(FsError::NotFound(_))
        ));

        // first write admits the chunk
        let admitted = storage.write(chunk_id, original_data.clone()).await?;
        assert!(admitted);
        assert!(storage.contains(chunk_id).await);
        assert_eq!(storage.available_chunks().await, vec![chunk_id]);
        assert_eq!(storage.read(chunk_id).await?, original_data);
        assert_eq!(storage.used_bytes().await, original_data.len() as u64);

        // rewriting replaces the content without a second admission
        let admitted = storage.write(chunk_id, b"bye".to_vec()).await?;
        assert!(!admitted);
        assert_eq!(storage.read(chunk_id).await?, b"bye".to_vec());
        assert_eq!(storage.used_bytes().await, 3);

        storage.write(3, vec![0u8; 16]).await?;
        assert_eq!(storage.available_chunks().await, vec![3, chunk_id]);
        Ok(())
    }
}
