use tokio::io::{AsyncSeekExt, AsyncWriteExt};
use utilities::{
    logger::{error, instrument, trace, tracing},
    result::Result,
};

/// Writes fetched chunks into a local file of known size, each at its own offset.
#[derive(Clone, Debug)]
pub struct ChunkJoiner {
    file_path: String,
    file_size: u64,
}

impl ChunkJoiner {
    #[instrument(name = "new_chunk_joiner")]
    pub async fn new(file_path: String, file_size: u64) -> Result<Self> {
        trace!("Creating file");
        // the whole file is reserved up front
        let file = tokio::fs::OpenOptions::new()
            .create(true)
            .truncate(true)
            .write(true)
            .open(&file_path)
            .await
            .map_err(|e| format!("Error while opening the file {e}"))?;
        file.set_len(file_size)
            .await
            .map_err(|e| format!("Error while reserving space {e}"))?;
        Ok(Self {
            file_path,
            file_size,
        })
    }

    /// Bytes past the file size are padding of the last chunk and are dropped.
    #[instrument(skip(self, data), fields(len = data.len()))]
    pub async fn join_chunk(&self, start_offset: u64, data: &[u8]) -> Result<()> {
        if start_offset >= self.file_size {
            return Ok(());
        }
        let len = data.len().min((self.file_size - start_offset) as usize);
        let mut file = tokio::fs::OpenOptions::new()
            .write(true)
            .open(&self.file_path)
            .await
            .map_err(|e| format!("Error while opening file  {e:?}"))?;
        file.seek(tokio::io::SeekFrom::Start(start_offset))
            .await
            .map_err(|e| format!("Error while seeking to start offset of chunk in file {e:?}"))?;
        file.write_all(&data[..len])
            .await
            .map_err(|e| format!("Error while writing chunk to file {e:?}"))?;
        file.flush()
            .await
            .map_err(|e| format!("Error while flushing chunk to file {e:?}"))?;
        Ok(())
    }

    #[instrument(name = "abort_join_chunk", skip(self))]
    pub async fn abort(&self) {
        if let Err(e) = tokio::fs::remove_file(&self.file_path).await {
            error!(error = %e, file_path = %self.file_path, "Error while removing partial file");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn joins_out_of_order_and_truncates() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("out").to_string_lossy().into_owned();
        let joiner = ChunkJoiner::new(path.clone(), 6).await.unwrap();
        joiner.join_chunk(4, b"ef\0\0").await.unwrap();
        joiner.join_chunk(0, b"abcd").await.unwrap();
        assert_eq!(tokio::fs::read(&path).await.unwrap(), b"abcdef".to_vec());

        joiner.abort().await;
        assert!(tokio::fs::metadata(&path).await.is_err());
    }
}
