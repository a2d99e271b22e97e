use std::{sync::Arc, time::Duration};

use utilities::{
    logger::{error, info, instrument, trace, tracing, warn},
    error::FsError,
    retry_policy::retry_with_backoff_when,
};

use super::CommandError;
use crate::{
    chunkserver::service::ChunkserverService, file_chunker::FileChunker,
    master::service::MasterService,
};

pub struct StoreFileHandler {
    master: Arc<dyn MasterService>,
    chunkserver: Arc<dyn ChunkserverService>,
    write_retries: u8,
    write_backoff: Duration,
}

impl StoreFileHandler {
    pub fn new(
        master: Arc<dyn MasterService>,
        chunkserver: Arc<dyn ChunkserverService>,
        write_retries: u8,
        write_backoff: Duration,
    ) -> Self {
        Self {
            master,
            chunkserver,
            write_retries,
            write_backoff,
        }
    }

    /// Creates the remote file, writes it chunk by chunk through each chunk's replica chain,
    /// then records the final size. A failed upload removes the remote file again.
    #[instrument(skip(self))]
    pub async fn store_file(
        &self,
        local_file_path: &str,
        remote_path: &str,
    ) -> Result<String, CommandError> {
        trace!("Fetching file metadata");
        let file_metadata = tokio::fs::metadata(local_file_path)
            .await
            .map_err(|e| {
                CommandError::Failed(format!("Errror while reading file metadata : {e}"))
            })?;
        if file_metadata.is_dir() {
            return Err(CommandError::Failed(format!(
                "Provided file path ({local_file_path}) is dir"
            )));
        }
        let file_size = file_metadata.len();
        let chunk_size = self.master.chunk_size().await?;
        info!(%file_size, %chunk_size, "storing file");

        self.master.create(remote_path).await?;
        match self
            .store_chunks(local_file_path, remote_path, file_size, chunk_size)
            .await
        {
            Ok(chunk_count) => Ok(format!(
                "stored {file_size} bytes in {chunk_count} chunks at {remote_path}"
            )),
            Err(e) => {
                error!(error = %e, "aborting the store file operation");
                if let Err(delete_error) = self.master.delete(remote_path).await {
                    warn!(error = %delete_error, "partial file left on the master");
                }
                Err(e)
            }
        }
    }

    async fn store_chunks(
        &self,
        local_file_path: &str,
        remote_path: &str,
        file_size: u64,
        chunk_size: u64,
    ) -> Result<usize, CommandError> {
        let mut chunk_count = 0;
        for file_chunk in FileChunker::new(local_file_path.to_owned(), file_size, chunk_size) {
            let location = self
                .master
                .allocate_chunk(remote_path, file_chunk.start_offset)
                .await?;
            trace!(chunk_id = %location.chunk_id, servers = ?location.servers, "working on chunk");
            let data = file_chunk.read().await.map_err(CommandError::failed)?;
            // timeouts and rejections fail the put as they are
            retry_with_backoff_when(
                || {
                    self.chunkserver
                        .write(location.chunk_id, location.servers.clone(), data.clone())
                },
                |e: &FsError| matches!(e, FsError::Unreachable(_)),
                self.write_retries.max(1),
                self.write_backoff,
            )
            .await
            .map_err(|e| {
                CommandError::Failed(format!(
                    "Error while writing chunk {} : {e}",
                    location.chunk_id
                ))
            })?;
            chunk_count += 1;
        }
        self.master.set_size(remote_path, file_size).await?;
        Ok(chunk_count)
    }
}
