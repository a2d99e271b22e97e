use std::sync::Arc;

use proto::generated::client_master::ChunkLocation;
use utilities::logger::{info, instrument, trace, tracing, warn};

use super::CommandError;
use crate::{
    chunk_joiner::ChunkJoiner, chunkserver::service::ChunkserverService,
    master::service::MasterService,
};

pub struct FetchFileHandler {
    master: Arc<dyn MasterService>,
    chunkserver: Arc<dyn ChunkserverService>,
}

impl FetchFileHandler {
    pub fn new(master: Arc<dyn MasterService>, chunkserver: Arc<dyn ChunkserverService>) -> Self {
        Self {
            master,
            chunkserver,
        }
    }

    /// First replica that answers wins.
    async fn read_chunk(&self, location: &ChunkLocation) -> Result<Vec<u8>, CommandError> {
        let mut last_error = None;
        for endpoint in &location.servers {
            match self.chunkserver.read(endpoint, location.chunk_id).await {
                Ok(data) => return Ok(data),
                Err(e) => {
                    warn!(chunk_id = %location.chunk_id, %endpoint, error = %e, "replica did not answer, trying the next one");
                    last_error = Some(e);
                }
            }
        }
        Err(match last_error {
            Some(e) => CommandError::Failed(format!(
                "no replica of chunk {} answered, last error : {e}",
                location.chunk_id
            )),
            None => CommandError::Failed(format!(
                "chunk {} has no live replica",
                location.chunk_id
            )),
        })
    }

    #[instrument(skip(self))]
    pub async fn fetch_file(
        &self,
        remote_path: &str,
        local_file_path: &str,
    ) -> Result<String, CommandError> {
        let meta = self.master.read_meta(remote_path).await?;
        let chunk_size = self.master.chunk_size().await?;
        let locations = self.master.lookup_chunks(remote_path).await?;
        trace!(size = %meta.size, chunks = locations.len(), "got chunk details for file");
        if (locations.len() as u64).saturating_mul(chunk_size) < meta.size {
            return Err(CommandError::Failed(format!(
                "{remote_path} has {} bytes but only {} chunks",
                meta.size,
                locations.len()
            )));
        }

        let chunk_joiner = ChunkJoiner::new(local_file_path.to_owned(), meta.size)
            .await
            .map_err(CommandError::failed)?;
        for (index, location) in locations.iter().enumerate() {
            let start_offset = index as u64 * chunk_size;
            if start_offset >= meta.size {
                break;
            }
            let joined = match self.read_chunk(location).await {
                Ok(data) => chunk_joiner
                    .join_chunk(start_offset, &data)
                    .await
                    .map_err(CommandError::failed),
                Err(e) => Err(e),
            };
            if let Err(e) = joined {
                info!("Freeing the reserverd space");
                chunk_joiner.abort().await;
                return Err(e);
            }
        }
        Ok(format!("fetched {} bytes into {local_file_path}", meta.size))
    }
}
