use proto::generated::master_chunkserver::{
    ReplicateChunkRequest, ReplicateChunkResponse, master_chunkserver_server::MasterChunkserver,
};
use storage::{memory_storage::MemoryStorage, storage::Storage};
use utilities::{
    error::{FsError, STATUS_OK},
    logger::{error, info, instrument, tracing},
};

use crate::peer::service::PeerService;

pub struct MasterHandler {
    store: MemoryStorage,
    peer_service: PeerService,
}

impl MasterHandler {
    pub fn new(store: MemoryStorage, peer_service: PeerService) -> Self {
        Self {
            store,
            peer_service,
        }
    }

    /// Reads the local copy and writes it to each target as a one-server chain.
    async fn replicate(&self, chunk_id: u64, targets: Vec<String>) -> Result<(), FsError> {
        let data = self.store.read(chunk_id).await?;
        let mut first_error = None;
        for target in targets {
            match self
                .peer_service
                .write(chunk_id, vec![target.clone()], data.clone())
                .await
            {
                Ok(()) => info!(%chunk_id, %target, "chunk replicated"),
                Err(e) => {
                    error!(%chunk_id, %target, error = %e, "Error while replicating chunk");
                    first_error.get_or_insert(e);
                }
            }
        }
        first_error.map_or(Ok(()), Err)
    }
}

#[tonic::async_trait]
impl MasterChunkserver for MasterHandler {
    #[instrument(name="grpc_master_replicate_chunk",skip(self,request),fields(chunk_id= %request.get_ref().chunk_id,targets= ?request.get_ref().targets))]
    async fn replicate_chunk(
        &self,
        request: tonic::Request<ReplicateChunkRequest>,
    ) -> Result<tonic::Response<ReplicateChunkResponse>, tonic::Status> {
        let replicate_request = request.into_inner();
        let response = match self
            .replicate(replicate_request.chunk_id, replicate_request.targets)
            .await
        {
            Ok(()) => ReplicateChunkResponse {
                status: STATUS_OK,
                message: String::new(),
            },
            Err(e) => ReplicateChunkResponse {
                status: e.code(),
                message: e.to_string(),
            },
        };
        Ok(tonic::Response::new(response))
    }
}
