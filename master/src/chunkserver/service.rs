use std::time::Duration;

use async_trait::async_trait;
use proto::{
    MAX_MESSAGE_SIZE,
    generated::master_chunkserver::{
        ReplicateChunkRequest, master_chunkserver_client::MasterChunkserverClient,
    },
};
use tonic::transport::Channel;
use utilities::{
    error::{FsError, check_status},
    grpc_channel_pool::GRPC_CHANNEL_POOL,
    logger::{instrument, trace, tracing},
};

use crate::master_state::ChunkId;

/// Outbound calls from the master to chunk servers.
#[async_trait]
pub trait ChunkserverService: Send + Sync {
    /// Asks the server at `endpoint` to copy `chunk_id` to every server in `targets`.
    async fn replicate_chunk(
        &self,
        endpoint: &str,
        chunk_id: ChunkId,
        targets: Vec<String>,
    ) -> Result<(), FsError>;
}

#[derive(Clone, Copy, Debug)]
pub struct GrpcChunkserverService {
    rpc_timeout: Duration,
}

impl GrpcChunkserverService {
    pub fn new(rpc_timeout: Duration) -> Self {
        Self { rpc_timeout }
    }

    async fn get_connection(addrs: &str) -> Result<MasterChunkserverClient<Channel>, FsError> {
        let channel = GRPC_CHANNEL_POOL.get_channel(addrs).await?;
        Ok(MasterChunkserverClient::new(channel)
            .max_decoding_message_size(MAX_MESSAGE_SIZE)
            .max_encoding_message_size(MAX_MESSAGE_SIZE))
    }
}

#[async_trait]
impl ChunkserverService for GrpcChunkserverService {
    #[instrument(name = "service_chunkserver_replicate_chunk", skip(self))]
    async fn replicate_chunk(
        &self,
        endpoint: &str,
        chunk_id: ChunkId,
        targets: Vec<String>,
    ) -> Result<(), FsError> {
        let mut client = Self::get_connection(endpoint).await?;
        let request = tonic::Request::new(ReplicateChunkRequest { chunk_id, targets });
        let response = tokio::time::timeout(self.rpc_timeout, client.replicate_chunk(request))
            .await??
            .into_inner();
        trace!(status = %response.status, "replicate chunk answered");
        check_status(response.status, &response.message)
    }
}
