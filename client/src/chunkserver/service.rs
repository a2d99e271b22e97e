use std::time::Duration;

use async_trait::async_trait;
use proto::{
    MAX_MESSAGE_SIZE,
    generated::client_chunkserver::{
        ReadRequest, WriteInfo, WriteRequest, client_chunkserver_client::ClientChunkserverClient,
    },
};
use tonic::transport::Channel;
use utilities::{
    error::{FsError, check_status},
    grpc_channel_pool::GRPC_CHANNEL_POOL,
    logger::{instrument, tracing},
};

/// Chunk data calls to chunk servers.
#[async_trait]
pub trait ChunkserverService: Send + Sync {
    async fn read(&self, endpoint: &str, chunk_id: u64) -> Result<Vec<u8>, FsError>;
    /// Writes to the head of `servers`, which forwards along the rest of the chain.
    async fn write(
        &self,
        chunk_id: u64,
        servers: Vec<String>,
        data: Vec<u8>,
    ) -> Result<(), FsError>;
}

pub struct GrpcChunkserverService {
    rpc_timeout: Duration,
}

impl GrpcChunkserverService {
    pub fn new(rpc_timeout: Duration) -> Self {
        Self { rpc_timeout }
    }

    async fn get_grpc_connection(
        &self,
        endpoint: &str,
    ) -> Result<ClientChunkserverClient<Channel>, FsError> {
        let channel = GRPC_CHANNEL_POOL.get_channel(endpoint).await?;
        Ok(ClientChunkserverClient::new(channel)
            .max_decoding_message_size(MAX_MESSAGE_SIZE)
            .max_encoding_message_size(MAX_MESSAGE_SIZE))
    }
}

#[async_trait]
impl ChunkserverService for GrpcChunkserverService {
    #[instrument(name = "service_chunkserver_read", skip(self))]
    async fn read(&self, endpoint: &str, chunk_id: u64) -> Result<Vec<u8>, FsError> {
        let mut client = self.get_grpc_connection(endpoint).await?;
        let request = tonic::Request::new(ReadRequest { chunk_id });
        let response = tokio::time::timeout(self.rpc_timeout, client.read(request))
            .await??
            .into_inner();
        check_status(response.status, &response.message)?;
        Ok(response.data)
    }

    #[instrument(name = "service_chunkserver_write", skip(self, data), fields(len = data.len()))]
    async fn write(
        &self,
        chunk_id: u64,
        servers: Vec<String>,
        data: Vec<u8>,
    ) -> Result<(), FsError> {
        let head = servers
            .first()
            .cloned()
            .ok_or_else(|| FsError::NoCapacity(format!("chunk {chunk_id} has no replicas")))?;
        let mut client = self.get_grpc_connection(&head).await?;
        let request = tonic::Request::new(WriteRequest {
            info: Some(WriteInfo { chunk_id, servers }),
            data,
        });
        let response = tokio::time::timeout(self.rpc_timeout, client.write(request))
            .await??
            .into_inner();
        check_status(response.status, &response.message)
    }
}
