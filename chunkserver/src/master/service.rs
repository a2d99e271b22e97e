use std::time::Duration;

use async_trait::async_trait;
use proto::generated::chunkserver_master::{
    BeatHeartRequest, BirthChunkRequest, chunkserver_master_client::ChunkserverMasterClient,
};
use storage::ChunkId;
use tonic::transport::Channel;
use utilities::{
    error::{FsError, check_status},
    grpc_channel_pool::GRPC_CHANNEL_POOL,
    logger::{info, instrument, trace, tracing},
};

/// Calls from a chunk server to the master.
#[async_trait]
pub trait MasterService: Send + Sync {
    /// Registers with the master and returns the assigned server id.
    async fn birth_chunk(&self, endpoint: &str, capacity: u64) -> Result<u64, FsError>;
    async fn beat_heart(
        &self,
        server_id: u64,
        endpoint: &str,
        capacity: u64,
        added_chunks: Vec<ChunkId>,
    ) -> Result<(), FsError>;
}

pub struct GrpcMasterService {
    master_addrs: String,
    rpc_timeout: Duration,
}

impl GrpcMasterService {
    pub fn new(master_addrs: &str, rpc_timeout: Duration) -> Self {
        Self {
            master_addrs: master_addrs.to_owned(),
            rpc_timeout,
        }
    }

    async fn get_grpc_connection(&self) -> Result<ChunkserverMasterClient<Channel>, FsError> {
        let channel = GRPC_CHANNEL_POOL.get_channel(&self.master_addrs).await?;
        Ok(ChunkserverMasterClient::new(channel))
    }
}

#[async_trait]
impl MasterService for GrpcMasterService {
    #[instrument(name = "service_master_birth_chunk", skip(self))]
    async fn birth_chunk(&self, endpoint: &str, capacity: u64) -> Result<u64, FsError> {
        let mut client = self.get_grpc_connection().await?;
        let request = tonic::Request::new(BirthChunkRequest {
            capacity,
            endpoint: endpoint.to_owned(),
        });
        let response = tokio::time::timeout(self.rpc_timeout, client.birth_chunk(request))
            .await??
            .into_inner();
        check_status(response.status, &response.message)?;
        info!(server_id = %response.server_id, "born at master");
        Ok(response.server_id)
    }

    #[instrument(name = "service_master_beat_heart", skip(self, added_chunks), fields(added = added_chunks.len()))]
    async fn beat_heart(
        &self,
        server_id: u64,
        endpoint: &str,
        capacity: u64,
        added_chunks: Vec<ChunkId>,
    ) -> Result<(), FsError> {
        let mut client = self.get_grpc_connection().await?;
        let request = tonic::Request::new(BeatHeartRequest {
            server_id,
            endpoint: endpoint.to_owned(),
            capacity,
            added_chunks,
        });
        let response = tokio::time::timeout(self.rpc_timeout, client.beat_heart(request))
            .await??
            .into_inner();
        trace!(status = %response.status, "heartbeat answered");
        check_status(response.status, &response.message)
    }
}
