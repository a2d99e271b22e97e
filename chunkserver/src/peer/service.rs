use std::time::Duration;

use proto::{
    MAX_MESSAGE_SIZE,
    generated::client_chunkserver::{
        WriteInfo, WriteRequest, client_chunkserver_client::ClientChunkserverClient,
    },
};
use storage::ChunkId;
use tonic::transport::Channel;
use utilities::{
    error::{FsError, check_status},
    grpc_channel_pool::GRPC_CHANNEL_POOL,
    logger::{instrument, trace, tracing},
    retry_policy::retry_with_backoff,
};

/// Outbound `Write` calls to other chunk servers, used for chain forwarding and repair.
#[derive(Debug, Clone, Copy)]
pub struct PeerService {
    rpc_timeout: Duration,
    dial_retries: u8,
    dial_backoff: Duration,
}

impl PeerService {
    pub fn new(rpc_timeout: Duration, dial_retries: u8, dial_backoff: Duration) -> Self {
        Self {
            rpc_timeout,
            dial_retries,
            dial_backoff,
        }
    }

    /// Dialing is retried with backoff, a failed call on an open channel is not.
    async fn get_grpc_connection(
        &self,
        addrs: &str,
    ) -> Result<ClientChunkserverClient<Channel>, FsError> {
        let channel = retry_with_backoff(
            || GRPC_CHANNEL_POOL.get_channel(addrs),
            self.dial_retries.max(1),
            self.dial_backoff,
        )
        .await?;
        Ok(ClientChunkserverClient::new(channel)
            .max_decoding_message_size(MAX_MESSAGE_SIZE)
            .max_encoding_message_size(MAX_MESSAGE_SIZE))
    }

    /// Sends `data` to `servers[0]`, which stores it and forwards along the rest of `servers`.
    #[instrument(name = "service_peer_write", skip(self, servers, data), fields(len = data.len(), hops = servers.len()))]
    pub async fn write(
        &self,
        chunk_id: ChunkId,
        servers: Vec<String>,
        data: Vec<u8>,
    ) -> Result<(), FsError> {
        let Some(next_hop) = servers.first().cloned() else {
            return Ok(());
        };
        let mut client = self.get_grpc_connection(&next_hop).await?;
        let request = tonic::Request::new(WriteRequest {
            info: Some(WriteInfo { chunk_id, servers }),
            data,
        });
        let response = match tokio::time::timeout(self.rpc_timeout, client.write(request)).await {
            Ok(Ok(response)) => response.into_inner(),
            Ok(Err(status)) => {
                // the next dial starts from a fresh channel
                GRPC_CHANNEL_POOL.evict(&next_hop).await;
                return Err(status.into());
            }
            Err(elapsed) => return Err(elapsed.into()),
        };
        trace!(%next_hop, status = %response.status, "write forwarded");
        check_status(response.status, &response.message)
    }
}
