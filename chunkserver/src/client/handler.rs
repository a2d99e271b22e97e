use std::{collections::HashSet, sync::Arc};

use proto::generated::client_chunkserver::{
    ReadRequest, ReadResponse, WriteRequest, WriteResponse,
    client_chunkserver_server::ClientChunkserver,
};
use storage::{memory_storage::MemoryStorage, storage::Storage};
use tokio::sync::Mutex;
use utilities::{
    error::{FsError, STATUS_OK},
    logger::{debug, instrument, trace, tracing, warn},
};

use crate::{
    chunk_locks::ChunkLocks, chunkserver_state::ChunkserverState, peer::service::PeerService,
};

pub struct ClientHandler {
    store: MemoryStorage,
    state: Arc<Mutex<ChunkserverState>>,
    locks: Arc<ChunkLocks>,
    peer_service: PeerService,
}

impl ClientHandler {
    pub fn new(
        store: MemoryStorage,
        state: Arc<Mutex<ChunkserverState>>,
        locks: Arc<ChunkLocks>,
        peer_service: PeerService,
    ) -> Self {
        Self {
            store,
            state,
            locks,
            peer_service,
        }
    }

    /// Stores the chunk, then forwards it to the rest of the chain. Returns once every
    /// downstream server has stored it too.
    async fn chain_write(&self, request: WriteRequest) -> Result<(), FsError> {
        let info = request
            .info
            .ok_or_else(|| FsError::BadPath("write without chunk info".to_owned()))?;
        let chunk_id = info.chunk_id;
        let mut seen = HashSet::with_capacity(info.servers.len());
        if let Some(repeated) = info.servers.iter().find(|server| !seen.insert(server.as_str())) {
            return Err(FsError::BadPath(format!(
                "server {repeated} appears twice in the write chain of chunk {chunk_id}"
            )));
        }
        let _guard = self.locks.lock(chunk_id).await;

        let admitted = self.store.write(chunk_id, request.data.clone()).await?;
        if admitted {
            self.state.lock().await.on_admitted(chunk_id);
            trace!(%chunk_id, "chunk admitted");
        }

        // servers = [self, next hop, ...]
        let mut servers = info.servers;
        if !servers.is_empty() {
            servers.remove(0);
        }
        if servers.is_empty() {
            return Ok(());
        }
        debug!(next_hop = %servers[0], remaining = servers.len(), "forwarding write");
        self.peer_service
            .write(chunk_id, servers, request.data)
            .await
            .inspect_err(|e| warn!(%chunk_id, error = %e, "forwarding failed"))
    }
}

#[tonic::async_trait]
impl ClientChunkserver for ClientHandler {
    #[instrument(name="grpc_client_read",skip(self,request),fields(chunk_id= %request.get_ref().chunk_id))]
    async fn read(
        &self,
        request: tonic::Request<ReadRequest>,
    ) -> Result<tonic::Response<ReadResponse>, tonic::Status> {
        let read_request = request.into_inner();
        let response = match self.store.read(read_request.chunk_id).await {
            Ok(data) => ReadResponse {
                status: STATUS_OK,
                message: String::new(),
                data,
            },
            Err(e) => ReadResponse {
                status: e.code(),
                message: e.to_string(),
                data: vec![],
            },
        };
        Ok(tonic::Response::new(response))
    }

    #[instrument(name="grpc_client_write",skip(self,request),fields(chunk_id= ?request.get_ref().info.as_ref().map(|info| info.chunk_id),len= request.get_ref().data.len()))]
    async fn write(
        &self,
        request: tonic::Request<WriteRequest>,
    ) -> Result<tonic::Response<WriteResponse>, tonic::Status> {
        let response = match self.chain_write(request.into_inner()).await {
            Ok(()) => WriteResponse {
                status: STATUS_OK,
                message: String::new(),
            },
            Err(e) => WriteResponse {
                status: e.code(),
                message: e.to_string(),
            },
        };
        Ok(tonic::Response::new(response))
    }
}
