//! In-process chunk servers listening on ephemeral localhost ports.

use std::{sync::Arc, time::Duration};

use proto::generated::{
    client_chunkserver::client_chunkserver_server::ClientChunkserverServer,
    master_chunkserver::master_chunkserver_server::MasterChunkserverServer,
};
use storage::memory_storage::MemoryStorage;
use tokio::{net::TcpListener, sync::Mutex};
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;

use crate::{
    chunk_locks::ChunkLocks, chunkserver_state::ChunkserverState, client::handler::ClientHandler,
    master::handler::MasterHandler, peer::service::PeerService,
};

pub struct TestNode {
    pub endpoint: String,
    pub store: MemoryStorage,
    pub state: Arc<Mutex<ChunkserverState>>,
    locks: Arc<ChunkLocks>,
}

fn peer_service() -> PeerService {
    PeerService::new(Duration::from_secs(2), 2, Duration::from_millis(10))
}

impl TestNode {
    pub async fn spawn(capacity: u64) -> Self {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let endpoint = listener.local_addr().unwrap().to_string();
        let node = Self {
            state: Arc::new(Mutex::new(ChunkserverState::new(&endpoint, capacity))),
            endpoint,
            store: MemoryStorage::new(),
            locks: Arc::new(ChunkLocks::new()),
        };
        let router = Server::builder()
            .add_service(ClientChunkserverServer::new(node.client_handler()))
            .add_service(MasterChunkserverServer::new(node.master_handler()));
        tokio::spawn(router.serve_with_incoming(TcpListenerStream::new(listener)));
        node
    }

    pub fn client_handler(&self) -> ClientHandler {
        ClientHandler::new(
            self.store.clone(),
            self.state.clone(),
            self.locks.clone(),
            peer_service(),
        )
    }

    pub fn master_handler(&self) -> MasterHandler {
        MasterHandler::new(self.store.clone(), peer_service())
    }
}
