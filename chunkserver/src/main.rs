mod chunk_locks;
mod chunkserver_state;
mod client;
mod config;
mod heartbeat;
mod master;
mod peer;
#[cfg(test)]
mod test_cluster;

use std::{net::SocketAddr, sync::Arc};

use chunk_locks::ChunkLocks;
use chunkserver_state::ChunkserverState;
use client::handler::ClientHandler;
use config::CONFIG;
use heartbeat::{Heartbeat, SystemMemoryProbe};
use master::{handler::MasterHandler, service::GrpcMasterService};
use peer::service::PeerService;
use proto::{
    MAX_MESSAGE_SIZE,
    generated::{
        client_chunkserver::client_chunkserver_server::ClientChunkserverServer,
        master_chunkserver::master_chunkserver_server::MasterChunkserverServer,
    },
};
use storage::memory_storage::MemoryStorage;
use tokio::sync::{Mutex, watch};
use tonic::transport::Server;
use utilities::{
    logger::{error, info, init_logger},
    result::Result,
};

#[tokio::main]
async fn main() -> Result<()> {
    let _guard = init_logger(
        "Chunkserver",
        &CONFIG.id,
        &CONFIG.log_level,
        &CONFIG.log_base,
        CONFIG.apm_endpoint.as_deref(),
    );
    info!(config = ?*CONFIG, "starting chunk server");

    let store = MemoryStorage::new();
    let state = Arc::new(Mutex::new(ChunkserverState::new(
        &CONFIG.external_addrs,
        CONFIG.capacity,
    )));
    let peer_service = PeerService::new(
        CONFIG.rpc_timeout(),
        CONFIG.dial_retries,
        CONFIG.dial_backoff(),
    );
    let (shutdown_sender, shutdown) = watch::channel(false);

    let heartbeat = Heartbeat::new(
        state.clone(),
        store.clone(),
        Arc::new(GrpcMasterService::new(
            &CONFIG.master_addrs,
            CONFIG.rpc_timeout(),
        )),
        Box::new(SystemMemoryProbe::new()),
        CONFIG.memory_pressure_ratio,
        CONFIG.heartbeat_wait(),
    )
    .start(shutdown);

    let addrs: SocketAddr = format!("0.0.0.0:{}", CONFIG.listen_port).parse()?;
    info!(%addrs, external_addrs = %CONFIG.external_addrs, "grpc server starting");
    let client_service = ClientChunkserverServer::new(ClientHandler::new(
        store.clone(),
        state,
        Arc::new(ChunkLocks::new()),
        peer_service,
    ))
    .max_decoding_message_size(MAX_MESSAGE_SIZE)
    .max_encoding_message_size(MAX_MESSAGE_SIZE);
    let master_service = MasterChunkserverServer::new(MasterHandler::new(store, peer_service))
        .max_decoding_message_size(MAX_MESSAGE_SIZE)
        .max_encoding_message_size(MAX_MESSAGE_SIZE);
    Server::builder()
        .add_service(client_service)
        .add_service(master_service)
        .serve_with_shutdown(addrs, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Error while waiting for ctrl-c");
            }
            info!("shutdown requested");
        })
        .await?;

    let _ = shutdown_sender.send(true);
    let _ = heartbeat.await;
    info!("chunk server stopped");
    Ok(())
}
