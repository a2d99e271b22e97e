mod chunkserver;
mod client_handler;
mod config;
mod master_state;
mod namespace;
mod placement;
mod replication_controller;

use std::{net::SocketAddr, path::Path, sync::Arc, time::Duration};

use chunkserver::{handler::ChunkserverHandler, service::GrpcChunkserverService};
use client_handler::ClientHandler;
use config::CONFIG;
use master_state::{
    MasterState,
    state_mantainer::{MaintenanceSettings, StateMantainer},
    state_snapshot::MasterStateSnapshot,
};
use placement::default_placement_policy::DefaultPlacementPolicy;
use proto::{
    MAX_MESSAGE_SIZE,
    generated::{
        chunkserver_master::chunkserver_master_server::ChunkserverMasterServer,
        client_master::client_master_server::ClientMasterServer,
    },
};
use replication_controller::ReplicationController;
use tokio::sync::{Mutex, Notify, watch};
use tonic::transport::Server;
use utilities::{
    logger::{error, info, init_logger},
    result::Result,
    state_logger::StateLogger,
};

#[tokio::main]
async fn main() -> Result<()> {
    let _guard = init_logger(
        "Master",
        &CONFIG.id,
        &CONFIG.log_level,
        &CONFIG.log_base,
        CONFIG.apm_endpoint.as_deref(),
    );
    info!(config = ?*CONFIG, "starting master");

    let mut master_state = MasterState::new(CONFIG.replication_factor);
    if CONFIG.bootstrap_root {
        master_state.namespace.add_dir("/")?;
    }
    let state = Arc::new(Mutex::new(master_state));
    let repair_signal = Arc::new(Notify::new());
    let (shutdown_sender, shutdown) = watch::channel(false);

    let snapshot_sender = match &CONFIG.state_log_file {
        Some(file) => match StateLogger::<MasterStateSnapshot>::start(Path::new(file)).await {
            Ok(sender) => Some(sender),
            Err(e) => {
                error!(error = %e, %file, "Error while opening the state log, hence shutting down");
                return Err(e);
            }
        },
        None => None,
    };

    let heartbeat_wait = CONFIG.heartbeat_wait();
    let mantainer = StateMantainer::new(
        state.clone(),
        MaintenanceSettings {
            interval: Duration::from_millis(CONFIG.maintenance_interval_ms),
            heartbeat_wait,
            dead_after_missed_beats: CONFIG.dead_after_missed_beats,
            orphan_grace: Duration::from_secs(CONFIG.orphan_grace_secs),
            dead_server_grace: Duration::from_secs(CONFIG.dead_server_grace_secs),
        },
        repair_signal.clone(),
        snapshot_sender,
    )
    .start(shutdown.clone());

    let controller = ReplicationController::new(
        state.clone(),
        Box::new(DefaultPlacementPolicy::new()),
        Arc::new(GrpcChunkserverService::new(CONFIG.rpc_timeout())),
        repair_signal.clone(),
        Duration::from_millis(CONFIG.repair_interval_ms),
        CONFIG.repairs_per_tick,
        // a repaired replica shows up on the target's next heartbeat or two
        heartbeat_wait * 3 + CONFIG.rpc_timeout(),
    )
    .start(shutdown.clone());

    let addrs: SocketAddr = format!("0.0.0.0:{}", CONFIG.listen_port).parse()?;
    info!(%addrs, "grpc server starting");
    let client_service = ClientMasterServer::new(ClientHandler::new(
        state.clone(),
        Box::new(DefaultPlacementPolicy::new()),
        CONFIG.chunk_size,
        repair_signal.clone(),
    ))
    .max_decoding_message_size(MAX_MESSAGE_SIZE)
    .max_encoding_message_size(MAX_MESSAGE_SIZE);
    let chunkserver_service =
        ChunkserverMasterServer::new(ChunkserverHandler::new(state.clone(), repair_signal));
    Server::builder()
        .add_service(client_service)
        .add_service(chunkserver_service)
        .serve_with_shutdown(addrs, async {
            if let Err(e) = tokio::signal::ctrl_c().await {
                error!(error = %e, "Error while waiting for ctrl-c");
            }
            info!("shutdown requested");
        })
        .await?;

    let _ = shutdown_sender.send(true);
    let _ = tokio::join!(mantainer, controller);
    info!("master stopped");
    Ok(())
}
