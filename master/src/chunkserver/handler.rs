use std::{sync::Arc, time::Instant};

use proto::generated::chunkserver_master::{
    BeatHeartRequest, BeatHeartResponse, BirthChunkRequest, BirthChunkResponse,
    chunkserver_master_server::ChunkserverMaster,
};
use tokio::sync::{Mutex, Notify};
use utilities::{
    error::STATUS_OK,
    logger::{info, instrument, trace, tracing, warn},
};

use crate::master_state::MasterState;

pub struct ChunkserverHandler {
    state: Arc<Mutex<MasterState>>,
    repair_signal: Arc<Notify>,
}

impl ChunkserverHandler {
    pub fn new(state: Arc<Mutex<MasterState>>, repair_signal: Arc<Notify>) -> Self {
        Self {
            state,
            repair_signal,
        }
    }
}

#[tonic::async_trait]
impl ChunkserverMaster for ChunkserverHandler {
    #[instrument(name="grpc_chunkserver_birth",skip(self,request),fields(endpoint= %request.get_ref().endpoint,capacity= %request.get_ref().capacity))]
    async fn birth_chunk(
        &self,
        request: tonic::Request<BirthChunkRequest>,
    ) -> Result<tonic::Response<BirthChunkResponse>, tonic::Status> {
        let birth_request = request.into_inner();
        let mut state = self.state.lock().await;
        let had_repairs = state.repair_queue.len();
        let server_id =
            state.birth_server(&birth_request.endpoint, birth_request.capacity, Instant::now());
        // a takeover may have degraded chunks
        let has_repairs = state.repair_queue.len();
        drop(state);
        info!(%server_id, "chunk server born");
        if has_repairs > had_repairs {
            self.repair_signal.notify_one();
        }
        Ok(tonic::Response::new(BirthChunkResponse {
            status: STATUS_OK,
            message: String::new(),
            server_id,
        }))
    }

    #[instrument(name="grpc_chunkserver_beat_heart",skip(self,request),fields(server_id= %request.get_ref().server_id,added= request.get_ref().added_chunks.len()))]
    async fn beat_heart(
        &self,
        request: tonic::Request<BeatHeartRequest>,
    ) -> Result<tonic::Response<BeatHeartResponse>, tonic::Status> {
        let beat_request = request.into_inner();
        let mut state = self.state.lock().await;
        let result = state.beat_heart(
            beat_request.server_id,
            &beat_request.endpoint,
            beat_request.capacity,
            &beat_request.added_chunks,
            Instant::now(),
        );
        drop(state);
        let response = match result {
            Ok(()) => {
                trace!(capacity = %beat_request.capacity, "heartbeat applied");
                BeatHeartResponse {
                    status: STATUS_OK,
                    message: String::new(),
                }
            }
            Err(e) => {
                warn!(error = %e, "heartbeat rejected");
                BeatHeartResponse {
                    status: e.code(),
                    message: e.to_string(),
                }
            }
        };
        Ok(tonic::Response::new(response))
    }
}

#[cfg(test)]
mod tests {
    use utilities::error::FsError;

    use super::*;

    fn birth(endpoint: &str, capacity: u64) -> tonic::Request<BirthChunkRequest> {
        tonic::Request::new(BirthChunkRequest {
            capacity,
            endpoint: endpoint.to_owned(),
        })
    }

    fn beat(server_id: u64, endpoint: &str, added_chunks: Vec<u64>) -> tonic::Request<BeatHeartRequest> {
        tonic::Request::new(BeatHeartRequest {
            server_id,
            endpoint: endpoint.to_owned(),
            capacity: 5,
            added_chunks,
        })
    }

    #[tokio::test]
    async fn birth_then_beat() {
        let state = Arc::new(Mutex::new(MasterState::new(3)));
        let handler = ChunkserverHandler::new(state.clone(), Arc::new(Notify::new()));
        let born = handler
            .birth_chunk(birth("127.0.0.1:1337", 10))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(born.status, STATUS_OK);
        let other = handler
            .birth_chunk(birth("127.0.0.1:1339", 10))
            .await
            .unwrap()
            .into_inner();
        assert_ne!(born.server_id, other.server_id);

        let ack = handler
            .beat_heart(beat(born.server_id, "127.0.0.1:1337", vec![]))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(ack.status, STATUS_OK);
        assert_eq!(state.lock().await.servers[&born.server_id].capacity, 5);
    }

    #[tokio::test]
    async fn unknown_server_must_birth_again() {
        let handler = ChunkserverHandler::new(
            Arc::new(Mutex::new(MasterState::new(3))),
            Arc::new(Notify::new()),
        );
        let ack = handler
            .beat_heart(beat(77, "127.0.0.1:1337", vec![1]))
            .await
            .unwrap()
            .into_inner();
        assert_eq!(ack.status, FsError::Rejected(String::new()).code());
    }
}
