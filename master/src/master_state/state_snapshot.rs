use std::{collections::BTreeMap, time::SystemTime};

use serde::Serialize;

use super::{
    ChunkId, MasterState, ServerId,
    chunk_record::{ChunkRecord, ChunkState},
    server_record::{Liveness, ServerRecord},
};

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ServerSnapshot {
    pub endpoint: String,
    pub capacity: u64,
    pub liveness: Liveness,
}

impl From<&ServerRecord> for ServerSnapshot {
    fn from(value: &ServerRecord) -> Self {
        Self {
            endpoint: value.endpoint.clone(),
            capacity: value.capacity,
            liveness: value.liveness,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct ChunkSnapshot {
    pub replicas: Vec<ServerId>,
    pub confirmed: usize,
    pub state: &'static str,
}

impl From<&ChunkRecord> for ChunkSnapshot {
    fn from(value: &ChunkRecord) -> Self {
        let state = match value.state {
            ChunkState::Allocated => "allocated",
            ChunkState::Committed => "committed",
            ChunkState::Orphaned(_) => "orphaned",
        };
        Self {
            replicas: value.replicas.clone(),
            confirmed: value.confirmed.len(),
            state,
        }
    }
}

/// Serializable view of the master pushed to the state log every maintenance tick.
#[derive(Clone, Debug, Serialize)]
pub struct MasterStateSnapshot {
    pub timestamp: SystemTime,
    pub files: BTreeMap<String, Vec<ChunkId>>,
    pub chunks: BTreeMap<ChunkId, ChunkSnapshot>,
    pub servers: BTreeMap<ServerId, ServerSnapshot>,
    pub repair_queue: Vec<ChunkId>,
}

impl From<&MasterState> for MasterStateSnapshot {
    fn from(value: &MasterState) -> Self {
        Self {
            timestamp: SystemTime::now(),
            files: value
                .namespace
                .files()
                .into_iter()
                .map(|(path, inode)| (path, inode.chunks.clone()))
                .collect(),
            chunks: value
                .chunks
                .iter()
                .map(|(&id, record)| (id, record.into()))
                .collect(),
            servers: value
                .servers
                .iter()
                .map(|(&id, server)| (id, server.into()))
                .collect(),
            repair_queue: value.repair_queue.iter().copied().collect(),
        }
    }
}

// the timestamp alone never makes a snapshot worth writing
impl PartialEq for MasterStateSnapshot {
    fn eq(&self, other: &Self) -> bool {
        self.files == other.files
            && self.chunks == other.chunks
            && self.servers == other.servers
            && self.repair_queue == other.repair_queue
    }
}
