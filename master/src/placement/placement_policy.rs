use std::collections::HashMap;

use crate::master_state::{ServerId, chunk_record::ChunkRecord, server_record::ServerRecord};

/// Chooses chunk servers for new chunks and for repairs. Called with the master lock held,
/// so implementations only look at the records they are given.
pub trait PlacementPolicy: Send + Sync {
    /// Up to `count` servers for a new replica set, best first. Servers in `exclude` are skipped.
    fn select_targets(
        &self,
        servers: &HashMap<ServerId, ServerRecord>,
        count: usize,
        exclude: &[ServerId],
    ) -> Vec<ServerId>;

    /// `(source, target)` for copying one more replica of `record`.
    fn select_repair(
        &self,
        servers: &HashMap<ServerId, ServerRecord>,
        record: &ChunkRecord,
    ) -> Option<(ServerId, ServerId)>;
}
