use std::collections::HashMap;

use utilities::logger::{instrument, trace, tracing};

use super::placement_policy::PlacementPolicy;
use crate::master_state::{
    ServerId,
    chunk_record::ChunkRecord,
    server_record::{Liveness, ServerRecord},
};

/// Most remaining capacity first, then the server heard from longest ago, then the lowest id.
#[derive(Debug, Default, Clone, Copy)]
pub struct DefaultPlacementPolicy;

impl DefaultPlacementPolicy {
    pub fn new() -> Self {
        Self
    }

    fn ranked<'a>(
        servers: &'a HashMap<ServerId, ServerRecord>,
        exclude: &[ServerId],
    ) -> Vec<&'a ServerRecord> {
        let mut candidates: Vec<&ServerRecord> = servers
            .values()
            .filter(|server| server.can_store() && !exclude.contains(&server.id))
            .collect();
        candidates.sort_by(|a, b| {
            b.capacity
                .cmp(&a.capacity)
                .then(a.last_heartbeat.cmp(&b.last_heartbeat))
                .then(a.id.cmp(&b.id))
        });
        candidates
    }
}

impl PlacementPolicy for DefaultPlacementPolicy {
    #[instrument(name = "policy_placement_targets", skip(self, servers))]
    fn select_targets(
        &self,
        servers: &HashMap<ServerId, ServerRecord>,
        count: usize,
        exclude: &[ServerId],
    ) -> Vec<ServerId> {
        let targets: Vec<ServerId> = Self::ranked(servers, exclude)
            .into_iter()
            .take(count)
            .map(|server| server.id)
            .collect();
        trace!(?targets, "selected targets");
        targets
    }

    #[instrument(name = "policy_placement_repair", skip(self, servers, record), fields(chunk_id = record.id))]
    fn select_repair(
        &self,
        servers: &HashMap<ServerId, ServerRecord>,
        record: &ChunkRecord,
    ) -> Option<(ServerId, ServerId)> {
        let is_alive = |server_id: &ServerId| {
            servers
                .get(server_id)
                .is_some_and(|server| server.liveness == Liveness::Alive)
        };
        // a replica that reported the chunk is known to hold it
        let source = record
            .replicas
            .iter()
            .copied()
            .filter(is_alive)
            .find(|server_id| record.confirmed.contains(server_id))
            .or_else(|| record.replicas.iter().copied().find(is_alive))?;
        let target = *self.select_targets(servers, 1, &record.replicas).first()?;
        Some((source, target))
    }
}

#[cfg(test)]
mod tests {
    use std::time::{Duration, Instant};

    use super::*;

    fn servers(specs: &[(ServerId, u64, u64)]) -> HashMap<ServerId, ServerRecord> {
        let start = Instant::now();
        specs
            .iter()
            .map(|&(id, capacity, beat_offset_ms)| {
                let record = ServerRecord::new(
                    id,
                    &format!("127.0.0.1:{}", 1000 + id),
                    capacity,
                    start + Duration::from_millis(beat_offset_ms),
                );
                (id, record)
            })
            .collect()
    }

    #[test]
    fn orders_by_capacity_then_heartbeat_then_id() {
        let servers = servers(&[(1, 5, 0), (2, 9, 0), (3, 5, 0), (4, 5, 10), (5, 0, 0)]);
        let policy = DefaultPlacementPolicy::new();
        assert_eq!(policy.select_targets(&servers, 3, &[]), vec![2, 1, 3]);
        assert_eq!(policy.select_targets(&servers, 10, &[]), vec![2, 1, 3, 4]);
        assert_eq!(policy.select_targets(&servers, 2, &[2]), vec![1, 3]);
    }

    #[test]
    fn skips_servers_that_are_not_alive() {
        let mut servers = servers(&[(1, 5, 0), (2, 5, 0), (3, 5, 0)]);
        servers.get_mut(&1).unwrap().liveness = Liveness::Suspect;
        servers.get_mut(&2).unwrap().mark_dead(Instant::now());
        let policy = DefaultPlacementPolicy::new();
        assert_eq!(policy.select_targets(&servers, 3, &[]), vec![3]);
    }

    #[test]
    fn repair_prefers_confirmed_source() {
        let servers = servers(&[(1, 5, 0), (2, 5, 0), (3, 1, 0), (4, 8, 0)]);
        let mut record = ChunkRecord::new(7, vec![1, 2], 3);
        record.admit(2);
        let policy = DefaultPlacementPolicy::new();
        assert_eq!(policy.select_repair(&servers, &record), Some((2, 4)));

        // nothing confirmed, any live replica will do
        let record = ChunkRecord::new(8, vec![1, 2], 3);
        assert_eq!(policy.select_repair(&servers, &record), Some((1, 4)));

        let record = ChunkRecord::new(9, vec![1, 2, 3, 4], 5);
        assert_eq!(policy.select_repair(&servers, &record), None);
    }
}
