pub mod chunk_record;
pub mod inode;
pub mod server_record;
pub mod state_mantainer;
pub mod state_snapshot;

use std::{
    collections::{BTreeSet, HashMap},
    time::{Duration, Instant},
};

use proto::generated::client_master::ChunkLocation;
use utilities::{
    error::FsError,
    logger::{error, info, trace, warn},
};

use crate::{
    namespace::{Trie, path},
    placement::placement_policy::PlacementPolicy,
};
use chunk_record::ChunkRecord;
use inode::Inode;
use server_record::{Liveness, ServerRecord};

pub type ChunkId = u64;
pub type ServerId = u64;

/// Everything the master knows. Always accessed through one `Arc<Mutex<MasterState>>`, so
/// every method here runs serialized with every other.
#[derive(Debug)]
pub struct MasterState {
    pub namespace: Trie<Inode>,
    pub chunks: HashMap<ChunkId, ChunkRecord>,
    pub servers: HashMap<ServerId, ServerRecord>,
    /// chunks handed to the re-replication controller
    pub repair_queue: BTreeSet<ChunkId>,
    pub replication_factor: usize,
    next_chunk_id: ChunkId,
    next_server_id: ServerId,
}

impl MasterState {
    pub fn new(replication_factor: usize) -> Self {
        Self {
            namespace: Trie::new(),
            chunks: HashMap::default(),
            servers: HashMap::default(),
            repair_queue: BTreeSet::default(),
            replication_factor,
            next_chunk_id: 1,
            next_server_id: 1,
        }
    }

    pub fn next_chunk_id(&self) -> ChunkId {
        self.next_chunk_id
    }

    pub fn endpoint(&self, server_id: ServerId) -> Option<&str> {
        self.servers
            .get(&server_id)
            .map(|server| server.endpoint.as_str())
    }

    fn location(&self, record: &ChunkRecord) -> ChunkLocation {
        ChunkLocation {
            chunk_id: record.id,
            servers: record
                .replicas
                .iter()
                .filter_map(|&server_id| self.endpoint(server_id).map(str::to_owned))
                .collect(),
        }
    }

    /// Registers a chunk server. A live record already holding the endpoint belongs to an
    /// earlier incarnation of the same server and is declared dead first.
    pub fn birth_server(&mut self, endpoint: &str, capacity: u64, now: Instant) -> ServerId {
        let stale: Vec<ServerId> = self
            .servers
            .values()
            .filter(|server| server.is_live() && server.endpoint == endpoint)
            .map(|server| server.id)
            .collect();
        for server_id in stale {
            info!(%server_id, %endpoint, "endpoint re-birthed, retiring the old record");
            self.on_server_dead(server_id, now);
        }
        let server_id = self.next_server_id;
        self.next_server_id += 1;
        self.servers
            .insert(server_id, ServerRecord::new(server_id, endpoint, capacity, now));
        server_id
    }

    /// Applies one heartbeat. Unknown and dead servers are rejected and have to birth again.
    pub fn beat_heart(
        &mut self,
        server_id: ServerId,
        endpoint: &str,
        capacity: u64,
        added_chunks: &[ChunkId],
        now: Instant,
    ) -> Result<(), FsError> {
        let server = self
            .servers
            .get_mut(&server_id)
            .filter(|server| server.is_live())
            .ok_or_else(|| {
                FsError::Rejected(format!("server {server_id} is unknown or dead, birth again"))
            })?;
        if server.liveness == Liveness::Suspect {
            info!(%server_id, "suspect server is alive again");
        }
        server.mark_heartbeat(endpoint, capacity, now);
        for &chunk_id in added_chunks {
            self.on_chunk_admitted(server_id, chunk_id);
        }
        Ok(())
    }

    /// Idempotent union of `server_id` into the chunk's replica set.
    pub fn on_chunk_admitted(&mut self, server_id: ServerId, chunk_id: ChunkId) {
        match self.chunks.get_mut(&chunk_id) {
            Some(record) => {
                if record.admit(server_id) {
                    trace!(%chunk_id, %server_id, "replica added");
                }
                if !record.needs_repair() {
                    self.repair_queue.remove(&chunk_id);
                }
            }
            None => {
                // ids from before a master restart must never be handed out again
                if chunk_id >= self.next_chunk_id {
                    self.next_chunk_id = chunk_id + 1;
                }
                trace!(%chunk_id, %server_id, "admission of an untracked chunk");
            }
        }
    }

    /// Marks a server dead and drops it from every replica set. Returns the chunks left
    /// under-replicated, which are also queued for repair.
    pub fn on_server_dead(&mut self, server_id: ServerId, now: Instant) -> Vec<ChunkId> {
        if let Some(server) = self.servers.get_mut(&server_id) {
            server.mark_dead(now);
        }
        let mut degraded = Vec::new();
        for (&chunk_id, record) in self.chunks.iter_mut() {
            if !record.remove_replica(server_id) {
                continue;
            }
            if record.replicas.is_empty() && !record.is_orphaned() {
                warn!(%chunk_id, "lost every replica of chunk");
            }
            if record.needs_repair() {
                degraded.push(chunk_id);
                self.repair_queue.insert(chunk_id);
            }
        }
        degraded.sort_unstable();
        degraded
    }

    /// Moves servers along Alive → Suspect → Dead by missed heartbeats. Returns the servers
    /// that died in this pass.
    pub fn update_liveness(
        &mut self,
        now: Instant,
        heartbeat_wait: Duration,
        dead_after_missed_beats: u32,
    ) -> Vec<ServerId> {
        let mut died = Vec::new();
        for server in self.servers.values_mut() {
            if !server.is_live() {
                continue;
            }
            let missed = server.missed_beats(now, heartbeat_wait);
            if missed >= dead_after_missed_beats {
                died.push(server.id);
            } else if missed >= 1 && server.liveness == Liveness::Alive {
                info!(server_id = %server.id, %missed, "server is suspect");
                server.liveness = Liveness::Suspect;
            }
        }
        died.sort_unstable();
        for &server_id in &died {
            let degraded = self.on_server_dead(server_id, now);
            warn!(%server_id, degraded = degraded.len(), "server declared dead");
        }
        died
    }

    pub fn create_file(&mut self, file_path: &str) -> Result<&Inode, FsError> {
        let (_, name) = path::split_file(file_path)?;
        self.namespace.add_file(file_path, Inode::new(&name))?;
        self.namespace.get_file(file_path)
    }

    /// Removes the inode and orphans its chunks for the sweep.
    pub fn delete_file(&mut self, file_path: &str, now: Instant) -> Result<Inode, FsError> {
        let inode = self.namespace.delete_file(file_path)?;
        for chunk_id in &inode.chunks {
            if let Some(record) = self.chunks.get_mut(chunk_id) {
                record.mark_orphaned(now);
            }
            self.repair_queue.remove(chunk_id);
        }
        Ok(inode)
    }

    /// Returns the chunk backing `offset` of the file, placing a new one when the offset is
    /// exactly the end of the chunk list. Asking again for an existing index returns the
    /// chunk already placed there.
    pub fn allocate_chunk(
        &mut self,
        file_path: &str,
        offset: u64,
        chunk_size: u64,
        policy: &dyn PlacementPolicy,
    ) -> Result<ChunkLocation, FsError> {
        if chunk_size == 0 || offset % chunk_size != 0 {
            return Err(FsError::BadOffset(format!(
                "offset {offset} is not a multiple of the chunk size {chunk_size}"
            )));
        }
        let index = (offset / chunk_size) as usize;
        let chunk_count = self.namespace.get_file(file_path)?.chunks.len();
        if index < chunk_count {
            let chunk_id = self.namespace.get_file(file_path)?.chunks[index];
            let record = self.chunks.get(&chunk_id).ok_or_else(|| {
                FsError::Internal(format!("chunk {chunk_id} of {file_path} has no record"))
            })?;
            return Ok(self.location(record));
        }
        if index > chunk_count {
            return Err(FsError::BadOffset(format!(
                "offset {offset} is past the end of {file_path} ({chunk_count} chunks)"
            )));
        }

        let targets = policy.select_targets(&self.servers, self.replication_factor, &[]);
        if targets.is_empty() {
            return Err(FsError::NoCapacity(
                "no live chunk server has room for a new chunk".to_owned(),
            ));
        }
        let chunk_id = self.next_chunk_id;
        self.next_chunk_id += 1;
        let record = ChunkRecord::new(chunk_id, targets, self.replication_factor);
        trace!(%chunk_id, primary = ?record.primary(), replicas = ?record.replicas, "chunk placed");
        if record.needs_repair() {
            warn!(%chunk_id, replicas = record.replicas.len(), "chunk placed under-replicated");
            self.repair_queue.insert(chunk_id);
        }
        let location = self.location(&record);
        self.chunks.insert(chunk_id, record);
        self.namespace.get_file_mut(file_path)?.chunks.push(chunk_id);
        Ok(location)
    }

    pub fn lookup_chunks(&self, file_path: &str) -> Result<Vec<ChunkLocation>, FsError> {
        let inode = self.namespace.get_file(file_path)?;
        inode
            .chunks
            .iter()
            .map(|chunk_id| {
                self.chunks
                    .get(chunk_id)
                    .map(|record| self.location(record))
                    .ok_or_else(|| FsError::NotFound(format!("chunk {chunk_id} has no record")))
            })
            .collect()
    }

    /// Queues every live chunk below its target and returns the queue in id order.
    pub fn collect_repairs(&mut self) -> Vec<ChunkId> {
        let under: Vec<ChunkId> = self
            .chunks
            .values()
            .filter(|record| record.needs_repair())
            .map(|record| record.id)
            .collect();
        self.repair_queue.extend(under);
        let chunks = &self.chunks;
        self.repair_queue
            .retain(|chunk_id| chunks.get(chunk_id).is_some_and(ChunkRecord::needs_repair));
        self.repair_queue.iter().copied().collect()
    }

    /// Drops orphaned chunk records older than `grace`.
    pub fn sweep_orphans(&mut self, now: Instant, grace: Duration) -> usize {
        let before = self.chunks.len();
        self.chunks.retain(|_, record| match record.state {
            chunk_record::ChunkState::Orphaned(at) => now.saturating_duration_since(at) < grace,
            _ => true,
        });
        before - self.chunks.len()
    }

    /// Forgets dead server records older than `grace`.
    pub fn reap_dead_servers(&mut self, now: Instant, grace: Duration) -> usize {
        let before = self.servers.len();
        self.servers.retain(|_, server| match server.died_at {
            Some(at) if !server.is_live() => now.saturating_duration_since(at) < grace,
            _ => true,
        });
        before - self.servers.len()
    }

    /// Checks the cross-structure invariants and describes the first violation found.
    pub fn check_invariants(&self) -> Result<(), String> {
        for (file_path, inode) in self.namespace.files() {
            if self.namespace.is_dir(&file_path) {
                return Err(format!("{file_path} is both a file and a directory"));
            }
            for chunk_id in &inode.chunks {
                if !self.chunks.contains_key(chunk_id) {
                    return Err(format!("chunk {chunk_id} of {file_path} has no record"));
                }
            }
        }
        for record in self.chunks.values() {
            for server_id in &record.replicas {
                if !self.servers.get(server_id).is_some_and(ServerRecord::is_live) {
                    return Err(format!(
                        "chunk {} lists server {server_id} which is not live",
                        record.id
                    ));
                }
            }
            if record.id >= self.next_chunk_id {
                return Err(format!("chunk {} is at or above the allocator", record.id));
            }
        }
        Ok(())
    }
}

/// Master state can no longer be trusted, stop before anything else is written.
pub fn abort_on_violation(violation: &str) -> ! {
    error!(%violation, "master invariant violated, aborting");
    std::process::abort()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::placement::default_placement_policy::DefaultPlacementPolicy;

    const CHUNK: u64 = 64;

    fn rooted() -> MasterState {
        let mut state = MasterState::new(3);
        state.namespace.add_dir("/").unwrap();
        state
    }

    fn birth(state: &mut MasterState, count: u64, capacity: u64, now: Instant) -> Vec<ServerId> {
        (0..count)
            .map(|i| state.birth_server(&format!("10.0.0.{i}:1337"), capacity, now))
            .collect()
    }

    #[test]
    fn place_and_lookup() {
        let now = Instant::now();
        let mut state = rooted();
        let servers = birth(&mut state, 3, 10, now);
        state.create_file("/f").unwrap();
        let location = state
            .allocate_chunk("/f", 0, CHUNK, &DefaultPlacementPolicy::new())
            .unwrap();
        assert_eq!(location.servers.len(), 3);
        for &server_id in &servers {
            let endpoint = state.endpoint(server_id).unwrap().to_owned();
            state
                .beat_heart(server_id, &endpoint, 9, &[location.chunk_id], now)
                .unwrap();
        }
        let chunks = state.lookup_chunks("/f").unwrap();
        assert_eq!(chunks, vec![location.clone()]);
        assert_eq!(state.chunks[&location.chunk_id].confirmed.len(), 3);
        assert!(state.check_invariants().is_ok());
    }

    #[test]
    fn allocate_checks_offsets() {
        let now = Instant::now();
        let mut state = rooted();
        birth(&mut state, 3, 10, now);
        state.create_file("/f").unwrap();
        let policy = DefaultPlacementPolicy::new();
        assert!(matches!(
            state.allocate_chunk("/f", 3, CHUNK, &policy),
            Err(FsError::BadOffset(_))
        ));
        assert!(matches!(
            state.allocate_chunk("/f", CHUNK, CHUNK, &policy),
            Err(FsError::BadOffset(_))
        ));
        let first = state.allocate_chunk("/f", 0, CHUNK, &policy).unwrap();
        let second = state.allocate_chunk("/f", CHUNK, CHUNK, &policy).unwrap();
        assert_eq!(second.chunk_id, first.chunk_id + 1);
        // retrying an index hands back the same chunk
        assert_eq!(state.allocate_chunk("/f", 0, CHUNK, &policy).unwrap(), first);
        assert_eq!(state.namespace.get_file("/f").unwrap().chunks.len(), 2);
        assert!(matches!(
            state.allocate_chunk("/nope", 0, CHUNK, &policy),
            Err(FsError::NotFound(_))
        ));
    }

    #[test]
    fn allocate_without_servers_has_no_capacity() {
        let mut state = rooted();
        state.create_file("/f").unwrap();
        assert!(matches!(
            state.allocate_chunk("/f", 0, CHUNK, &DefaultPlacementPolicy::new()),
            Err(FsError::NoCapacity(_))
        ));
        assert!(state.namespace.get_file("/f").unwrap().chunks.is_empty());
    }

    #[test]
    fn short_placement_is_queued_for_repair() {
        let now = Instant::now();
        let mut state = rooted();
        birth(&mut state, 2, 10, now);
        state.create_file("/f").unwrap();
        let location = state
            .allocate_chunk("/f", 0, CHUNK, &DefaultPlacementPolicy::new())
            .unwrap();
        assert_eq!(location.servers.len(), 2);
        assert!(state.repair_queue.contains(&location.chunk_id));
    }

    #[test]
    fn server_out_of_capacity_is_not_placed_on() {
        let now = Instant::now();
        let mut state = rooted();
        let servers = birth(&mut state, 4, 10, now);
        let tight = servers[3];
        let endpoint = state.endpoint(tight).unwrap().to_owned();
        let policy = DefaultPlacementPolicy::new();
        state.create_file("/f").unwrap();
        for (index, capacity) in [12, 1, 0].into_iter().enumerate() {
            state.beat_heart(tight, &endpoint, capacity, &[], now).unwrap();
            let location = state
                .allocate_chunk("/f", index as u64 * CHUNK, CHUNK, &policy)
                .unwrap();
            let placed: Vec<ServerId> = state.chunks[&location.chunk_id].replicas.clone();
            assert_eq!(placed.contains(&tight), capacity > 1, "capacity {capacity}");
        }
    }

    #[test]
    fn heartbeat_from_unknown_or_dead_server_is_rejected() {
        let now = Instant::now();
        let mut state = rooted();
        assert!(matches!(
            state.beat_heart(42, "x:1", 1, &[], now),
            Err(FsError::Rejected(_))
        ));
        let server_id = state.birth_server("x:1", 1, now);
        state.on_server_dead(server_id, now);
        assert!(matches!(
            state.beat_heart(server_id, "x:1", 1, &[], now),
            Err(FsError::Rejected(_))
        ));
    }

    #[test]
    fn duplicate_admission_is_recorded_once() {
        let now = Instant::now();
        let mut state = rooted();
        let servers = birth(&mut state, 3, 10, now);
        state.create_file("/f").unwrap();
        let chunk_id = state
            .allocate_chunk("/f", 0, CHUNK, &DefaultPlacementPolicy::new())
            .unwrap()
            .chunk_id;
        let server_id = servers[0];
        let endpoint = state.endpoint(server_id).unwrap().to_owned();
        state.beat_heart(server_id, &endpoint, 9, &[chunk_id], now).unwrap();
        let replicas = state.chunks[&chunk_id].replicas.clone();
        state.beat_heart(server_id, &endpoint, 9, &[chunk_id], now).unwrap();
        assert_eq!(state.chunks[&chunk_id].replicas, replicas);
        assert_eq!(
            state.chunks[&chunk_id]
                .replicas
                .iter()
                .filter(|&&replica| replica == server_id)
                .count(),
            1
        );
    }

    #[test]
    fn unknown_admissions_raise_the_allocator() {
        let now = Instant::now();
        let mut state = rooted();
        let server_id = state.birth_server("x:1", 10, now);
        state.beat_heart(server_id, "x:1", 10, &[41], now).unwrap();
        assert_eq!(state.next_chunk_id(), 42);
        state.beat_heart(server_id, "x:1", 10, &[7], now).unwrap();
        assert_eq!(state.next_chunk_id(), 42);
    }

    #[test]
    fn liveness_moves_through_suspect_to_dead() {
        let start = Instant::now();
        let wait = Duration::from_secs(2);
        let mut state = rooted();
        let servers = birth(&mut state, 3, 10, start);
        state.create_file("/f").unwrap();
        let chunk_id = state
            .allocate_chunk("/f", 0, CHUNK, &DefaultPlacementPolicy::new())
            .unwrap()
            .chunk_id;
        let later = start + Duration::from_secs(3);
        for &server_id in &servers[..2] {
            let endpoint = state.endpoint(server_id).unwrap().to_owned();
            state.beat_heart(server_id, &endpoint, 9, &[], later).unwrap();
        }
        assert!(state.update_liveness(later, wait, 3).is_empty());
        assert_eq!(state.servers[&servers[2]].liveness, Liveness::Suspect);

        let much_later = start + Duration::from_secs(7);
        for &server_id in &servers[..2] {
            let endpoint = state.endpoint(server_id).unwrap().to_owned();
            state.beat_heart(server_id, &endpoint, 9, &[], much_later).unwrap();
        }
        assert_eq!(state.update_liveness(much_later, wait, 3), vec![servers[2]]);
        assert_eq!(state.servers[&servers[2]].liveness, Liveness::Dead);
        assert!(!state.chunks[&chunk_id].replicas.contains(&servers[2]));
        assert_eq!(state.collect_repairs(), vec![chunk_id]);
        assert!(state.check_invariants().is_ok());

        let reaped = state.reap_dead_servers(
            much_later + Duration::from_secs(60),
            Duration::from_secs(30),
        );
        assert_eq!(reaped, 1);
        assert!(!state.servers.contains_key(&servers[2]));
    }

    #[test]
    fn rebirth_on_same_endpoint_retires_old_record() {
        let now = Instant::now();
        let mut state = rooted();
        let old = state.birth_server("x:1", 10, now);
        let new = state.birth_server("x:1", 10, now);
        assert_ne!(old, new);
        assert_eq!(state.servers[&old].liveness, Liveness::Dead);
        assert_eq!(state.servers[&new].liveness, Liveness::Alive);
    }

    #[test]
    fn delete_orphans_chunks_until_sweep() {
        let now = Instant::now();
        let mut state = rooted();
        birth(&mut state, 3, 10, now);
        state.create_file("/f").unwrap();
        let chunk_id = state
            .allocate_chunk("/f", 0, CHUNK, &DefaultPlacementPolicy::new())
            .unwrap()
            .chunk_id;
        let inode = state.delete_file("/f", now).unwrap();
        assert_eq!(inode.chunks, vec![chunk_id]);
        assert!(state.chunks[&chunk_id].is_orphaned());
        let grace = Duration::from_secs(10);
        assert_eq!(state.sweep_orphans(now + Duration::from_secs(5), grace), 0);
        assert_eq!(state.sweep_orphans(now + Duration::from_secs(11), grace), 1);
        assert!(state.chunks.is_empty());
        // ids are not reused after the sweep
        state.create_file("/g").unwrap();
        let next = state
            .allocate_chunk("/g", 0, CHUNK, &DefaultPlacementPolicy::new())
            .unwrap()
            .chunk_id;
        assert!(next > chunk_id);
    }

    #[test]
    fn invariant_checker_reports_dangling_chunks() {
        let mut state = rooted();
        state.create_file("/f").unwrap();
        state.namespace.get_file_mut("/f").unwrap().chunks.push(99);
        assert!(state.check_invariants().is_err());
    }
}
