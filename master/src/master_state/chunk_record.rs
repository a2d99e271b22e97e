use std::{collections::HashSet, time::Instant};

use super::{ChunkId, ServerId};

#[derive(Default, Debug, Clone, PartialEq)]
pub enum ChunkState {
    /// placed, no replica has reported it yet
    #[default]
    Allocated,
    Committed,
    /// no inode references it any more, removed by the sweep once the grace window passes
    Orphaned(Instant),
}

#[derive(Debug, Clone, PartialEq)]
pub enum ReplicationStatus {
    Balanced,
    Underreplicated(usize),
    Lost,
}

#[derive(Debug, Clone)]
pub struct ChunkRecord {
    pub id: ChunkId,
    /// ordered replica set, the head is the write entry point
    pub replicas: Vec<ServerId>,
    /// replicas that reported the chunk in a heartbeat
    pub confirmed: HashSet<ServerId>,
    pub target: usize,
    pub state: ChunkState,
}

impl ChunkRecord {
    pub fn new(id: ChunkId, replicas: Vec<ServerId>, target: usize) -> Self {
        Self {
            id,
            replicas,
            confirmed: HashSet::default(),
            target,
            state: ChunkState::Allocated,
        }
    }

    pub fn primary(&self) -> Option<ServerId> {
        self.replicas.first().copied()
    }

    /// Records that `server_id` holds the chunk. Returns true if the replica set grew.
    /// A server outside a full replica set is not added.
    pub fn admit(&mut self, server_id: ServerId) -> bool {
        if self.is_orphaned() {
            return false;
        }
        let grew = if self.replicas.contains(&server_id) {
            false
        } else if self.replicas.len() < self.target {
            self.replicas.push(server_id);
            true
        } else {
            return false;
        };
        self.confirmed.insert(server_id);
        self.state = ChunkState::Committed;
        grew
    }

    pub fn remove_replica(&mut self, server_id: ServerId) -> bool {
        self.confirmed.remove(&server_id);
        let before = self.replicas.len();
        self.replicas.retain(|&replica| replica != server_id);
        before != self.replicas.len()
    }

    pub fn mark_orphaned(&mut self, now: Instant) {
        self.state = ChunkState::Orphaned(now);
    }

    pub fn is_orphaned(&self) -> bool {
        matches!(self.state, ChunkState::Orphaned(_))
    }

    pub fn replication_status(&self) -> ReplicationStatus {
        if self.replicas.is_empty() {
            ReplicationStatus::Lost
        } else if self.replicas.len() < self.target {
            ReplicationStatus::Underreplicated(self.target - self.replicas.len())
        } else {
            ReplicationStatus::Balanced
        }
    }

    pub fn needs_repair(&self) -> bool {
        !self.is_orphaned()
            && matches!(
                self.replication_status(),
                ReplicationStatus::Underreplicated(_)
            )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admission_is_idempotent() {
        let mut record = ChunkRecord::new(1, vec![10, 11], 3);
        assert!(!record.admit(10));
        assert!(!record.admit(10));
        assert_eq!(record.replicas, vec![10, 11]);
        assert_eq!(record.state, ChunkState::Committed);
        assert!(record.admit(12));
        assert!(!record.admit(12));
        assert_eq!(record.replicas, vec![10, 11, 12]);
        // full set, extra copies are not tracked
        assert!(!record.admit(13));
        assert_eq!(record.replicas.len(), 3);
        assert!(!record.confirmed.contains(&13));
    }

    #[test]
    fn primary_is_the_head_of_the_replica_set() {
        let mut record = ChunkRecord::new(1, vec![4, 2, 9], 3);
        assert_eq!(record.primary(), Some(4));
        record.remove_replica(4);
        assert_eq!(record.primary(), Some(2));
        record.remove_replica(2);
        record.remove_replica(9);
        assert_eq!(record.primary(), None);
    }

    #[test]
    fn replication_status_follows_replica_count() {
        let mut record = ChunkRecord::new(1, vec![1, 2, 3], 3);
        assert_eq!(record.replication_status(), ReplicationStatus::Balanced);
        assert!(record.remove_replica(3));
        assert!(!record.remove_replica(3));
        assert_eq!(
            record.replication_status(),
            ReplicationStatus::Underreplicated(1)
        );
        assert!(record.needs_repair());
        record.mark_orphaned(Instant::now());
        assert!(!record.needs_repair());
        record.remove_replica(1);
        record.remove_replica(2);
        assert_eq!(record.replication_status(), ReplicationStatus::Lost);
    }
}
