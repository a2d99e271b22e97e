use std::time::{Duration, Instant};

use serde::Serialize;

use super::ServerId;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize)]
pub enum Liveness {
    Alive,
    Suspect,
    Dead,
}

#[derive(Debug, Clone)]
pub struct ServerRecord {
    pub id: ServerId,
    pub endpoint: String,
    /// remaining capacity in chunks as last reported by the server
    pub capacity: u64,
    pub last_heartbeat: Instant,
    pub liveness: Liveness,
    pub died_at: Option<Instant>,
}

impl ServerRecord {
    pub fn new(id: ServerId, endpoint: &str, capacity: u64, now: Instant) -> Self {
        Self {
            id,
            endpoint: endpoint.to_owned(),
            capacity,
            last_heartbeat: now,
            liveness: Liveness::Alive,
            died_at: None,
        }
    }

    pub fn mark_heartbeat(&mut self, endpoint: &str, capacity: u64, now: Instant) {
        if self.endpoint != endpoint {
            self.endpoint = endpoint.to_owned();
        }
        self.capacity = capacity;
        self.last_heartbeat = now;
        self.liveness = Liveness::Alive;
    }

    /// Whole heartbeat intervals missed at `now`. Half an interval of slack absorbs jitter so
    /// a server beating on schedule never looks late.
    pub fn missed_beats(&self, now: Instant, heartbeat_wait: Duration) -> u32 {
        if heartbeat_wait.is_zero() {
            return 0;
        }
        let elapsed = now.saturating_duration_since(self.last_heartbeat);
        let late = elapsed.saturating_sub(heartbeat_wait / 2);
        (late.as_nanos() / heartbeat_wait.as_nanos()).min(u32::MAX as u128) as u32
    }

    pub fn mark_dead(&mut self, now: Instant) {
        self.liveness = Liveness::Dead;
        self.died_at = Some(now);
    }

    pub fn is_live(&self) -> bool {
        matches!(self.liveness, Liveness::Alive | Liveness::Suspect)
    }

    pub fn can_store(&self) -> bool {
        self.liveness == Liveness::Alive && self.capacity >= 1
    }
}
