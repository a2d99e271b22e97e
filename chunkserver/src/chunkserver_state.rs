use storage::ChunkId;

/// Identity and accounting of this chunk server. Guarded by the heartbeat lock
/// (`Arc<Mutex<ChunkserverState>>`).
#[derive(Debug)]
pub struct ChunkserverState {
    /// assigned by the master at birth, `None` until then and after a rejection
    pub server_id: Option<u64>,
    pub endpoint: String,
    /// remaining capacity in chunks, one less per admitted chunk
    pub capacity: u64,
    /// chunks admitted since the last acknowledged heartbeat
    pub admitted: Vec<ChunkId>,
    /// taken off the reported capacity while memory is tight
    pub pressure_penalty: u64,
}

impl ChunkserverState {
    pub fn new(endpoint: &str, capacity: u64) -> Self {
        Self {
            server_id: None,
            endpoint: endpoint.to_owned(),
            capacity,
            admitted: vec![],
            pressure_penalty: 0,
        }
    }

    pub fn reported_capacity(&self) -> u64 {
        self.capacity.saturating_sub(self.pressure_penalty)
    }

    pub fn on_admitted(&mut self, chunk_id: ChunkId) {
        self.admitted.push(chunk_id);
        self.capacity = self.capacity.saturating_sub(1);
    }

    /// Each sample under pressure takes one more chunk off the reported capacity, a sample
    /// without pressure gives it all back.
    pub fn apply_memory_pressure(&mut self, under_pressure: bool) {
        if under_pressure {
            self.pressure_penalty = (self.pressure_penalty + 1).min(self.capacity);
        } else {
            self.pressure_penalty = 0;
        }
    }

    /// Drops the first `sent` admissions, the ones the master just acknowledged.
    pub fn ack_sent(&mut self, sent: usize) {
        let sent = sent.min(self.admitted.len());
        self.admitted.drain(..sent);
    }

    /// Forgets the master's registration and queues every stored chunk for the next birth.
    pub fn reset_registration(&mut self, stored: Vec<ChunkId>) {
        self.server_id = None;
        self.admitted = stored;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn admissions_reduce_capacity() {
        let mut state = ChunkserverState::new("127.0.0.1:1337", 2);
        state.on_admitted(1);
        state.on_admitted(2);
        state.on_admitted(3);
        assert_eq!(state.capacity, 0);
        assert_eq!(state.admitted, vec![1, 2, 3]);
    }

    #[test]
    fn pressure_declines_and_recovers() {
        let mut state = ChunkserverState::new("127.0.0.1:1337", 3);
        state.apply_memory_pressure(true);
        assert_eq!(state.reported_capacity(), 2);
        state.apply_memory_pressure(true);
        state.apply_memory_pressure(true);
        state.apply_memory_pressure(true);
        assert_eq!(state.reported_capacity(), 0);
        state.apply_memory_pressure(false);
        assert_eq!(state.reported_capacity(), 3);
        assert_eq!(state.capacity, 3);
    }

    #[test]
    fn ack_keeps_later_admissions() {
        let mut state = ChunkserverState::new("127.0.0.1:1337", 10);
        state.on_admitted(1);
        state.on_admitted(2);
        let sent = state.admitted.len();
        // admitted while the heartbeat was in flight
        state.on_admitted(3);
        state.ack_sent(sent);
        assert_eq!(state.admitted, vec![3]);
        state.ack_sent(5);
        assert!(state.admitted.is_empty());
    }
}
