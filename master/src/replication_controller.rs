use std::{
    collections::HashMap,
    sync::Arc,
    time::{Duration, Instant},
};

use futures::future::join_all;
use tokio::{
    sync::{Mutex, Notify, watch},
    task::JoinHandle,
    time::interval,
};
use utilities::logger::{Instrument, Level, error, info, span, trace};

use crate::{
    chunkserver::service::ChunkserverService,
    master_state::{ChunkId, MasterState},
    placement::placement_policy::PlacementPolicy,
};

#[derive(Debug, Clone, PartialEq)]
pub struct RepairOrder {
    pub chunk_id: ChunkId,
    pub source: String,
    pub target: String,
}

/// Tops up under-replicated chunks by asking a live replica to copy the chunk to a new
/// server. At most `repairs_per_tick` orders go out per `interval`.
pub struct ReplicationController {
    state: Arc<Mutex<MasterState>>,
    placement_policy: Box<dyn PlacementPolicy>,
    chunkserver_service: Arc<dyn ChunkserverService>,
    repair_signal: Arc<Notify>,
    interval: Duration,
    repairs_per_tick: usize,
    /// an order not confirmed by a heartbeat within this window is issued again
    pending_ttl: Duration,
    pending: HashMap<ChunkId, Instant>,
}

impl ReplicationController {
    pub fn new(
        state: Arc<Mutex<MasterState>>,
        placement_policy: Box<dyn PlacementPolicy>,
        chunkserver_service: Arc<dyn ChunkserverService>,
        repair_signal: Arc<Notify>,
        interval: Duration,
        repairs_per_tick: usize,
        pending_ttl: Duration,
    ) -> Self {
        Self {
            state,
            placement_policy,
            chunkserver_service,
            repair_signal,
            interval,
            repairs_per_tick,
            pending_ttl,
            pending: HashMap::default(),
        }
    }

    /// Picks this round's repairs under the master lock.
    pub async fn plan_round(&mut self, now: Instant) -> Vec<RepairOrder> {
        let mut state = self.state.lock().await;
        let candidates = state.collect_repairs();
        let pending_ttl = self.pending_ttl;
        self.pending.retain(|chunk_id, issued_at| {
            candidates.contains(chunk_id) && now.saturating_duration_since(*issued_at) < pending_ttl
        });

        let mut orders = Vec::new();
        for chunk_id in candidates {
            if orders.len() >= self.repairs_per_tick {
                break;
            }
            if self.pending.contains_key(&chunk_id) {
                continue;
            }
            let Some(record) = state.chunks.get(&chunk_id) else {
                continue;
            };
            let Some((source, target)) = self.placement_policy.select_repair(&state.servers, record)
            else {
                trace!(%chunk_id, "no source or target for repair yet");
                continue;
            };
            let (Some(source), Some(target)) = (state.endpoint(source), state.endpoint(target))
            else {
                continue;
            };
            orders.push(RepairOrder {
                chunk_id,
                source: source.to_owned(),
                target: target.to_owned(),
            });
        }
        // leave chunks that were not reached this round for the next one
        for order in &orders {
            state.repair_queue.remove(&order.chunk_id);
            self.pending.insert(order.chunk_id, now);
        }
        orders
    }

    /// Plans and issues one round of repairs, returning how many were accepted by their source.
    pub async fn run_repair_round(&mut self, now: Instant) -> usize {
        let orders = self.plan_round(now).await;
        if orders.is_empty() {
            return 0;
        }
        info!(orders = orders.len(), "issuing repairs");
        let service = self.chunkserver_service.clone();
        let results = join_all(orders.iter().map(|order| {
            service.replicate_chunk(&order.source, order.chunk_id, vec![order.target.clone()])
        }))
        .await;
        let mut accepted = 0;
        for (order, result) in orders.iter().zip(results) {
            match result {
                Ok(()) => accepted += 1,
                Err(e) => {
                    error!(chunk_id = %order.chunk_id, source = %order.source, error = %e, "repair failed");
                    self.pending.remove(&order.chunk_id);
                }
            }
        }
        accepted
    }

    pub fn start(mut self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.interval);
            let repair_signal = self.repair_signal.clone();
            let mut last_round: Option<tokio::time::Instant> = None;
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = repair_signal.notified() => {}
                    _ = shutdown.changed() => {
                        info!("replication controller stopping");
                        return;
                    }
                }
                // wakeups from the signal still respect the per-interval budget
                if let Some(last) = last_round {
                    tokio::select! {
                        _ = tokio::time::sleep_until(last + self.interval) => {}
                        _ = shutdown.changed() => {
                            info!("replication controller stopping");
                            return;
                        }
                    }
                }
                last_round = Some(tokio::time::Instant::now());
                let span = span!(Level::INFO, "master_repair_round");
                self.run_repair_round(Instant::now()).instrument(span).await;
            }
        })
    }
}
