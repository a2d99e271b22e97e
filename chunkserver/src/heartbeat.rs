use std::{sync::Arc, time::Duration};

use storage::{memory_storage::MemoryStorage, storage::Storage};
use sysinfo::System;
use tokio::{
    sync::{Mutex, watch},
    task::JoinHandle,
    time::interval,
};
use utilities::{
    error::FsError,
    logger::{Instrument, Level, debug, error, info, span, warn},
};

use crate::{chunkserver_state::ChunkserverState, master::service::MasterService};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MemorySample {
    pub available: u64,
    pub total: u64,
}

impl MemorySample {
    pub fn under_pressure(&self, ratio: f64) -> bool {
        self.total > 0 && (self.available as f64) / (self.total as f64) < ratio
    }
}

pub trait MemoryProbe: Send + Sync {
    fn sample(&mut self) -> MemorySample;
}

/// Host memory as seen by `sysinfo`.
pub struct SystemMemoryProbe {
    system: System,
}

impl SystemMemoryProbe {
    pub fn new() -> Self {
        Self {
            system: System::new(),
        }
    }
}

impl MemoryProbe for SystemMemoryProbe {
    fn sample(&mut self) -> MemorySample {
        self.system.refresh_memory();
        MemorySample {
            available: self.system.available_memory(),
            total: self.system.total_memory(),
        }
    }
}

/// Pushes liveness, capacity and newly admitted chunks to the master once per interval.
pub struct Heartbeat {
    state: Arc<Mutex<ChunkserverState>>,
    store: MemoryStorage,
    master_service: Arc<dyn MasterService>,
    probe: Box<dyn MemoryProbe>,
    pressure_ratio: f64,
    interval: Duration,
}

impl Heartbeat {
    pub fn new(
        state: Arc<Mutex<ChunkserverState>>,
        store: MemoryStorage,
        master_service: Arc<dyn MasterService>,
        probe: Box<dyn MemoryProbe>,
        pressure_ratio: f64,
        interval: Duration,
    ) -> Self {
        Self {
            state,
            store,
            master_service,
            probe,
            pressure_ratio,
            interval,
        }
    }

    /// One beat. A rejection means the master no longer knows this server, so it is born
    /// again and reports every stored chunk.
    pub async fn beat_once(&mut self) -> Result<(), FsError> {
        let sample = self.probe.sample();
        let under_pressure = sample.under_pressure(self.pressure_ratio);
        {
            let mut state = self.state.lock().await;
            state.apply_memory_pressure(under_pressure);
            if under_pressure {
                warn!(
                    available = sample.available,
                    total = sample.total,
                    reported_capacity = state.reported_capacity(),
                    "memory pressure, lowering reported capacity"
                );
            }
        }
        match self.report().await {
            Err(FsError::Rejected(msg)) => {
                warn!(%msg, "heartbeat rejected, registering again");
                {
                    // listing under the state lock, a chunk admitted meanwhile is either
                    // listed or pushed after the reset
                    let mut state = self.state.lock().await;
                    let stored = self.store.available_chunks().await;
                    state.reset_registration(stored);
                }
                self.report().await
            }
            other => other,
        }
    }

    async fn report(&self) -> Result<(), FsError> {
        let (server_id, endpoint, capacity, added) = {
            let state = self.state.lock().await;
            (
                state.server_id,
                state.endpoint.clone(),
                state.reported_capacity(),
                state.admitted.clone(),
            )
        };
        let server_id = match server_id {
            Some(id) => id,
            None => {
                let id = self.master_service.birth_chunk(&endpoint, capacity).await?;
                self.state.lock().await.server_id = Some(id);
                id
            }
        };
        let sent = added.len();
        self.master_service
            .beat_heart(server_id, &endpoint, capacity, added)
            .await?;
        self.state.lock().await.ack_sent(sent);
        let used_bytes = self.store.used_bytes().await;
        debug!(%server_id, %capacity, %sent, %used_bytes, "heartbeat acknowledged");
        Ok(())
    }

    pub fn start(mut self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = shutdown.changed() => {
                        info!("heartbeat stopping");
                        return;
                    }
                }
                let span = span!(Level::INFO, "chunkserver_heartbeat");
                match self.beat_once().instrument(span).await {
                    Ok(()) => {}
                    Err(FsError::Unreachable(msg)) | Err(FsError::Timeout(msg)) => {
                        warn!(%msg, "master not answering, admissions kept for the next beat")
                    }
                    Err(e) => error!(error = %e, "Error while sending heartbeat"),
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use std::sync::Mutex as StdMutex;

    use async_trait::async_trait;
    use storage::ChunkId;

    use super::*;

    #[derive(Debug, Clone, PartialEq)]
    struct Beat {
        server_id: u64,
        capacity: u64,
        added: Vec<ChunkId>,
    }

    /// Hands out ids from 1, records every beat, and answers with a queued error if any.
    #[derive(Default)]
    struct FakeMaster {
        births: StdMutex<Vec<u64>>,
        beats: StdMutex<Vec<Beat>>,
        failures: StdMutex<Vec<FsError>>,
    }

    impl FakeMaster {
        fn fail_next(&self, e: FsError) {
            self.failures.lock().unwrap().push(e);
        }
        fn beats(&self) -> Vec<Beat> {
            self.beats.lock().unwrap().clone()
        }
    }

    #[async_trait]
    impl MasterService for FakeMaster {
        async fn birth_chunk(&self, _endpoint: &str, capacity: u64) -> Result<u64, FsError> {
            let mut births = self.births.lock().unwrap();
            births.push(capacity);
            Ok(births.len() as u64)
        }
        async fn beat_heart(
            &self,
            server_id: u64,
            _endpoint: &str,
            capacity: u64,
            added_chunks: Vec<ChunkId>,
        ) -> Result<(), FsError> {
            if let Some(e) = self.failures.lock().unwrap().pop() {
                return Err(e);
            }
            self.beats.lock().unwrap().push(Beat {
                server_id,
                capacity,
                added: added_chunks,
            });
            Ok(())
        }
    }

    struct FixedProbe(MemorySample);

    impl MemoryProbe for FixedProbe {
        fn sample(&mut self) -> MemorySample {
            self.0
        }
    }

    fn heartbeat(
        master: Arc<FakeMaster>,
        store: MemoryStorage,
        available_percent: u64,
    ) -> (Heartbeat, Arc<Mutex<ChunkserverState>>) {
        let state = Arc::new(Mutex::new(ChunkserverState::new("127.0.0.1:1337", 10)));
        let heartbeat = Heartbeat::new(
            state.clone(),
            store,
            master,
            Box::new(FixedProbe(MemorySample {
                available: available_percent,
                total: 100,
            })),
            0.2,
            Duration::from_millis(10),
        );
        (heartbeat, state)
    }

    #[tokio::test]
    async fn acknowledged_beat_clears_admissions() {
        let master = Arc::new(FakeMaster::default());
        let (mut heartbeat, state) = heartbeat(master.clone(), MemoryStorage::new(), 80);
        state.lock().await.on_admitted(4);
        state.lock().await.on_admitted(5);

        heartbeat.beat_once().await.unwrap();
        heartbeat.beat_once().await.unwrap();
        assert_eq!(*master.births.lock().unwrap(), vec![8]);
        assert_eq!(
            master.beats(),
            vec![
                Beat {
                    server_id: 1,
                    capacity: 8,
                    added: vec![4, 5]
                },
                Beat {
                    server_id: 1,
                    capacity: 8,
                    added: vec![]
                },
            ]
        );
        assert!(state.lock().await.admitted.is_empty());
    }

    #[tokio::test]
    async fn unreachable_master_keeps_admissions() {
        let master = Arc::new(FakeMaster::default());
        let (mut heartbeat, state) = heartbeat(master.clone(), MemoryStorage::new(), 80);
        state.lock().await.on_admitted(4);
        master.fail_next(FsError::Unreachable("down".to_owned()));

        assert!(matches!(
            heartbeat.beat_once().await,
            Err(FsError::Unreachable(_))
        ));
        assert_eq!(state.lock().await.admitted, vec![4]);
        heartbeat.beat_once().await.unwrap();
        assert_eq!(master.beats()[0].added, vec![4]);
    }

    #[tokio::test]
    async fn rejected_server_is_born_again_with_all_chunks() {
        let master = Arc::new(FakeMaster::default());
        let store = MemoryStorage::new();
        let (mut heartbeat, state) = heartbeat(master.clone(), store.clone(), 80);
        for chunk_id in [1, 2] {
            store.write(chunk_id, vec![chunk_id as u8]).await.unwrap();
            state.lock().await.on_admitted(chunk_id);
        }
        heartbeat.beat_once().await.unwrap();

        // the master declared this server dead
        master.fail_next(FsError::Rejected("server 1 is dead".to_owned()));
        heartbeat.beat_once().await.unwrap();
        assert_eq!(master.births.lock().unwrap().len(), 2);
        assert_eq!(
            master.beats().last(),
            Some(&Beat {
                server_id: 2,
                capacity: 8,
                added: vec![1, 2]
            })
        );
        assert_eq!(state.lock().await.server_id, Some(2));
    }

    #[tokio::test]
    async fn low_memory_lowers_reported_capacity() {
        let master = Arc::new(FakeMaster::default());
        let (mut heartbeat, _state) = heartbeat(master.clone(), MemoryStorage::new(), 10);
        for _ in 0..3 {
            heartbeat.beat_once().await.unwrap();
        }
        // birth already saw the first decrement
        assert_eq!(*master.births.lock().unwrap(), vec![9]);
        let reported: Vec<u64> = master.beats().iter().map(|beat| beat.capacity).collect();
        assert_eq!(reported, vec![9, 8, 7]);
    }

    #[tokio::test]
    async fn loop_stops_on_shutdown() {
        let master = Arc::new(FakeMaster::default());
        let (heartbeat, _state) = heartbeat(master.clone(), MemoryStorage::new(), 80);
        let (sender, shutdown) = watch::channel(false);
        let handle = heartbeat.start(shutdown);
        tokio::time::sleep(Duration::from_millis(35)).await;
        sender.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
        assert!(!master.beats().is_empty());
    }

    #[test]
    fn pressure_threshold() {
        let sample = MemorySample {
            available: 19,
            total: 100,
        };
        assert!(sample.under_pressure(0.2));
        assert!(!MemorySample { available: 20, total: 100 }.under_pressure(0.2));
        assert!(!MemorySample { available: 0, total: 0 }.under_pressure(0.2));
    }
}
