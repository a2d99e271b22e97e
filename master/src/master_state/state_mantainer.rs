use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use tokio::{
    sync::{Mutex, Notify, mpsc::Sender, watch},
    task::JoinHandle,
    time::interval,
};
use utilities::logger::{Instrument, Level, info, span, trace, warn};

use super::{MasterState, abort_on_violation, state_snapshot::MasterStateSnapshot};

#[derive(Debug, Clone, Copy)]
pub struct MaintenanceSettings {
    pub interval: Duration,
    pub heartbeat_wait: Duration,
    pub dead_after_missed_beats: u32,
    pub orphan_grace: Duration,
    pub dead_server_grace: Duration,
}

/// What one maintenance pass changed.
#[derive(Debug, Default, PartialEq)]
pub struct TickReport {
    pub died: Vec<u64>,
    pub orphans_swept: usize,
    pub servers_reaped: usize,
    pub pending_repairs: usize,
}

/// Keeps the master state in shape between RPCs: liveness from heartbeat age, orphan and
/// dead-server cleanup, the invariant check and the state log.
pub struct StateMantainer {
    state: Arc<Mutex<MasterState>>,
    settings: MaintenanceSettings,
    repair_signal: Arc<Notify>,
    snapshot_sender: Option<Sender<MasterStateSnapshot>>,
}

impl StateMantainer {
    pub fn new(
        state: Arc<Mutex<MasterState>>,
        settings: MaintenanceSettings,
        repair_signal: Arc<Notify>,
        snapshot_sender: Option<Sender<MasterStateSnapshot>>,
    ) -> Self {
        Self {
            state,
            settings,
            repair_signal,
            snapshot_sender,
        }
    }

    pub async fn run_once(&self, now: Instant) -> TickReport {
        let mut state = self.state.lock().await;
        let died = state.update_liveness(
            now,
            self.settings.heartbeat_wait,
            self.settings.dead_after_missed_beats,
        );
        let orphans_swept = state.sweep_orphans(now, self.settings.orphan_grace);
        let servers_reaped = state.reap_dead_servers(now, self.settings.dead_server_grace);
        let pending_repairs = state.collect_repairs().len();
        if let Err(violation) = state.check_invariants() {
            abort_on_violation(&violation);
        }
        let snapshot = self
            .snapshot_sender
            .as_ref()
            .map(|_| MasterStateSnapshot::from(&*state));
        drop(state);

        if let (Some(sender), Some(snapshot)) = (&self.snapshot_sender, snapshot) {
            if let Err(e) = sender.send(snapshot).await {
                warn!(error = %e, "state log is gone, snapshot dropped");
            }
        }
        if !died.is_empty() || pending_repairs > 0 {
            self.repair_signal.notify_one();
        }
        TickReport {
            died,
            orphans_swept,
            servers_reaped,
            pending_repairs,
        }
    }

    pub fn start(self, mut shutdown: watch::Receiver<bool>) -> JoinHandle<()> {
        tokio::spawn(async move {
            let mut ticker = interval(self.settings.interval);
            loop {
                tokio::select! {
                    _ = ticker.tick() => {}
                    _ = shutdown.changed() => {
                        info!("state mantainer stopping");
                        return;
                    }
                }
                let span = span!(Level::INFO, "master_state_sync");
                let report = self.run_once(Instant::now()).instrument(span).await;
                if report != TickReport::default() {
                    trace!(?report, "maintenance pass");
                }
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::placement::default_placement_policy::DefaultPlacementPolicy;

    fn settings() -> MaintenanceSettings {
        MaintenanceSettings {
            interval: Duration::from_millis(10),
            heartbeat_wait: Duration::from_secs(2),
            dead_after_missed_beats: 3,
            orphan_grace: Duration::from_secs(10),
            dead_server_grace: Duration::from_secs(60),
        }
    }

    #[tokio::test]
    async fn tick_declares_dead_and_signals_repair() {
        let start = Instant::now();
        let mut state = MasterState::new(3);
        state.namespace.add_dir("/").unwrap();
        for i in 0..3 {
            state.birth_server(&format!("10.0.0.{i}:1337"), 10, start);
        }
        state.create_file("/f").unwrap();
        state
            .allocate_chunk("/f", 0, 64, &DefaultPlacementPolicy::new())
            .unwrap();
        let state = Arc::new(Mutex::new(state));
        let signal = Arc::new(Notify::new());
        let mantainer = StateMantainer::new(state.clone(), settings(), signal.clone(), None);

        let quiet = mantainer.run_once(start).await;
        assert_eq!(quiet, TickReport::default());

        let report = mantainer.run_once(start + Duration::from_secs(8)).await;
        assert_eq!(report.died, vec![1, 2, 3]);
        // every replica is gone, there is no source to repair from
        assert_eq!(report.pending_repairs, 0);
        // the stored permit makes this return at once
        signal.notified().await;
    }

    #[tokio::test]
    async fn snapshots_reach_the_state_log() {
        let state = Arc::new(Mutex::new(MasterState::new(3)));
        let (sender, mut receiver) = tokio::sync::mpsc::channel(4);
        let mantainer =
            StateMantainer::new(state, settings(), Arc::new(Notify::new()), Some(sender));
        mantainer.run_once(Instant::now()).await;
        let snapshot = receiver.recv().await.unwrap();
        assert!(snapshot.servers.is_empty());
    }

    #[tokio::test]
    async fn stops_on_shutdown() {
        let state = Arc::new(Mutex::new(MasterState::new(3)));
        let (shutdown_sender, shutdown) = watch::channel(false);
        let handle =
            StateMantainer::new(state, settings(), Arc::new(Notify::new()), None).start(shutdown);
        shutdown_sender.send(true).unwrap();
        tokio::time::timeout(Duration::from_secs(1), handle)
            .await
            .unwrap()
            .unwrap();
    }
}
