use std::time::Duration;

use figment::{
    Figment,
    providers::{Format, Serialized, Yaml},
};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub id: String,
    pub listen_port: u16,
    pub chunk_size: u64,
    pub replication_factor: usize,
    pub heartbeat_wait_ms: u64,
    /// K, missed heartbeats before a server is declared dead
    pub dead_after_missed_beats: u32,
    pub dead_server_grace_secs: u64,
    pub orphan_grace_secs: u64,
    pub maintenance_interval_ms: u64,
    pub repair_interval_ms: u64,
    /// M, repairs issued per controller round at most
    pub repairs_per_tick: usize,
    pub rpc_timeout_ms: u64,
    pub bootstrap_root: bool,
    pub state_log_file: Option<String>,
    pub log_level: String,
    pub log_base: String,
    pub apm_endpoint: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            id: "master".to_string(),
            listen_port: 1338,
            chunk_size: 64 * 1024 * 1024,
            replication_factor: 3,
            heartbeat_wait_ms: 2000,
            dead_after_missed_beats: 3,
            dead_server_grace_secs: 300,
            orphan_grace_secs: 60,
            maintenance_interval_ms: 1000,
            repair_interval_ms: 1000,
            repairs_per_tick: 8,
            rpc_timeout_ms: 10_000,
            bootstrap_root: true,
            state_log_file: Some("./temp/master/state.log".to_string()),
            log_level: "info".to_string(),
            log_base: "./temp/logs".to_string(),
            apm_endpoint: None,
        }
    }
}

impl Config {
    pub fn heartbeat_wait(&self) -> Duration {
        Duration::from_millis(self.heartbeat_wait_ms)
    }
    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }
}

pub static CONFIG: Lazy<Config> = Lazy::new(|| {
    let env = std::env::var("ENV").unwrap_or_else(|_| "default".to_owned());
    let config_file_path =
        std::env::var("CONFIG_PATH").unwrap_or_else(|_| format!("./master/config/{}.yaml", env));
    Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Yaml::file(config_file_path))
        .extract()
        .unwrap_or_else(|e| panic!("invalid master configuration: {e}"))
});
