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
    pub master_addrs: String,
    pub listen_port: u16,
    /// endpoint announced to the master and used by peers, `ip:port`
    pub external_addrs: String,
    /// declared capacity in chunks
    pub capacity: u64,
    pub heartbeat_wait_ms: u64,
    /// free/total memory below this counts as memory pressure
    pub memory_pressure_ratio: f64,
    pub rpc_timeout_ms: u64,
    pub dial_retries: u8,
    pub dial_backoff_ms: u64,
    pub log_level: String,
    pub log_base: String,
    pub apm_endpoint: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            id: "chunkserver".to_string(),
            master_addrs: "127.0.0.1:1338".to_string(),
            listen_port: 1337,
            external_addrs: "127.0.0.1:1337".to_string(),
            capacity: 64,
            heartbeat_wait_ms: 2000,
            memory_pressure_ratio: 0.2,
            rpc_timeout_ms: 10_000,
            dial_retries: 3,
            dial_backoff_ms: 100,
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
    pub fn dial_backoff(&self) -> Duration {
        Duration::from_millis(self.dial_backoff_ms)
    }
}

pub static CONFIG: Lazy<Config> = Lazy::new(|| {
    let env = std::env::var("ENV").unwrap_or_else(|_| "default".to_owned());
    let config_file_path = std::env::var("CONFIG_PATH")
        .unwrap_or_else(|_| format!("./chunkserver/config/{}.yaml", env));
    Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(Yaml::file(config_file_path))
        .extract()
        .unwrap_or_else(|e| panic!("invalid chunk server configuration: {e}"))
});
