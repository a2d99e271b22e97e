use std::time::Duration;

use figment::{
    Figment,
    providers::{self, Format, Serialized},
};
use once_cell::sync::Lazy;
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize, Serialize)]
pub struct Config {
    pub client_id: String,
    pub master_addrs: String,
    pub rpc_timeout_ms: u64,
    /// attempts for one chunk write before the put fails
    pub write_retries: u8,
    pub write_backoff_ms: u64,
    pub log_level: String,
    pub log_base: String,
    pub apm_endpoint: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            client_id: "sfs".to_string(),
            master_addrs: "127.0.0.1:1338".to_string(),
            rpc_timeout_ms: 10_000,
            write_retries: 3,
            write_backoff_ms: 100,
            log_level: "warn".to_string(),
            log_base: "./temp/logs".to_string(),
            apm_endpoint: None,
        }
    }
}

impl Config {
    pub fn rpc_timeout(&self) -> Duration {
        Duration::from_millis(self.rpc_timeout_ms)
    }
    pub fn write_backoff(&self) -> Duration {
        Duration::from_millis(self.write_backoff_ms)
    }
}

pub static CONFIG: Lazy<Config> = Lazy::new(|| {
    let env = std::env::var("ENV").unwrap_or_else(|_| "default".to_owned());
    // giving default path to root of binary
    let config_file_path =
        std::env::var("CONFIG_PATH").unwrap_or_else(|_| format!("./client/config/{}.yaml", env));
    Figment::new()
        .merge(Serialized::defaults(Config::default()))
        .merge(providers::Yaml::file(config_file_path))
        .extract()
        .unwrap_or_else(|e| panic!("invalid client configuration: {e}"))
});
