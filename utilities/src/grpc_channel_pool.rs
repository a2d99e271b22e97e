use std::{collections::HashMap, sync::Arc, time::Duration};

use tokio::sync::Mutex;
use tonic::transport::{Channel, Endpoint};
use tracing::trace;

use crate::error::FsError;

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// Caches one channel per peer address. Channels reconnect on their own once created, so a
/// dropped peer only costs the first failed call.
#[derive(Clone, Debug, Default)]
pub struct GrpcChannelPool {
    store: Arc<Mutex<HashMap<String, Channel>>>,
}

/// Endpoints travel as `ip:port`, tonic wants a URI.
pub fn to_uri(addrs: &str) -> String {
    if addrs.starts_with("http://") || addrs.starts_with("https://") {
        addrs.to_owned()
    } else {
        format!("http://{addrs}")
    }
}

impl GrpcChannelPool {
    pub fn new() -> Self {
        Self::default()
    }
    pub async fn get_channel(&self, addrs: &str) -> Result<Channel, FsError> {
        if let Some(chnl) = self.store.lock().await.get(addrs) {
            trace!("Channel already present");
            return Ok(chnl.clone());
        }
        trace!("Creating endpoint for channel since channel is not present already");
        let endpoint = Endpoint::from_shared(to_uri(addrs))
            .map_err(|e| FsError::BadPath(format!("Invalid endpoint {addrs} : {e}")))?
            .connect_timeout(CONNECT_TIMEOUT);
        let chnl = endpoint
            .connect()
            .await
            .map_err(|e| FsError::Unreachable(format!("Error while connecting to {addrs} : {e}")))?;
        self.store
            .lock()
            .await
            .insert(addrs.to_owned(), chnl.clone());
        Ok(chnl)
    }
    /// Forgets a cached channel, the next call dials again.
    pub async fn evict(&self, addrs: &str) {
        self.store.lock().await.remove(addrs);
    }
}

pub static GRPC_CHANNEL_POOL: once_cell::sync::Lazy<GrpcChannelPool> =
    once_cell::sync::Lazy::new(GrpcChannelPool::new);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoints_become_uris() {
        assert_eq!(to_uri("127.0.0.1:1337"), "http://127.0.0.1:1337");
        assert_eq!(to_uri("http://10.0.0.1:1338"), "http://10.0.0.1:1338");
    }

    #[tokio::test]
    async fn dialing_a_closed_port_is_unreachable() {
        let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
        let addrs = listener.local_addr().unwrap().to_string();
        drop(listener);
        let pool = GrpcChannelPool::new();
        let err = pool.get_channel(&addrs).await.unwrap_err();
        assert!(matches!(err, FsError::Unreachable(_)), "{err:?}");
    }
}
