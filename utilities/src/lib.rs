pub mod error;
pub mod grpc_channel_pool;
pub mod logger;
pub mod result;
pub mod retry_policy;
pub mod state_logger;
