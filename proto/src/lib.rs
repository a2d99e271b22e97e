pub mod generated {
    pub mod client_master {
        tonic::include_proto!("client_master");
    }
    pub mod chunkserver_master {
        tonic::include_proto!("chunkserver_master");
    }
    pub mod client_chunkserver {
        tonic::include_proto!("client_chunkserver");
    }
    pub mod master_chunkserver {
        tonic::include_proto!("master_chunkserver");
    }
}

/// Upper bound for a single gRPC message. A full chunk plus framing has to fit.
pub const MAX_MESSAGE_SIZE: usize = 80 * 1024 * 1024;
