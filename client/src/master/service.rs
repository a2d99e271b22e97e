use std::time::Duration;

use async_trait::async_trait;
use proto::{
    MAX_MESSAGE_SIZE,
    generated::client_master::{
        AllocateChunkRequest, ChunkLocation, ChunkSizeRequest, FileMeta, FileMetaResponse,
        MvRequest, PathRequest, WriteMetaRequest, client_master_client::ClientMasterClient,
    },
};
use tonic::transport::Channel;
use utilities::{
    error::{FsError, check_status},
    grpc_channel_pool::GRPC_CHANNEL_POOL,
    logger::{instrument, trace, tracing},
};

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Listing {
    pub dirs: Vec<String>,
    pub files: Vec<String>,
}

/// Namespace and chunk-location calls to the master.
#[async_trait]
pub trait MasterService: Send + Sync {
    async fn mkdir(&self, path: &str) -> Result<(), FsError>;
    async fn rmdir(&self, path: &str) -> Result<(), FsError>;
    async fn ls(&self, path: &str) -> Result<Listing, FsError>;
    async fn mv(&self, old_path: &str, new_path: &str) -> Result<(), FsError>;
    async fn create(&self, path: &str) -> Result<FileMeta, FsError>;
    async fn delete(&self, path: &str) -> Result<(), FsError>;
    async fn read_meta(&self, path: &str) -> Result<FileMeta, FsError>;
    async fn set_size(&self, path: &str, size: u64) -> Result<FileMeta, FsError>;
    /// Chunk covering `offset`, placed on first request.
    async fn allocate_chunk(&self, path: &str, offset: u64) -> Result<ChunkLocation, FsError>;
    async fn lookup_chunks(&self, path: &str) -> Result<Vec<ChunkLocation>, FsError>;
    async fn chunk_size(&self) -> Result<u64, FsError>;
}

pub struct GrpcMasterService {
    master_addrs: String,
    rpc_timeout: Duration,
}

fn path_request(path: &str) -> tonic::Request<PathRequest> {
    tonic::Request::new(PathRequest {
        path: path.to_owned(),
    })
}

fn file_meta(response: FileMetaResponse) -> Result<FileMeta, FsError> {
    check_status(response.status, &response.message)?;
    response
        .meta
        .ok_or_else(|| FsError::Internal("master replied without file meta".to_owned()))
}

impl GrpcMasterService {
    pub fn new(master_addrs: &str, rpc_timeout: Duration) -> Self {
        Self {
            master_addrs: master_addrs.to_owned(),
            rpc_timeout,
        }
    }

    async fn get_grpc_connection(&self) -> Result<ClientMasterClient<Channel>, FsError> {
        let channel = GRPC_CHANNEL_POOL.get_channel(&self.master_addrs).await?;
        Ok(ClientMasterClient::new(channel)
            .max_decoding_message_size(MAX_MESSAGE_SIZE)
            .max_encoding_message_size(MAX_MESSAGE_SIZE))
    }
}

#[async_trait]
impl MasterService for GrpcMasterService {
    #[instrument(name = "service_master_mkdir", skip(self))]
    async fn mkdir(&self, path: &str) -> Result<(), FsError> {
        let mut client = self.get_grpc_connection().await?;
        let response = tokio::time::timeout(self.rpc_timeout, client.mkdir(path_request(path)))
            .await??
            .into_inner();
        check_status(response.status, &response.message)
    }

    #[instrument(name = "service_master_rmdir", skip(self))]
    async fn rmdir(&self, path: &str) -> Result<(), FsError> {
        let mut client = self.get_grpc_connection().await?;
        let response = tokio::time::timeout(self.rpc_timeout, client.rmdir(path_request(path)))
            .await??
            .into_inner();
        check_status(response.status, &response.message)
    }

    #[instrument(name = "service_master_ls", skip(self))]
    async fn ls(&self, path: &str) -> Result<Listing, FsError> {
        let mut client = self.get_grpc_connection().await?;
        let response = tokio::time::timeout(self.rpc_timeout, client.ls(path_request(path)))
            .await??
            .into_inner();
        check_status(response.status, &response.message)?;
        Ok(Listing {
            dirs: response.dirs,
            files: response.files,
        })
    }

    #[instrument(name = "service_master_mv", skip(self))]
    async fn mv(&self, old_path: &str, new_path: &str) -> Result<(), FsError> {
        let mut client = self.get_grpc_connection().await?;
        let request = tonic::Request::new(MvRequest {
            old_path: old_path.to_owned(),
            new_path: new_path.to_owned(),
        });
        let response = tokio::time::timeout(self.rpc_timeout, client.mv(request))
            .await??
            .into_inner();
        check_status(response.status, &response.message)
    }

    #[instrument(name = "service_master_create", skip(self))]
    async fn create(&self, path: &str) -> Result<FileMeta, FsError> {
        let mut client = self.get_grpc_connection().await?;
        let response = tokio::time::timeout(self.rpc_timeout, client.create(path_request(path)))
            .await??
            .into_inner();
        file_meta(response)
    }

    #[instrument(name = "service_master_delete", skip(self))]
    async fn delete(&self, path: &str) -> Result<(), FsError> {
        let mut client = self.get_grpc_connection().await?;
        let response = tokio::time::timeout(self.rpc_timeout, client.delete(path_request(path)))
            .await??
            .into_inner();
        check_status(response.status, &response.message)
    }

    #[instrument(name = "service_master_read_meta", skip(self))]
    async fn read_meta(&self, path: &str) -> Result<FileMeta, FsError> {
        let mut client = self.get_grpc_connection().await?;
        let response =
            tokio::time::timeout(self.rpc_timeout, client.read_meta(path_request(path)))
                .await??
                .into_inner();
        file_meta(response)
    }

    #[instrument(name = "service_master_set_size", skip(self))]
    async fn set_size(&self, path: &str, size: u64) -> Result<FileMeta, FsError> {
        let mut client = self.get_grpc_connection().await?;
        let request = tonic::Request::new(WriteMetaRequest {
            path: path.to_owned(),
            size: Some(size),
            permissions: None,
            lock: None,
        });
        let response = tokio::time::timeout(self.rpc_timeout, client.write_meta(request))
            .await??
            .into_inner();
        file_meta(response)
    }

    #[instrument(name = "service_master_allocate_chunk", skip(self))]
    async fn allocate_chunk(&self, path: &str, offset: u64) -> Result<ChunkLocation, FsError> {
        let mut client = self.get_grpc_connection().await?;
        let request = tonic::Request::new(AllocateChunkRequest {
            path: path.to_owned(),
            offset,
        });
        let response = tokio::time::timeout(self.rpc_timeout, client.allocate_chunk(request))
            .await??
            .into_inner();
        check_status(response.status, &response.message)?;
        let location = response
            .location
            .ok_or_else(|| FsError::Internal("master replied without a location".to_owned()))?;
        trace!(chunk_id = %location.chunk_id, servers = ?location.servers, "chunk allocated");
        Ok(location)
    }

    #[instrument(name = "service_master_lookup_chunks", skip(self))]
    async fn lookup_chunks(&self, path: &str) -> Result<Vec<ChunkLocation>, FsError> {
        let mut client = self.get_grpc_connection().await?;
        let response =
            tokio::time::timeout(self.rpc_timeout, client.lookup_chunks(path_request(path)))
                .await??
                .into_inner();
        check_status(response.status, &response.message)?;
        Ok(response.chunks)
    }

    #[instrument(name = "service_master_chunk_size", skip(self))]
    async fn chunk_size(&self) -> Result<u64, FsError> {
        let mut client = self.get_grpc_connection().await?;
        let request = tonic::Request::new(ChunkSizeRequest {});
        let response = tokio::time::timeout(self.rpc_timeout, client.get_chunk_size(request))
            .await??
            .into_inner();
        check_status(response.status, "chunk size unavailable")?;
        Ok(response.chunk_size)
    }
}
