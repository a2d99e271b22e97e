use std::{sync::Arc, time::Instant};

use proto::generated::client_master::{
    AllocateChunkRequest, AllocateChunkResponse, ChunkSizeRequest, ChunkSizeResponse, FileMeta,
    FileMetaResponse, LookupChunksResponse, LsResponse, MvRequest, OpenResponse, PathRequest,
    StatusResponse, WriteMetaRequest, client_master_server::ClientMaster,
};
use tokio::sync::{Mutex, Notify};
use utilities::{
    error::{FsError, STATUS_OK},
    logger::{debug, instrument, trace, tracing},
};

use crate::{master_state::MasterState, placement::placement_policy::PlacementPolicy};

fn status_response(result: Result<(), FsError>) -> StatusResponse {
    match result {
        Ok(()) => StatusResponse {
            status: STATUS_OK,
            message: String::new(),
        },
        Err(e) => {
            debug!(error = %e, "request failed");
            StatusResponse {
                status: e.code(),
                message: e.to_string(),
            }
        }
    }
}

fn file_meta_response(result: Result<FileMeta, FsError>) -> FileMetaResponse {
    match result {
        Ok(meta) => FileMetaResponse {
            status: STATUS_OK,
            message: String::new(),
            meta: Some(meta),
        },
        Err(e) => {
            debug!(error = %e, "request failed");
            FileMetaResponse {
                status: e.code(),
                message: e.to_string(),
                meta: None,
            }
        }
    }
}

pub struct ClientHandler {
    state: Arc<Mutex<MasterState>>,
    placement_policy: Box<dyn PlacementPolicy>,
    chunk_size: u64,
    repair_signal: Arc<Notify>,
}

impl ClientHandler {
    pub fn new(
        state: Arc<Mutex<MasterState>>,
        placement_policy: Box<dyn PlacementPolicy>,
        chunk_size: u64,
        repair_signal: Arc<Notify>,
    ) -> Self {
        Self {
            state,
            placement_policy,
            chunk_size,
            repair_signal,
        }
    }
}

#[tonic::async_trait]
impl ClientMaster for ClientHandler {
    #[instrument(name="grpc_client_create",skip(self,request),fields(path= %request.get_ref().path))]
    async fn create(
        &self,
        request: tonic::Request<PathRequest>,
    ) -> Result<tonic::Response<FileMetaResponse>, tonic::Status> {
        let path_request = request.into_inner();
        let mut state = self.state.lock().await;
        let result = state.create_file(&path_request.path).map(FileMeta::from);
        Ok(tonic::Response::new(file_meta_response(result)))
    }

    #[instrument(name="grpc_client_open",skip(self,request),fields(path= %request.get_ref().path))]
    async fn open(
        &self,
        request: tonic::Request<PathRequest>,
    ) -> Result<tonic::Response<OpenResponse>, tonic::Status> {
        let path_request = request.into_inner();
        let state = self.state.lock().await;
        let response = match state.namespace.get_file(&path_request.path) {
            Ok(inode) => OpenResponse {
                status: STATUS_OK,
                message: String::new(),
                meta: Some(inode.into()),
                chunk_ids: inode.chunks.clone(),
            },
            Err(e) => OpenResponse {
                status: e.code(),
                message: e.to_string(),
                meta: None,
                chunk_ids: vec![],
            },
        };
        Ok(tonic::Response::new(response))
    }

    #[instrument(name="grpc_client_delete",skip(self,request),fields(path= %request.get_ref().path))]
    async fn delete(
        &self,
        request: tonic::Request<PathRequest>,
    ) -> Result<tonic::Response<StatusResponse>, tonic::Status> {
        let path_request = request.into_inner();
        let mut state = self.state.lock().await;
        let result = state
            .delete_file(&path_request.path, Instant::now())
            .map(|inode| trace!(chunks = ?inode.chunks, "chunks orphaned"));
        Ok(tonic::Response::new(status_response(result)))
    }

    #[instrument(name="grpc_client_read_meta",skip(self,request),fields(path= %request.get_ref().path))]
    async fn read_meta(
        &self,
        request: tonic::Request<PathRequest>,
    ) -> Result<tonic::Response<FileMetaResponse>, tonic::Status> {
        let path_request = request.into_inner();
        let state = self.state.lock().await;
        let result = state.namespace.get_file(&path_request.path).map(FileMeta::from);
        Ok(tonic::Response::new(file_meta_response(result)))
    }

    #[instrument(name="grpc_client_write_meta",skip(self,request),fields(path= %request.get_ref().path))]
    async fn write_meta(
        &self,
        request: tonic::Request<WriteMetaRequest>,
    ) -> Result<tonic::Response<FileMetaResponse>, tonic::Status> {
        let write_meta_request = request.into_inner();
        let mut state = self.state.lock().await;
        let result = state
            .namespace
            .get_file_mut(&write_meta_request.path)
            .map(|inode| {
                if let Some(size) = write_meta_request.size {
                    inode.size = size;
                }
                if let Some(permissions) = write_meta_request.permissions {
                    inode.permissions = permissions;
                }
                if let Some(lock) = write_meta_request.lock {
                    inode.lock = lock;
                }
                FileMeta::from(&*inode)
            });
        Ok(tonic::Response::new(file_meta_response(result)))
    }

    #[instrument(name="grpc_client_mkdir",skip(self,request),fields(path= %request.get_ref().path))]
    async fn mkdir(
        &self,
        request: tonic::Request<PathRequest>,
    ) -> Result<tonic::Response<StatusResponse>, tonic::Status> {
        let path_request = request.into_inner();
        let mut state = self.state.lock().await;
        let result = state.namespace.add_dir(&path_request.path);
        Ok(tonic::Response::new(status_response(result)))
    }

    #[instrument(name="grpc_client_rmdir",skip(self,request),fields(path= %request.get_ref().path))]
    async fn rmdir(
        &self,
        request: tonic::Request<PathRequest>,
    ) -> Result<tonic::Response<StatusResponse>, tonic::Status> {
        let path_request = request.into_inner();
        let mut state = self.state.lock().await;
        let result = state.namespace.remove_dir(&path_request.path);
        Ok(tonic::Response::new(status_response(result)))
    }

    #[instrument(name="grpc_client_ls",skip(self,request),fields(path= %request.get_ref().path))]
    async fn ls(
        &self,
        request: tonic::Request<PathRequest>,
    ) -> Result<tonic::Response<LsResponse>, tonic::Status> {
        let path_request = request.into_inner();
        let state = self.state.lock().await;
        let response = match state.namespace.read_dir(&path_request.path) {
            Ok((dirs, files)) => LsResponse {
                status: STATUS_OK,
                message: String::new(),
                dirs: dirs.to_vec(),
                files: files.keys().cloned().collect(),
            },
            Err(e) => LsResponse {
                status: e.code(),
                message: e.to_string(),
                dirs: vec![],
                files: vec![],
            },
        };
        Ok(tonic::Response::new(response))
    }

    #[instrument(name="grpc_client_mv",skip(self,request),fields(old_path= %request.get_ref().old_path,new_path= %request.get_ref().new_path))]
    async fn mv(
        &self,
        request: tonic::Request<MvRequest>,
    ) -> Result<tonic::Response<StatusResponse>, tonic::Status> {
        let mv_request = request.into_inner();
        let mut state = self.state.lock().await;
        let result = if state.namespace.is_dir(&mv_request.old_path) {
            state
                .namespace
                .move_dir(&mv_request.old_path, &mv_request.new_path)
        } else {
            state
                .namespace
                .move_file(&mv_request.old_path, &mv_request.new_path)
        };
        Ok(tonic::Response::new(status_response(result)))
    }

    #[instrument(name="grpc_client_allocate_chunk",skip(self,request),fields(path= %request.get_ref().path,offset= %request.get_ref().offset))]
    async fn allocate_chunk(
        &self,
        request: tonic::Request<AllocateChunkRequest>,
    ) -> Result<tonic::Response<AllocateChunkResponse>, tonic::Status> {
        let allocate_request = request.into_inner();
        let mut state = self.state.lock().await;
        let result = state.allocate_chunk(
            &allocate_request.path,
            allocate_request.offset,
            self.chunk_size,
            self.placement_policy.as_ref(),
        );
        let needs_repair = !state.repair_queue.is_empty();
        drop(state);
        let response = match result {
            Ok(location) => {
                trace!(chunk_id = %location.chunk_id, servers = ?location.servers, "chunk placed");
                if needs_repair {
                    self.repair_signal.notify_one();
                }
                AllocateChunkResponse {
                    status: STATUS_OK,
                    message: String::new(),
                    location: Some(location),
                }
            }
            Err(e) => {
                debug!(error = %e, "allocation failed");
                AllocateChunkResponse {
                    status: e.code(),
                    message: e.to_string(),
                    location: None,
                }
            }
        };
        Ok(tonic::Response::new(response))
    }

    #[instrument(name="grpc_client_lookup_chunks",skip(self,request),fields(path= %request.get_ref().path))]
    async fn lookup_chunks(
        &self,
        request: tonic::Request<PathRequest>,
    ) -> Result<tonic::Response<LookupChunksResponse>, tonic::Status> {
        let path_request = request.into_inner();
        let state = self.state.lock().await;
        let response = match state.lookup_chunks(&path_request.path) {
            Ok(chunks) => LookupChunksResponse {
                status: STATUS_OK,
                message: String::new(),
                chunks,
            },
            Err(e) => LookupChunksResponse {
                status: e.code(),
                message: e.to_string(),
                chunks: vec![],
            },
        };
        Ok(tonic::Response::new(response))
    }

    #[instrument(name = "grpc_client_get_chunk_size", skip(self, _request))]
    async fn get_chunk_size(
        &self,
        _request: tonic::Request<ChunkSizeRequest>,
    ) -> Result<tonic::Response<ChunkSizeResponse>, tonic::Status> {
        let replication_factor = self.state.lock().await.replication_factor as u32;
        Ok(tonic::Response::new(ChunkSizeResponse {
            status: STATUS_OK,
            chunk_size: self.chunk_size,
            replication_factor,
        }))
    }
}
