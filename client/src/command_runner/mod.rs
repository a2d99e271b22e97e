mod delete_file_handler;
mod fetch_file_handler;
mod namespace_handler;
mod store_file_handler;

use std::{fmt::Display, sync::Arc, time::Duration};

use delete_file_handler::DeleteFileHandler;
use fetch_file_handler::FetchFileHandler;
use namespace_handler::NamespaceHandler;
use store_file_handler::StoreFileHandler;
use utilities::error::FsError;

use crate::{
    chunkserver::service::ChunkserverService,
    cli::{Command, EXIT_FAILED, EXIT_MASTER_UNREACHABLE},
    master::service::MasterService,
};

/// Why a command failed, which decides the exit code.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CommandError {
    MasterUnreachable(FsError),
    Failed(String),
}

impl CommandError {
    pub fn failed(e: impl Display) -> Self {
        CommandError::Failed(e.to_string())
    }
    pub fn exit_code(&self) -> u8 {
        match self {
            CommandError::MasterUnreachable(_) => EXIT_MASTER_UNREACHABLE,
            CommandError::Failed(_) => EXIT_FAILED,
        }
    }
}

impl Display for CommandError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            CommandError::MasterUnreachable(e) => write!(f, "master unreachable : {e}"),
            CommandError::Failed(msg) => write!(f, "{msg}"),
        }
    }
}

/// For errors returned by the master. Chunk server errors go through `CommandError::failed`.
impl From<FsError> for CommandError {
    fn from(e: FsError) -> Self {
        match e {
            FsError::Unreachable(_) | FsError::Timeout(_) => CommandError::MasterUnreachable(e),
            other => CommandError::Failed(other.to_string()),
        }
    }
}

pub struct CommandRunner {
    namespace_handler: NamespaceHandler,
    store_file_handler: StoreFileHandler,
    fetch_file_handler: FetchFileHandler,
    delete_file_handler: DeleteFileHandler,
}

impl CommandRunner {
    pub fn new(
        master: Arc<dyn MasterService>,
        chunkserver: Arc<dyn ChunkserverService>,
        write_retries: u8,
        write_backoff: Duration,
    ) -> Self {
        CommandRunner {
            namespace_handler: NamespaceHandler::new(master.clone()),
            store_file_handler: StoreFileHandler::new(
                master.clone(),
                chunkserver.clone(),
                write_retries,
                write_backoff,
            ),
            fetch_file_handler: FetchFileHandler::new(master.clone(), chunkserver),
            delete_file_handler: DeleteFileHandler::new(master),
        }
    }

    pub async fn run(&self, command: Command) -> Result<String, CommandError> {
        match command {
            Command::Mkdir { path } => self.namespace_handler.mkdir(&path).await,
            Command::Rmdir { path } => self.namespace_handler.rmdir(&path).await,
            Command::Ls { path } => self.namespace_handler.ls(&path).await,
            Command::Mv { old_path, new_path } => {
                self.namespace_handler.mv(&old_path, &new_path).await
            }
            Command::Put { local, remote } => {
                self.store_file_handler.store_file(&local, &remote).await
            }
            Command::Get { remote, local } => {
                self.fetch_file_handler.fetch_file(&remote, &local).await
            }
            Command::Rm { remote } => self.delete_file_handler.delete_file(&remote).await,
        }
    }
}
