use serde::Serialize;

use super::ChunkId;

pub const DEFAULT_PERMISSIONS: u64 = 0o644;

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Inode {
    pub name: String,
    pub permissions: u64,
    pub size: u64,
    /// advisory only, nothing on the master enforces it
    pub lock: bool,
    pub chunks: Vec<ChunkId>,
}

impl Inode {
    pub fn new(name: &str) -> Self {
        Self {
            name: name.to_owned(),
            permissions: DEFAULT_PERMISSIONS,
            size: 0,
            lock: false,
            chunks: Vec::new(),
        }
    }
}

impl From<&Inode> for proto::generated::client_master::FileMeta {
    fn from(inode: &Inode) -> Self {
        Self {
            name: inode.name.clone(),
            permissions: inode.permissions,
            size: inode.size,
            lock: inode.lock,
            chunk_count: inode.chunks.len() as u64,
        }
    }
}
