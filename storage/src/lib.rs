pub mod memory_storage;
pub mod storage;

pub type ChunkId = u64;
