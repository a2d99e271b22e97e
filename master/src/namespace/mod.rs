mod directory;
pub mod path;
mod trie;

pub use trie::Trie;
