use tokio::{
    fs::OpenOptions,
    io::{AsyncReadExt, AsyncSeekExt},
};
use utilities::{logger::instrument, logger::tracing, result::Result};

/// One `chunk_size` slice of a local file, the last one may be shorter.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FileChunk {
    file_path: String,
    pub start_offset: u64,
    pub end_offset: u64,
}

impl FileChunk {
    pub async fn read(&self) -> Result<Vec<u8>> {
        let mut file = OpenOptions::new()
            .read(true)
            .open(&self.file_path)
            .await
            .map_err(|e| format!("Error while openning the file for chunk {e:?}"))?;
        file.seek(tokio::io::SeekFrom::Start(self.start_offset))
            .await
            .map_err(|e| format!("Error while seeking to starting offset {e:?}"))?;
        let mut data = Vec::with_capacity((self.end_offset - self.start_offset) as usize);
        file.take(self.end_offset - self.start_offset)
            .read_to_end(&mut data)
            .await
            .map_err(|e| format!("Error while reading chunk {e:?}"))?;
        if (data.len() as u64) < self.end_offset - self.start_offset {
            return Err(format!("{} shrank while it was being stored", self.file_path).into());
        }
        Ok(data)
    }
}

/// Splits a file of `file_size` bytes at `chunk_size` boundaries.
pub struct FileChunker {
    file_path: String,
    file_size: u64,
    chunk_size: u64,
    next_offset: u64,
}

impl FileChunker {
    pub fn new(file_path: String, file_size: u64, chunk_size: u64) -> Self {
        FileChunker {
            file_path,
            file_size,
            chunk_size: chunk_size.max(1),
            next_offset: 0,
        }
    }
}

impl Iterator for FileChunker {
    type Item = FileChunk;

    #[instrument(name = "file_chunker_next_chunk", skip(self))]
    fn next(&mut self) -> Option<FileChunk> {
        if self.next_offset >= self.file_size {
            return None;
        }
        let start_offset = self.next_offset;
        let end_offset = (start_offset + self.chunk_size).min(self.file_size);
        self.next_offset = end_offset;
        Some(FileChunk {
            file_path: self.file_path.clone(),
            start_offset,
            end_offset,
        })
    }
}

#[cfg(test)]
mod tests {
    use std::io::Write;

    use super::*;

    #[test]
    fn splits_at_chunk_boundaries() {
        let offsets: Vec<(u64, u64)> = FileChunker::new("f".to_owned(), 10, 4)
            .map(|chunk| (chunk.start_offset, chunk.end_offset))
            .collect();
        assert_eq!(offsets, vec![(0, 4), (4, 8), (8, 10)]);
        assert_eq!(FileChunker::new("f".to_owned(), 8, 4).count(), 2);
        assert_eq!(FileChunker::new("f".to_owned(), 0, 4).count(), 0);
    }

    #[tokio::test]
    async fn reads_each_slice() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        file.write_all(b"abcdefghij").unwrap();
        let path = file.path().to_string_lossy().into_owned();
        let mut chunks = vec![];
        for chunk in FileChunker::new(path, 10, 4) {
            chunks.push(chunk.read().await.unwrap());
        }
        assert_eq!(
            chunks,
            vec![b"abcd".to_vec(), b"efgh".to_vec(), b"ij".to_vec()]
        );
    }
}
