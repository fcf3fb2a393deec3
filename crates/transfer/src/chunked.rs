use std::io::{Read, Seek, SeekFrom};
use std::path::Path;

use crate::{DEFAULT_CHUNK_SIZE, TransferError};

/// A chunk of archive data, tagged with the offset it starts at.
#[derive(Debug, Clone)]
pub struct Chunk {
    /// Byte offset within the archive.
    pub offset: u64,
    /// Raw chunk data; the final chunk is naturally shorter.
    pub data: Vec<u8>,
}

/// Reads an archive in fixed-size chunks with seek-to-offset resume.
pub struct ChunkReader {
    file: std::fs::File,
    chunk_size: usize,
    offset: u64,
    file_size: u64,
}

impl ChunkReader {
    /// Opens `path` for chunked reading.
    ///
    /// If `chunk_size` is 0, [`DEFAULT_CHUNK_SIZE`] (4 MiB) is used.
    pub fn new(path: &Path, chunk_size: usize) -> Result<Self, TransferError> {
        let file = std::fs::File::open(path)?;
        let file_size = file.metadata()?.len();
        let chunk_size = if chunk_size == 0 {
            DEFAULT_CHUNK_SIZE
        } else {
            chunk_size
        };
        Ok(Self {
            file,
            chunk_size,
            offset: 0,
            file_size,
        })
    }

    /// Seeks to the given byte offset (for resume).
    pub fn seek_to(&mut self, offset: u64) -> Result<(), TransferError> {
        self.file.seek(SeekFrom::Start(offset))?;
        self.offset = offset;
        Ok(())
    }

    /// Reads the next chunk. Returns `None` at EOF.
    pub fn next_chunk(&mut self) -> Result<Option<Chunk>, TransferError> {
        if self.offset >= self.file_size {
            return Ok(None);
        }

        let remaining = (self.file_size - self.offset) as usize;
        let read_size = remaining.min(self.chunk_size);
        let mut buf = vec![0u8; read_size];
        self.file.read_exact(&mut buf)?;

        let chunk = Chunk {
            offset: self.offset,
            data: buf,
        };
        self.offset += read_size as u64;
        Ok(Some(chunk))
    }

    /// Current byte offset.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Total archive size in bytes.
    pub fn file_size(&self) -> u64 {
        self.file_size
    }

    /// Bytes remaining to read.
    pub fn remaining(&self) -> u64 {
        self.file_size - self.offset
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::path::PathBuf;

    fn create_test_file(dir: &Path, name: &str, data: &[u8]) -> PathBuf {
        let path = dir.join(name);
        std::fs::write(&path, data).unwrap();
        path
    }

    #[test]
    fn reads_all_chunks_with_short_tail() {
        let dir = tempfile::tempdir().unwrap();
        let path = create_test_file(dir.path(), "a.tar.gz", b"AABBCCDDEE"); // 10 bytes

        let mut reader = ChunkReader::new(&path, 4).unwrap();
        assert_eq!(reader.file_size(), 10);
        assert_eq!(reader.remaining(), 10);

        let c1 = reader.next_chunk().unwrap().unwrap();
        assert_eq!(c1.offset, 0);
        assert_eq!(&c1.data, b"AABB");
        assert_eq!(reader.remaining(), 6);

        let c2 = reader.next_chunk().unwrap().unwrap();
        assert_eq!(c2.offset, 4);
        assert_eq!(&c2.data, b"CCDD");

        let c3 = reader.next_chunk().unwrap().unwrap();
        assert_eq!(c3.offset, 8);
        assert_eq!(&c3.data, b"EE");

        assert!(reader.next_chunk().unwrap().is_none());
    }

    #[test]
    fn exact_multiple_ends_without_empty_chunk() {
        let dir = tempfile::tempdir().unwrap();
        let path = create_test_file(dir.path(), "a.tar.gz", b"12345678"); // 8 bytes

        let mut reader = ChunkReader::new(&path, 4).unwrap();
        assert_eq!(reader.next_chunk().unwrap().unwrap().data.len(), 4);
        assert_eq!(reader.next_chunk().unwrap().unwrap().data.len(), 4);
        assert!(reader.next_chunk().unwrap().is_none());
    }

    #[test]
    fn seek_and_resume() {
        let dir = tempfile::tempdir().unwrap();
        let path = create_test_file(dir.path(), "a.tar.gz", b"0123456789");

        let mut reader = ChunkReader::new(&path, 4).unwrap();
        reader.seek_to(6).unwrap();
        assert_eq!(reader.offset(), 6);
        assert_eq!(reader.remaining(), 4);

        let c = reader.next_chunk().unwrap().unwrap();
        assert_eq!(c.offset, 6);
        assert_eq!(&c.data, b"6789");

        assert!(reader.next_chunk().unwrap().is_none());
    }

    #[test]
    fn zero_chunk_size_uses_default() {
        let dir = tempfile::tempdir().unwrap();
        let path = create_test_file(dir.path(), "a.tar.gz", b"x");
        let mut reader = ChunkReader::new(&path, 0).unwrap();
        let c = reader.next_chunk().unwrap().unwrap();
        assert_eq!(&c.data, b"x");
    }

    #[test]
    fn missing_file_is_io_error() {
        let result = ChunkReader::new(Path::new("/nonexistent/archive.tar.gz"), 4);
        assert!(matches!(result, Err(TransferError::Io(_))));
    }
}
