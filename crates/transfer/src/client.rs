//! The resumable transfer loop.

use std::path::Path;

use tracing::{debug, info};

use crate::chunked::ChunkReader;
use crate::transport::{Credentials, UploadTransport};
use crate::{DEFAULT_CHUNK_SIZE, TransferError};

/// Drives one archive through the upload protocol.
///
/// The loop is resumable at any point, including across process restarts:
/// every pass starts by asking the server where it left off.
pub struct UploadClient<'a> {
    transport: &'a dyn UploadTransport,
    chunk_size: usize,
}

impl<'a> UploadClient<'a> {
    /// Creates a client with the default chunk size.
    pub fn new(transport: &'a dyn UploadTransport) -> Self {
        Self::with_chunk_size(transport, DEFAULT_CHUNK_SIZE)
    }

    /// Creates a client with an explicit chunk size.
    pub fn with_chunk_size(transport: &'a dyn UploadTransport, chunk_size: usize) -> Self {
        Self {
            transport,
            chunk_size,
        }
    }

    /// Initializes an upload session for the archive and returns the
    /// opaque endpoint handle, the sole resumption key.
    pub async fn initialize(
        &self,
        archive_path: &Path,
        upload_id: &str,
        creds: &Credentials,
    ) -> Result<String, TransferError> {
        let total_bytes = std::fs::metadata(archive_path)?.len();
        let metadata = vec![("filename".to_string(), upload_id.to_string())];

        info!(total_bytes, "initializing upload session");
        self.transport.create(total_bytes, &metadata, creds).await
    }

    /// Runs the chunk loop until the server's offset equals the archive
    /// length.
    ///
    /// The starting offset is always the server's answer, never local
    /// state. Each chunk is tagged with the offset it starts at; the
    /// server's reply must advance by exactly the chunk length, anything
    /// else aborts the attempt with session state untouched. `progress`
    /// receives `(acknowledged_bytes, total_bytes)` after the offset query
    /// and after every acknowledged chunk.
    pub async fn resume(
        &self,
        archive_path: &Path,
        endpoint: &str,
        creds: &Credentials,
        mut progress: impl FnMut(u64, u64),
    ) -> Result<(), TransferError> {
        let mut reader = ChunkReader::new(archive_path, self.chunk_size)?;
        let total = reader.file_size();

        let mut offset = self.transport.offset(endpoint, creds).await?;
        if offset > total {
            return Err(TransferError::Malformed(format!(
                "server offset {offset} beyond archive length {total}"
            )));
        }
        reader.seek_to(offset)?;
        progress(offset, total);

        if offset > 0 {
            info!(offset, total, "resuming upload from server offset");
        }

        while offset < total {
            let chunk = reader.next_chunk()?.ok_or_else(|| {
                TransferError::Io(std::io::Error::new(
                    std::io::ErrorKind::UnexpectedEof,
                    "archive ended before its declared length",
                ))
            })?;
            let expected = chunk.offset + chunk.data.len() as u64;

            let actual = self
                .transport
                .write_chunk(endpoint, chunk.offset, chunk.data, creds)
                .await?;
            if actual != expected {
                return Err(TransferError::OffsetMismatch { expected, actual });
            }

            offset = actual;
            progress(offset, total);
        }

        debug!(total, "byte transfer complete");
        Ok(())
    }
}
