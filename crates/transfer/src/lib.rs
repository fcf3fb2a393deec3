//! Chunked resumable upload client.
//!
//! Implements the wire protocol for transferring one archive: session
//! creation, authoritative-offset query, and the chunked transfer loop.
//! The server's reported offset is the single source of truth — a locally
//! cached offset is never trusted, since the local machine cannot know
//! whether a chunk sent just before a crash was acknowledged.

mod chunked;
mod client;
mod transport;

pub use chunked::{Chunk, ChunkReader};
pub use client::UploadClient;
pub use transport::{Credentials, HttpTransport, UploadTransport};

/// Default chunk size: 4 MiB.
pub const DEFAULT_CHUNK_SIZE: usize = 4 * 1024 * 1024;

/// Resumable-protocol version sent with every request.
pub const PROTOCOL_VERSION: &str = "1.0.0";

/// Errors produced by the transfer crate.
///
/// Transient variants leave the persisted session untouched so the next
/// invocation can re-query the offset and continue; permanent variants
/// mean no retry is meaningful.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("upload endpoint is busy, try again later")]
    Locked,

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("server reported offset {actual}, expected {expected}")]
    OffsetMismatch { expected: u64, actual: u64 },

    #[error("archive exceeds the server's size limit")]
    TooLarge,

    #[error("upload rejected with status {status}")]
    Rejected { status: u16 },

    #[error("malformed server response: {0}")]
    Malformed(String),
}

impl TransferError {
    /// Returns `true` if the session should be preserved and the user told
    /// to retry, `false` if retrying cannot succeed.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            TransferError::Locked
                | TransferError::Transport(_)
                | TransferError::OffsetMismatch { .. }
                | TransferError::Malformed(_)
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(TransferError::Locked.is_transient());
        assert!(TransferError::Transport("no route".into()).is_transient());
        assert!(
            TransferError::OffsetMismatch {
                expected: 8,
                actual: 4
            }
            .is_transient()
        );
        assert!(TransferError::Malformed("missing header".into()).is_transient());

        assert!(!TransferError::TooLarge.is_transient());
        assert!(!TransferError::Rejected { status: 410 }.is_transient());
        assert!(!TransferError::Io(std::io::Error::other("read failed")).is_transient());
    }
}
