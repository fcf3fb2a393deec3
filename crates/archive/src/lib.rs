//! Snapshot builder: packs a working directory into one gzip tar archive.
//!
//! The walk honors the ignore rule set with whole-subtree pruning, the
//! archive is written to a per-session path that survives resumption, and
//! any failure purges the archive directory so a partial archive can never
//! be mistaken for a finished one.

use std::path::{Path, PathBuf};

use tracing::warn;

mod checksum;
mod snapshot;

pub use checksum::{calculate_file_checksum, checksum_bytes};
pub use snapshot::{Snapshot, build};

/// Errors produced while building a snapshot.
#[derive(Debug, thiserror::Error)]
pub enum ArchiveError {
    #[error("permission denied: {}", .path.display())]
    Permission {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("no space left on device while writing the archive")]
    NoSpace(#[source] std::io::Error),

    #[error("too many open files while scanning the directory")]
    TooManyFiles(#[source] std::io::Error),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl ArchiveError {
    /// Classifies an I/O error against the path it occurred on.
    fn classify(source: std::io::Error, path: &Path) -> Self {
        use std::io::ErrorKind;

        match source.kind() {
            ErrorKind::PermissionDenied => ArchiveError::Permission {
                path: path.to_path_buf(),
                source,
            },
            ErrorKind::StorageFull | ErrorKind::QuotaExceeded => ArchiveError::NoSpace(source),
            _ if is_fd_exhaustion(&source) => ArchiveError::TooManyFiles(source),
            _ => ArchiveError::Io(source),
        }
    }
}

#[cfg(unix)]
fn is_fd_exhaustion(e: &std::io::Error) -> bool {
    // EMFILE (per-process) or ENFILE (system-wide).
    matches!(e.raw_os_error(), Some(24) | Some(23))
}

#[cfg(not(unix))]
fn is_fd_exhaustion(_e: &std::io::Error) -> bool {
    false
}

/// Returns the archive path for an upload session.
///
/// The containing directory is derived from the entity id so re-running
/// after a crash finds the same archive and never recompresses.
pub fn session_archive_path(entity_id: &str) -> PathBuf {
    std::env::temp_dir()
        .join(format!("datalift-{entity_id}"))
        .join(format!("{entity_id}.data.tar.gz"))
}

/// Best-effort removal of the directory containing `archive_path`.
///
/// Used on build failure, operator interrupt, and after a completed
/// transfer. Never fails the caller.
pub fn purge_archive_dir(archive_path: &Path) {
    let Some(dir) = archive_path.parent() else {
        return;
    };
    if let Err(e) = std::fs::remove_dir_all(dir)
        && e.kind() != std::io::ErrorKind::NotFound
    {
        warn!(dir = %dir.display(), error = %e, "failed to remove archive directory");
    }
}
