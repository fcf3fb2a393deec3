//! Directory walk and archive streaming.

use std::fs::File;
use std::path::Path;

use datalift_ignore::RuleSet;
use flate2::Compression;
use flate2::write::GzEncoder;
use tracing::debug;
use walkdir::WalkDir;

use crate::{ArchiveError, calculate_file_checksum, purge_archive_dir};

/// Result of a successful snapshot build.
#[derive(Debug, Clone, PartialEq)]
pub struct Snapshot {
    /// Cumulative size of the source files, not the compressed archive.
    pub total_bytes: u64,
    /// Number of regular files packed.
    pub file_count: usize,
    /// Hex SHA-256 of the finished archive.
    pub checksum: String,
}

/// Packs the non-excluded contents of `working_dir` into a gzip tar
/// archive at `archive_path`.
///
/// The walk is sorted so the archive is deterministic for unchanged input.
/// An excluded directory prunes its whole subtree: nothing beneath it is
/// visited, so whitelist patterns cannot reach inside. On any failure the
/// archive directory is purged before the error is returned.
pub fn build(
    working_dir: &Path,
    rules: &RuleSet,
    archive_path: &Path,
) -> Result<Snapshot, ArchiveError> {
    match build_inner(working_dir, rules, archive_path) {
        Ok(snapshot) => Ok(snapshot),
        Err(e) => {
            purge_archive_dir(archive_path);
            Err(e)
        }
    }
}

fn build_inner(
    working_dir: &Path,
    rules: &RuleSet,
    archive_path: &Path,
) -> Result<Snapshot, ArchiveError> {
    if let Some(parent) = archive_path.parent() {
        std::fs::create_dir_all(parent)
            .map_err(|e| ArchiveError::classify(e, parent))?;
    }

    let file = File::create(archive_path)
        .map_err(|e| ArchiveError::classify(e, archive_path))?;
    let encoder = GzEncoder::new(file, Compression::default());
    let mut builder = tar::Builder::new(encoder);

    let mut total_bytes: u64 = 0;
    let mut file_count: usize = 0;

    let walker = WalkDir::new(working_dir)
        .min_depth(1)
        .sort_by_file_name()
        .into_iter()
        .filter_entry(|entry| !excluded(working_dir, entry.path(), rules));

    for entry in walker {
        let entry = entry.map_err(|e| {
            let path = e.path().map(Path::to_path_buf).unwrap_or_default();
            match e.into_io_error() {
                Some(ioe) => ArchiveError::classify(ioe, &path),
                None => ArchiveError::Io(std::io::Error::other("directory walk failed")),
            }
        })?;

        let path = entry.path();
        let rel = relative_name(working_dir, path);

        if entry.file_type().is_dir() {
            builder
                .append_dir(&rel, path)
                .map_err(|e| ArchiveError::classify(e, path))?;
        } else if entry.file_type().is_file() {
            let mut source =
                File::open(path).map_err(|e| ArchiveError::classify(e, path))?;
            let size = source
                .metadata()
                .map_err(|e| ArchiveError::classify(e, path))?
                .len();
            builder
                .append_file(&rel, &mut source)
                .map_err(|e| ArchiveError::classify(e, path))?;
            total_bytes += size;
            file_count += 1;
        }
        // Symlinks and other special files are skipped.
    }

    let encoder = builder
        .into_inner()
        .map_err(|e| ArchiveError::classify(e, archive_path))?;
    let file = encoder
        .finish()
        .map_err(|e| ArchiveError::classify(e, archive_path))?;
    file.sync_all()
        .map_err(|e| ArchiveError::classify(e, archive_path))?;

    let checksum = calculate_file_checksum(archive_path)
        .map_err(|e| ArchiveError::classify(e, archive_path))?;

    debug!(
        files = file_count,
        total_bytes,
        archive = %archive_path.display(),
        "snapshot complete"
    );

    Ok(Snapshot {
        total_bytes,
        file_count,
        checksum,
    })
}

/// Root-relative path with forward slashes, as tested against the rules
/// and stored in the archive.
fn relative_name(root: &Path, path: &Path) -> String {
    path.strip_prefix(root)
        .unwrap_or(path)
        .to_string_lossy()
        .replace('\\', "/")
}

fn excluded(root: &Path, path: &Path, rules: &RuleSet) -> bool {
    rules.is_excluded(&relative_name(root, path))
}
