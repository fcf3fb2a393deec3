//! Persisted upload session record.
//!
//! One `.datalift` JSON file per working directory is the only source of
//! truth for resumption. Callers mutate the in-memory record, `save()` it
//! durably, and only then perform the dependent network or filesystem
//! action, so a crash leaves the record consistent with reality or
//! strictly behind it, never ahead.

use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

/// File name of the per-directory session record.
pub const SESSION_FILE_NAME: &str = ".datalift";

/// Errors from the session store.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("malformed session file: {0}")]
    Malformed(#[from] serde_json::Error),

    #[error("inconsistent session record: {0}")]
    Inconsistent(&'static str),
}

/// Where the session is in the upload lifecycle, derived from the record.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    /// Nothing pending.
    Empty,
    /// A finished archive is waiting for a remote session.
    Archived,
    /// A remote session exists; the byte loop may be anywhere.
    Transferring,
    /// Bytes are fully transferred; the server is still unpacking.
    Unpacking,
}

/// The one persisted record per working directory.
///
/// `archive_path` and `resource_id` are mutually exclusive: an archive
/// pending upload and a fully transferred resource cannot coexist.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct UploadSession {
    /// Dataset display name chosen at `init`. Empty means uninitialized.
    #[serde(default)]
    pub name: String,
    /// Optional owner namespace, purely descriptive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub namespace: Option<String>,
    /// Identifies the dataset family across versions.
    #[serde(default)]
    pub family_id: String,
    /// Incremented when a new upload is initialized.
    #[serde(default)]
    pub version: u32,
    /// Server-assigned id of the entity being created.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub entity_id: Option<String>,
    /// Local archive pending upload, if any.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive_path: Option<PathBuf>,
    /// Hex SHA-256 of the finished archive.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub archive_checksum: Option<String>,
    /// Opaque remote upload endpoint; the resumption key.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub endpoint: Option<String>,
    /// Set only once the byte loop has completed.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub resource_id: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub updated_at: Option<DateTime<Utc>>,
}

impl UploadSession {
    /// A fresh record as written by `datalift init`.
    pub fn new(name: &str, namespace: Option<String>, family_id: &str) -> Self {
        Self {
            name: name.to_string(),
            namespace,
            family_id: family_id.to_string(),
            created_at: Some(Utc::now()),
            ..Self::default()
        }
    }

    /// Returns `true` if `datalift init` has run in this directory.
    pub fn is_initialized(&self) -> bool {
        !self.name.is_empty()
    }

    /// Derives the lifecycle state from the record.
    pub fn state(&self) -> SessionState {
        if self.resource_id.is_some() {
            SessionState::Unpacking
        } else if self.endpoint.is_some() {
            SessionState::Transferring
        } else if self.archive_path.is_some() {
            SessionState::Archived
        } else {
            SessionState::Empty
        }
    }

    /// Returns `true` if a previous upload can be resumed: the archive is
    /// still on disk and a remote endpoint was recorded.
    pub fn is_resumable(&self) -> bool {
        match (&self.archive_path, &self.endpoint) {
            (Some(path), Some(_)) => path.is_file(),
            _ => false,
        }
    }

    /// Drops all per-upload fields, keeping the `init` identity.
    pub fn reset_upload(&mut self) {
        self.entity_id = None;
        self.archive_path = None;
        self.archive_checksum = None;
        self.endpoint = None;
        self.resource_id = None;
    }

    fn validate(&self) -> Result<(), SessionError> {
        if self.archive_path.is_some() && self.resource_id.is_some() {
            return Err(SessionError::Inconsistent(
                "archive pending and resource recorded at the same time",
            ));
        }
        if self.endpoint.is_some() && self.archive_path.is_none() {
            return Err(SessionError::Inconsistent(
                "remote endpoint recorded without a local archive",
            ));
        }
        Ok(())
    }
}

/// Loads, saves, and clears the session record for one working directory.
#[derive(Debug, Clone)]
pub struct SessionStore {
    path: PathBuf,
}

impl SessionStore {
    /// A store for the record inside `dir`.
    pub fn in_dir(dir: &Path) -> Self {
        Self {
            path: dir.join(SESSION_FILE_NAME),
        }
    }

    /// Path of the record file.
    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Reads the record. An absent file is the empty state, not an error.
    pub fn load(&self) -> Result<UploadSession, SessionError> {
        let contents = match std::fs::read_to_string(&self.path) {
            Ok(contents) => contents,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Ok(UploadSession::default());
            }
            Err(e) => return Err(e.into()),
        };
        Ok(serde_json::from_str(&contents)?)
    }

    /// Atomically and durably overwrites the record.
    ///
    /// Writes a temp file in the same directory, fsyncs it, then renames
    /// over the record, so the file always holds a complete JSON document.
    pub fn save(&self, session: &UploadSession) -> Result<(), SessionError> {
        session.validate()?;

        let mut session = session.clone();
        session.updated_at = Some(Utc::now());

        let json = serde_json::to_string_pretty(&session)?;
        let tmp = self.path.with_extension("tmp");
        {
            use std::io::Write;
            let mut file = std::fs::File::create(&tmp)?;
            file.write_all(json.as_bytes())?;
            file.sync_all()?;
        }
        std::fs::rename(&tmp, &self.path)?;

        debug!(path = %self.path.display(), state = ?session.state(), "session saved");
        Ok(())
    }

    /// Removes the record, returning the directory to the empty state.
    pub fn clear(&self) -> Result<(), SessionError> {
        match std::fs::remove_file(&self.path) {
            Ok(()) => Ok(()),
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
            Err(e) => Err(e.into()),
        }
    }
}
