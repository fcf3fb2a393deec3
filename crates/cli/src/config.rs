//! Host endpoints and access-token lookup.

use std::path::{Path, PathBuf};

/// Platform REST API base, `$DATALIFT_HOST` to override.
const DEFAULT_API_URL: &str = "https://api.datalift.dev/api/v1";

/// Resumable upload server, `$DATALIFT_UPLOAD_URL` to override.
const DEFAULT_UPLOAD_URL: &str = "https://uploads.datalift.dev/files/";

/// Resolved endpoints and credentials for one invocation.
#[derive(Debug, Clone)]
pub struct Config {
    pub api_url: String,
    pub upload_url: String,
    /// Bearer token, if the user is logged in.
    pub token: Option<String>,
}

impl Config {
    pub fn from_env() -> Self {
        Self {
            api_url: std::env::var("DATALIFT_HOST")
                .unwrap_or_else(|_| DEFAULT_API_URL.to_string()),
            upload_url: std::env::var("DATALIFT_UPLOAD_URL")
                .unwrap_or_else(|_| DEFAULT_UPLOAD_URL.to_string()),
            token: std::env::var("DATALIFT_TOKEN")
                .ok()
                .filter(|t| !t.is_empty())
                .or_else(|| read_token_file(&token_file_path()?)),
        }
    }
}

fn token_file_path() -> Option<PathBuf> {
    Some(dirs::config_dir()?.join("datalift").join("token"))
}

/// Reads a token file, trimming trailing whitespace. Absent or empty
/// files mean "not logged in".
fn read_token_file(path: &Path) -> Option<String> {
    let contents = std::fs::read_to_string(path).ok()?;
    let token = contents.trim();
    if token.is_empty() {
        None
    } else {
        Some(token.to_string())
    }
}
