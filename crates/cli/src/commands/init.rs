//! `datalift init` — set up the current directory for uploads.

use datalift_ignore::{DEFAULT_RULE_FILE, RULE_FILE_NAME};
use datalift_session::{SessionStore, UploadSession};
use tracing::debug;
use uuid::Uuid;

use crate::error::CliError;

pub fn run(name: &str, namespace: Option<String>) -> Result<(), CliError> {
    let cwd = std::env::current_dir()?;
    let store = SessionStore::in_dir(&cwd);

    let session = UploadSession::new(name, namespace, &Uuid::new_v4().to_string());
    store.save(&session)?;
    debug!(path = %store.path().display(), "session record written");

    let rule_file = cwd.join(RULE_FILE_NAME);
    if !rule_file.exists() {
        std::fs::write(&rule_file, DEFAULT_RULE_FILE)?;
        debug!(path = %rule_file.display(), "default ignore file written");
    }

    println!("Data source \"{name}\" initialized in current directory");
    println!();
    println!("You can now upload your data:");
    println!("    datalift upload");
    Ok(())
}
