//! `datalift upload` — the orchestrating pipeline.
//!
//! Sequences snapshot → session initialization → chunked transfer →
//! readiness wait. The session record is saved before every dependent
//! side effect, and failures are handled by category: transient remote
//! errors preserve the session untouched, permanent and local errors
//! purge the archive and empty the record.

use std::io::Write as _;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use datalift_api::{ApiClient, ApiError, EntityRequest, StaticToken, UploadCredentials};
use datalift_archive::{Snapshot, purge_archive_dir, session_archive_path};
use datalift_ignore::RuleSet;
use datalift_session::{SessionState, SessionStore, UploadSession};
use datalift_transfer::{Credentials, HttpTransport, UploadClient};
use indicatif::{HumanBytes, ProgressBar, ProgressStyle};
use tracing::{info, warn};

use crate::commands::data_name;
use crate::config::Config;
use crate::error::CliError;

pub async fn run(config: &Config, resume_flag: bool) -> Result<(), CliError> {
    let cwd = std::env::current_dir()?;
    let store = SessionStore::in_dir(&cwd);
    let mut session = store.load()?;

    if !session.is_initialized() {
        return Err(CliError::Usage(
            "no data session in this directory; run `datalift init <name>` first".into(),
        ));
    }

    let api = ApiClient::new(
        &config.api_url,
        Arc::new(StaticToken::new(config.token.clone())),
    )?;

    match session.state() {
        // Bytes are already transferred; only unpacking remains.
        SessionState::Unpacking => return finish_unpacking(&api, &store, &mut session).await,
        SessionState::Empty => {}
        SessionState::Archived | SessionState::Transferring => {
            let has_archive = session.archive_path.as_deref().is_some_and(Path::is_file);
            if !has_archive {
                // The record is ahead of the filesystem; start over.
                warn!("pending archive no longer exists, starting a fresh upload");
                session.reset_upload();
                store.save(&session)?;
            } else if resume_flag || confirm_resume()? {
                info!("resuming unfinished upload");
            } else {
                abort_previous_upload(&store, &mut session)?;
            }
        }
    }

    if session.state() == SessionState::Empty {
        create_entity_and_snapshot(&api, &store, &mut session, &cwd).await?;
    }
    if session.state() == SessionState::Archived {
        open_upload_session(&api, &store, &mut session, config).await?;
    }
    transfer(&api, &store, &mut session, config).await?;
    finish_unpacking(&api, &store, &mut session).await
}

/// `EMPTY → ARCHIVED`: create the entity, then snapshot the directory.
///
/// The archive path is derived from the entity id, so a crash anywhere
/// after the snapshot finds the same archive and never recompresses.
async fn create_entity_and_snapshot(
    api: &ApiClient,
    store: &SessionStore,
    session: &mut UploadSession,
    cwd: &Path,
) -> Result<(), CliError> {
    session.version += 1;
    store.save(session)?;

    let name = data_name(session);
    info!(name = %name, "creating data entity");
    let entity_id = api
        .create_entity(&EntityRequest::gzip(&name, session.version))
        .await?;
    session.entity_id = Some(entity_id.clone());
    store.save(session)?;

    let rules = RuleSet::load(cwd)?;
    let archive_path = session_archive_path(&entity_id);
    info!("compressing data...");
    let snapshot = build_snapshot(cwd.to_path_buf(), rules, archive_path.clone()).await?;
    info!(
        files = snapshot.file_count,
        size = %HumanBytes(snapshot.total_bytes),
        "snapshot ready"
    );

    session.archive_path = Some(archive_path);
    session.archive_checksum = Some(snapshot.checksum);
    store.save(session)?;
    Ok(())
}

/// Runs the blocking snapshot build, honoring operator interrupt: on
/// ctrl-c the partial archive directory is removed before the process
/// exits.
async fn build_snapshot(
    cwd: PathBuf,
    rules: RuleSet,
    archive_path: PathBuf,
) -> Result<Snapshot, CliError> {
    let build = tokio::task::spawn_blocking({
        let archive_path = archive_path.clone();
        move || datalift_archive::build(&cwd, &rules, &archive_path)
    });

    tokio::select! {
        result = build => result
            .map_err(|e| CliError::Io(std::io::Error::other(e)))?
            .map_err(CliError::from),
        _ = tokio::signal::ctrl_c() => {
            warn!("interrupted, removing partial archive");
            purge_archive_dir(&archive_path);
            std::process::exit(130);
        }
    }
}

/// `ARCHIVED → TRANSFERRING`: fetch credentials and create the remote
/// upload session; its endpoint handle is the resumption key.
async fn open_upload_session(
    api: &ApiClient,
    store: &SessionStore,
    session: &mut UploadSession,
    config: &Config,
) -> Result<(), CliError> {
    let entity_id = require(session.entity_id.clone(), "an entity id")?;
    let archive_path = require(session.archive_path.clone(), "an archive path")?;

    let creds = match api.upload_credentials(&entity_id).await {
        Ok(creds) => creds,
        Err(e) => return Err(fail(e.into(), store, session, &archive_path)),
    };

    let transport = HttpTransport::new(&config.upload_url)?;
    let client = UploadClient::new(&transport);
    let endpoint = match client
        .initialize(&archive_path, &creds.upload_id, &tus_credentials(&creds))
        .await
    {
        Ok(endpoint) => endpoint,
        Err(e) => return Err(fail(e.into(), store, session, &archive_path)),
    };

    session.endpoint = Some(endpoint);
    store.save(session)?;
    Ok(())
}

/// `TRANSFERRING → UNPACKING`: drain the archive through the chunk loop,
/// then persist the server-assigned resource id before deleting the
/// local archive.
async fn transfer(
    api: &ApiClient,
    store: &SessionStore,
    session: &mut UploadSession,
    config: &Config,
) -> Result<(), CliError> {
    let entity_id = require(session.entity_id.clone(), "an entity id")?;
    let archive_path = require(session.archive_path.clone(), "an archive path")?;
    let endpoint = require(session.endpoint.clone(), "an upload endpoint")?;

    // Credentials are scoped to one session; fetch fresh ones per attempt.
    let creds = match api.upload_credentials(&entity_id).await {
        Ok(creds) => creds,
        Err(e) => return Err(fail(e.into(), store, session, &archive_path)),
    };

    let total = std::fs::metadata(&archive_path)?.len();
    info!(size = %HumanBytes(total), "uploading compressed data");

    let bar = transfer_bar(total);
    let transport = HttpTransport::new(&config.upload_url)?;
    let client = UploadClient::new(&transport);
    let result = client
        .resume(
            &archive_path,
            &endpoint,
            &tus_credentials(&creds),
            |sent, _total| bar.set_position(sent),
        )
        .await;

    match result {
        Ok(()) => bar.finish_and_clear(),
        Err(e) => {
            bar.abandon();
            return Err(fail(e.into(), store, session, &archive_path));
        }
    }

    let entity = match api.get_entity(&entity_id).await {
        Ok(entity) => entity,
        Err(e) => return Err(fail(e.into(), store, session, &archive_path)),
    };
    let resource_id = entity.resource_id.ok_or_else(|| {
        ApiError::Malformed("entity has no resource id after transfer".into())
    })?;

    // Persist completion first; only then is the local archive expendable.
    session.resource_id = Some(resource_id);
    session.archive_path = None;
    session.archive_checksum = None;
    session.endpoint = None;
    store.save(session)?;
    purge_archive_dir(&archive_path);

    info!("upload finished");
    Ok(())
}

/// `UNPACKING → EMPTY`: poll until the server finishes unpacking.
///
/// A poll timeout is not an upload failure: the bytes are durable
/// server-side, so the session is kept for `datalift status` to re-check.
async fn finish_unpacking(
    api: &ApiClient,
    store: &SessionStore,
    session: &mut UploadSession,
) -> Result<(), CliError> {
    let resource_id = require(session.resource_id.clone(), "a resource id")?;

    info!("waiting for the server to unpack the data");
    let spinner = ProgressBar::new_spinner();
    spinner.set_message("unpacking on the server...");

    let result = api
        .wait_for_ready(&resource_id, |n| {
            spinner.set_message(format!("unpacking on the server (check {n})"));
            spinner.tick();
        })
        .await;
    spinner.finish_and_clear();

    match result {
        Ok(()) => {
            let entity_id = session.entity_id.clone();
            let name = data_name(session);
            // Back to the empty state; the init identity survives so the
            // next upload only bumps the version.
            session.reset_upload();
            store.save(session)?;

            println!("{:<14} {:<28} VERSION", "DATA ID", "NAME");
            println!(
                "{:<14} {:<28} {}",
                entity_id.as_deref().unwrap_or("-"),
                name,
                session.version
            );
            Ok(())
        }
        Err(ApiError::ReadyTimeout { retries }) => {
            warn!(retries, "server has not finished unpacking yet");
            println!("Upload finished: {}", data_name(session));
            println!("The server is still unpacking the data; check again later with `datalift status`.");
            Ok(())
        }
        Err(e) => Err(e.into()),
    }
}

/// Applies the failure policy: transient errors pass through with the
/// session untouched; permanent and local errors purge the archive and
/// empty the record, since no retry can succeed.
fn fail(
    err: CliError,
    store: &SessionStore,
    session: &mut UploadSession,
    archive_path: &Path,
) -> CliError {
    if err.is_retryable() {
        return err;
    }

    warn!("unrecoverable failure, removing the archive and clearing the pending upload");
    purge_archive_dir(archive_path);
    session.reset_upload();
    if let Err(e) = store.save(session) {
        warn!(error = %e, "failed to clear the session record");
    }
    err
}

fn abort_previous_upload(
    store: &SessionStore,
    session: &mut UploadSession,
) -> Result<(), CliError> {
    info!("aborting the previous upload");
    if let Some(path) = &session.archive_path {
        purge_archive_dir(path);
    }
    session.reset_upload();
    store.save(session)?;
    Ok(())
}

fn confirm_resume() -> Result<bool, CliError> {
    eprint!("An unfinished upload exists. Resume it? [y/N] ");
    std::io::stderr().flush()?;
    let mut line = String::new();
    std::io::stdin().read_line(&mut line)?;
    Ok(parse_confirmation(&line))
}

fn parse_confirmation(line: &str) -> bool {
    matches!(line.trim().to_ascii_lowercase().as_str(), "y" | "yes")
}

fn tus_credentials(creds: &UploadCredentials) -> Credentials {
    Credentials {
        upload_id: creds.upload_id.clone(),
        token: creds.token.clone(),
    }
}

fn require<T>(field: Option<T>, what: &str) -> Result<T, CliError> {
    field.ok_or_else(|| CliError::Usage(format!("session record is missing {what}")))
}

fn transfer_bar(total: u64) -> ProgressBar {
    let bar = ProgressBar::new(total);
    bar.set_style(
        ProgressStyle::with_template("{bar:40} {bytes}/{total_bytes} ({bytes_per_sec}, eta {eta})")
            .unwrap()
            .progress_chars("=> "),
    );
    bar
}

#[cfg(test)]
mod tests {
    use super::*;
    use datalift_transfer::TransferError;

    #[test]
    fn confirmation_accepts_yes_variants_only() {
        assert!(parse_confirmation("y\n"));
        assert!(parse_confirmation("  YES \n"));
        assert!(!parse_confirmation("\n"));
        assert!(!parse_confirmation("n\n"));
        assert!(!parse_confirmation("yep\n"));
    }

    fn pending_session(dir: &Path) -> (SessionStore, UploadSession, PathBuf) {
        let store = SessionStore::in_dir(dir);
        let archive_dir = dir.join("datalift-ent");
        std::fs::create_dir_all(&archive_dir).unwrap();
        let archive_path = archive_dir.join("ent.data.tar.gz");
        std::fs::write(&archive_path, b"gz").unwrap();

        let mut session = UploadSession::new("mnist", None, "fam");
        session.version = 1;
        session.entity_id = Some("ent".into());
        session.archive_path = Some(archive_path.clone());
        session.endpoint = Some("https://up.example/u/1".into());
        store.save(&session).unwrap();
        (store, session, archive_path)
    }

    #[test]
    fn transient_failure_preserves_session_and_archive() {
        let dir = tempfile::tempdir().unwrap();
        let (store, mut session, archive_path) = pending_session(dir.path());

        let err = fail(
            CliError::Transfer(TransferError::Locked),
            &store,
            &mut session,
            &archive_path,
        );
        assert!(err.is_retryable());
        assert!(archive_path.exists());

        let reloaded = store.load().unwrap();
        assert_eq!(reloaded.state(), SessionState::Transferring);
        assert_eq!(reloaded.endpoint.as_deref(), Some("https://up.example/u/1"));
    }

    #[test]
    fn permanent_failure_purges_archive_and_empties_record() {
        let dir = tempfile::tempdir().unwrap();
        let (store, mut session, archive_path) = pending_session(dir.path());

        let err = fail(
            CliError::Transfer(TransferError::TooLarge),
            &store,
            &mut session,
            &archive_path,
        );
        assert!(!err.is_retryable());
        assert!(!archive_path.exists());

        let reloaded = store.load().unwrap();
        assert_eq!(reloaded.state(), SessionState::Empty);
        assert!(reloaded.is_initialized());
        assert_eq!(reloaded.version, 1);
    }

    #[test]
    fn abort_removes_archive_but_keeps_identity() {
        let dir = tempfile::tempdir().unwrap();
        let (store, mut session, archive_path) = pending_session(dir.path());

        abort_previous_upload(&store, &mut session).unwrap();
        assert!(!archive_path.exists());

        let reloaded = store.load().unwrap();
        assert_eq!(reloaded.state(), SessionState::Empty);
        assert_eq!(reloaded.name, "mnist");
        assert_eq!(reloaded.family_id, "fam");
    }
}
