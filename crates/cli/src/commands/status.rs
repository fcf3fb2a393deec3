//! `datalift status` — report the pending upload, if any.

use std::sync::Arc;

use datalift_api::{ApiClient, StaticToken};
use datalift_session::{SessionState, SessionStore};

use crate::commands::data_name;
use crate::config::Config;
use crate::error::CliError;

pub async fn run(config: &Config) -> Result<(), CliError> {
    let cwd = std::env::current_dir()?;
    let store = SessionStore::in_dir(&cwd);
    let session = store.load()?;

    if !session.is_initialized() {
        println!("This directory is not set up for uploads; run `datalift init <name>`.");
        return Ok(());
    }

    match session.state() {
        SessionState::Empty => {
            println!("{}: no upload in progress.", data_name(&session));
        }
        SessionState::Archived => {
            println!(
                "{}: snapshot ready, upload not started; run `datalift upload`.",
                data_name(&session)
            );
        }
        SessionState::Transferring => {
            println!(
                "{}: upload interrupted; resume with `datalift upload --resume`.",
                data_name(&session)
            );
        }
        SessionState::Unpacking => {
            let resource_id = session
                .resource_id
                .clone()
                .ok_or(CliError::Usage("session record is missing a resource id".into()))?;
            let api = ApiClient::new(
                &config.api_url,
                Arc::new(StaticToken::new(config.token.clone())),
            )?;
            let resource = api.get_resource(&resource_id).await?;
            if resource.state.is_ready() {
                let mut session = session.clone();
                session.reset_upload();
                store.save(&session)?;
                println!("{}: uploaded and unpacked.", data_name(&session));
            } else {
                println!(
                    "{}: uploaded; the server is still unpacking (state: {:?}).",
                    data_name(&session),
                    resource.state
                );
            }
        }
    }

    Ok(())
}
