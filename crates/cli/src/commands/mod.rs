//! Command implementations.

pub mod init;
pub mod status;
pub mod upload;

use datalift_session::UploadSession;

/// The dataset's qualified display name for one upload version,
/// `namespace/name:version` or `name:version`.
pub(crate) fn data_name(session: &UploadSession) -> String {
    match &session.namespace {
        Some(ns) => format!("{ns}/{}:{}", session.name, session.version),
        None => format!("{}:{}", session.name, session.version),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn data_name_includes_namespace_and_version() {
        let mut session = UploadSession::new("mnist", Some("alice".into()), "fam");
        session.version = 4;
        assert_eq!(data_name(&session), "alice/mnist:4");

        session.namespace = None;
        assert_eq!(data_name(&session), "mnist:4");
    }
}
