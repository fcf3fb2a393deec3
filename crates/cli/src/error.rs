//! CLI failure type and exit-code policy.
//!
//! Exit codes: 0 success, 1 fatal, 2 retryable (session preserved).

use datalift_api::ApiError;
use datalift_archive::ArchiveError;
use datalift_ignore::RuleError;
use datalift_session::SessionError;
use datalift_transfer::TransferError;

#[derive(Debug, thiserror::Error)]
pub enum CliError {
    #[error(transparent)]
    Session(#[from] SessionError),

    #[error(transparent)]
    Rules(#[from] RuleError),

    #[error(transparent)]
    Archive(#[from] ArchiveError),

    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error(transparent)]
    Api(#[from] ApiError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("{0}")]
    Usage(String),
}

impl CliError {
    /// Retryable failures preserved the session; re-running with
    /// `--resume` continues where the server left off.
    pub fn is_retryable(&self) -> bool {
        match self {
            CliError::Transfer(e) => e.is_transient(),
            CliError::Api(e) => e.is_transient(),
            _ => false,
        }
    }

    pub fn exit_code(&self) -> i32 {
        if self.is_retryable() { 2 } else { 1 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_failures_exit_two() {
        let e = CliError::Transfer(TransferError::Locked);
        assert!(e.is_retryable());
        assert_eq!(e.exit_code(), 2);

        let e = CliError::Api(ApiError::BadGateway);
        assert!(e.is_retryable());
        assert_eq!(e.exit_code(), 2);
    }

    #[test]
    fn fatal_failures_exit_one() {
        let e = CliError::Transfer(TransferError::TooLarge);
        assert!(!e.is_retryable());
        assert_eq!(e.exit_code(), 1);

        let e = CliError::Usage("run `datalift init` first".into());
        assert_eq!(e.exit_code(), 1);

        let e = CliError::Api(ApiError::Authentication);
        assert_eq!(e.exit_code(), 1);
    }
}
