//! REST collaborator client and remote readiness poller.
//!
//! Thin request/response wrappers around the platform API — entity
//! creation, per-session upload credentials, resource status — plus the
//! bounded polling loop that waits for server-side unpacking to finish.
//! No resumption state lives here.

mod client;
mod poller;

pub use client::{ApiClient, Entity, EntityRequest, Resource, ResourceState, UploadCredentials};
pub use poller::{PollSchedule, await_ready};

/// Errors from the platform API.
#[derive(Debug, thiserror::Error)]
pub enum ApiError {
    #[error("bad request: {0}")]
    BadRequest(String),

    #[error("authentication failed, check your access token")]
    Authentication,

    #[error("not authorized for this operation")]
    Authorization,

    #[error("not found")]
    NotFound,

    #[error("resource is locked, try again later")]
    Locked,

    #[error("over plan limit: {0}")]
    OverLimit(String),

    #[error("bad gateway")]
    BadGateway,

    #[error("gateway timeout")]
    GatewayTimeout,

    #[error("server error: {0}")]
    Server(String),

    #[error("unexpected status {0}")]
    Unexpected(u16),

    #[error("transport failure: {0}")]
    Transport(String),

    #[error("malformed response: {0}")]
    Malformed(String),

    #[error("server did not finish unpacking after {retries} checks")]
    ReadyTimeout { retries: u32 },
}

impl ApiError {
    /// Returns `true` if the operation may succeed on retry with
    /// everything preserved as-is.
    pub fn is_transient(&self) -> bool {
        matches!(
            self,
            ApiError::Locked
                | ApiError::BadGateway
                | ApiError::GatewayTimeout
                | ApiError::Server(_)
                | ApiError::Transport(_)
                | ApiError::Malformed(_)
        )
    }
}

/// Supplies bearer credentials for API calls.
///
/// Token management (login flows, refresh) lives outside this crate.
pub trait TokenProvider: Send + Sync {
    /// Returns the bearer token, or `None` when not logged in.
    fn bearer(&self) -> Option<String>;
}

/// A fixed token, typically read from the environment or a config file.
pub struct StaticToken(Option<String>);

impl StaticToken {
    pub fn new(token: Option<String>) -> Self {
        Self(token)
    }
}

impl TokenProvider for StaticToken {
    fn bearer(&self) -> Option<String> {
        self.0.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(ApiError::Locked.is_transient());
        assert!(ApiError::BadGateway.is_transient());
        assert!(ApiError::Transport("refused".into()).is_transient());

        assert!(!ApiError::Authentication.is_transient());
        assert!(!ApiError::NotFound.is_transient());
        assert!(!ApiError::OverLimit("storage".into()).is_transient());
        assert!(!ApiError::ReadyTimeout { retries: 60 }.is_transient());
    }

    #[test]
    fn static_token_round_trips() {
        assert_eq!(
            StaticToken::new(Some("t0k".into())).bearer().as_deref(),
            Some("t0k")
        );
        assert!(StaticToken::new(None).bearer().is_none());
    }
}
