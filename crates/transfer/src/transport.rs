//! Transport seam for the upload protocol.
//!
//! `UploadTransport` is the narrow interface the transfer loop drives.
//! Using a trait keeps the loop decoupled from HTTP and testable with
//! in-memory mocks; `HttpTransport` is the production implementation.

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use base64::{Engine, engine::general_purpose::STANDARD};
use tracing::debug;

use crate::{PROTOCOL_VERSION, TransferError};

/// Per-session upload credentials issued by the collaborator API.
#[derive(Debug, Clone)]
pub struct Credentials {
    /// Server-side name of this upload resource.
    pub upload_id: String,
    /// Secret scoped to this one session.
    pub token: String,
}

/// Wire operations of the resumable upload protocol.
pub trait UploadTransport: Send + Sync {
    /// Creates an upload session for `total_bytes` of data and returns the
    /// opaque endpoint handle all later calls address.
    fn create(
        &self,
        total_bytes: u64,
        metadata: &[(String, String)],
        creds: &Credentials,
    ) -> Pin<Box<dyn Future<Output = Result<String, TransferError>> + Send + '_>>;

    /// Queries the server's authoritative byte offset for `endpoint`.
    fn offset(
        &self,
        endpoint: &str,
        creds: &Credentials,
    ) -> Pin<Box<dyn Future<Output = Result<u64, TransferError>> + Send + '_>>;

    /// Transmits one chunk starting at `offset`; returns the server's new
    /// authoritative offset.
    fn write_chunk(
        &self,
        endpoint: &str,
        offset: u64,
        data: Vec<u8>,
        creds: &Credentials,
    ) -> Pin<Box<dyn Future<Output = Result<u64, TransferError>> + Send + '_>>;
}

/// HTTP implementation of [`UploadTransport`].
pub struct HttpTransport {
    http: reqwest::Client,
    create_url: String,
}

/// Bound on every request; chunk PATCHes move multiple megabytes.
const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

impl HttpTransport {
    /// Creates a transport posting new sessions to `create_url`.
    pub fn new(create_url: &str) -> Result<Self, TransferError> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| TransferError::Transport(e.to_string()))?;
        Ok(Self {
            http,
            create_url: create_url.to_string(),
        })
    }

    async fn do_create(
        &self,
        total_bytes: u64,
        metadata: Vec<(String, String)>,
        creds: Credentials,
    ) -> Result<String, TransferError> {
        let mut request = self
            .http
            .post(&self.create_url)
            .basic_auth(&creds.upload_id, Some(&creds.token))
            .header("Tus-Resumable", PROTOCOL_VERSION)
            .header("Upload-Length", total_bytes.to_string());

        if !metadata.is_empty() {
            let pairs: Vec<String> = metadata
                .iter()
                .map(|(k, v)| format!("{k} {}", STANDARD.encode(v)))
                .collect();
            request = request.header("Upload-Metadata", pairs.join(","));
        }

        let response = request
            .send()
            .await
            .map_err(|e| TransferError::Transport(e.to_string()))?;
        check_status(&response)?;

        let location = response
            .headers()
            .get("Location")
            .and_then(|v| v.to_str().ok())
            .ok_or_else(|| TransferError::Malformed("missing Location header".into()))?
            .to_string();

        debug!(endpoint = %location, total_bytes, "upload session created");
        Ok(location)
    }

    async fn do_offset(&self, endpoint: String, creds: Credentials) -> Result<u64, TransferError> {
        let response = self
            .http
            .head(&endpoint)
            .basic_auth(&creds.upload_id, Some(&creds.token))
            .header("Tus-Resumable", PROTOCOL_VERSION)
            .send()
            .await
            .map_err(|e| TransferError::Transport(e.to_string()))?;
        check_status(&response)?;

        let offset = parse_offset(&response)?;
        debug!(endpoint = %endpoint, offset, "queried authoritative offset");
        Ok(offset)
    }

    async fn do_write_chunk(
        &self,
        endpoint: String,
        offset: u64,
        data: Vec<u8>,
        creds: Credentials,
    ) -> Result<u64, TransferError> {
        let len = data.len();
        let response = self
            .http
            .patch(&endpoint)
            .basic_auth(&creds.upload_id, Some(&creds.token))
            .header("Tus-Resumable", PROTOCOL_VERSION)
            .header("Upload-Offset", offset.to_string())
            .header("Content-Type", "application/offset+octet-stream")
            .body(data)
            .send()
            .await
            .map_err(|e| TransferError::Transport(e.to_string()))?;
        check_status(&response)?;

        let new_offset = parse_offset(&response)?;
        debug!(offset, len, new_offset, "chunk acknowledged");
        Ok(new_offset)
    }
}

impl UploadTransport for HttpTransport {
    fn create(
        &self,
        total_bytes: u64,
        metadata: &[(String, String)],
        creds: &Credentials,
    ) -> Pin<Box<dyn Future<Output = Result<String, TransferError>> + Send + '_>> {
        let metadata = metadata.to_vec();
        let creds = creds.clone();
        Box::pin(self.do_create(total_bytes, metadata, creds))
    }

    fn offset(
        &self,
        endpoint: &str,
        creds: &Credentials,
    ) -> Pin<Box<dyn Future<Output = Result<u64, TransferError>> + Send + '_>> {
        Box::pin(self.do_offset(endpoint.to_string(), creds.clone()))
    }

    fn write_chunk(
        &self,
        endpoint: &str,
        offset: u64,
        data: Vec<u8>,
        creds: &Credentials,
    ) -> Pin<Box<dyn Future<Output = Result<u64, TransferError>> + Send + '_>> {
        Box::pin(self.do_write_chunk(endpoint.to_string(), offset, data, creds.clone()))
    }
}

fn check_status(response: &reqwest::Response) -> Result<(), TransferError> {
    let status = response.status();
    if status.is_success() {
        return Ok(());
    }
    match status.as_u16() {
        423 => Err(TransferError::Locked),
        413 => Err(TransferError::TooLarge),
        s => Err(TransferError::Rejected { status: s }),
    }
}

fn parse_offset(response: &reqwest::Response) -> Result<u64, TransferError> {
    response
        .headers()
        .get("Upload-Offset")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.parse::<u64>().ok())
        .ok_or_else(|| TransferError::Malformed("missing or unparseable Upload-Offset".into()))
}
