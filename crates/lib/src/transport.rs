//! Client-side transport seam: what the upload manager and chat session need from the network.
//!
//! `client::ApiClient` implements both traits over HTTP; tests substitute in-process fakes.

use async_trait::async_trait;
use std::time::Duration;

use crate::upload::FileHandle;

#[derive(Debug, thiserror::Error)]
pub enum TransportError {
    #[error("{0}")]
    Request(#[from] reqwest::Error),
    #[error("timeout of {}ms exceeded", .0.as_millis())]
    Timeout(Duration),
    #[error("{0}")]
    Connection(String),
}

/// Resolved response: status code and decoded JSON body (Null when the body was empty).
#[derive(Debug, Clone, PartialEq)]
pub struct ApiReply {
    pub status: u16,
    pub data: serde_json::Value,
}

impl ApiReply {
    pub fn new(status: u16, data: serde_json::Value) -> Self {
        Self { status, data }
    }

    pub fn is_success(&self) -> bool {
        (200..300).contains(&self.status)
    }
}

/// Byte-level progress of one outbound transfer. `total` is None when the size is unknown.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct UploadProgress {
    pub loaded: u64,
    pub total: Option<u64>,
}

impl UploadProgress {
    /// Rounded percentage, or None when the total is unknown or zero.
    pub fn percent(&self) -> Option<u8> {
        let total = self.total.filter(|t| *t > 0)?;
        let pct = (self.loaded as f64 * 100.0 / total as f64).round();
        Some(pct.clamp(0.0, 100.0) as u8)
    }
}

/// One multipart upload per call. Progress callbacks are invoked in transport order.
#[async_trait]
pub trait UploadTransport: Send + Sync {
    async fn upload(
        &self,
        file: &FileHandle,
        on_progress: &mut (dyn FnMut(UploadProgress) + Send),
    ) -> Result<ApiReply, TransportError>;
}

/// One chat round-trip per call. Non-2xx statuses resolve to `Ok`; only transport failures are `Err`.
#[async_trait]
pub trait ChatTransport: Send + Sync {
    async fn ask(&self, query: &str) -> Result<ApiReply, TransportError>;
}
