//! HTTP client for the gateway's client-facing API (`/api/upload`, `/api/chat`).
//! Implements both transport traits; statuses are returned, never turned into errors.

use async_trait::async_trait;
use bytes::Bytes;
use futures_util::stream;
use reqwest::multipart::{Form, Part};
use serde::Serialize;

use crate::transport::{ApiReply, ChatTransport, TransportError, UploadProgress, UploadTransport};
use crate::upload::FileHandle;

const DEFAULT_BASE_URL: &str = "http://127.0.0.1:3000";

/// Upload bodies are streamed in chunks of this size; one progress event per chunk.
const UPLOAD_CHUNK_SIZE: usize = 64 * 1024;

/// Client for the gateway HTTP API.
#[derive(Clone)]
pub struct ApiClient {
    base_url: String,
    client: reqwest::Client,
}

#[derive(Debug, Serialize)]
struct ChatRequest<'a> {
    query: &'a str,
}

impl ApiClient {
    pub fn new(base_url: Option<String>) -> Self {
        let base_url = base_url
            .map(|u| u.trim_end_matches('/').to_string())
            .unwrap_or_else(|| DEFAULT_BASE_URL.to_string());
        Self {
            base_url,
            client: reqwest::Client::new(),
        }
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    /// POST /api/chat with `{ "query": ... }`.
    pub async fn chat(&self, query: &str) -> Result<ApiReply, TransportError> {
        let url = format!("{}/api/chat", self.base_url);
        let res = self
            .client
            .post(&url)
            .json(&ChatRequest { query })
            .send()
            .await
            .map_err(classify)?;
        read_reply(res).await
    }

    /// POST /api/upload with a single `file` part. `on_progress` is called as body chunks are sent.
    pub async fn upload(
        &self,
        file: &FileHandle,
        on_progress: &mut (dyn FnMut(UploadProgress) + Send),
    ) -> Result<ApiReply, TransportError> {
        let url = format!("{}/api/upload", self.base_url);
        let total = file.size();
        let (sent_tx, mut sent_rx) = tokio::sync::mpsc::unbounded_channel::<u64>();

        let chunks = chunk(&file.bytes, UPLOAD_CHUNK_SIZE);
        let body = reqwest::Body::wrap_stream(stream::iter(chunks.into_iter().map(move |c| {
            let _ = sent_tx.send(c.len() as u64);
            Ok::<Bytes, std::io::Error>(c)
        })));
        let part = Part::stream_with_length(body, total)
            .file_name(file.name.clone())
            .mime_str(&file.mime_type)?;
        let form = Form::new().part("file", part);

        let send = self.client.post(&url).multipart(form).send();
        tokio::pin!(send);

        let mut loaded = 0u64;
        let res = loop {
            tokio::select! {
                res = &mut send => break res,
                Some(n) = sent_rx.recv() => {
                    loaded += n;
                    on_progress(UploadProgress { loaded, total: Some(total) });
                }
            }
        };
        while let Ok(n) = sent_rx.try_recv() {
            loaded += n;
            on_progress(UploadProgress { loaded, total: Some(total) });
        }

        read_reply(res.map_err(classify)?).await
    }
}

#[async_trait]
impl UploadTransport for ApiClient {
    async fn upload(
        &self,
        file: &FileHandle,
        on_progress: &mut (dyn FnMut(UploadProgress) + Send),
    ) -> Result<ApiReply, TransportError> {
        ApiClient::upload(self, file, on_progress).await
    }
}

#[async_trait]
impl ChatTransport for ApiClient {
    async fn ask(&self, query: &str) -> Result<ApiReply, TransportError> {
        self.chat(query).await
    }
}

/// Connection-level failures (refused, unreachable) get their own variant.
fn classify(e: reqwest::Error) -> TransportError {
    if e.is_connect() {
        TransportError::Connection(e.to_string())
    } else {
        TransportError::Request(e)
    }
}

/// Split into zero-copy slices of at most `size` bytes.
fn chunk(bytes: &Bytes, size: usize) -> Vec<Bytes> {
    (0..bytes.len())
        .step_by(size)
        .map(|start| bytes.slice(start..(start + size).min(bytes.len())))
        .collect()
}

/// Status plus body decoded as JSON; empty bodies become Null, non-JSON bodies a JSON string.
async fn read_reply(res: reqwest::Response) -> Result<ApiReply, TransportError> {
    let status = res.status().as_u16();
    let text = res.text().await?;
    Ok(ApiReply::new(status, decode_body(&text)))
}

pub(crate) fn decode_body(text: &str) -> serde_json::Value {
    if text.trim().is_empty() {
        return serde_json::Value::Null;
    }
    serde_json::from_str(text).unwrap_or_else(|_| serde_json::Value::String(text.to_string()))
}
