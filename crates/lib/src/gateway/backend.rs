//! Forwarding client for the backend retrieval service (`{serverUrl}{apiPrefix}`).
//!
//! Non-2xx responses come back as ordinary `BackendResponse`s; only transport failures are
//! errors. Nothing here retries.

use axum::http::{HeaderMap, StatusCode};
use bytes::Bytes;
use reqwest::multipart::{Form, Part};
use serde_json::Value;
use std::time::Duration;

use crate::client::decode_body;
use crate::config::{self, Config};

use super::headers::forward_headers;

#[derive(Debug, thiserror::Error)]
pub enum GatewayError {
    #[error("{0}")]
    Request(#[from] reqwest::Error),
    #[error("invalid form part {name:?}: {reason}")]
    InvalidPart { name: String, reason: String },
}

/// Backend reply relayed to the gateway's caller.
#[derive(Debug, Clone)]
pub struct BackendResponse {
    pub status: StatusCode,
    pub data: Value,
    pub headers: HeaderMap,
}

/// One field of an already-parsed inbound multipart form.
#[derive(Debug, Clone)]
pub enum FormField {
    Text {
        name: String,
        value: String,
    },
    File {
        name: String,
        file_name: Option<String>,
        content_type: Option<String>,
        bytes: Bytes,
    },
}

/// Client for the backend service.
#[derive(Clone)]
pub struct ServerApi {
    root: String,
    client: reqwest::Client,
    timeout: Duration,
}

impl ServerApi {
    pub fn new(server_url: &str, api_prefix: &str, timeout: Duration) -> Self {
        Self {
            root: config::backend_root(server_url, api_prefix),
            client: reqwest::Client::new(),
            timeout,
        }
    }

    /// Build from config; SERVER_URL env overrides `backend.serverUrl`.
    pub fn from_config(config: &Config) -> Self {
        Self::new(
            &config::resolve_server_url(config),
            &config.backend.api_prefix,
            config.backend.timeout(),
        )
    }

    /// Root every backend path is appended to (e.g. `http://localhost:5000/api/v1`).
    pub fn root(&self) -> &str {
        &self.root
    }

    fn url(&self, path: &str) -> String {
        format!("{}/{}", self.root, path.trim_start_matches('/'))
    }

    /// POST a JSON body with whitelisted inbound headers. A successful body of the form
    /// `{ "data": ... }` is unwrapped to its `data`.
    pub async fn post_json(
        &self,
        inbound: &HeaderMap,
        path: &str,
        body: &Value,
    ) -> Result<BackendResponse, GatewayError> {
        let url = self.url(path);
        log::debug!("forwarding JSON to {}", url);
        let res = self
            .client
            .post(&url)
            .headers(forward_headers(inbound))
            .timeout(self.timeout)
            .json(body)
            .send()
            .await?;
        let mut response = read_response(res).await?;
        if response.status.is_success() {
            response.data = unwrap_envelope(response.data);
        }
        Ok(response)
    }

    /// POST a multipart form rebuilt from parsed fields. File parts keep their filename,
    /// content type, and exact byte length.
    pub async fn post_form(
        &self,
        inbound: &HeaderMap,
        path: &str,
        fields: Vec<FormField>,
    ) -> Result<BackendResponse, GatewayError> {
        let url = self.url(path);
        let form = build_form(fields)?;
        log::debug!("forwarding multipart form to {}", url);
        let res = self
            .client
            .post(&url)
            .headers(forward_headers(inbound))
            .timeout(self.timeout)
            .multipart(form)
            .send()
            .await?;
        read_response(res).await
    }
}

fn build_form(fields: Vec<FormField>) -> Result<Form, GatewayError> {
    let mut form = Form::new();
    for field in fields {
        form = match field {
            FormField::Text { name, value } => form.text(name, value),
            FormField::File {
                name,
                file_name,
                content_type,
                bytes,
            } => {
                let len = bytes.len() as u64;
                let mut part = Part::stream_with_length(reqwest::Body::from(bytes), len);
                if let Some(file_name) = file_name {
                    part = part.file_name(file_name);
                }
                if let Some(ct) = content_type.filter(|ct| !ct.is_empty()) {
                    part = part.mime_str(&ct).map_err(|e| GatewayError::InvalidPart {
                        name: name.clone(),
                        reason: e.to_string(),
                    })?;
                }
                form.part(name, part)
            }
        };
    }
    Ok(form)
}

async fn read_response(res: reqwest::Response) -> Result<BackendResponse, GatewayError> {
    let status = res.status();
    let headers = res.headers().clone();
    let text = res.text().await?;
    Ok(BackendResponse {
        status,
        data: decode_body(&text),
        headers,
    })
}

fn unwrap_envelope(data: Value) -> Value {
    match data {
        Value::Object(mut map) if map.contains_key("data") => {
            map.remove("data").unwrap_or(Value::Null)
        }
        other => other,
    }
}
