//! Upload task model and its status state machine.
//!
//! Uploading -> Success (terminal)
//! Uploading -> Error -> Uploading (explicit retry)

use bytes::Bytes;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use uuid::Uuid;

use crate::formats;

pub type TaskId = Uuid;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum UploadStatus {
    Uploading,
    Success,
    Error,
}

impl fmt::Display for UploadStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            UploadStatus::Uploading => "uploading",
            UploadStatus::Success => "success",
            UploadStatus::Error => "error",
        };
        f.pad(s)
    }
}

#[derive(Debug, thiserror::Error)]
#[error("invalid upload transition: {0} -> {1}")]
pub struct TransitionError(pub UploadStatus, pub UploadStatus);

/// Validate that a status transition is allowed.
pub fn validate_transition(from: UploadStatus, to: UploadStatus) -> Result<(), TransitionError> {
    let valid = matches!(
        (from, to),
        (UploadStatus::Uploading, UploadStatus::Success)
            | (UploadStatus::Uploading, UploadStatus::Error)
            | (UploadStatus::Error, UploadStatus::Uploading)
    );

    if valid {
        Ok(())
    } else {
        Err(TransitionError(from, to))
    }
}

/// A file selected for upload: name, declared MIME type, and contents.
#[derive(Clone)]
pub struct FileHandle {
    pub name: String,
    pub mime_type: String,
    pub bytes: Bytes,
}

impl fmt::Debug for FileHandle {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileHandle")
            .field("name", &self.name)
            .field("mime_type", &self.mime_type)
            .field("len", &self.bytes.len())
            .finish()
    }
}

impl FileHandle {
    pub fn new(name: impl Into<String>, mime_type: impl Into<String>, bytes: impl Into<Bytes>) -> Self {
        Self {
            name: name.into(),
            mime_type: mime_type.into(),
            bytes: bytes.into(),
        }
    }

    /// Read a file from disk. The MIME type comes from the extension; unknown extensions get
    /// `application/octet-stream` (and will be rejected at submission).
    pub async fn from_path(path: &Path) -> std::io::Result<Self> {
        let bytes = tokio::fs::read(path).await?;
        let name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_else(|| path.display().to_string());
        let mime_type = formats::mime_for_path(path).unwrap_or("application/octet-stream");
        Ok(Self::new(name, mime_type, bytes))
    }

    pub fn size(&self) -> u64 {
        self.bytes.len() as u64
    }
}

/// One tracked upload attempt for a single file.
#[derive(Debug, Clone, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadTask {
    pub id: TaskId,
    pub name: String,
    pub size: u64,
    pub mime_type: String,
    pub created_at: DateTime<Utc>,
    pub status: UploadStatus,
    /// 0-100; meaningful while uploading, frozen at its last value on error.
    pub progress: u8,
    /// Retained for retry; released once the upload succeeds.
    #[serde(skip)]
    pub(crate) file: Option<FileHandle>,
    /// Incremented each time a transfer starts; results from older attempts are discarded.
    #[serde(skip)]
    pub(crate) attempt: u32,
    #[serde(skip)]
    pub(crate) in_flight: bool,
}

impl UploadTask {
    pub(crate) fn new(file: FileHandle) -> Self {
        Self {
            id: Uuid::new_v4(),
            name: file.name.clone(),
            size: file.size(),
            mime_type: file.mime_type.clone(),
            created_at: Utc::now(),
            status: UploadStatus::Uploading,
            progress: 0,
            file: Some(file),
            attempt: 0,
            in_flight: false,
        }
    }

    /// True while the original payload is still held (required for retry).
    pub fn has_payload(&self) -> bool {
        self.file.is_some()
    }

    pub(crate) fn transition(&mut self, to: UploadStatus) -> Result<(), TransitionError> {
        validate_transition(self.status, to)?;
        self.status = to;
        Ok(())
    }
}
