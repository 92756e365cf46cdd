//! Upload lifecycle: per-file tasks with progress, retry, and failure isolation.

mod manager;
mod task;

pub use manager::UploadManager;
pub use task::{validate_transition, FileHandle, TaskId, TransitionError, UploadStatus, UploadTask};
