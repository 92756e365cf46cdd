//! Upload manager: owns the task list and drives one transfer per accepted file.
//!
//! Transfers run as independent Tokio tasks. Every state change goes through the task
//! list's `StateCell`, so one task's progress or failure never touches another's entry.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::config::ClientConfig;
use crate::formats;
use crate::state::StateCell;
use crate::transport::{TransportError, UploadProgress, UploadTransport};

use super::task::{FileHandle, TaskId, UploadStatus, UploadTask};

/// Owner of the upload task list. Clones share the same tasks.
#[derive(Clone)]
pub struct UploadManager {
    tasks: StateCell<Vec<UploadTask>>,
    transport: Arc<dyn UploadTransport>,
    timeout: Duration,
}

impl UploadManager {
    pub fn new(transport: Arc<dyn UploadTransport>, timeout: Duration) -> Self {
        Self {
            tasks: StateCell::new(Vec::new()),
            transport,
            timeout,
        }
    }

    pub fn from_config(transport: Arc<dyn UploadTransport>, config: &ClientConfig) -> Self {
        Self::new(transport, config.upload_timeout())
    }

    /// Snapshot of all tasks in submission order.
    pub fn tasks(&self) -> Vec<UploadTask> {
        self.tasks.get()
    }

    pub fn task(&self, id: TaskId) -> Option<UploadTask> {
        self.tasks.with(|tasks| tasks.iter().find(|t| t.id == id).cloned())
    }

    /// Receiver notified on every task list change.
    pub fn subscribe(&self) -> watch::Receiver<Vec<UploadTask>> {
        self.tasks.subscribe()
    }

    /// Queue files for upload. Unsupported MIME types are dropped without creating a task.
    /// Tasks for accepted files exist (uploading, 0%) before this returns; their transfers
    /// are spawned on the current Tokio runtime.
    pub fn submit(&self, files: impl IntoIterator<Item = FileHandle>) -> Vec<TaskId> {
        let accepted: Vec<UploadTask> = files
            .into_iter()
            .filter(|f| {
                let ok = formats::is_supported(&f.mime_type);
                if !ok {
                    log::debug!("skipping {}: unsupported type {:?}", f.name, f.mime_type);
                }
                ok
            })
            .map(UploadTask::new)
            .collect();
        if accepted.is_empty() {
            return Vec::new();
        }

        let ids: Vec<TaskId> = accepted.iter().map(|t| t.id).collect();
        self.tasks.modify(|tasks| {
            tasks.extend(accepted);
            true
        });
        for id in &ids {
            self.spawn_transfer(*id);
        }
        ids
    }

    /// Upload the task's file once. Progress and the final status are written to that task
    /// only; if the task was removed (or a newer attempt started) meanwhile, the outcome is dropped.
    pub async fn transfer(&self, id: TaskId) {
        let Some((file, attempt)) = self.begin_attempt(id) else {
            log::debug!("upload {}: nothing to transfer", id);
            return;
        };

        let tasks = self.tasks.clone();
        let mut on_progress = move |p: UploadProgress| {
            let Some(pct) = p.percent() else { return };
            apply_to_attempt(&tasks, id, attempt, |task| {
                if task.status != UploadStatus::Uploading || pct <= task.progress {
                    return false;
                }
                task.progress = pct;
                true
            });
        };

        let result = match tokio::time::timeout(
            self.timeout,
            self.transport.upload(&file, &mut on_progress),
        )
        .await
        {
            Ok(r) => r,
            Err(_) => Err(TransportError::Timeout(self.timeout)),
        };

        let succeeded = match &result {
            Ok(reply) if reply.is_success() => true,
            Ok(reply) => {
                log::warn!("upload {} ({}) failed: status {}", id, file.name, reply.status);
                false
            }
            Err(e) => {
                log::warn!("upload {} ({}) failed: {}", id, file.name, e);
                false
            }
        };

        let applied = apply_to_attempt(&self.tasks, id, attempt, |task| {
            task.in_flight = false;
            if succeeded {
                if task.transition(UploadStatus::Success).is_ok() {
                    task.progress = 100;
                    task.file = None;
                }
            } else if let Err(e) = task.transition(UploadStatus::Error) {
                log::debug!("upload {}: {}", id, e);
            }
            true
        });
        if !applied {
            log::debug!("upload {}: task removed or superseded, result discarded", id);
        }
    }

    /// Restart a failed task from 0%. Returns false (and changes nothing) when the task is
    /// missing, not in error, or no longer holds its payload.
    pub fn retry(&self, id: TaskId) -> bool {
        let reset = self.tasks.modify(|tasks| {
            let Some(task) = tasks.iter_mut().find(|t| t.id == id) else {
                return false;
            };
            if !task.has_payload() || task.transition(UploadStatus::Uploading).is_err() {
                return false;
            }
            task.progress = 0;
            true
        });
        if reset {
            self.spawn_transfer(id);
        } else {
            log::debug!("retry ignored for upload {}", id);
        }
        reset
    }

    /// Delete a task whatever its status. An in-flight transfer keeps running; its result is discarded.
    pub fn remove(&self, id: TaskId) -> bool {
        self.tasks.modify(|tasks| {
            let before = tasks.len();
            tasks.retain(|t| t.id != id);
            tasks.len() != before
        })
    }

    /// Wait until no task is uploading.
    pub async fn settled(&self) {
        let mut rx = self.subscribe();
        let _ = rx
            .wait_for(|tasks| tasks.iter().all(|t| t.status != UploadStatus::Uploading))
            .await;
    }

    fn spawn_transfer(&self, id: TaskId) {
        let this = self.clone();
        tokio::spawn(async move {
            this.transfer(id).await;
        });
    }

    /// Claim the task for a new transfer attempt: it must be uploading, idle, and hold its payload.
    fn begin_attempt(&self, id: TaskId) -> Option<(FileHandle, u32)> {
        let mut claimed = None;
        self.tasks.modify(|tasks| {
            let Some(task) = tasks.iter_mut().find(|t| t.id == id) else {
                return false;
            };
            if task.status != UploadStatus::Uploading || task.in_flight {
                return false;
            }
            let Some(file) = task.file.clone() else {
                return false;
            };
            task.in_flight = true;
            task.attempt += 1;
            task.progress = 0;
            claimed = Some((file, task.attempt));
            true
        });
        claimed
    }
}

/// Mutate the task only if it still exists and `attempt` is its current attempt.
fn apply_to_attempt(
    tasks: &StateCell<Vec<UploadTask>>,
    id: TaskId,
    attempt: u32,
    f: impl FnOnce(&mut UploadTask) -> bool,
) -> bool {
    tasks.modify(|tasks| {
        match tasks.iter_mut().find(|t| t.id == id && t.attempt == attempt) {
            Some(task) => f(task),
            None => false,
        }
    })
}
