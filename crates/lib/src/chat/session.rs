//! Chat session: an append-only transcript driven by one round-trip per user turn.
//!
//! Only one round-trip is outstanding at a time (`is_busy`), so turns always land in
//! the order their sends were issued: greeting, then (user, assistant) pairs.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;

use crate::config::ClientConfig;
use crate::state::StateCell;
use crate::transport::{ChatTransport, TransportError};

use super::answer;
use super::turn::ChatTurn;

/// Owner of one transcript. Clones share the same transcript and busy flag.
#[derive(Clone)]
pub struct ChatSession {
    transcript: StateCell<Vec<ChatTurn>>,
    busy: StateCell<bool>,
    input: StateCell<String>,
    transport: Arc<dyn ChatTransport>,
    timeout: Duration,
    answer_fields: Arc<Vec<String>>,
}

/// Clears the busy flag when the round-trip finishes, whichever way it finishes.
struct BusyGuard(StateCell<bool>);

impl Drop for BusyGuard {
    fn drop(&mut self) {
        self.0.set(false);
    }
}

impl ChatSession {
    /// New session whose transcript starts with the configured greeting.
    pub fn new(transport: Arc<dyn ChatTransport>, config: &ClientConfig) -> Self {
        Self {
            transcript: StateCell::new(vec![ChatTurn::assistant(config.greeting.clone())]),
            busy: StateCell::new(false),
            input: StateCell::default(),
            transport,
            timeout: config.chat_timeout(),
            answer_fields: Arc::new(config.answer_fields.clone()),
        }
    }

    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn transcript(&self) -> Vec<ChatTurn> {
        self.transcript.get()
    }

    pub fn subscribe(&self) -> watch::Receiver<Vec<ChatTurn>> {
        self.transcript.subscribe()
    }

    pub fn is_busy(&self) -> bool {
        self.busy.get()
    }

    pub fn subscribe_busy(&self) -> watch::Receiver<bool> {
        self.busy.subscribe()
    }

    pub fn input(&self) -> String {
        self.input.get()
    }

    pub fn set_input(&self, text: impl Into<String>) {
        self.input.set(text.into());
    }

    /// Send whatever is in the input buffer.
    pub async fn send_input(&self) -> Option<ChatTurn> {
        let text = self.input();
        self.send(&text).await
    }

    /// Run one turn: append the user turn, ask the backend, append exactly one assistant turn.
    ///
    /// Returns the assistant turn, or None when nothing happened (blank text or a turn
    /// already in flight). Failures become assistant turns carrying an error message.
    /// The round-trip runs on its own task, so dropping this future before it resolves
    /// still yields the assistant turn and clears the busy flag.
    pub async fn send(&self, text: &str) -> Option<ChatTurn> {
        let query = text.trim();
        if query.is_empty() {
            return None;
        }
        let acquired = self.busy.modify(|busy| {
            if *busy {
                false
            } else {
                *busy = true;
                true
            }
        });
        if !acquired {
            log::debug!("chat turn already in flight, ignoring send");
            return None;
        }
        let busy = BusyGuard(self.busy.clone());

        self.append(ChatTurn::user(query));
        self.input.set(String::new());

        let this = self.clone();
        let query = query.to_string();
        let round_trip = tokio::spawn(async move {
            let _busy = busy;
            let turn = this.ask(&query).await;
            this.append(turn.clone());
            turn
        });
        match round_trip.await {
            Ok(turn) => Some(turn),
            Err(e) => {
                log::error!("chat round-trip task failed: {}", e);
                None
            }
        }
    }

    async fn ask(&self, query: &str) -> ChatTurn {
        let outcome = tokio::time::timeout(self.timeout, self.transport.ask(query))
            .await
            .unwrap_or(Err(TransportError::Timeout(self.timeout)));

        match outcome {
            Ok(reply) if reply.is_success() => {
                ChatTurn::assistant(answer::answer_text(&reply.data, &self.answer_fields))
                    .with_sources(answer::sources(&reply.data))
            }
            Ok(reply) => {
                let message = format!("Request failed with status code {}", reply.status);
                log::warn!("chat round-trip failed: {}", message);
                ChatTurn::assistant(answer::failure_text(Some(&reply.data), Some(&message)))
            }
            Err(e) => {
                log::warn!("chat round-trip failed: {}", e);
                ChatTurn::assistant(answer::failure_text(None, Some(&e.to_string())))
            }
        }
    }

    fn append(&self, turn: ChatTurn) {
        self.transcript.modify(|turns| {
            turns.push(turn);
            true
        });
    }
}
