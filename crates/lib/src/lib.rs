//! Regnav core library: upload lifecycle, chat sessions, and the HTTP gateway
//! used by the CLI.

pub mod chat;
pub mod client;
pub mod config;
pub mod formats;
pub mod gateway;
pub mod state;
pub mod transport;
pub mod upload;
