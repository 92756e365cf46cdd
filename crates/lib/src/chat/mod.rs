//! Chat turn orchestration: transcript, busy flag, answer extraction.

pub mod answer;
mod session;
mod turn;

pub use session::ChatSession;
pub use turn::{ChatTurn, Role};
