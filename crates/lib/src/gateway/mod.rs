//! Gateway: HTTP forwarding layer between clients and the backend service.
//!
//! Exposes `/api/chat` and `/api/upload`, forwards them to `{serverUrl}{apiPrefix}` with a
//! whitelisted set of inbound headers, and relays the backend's status and body.

mod backend;
mod headers;
mod server;

pub use backend::{BackendResponse, FormField, GatewayError, ServerApi};
pub use headers::forward_headers;
pub use server::{router, run_gateway, GatewayState};
