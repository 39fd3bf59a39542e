//! HTTP server.
//!
//! - [`api`]: routes, CORS decoration and handlers
//! - [`streaming`]: SSE framing of relay events

pub mod api;
pub mod streaming;
