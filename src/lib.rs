//! gemini-sse-relay: a minimal HTTP gateway that forwards a prompt to the
//! Gemini streaming API and relays the generated text to the browser as
//! Server-Sent Events.
//!
//! - [`config`]: startup configuration from flags and environment
//! - [`upstream`]: Gemini client adapter
//! - [`relay`]: request validation and the cancellable relay loop
//! - [`server`]: routes, CORS decoration and SSE framing

pub mod config;
pub mod relay;
pub mod server;
pub mod upstream;
