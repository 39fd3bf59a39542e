//! Upstream client adapter.
//!
//! - [`client`]: the [`GenerationBackend`] seam and its Gemini implementation
//! - [`types`]: Gemini REST request/response types

pub mod client;
pub mod types;

pub use client::{ChunkStream, GeminiClient, GenerationBackend, GenerationChunk, UpstreamError};
