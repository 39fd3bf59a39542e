//! Stream relay.
//!
//! - [`request`]: prompt decoding and client-input rejections
//! - [`session`]: the cancellable upstream pull loop

pub mod request;
pub mod session;

pub use request::{PromptRequest, RelayError};
pub use session::{Relay, RelayEvent};
