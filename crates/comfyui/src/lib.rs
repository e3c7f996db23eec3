//! ComfyUI WebSocket and REST client library.
//!
//! Provides the HTTP API wrapper used to submit workflows and inspect the
//! queue and history, typed WebSocket message parsing, and a completion
//! watcher that follows a prompt over the WebSocket stream.

pub mod api;
pub mod client;
pub mod messages;
pub mod watch;
