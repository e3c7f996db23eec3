//! ComfyUI tool server.
//!
//! Exposes ComfyUI workflow submission, template generation, queue and
//! history inspection, model discovery and a workflow library as tools
//! over JSON-RPC on stdio.

pub mod config;
pub mod error;
pub mod rpc;
pub mod state;
pub mod tools;
