//! Filesystem collaborators for the ComfyUI installation.
//!
//! Everything here is synchronous `std::fs` code; async callers run it on
//! a blocking thread.

pub mod error;
pub mod library;
pub mod models;
pub mod outputs;
pub mod upload;

pub use error::StorageError;
