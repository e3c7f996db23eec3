//! Workflow graph transformation engine for ComfyUI.
//!
//! Parses node-graph workflows, classifies nodes by role, applies sparse
//! parameter overrides (including LoRA chain rebuilding) and builds complete
//! workflows from named templates. Everything in this crate is synchronous;
//! file staging is delegated to an [`upload::ImageStager`] implementation.

pub mod classify;
pub mod config;
pub mod error;
pub mod graph;
pub mod overrides;
pub mod resolve;
pub mod templates;
pub mod upload;
pub mod validation;
