//! Core runtime logic for lockbox
//!
//! This crate provides:
//! - Image building from instruction streams (`engine::build`)
//! - Container supervision and restart policy enforcement (`engine::supervisor`)
//! - Host-to-container TCP port forwarding (`engine::fabric`)
//! - Host init system registration (`engine::service`)
//! - Compose-style multi-service orchestration (`engine::compose`)
//! - Auto-update drift detection (`engine::monitor`)
//! - Persisted container state (`state`)

pub mod engine;
mod error;
mod process;
mod state;

pub use error::*;
pub use process::spawn_daemon;
pub use state::*;
