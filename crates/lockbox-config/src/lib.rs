//! Configuration parsing for lockbox
//!
//! This crate handles parsing of:
//! - Install-root configuration (`config.toml`)
//! - Instruction files (`app.lbox` / `lbox`)
//! - Project manifests (`lockbox-create.yml`)

mod error;
mod global;
mod instructions;
mod manifest;

pub use error::*;
pub use global::*;
pub use instructions::*;
pub use manifest::*;
