//! Runtime engine: image builds, container supervision, port forwarding,
//! host service registration, compose orchestration, and update monitoring.

pub mod build;
pub mod compose;
pub mod fabric;
pub mod monitor;
pub mod service;
pub mod supervisor;

pub use build::{resolve_image_archive, ImageBuilder, ImageMetadata};
pub use compose::{ComposeOrchestrator, RecreatePolicy, RemoveImages, UpOptions};
pub use fabric::PortForwardingFabric;
pub use supervisor::Supervisor;
