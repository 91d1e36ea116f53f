//! CLI command implementations

mod compose;
mod daemon;
mod lifecycle;

pub use compose::*;
pub use daemon::*;
pub use lifecycle::*;
