//! Detached-daemon respawn: re-invoke the current binary as a background
//! child so a long-lived supervisor or monitor outlives the CLI invocation
//! that created it.

use crate::Result;
use std::process::Stdio;

/// Re-exec the current binary with `args`, detached from the caller's
/// stdio, and return immediately without waiting on it.
pub fn spawn_daemon(args: &[&str]) -> Result<()> {
    let exe = std::env::current_exe()?;
    std::process::Command::new(exe)
        .args(args)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .stderr(Stdio::null())
        .spawn()?;
    Ok(())
}
