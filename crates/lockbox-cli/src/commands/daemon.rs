//! Hidden daemon entry points, re-invoked by `run`/`create up` as detached
//! child processes (or registered directly as the host service's
//! `ExecStart`).

use anyhow::{Context, Result};
use lockbox_backend::create_backend;
use lockbox_core::engine::{monitor, Supervisor};
use lockbox_core::StateStore;
use std::path::PathBuf;

pub async fn internal_daemon(cid: String) -> Result<()> {
    let store = StateStore::open_default()?;
    let backend = create_backend().into();
    let supervisor = Supervisor::new(cid, store, backend);
    supervisor.run().await.context("supervisor exited with error")?;
    Ok(())
}

pub async fn monitor_daemon(manifest: String, project: String) -> Result<()> {
    let backend = create_backend().into();
    monitor::run(&PathBuf::from(manifest), &project, backend)
        .await
        .context("monitor exited with error")?;
    Ok(())
}
