//! `create up` / `create down` orchestration commands

use anyhow::{bail, Context, Result};
use lockbox_backend::create_backend;
use lockbox_config::GlobalConfig;
use lockbox_core::engine::{ComposeOrchestrator, RecreatePolicy, RemoveImages, UpOptions};
use lockbox_core::StateStore;
use std::path::PathBuf;

#[allow(clippy::too_many_arguments)]
pub async fn up(
    file: String,
    force_recreate: bool,
    no_recreate: bool,
    build: bool,
    no_build: bool,
    remove_orphans: bool,
) -> Result<()> {
    if force_recreate && no_recreate {
        bail!("--force-recreate and --no-recreate are mutually exclusive");
    }

    let manifest_path = PathBuf::from(&file);
    let project = ComposeOrchestrator::project_name(&std::env::current_dir()?);
    let store = StateStore::open_default()?;
    let backend = create_backend().into();
    let orchestrator = ComposeOrchestrator::new(store, backend);

    let recreate = if force_recreate {
        RecreatePolicy::ForceRecreate
    } else if no_recreate {
        RecreatePolicy::NoRecreate
    } else {
        RecreatePolicy::Default
    };

    let options = UpOptions {
        build: build && !no_build,
        recreate,
        remove_orphans,
    };

    let needs_monitor = orchestrator
        .up(&manifest_path, &project, &options)
        .await
        .context("compose up failed")?;

    if needs_monitor {
        let state_dir = GlobalConfig::state_dir()?;
        std::fs::create_dir_all(&state_dir)?;
        let pid_file = state_dir.join(format!("monitor_{project}.pid"));
        if pid_file.exists() {
            println!("Monitor already active.");
        } else {
            let abs_manifest = manifest_path.canonicalize().unwrap_or(manifest_path.clone());
            let abs_manifest_str = abs_manifest.to_string_lossy().to_string();
            lockbox_core::spawn_daemon(&["monitor-daemon", &abs_manifest_str, &project])?;
            println!("Monitor started.");
        }
    }

    println!("Project '{project}' is up.");
    Ok(())
}

pub async fn down(file: String, rmi: String, remove_orphans: bool) -> Result<()> {
    let manifest_path = PathBuf::from(&file);
    let project = ComposeOrchestrator::project_name(&std::env::current_dir()?);

    let state_dir = GlobalConfig::state_dir()?;
    let pid_file = state_dir.join(format!("monitor_{project}.pid"));
    if let Ok(content) = std::fs::read_to_string(&pid_file) {
        if let Ok(pid) = content.trim().parse::<i32>() {
            kill_pid(pid);
        }
        let _ = std::fs::remove_file(&pid_file);
        println!("Stopped monitor.");
    }

    let store = StateStore::open_default()?;
    let backend = create_backend().into();
    let orchestrator = ComposeOrchestrator::new(store, backend);

    let rmi = match rmi.as_str() {
        "local" => RemoveImages::Local,
        "all" => RemoveImages::All,
        _ => RemoveImages::None,
    };

    orchestrator
        .down(&manifest_path, &project, rmi, remove_orphans)
        .await
        .context("compose down failed")?;

    println!("Project '{project}' is down.");
    Ok(())
}

#[cfg(target_os = "linux")]
fn kill_pid(pid: i32) {
    use nix::sys::signal::{kill, Signal};
    use nix::unistd::Pid;
    let _ = kill(Pid::from_raw(pid), Signal::SIGTERM);
}

#[cfg(windows)]
fn kill_pid(pid: i32) {
    let _ = std::process::Command::new("taskkill")
        .args(["/PID", &pid.to_string(), "/F"])
        .status();
}
