//! Single-container lifecycle commands: build, run, stop, restart, rm,
//! inspect, exec, logs, ps, images

use anyhow::{anyhow, bail, Context, Result};
use lockbox_backend::{create_backend, ExecRequest};
use lockbox_config::GlobalConfig;
use lockbox_core::engine::{resolve_image_archive, service, ImageBuilder, ImageMetadata};
use lockbox_core::{ContainerRecord, ContainerStatus, PortMapping, RestartPolicy, StateStore, VolumeMapping};
use std::collections::HashMap;
use std::path::Path;
use std::str::FromStr;
use std::time::Duration;

pub async fn build(path: &Path, tag: &str) -> Result<()> {
    let backend = create_backend();
    let builder = ImageBuilder::new(backend.into());
    builder.build(tag, path).await.context("build failed")?;
    println!("Built image: {tag}");
    Ok(())
}

#[allow(clippy::too_many_arguments)]
pub async fn run(
    image: String,
    cmd: Vec<String>,
    name: Option<String>,
    ports: Vec<String>,
    volumes: Vec<String>,
    envs: Vec<String>,
    detach: bool,
    restart: String,
    labels: Vec<String>,
    network: Option<String>,
    service_enabled: bool,
) -> Result<()> {
    let store = StateStore::open_default()?;

    if let Some(ref n) = name {
        if store.resolve(n)?.is_some() {
            bail!("container name '{n}' is already in use");
        }
    }

    let images_dir = GlobalConfig::images_dir()?;
    let metadata_path = images_dir.join(format!("{image}.json"));
    let (default_command, workdir) = if metadata_path.exists() {
        let content = std::fs::read_to_string(&metadata_path)?;
        let metadata: ImageMetadata = serde_json::from_str(&content)?;
        (metadata.entrypoint_command.unwrap_or_else(|| "/bin/sh".to_string()), metadata.working_directory)
    } else {
        bail!("image '{image}' not found; run 'lockbox build' first");
    };

    let command = if cmd.is_empty() { default_command } else { shell_words::join(&cmd) };

    let parsed_ports: Vec<PortMapping> = ports
        .iter()
        .map(|p| PortMapping::from_str(p).map_err(|e| anyhow!(e)))
        .collect::<Result<_>>()?;
    let parsed_volumes: Vec<VolumeMapping> = volumes
        .iter()
        .map(|v| VolumeMapping::from_str(v).map_err(|e| anyhow!(e)))
        .collect::<Result<_>>()?;
    let restart = RestartPolicy::from_str(&restart).map_err(|e| anyhow!(e))?;
    let label_map: HashMap<String, String> = labels
        .iter()
        .map(|l| {
            l.split_once('=')
                .map(|(k, v)| (k.to_string(), v.to_string()))
                .ok_or_else(|| anyhow!("invalid label '{l}', expected KEY=VALUE"))
        })
        .collect::<Result<_>>()?;

    let id = ContainerRecord::generate_id();
    let root = GlobalConfig::containers_dir()?.join(&id);
    let global = GlobalConfig::load();

    let record = ContainerRecord {
        id: id.clone(),
        name,
        image,
        status: ContainerStatus::Starting,
        ports: parsed_ports,
        volumes: parsed_volumes,
        envs,
        command,
        workdir,
        created: chrono::Utc::now(),
        root,
        restart,
        restart_count: 0,
        labels: label_map,
        network: network.unwrap_or(global.defaults.network),
        service_enabled,
        service_name: None,
        mounts: Vec::new(),
        user_stopped: false,
    };

    let image_tar_path = resolve_image_archive(&record.image)?;
    let backend = create_backend();
    backend
        .import(&id, &record.root, &image_tar_path)
        .await
        .context("failed to import image into container root")?;
    store.save(&record)?;

    let entrypoint = format!("{} internal-daemon", current_exe()?);
    if service_enabled {
        if !service::register(&record, &entrypoint).await {
            tracing::warn!("failed to register host service for {id}, falling back to detached spawn");
            lockbox_core::spawn_daemon(&["internal-daemon", &id])?;
        }
    } else {
        lockbox_core::spawn_daemon(&["internal-daemon", &id])?;
    }

    println!("Started container {id}");

    if !detach {
        follow_logs(&id).await?;
    }

    Ok(())
}

pub async fn stop(ident: &str) -> Result<()> {
    let store = StateStore::open_default()?;
    let mut record = find(&store, ident)?;
    record.user_stopped = true;
    store.save(&record)?;

    if record.service_enabled {
        service::stop_via_init(&record).await?;
    } else {
        let backend = create_backend();
        backend.terminate(&record.id).await?;
    }

    println!("Stopped '{}'", display_name(&record));
    Ok(())
}

pub async fn restart(ident: &str) -> Result<()> {
    let store = StateStore::open_default()?;
    let mut record = find(&store, ident)?;

    let backend = create_backend();
    backend.terminate(&record.id).await?;

    record.user_stopped = false;
    record.status = ContainerStatus::Starting;
    store.save(&record)?;

    if record.service_enabled {
        service::start_via_init(&record).await?;
    } else {
        lockbox_core::spawn_daemon(&["internal-daemon", &record.id])?;
    }

    println!("Restarted '{}'", display_name(&record));
    Ok(())
}

pub async fn rm(ident: &str) -> Result<()> {
    let store = StateStore::open_default()?;
    let record = find(&store, ident)?;

    let backend = create_backend();
    if record.status == ContainerStatus::Running || record.status == ContainerStatus::Restarting {
        backend.terminate(&record.id).await?;
    }
    if record.service_enabled {
        service::deregister(&record).await;
    }
    backend.destroy(&record.id, &record.root).await?;
    store.remove(&record.id)?;

    println!("Removed '{}'", display_name(&record));
    Ok(())
}

pub async fn inspect(ident: &str) -> Result<()> {
    let store = StateStore::open_default()?;
    let record = find(&store, ident)?;
    println!("{}", serde_json::to_string_pretty(&record)?);
    Ok(())
}

pub async fn exec(ident: &str, cmd: Vec<String>, interactive: bool) -> Result<()> {
    let store = StateStore::open_default()?;
    let record = find(&store, ident)?;

    if record.status != ContainerStatus::Running {
        bail!("container '{}' is not running", display_name(&record));
    }
    if cmd.is_empty() {
        bail!("no command specified");
    }

    let backend = create_backend();
    let stdin = if interactive {
        let mut buf = String::new();
        std::io::Read::read_to_string(&mut std::io::stdin(), &mut buf).ok();
        Some(buf)
    } else {
        None
    };

    let mut request = ExecRequest::new(shell_words::join(&cmd)).with_working_directory(record.workdir.clone());
    request.stdin = stdin;
    let result = backend.exec(&record.id, &record.root, &request).await?;
    print!("{}", result.output);
    if result.exit_code != 0 {
        std::process::exit(result.exit_code);
    }
    Ok(())
}

pub async fn logs(ident: &str, follow: bool) -> Result<()> {
    let store = StateStore::open_default()?;
    let record = find(&store, ident)?;
    let path = GlobalConfig::logs_dir()?.join(format!("{}.log", record.id));

    if !path.exists() {
        println!("(no logs yet)");
        return Ok(());
    }

    let content = std::fs::read_to_string(&path)?;
    print!("{content}");

    if follow {
        let mut last_len = content.len() as u64;
        loop {
            tokio::time::sleep(Duration::from_millis(500)).await;
            let meta = std::fs::metadata(&path)?;
            if meta.len() > last_len {
                let content = std::fs::read_to_string(&path)?;
                print!("{}", &content[last_len as usize..]);
                last_len = meta.len();
            }
        }
    }

    Ok(())
}

pub async fn ps() -> Result<()> {
    let store = StateStore::open_default()?;
    let records = store.list()?;
    let running: Vec<_> = records.into_iter().filter(|r| r.status == ContainerStatus::Running).collect();

    if running.is_empty() {
        println!("No running containers.");
        return Ok(());
    }

    println!("{:<14} {:<20} {:<10} IMAGE", "ID", "NAME", "STATUS");
    for record in running {
        println!(
            "{:<14} {:<20} {:<10} {}",
            record.short_id(),
            record.name.as_deref().unwrap_or("-"),
            record.status,
            record.image
        );
    }
    Ok(())
}

pub async fn images() -> Result<()> {
    let images_dir = GlobalConfig::images_dir()?;
    if !images_dir.exists() {
        println!("No images found.");
        return Ok(());
    }

    let mut tags = Vec::new();
    for entry in std::fs::read_dir(&images_dir)? {
        let entry = entry?;
        let path = entry.path();
        if path.extension().and_then(|e| e.to_str()) == Some("json") {
            if let Some(stem) = path.file_stem().and_then(|s| s.to_str()) {
                tags.push(stem.to_string());
            }
        }
    }
    tags.sort();

    if tags.is_empty() {
        println!("No images found.");
        return Ok(());
    }
    for tag in tags {
        println!("{tag}");
    }
    Ok(())
}

fn find(store: &StateStore, ident: &str) -> Result<ContainerRecord> {
    store
        .resolve(ident)?
        .ok_or_else(|| anyhow!("container '{ident}' not found"))
}

fn display_name(record: &ContainerRecord) -> String {
    record.name.clone().unwrap_or_else(|| record.id.clone())
}

fn current_exe() -> Result<String> {
    Ok(std::env::current_exe()?
        .to_str()
        .ok_or_else(|| anyhow!("executable path contains invalid UTF-8"))?
        .to_string())
}

async fn follow_logs(id: &str) -> Result<()> {
    let path = GlobalConfig::logs_dir()?.join(format!("{id}.log"));
    let mut last_len = 0u64;
    loop {
        tokio::select! {
            _ = tokio::signal::ctrl_c() => {
                println!("\n(detaching, container keeps running)");
                return Ok(());
            }
            _ = tokio::time::sleep(Duration::from_millis(500)) => {
                if let Ok(meta) = std::fs::metadata(&path) {
                    if meta.len() > last_len {
                        if let Ok(content) = std::fs::read_to_string(&path) {
                            print!("{}", &content[last_len as usize..]);
                        }
                        last_len = meta.len();
                    }
                }

                let store = StateStore::open_default()?;
                if let Some(record) = store.load(id)? {
                    if record.status == ContainerStatus::Exited || record.status == ContainerStatus::Error {
                        return Ok(());
                    }
                }
            }
        }
    }
}
