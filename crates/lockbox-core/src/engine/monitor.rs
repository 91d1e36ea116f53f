//! Auto-Update Monitor — detects image drift for `auto-update`-enabled
//! services and triggers a rebuild + recreate.

use crate::engine::build::{resolve_image_archive, ImageBuilder};
use crate::engine::compose::{ComposeOrchestrator, RecreatePolicy, UpOptions};
use crate::state::StateStore;
use crate::Result;
use lockbox_backend::IsolationBackend;
use lockbox_config::{GlobalConfig, Manifest};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

const POLL_INTERVAL: Duration = Duration::from_secs(10);

enum Fingerprint {
    Http(String),
    Local(String),
}

/// Run the monitor loop for one compose project until the process is
/// killed. Errors for an individual service are logged and swallowed so one
/// bad service does not stop drift detection for the rest.
pub async fn run(manifest_path: &Path, project: &str, backend: Arc<dyn IsolationBackend>) -> Result<()> {
    let store = StateStore::open_default()?;
    let http = reqwest::Client::new();
    let mut primed: HashMap<String, Fingerprint> = HashMap::new();
    let mut interval = tokio::time::interval(POLL_INTERVAL);

    loop {
        interval.tick().await;

        let manifest = match Manifest::load(manifest_path) {
            Ok(m) => m,
            Err(e) => {
                tracing::warn!("monitor: failed to reload manifest: {e}");
                continue;
            }
        };

        for (name, svc) in &manifest.services {
            if !svc.auto_update.enabled {
                continue;
            }

            let current = match &svc.auto_update.url {
                Some(url) => fetch_http_fingerprint(&http, url).await,
                None => svc
                    .build
                    .as_deref()
                    .and_then(|ctx| local_fingerprint(Path::new(ctx)).ok()),
            };

            let Some(current) = current else { continue };

            match primed.get(name) {
                None => {
                    primed.insert(name.clone(), current);
                }
                Some(previous) if !fingerprints_equal(previous, &current) => {
                    tracing::info!("drift detected for service {name}, rebuilding");
                    primed.insert(name.clone(), current);
                    if let Err(e) = rebuild_and_recreate(&store, backend.clone(), &http, manifest_path, project, name, svc).await {
                        tracing::warn!("monitor: rebuild failed for {name}: {e}");
                    }
                }
                Some(_) => {}
            }
        }
    }
}

async fn rebuild_and_recreate(
    store: &StateStore,
    backend: Arc<dyn IsolationBackend>,
    http: &reqwest::Client,
    manifest_path: &Path,
    project: &str,
    service_name: &str,
    svc: &lockbox_config::ServiceSpec,
) -> Result<()> {
    let image_tag = svc
        .image
        .clone()
        .unwrap_or_else(|| Manifest::container_name(project, service_name));

    if let Some(build_ctx) = &svc.build {
        let builder = ImageBuilder::new(backend.clone());
        builder.build(&image_tag, Path::new(build_ctx)).await?;
    } else if let Some(url) = &svc.auto_update.url {
        download_image_in_place(http, url, &image_tag).await?;
    }

    let orchestrator = ComposeOrchestrator::new(store.clone(), backend);
    let options = UpOptions {
        build: false,
        recreate: RecreatePolicy::ForceRecreate,
        remove_orphans: false,
    };
    orchestrator.up(manifest_path, project, &options).await?;
    Ok(())
}

/// Download the tarball at `url` and write it over the existing archive for
/// `image_tag`, replacing whatever file `resolve_image_archive` finds (or a
/// fresh `.tar.gz` if the image has never been fetched before).
async fn download_image_in_place(client: &reqwest::Client, url: &str, image_tag: &str) -> Result<()> {
    let target = resolve_image_archive(image_tag).unwrap_or_else(|_| {
        GlobalConfig::images_dir()
            .map(|dir| dir.join(format!("{image_tag}.tar.gz")))
            .unwrap_or_else(|_| PathBuf::from(format!("{image_tag}.tar.gz")))
    });

    let bytes = client.get(url).send().await?.bytes().await?;
    let tmp = target.with_extension("download");
    std::fs::write(&tmp, &bytes)?;
    std::fs::rename(&tmp, &target)?;
    tracing::info!("downloaded updated image for {image_tag} from {url}");
    Ok(())
}

async fn fetch_http_fingerprint(client: &reqwest::Client, url: &str) -> Option<Fingerprint> {
    let response = client.head(url).send().await.ok()?;
    let headers = response.headers();
    let marker = headers
        .get(reqwest::header::LAST_MODIFIED)
        .or_else(|| headers.get(reqwest::header::ETAG))?
        .to_str()
        .ok()?
        .to_string();
    Some(Fingerprint::Http(marker))
}

fn local_fingerprint(context_dir: &Path) -> std::io::Result<Fingerprint> {
    let path = lockbox_config::find_instruction_file(context_dir)
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::NotFound, e.to_string()))?;
    let content = std::fs::read(path)?;
    let mut hasher = Sha256::new();
    hasher.update(&content);
    Ok(Fingerprint::Local(format!("{:x}", hasher.finalize())))
}

fn fingerprints_equal(a: &Fingerprint, b: &Fingerprint) -> bool {
    match (a, b) {
        (Fingerprint::Http(x), Fingerprint::Http(y)) => x == y,
        (Fingerprint::Local(x), Fingerprint::Local(y)) => x == y,
        _ => false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_local_fingerprint_changes_with_content() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("app.lbox"), "BOX_BASE alpine\n").unwrap();
        let first = local_fingerprint(tmp.path()).unwrap();

        std::fs::write(tmp.path().join("app.lbox"), "BOX_BASE alpine\nBOX_EXEC true\n").unwrap();
        let second = local_fingerprint(tmp.path()).unwrap();

        assert!(!fingerprints_equal(&first, &second));
    }

    #[test]
    fn test_local_fingerprint_stable_for_same_content() {
        let tmp = tempfile::tempdir().unwrap();
        std::fs::write(tmp.path().join("app.lbox"), "BOX_BASE alpine\n").unwrap();
        let first = local_fingerprint(tmp.path()).unwrap();
        let second = local_fingerprint(tmp.path()).unwrap();
        assert!(fingerprints_equal(&first, &second));
    }
}
