//! Image Builder — interprets an instruction stream against a scratch root

use crate::{CoreError, Result};
use lockbox_backend::{ExecRequest, IsolationBackend};
use lockbox_config::{load_instructions, BuildStep};
use lockbox_config::GlobalConfig;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::Arc;

const EXCLUDED_DIR_NAMES: &[&str] = &[".git", "venv", "__pycache__"];

/// Sidecar metadata written alongside an image archive
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageMetadata {
    pub entrypoint_command: Option<String>,
    pub working_directory: String,
}

pub struct ImageBuilder {
    backend: Arc<dyn IsolationBackend>,
}

impl ImageBuilder {
    pub fn new(backend: Arc<dyn IsolationBackend>) -> Self {
        Self { backend }
    }

    /// Build `tag` from the instruction file found in `context_dir`.
    pub async fn build(&self, tag: &str, context_dir: &Path) -> Result<()> {
        let instructions = load_instructions(context_dir)?;
        let scratch_id = format!("build-{}", uuid::Uuid::new_v4().simple());
        let scratch_root = GlobalConfig::containers_dir()?.join(&scratch_id);

        let result = self.run_build(&scratch_id, &scratch_root, context_dir, tag, &instructions).await;

        // destroy scratch root regardless of outcome
        let _ = self.backend.destroy(&scratch_id, &scratch_root).await;

        result
    }

    async fn run_build(
        &self,
        scratch_id: &str,
        scratch_root: &Path,
        context_dir: &Path,
        tag: &str,
        instructions: &lockbox_config::InstructionFile,
    ) -> Result<()> {
        let base_image_path = resolve_image_archive(&instructions.base)?;
        self.backend
            .import(scratch_id, scratch_root, &base_image_path)
            .await?;

        let mut cwd = "/".to_string();
        let mut entrypoint_command: Option<String> = None;

        for step in &instructions.steps {
            match step {
                BuildStep::Copy { src, dst } => {
                    let target = resolve_in_root(scratch_root, &cwd, dst);
                    for source in src {
                        copy_into(context_dir, source, &target)?;
                    }
                }
                BuildStep::Exec { cmd } => {
                    let request = ExecRequest::new(cmd.clone()).with_working_directory(cwd.clone());
                    let result = self.backend.exec(scratch_id, scratch_root, &request).await?;
                    if result.exit_code != 0 {
                        return Err(CoreError::BuildFailed(format!(
                            "step `EXEC {cmd}` exited {}: {}",
                            result.exit_code, result.output
                        )));
                    }
                }
                BuildStep::Env { key, value } => {
                    append_profile_export(scratch_root, key, value)?;
                }
                BuildStep::Dir { path } => {
                    let target = resolve_in_root(scratch_root, &cwd, path);
                    std::fs::create_dir_all(&target)?;
                    cwd = path.clone();
                }
                BuildStep::Start { cmd } => {
                    entrypoint_command = Some(cmd.clone());
                }
            }
        }

        let images_dir = GlobalConfig::images_dir()?;
        std::fs::create_dir_all(&images_dir)?;
        export_archive(scratch_root, &images_dir.join(format!("{tag}.tar")))?;

        let metadata = ImageMetadata {
            entrypoint_command,
            working_directory: cwd,
        };
        write_metadata_atomic(&images_dir.join(format!("{tag}.json")), &metadata)?;

        Ok(())
    }
}

/// Resolve an image tag to its archive path under the images directory,
/// preferring a gzipped tarball over a plain one.
pub fn resolve_image_archive(tag: &str) -> Result<PathBuf> {
    let images_dir = GlobalConfig::images_dir()?;
    let gz = images_dir.join(format!("{tag}.tar.gz"));
    if gz.exists() {
        return Ok(gz);
    }
    let plain = images_dir.join(format!("{tag}.tar"));
    if plain.exists() {
        return Ok(plain);
    }
    Err(CoreError::ImageNotFound(tag.to_string()))
}

fn resolve_in_root(root: &Path, cwd: &str, path: &str) -> PathBuf {
    let joined = if path.starts_with('/') {
        path.to_string()
    } else {
        format!("{}/{}", cwd.trim_end_matches('/'), path)
    };
    root.join(joined.trim_start_matches('/'))
}

/// Copy `src` (resolved against `context_dir`) into `target`. A source
/// ending with `.` or `/` copies its contents; otherwise it copies as a
/// named child of `target`.
fn copy_into(context_dir: &Path, src: &str, target: &Path) -> Result<()> {
    let source_path = context_dir.join(src.trim_end_matches(['.', '/']).trim_end_matches('/'));
    let copy_contents = src.ends_with('.') || src.ends_with('/');

    if source_path.is_dir() {
        let dest_root = if copy_contents {
            target.to_path_buf()
        } else {
            target.join(source_path.file_name().unwrap_or_default())
        };
        copy_dir_recursive(&source_path, &dest_root)?;
    } else {
        let dest = if copy_contents || target.is_dir() {
            target.join(source_path.file_name().unwrap_or_default())
        } else {
            target.to_path_buf()
        };
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::copy(&source_path, &dest)?;
    }
    Ok(())
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> Result<()> {
    std::fs::create_dir_all(dst)?;
    for entry in walkdir::WalkDir::new(src)
        .into_iter()
        .filter_entry(|e| {
            e.file_name()
                .to_str()
                .map(|name| !EXCLUDED_DIR_NAMES.contains(&name))
                .unwrap_or(true)
        })
    {
        let entry = entry.map_err(|e| CoreError::BuildFailed(e.to_string()))?;
        let rel = entry.path().strip_prefix(src).unwrap();
        let dest_path = dst.join(rel);
        if entry.file_type().is_dir() {
            std::fs::create_dir_all(&dest_path)?;
        } else {
            if let Some(parent) = dest_path.parent() {
                std::fs::create_dir_all(parent)?;
            }
            std::fs::copy(entry.path(), &dest_path)?;
        }
    }
    Ok(())
}

fn append_profile_export(root: &Path, key: &str, value: &str) -> Result<()> {
    let profile_dir = root.join("etc/profile.d");
    std::fs::create_dir_all(&profile_dir)?;
    let profile_path = profile_dir.join("lockbox-env.sh");
    let mut content = std::fs::read_to_string(&profile_path).unwrap_or_default();
    content.push_str(&format!("export {key}={value}\n"));
    std::fs::write(&profile_path, content)?;
    Ok(())
}

fn export_archive(root: &Path, dest: &Path) -> Result<()> {
    let tmp = dest.with_extension("tar.tmp");
    {
        let file = std::fs::File::create(&tmp)?;
        let mut builder = tar::Builder::new(file);
        builder.append_dir_all(".", root)?;
        builder.finish()?;
    }
    std::fs::rename(&tmp, dest)?;
    Ok(())
}

fn write_metadata_atomic(path: &Path, metadata: &ImageMetadata) -> Result<()> {
    let tmp = path.with_extension("json.tmp");
    let content = serde_json::to_string_pretty(metadata)?;
    std::fs::write(&tmp, content)?;
    std::fs::rename(&tmp, path)?;
    Ok(())
}
