//! Attachment discovery over a local directory tree.
//!
//! Each project is a sub-directory of the root; every regular file in it
//! (recursively) is an attachment.

use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use async_trait::async_trait;
use sha2::{Digest, Sha256};
use tracing::debug;
use walkdir::WalkDir;

use reqflow_core::capability::DiscoveryCapability;
use reqflow_core::progress::{Progress, ProgressReporter};
use reqflow_core::requirement::model::Attachment;

#[derive(Debug, Clone)]
pub struct DirectoryDiscovery {
    root: PathBuf,
}

impl DirectoryDiscovery {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }
}

#[async_trait]
impl DiscoveryCapability for DirectoryDiscovery {
    async fn discover(&self, project_id: &str, progress: &ProgressReporter) -> anyhow::Result<Vec<Attachment>> {
        if project_id.contains(['/', '\\']) || project_id == ".." {
            bail!("invalid project identifier: {project_id}");
        }
        let project_dir = self.root.join(project_id);
        if !project_dir.is_dir() {
            bail!("project not found: {}", project_dir.display());
        }

        progress.report(0, format!("Listing {}", project_dir.display()));
        let files = list_files(&project_dir).await?;
        let total = files.len();
        debug!(project_id, total, "Attachment files listed");

        let mut attachments = Vec::with_capacity(total);
        for (index, path) in files.into_iter().enumerate() {
            let metadata = tokio::fs::metadata(&path)
                .await
                .with_context(|| format!("failed to stat {}", path.display()))?;
            let relative = path.strip_prefix(&project_dir).unwrap_or(&path);
            let location = relative.to_string_lossy().replace('\\', "/");
            let file_name = path
                .file_name()
                .map(|n| n.to_string_lossy().into_owned())
                .unwrap_or_else(|| location.clone());

            attachments.push(Attachment {
                id: attachment_id(project_id, &location),
                project_id: project_id.to_string(),
                mime_type: mime_type(&file_name).map(str::to_string),
                file_name,
                size_bytes: Some(metadata.len()),
                location,
            });
            progress.emit(Progress::fraction(index + 1, total, format!("Scanned {}/{total} files", index + 1)));
        }

        attachments.sort_by(|a, b| a.location.cmp(&b.location));
        progress.report(100, format!("Found {} attachments", attachments.len()));
        Ok(attachments)
    }
}

/// Every regular file below `dir`, in walk order.
async fn list_files(dir: &Path) -> anyhow::Result<Vec<PathBuf>> {
    let root = dir.to_path_buf();
    tokio::task::spawn_blocking(move || {
        WalkDir::new(&root)
            .into_iter()
            .filter_map(|entry| match entry {
                Ok(entry) => entry.file_type().is_file().then(|| Ok(entry.into_path())),
                Err(e) => Some(Err(anyhow::Error::new(e).context(format!("failed to walk {}", root.display())))),
            })
            .collect::<anyhow::Result<Vec<_>>>()
    })
    .await
    .context("directory walk task panicked")?
}

/// Stable identifier derived from project and relative location.
fn attachment_id(project_id: &str, location: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(project_id.as_bytes());
    hasher.update([0u8]);
    hasher.update(location.as_bytes());
    format!("{:x}", hasher.finalize())[..16].to_string()
}

fn mime_type(file_name: &str) -> Option<&'static str> {
    let extension = file_name.rsplit_once('.')?.1.to_lowercase();
    let mime = match extension.as_str() {
        "pdf" => "application/pdf",
        "doc" => "application/msword",
        "docx" => "application/vnd.openxmlformats-officedocument.wordprocessingml.document",
        "xlsx" => "application/vnd.openxmlformats-officedocument.spreadsheetml.sheet",
        "png" => "image/png",
        "jpg" | "jpeg" => "image/jpeg",
        "svg" => "image/svg+xml",
        "txt" => "text/plain",
        "md" => "text/markdown",
        "json" => "application/json",
        "zip" => "application/zip",
        _ => return None,
    };
    Some(mime)
}
