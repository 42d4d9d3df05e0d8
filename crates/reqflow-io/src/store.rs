//! JSON workspace store.
//!
//! A workspace is a directory holding `requirements.json`. Saves write a
//! uniquely named temporary file next to it, sync it and persist it over the
//! target, so a crash never leaves a truncated file and concurrent saves never
//! share a temporary.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{bail, Context};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use reqflow_core::capability::WorkspaceStore;
use reqflow_core::requirement::model::Requirement;

pub const REQUIREMENTS_FILE: &str = "requirements.json";
const FORMAT_VERSION: u32 = 1;

#[derive(Debug, Serialize, Deserialize)]
struct WorkspaceFile {
    version: u32,
    saved_at: DateTime<Utc>,
    requirements: Vec<Requirement>,
}

#[derive(Debug, Clone, Default)]
pub struct JsonWorkspaceStore;

impl JsonWorkspaceStore {
    pub fn new() -> Self {
        Self
    }

    pub fn requirements_path(workspace: &Path) -> PathBuf {
        workspace.join(REQUIREMENTS_FILE)
    }
}

#[async_trait]
impl WorkspaceStore for JsonWorkspaceStore {
    async fn load_requirements(&self, workspace: &Path) -> anyhow::Result<Vec<Requirement>> {
        let path = Self::requirements_path(workspace);
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            bail!("workspace not initialized: {} does not exist", path.display());
        }
        let content = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("failed to read {}", path.display()))?;
        let file: WorkspaceFile =
            serde_json::from_str(&content).with_context(|| format!("invalid workspace file {}", path.display()))?;
        if file.version > FORMAT_VERSION {
            bail!("workspace format version {} is newer than supported ({FORMAT_VERSION})", file.version);
        }
        debug!(path = %path.display(), count = file.requirements.len(), "Workspace read");
        Ok(file.requirements)
    }

    async fn save(&self, workspace: &Path, records: &[Requirement]) -> anyhow::Result<()> {
        tokio::fs::create_dir_all(workspace)
            .await
            .with_context(|| format!("failed to create {}", workspace.display()))?;

        let file = WorkspaceFile {
            version: FORMAT_VERSION,
            saved_at: Utc::now(),
            requirements: records.to_vec(),
        };
        let content = serde_json::to_string_pretty(&file)?;

        let path = Self::requirements_path(workspace);
        let target = path.clone();
        tokio::task::spawn_blocking(move || write_atomic(&target, content.as_bytes()))
            .await
            .context("workspace save task panicked")??;
        debug!(path = %path.display(), count = records.len(), "Workspace written");
        Ok(())
    }
}

fn write_atomic(path: &Path, contents: &[u8]) -> anyhow::Result<()> {
    let parent = path.parent().unwrap_or_else(|| Path::new("."));
    let mut tmp = tempfile::Builder::new()
        .prefix(".requirements_")
        .suffix(".tmp")
        .tempfile_in(parent)
        .with_context(|| format!("failed to create temporary file in {}", parent.display()))?;
    tmp.write_all(contents)
        .with_context(|| format!("failed to write {}", tmp.path().display()))?;
    tmp.as_file().sync_all()?;
    tmp.persist(path)
        .with_context(|| format!("failed to replace {}", path.display()))?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;
    use tokio::task::JoinSet;

    fn entries(dir: &Path) -> Vec<String> {
        let mut names: Vec<String> = std::fs::read_dir(dir)
            .unwrap()
            .map(|e| e.unwrap().file_name().to_string_lossy().into_owned())
            .collect();
        names.sort();
        names
    }

    #[tokio::test]
    async fn test_save_then_load() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = dir.path().join("project");
        let store = JsonWorkspaceStore::new();
        let records = vec![
            Requirement::new("REQ-1", "Login", "Users shall log in").with_metadata("Owner", "qa"),
            Requirement::new("REQ-2", "Logout", ""),
        ];

        store.save(&workspace, &records).await.unwrap();
        assert_eq!(store.load_requirements(&workspace).await.unwrap(), records);
        assert_eq!(entries(&workspace), vec![REQUIREMENTS_FILE.to_string()]);
    }

    #[tokio::test]
    async fn test_concurrent_saves_do_not_collide() {
        let dir = tempfile::tempdir().unwrap();
        let workspace = dir.path().to_path_buf();

        let mut saves = JoinSet::new();
        for n in 0..8 {
            let workspace = workspace.clone();
            saves.spawn(async move {
                let records: Vec<Requirement> = (0..=n)
                    .map(|i| Requirement::new(format!("REQ-{i}"), format!("Item {i}"), "Users shall log in"))
                    .collect();
                JsonWorkspaceStore::new().save(&workspace, &records).await
            });
        }
        while let Some(result) = saves.join_next().await {
            result.unwrap().unwrap();
        }

        let loaded = JsonWorkspaceStore::new().load_requirements(&workspace).await.unwrap();
        assert!((1..=8).contains(&loaded.len()));
        assert_eq!(entries(&workspace), vec![REQUIREMENTS_FILE.to_string()]);
    }

    #[tokio::test]
    async fn test_missing_workspace_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let err = JsonWorkspaceStore::new()
            .load_requirements(dir.path())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("workspace not initialized"));
    }

    #[tokio::test]
    async fn test_newer_format_rejected() {
        let dir = tempfile::tempdir().unwrap();
        let body = r#"{"version": 99, "saved_at": "2024-01-01T00:00:00Z", "requirements": []}"#;
        tokio::fs::write(dir.path().join(REQUIREMENTS_FILE), body).await.unwrap();
        assert!(JsonWorkspaceStore::new().load_requirements(dir.path()).await.is_err());
    }
}
