//! External capabilities the mediator drives.
//!
//! Each capability is injected at construction. Implementations report
//! failures as `anyhow::Error`; the orchestrators turn them into outcomes.

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use crate::progress::ProgressReporter;
use crate::requirement::model::{AnalysisReport, Attachment, Requirement};

/// Output of a successful document parse.
#[derive(Debug, Clone, Default)]
pub struct ParsedDocument {
    pub records: Vec<Requirement>,
    /// How the document was read, e.g. "json" or "markdown".
    pub method: String,
    pub elapsed: Duration,
}

/// Format-detecting document reader.
#[async_trait]
pub trait DocumentParser: Send + Sync {
    async fn parse(&self, source: &Path, progress: &ProgressReporter) -> anyhow::Result<ParsedDocument>;
}

/// Export target format.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ExportFormat {
    Json,
    Markdown,
    Text,
}

impl ExportFormat {
    /// Parse from string.
    pub fn from_str(s: &str) -> Option<Self> {
        match s.to_lowercase().as_str() {
            "json" => Some(Self::Json),
            "md" | "markdown" => Some(Self::Markdown),
            "txt" | "text" => Some(Self::Text),
            _ => None,
        }
    }

    /// Convert to string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Markdown => "markdown",
            Self::Text => "text",
        }
    }

    /// Conventional file extension.
    pub fn extension(&self) -> &'static str {
        match self {
            Self::Json => "json",
            Self::Markdown => "md",
            Self::Text => "txt",
        }
    }
}

impl fmt::Display for ExportFormat {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Writes records to a destination in a given format.
#[async_trait]
pub trait DocumentExporter: Send + Sync {
    async fn export(
        &self,
        records: &[Requirement],
        format: ExportFormat,
        destination: &Path,
        progress: &ProgressReporter,
    ) -> anyhow::Result<()>;
}

/// Quality analysis of a single record, typically LLM-backed.
#[async_trait]
pub trait AnalysisCapability: Send + Sync {
    async fn analyze(&self, requirement: &Requirement, progress: &ProgressReporter) -> anyhow::Result<AnalysisReport>;
}

/// Attachment discovery in an external document service.
#[async_trait]
pub trait DiscoveryCapability: Send + Sync {
    async fn discover(&self, project_id: &str, progress: &ProgressReporter) -> anyhow::Result<Vec<Attachment>>;
}

/// Loads and saves the requirement set of a workspace.
#[async_trait]
pub trait WorkspaceStore: Send + Sync {
    async fn load_requirements(&self, workspace: &Path) -> anyhow::Result<Vec<Requirement>>;
    async fn save(&self, workspace: &Path, records: &[Requirement]) -> anyhow::Result<()>;
}

/// Every collaborator the mediator needs, injected at construction.
#[derive(Clone)]
pub struct Capabilities {
    pub parser: Arc<dyn DocumentParser>,
    pub exporter: Arc<dyn DocumentExporter>,
    pub analyzer: Arc<dyn AnalysisCapability>,
    pub discovery: Arc<dyn DiscoveryCapability>,
    pub store: Arc<dyn WorkspaceStore>,
}
