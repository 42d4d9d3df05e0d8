//! Requirement domain models.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::BTreeMap;
use std::time::Duration;

/// A single requirement record.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Requirement {
    pub global_id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    /// Free-text metadata fields (status, owner, source section, ...).
    #[serde(default)]
    pub metadata: BTreeMap<String, String>,
    #[serde(default)]
    pub analysis: Option<Analysis>,
    /// Rich content carried along with the record. Never interpreted here.
    #[serde(default)]
    pub fragments: Vec<ContentFragment>,
}

impl Requirement {
    /// Create a requirement with identity and display fields.
    pub fn new(global_id: impl Into<String>, name: impl Into<String>, description: impl Into<String>) -> Self {
        Self {
            global_id: global_id.into(),
            name: name.into(),
            description: description.into(),
            metadata: BTreeMap::new(),
            analysis: None,
            fragments: Vec::new(),
        }
    }

    /// Attach a metadata field.
    pub fn with_metadata(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.metadata.insert(key.into(), value.into());
        self
    }

    /// Whether an analysis is attached.
    pub fn is_analyzed(&self) -> bool {
        self.analysis.is_some()
    }

    /// SHA-256 over the content an analysis looks at.
    pub fn content_hash(&self) -> String {
        let mut hasher = Sha256::new();
        for part in [&self.global_id, &self.name, &self.description] {
            hasher.update(part.as_bytes());
            hasher.update([0u8]);
        }
        for (key, value) in &self.metadata {
            hasher.update(key.as_bytes());
            hasher.update([b'=']);
            hasher.update(value.as_bytes());
            hasher.update([0u8]);
        }
        format!("{:x}", hasher.finalize())
    }

    /// True when the record was analyzed and its content changed since.
    pub fn is_modified_since_analysis(&self) -> bool {
        self.analysis
            .as_ref()
            .is_some_and(|a| a.content_hash != self.content_hash())
    }
}

/// Opaque rich content attached to a requirement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ContentFragment {
    Paragraph { text: String },
    Table { rows: Vec<Vec<String>> },
}

/// Severity of an analysis issue.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum IssueSeverity {
    Low,
    Medium,
    High,
}

impl IssueSeverity {
    /// Parse from string.
    pub fn from_str(s: &str) -> Self {
        match s.to_lowercase().as_str() {
            "high" | "critical" => Self::High,
            "low" | "minor" => Self::Low,
            _ => Self::Medium,
        }
    }

    /// Convert to string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
        }
    }
}

/// A single quality issue found by an analysis.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnalysisIssue {
    pub category: String,
    pub severity: IssueSeverity,
    pub description: String,
}

/// Highest quality score an analysis can carry.
pub const MAX_QUALITY_SCORE: u8 = 10;

/// What an analysis capability returns for one record.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AnalysisReport {
    /// Quality on a 0-10 scale; larger values are clamped when attached.
    pub quality_score: u8,
    #[serde(default)]
    pub issues: Vec<AnalysisIssue>,
    #[serde(default)]
    pub recommendations: Vec<String>,
    #[serde(default)]
    pub feedback: String,
    #[serde(default)]
    pub improved_text: Option<String>,
}

/// Quality assessment attached to a requirement.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Analysis {
    /// 0 to [`MAX_QUALITY_SCORE`].
    pub quality_score: u8,
    pub issues: Vec<AnalysisIssue>,
    pub recommendations: Vec<String>,
    pub feedback: String,
    pub improved_text: Option<String>,
    pub timestamp: DateTime<Utc>,
    #[serde(with = "duration_millis")]
    pub elapsed: Duration,
    /// Hash of the record content the analysis was computed from.
    pub content_hash: String,
}

impl Analysis {
    /// Stamp a report produced for `analyzed` into an attachable analysis.
    pub fn from_report(report: AnalysisReport, analyzed: &Requirement, elapsed: Duration) -> Self {
        Self {
            quality_score: report.quality_score.min(MAX_QUALITY_SCORE),
            issues: report.issues,
            recommendations: report.recommendations,
            feedback: report.feedback,
            improved_text: report.improved_text.filter(|t| !t.trim().is_empty()),
            timestamp: Utc::now(),
            elapsed,
            content_hash: analyzed.content_hash(),
        }
    }

    pub fn is_analyzed(&self) -> bool {
        !self.content_hash.is_empty()
    }
}

/// A file attached to a project in an external document service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Attachment {
    pub id: String,
    pub project_id: String,
    pub file_name: String,
    pub mime_type: Option<String>,
    pub size_bytes: Option<u64>,
    pub location: String,
}

pub(crate) mod duration_millis {
    use serde::{Deserialize, Deserializer, Serializer};
    use std::time::Duration;

    pub fn serialize<S: Serializer>(value: &Duration, serializer: S) -> Result<S::Ok, S::Error> {
        serializer.serialize_u64(value.as_millis() as u64)
    }

    pub fn deserialize<'de, D: Deserializer<'de>>(deserializer: D) -> Result<Duration, D::Error> {
        Ok(Duration::from_millis(u64::deserialize(deserializer)?))
    }
}
