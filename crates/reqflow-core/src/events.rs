//! Domain event catalogue.
//!
//! Every notification the mediator emits is a variant of [`DomainEvent`].
//! Subscribers register per [`EventKind`], so dispatch is a table lookup
//! rather than a chain of type tests.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::time::Duration;
use uuid::Uuid;

use crate::requirement::model::{Attachment, Requirement};
use crate::requirement::model::duration_millis;
use crate::workflow::WorkflowFlag;

/// Discriminant used as the subscription key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EventKind {
    CollectionChanged,
    SelectionChanged,
    FieldUpdated,
    WorkflowStateChanged,
    AnalysisStarted,
    AnalysisCompleted,
    ImportCompleted,
    ImportFailed,
    ExportCompleted,
    BatchStarted,
    BatchProgress,
    BatchCompleted,
    AttachmentScanStarted,
    AttachmentScanProgress,
    AttachmentScanCompleted,
}

impl EventKind {
    /// Every kind, in catalogue order.
    pub const ALL: [EventKind; 15] = [
        Self::CollectionChanged,
        Self::SelectionChanged,
        Self::FieldUpdated,
        Self::WorkflowStateChanged,
        Self::AnalysisStarted,
        Self::AnalysisCompleted,
        Self::ImportCompleted,
        Self::ImportFailed,
        Self::ExportCompleted,
        Self::BatchStarted,
        Self::BatchProgress,
        Self::BatchCompleted,
        Self::AttachmentScanStarted,
        Self::AttachmentScanProgress,
        Self::AttachmentScanCompleted,
    ];

    /// Convert to string.
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::CollectionChanged => "collection_changed",
            Self::SelectionChanged => "selection_changed",
            Self::FieldUpdated => "field_updated",
            Self::WorkflowStateChanged => "workflow_state_changed",
            Self::AnalysisStarted => "analysis_started",
            Self::AnalysisCompleted => "analysis_completed",
            Self::ImportCompleted => "import_completed",
            Self::ImportFailed => "import_failed",
            Self::ExportCompleted => "export_completed",
            Self::BatchStarted => "batch_started",
            Self::BatchProgress => "batch_progress",
            Self::BatchCompleted => "batch_completed",
            Self::AttachmentScanStarted => "attachment_scan_started",
            Self::AttachmentScanProgress => "attachment_scan_progress",
            Self::AttachmentScanCompleted => "attachment_scan_completed",
        }
    }
}

impl fmt::Display for EventKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Who asked for a change.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Initiator {
    User,
    Import,
    Analysis,
    Reload,
    System,
}

/// What kind of collection mutation happened.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CollectionAction {
    Add,
    Remove,
    Clear,
    Import,
    Load,
}

/// A failed item inside an analysis batch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct BatchFailure {
    pub global_id: String,
    pub error: String,
}

/// All events published on the bus.
#[derive(Debug, Clone, Serialize)]
#[serde(tag = "type", content = "data", rename_all = "snake_case")]
pub enum DomainEvent {
    CollectionChanged {
        action: CollectionAction,
        affected: Vec<Requirement>,
        new_count: usize,
    },
    SelectionChanged {
        selected: Option<Requirement>,
        initiator: Initiator,
    },
    FieldUpdated {
        requirement: Requirement,
        fields: Vec<String>,
        initiator: Initiator,
    },
    WorkflowStateChanged {
        flag: WorkflowFlag,
        old: bool,
        new: bool,
    },
    AnalysisStarted {
        requirement: Requirement,
    },
    AnalysisCompleted {
        requirement: Requirement,
        success: bool,
        cancelled: bool,
        error: Option<String>,
        #[serde(with = "duration_millis")]
        elapsed: Duration,
    },
    ImportCompleted {
        operation: Uuid,
        source: PathBuf,
        additive: bool,
        added: usize,
        skipped: usize,
        method: String,
        #[serde(with = "duration_millis")]
        elapsed: Duration,
    },
    ImportFailed {
        operation: Uuid,
        source: PathBuf,
        reason: String,
        cancelled: bool,
    },
    ExportCompleted {
        destination: PathBuf,
        format: String,
        count: usize,
        success: bool,
        cancelled: bool,
        error: Option<String>,
        #[serde(with = "duration_millis")]
        elapsed: Duration,
    },
    BatchStarted {
        operation: Uuid,
        total: usize,
    },
    BatchProgress {
        operation: Uuid,
        global_id: String,
        completed: usize,
        total: usize,
    },
    BatchCompleted {
        operation: Uuid,
        total: usize,
        succeeded: usize,
        failed: usize,
        failures: Vec<BatchFailure>,
        cancelled: bool,
        #[serde(with = "duration_millis")]
        elapsed: Duration,
    },
    AttachmentScanStarted {
        operation: Uuid,
        project_id: String,
    },
    AttachmentScanProgress {
        operation: Uuid,
        project_id: String,
        percent: u8,
        message: String,
    },
    AttachmentScanCompleted {
        operation: Uuid,
        project_id: String,
        success: bool,
        cancelled: bool,
        error: Option<String>,
        attachments: Vec<Attachment>,
        #[serde(with = "duration_millis")]
        elapsed: Duration,
    },
}

impl DomainEvent {
    /// The subscription key for this event.
    pub fn kind(&self) -> EventKind {
        match self {
            Self::CollectionChanged { .. } => EventKind::CollectionChanged,
            Self::SelectionChanged { .. } => EventKind::SelectionChanged,
            Self::FieldUpdated { .. } => EventKind::FieldUpdated,
            Self::WorkflowStateChanged { .. } => EventKind::WorkflowStateChanged,
            Self::AnalysisStarted { .. } => EventKind::AnalysisStarted,
            Self::AnalysisCompleted { .. } => EventKind::AnalysisCompleted,
            Self::ImportCompleted { .. } => EventKind::ImportCompleted,
            Self::ImportFailed { .. } => EventKind::ImportFailed,
            Self::ExportCompleted { .. } => EventKind::ExportCompleted,
            Self::BatchStarted { .. } => EventKind::BatchStarted,
            Self::BatchProgress { .. } => EventKind::BatchProgress,
            Self::BatchCompleted { .. } => EventKind::BatchCompleted,
            Self::AttachmentScanStarted { .. } => EventKind::AttachmentScanStarted,
            Self::AttachmentScanProgress { .. } => EventKind::AttachmentScanProgress,
            Self::AttachmentScanCompleted { .. } => EventKind::AttachmentScanCompleted,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_kind_matches_serialized_tag() {
        let event = DomainEvent::WorkflowStateChanged {
            flag: WorkflowFlag::Dirty,
            old: false,
            new: true,
        };
        let json = serde_json::to_value(&event).unwrap();
        assert_eq!(json["type"], event.kind().as_str());
        assert_eq!(json["data"]["flag"], "dirty");
    }

    #[test]
    fn test_all_kinds_are_distinct() {
        let mut names: Vec<&str> = EventKind::ALL.iter().map(EventKind::as_str).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), EventKind::ALL.len());
    }
}
