//! Multi-step asynchronous workflows.
//!
//! Orchestrators call injected capabilities, convert their failures into
//! outcomes and events, and never let a capability error escape. Only caller
//! mistakes (empty arguments, a busy workflow flag) are returned as `Err`.

pub mod analysis;
pub mod attachments;
pub mod import;

pub use analysis::{AnalysisOrchestrator, AnalysisOutcome, BatchSummary};
pub use attachments::{AttachmentScanOrchestrator, ScanOutcome};
pub use import::{ExportOutcome, ImportOrchestrator, ImportOutcome};

use serde::Serialize;

/// How a long-running operation ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", content = "reason", rename_all = "snake_case")]
pub enum Completion {
    Succeeded,
    Failed(String),
    Cancelled,
}

impl Completion {
    pub fn is_success(&self) -> bool {
        matches!(self, Self::Succeeded)
    }

    pub fn is_cancelled(&self) -> bool {
        matches!(self, Self::Cancelled)
    }

    /// Display-safe failure message, if any.
    pub fn error(&self) -> Option<String> {
        match self {
            Self::Succeeded => None,
            Self::Failed(reason) => Some(reason.clone()),
            Self::Cancelled => Some(CANCELLED_REASON.to_string()),
        }
    }
}

/// Reason attached to events of cancelled operations.
pub const CANCELLED_REASON: &str = "operation cancelled";
