//! Import and export of requirement documents.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info, warn};
use uuid::Uuid;

use super::{Completion, CANCELLED_REASON};
use crate::bus::EventBus;
use crate::capability::{DocumentExporter, DocumentParser, ExportFormat, ParsedDocument};
use crate::collection::CollectionManager;
use crate::error::{ReqflowError, ReqflowResult};
use crate::events::DomainEvent;
use crate::progress::{ProgressReporter, ProgressSink};
use crate::requirement::model::Requirement;
use crate::workflow::{WorkflowFlag, WorkflowState};

/// Result of an import call.
#[derive(Debug, Clone, Serialize)]
pub struct ImportOutcome {
    pub operation: Uuid,
    pub completion: Completion,
    pub added: usize,
    pub skipped: usize,
    pub method: Option<String>,
    #[serde(with = "crate::requirement::model::duration_millis")]
    pub elapsed: Duration,
}

/// Result of an export call.
#[derive(Debug, Clone, Serialize)]
pub struct ExportOutcome {
    pub destination: PathBuf,
    pub format: ExportFormat,
    pub count: usize,
    pub completion: Completion,
    #[serde(with = "crate::requirement::model::duration_millis")]
    pub elapsed: Duration,
}

pub struct ImportOrchestrator {
    parser: Arc<dyn DocumentParser>,
    exporter: Arc<dyn DocumentExporter>,
    collection: Arc<CollectionManager>,
    workflow: Arc<WorkflowState>,
    bus: Arc<EventBus>,
    milestones: [u8; 4],
}

impl ImportOrchestrator {
    pub fn new(
        parser: Arc<dyn DocumentParser>,
        exporter: Arc<dyn DocumentExporter>,
        collection: Arc<CollectionManager>,
        workflow: Arc<WorkflowState>,
        bus: Arc<EventBus>,
        milestones: [u8; 4],
    ) -> Self {
        Self {
            parser,
            exporter,
            collection,
            workflow,
            bus,
            milestones,
        }
    }

    /// Replace the collection with the records parsed from `source`.
    pub async fn import(
        &self,
        source: &Path,
        progress: Option<ProgressSink>,
        cancel: &CancellationToken,
    ) -> ReqflowResult<ImportOutcome> {
        self.run(source, false, progress, cancel).await
    }

    /// Merge records parsed from `source`, skipping identifiers already present.
    pub async fn import_additional(
        &self,
        source: &Path,
        progress: Option<ProgressSink>,
        cancel: &CancellationToken,
    ) -> ReqflowResult<ImportOutcome> {
        self.run(source, true, progress, cancel).await
    }

    async fn run(
        &self,
        source: &Path,
        additive: bool,
        progress: Option<ProgressSink>,
        cancel: &CancellationToken,
    ) -> ReqflowResult<ImportOutcome> {
        if source.as_os_str().is_empty() {
            return Err(ReqflowError::validation("import source must not be empty"));
        }
        let _guard = self.workflow.begin(WorkflowFlag::Importing)?;

        let operation = Uuid::new_v4();
        let started = Instant::now();
        let reporter = ProgressReporter::new(progress);
        let [start, parsing, parsed, committed] = self.milestones;

        info!(%operation, source = %source.display(), additive, "Import started");
        reporter.report(start, format!("Reading {}", source.display()));
        reporter.report(parsing, "Parsing document");

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = self.parser.parse(source, &reporter) => Some(result),
        };

        let mut document: ParsedDocument = match result {
            None => return Ok(self.failed(operation, source, Completion::Cancelled, started)),
            Some(Err(e)) => {
                error!(%operation, source = %source.display(), error = %format!("{e:#}"), "Document parse failed");
                let reason = format!("failed to parse {}: {e}", source.display());
                return Ok(self.failed(operation, source, Completion::Failed(reason), started));
            }
            Some(Ok(document)) => document,
        };

        // Nothing is committed once cancellation was requested.
        if cancel.is_cancelled() {
            return Ok(self.failed(operation, source, Completion::Cancelled, started));
        }

        let parsed_total = document.records.len();
        document.records.retain(|r| !r.global_id.trim().is_empty());
        let unidentified = parsed_total - document.records.len();
        if unidentified > 0 {
            warn!(%operation, source = %source.display(), unidentified, "Dropping requirements without identifier");
        }
        if document.records.is_empty() {
            warn!(%operation, source = %source.display(), "Document contained no requirements");
            let reason = format!("no requirements found in {}", source.display());
            return Ok(self.failed(operation, source, Completion::Failed(reason), started));
        }

        let parsed_count = document.records.len();
        reporter.report(parsed, format!("Parsed {parsed_count} requirements"));

        let (added, skipped) = if additive {
            let merged = self.collection.merge_missing(document.records);
            (merged.added.len(), merged.skipped + unidentified)
        } else {
            (self.collection.replace_all(document.records)?, unidentified)
        };

        let elapsed = started.elapsed();
        self.bus.publish(DomainEvent::ImportCompleted {
            operation,
            source: source.to_path_buf(),
            additive,
            added,
            skipped,
            method: document.method.clone(),
            elapsed,
        });
        reporter.report(committed, format!("Imported {added} requirements"));
        info!(
            %operation,
            added,
            skipped,
            method = %document.method,
            elapsed_ms = elapsed.as_millis() as u64,
            "Import completed"
        );

        Ok(ImportOutcome {
            operation,
            completion: Completion::Succeeded,
            added,
            skipped,
            method: Some(document.method),
            elapsed,
        })
    }

    fn failed(&self, operation: Uuid, source: &Path, completion: Completion, started: Instant) -> ImportOutcome {
        let reason = completion.error().unwrap_or_else(|| CANCELLED_REASON.to_string());
        let cancelled = completion.is_cancelled();
        if cancelled {
            info!(%operation, source = %source.display(), "Import cancelled");
        }
        self.bus.publish(DomainEvent::ImportFailed {
            operation,
            source: source.to_path_buf(),
            reason,
            cancelled,
        });
        ImportOutcome {
            operation,
            completion,
            added: 0,
            skipped: 0,
            method: None,
            elapsed: started.elapsed(),
        }
    }

    /// Write `records` to `destination`. Never touches the collection.
    ///
    /// Cancellation abandons the exporter mid-write and is reported through
    /// the outcome; the destination may be left partially written.
    pub async fn export(
        &self,
        records: &[Requirement],
        format: ExportFormat,
        destination: &Path,
        progress: Option<ProgressSink>,
        cancel: &CancellationToken,
    ) -> ReqflowResult<ExportOutcome> {
        if destination.as_os_str().is_empty() {
            return Err(ReqflowError::validation("export destination must not be empty"));
        }
        if records.is_empty() {
            return Err(ReqflowError::validation("nothing to export"));
        }

        let started = Instant::now();
        let reporter = ProgressReporter::new(progress);
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = self.exporter.export(records, format, destination, &reporter) => Some(result),
        };
        let completion = match result {
            None => {
                info!(destination = %destination.display(), %format, "Export cancelled");
                Completion::Cancelled
            }
            Some(Ok(())) => Completion::Succeeded,
            Some(Err(e)) => {
                error!(destination = %destination.display(), %format, error = %format!("{e:#}"), "Export failed");
                Completion::Failed(format!("failed to export to {}: {e}", destination.display()))
            }
        };
        let elapsed = started.elapsed();

        self.bus.publish(DomainEvent::ExportCompleted {
            destination: destination.to_path_buf(),
            format: format.to_string(),
            count: records.len(),
            success: completion.is_success(),
            cancelled: completion.is_cancelled(),
            error: completion.error(),
            elapsed,
        });
        if completion.is_success() {
            info!(destination = %destination.display(), %format, count = records.len(), "Export completed");
        }

        Ok(ExportOutcome {
            destination: destination.to_path_buf(),
            format,
            count: records.len(),
            completion,
            elapsed,
        })
    }
}
