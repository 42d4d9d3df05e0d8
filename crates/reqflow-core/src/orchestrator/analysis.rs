//! Single and batch requirement analysis.
//!
//! Each record is analyzed best-effort: a failure leaves any previous
//! analysis in place and is reported, never rolled back or retried. A batch
//! always runs to the end of its input unless cancelled; items already
//! committed stay committed.

use std::sync::Arc;
use std::time::{Duration, Instant};

use futures::stream::{self, StreamExt};
use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use uuid::Uuid;

use super::Completion;
use crate::bus::EventBus;
use crate::capability::AnalysisCapability;
use crate::collection::{CollectionManager, RecordKey};
use crate::error::{ReqflowError, ReqflowResult};
use crate::events::{BatchFailure, DomainEvent};
use crate::progress::{Progress, ProgressReporter, ProgressSink};
use crate::requirement::model::{Analysis, Requirement};
use crate::requirement::AnalysisSelection;
use crate::workflow::{WorkflowFlag, WorkflowState};

/// Result of analyzing one record.
#[derive(Debug, Clone, Serialize)]
pub struct AnalysisOutcome {
    pub global_id: String,
    pub completion: Completion,
    /// The record as it is in the collection after the call.
    pub requirement: Requirement,
    #[serde(with = "crate::requirement::model::duration_millis")]
    pub elapsed: Duration,
}

/// Aggregate result of a batch.
///
/// `succeeded + failed + skipped == total`. Items are skipped only when the
/// batch is cancelled.
#[derive(Debug, Clone, Default, Serialize)]
pub struct BatchSummary {
    pub operation: Option<Uuid>,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    pub skipped: usize,
    pub failures: Vec<BatchFailure>,
    pub cancelled: bool,
    #[serde(with = "crate::requirement::model::duration_millis")]
    pub elapsed: Duration,
}

enum ItemResult {
    Analyzed(usize, AnalysisOutcome),
    Skipped,
}

pub struct AnalysisOrchestrator {
    analyzer: Arc<dyn AnalysisCapability>,
    collection: Arc<CollectionManager>,
    workflow: Arc<WorkflowState>,
    bus: Arc<EventBus>,
    concurrency: usize,
}

impl AnalysisOrchestrator {
    pub fn new(
        analyzer: Arc<dyn AnalysisCapability>,
        collection: Arc<CollectionManager>,
        workflow: Arc<WorkflowState>,
        bus: Arc<EventBus>,
        concurrency: usize,
    ) -> Self {
        Self {
            analyzer,
            collection,
            workflow,
            bus,
            concurrency: concurrency.max(1),
        }
    }

    /// Analyze the first record with `global_id`.
    pub async fn analyze_one(
        &self,
        global_id: &str,
        progress: Option<ProgressSink>,
        cancel: &CancellationToken,
    ) -> ReqflowResult<AnalysisOutcome> {
        if global_id.trim().is_empty() {
            return Err(ReqflowError::validation("requirement identifier must not be empty"));
        }
        let (key, record) = self
            .collection
            .locate(global_id)
            .ok_or_else(|| ReqflowError::not_found(global_id))?;
        let _guard = self.workflow.begin(WorkflowFlag::Analyzing)?;

        Ok(self
            .analyze_record(record, Some(key), &ProgressReporter::new(progress), cancel)
            .await)
    }

    /// Analyze `record` and attach the result to the slot `key`.
    async fn analyze_record(
        &self,
        record: Requirement,
        key: Option<RecordKey>,
        reporter: &ProgressReporter,
        cancel: &CancellationToken,
    ) -> AnalysisOutcome {
        let global_id = record.global_id.clone();
        self.bus.publish(DomainEvent::AnalysisStarted {
            requirement: record.clone(),
        });
        debug!(global_id = %global_id, "Analysis started");

        let started = Instant::now();
        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = self.analyzer.analyze(&record, reporter) => Some(result),
        };
        let elapsed = started.elapsed();

        let (completion, requirement) = match result {
            None => (Completion::Cancelled, record),
            Some(Err(e)) => {
                error!(global_id = %global_id, error = %format!("{e:#}"), "Analysis failed");
                (Completion::Failed(e.to_string()), record)
            }
            Some(Ok(report)) => {
                // Hash the content that was actually analyzed, not whatever
                // the record looks like now.
                let analysis = Analysis::from_report(report, &record, elapsed);
                match key.and_then(|key| self.collection.attach_analysis_at(key, analysis)) {
                    Some(updated) => (Completion::Succeeded, updated),
                    None => (Completion::Failed(ReqflowError::not_found(&global_id).to_string()), record),
                }
            }
        };

        self.bus.publish(DomainEvent::AnalysisCompleted {
            requirement: requirement.clone(),
            success: completion.is_success(),
            cancelled: completion.is_cancelled(),
            error: completion.error(),
            elapsed,
        });
        debug!(global_id = %global_id, ?completion, elapsed_ms = elapsed.as_millis() as u64, "Analysis finished");

        AnalysisOutcome {
            global_id,
            completion,
            requirement,
            elapsed,
        }
    }

    /// Analyze `records` in input order.
    ///
    /// Up to the configured concurrency records are in flight at once. Each
    /// input is matched to its own slot up front, so records sharing an
    /// identifier each receive their own result. An empty input returns an
    /// empty summary without touching any state.
    pub async fn analyze_batch(
        &self,
        records: Vec<Requirement>,
        progress: Option<ProgressSink>,
        cancel: &CancellationToken,
    ) -> ReqflowResult<BatchSummary> {
        if records.is_empty() {
            return Ok(BatchSummary::default());
        }
        let _guard = self.workflow.begin(WorkflowFlag::Analyzing)?;

        let operation = Uuid::new_v4();
        let total = records.len();
        let started = Instant::now();
        let reporter = ProgressReporter::new(progress);
        info!(%operation, total, concurrency = self.concurrency, "Batch analysis started");
        self.bus.publish(DomainEvent::BatchStarted { operation, total });

        let keys = self.collection.resolve_keys(&records);
        let silent = ProgressReporter::silent();
        let silent = &silent;
        let mut items = stream::iter(records.into_iter().zip(keys).enumerate())
            .map(|(index, (record, key))| async move {
                if cancel.is_cancelled() {
                    return ItemResult::Skipped;
                }
                ItemResult::Analyzed(index, self.analyze_record(record, key, silent, cancel).await)
            })
            .buffer_unordered(self.concurrency);

        let mut summary = BatchSummary {
            operation: Some(operation),
            total,
            ..BatchSummary::default()
        };
        let mut failures: Vec<(usize, BatchFailure)> = Vec::new();
        let mut completed = 0;

        while let Some(item) = items.next().await {
            let (index, outcome) = match item {
                ItemResult::Skipped => {
                    summary.skipped += 1;
                    continue;
                }
                ItemResult::Analyzed(index, outcome) => (index, outcome),
            };

            match &outcome.completion {
                Completion::Succeeded => summary.succeeded += 1,
                Completion::Cancelled => summary.skipped += 1,
                Completion::Failed(error) => {
                    summary.failed += 1;
                    failures.push((
                        index,
                        BatchFailure {
                            global_id: outcome.global_id.clone(),
                            error: error.clone(),
                        },
                    ));
                }
            }

            completed += 1;
            self.bus.publish(DomainEvent::BatchProgress {
                operation,
                global_id: outcome.global_id.clone(),
                completed,
                total,
            });
            reporter.emit(Progress::fraction(
                completed,
                total,
                format!("Analyzed {} ({completed}/{total})", outcome.global_id),
            ));
        }

        failures.sort_by_key(|(index, _)| *index);
        summary.failures = failures.into_iter().map(|(_, failure)| failure).collect();
        summary.cancelled = cancel.is_cancelled();
        summary.elapsed = started.elapsed();

        self.bus.publish(DomainEvent::BatchCompleted {
            operation,
            total,
            succeeded: summary.succeeded,
            failed: summary.failed,
            failures: summary.failures.clone(),
            cancelled: summary.cancelled,
            elapsed: summary.elapsed,
        });
        info!(
            %operation,
            total,
            succeeded = summary.succeeded,
            failed = summary.failed,
            skipped = summary.skipped,
            cancelled = summary.cancelled,
            "Batch analysis completed"
        );
        Ok(summary)
    }

    /// Analyze every record matching `selection`.
    pub async fn analyze_selection(
        &self,
        selection: AnalysisSelection,
        progress: Option<ProgressSink>,
        cancel: &CancellationToken,
    ) -> ReqflowResult<BatchSummary> {
        let records = self.collection.filter(selection);
        debug!(?selection, count = records.len(), "Selected records for analysis");
        self.analyze_batch(records, progress, cancel).await
    }
}
