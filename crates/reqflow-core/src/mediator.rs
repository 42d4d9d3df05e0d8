//! The requirements mediator: one entry point over state, events and workflows.
//!
//! A single long-lived instance is shared by every caller. Cloning is cheap;
//! clones share the same collection, bus and flags.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};

use crate::bus::{EventBus, EventHandler, SubscriptionId};
use crate::capability::{Capabilities, ExportFormat, WorkspaceStore};
use crate::collection::{CollectionManager, FieldUpdate, LoadOutcome};
use crate::config::MediatorConfig;
use crate::error::{ReqflowError, ReqflowResult};
use crate::events::{EventKind, Initiator};
use crate::natural;
use crate::orchestrator::{
    AnalysisOrchestrator, AnalysisOutcome, AttachmentScanOrchestrator, BatchSummary, Completion, ExportOutcome,
    ImportOrchestrator, ImportOutcome, ScanOutcome,
};
use crate::progress::ProgressSink;
use crate::requirement::model::Requirement;
use crate::requirement::AnalysisSelection;
use crate::workflow::{WorkflowSnapshot, WorkflowState};

/// Result of loading from or saving to a workspace.
#[derive(Debug, Clone, Serialize)]
pub struct PersistOutcome {
    pub workspace: PathBuf,
    pub completion: Completion,
    pub count: usize,
    /// Load only: the stored set matched the collection, which was kept.
    pub unchanged: bool,
    #[serde(with = "crate::requirement::model::duration_millis")]
    pub elapsed: Duration,
}

#[derive(Clone)]
pub struct RequirementsMediator {
    config: MediatorConfig,
    bus: Arc<EventBus>,
    workflow: Arc<WorkflowState>,
    collection: Arc<CollectionManager>,
    imports: Arc<ImportOrchestrator>,
    analysis: Arc<AnalysisOrchestrator>,
    attachments: Arc<AttachmentScanOrchestrator>,
    store: Arc<dyn WorkspaceStore>,
}

impl RequirementsMediator {
    pub fn new(capabilities: Capabilities, config: MediatorConfig) -> ReqflowResult<Self> {
        config.validate()?;

        let bus = Arc::new(EventBus::new(config.event_buffer));
        let workflow = Arc::new(WorkflowState::new(Arc::clone(&bus)));
        let collection = Arc::new(CollectionManager::new(Arc::clone(&bus), Arc::clone(&workflow)));

        let imports = ImportOrchestrator::new(
            capabilities.parser,
            capabilities.exporter,
            Arc::clone(&collection),
            Arc::clone(&workflow),
            Arc::clone(&bus),
            config.import_milestones,
        );
        let analysis = AnalysisOrchestrator::new(
            capabilities.analyzer,
            Arc::clone(&collection),
            Arc::clone(&workflow),
            Arc::clone(&bus),
            config.batch_concurrency,
        );
        let attachments = AttachmentScanOrchestrator::new(capabilities.discovery, Arc::clone(&bus));

        Ok(Self {
            config,
            bus,
            workflow,
            collection,
            imports: Arc::new(imports),
            analysis: Arc::new(analysis),
            attachments: Arc::new(attachments),
            store: capabilities.store,
        })
    }

    pub fn config(&self) -> &MediatorConfig {
        &self.config
    }

    pub fn bus(&self) -> &Arc<EventBus> {
        &self.bus
    }

    pub fn subscribe<H>(&self, kind: EventKind, handler: H) -> SubscriptionId
    where
        H: EventHandler + 'static,
    {
        self.bus.subscribe(kind, handler)
    }

    pub fn unsubscribe(&self, kind: EventKind, id: SubscriptionId) -> bool {
        self.bus.unsubscribe(kind, id)
    }

    pub fn collection(&self) -> &Arc<CollectionManager> {
        &self.collection
    }

    pub fn workflow(&self) -> WorkflowSnapshot {
        self.workflow.snapshot()
    }

    pub fn is_importing(&self) -> bool {
        self.workflow.is_importing()
    }

    pub fn is_analyzing(&self) -> bool {
        self.workflow.is_analyzing()
    }

    pub fn is_dirty(&self) -> bool {
        self.workflow.is_dirty()
    }

    /// Records in insertion order.
    pub fn requirements(&self) -> Vec<Requirement> {
        self.collection.snapshot()
    }

    /// Records ordered by identifier, numeric suffixes compared as numbers.
    pub fn requirements_sorted(&self) -> Vec<Requirement> {
        let mut records = self.collection.snapshot();
        natural::sort_requirements(&mut records);
        records
    }

    pub fn requirement(&self, global_id: &str) -> Option<Requirement> {
        self.collection.get(global_id)
    }

    pub fn current_requirement(&self) -> Option<Requirement> {
        self.collection.current()
    }

    pub fn total_requirements(&self) -> usize {
        self.collection.len()
    }

    pub fn add_requirement(&self, requirement: Requirement) -> ReqflowResult<usize> {
        self.collection.add(requirement)
    }

    pub fn remove_requirement(&self, global_id: &str) -> ReqflowResult<Requirement> {
        self.collection.remove(global_id)
    }

    pub fn clear_requirements(&self) -> usize {
        self.collection.clear()
    }

    pub fn select(&self, global_id: Option<&str>) -> ReqflowResult<()> {
        self.collection.select(global_id, Initiator::User)
    }

    pub fn update_fields(&self, global_id: &str, update: FieldUpdate) -> ReqflowResult<Vec<String>> {
        self.collection.update_fields(global_id, update, Initiator::User)
    }

    pub async fn import(
        &self,
        source: &Path,
        progress: Option<ProgressSink>,
        cancel: &CancellationToken,
    ) -> ReqflowResult<ImportOutcome> {
        self.imports.import(source, progress, cancel).await
    }

    pub async fn import_additional(
        &self,
        source: &Path,
        progress: Option<ProgressSink>,
        cancel: &CancellationToken,
    ) -> ReqflowResult<ImportOutcome> {
        self.imports.import_additional(source, progress, cancel).await
    }

    pub async fn export(
        &self,
        records: &[Requirement],
        format: ExportFormat,
        destination: &Path,
        progress: Option<ProgressSink>,
        cancel: &CancellationToken,
    ) -> ReqflowResult<ExportOutcome> {
        self.imports.export(records, format, destination, progress, cancel).await
    }

    pub async fn analyze_one(
        &self,
        global_id: &str,
        progress: Option<ProgressSink>,
        cancel: &CancellationToken,
    ) -> ReqflowResult<AnalysisOutcome> {
        self.analysis.analyze_one(global_id, progress, cancel).await
    }

    pub async fn analyze_batch(
        &self,
        records: Vec<Requirement>,
        progress: Option<ProgressSink>,
        cancel: &CancellationToken,
    ) -> ReqflowResult<BatchSummary> {
        self.analysis.analyze_batch(records, progress, cancel).await
    }

    pub async fn analyze_selection(
        &self,
        selection: AnalysisSelection,
        progress: Option<ProgressSink>,
        cancel: &CancellationToken,
    ) -> ReqflowResult<BatchSummary> {
        self.analysis.analyze_selection(selection, progress, cancel).await
    }

    pub async fn scan_attachments(
        &self,
        project_id: &str,
        progress: Option<ProgressSink>,
        cancel: &CancellationToken,
    ) -> ReqflowResult<ScanOutcome> {
        self.attachments.scan(project_id, progress, cancel).await
    }

    /// Reload the collection from the workspace store.
    ///
    /// An equivalent stored set keeps the in-memory records. The workspace is
    /// clean afterwards unless the load failed.
    pub async fn load_from_workspace(&self, workspace: &Path) -> ReqflowResult<PersistOutcome> {
        if workspace.as_os_str().is_empty() {
            return Err(ReqflowError::validation("workspace path must not be empty"));
        }
        let started = Instant::now();

        match self.store.load_requirements(workspace).await {
            Ok(records) => {
                let outcome = self.collection.load(records);
                let (count, unchanged) = match outcome {
                    LoadOutcome::Replaced { count } => (count, false),
                    LoadOutcome::Unchanged { count } => (count, true),
                };
                info!(workspace = %workspace.display(), count, unchanged, "Workspace loaded");
                Ok(PersistOutcome {
                    workspace: workspace.to_path_buf(),
                    completion: Completion::Succeeded,
                    count,
                    unchanged,
                    elapsed: started.elapsed(),
                })
            }
            Err(e) => {
                error!(workspace = %workspace.display(), error = %format!("{e:#}"), "Workspace load failed");
                Ok(PersistOutcome {
                    workspace: workspace.to_path_buf(),
                    completion: Completion::Failed(format!("failed to load {}: {e}", workspace.display())),
                    count: 0,
                    unchanged: false,
                    elapsed: started.elapsed(),
                })
            }
        }
    }

    /// Persist the collection. Clears the dirty flag on success.
    pub async fn save(&self, workspace: &Path) -> ReqflowResult<PersistOutcome> {
        if workspace.as_os_str().is_empty() {
            return Err(ReqflowError::validation("workspace path must not be empty"));
        }
        let started = Instant::now();
        let records = self.collection.snapshot();

        let completion = match self.store.save(workspace, &records).await {
            Ok(()) => {
                self.workflow.mark_clean();
                info!(workspace = %workspace.display(), count = records.len(), "Workspace saved");
                Completion::Succeeded
            }
            Err(e) => {
                error!(workspace = %workspace.display(), error = %format!("{e:#}"), "Workspace save failed");
                Completion::Failed(format!("failed to save {}: {e}", workspace.display()))
            }
        };

        Ok(PersistOutcome {
            workspace: workspace.to_path_buf(),
            completion,
            count: records.len(),
            unchanged: false,
            elapsed: started.elapsed(),
        })
    }
}
