//! End-to-end scenarios through the public mediator API with in-memory
//! capabilities.

use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use pretty_assertions::assert_eq;
use tokio_util::sync::CancellationToken;

use reqflow_core::capability::{
    AnalysisCapability, Capabilities, DiscoveryCapability, DocumentExporter, DocumentParser, ExportFormat,
    ParsedDocument, WorkspaceStore,
};
use reqflow_core::collection::FieldUpdate;
use reqflow_core::events::{CollectionAction, DomainEvent, EventKind};
use reqflow_core::orchestrator::Completion;
use reqflow_core::progress::ProgressReporter;
use reqflow_core::requirement::model::{AnalysisReport, Attachment, Requirement};
use reqflow_core::requirement::AnalysisSelection;
use reqflow_core::workflow::WorkflowFlag;
use reqflow_core::{MediatorConfig, ReqflowError, RequirementsMediator};

#[derive(Default)]
struct MapParser {
    documents: HashMap<PathBuf, Vec<Requirement>>,
    /// Sources whose parse blocks until cancelled.
    hanging: Vec<PathBuf>,
}

#[async_trait]
impl DocumentParser for MapParser {
    async fn parse(&self, source: &Path, progress: &ProgressReporter) -> anyhow::Result<ParsedDocument> {
        if self.hanging.iter().any(|p| p == source) {
            std::future::pending::<()>().await;
        }
        progress.report(50, "parsing");
        let records = self
            .documents
            .get(source)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("unsupported document format"))?;
        Ok(ParsedDocument {
            records,
            method: "memory".to_string(),
            elapsed: Duration::from_millis(1),
        })
    }
}

#[derive(Default)]
struct RecordingExporter {
    written: Mutex<Vec<(PathBuf, ExportFormat, usize)>>,
}

#[async_trait]
impl DocumentExporter for RecordingExporter {
    async fn export(
        &self,
        records: &[Requirement],
        format: ExportFormat,
        destination: &Path,
        _progress: &ProgressReporter,
    ) -> anyhow::Result<()> {
        self.written
            .lock()
            .unwrap()
            .push((destination.to_path_buf(), format, records.len()));
        Ok(())
    }
}

struct KeywordAnalyzer;

#[async_trait]
impl AnalysisCapability for KeywordAnalyzer {
    async fn analyze(&self, requirement: &Requirement, _progress: &ProgressReporter) -> anyhow::Result<AnalysisReport> {
        if requirement.description.contains("TBD") {
            anyhow::bail!("requirement text is incomplete");
        }
        let score = if requirement.description.contains("shall") { 9 } else { 5 };
        Ok(AnalysisReport {
            quality_score: score,
            feedback: "ok".to_string(),
            ..AnalysisReport::default()
        })
    }
}

struct StaticDiscovery;

#[async_trait]
impl DiscoveryCapability for StaticDiscovery {
    async fn discover(&self, project_id: &str, progress: &ProgressReporter) -> anyhow::Result<Vec<Attachment>> {
        progress.report(100, "done");
        Ok(vec![Attachment {
            id: "1".to_string(),
            project_id: project_id.to_string(),
            file_name: "diagram.png".to_string(),
            mime_type: None,
            size_bytes: None,
            location: "diagram.png".to_string(),
        }])
    }
}

#[derive(Default)]
struct MemoryStore {
    saved: Mutex<HashMap<PathBuf, Vec<Requirement>>>,
}

#[async_trait]
impl WorkspaceStore for MemoryStore {
    async fn load_requirements(&self, workspace: &Path) -> anyhow::Result<Vec<Requirement>> {
        self.saved
            .lock()
            .unwrap()
            .get(workspace)
            .cloned()
            .ok_or_else(|| anyhow::anyhow!("workspace not initialized"))
    }

    async fn save(&self, workspace: &Path, records: &[Requirement]) -> anyhow::Result<()> {
        self.saved
            .lock()
            .unwrap()
            .insert(workspace.to_path_buf(), records.to_vec());
        Ok(())
    }
}

fn three_records() -> Vec<Requirement> {
    vec![
        Requirement::new("REQ-1", "Login", "The system shall authenticate users"),
        Requirement::new("REQ-2", "Logout", "The system shall end sessions"),
        Requirement::new("REQ-3", "Reports", "TBD"),
    ]
}

struct Harness {
    mediator: RequirementsMediator,
    events: Arc<Mutex<Vec<DomainEvent>>>,
    store: Arc<MemoryStore>,
    exporter: Arc<RecordingExporter>,
}

fn harness() -> Harness {
    let mut parser = MapParser::default();
    parser.documents.insert(PathBuf::from("three.docx"), three_records());
    parser.documents.insert(
        PathBuf::from("more.docx"),
        vec![
            Requirement::new("REQ-3", "Reports", "duplicate"),
            Requirement::new("REQ-10", "Export", "The system shall export"),
        ],
    );
    parser.documents.insert(PathBuf::from("empty.docx"), Vec::new());
    parser.hanging.push(PathBuf::from("slow.docx"));

    let store = Arc::new(MemoryStore::default());
    let exporter = Arc::new(RecordingExporter::default());
    let capabilities = Capabilities {
        parser: Arc::new(parser),
        exporter: exporter.clone(),
        analyzer: Arc::new(KeywordAnalyzer),
        discovery: Arc::new(StaticDiscovery),
        store: store.clone(),
    };
    let mediator = RequirementsMediator::new(capabilities, MediatorConfig::default()).unwrap();

    let events = Arc::new(Mutex::new(Vec::new()));
    for kind in EventKind::ALL {
        let sink = Arc::clone(&events);
        mediator.subscribe(kind, move |event: &DomainEvent| -> anyhow::Result<()> {
            sink.lock().unwrap().push(event.clone());
            Ok(())
        });
    }

    Harness {
        mediator,
        events,
        store,
        exporter,
    }
}

impl Harness {
    fn kinds(&self) -> Vec<EventKind> {
        self.events.lock().unwrap().iter().map(DomainEvent::kind).collect()
    }

    fn clear_events(&self) {
        self.events.lock().unwrap().clear();
    }

    fn collection_events(&self) -> Vec<(CollectionAction, usize)> {
        self.events
            .lock()
            .unwrap()
            .iter()
            .filter_map(|e| match e {
                DomainEvent::CollectionChanged { action, new_count, .. } => Some((*action, *new_count)),
                _ => None,
            })
            .collect()
    }
}

#[tokio::test]
async fn import_three_records_selects_first_and_marks_dirty() {
    let h = harness();
    let outcome = h
        .mediator
        .import(Path::new("three.docx"), None, &CancellationToken::new())
        .await
        .unwrap();

    assert!(outcome.completion.is_success());
    assert_eq!(outcome.added, 3);
    assert_eq!(h.mediator.total_requirements(), 3);
    assert!(h.mediator.is_dirty());
    assert!(!h.mediator.is_importing());
    assert_eq!(h.mediator.current_requirement(), Some(three_records()[0].clone()));
    assert_eq!(h.collection_events(), vec![(CollectionAction::Import, 3)]);
    assert!(h.kinds().contains(&EventKind::ImportCompleted));
}

#[tokio::test]
async fn import_flag_is_raised_and_lowered_once() {
    let h = harness();
    h.mediator
        .import(Path::new("three.docx"), None, &CancellationToken::new())
        .await
        .unwrap();

    let importing: Vec<(bool, bool)> = h
        .events
        .lock()
        .unwrap()
        .iter()
        .filter_map(|e| match e {
            DomainEvent::WorkflowStateChanged {
                flag: WorkflowFlag::Importing,
                old,
                new,
            } => Some((*old, *new)),
            _ => None,
        })
        .collect();
    assert_eq!(importing, vec![(false, true), (true, false)]);
}

#[tokio::test]
async fn removing_current_record_moves_selection_to_first_remaining() {
    let h = harness();
    h.mediator
        .import(Path::new("three.docx"), None, &CancellationToken::new())
        .await
        .unwrap();
    h.mediator.select(Some("REQ-2")).unwrap();
    h.clear_events();

    h.mediator.remove_requirement("REQ-2").unwrap();

    assert_eq!(h.collection_events(), vec![(CollectionAction::Remove, 2)]);
    assert_eq!(
        h.mediator.current_requirement().map(|r| r.global_id),
        Some("REQ-1".to_string())
    );
}

#[tokio::test]
async fn additive_import_is_idempotent() {
    let h = harness();
    let cancel = CancellationToken::new();
    h.mediator.import(Path::new("three.docx"), None, &cancel).await.unwrap();

    let first = h
        .mediator
        .import_additional(Path::new("more.docx"), None, &cancel)
        .await
        .unwrap();
    assert_eq!((first.added, first.skipped), (1, 1));
    assert_eq!(h.mediator.total_requirements(), 4);

    h.clear_events();
    let second = h
        .mediator
        .import_additional(Path::new("more.docx"), None, &cancel)
        .await
        .unwrap();

    assert!(second.completion.is_success());
    assert_eq!(second.added, 0);
    assert_eq!(h.mediator.total_requirements(), 4);
    assert!(h.collection_events().is_empty());
    assert!(h.kinds().contains(&EventKind::ImportCompleted));
}

#[tokio::test]
async fn failed_and_empty_imports_leave_collection_untouched() {
    let h = harness();
    let cancel = CancellationToken::new();
    h.mediator.import(Path::new("three.docx"), None, &cancel).await.unwrap();
    h.clear_events();

    let unknown = h
        .mediator
        .import(Path::new("notes.xyz"), None, &cancel)
        .await
        .unwrap();
    assert!(matches!(unknown.completion, Completion::Failed(ref r) if r.contains("unsupported document format")));

    let empty = h.mediator.import(Path::new("empty.docx"), None, &cancel).await.unwrap();
    assert!(matches!(empty.completion, Completion::Failed(_)));

    assert_eq!(h.mediator.total_requirements(), 3);
    assert!(h.collection_events().is_empty());
    assert_eq!(
        h.kinds()
            .into_iter()
            .filter(|k| *k == EventKind::ImportFailed)
            .count(),
        2
    );
}

#[tokio::test]
async fn second_import_while_first_is_running_is_rejected() {
    let h = harness();
    let cancel = CancellationToken::new();
    let background = h.mediator.clone();
    let token = cancel.clone();
    let slow = tokio::spawn(async move { background.import(Path::new("slow.docx"), None, &token).await });

    // wait until the background import owns the flag
    while !h.mediator.is_importing() {
        tokio::task::yield_now().await;
    }
    let rejected = h
        .mediator
        .import(Path::new("three.docx"), None, &CancellationToken::new())
        .await;
    assert!(matches!(rejected, Err(ReqflowError::Busy(WorkflowFlag::Importing))));

    cancel.cancel();
    let outcome = slow.await.unwrap().unwrap();
    assert!(outcome.completion.is_cancelled());
    assert!(!h.mediator.is_importing());
    assert_eq!(h.mediator.total_requirements(), 0);
    assert!(h.events.lock().unwrap().iter().any(|e| matches!(
        e,
        DomainEvent::ImportFailed { cancelled: true, .. }
    )));
}

#[tokio::test]
async fn batch_analysis_counts_failures_and_marks_dirty() {
    let h = harness();
    let cancel = CancellationToken::new();
    h.mediator.import(Path::new("three.docx"), None, &cancel).await.unwrap();
    h.mediator.save(Path::new("ws")).await.unwrap();
    assert!(!h.mediator.is_dirty());

    let summary = h
        .mediator
        .analyze_selection(AnalysisSelection::Unanalyzed, None, &cancel)
        .await
        .unwrap();

    assert_eq!(summary.total, 3);
    assert_eq!(summary.succeeded, 2);
    assert_eq!(summary.failed, 1);
    assert_eq!(summary.failures[0].global_id, "REQ-3");
    assert!(h.mediator.is_dirty());
    assert!(!h.mediator.is_analyzing());

    let unanalyzed: Vec<String> = h
        .mediator
        .collection()
        .filter(AnalysisSelection::Unanalyzed)
        .into_iter()
        .map(|r| r.global_id)
        .collect();
    assert_eq!(unanalyzed, vec!["REQ-3".to_string()]);

    let kinds = h.kinds();
    assert_eq!(kinds.iter().filter(|k| **k == EventKind::AnalysisStarted).count(), 3);
    assert_eq!(kinds.iter().filter(|k| **k == EventKind::AnalysisCompleted).count(), 3);
    assert_eq!(kinds.last(), Some(&EventKind::WorkflowStateChanged));
    assert!(kinds.contains(&EventKind::BatchCompleted));
}

#[tokio::test]
async fn edits_after_analysis_are_detected_as_modified() {
    let h = harness();
    let cancel = CancellationToken::new();
    h.mediator.import(Path::new("three.docx"), None, &cancel).await.unwrap();
    let outcome = h.mediator.analyze_one("REQ-1", None, &cancel).await.unwrap();

    let analysis = outcome.requirement.analysis.clone().unwrap();
    assert!(analysis.is_analyzed());
    assert_eq!(analysis.quality_score, 9);
    assert!(h
        .mediator
        .collection()
        .filter(AnalysisSelection::ModifiedSinceAnalysis)
        .is_empty());

    h.mediator
        .update_fields(
            "REQ-1",
            FieldUpdate::default().description("The system shall authenticate users with MFA"),
        )
        .unwrap();

    let modified: Vec<String> = h
        .mediator
        .collection()
        .filter(AnalysisSelection::ModifiedSinceAnalysis)
        .into_iter()
        .map(|r| r.global_id)
        .collect();
    assert_eq!(modified, vec!["REQ-1".to_string()]);
}

#[tokio::test]
async fn reloading_unchanged_workspace_keeps_collection() {
    let h = harness();
    let cancel = CancellationToken::new();
    let workspace = Path::new("ws");
    h.mediator.import(Path::new("three.docx"), None, &cancel).await.unwrap();
    let saved = h.mediator.save(workspace).await.unwrap();
    assert!(saved.completion.is_success());
    h.mediator.select(Some("REQ-2")).unwrap();
    h.clear_events();

    let loaded = h.mediator.load_from_workspace(workspace).await.unwrap();

    assert!(loaded.unchanged);
    assert!(h.collection_events().is_empty());
    let selections: Vec<Option<String>> = h
        .events
        .lock()
        .unwrap()
        .iter()
        .filter_map(|e| match e {
            DomainEvent::SelectionChanged { selected, .. } => Some(selected.as_ref().map(|r| r.global_id.clone())),
            _ => None,
        })
        .collect();
    assert_eq!(selections, vec![Some("REQ-2".to_string())]);
    assert!(!h.mediator.is_dirty());
    assert_eq!(h.store.saved.lock().unwrap()[workspace].len(), 3);
}

#[tokio::test]
async fn loading_missing_workspace_is_a_failure_outcome() {
    let h = harness();
    let outcome = h.mediator.load_from_workspace(Path::new("nowhere")).await.unwrap();
    assert!(matches!(outcome.completion, Completion::Failed(_)));
    assert!(h.collection_events().is_empty());
}

#[tokio::test]
async fn export_does_not_mutate_collection() {
    let h = harness();
    let cancel = CancellationToken::new();
    h.mediator.import(Path::new("three.docx"), None, &cancel).await.unwrap();
    let dirty_before = h.mediator.is_dirty();
    h.clear_events();

    let records = h.mediator.requirements_sorted();
    let outcome = h
        .mediator
        .export(&records, ExportFormat::Markdown, Path::new("out.md"), None, &cancel)
        .await
        .unwrap();

    assert!(outcome.completion.is_success());
    assert_eq!(h.kinds(), vec![EventKind::ExportCompleted]);
    assert_eq!(h.mediator.is_dirty(), dirty_before);
    assert_eq!(
        *h.exporter.written.lock().unwrap(),
        vec![(PathBuf::from("out.md"), ExportFormat::Markdown, 3)]
    );
}

#[tokio::test]
async fn attachment_scan_does_not_touch_collection_or_flags() {
    let h = harness();
    let outcome = h
        .mediator
        .scan_attachments("PRJ-1", None, &CancellationToken::new())
        .await
        .unwrap();

    assert_eq!(outcome.attachments.len(), 1);
    assert_eq!(
        h.kinds(),
        vec![
            EventKind::AttachmentScanStarted,
            EventKind::AttachmentScanProgress,
            EventKind::AttachmentScanCompleted,
        ]
    );
    assert!(!h.mediator.is_dirty());
}

#[tokio::test]
async fn sorted_view_uses_natural_order() {
    let h = harness();
    for id in ["REQ-10", "ABC-1", "REQ-2", "REQ-1"] {
        h.mediator.add_requirement(Requirement::new(id, id, "")).unwrap();
    }
    let ids: Vec<String> = h.mediator.requirements_sorted().into_iter().map(|r| r.global_id).collect();
    assert_eq!(ids, vec!["ABC-1", "REQ-1", "REQ-2", "REQ-10"]);
}
