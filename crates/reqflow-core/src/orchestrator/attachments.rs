//! Attachment discovery for an external project.
//!
//! A scan is one call into the discovery capability. It neither touches the
//! collection nor claims a workflow flag.

use std::sync::Arc;
use std::time::{Duration, Instant};

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use uuid::Uuid;

use super::Completion;
use crate::bus::EventBus;
use crate::capability::DiscoveryCapability;
use crate::error::{ReqflowError, ReqflowResult};
use crate::events::DomainEvent;
use crate::progress::{Progress, ProgressReporter, ProgressSink};
use crate::requirement::model::Attachment;

#[derive(Debug, Clone, Serialize)]
pub struct ScanOutcome {
    pub operation: Uuid,
    pub completion: Completion,
    pub attachments: Vec<Attachment>,
    #[serde(with = "crate::requirement::model::duration_millis")]
    pub elapsed: Duration,
}

pub struct AttachmentScanOrchestrator {
    discovery: Arc<dyn DiscoveryCapability>,
    bus: Arc<EventBus>,
}

impl AttachmentScanOrchestrator {
    pub fn new(discovery: Arc<dyn DiscoveryCapability>, bus: Arc<EventBus>) -> Self {
        Self { discovery, bus }
    }

    /// Discover the attachments of `project_id`.
    ///
    /// Progress from the capability goes to `progress` and is republished as
    /// `AttachmentScanProgress` events.
    pub async fn scan(
        &self,
        project_id: &str,
        progress: Option<ProgressSink>,
        cancel: &CancellationToken,
    ) -> ReqflowResult<ScanOutcome> {
        if project_id.trim().is_empty() {
            return Err(ReqflowError::validation("project identifier must not be empty"));
        }

        let operation = Uuid::new_v4();
        let project = project_id.to_string();
        let started = Instant::now();

        let bus = Arc::clone(&self.bus);
        let scan_project = project.clone();
        let republish: ProgressSink = Arc::new(move |p: Progress| {
            bus.publish(DomainEvent::AttachmentScanProgress {
                operation,
                project_id: scan_project.clone(),
                percent: p.percent,
                message: p.message,
            });
        });
        let reporter = ProgressReporter::new(progress).with_sink(republish);

        info!(%operation, project_id = %project, "Attachment scan started");
        self.bus.publish(DomainEvent::AttachmentScanStarted {
            operation,
            project_id: project.clone(),
        });

        let result = tokio::select! {
            biased;
            _ = cancel.cancelled() => None,
            result = self.discovery.discover(&project, &reporter) => Some(result),
        };

        let (completion, attachments) = match result {
            None => (Completion::Cancelled, Vec::new()),
            Some(Ok(attachments)) => (Completion::Succeeded, attachments),
            Some(Err(e)) => {
                error!(%operation, project_id = %project, error = %format!("{e:#}"), "Attachment scan failed");
                (Completion::Failed(e.to_string()), Vec::new())
            }
        };
        let elapsed = started.elapsed();

        self.bus.publish(DomainEvent::AttachmentScanCompleted {
            operation,
            project_id: project.clone(),
            success: completion.is_success(),
            cancelled: completion.is_cancelled(),
            error: completion.error(),
            attachments: attachments.clone(),
            elapsed,
        });
        info!(
            %operation,
            project_id = %project,
            count = attachments.len(),
            success = completion.is_success(),
            "Attachment scan finished"
        );

        Ok(ScanOutcome {
            operation,
            completion,
            attachments,
            elapsed,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::events::EventKind;
    use async_trait::async_trait;
    use std::sync::Mutex;

    struct TwoStepDiscovery;

    #[async_trait]
    impl DiscoveryCapability for TwoStepDiscovery {
        async fn discover(&self, project_id: &str, progress: &ProgressReporter) -> anyhow::Result<Vec<Attachment>> {
            if project_id == "offline" {
                anyhow::bail!("service unreachable");
            }
            progress.report(50, "listing");
            progress.report(100, "done");
            Ok(vec![Attachment {
                id: "att-1".to_string(),
                project_id: project_id.to_string(),
                file_name: "spec.pdf".to_string(),
                mime_type: Some("application/pdf".to_string()),
                size_bytes: Some(1024),
                location: format!("{project_id}/spec.pdf"),
            }])
        }
    }

    fn setup() -> (AttachmentScanOrchestrator, Arc<Mutex<Vec<DomainEvent>>>) {
        let bus = Arc::new(EventBus::default());
        let events = Arc::new(Mutex::new(Vec::new()));
        for kind in [
            EventKind::AttachmentScanStarted,
            EventKind::AttachmentScanProgress,
            EventKind::AttachmentScanCompleted,
        ] {
            let sink = Arc::clone(&events);
            bus.subscribe(kind, move |event: &DomainEvent| -> anyhow::Result<()> {
                sink.lock().unwrap().push(event.clone());
                Ok(())
            });
        }
        (AttachmentScanOrchestrator::new(Arc::new(TwoStepDiscovery), bus), events)
    }

    #[tokio::test]
    async fn test_scan_republishes_progress() {
        let (orchestrator, events) = setup();
        let caller = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&caller);

        let outcome = orchestrator
            .scan(
                "PRJ-7",
                Some(Arc::new(move |p: Progress| sink.lock().unwrap().push(p.percent))),
                &CancellationToken::new(),
            )
            .await
            .unwrap();

        assert!(outcome.completion.is_success());
        assert_eq!(outcome.attachments.len(), 1);
        assert_eq!(*caller.lock().unwrap(), vec![50, 100]);

        let kinds: Vec<EventKind> = events.lock().unwrap().iter().map(DomainEvent::kind).collect();
        assert_eq!(
            kinds,
            vec![
                EventKind::AttachmentScanStarted,
                EventKind::AttachmentScanProgress,
                EventKind::AttachmentScanProgress,
                EventKind::AttachmentScanCompleted,
            ]
        );
    }

    #[tokio::test]
    async fn test_scan_failure_is_reported_as_a_whole() {
        let (orchestrator, events) = setup();
        let outcome = orchestrator
            .scan("offline", None, &CancellationToken::new())
            .await
            .unwrap();

        assert_eq!(outcome.completion, Completion::Failed("service unreachable".to_string()));
        assert!(outcome.attachments.is_empty());
        let events = events.lock().unwrap();
        assert!(matches!(
            events.last(),
            Some(DomainEvent::AttachmentScanCompleted { success: false, .. })
        ));
    }

    #[tokio::test]
    async fn test_empty_project_rejected() {
        let (orchestrator, events) = setup();
        assert!(orchestrator.scan(" ", None, &CancellationToken::new()).await.is_err());
        assert!(events.lock().unwrap().is_empty());
    }
}
