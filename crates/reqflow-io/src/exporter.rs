//! Requirement export to JSON, Markdown and plain text.

use std::fmt::Write as _;
use std::path::Path;

use anyhow::Context;
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use reqflow_core::capability::{DocumentExporter, ExportFormat};
use reqflow_core::progress::ProgressReporter;
use reqflow_core::requirement::model::{ContentFragment, Requirement};

/// Writes exports to the local file system, creating parent directories.
#[derive(Debug, Clone, Default)]
pub struct FileExporter;

impl FileExporter {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DocumentExporter for FileExporter {
    async fn export(
        &self,
        records: &[Requirement],
        format: ExportFormat,
        destination: &Path,
        progress: &ProgressReporter,
    ) -> anyhow::Result<()> {
        progress.report(0, format!("Rendering {} requirements as {format}", records.len()));
        let content = render(records, format, Utc::now())?;
        progress.report(50, format!("Writing {}", destination.display()));
        if let Some(parent) = destination.parent().filter(|p| !p.as_os_str().is_empty()) {
            tokio::fs::create_dir_all(parent)
                .await
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        tokio::fs::write(destination, content)
            .await
            .with_context(|| format!("failed to write {}", destination.display()))?;
        debug!(destination = %destination.display(), %format, count = records.len(), "Export written");
        progress.report(100, "Export written");
        Ok(())
    }
}

#[derive(Serialize)]
struct JsonExport<'a> {
    exported_at: DateTime<Utc>,
    count: usize,
    requirements: &'a [Requirement],
}

/// Render `records` in `format`.
pub fn render(records: &[Requirement], format: ExportFormat, exported_at: DateTime<Utc>) -> anyhow::Result<String> {
    match format {
        ExportFormat::Json => {
            let export = JsonExport {
                exported_at,
                count: records.len(),
                requirements: records,
            };
            Ok(serde_json::to_string_pretty(&export)?)
        }
        ExportFormat::Markdown => Ok(render_markdown(records, exported_at)),
        ExportFormat::Text => Ok(render_text(records)),
    }
}

/// Markdown that the document parser reads back.
fn render_markdown(records: &[Requirement], exported_at: DateTime<Utc>) -> String {
    let mut out = String::new();
    let _ = writeln!(out, "# Requirements\n");
    let _ = writeln!(
        out,
        "Exported {} requirements on {}.\n",
        records.len(),
        exported_at.format("%Y-%m-%d %H:%M UTC")
    );

    for r in records {
        let _ = writeln!(out, "## {} {}", r.global_id, r.name);
        for (key, value) in &r.metadata {
            let _ = writeln!(out, "{key}: {value}");
        }
        out.push('\n');

        if !r.description.is_empty() {
            let _ = writeln!(out, "{}\n", r.description);
        }

        for fragment in &r.fragments {
            match fragment {
                ContentFragment::Paragraph { text } => {
                    let _ = writeln!(out, "{text}\n");
                }
                ContentFragment::Table { rows } => {
                    render_table(&mut out, rows);
                    out.push('\n');
                }
            }
        }

        if let Some(analysis) = &r.analysis {
            let _ = writeln!(out, "> Quality score: {}/10", analysis.quality_score);
            for issue in &analysis.issues {
                let _ = writeln!(
                    out,
                    "> - [{}] {}: {}",
                    issue.severity.as_str(),
                    issue.category,
                    issue.description
                );
            }
            if let Some(improved) = &analysis.improved_text {
                let _ = writeln!(out, "> Suggested: {improved}");
            }
            out.push('\n');
        }
    }
    out
}

fn render_table(out: &mut String, rows: &[Vec<String>]) {
    let Some(header) = rows.first() else {
        return;
    };
    let _ = writeln!(out, "| {} |", header.join(" | "));
    let _ = writeln!(out, "|{}|", vec!["---"; header.len()].join("|"));
    for row in &rows[1..] {
        let _ = writeln!(out, "| {} |", row.join(" | "));
    }
}

fn render_text(records: &[Requirement]) -> String {
    let mut out = String::new();
    for r in records {
        let _ = writeln!(out, "{}: {}", r.global_id, r.name);
        if !r.description.is_empty() {
            let _ = writeln!(out, "{}", r.description);
        }
        if let Some(analysis) = &r.analysis {
            let _ = writeln!(out, "Quality: {}/10 ({} issues)", analysis.quality_score, analysis.issues.len());
        }
        out.push('\n');
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::parser::parse_text;
    use pretty_assertions::assert_eq;
    use reqflow_core::progress::Progress;
    use reqflow_core::requirement::model::{Analysis, AnalysisReport};
    use std::sync::{Arc, Mutex};
    use std::time::Duration;

    fn sample() -> Vec<Requirement> {
        let mut login = Requirement::new("REQ-1", "Login", "The system shall authenticate users.")
            .with_metadata("Priority", "High");
        login.fragments.push(ContentFragment::Table {
            rows: vec![
                vec!["Role".to_string(), "Access".to_string()],
                vec!["admin".to_string(), "full".to_string()],
            ],
        });
        let report = AnalysisReport {
            quality_score: 7,
            ..AnalysisReport::default()
        };
        login.analysis = Some(Analysis::from_report(report, &login, Duration::from_millis(5)));
        vec![login, Requirement::new("REQ-2", "Logout", "")]
    }

    #[test]
    fn test_markdown_is_readable_by_parser() {
        let records = sample();
        let markdown = render(&records, ExportFormat::Markdown, Utc::now()).unwrap();
        assert!(markdown.contains("> Quality score: 7/10"));

        let parsed = parse_text(&markdown);
        assert_eq!(parsed.len(), 2);
        assert_eq!(parsed[0].global_id, "REQ-1");
        assert_eq!(parsed[0].description, records[0].description);
        assert_eq!(parsed[0].metadata, records[0].metadata);
        assert_eq!(parsed[0].fragments, records[0].fragments);
        assert_eq!(parsed[1].name, "Logout");
    }

    #[test]
    fn test_json_export_has_count() {
        let json = render(&sample(), ExportFormat::Json, Utc::now()).unwrap();
        let value: serde_json::Value = serde_json::from_str(&json).unwrap();
        assert_eq!(value["count"], 2);
        assert_eq!(value["requirements"][1]["global_id"], "REQ-2");
    }

    #[test]
    fn test_text_export() {
        let text = render(&sample(), ExportFormat::Text, Utc::now()).unwrap();
        assert!(text.starts_with("REQ-1: Login\nThe system shall authenticate users.\nQuality: 7/10 (0 issues)\n"));
    }

    #[tokio::test]
    async fn test_export_creates_parent_directories() {
        let dir = tempfile::tempdir().unwrap();
        let destination = dir.path().join("out").join("reqs.json");
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        let reporter = ProgressReporter::new(Some(Arc::new(move |p: Progress| sink.lock().unwrap().push(p.percent))));

        FileExporter::new()
            .export(&sample(), ExportFormat::Json, &destination, &reporter)
            .await
            .unwrap();
        assert!(destination.exists());
        assert_eq!(*seen.lock().unwrap(), vec![0, 50, 100]);
    }
}
