//! Format-detecting requirement document parser.
//!
//! Supported inputs:
//! - JSON: an array of requirements, or an object with a `requirements` array
//! - Markdown / plain text: one requirement per identifier line
//!
//! In text documents a requirement starts at a heading whose first word is
//! an identifier (`## REQ-12 Login`) or at a plain line of the form
//! `REQ-12: Login`. `Key: value` lines directly below the header become
//! metadata, the first paragraph becomes the description, and any further
//! paragraphs and pipe tables are kept as content fragments. Lines starting
//! with `>` are annotations and are ignored.

use std::collections::BTreeMap;
use std::path::Path;
use std::time::Instant;

use anyhow::{bail, Context};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use reqflow_core::capability::{DocumentParser, ParsedDocument};
use reqflow_core::progress::ProgressReporter;
use reqflow_core::requirement::model::{ContentFragment, Requirement};

/// Reads requirement documents from the local file system.
#[derive(Debug, Clone, Default)]
pub struct FileDocumentParser;

impl FileDocumentParser {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl DocumentParser for FileDocumentParser {
    async fn parse(&self, source: &Path, progress: &ProgressReporter) -> anyhow::Result<ParsedDocument> {
        let started = Instant::now();
        let extension = source
            .extension()
            .and_then(|e| e.to_str())
            .map(str::to_lowercase)
            .unwrap_or_default();

        let method = match extension.as_str() {
            "json" => "json",
            "md" | "markdown" => "markdown",
            "txt" | "text" => "text",
            "" => bail!("cannot detect the format of {}", source.display()),
            other => bail!("unsupported document format: .{other}"),
        };

        let content = tokio::fs::read_to_string(source)
            .await
            .with_context(|| format!("failed to read {}", source.display()))?;
        progress.report(40, format!("Read {} bytes", content.len()));

        let records = match method {
            "json" => parse_json(&content).with_context(|| format!("invalid JSON in {}", source.display()))?,
            _ => parse_text(&content),
        };
        progress.report(60, format!("Found {} requirements", records.len()));
        debug!(source = %source.display(), method, count = records.len(), "Document parsed");

        Ok(ParsedDocument {
            records,
            method: method.to_string(),
            elapsed: started.elapsed(),
        })
    }
}

#[derive(Deserialize)]
#[serde(untagged)]
enum JsonDocument {
    List(Vec<Requirement>),
    Wrapped { requirements: Vec<Requirement> },
}

/// Parse a JSON requirements document.
pub fn parse_json(content: &str) -> anyhow::Result<Vec<Requirement>> {
    let document: JsonDocument = serde_json::from_str(content)?;
    Ok(match document {
        JsonDocument::List(records) => records,
        JsonDocument::Wrapped { requirements } => requirements,
    })
}

/// Parse a Markdown or plain-text requirements document.
pub fn parse_text(content: &str) -> Vec<Requirement> {
    let mut records = Vec::new();
    let mut draft: Option<Draft> = None;

    for line in content.lines() {
        if let Some((id, name)) = split_header(line) {
            if let Some(done) = draft.take() {
                records.push(done.finish());
            }
            draft = Some(Draft::new(id, name));
            continue;
        }
        // Preamble before the first identifier is ignored
        if let Some(current) = draft.as_mut() {
            current.push_line(line);
        }
    }

    if let Some(done) = draft.take() {
        records.push(done.finish());
    }
    records
}

/// Whether `token` looks like a requirement identifier, e.g. `REQ-12` or
/// `SYS_REQ-4.1`.
fn is_identifier(token: &str) -> bool {
    let Some(first) = token.chars().next() else {
        return false;
    };
    first.is_ascii_alphabetic()
        && token.contains('-')
        && token.chars().last().is_some_and(|c| c.is_ascii_digit())
        && token
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.'))
}

/// Split a header line into identifier and name.
fn split_header(line: &str) -> Option<(&str, &str)> {
    let stripped = line.trim();
    let heading = stripped.starts_with('#');
    let text = stripped.trim_start_matches('#').trim_start();

    let end = text.find(|c: char| c.is_whitespace() || c == ':').unwrap_or(text.len());
    let (token, rest) = text.split_at(end);
    if !is_identifier(token) {
        return None;
    }
    // Plain lines need an explicit colon so prose mentioning an id is not a header
    if !heading && !rest.starts_with(':') {
        return None;
    }
    let name = rest.trim_start_matches(|c: char| c == ':' || c == '-' || c.is_whitespace());
    Some((token, name.trim_end()))
}

/// `Key: value` with a single-word key.
fn split_metadata(line: &str) -> Option<(&str, &str)> {
    let (key, value) = line.trim().split_once(':')?;
    let key = key.trim();
    let value = value.trim();
    let valid_key = !key.is_empty()
        && key.len() <= 32
        && key.chars().all(|c| c.is_alphanumeric() || c == '_' || c == '-');
    (valid_key && !value.is_empty()).then_some((key, value))
}

fn is_table_separator(line: &str) -> bool {
    line.trim()
        .chars()
        .all(|c| matches!(c, '|' | '-' | ':' | ' '))
}

fn table_cells(line: &str) -> Vec<String> {
    line.trim()
        .trim_matches('|')
        .split('|')
        .map(|cell| cell.trim().to_string())
        .collect()
}

struct Draft {
    global_id: String,
    name: String,
    metadata: BTreeMap<String, String>,
    blocks: Vec<ContentFragment>,
    paragraph: Vec<String>,
    table: Vec<Vec<String>>,
    /// Still directly below the header, where metadata lines are accepted.
    in_header: bool,
}

impl Draft {
    fn new(global_id: &str, name: &str) -> Self {
        Self {
            global_id: global_id.to_string(),
            name: if name.is_empty() { global_id.to_string() } else { name.to_string() },
            metadata: BTreeMap::new(),
            blocks: Vec::new(),
            paragraph: Vec::new(),
            table: Vec::new(),
            in_header: true,
        }
    }

    fn push_line(&mut self, line: &str) {
        let trimmed = line.trim();
        if trimmed.is_empty() {
            self.flush_paragraph();
            self.flush_table();
            self.in_header = false;
            return;
        }
        if trimmed.starts_with('>') {
            return;
        }
        if trimmed.starts_with('|') {
            self.flush_paragraph();
            self.in_header = false;
            if !is_table_separator(trimmed) {
                self.table.push(table_cells(trimmed));
            }
            return;
        }
        if self.in_header {
            if let Some((key, value)) = split_metadata(trimmed) {
                self.metadata.insert(key.to_string(), value.to_string());
                return;
            }
            self.in_header = false;
        }
        self.flush_table();
        self.paragraph.push(trimmed.to_string());
    }

    fn flush_paragraph(&mut self) {
        if !self.paragraph.is_empty() {
            let text = self.paragraph.join(" ");
            self.paragraph.clear();
            self.blocks.push(ContentFragment::Paragraph { text });
        }
    }

    fn flush_table(&mut self) {
        if !self.table.is_empty() {
            let rows = std::mem::take(&mut self.table);
            self.blocks.push(ContentFragment::Table { rows });
        }
    }

    fn finish(mut self) -> Requirement {
        self.flush_paragraph();
        self.flush_table();

        let first_paragraph = self
            .blocks
            .iter()
            .position(|b| matches!(b, ContentFragment::Paragraph { .. }));
        let description = match first_paragraph.map(|i| self.blocks.remove(i)) {
            Some(ContentFragment::Paragraph { text }) => text,
            _ => String::new(),
        };

        let mut requirement = Requirement::new(self.global_id, self.name, description);
        requirement.metadata = self.metadata;
        requirement.fragments = self.blocks;
        requirement
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    const SAMPLE: &str = "\
# Authentication requirements

Imported from the customer workbook.

## REQ-1 Login
Priority: High
Owner: platform

The system shall authenticate users
with a password.

Passwords are never stored in plain text.

| Role | Access |
|------|--------|
| admin | full |
| guest | none |

> reviewed 2024-03-01

## REQ-2: Logout
The system shall end the session on logout.

REQ-10: Audit trail
Every login attempt shall be recorded.
";

    #[test]
    fn test_parse_text_document() {
        let records = parse_text(SAMPLE);
        let ids: Vec<&str> = records.iter().map(|r| r.global_id.as_str()).collect();
        assert_eq!(ids, vec!["REQ-1", "REQ-2", "REQ-10"]);

        let login = &records[0];
        assert_eq!(login.name, "Login");
        assert_eq!(login.description, "The system shall authenticate users with a password.");
        assert_eq!(login.metadata.get("Priority").map(String::as_str), Some("High"));
        assert_eq!(login.metadata.get("Owner").map(String::as_str), Some("platform"));
        assert_eq!(
            login.fragments,
            vec![
                ContentFragment::Paragraph {
                    text: "Passwords are never stored in plain text.".to_string()
                },
                ContentFragment::Table {
                    rows: vec![
                        vec!["Role".to_string(), "Access".to_string()],
                        vec!["admin".to_string(), "full".to_string()],
                        vec!["guest".to_string(), "none".to_string()],
                    ]
                },
            ]
        );

        assert_eq!(records[1].name, "Logout");
        assert_eq!(records[2].name, "Audit trail");
        assert_eq!(records[2].description, "Every login attempt shall be recorded.");
    }

    #[test]
    fn test_prose_mentioning_an_identifier_is_not_a_header() {
        let records = parse_text("REQ-1: Parent\nREQ-2 depends on this one.\n");
        assert_eq!(records.len(), 1);
        assert_eq!(records[0].description, "REQ-2 depends on this one.");
    }

    #[test]
    fn test_document_without_identifiers_yields_nothing() {
        assert!(parse_text("# Notes\n\nNothing to see here.\n").is_empty());
        assert!(parse_text("").is_empty());
    }

    #[test]
    fn test_identifier_shapes() {
        assert!(is_identifier("REQ-1"));
        assert!(is_identifier("SYS_REQ-4.1"));
        assert!(!is_identifier("REQ"));
        assert!(!is_identifier("1-REQ"));
        assert!(!is_identifier("REQ-A"));
    }

    #[test]
    fn test_parse_json_shapes() {
        let list = parse_json(r#"[{"global_id": "REQ-1", "name": "Login"}]"#).unwrap();
        assert_eq!(list.len(), 1);
        assert_eq!(list[0].description, "");

        let wrapped = parse_json(r#"{"requirements": [{"global_id": "REQ-2", "name": "Logout"}]}"#).unwrap();
        assert_eq!(wrapped[0].global_id, "REQ-2");

        assert!(parse_json("{\"items\": []}").is_err());
    }

    #[tokio::test]
    async fn test_parser_detects_format_from_extension() {
        let dir = tempfile::tempdir().unwrap();
        let markdown = dir.path().join("reqs.md");
        tokio::fs::write(&markdown, SAMPLE).await.unwrap();

        let parsed = FileDocumentParser::new()
            .parse(&markdown, &ProgressReporter::silent())
            .await
            .unwrap();
        assert_eq!(parsed.method, "markdown");
        assert_eq!(parsed.records.len(), 3);

        let unknown = dir.path().join("reqs.docx");
        tokio::fs::write(&unknown, "binary").await.unwrap();
        let err = FileDocumentParser::new()
            .parse(&unknown, &ProgressReporter::silent())
            .await
            .unwrap_err();
        assert!(err.to_string().contains("unsupported document format"));

        let missing = FileDocumentParser::new()
            .parse(&dir.path().join("missing.json"), &ProgressReporter::silent())
            .await;
        assert!(missing.is_err());
    }
}
