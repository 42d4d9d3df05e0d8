//! Prompt construction and lenient parsing of the model's quality report.

use anyhow::{bail, Context};
use serde::Deserialize;

use reqflow_core::requirement::model::{AnalysisIssue, AnalysisReport, IssueSeverity, Requirement};

/// Build the analysis prompt for one requirement.
pub fn build_prompt(requirement: &Requirement) -> String {
    let mut context = String::new();
    for (key, value) in &requirement.metadata {
        context.push_str(&format!("- {key}: {value}\n"));
    }
    if context.is_empty() {
        context.push_str("- (none)\n");
    }

    format!(
        r#"You are reviewing a software requirement for quality.

Requirement {id}: {name}
Text:
{description}

Metadata:
{context}
Assess it for ambiguity, testability, completeness, consistency and atomicity.
Respond ONLY with a JSON object of this exact shape:
{{
  "quality_score": <integer 1-10>,
  "issues": [{{"category": "<short name>", "severity": "low|medium|high", "description": "<what is wrong>"}}],
  "recommendations": ["<concrete change>"],
  "feedback": "<one paragraph summary>",
  "improved_text": "<rewritten requirement, or null if it is already good>"
}}"#,
        id = requirement.global_id,
        name = requirement.name,
        description = if requirement.description.is_empty() {
            "(no text)"
        } else {
            requirement.description.as_str()
        },
    )
}

#[derive(Deserialize)]
struct RawIssue {
    #[serde(default, alias = "type")]
    category: String,
    #[serde(default)]
    severity: String,
    #[serde(default, alias = "text")]
    description: String,
}

#[derive(Deserialize)]
struct RawReport {
    quality_score: Option<f64>,
    #[serde(default)]
    issues: Vec<RawIssue>,
    #[serde(default)]
    recommendations: Vec<String>,
    #[serde(default)]
    feedback: String,
    #[serde(default)]
    improved_text: Option<String>,
}

/// Extract the JSON object from a reply that may wrap it in prose or a code
/// fence.
pub fn extract_json(response: &str) -> &str {
    if let Some(start) = response.find("```") {
        let after_fence = &response[start + 3..];
        let body_start = after_fence.find('\n').map_or(0, |n| n + 1);
        let body = &after_fence[body_start..];
        if let Some(end) = body.find("```") {
            return body[..end].trim();
        }
    }

    match (response.find('{'), response.rfind('}')) {
        (Some(start), Some(end)) if end > start => &response[start..=end],
        _ => response.trim(),
    }
}

/// Parse the model's reply into a report.
pub fn parse_report(response: &str) -> anyhow::Result<AnalysisReport> {
    let json = extract_json(response);
    let raw: RawReport = serde_json::from_str(json).context("model reply is not a valid quality report")?;

    let Some(score) = raw.quality_score else {
        bail!("model reply has no quality_score");
    };

    let issues = raw
        .issues
        .into_iter()
        .filter(|i| !i.description.trim().is_empty())
        .map(|i| AnalysisIssue {
            category: if i.category.is_empty() { "general".to_string() } else { i.category },
            severity: IssueSeverity::from_str(&i.severity),
            description: i.description,
        })
        .collect();

    Ok(AnalysisReport {
        quality_score: score.round().clamp(0.0, 10.0) as u8,
        issues,
        recommendations: raw.recommendations,
        feedback: raw.feedback.trim().to_string(),
        improved_text: raw.improved_text.filter(|t| !t.trim().is_empty()),
    })
}
