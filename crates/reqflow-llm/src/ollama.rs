//! Ollama generation client used as the analysis capability.

use std::time::Duration;

use anyhow::{bail, Context, Result};
use async_trait::async_trait;
use serde::Deserialize;
use tracing::debug;

use reqflow_core::capability::AnalysisCapability;
use reqflow_core::progress::ProgressReporter;
use reqflow_core::requirement::model::{AnalysisReport, Requirement};

use crate::report::{build_prompt, parse_report};

/// Default Ollama API URL.
pub const DEFAULT_OLLAMA_URL: &str = "http://localhost:11434";

/// Default generation model.
pub const DEFAULT_GEN_MODEL: &str = "qwen2.5:7b";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

#[derive(Deserialize)]
struct GenerateResponse {
    #[serde(default)]
    response: String,
}

/// Analyzes requirements by asking a local Ollama model for a JSON report.
#[derive(Clone)]
pub struct OllamaAnalyzer {
    base_url: String,
    model: String,
    client: reqwest::Client,
}

impl OllamaAnalyzer {
    pub fn new(base_url: &str, model: &str) -> Self {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .unwrap_or_default();

        Self {
            base_url: base_url.trim_end_matches('/').to_string(),
            model: model.to_string(),
            client,
        }
    }

    /// Read `OLLAMA_URL` and `OLLAMA_GEN_MODEL`, falling back to defaults.
    /// An explicit `model` wins over the environment.
    pub fn from_env(model: Option<String>) -> Self {
        let base_url = std::env::var("OLLAMA_URL").unwrap_or_else(|_| DEFAULT_OLLAMA_URL.to_string());
        let model = model.unwrap_or_else(|| {
            std::env::var("OLLAMA_GEN_MODEL").unwrap_or_else(|_| DEFAULT_GEN_MODEL.to_string())
        });
        Self::new(&base_url, &model)
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    async fn generate(&self, prompt: &str) -> Result<String> {
        let request_body = serde_json::json!({
            "model": self.model,
            "prompt": prompt,
            "stream": false,
            "format": "json",
            "options": { "temperature": 0.2 }
        });

        let response = self
            .client
            .post(format!("{}/api/generate", self.base_url))
            .json(&request_body)
            .send()
            .await
            .with_context(|| format!("Failed to connect to Ollama at {}. Is it running?", self.base_url))?;

        if !response.status().is_success() {
            let status = response.status();
            let body = response.text().await.unwrap_or_default();
            if body.contains("model") && body.contains("not found") {
                bail!("Model '{}' not found. Pull it with: ollama pull {}", self.model, self.model);
            }
            bail!("Ollama API error ({}): {}", status, body);
        }

        let result: GenerateResponse = response
            .json()
            .await
            .context("Failed to parse Ollama response")?;
        Ok(result.response.trim().to_string())
    }

    /// Whether the server answers and has the configured model.
    pub async fn health_check(&self) -> bool {
        match self.client.get(format!("{}/api/tags", self.base_url)).send().await {
            Ok(resp) if resp.status().is_success() => {
                resp.text().await.unwrap_or_default().contains(&self.model)
            }
            _ => false,
        }
    }
}

#[async_trait]
impl AnalysisCapability for OllamaAnalyzer {
    async fn analyze(&self, requirement: &Requirement, progress: &ProgressReporter) -> Result<AnalysisReport> {
        progress.report(10, format!("Asking {} about {}", self.model, requirement.global_id));
        let prompt = build_prompt(requirement);
        let reply = self.generate(&prompt).await?;
        progress.report(90, "Parsing model reply");

        let report = parse_report(&reply)
            .with_context(|| format!("unusable reply for {}", requirement.global_id))?;
        debug!(
            global_id = %requirement.global_id,
            model = %self.model,
            score = report.quality_score,
            issues = report.issues.len(),
            "Requirement analyzed"
        );
        progress.report(100, "Analysis complete");
        Ok(report)
    }
}
