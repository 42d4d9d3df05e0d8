//! LLM-backed analysis capability for reqflow.
//!
//! Talks to a local Ollama server. Configure with `OLLAMA_URL` and
//! `OLLAMA_GEN_MODEL`.

pub mod ollama;
pub mod report;

pub use ollama::{OllamaAnalyzer, DEFAULT_GEN_MODEL, DEFAULT_OLLAMA_URL};
