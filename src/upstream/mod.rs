//! UpstreamAnalyzer trait and LLM integration.
//!
//! Provides an abstraction layer over rig-core to decouple the
//! pipeline from the specific LLM library, plus the error
//! classification rules the circuit breaker feeds on.

pub mod classify;
pub mod rig;

use async_trait::async_trait;
use indexmap::IndexMap;
use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::models::{CodeMetrics, SecurityIssue, SuggestionKind, SuggestionSeverity};

/// Errors from the upstream analyzer.
#[derive(Error, Debug)]
pub enum UpstreamError {
    /// A remote API failure, with the HTTP status when one is known.
    #[error("upstream API error{}: {message}", .status.map(|s| format!(" ({s})")).unwrap_or_default())]
    Api { status: Option<u16>, message: String },

    #[error("failed to parse upstream response: {0}")]
    Parse(String),

    #[error("upstream not configured: {0}")]
    NotConfigured(String),
}

/// What the AI backend returns for one piece of code, before the
/// pipeline attaches ids, status, and provenance.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RawAnalysis {
    /// Overall quality score. Clamped to 0–100 by the caller.
    pub quality_score: u32,
    #[serde(default)]
    pub suggestions: Vec<RawSuggestion>,
    #[serde(default)]
    pub patterns: Vec<String>,
    #[serde(default)]
    pub security_issues: Vec<SecurityIssue>,
    #[serde(default)]
    pub metrics: CodeMetrics,
}

/// A suggestion as produced by the model.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct RawSuggestion {
    pub kind: SuggestionKind,
    pub severity: SuggestionSeverity,
    pub line: u32,
    #[serde(default)]
    pub column: u32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_fix: Option<String>,
    /// Model confidence in `[0, 1]`.
    #[serde(default = "default_confidence")]
    pub confidence: f32,
}

fn default_confidence() -> f32 {
    0.5
}

/// Trait for the external AI analysis capability.
///
/// Implementations are opaque to the pipeline: they may be slow,
/// rate-limited, or down, and report failures through
/// [`UpstreamError`] so they can be classified and absorbed.
#[async_trait]
pub trait UpstreamAnalyzer: Send + Sync {
    /// Analyze one piece of code.
    async fn invoke(
        &self,
        code_content: &str,
        file_path: &str,
        options: &IndexMap<String, serde_json::Value>,
    ) -> Result<RawAnalysis, UpstreamError>;
}
