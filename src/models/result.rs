//! Analysis result types: suggestions, metrics, batch output, and the
//! durable record shape.

use schemars::JsonSchema;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

/// Milliseconds since the Unix epoch, for result timestamps.
pub fn now_millis() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as u64)
        .unwrap_or(0)
}

fn is_false(b: &bool) -> bool {
    !*b
}

/// What kind of issue a suggestion addresses.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, JsonSchema)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionKind {
    Security,
    Performance,
    Maintainability,
    Style,
}

/// Custom deserializer that accepts common LLM variations.
///
/// Models sometimes return values like "perf", "vulnerability", or
/// "readability" instead of the expected vocabulary. This normalizes
/// them; anything unrecognised falls back to maintainability.
impl<'de> Deserialize<'de> for SuggestionKind {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        match s.to_lowercase().as_str() {
            "security" | "vulnerability" | "vuln" => Ok(SuggestionKind::Security),
            "performance" | "perf" | "optimization" => Ok(SuggestionKind::Performance),
            "maintainability" | "readability" | "complexity" | "refactor" => {
                Ok(SuggestionKind::Maintainability)
            }
            "style" | "formatting" | "convention" | "lint" => Ok(SuggestionKind::Style),
            _ => Ok(SuggestionKind::Maintainability),
        }
    }
}

impl fmt::Display for SuggestionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SuggestionKind::Security => write!(f, "security"),
            SuggestionKind::Performance => write!(f, "performance"),
            SuggestionKind::Maintainability => write!(f, "maintainability"),
            SuggestionKind::Style => write!(f, "style"),
        }
    }
}

/// How urgent a suggestion is.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, JsonSchema,
)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionSeverity {
    Low,
    Medium,
    High,
    Critical,
}

/// Lenient deserializer for LLM-produced severities; unrecognised
/// values fall back to medium rather than failing the whole response.
impl<'de> Deserialize<'de> for SuggestionSeverity {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        match s.to_lowercase().as_str() {
            "low" | "minor" | "info" | "trivial" | "note" => Ok(SuggestionSeverity::Low),
            "medium" | "moderate" | "warning" => Ok(SuggestionSeverity::Medium),
            "high" | "major" | "severe" | "error" => Ok(SuggestionSeverity::High),
            "critical" | "blocker" | "fatal" => Ok(SuggestionSeverity::Critical),
            _ => Ok(SuggestionSeverity::Medium),
        }
    }
}

impl fmt::Display for SuggestionSeverity {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SuggestionSeverity::Low => write!(f, "low"),
            SuggestionSeverity::Medium => write!(f, "medium"),
            SuggestionSeverity::High => write!(f, "high"),
            SuggestionSeverity::Critical => write!(f, "critical"),
        }
    }
}

/// Review lifecycle of a suggestion. Created as `Pending`; mutated only
/// through explicit status-update calls, never deleted.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SuggestionStatus {
    #[default]
    Pending,
    Accepted,
    Rejected,
    Applied,
}

impl std::str::FromStr for SuggestionStatus {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "pending" => Ok(SuggestionStatus::Pending),
            "accepted" => Ok(SuggestionStatus::Accepted),
            "rejected" => Ok(SuggestionStatus::Rejected),
            "applied" => Ok(SuggestionStatus::Applied),
            _ => Err(format!("unknown suggestion status: {s}")),
        }
    }
}

/// A single improvement suggestion within an analysis result.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Suggestion {
    /// Stable identifier, assigned when the analysis is constructed.
    pub id: String,
    pub kind: SuggestionKind,
    pub severity: SuggestionSeverity,
    /// 1-based line the suggestion refers to.
    pub line: u32,
    /// 1-based column, 0 when unknown.
    #[serde(default)]
    pub column: u32,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub suggested_fix: Option<String>,
    /// Model confidence in `[0, 1]`.
    pub confidence: f32,
    #[serde(default)]
    pub status: SuggestionStatus,
}

impl Suggestion {
    /// Build a suggestion with a fresh id, pending status, and
    /// confidence clamped to `[0, 1]`.
    pub fn new(
        kind: SuggestionKind,
        severity: SuggestionSeverity,
        line: u32,
        column: u32,
        message: impl Into<String>,
        suggested_fix: Option<String>,
        confidence: f32,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            kind,
            severity,
            line,
            column,
            message: message.into(),
            suggested_fix,
            confidence: confidence.clamp(0.0, 1.0),
            status: SuggestionStatus::Pending,
        }
    }
}

/// A security problem surfaced by the analysis.
#[derive(Debug, Clone, Serialize, Deserialize, JsonSchema)]
pub struct SecurityIssue {
    pub severity: SuggestionSeverity,
    pub description: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub line: Option<u32>,
}

/// Code metrics computed alongside suggestions.
#[derive(Debug, Clone, Default, Serialize, Deserialize, JsonSchema)]
pub struct CodeMetrics {
    pub complexity: u32,
    pub maintainability_index: u32,
    pub lines_of_code: u32,
    pub language: String,
}

/// The complete outcome of analyzing one request.
///
/// `is_fallback == true` implies `analyzed_by_upstream == false`;
/// constructors preserve the invariant. The `from_cache` /
/// `from_database` flags are provenance tags set only on returned
/// copies; they are never stored, so cached content stays
/// byte-identical across hits.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisResult {
    /// Overall quality score, 0–100.
    pub quality_score: u8,
    pub suggestions: Vec<Suggestion>,
    /// Detected pattern descriptors (e.g. "callback-pyramid").
    pub patterns: Vec<String>,
    pub security_issues: Vec<SecurityIssue>,
    pub metrics: CodeMetrics,
    /// Whether the upstream AI actually produced this result.
    pub analyzed_by_upstream: bool,
    /// Whether this is a synthesized degraded result.
    pub is_fallback: bool,
    /// Why a fallback was served, when it was.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub fallback_reason: Option<String>,
    pub computed_at_millis: u64,
    #[serde(default, skip_serializing_if = "is_false")]
    pub from_cache: bool,
    #[serde(default, skip_serializing_if = "is_false")]
    pub from_database: bool,
}

impl AnalysisResult {
    /// Tag a copy as served from the fast cache tier.
    pub fn tagged_from_cache(mut self) -> Self {
        self.from_cache = true;
        self
    }

    /// Tag a copy as served from the durable store tier.
    pub fn tagged_from_database(mut self) -> Self {
        self.from_database = true;
        self
    }

    /// Strip provenance tags, restoring the storable form.
    pub fn untagged(mut self) -> Self {
        self.from_cache = false;
        self.from_database = false;
        self
    }
}

/// Lifecycle state of a durable analysis record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnalysisStatus {
    Completed,
    Fallback,
    Failed,
}

/// A persisted analysis: audit trail plus the durable cache tier.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRecord {
    pub id: String,
    pub fingerprint: String,
    pub user_id: String,
    pub file_path: String,
    pub status: AnalysisStatus,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    pub result: AnalysisResult,
    pub created_at_millis: u64,
}

impl AnalysisRecord {
    /// Build a record for a freshly computed result.
    pub fn new(
        fingerprint: impl Into<String>,
        user_id: impl Into<String>,
        file_path: impl Into<String>,
        status: AnalysisStatus,
        error: Option<String>,
        result: AnalysisResult,
    ) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            fingerprint: fingerprint.into(),
            user_id: user_id.into(),
            file_path: file_path.into(),
            status,
            error,
            result: result.untagged(),
            created_at_millis: now_millis(),
        }
    }

    /// Age of the record relative to `now_millis()`.
    pub fn age_millis(&self) -> u64 {
        now_millis().saturating_sub(self.created_at_millis)
    }
}

/// One item of batch output: either a completed analysis or an isolated
/// per-item failure.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "lowercase")]
pub enum BatchEntry {
    Completed(AnalysisResult),
    Failed { file_path: String, error: String },
}

impl BatchEntry {
    pub fn result(&self) -> Option<&AnalysisResult> {
        match self {
            BatchEntry::Completed(r) => Some(r),
            BatchEntry::Failed { .. } => None,
        }
    }
}

/// Aggregate statistics over a batch run.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BatchSummary {
    pub total: usize,
    pub successful: usize,
    pub failed: usize,
    /// Mean quality score over successful items only.
    pub average_quality_score: f64,
    /// Suggestions summed across successful items.
    pub total_suggestions: usize,
}

impl BatchSummary {
    /// Compute the summary from a list of batch entries.
    pub fn from_entries(entries: &[BatchEntry]) -> Self {
        let mut s = BatchSummary {
            total: entries.len(),
            ..Default::default()
        };
        let mut score_sum: u64 = 0;
        for entry in entries {
            match entry.result() {
                Some(r) => {
                    s.successful += 1;
                    score_sum += u64::from(r.quality_score);
                    s.total_suggestions += r.suggestions.len();
                }
                None => s.failed += 1,
            }
        }
        if s.successful > 0 {
            s.average_quality_score = score_sum as f64 / s.successful as f64;
        }
        s
    }
}

/// Batch results plus their summary.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BatchOutput {
    pub results: Vec<BatchEntry>,
    pub summary: BatchSummary,
}
