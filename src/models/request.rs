//! Analysis request types and input validation.

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use strum::{Display, EnumString};

/// A request to analyze a single piece of code.
///
/// Immutable once submitted; the pipeline derives a fingerprint from
/// the content fields and never mutates the request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AnalysisRequest {
    /// The code to analyze.
    pub code_content: String,
    /// Path of the file the code came from (used for language hints).
    pub file_path: String,
    /// Identifier of the requesting user.
    pub user_id: String,
    /// Free-form analysis options. Submission order is preserved for
    /// display; fingerprinting canonicalises separately.
    #[serde(default)]
    pub options: IndexMap<String, serde_json::Value>,
}

impl AnalysisRequest {
    /// Build a request with no options.
    pub fn new(
        code_content: impl Into<String>,
        file_path: impl Into<String>,
        user_id: impl Into<String>,
    ) -> Self {
        Self {
            code_content: code_content.into(),
            file_path: file_path.into(),
            user_id: user_id.into(),
            options: IndexMap::new(),
        }
    }

    /// Attach an option, returning the request for chaining.
    pub fn with_option(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.options.insert(key.into(), value);
        self
    }

    /// Validate the request shape. Empty content or path is a caller
    /// error and the only way a well-typed request can be rejected.
    pub fn validate(&self) -> Result<(), String> {
        if self.code_content.trim().is_empty() {
            return Err("code content must not be empty".to_string());
        }
        if self.file_path.trim().is_empty() {
            return Err("file path must not be empty".to_string());
        }
        Ok(())
    }

    /// The target capability, read from `options["capability"]`.
    ///
    /// Unknown or absent values return `None`, which maps to the
    /// generic fallback payload.
    pub fn category(&self) -> Option<RequestCategory> {
        self.options
            .get("capability")
            .and_then(|v| v.as_str())
            .and_then(|s| s.parse().ok())
    }
}

/// The capability a request targets, used to shape fallback payloads.
#[derive(
    Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Display, EnumString,
)]
#[serde(rename_all = "kebab-case")]
#[strum(serialize_all = "kebab-case")]
pub enum RequestCategory {
    Analysis,
    CommitMessage,
    PrDescription,
    Multimodal,
    TeamAnalytics,
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    #[test]
    fn validate_accepts_well_formed_request() {
        let req = AnalysisRequest::new("fn main() {}", "src/main.rs", "u1");
        assert!(req.validate().is_ok());
    }

    #[test]
    fn validate_rejects_empty_content() {
        let req = AnalysisRequest::new("", "src/main.rs", "u1");
        let err = req.validate().unwrap_err();
        assert!(err.contains("content"));
    }

    #[test]
    fn validate_rejects_whitespace_content() {
        let req = AnalysisRequest::new("   \n\t", "src/main.rs", "u1");
        assert!(req.validate().is_err());
    }

    #[test]
    fn validate_rejects_empty_path() {
        let req = AnalysisRequest::new("fn main() {}", "", "u1");
        let err = req.validate().unwrap_err();
        assert!(err.contains("path"));
    }

    #[test]
    fn category_from_capability_option() {
        let req = AnalysisRequest::new("code", "a.js", "u1")
            .with_option("capability", json!("commit-message"));
        assert_eq!(req.category(), Some(RequestCategory::CommitMessage));
    }

    #[test]
    fn category_absent_when_no_option() {
        let req = AnalysisRequest::new("code", "a.js", "u1");
        assert_eq!(req.category(), None);
    }

    #[test]
    fn category_absent_for_unknown_value() {
        let req =
            AnalysisRequest::new("code", "a.js", "u1").with_option("capability", json!("haiku"));
        assert_eq!(req.category(), None);
    }

    #[test]
    fn category_absent_for_non_string_value() {
        let req = AnalysisRequest::new("code", "a.js", "u1").with_option("capability", json!(7));
        assert_eq!(req.category(), None);
    }

    #[test]
    fn category_strings_roundtrip() {
        for (s, c) in [
            ("analysis", RequestCategory::Analysis),
            ("commit-message", RequestCategory::CommitMessage),
            ("pr-description", RequestCategory::PrDescription),
            ("multimodal", RequestCategory::Multimodal),
            ("team-analytics", RequestCategory::TeamAnalytics),
        ] {
            assert_eq!(s.parse::<RequestCategory>().unwrap(), c);
            assert_eq!(c.to_string(), s);
        }
    }
}
