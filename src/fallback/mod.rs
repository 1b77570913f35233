//! Degraded result synthesis.
//!
//! When the AI backend cannot be reached (circuit open, timeout, rate
//! limit, outage) the pipeline still owes the caller a usable result.
//! This module maps a request's capability category to a static,
//! clearly-marked degraded payload. Synthesis is pure and infallible;
//! an unknown category yields the generic payload.

use crate::constants::FALLBACK_QUALITY_SCORE;
use crate::models::result::now_millis;
use crate::models::{
    AnalysisResult, CodeMetrics, RequestCategory, Suggestion, SuggestionKind, SuggestionSeverity,
};

/// The degraded-notice message for a category.
fn notice_for(category: Option<RequestCategory>) -> &'static str {
    match category {
        Some(RequestCategory::Analysis) => {
            "AI code analysis is temporarily unavailable. This is a basic automated \
             response; re-run the analysis shortly for full results."
        }
        Some(RequestCategory::CommitMessage) => {
            "AI commit message generation is temporarily unavailable. Describe the \
             change manually, e.g. \"chore: update implementation\"."
        }
        Some(RequestCategory::PrDescription) => {
            "AI pull request description generation is temporarily unavailable. \
             Summarize the change set manually."
        }
        Some(RequestCategory::Multimodal) => {
            "AI multimodal analysis is temporarily unavailable. Only text-based \
             review is possible right now."
        }
        Some(RequestCategory::TeamAnalytics) => {
            "AI team analytics are temporarily unavailable. Recent aggregates may \
             be stale until the service recovers."
        }
        None => "AI assistance is temporarily unavailable. Please try again shortly.",
    }
}

/// Synthesize a degraded result for the given category.
///
/// The payload is shaped like a real [`AnalysisResult`] so callers
/// need no special handling: a conservative placeholder quality score,
/// one low-severity notice suggestion, empty findings, and the
/// fallback markers set (`is_fallback` true, `analyzed_by_upstream`
/// false).
pub fn synthesize(category: Option<RequestCategory>, reason: &str) -> AnalysisResult {
    let notice = Suggestion::new(
        SuggestionKind::Maintainability,
        SuggestionSeverity::Low,
        1,
        0,
        notice_for(category),
        None,
        1.0,
    );

    AnalysisResult {
        quality_score: FALLBACK_QUALITY_SCORE,
        suggestions: vec![notice],
        patterns: vec![],
        security_issues: vec![],
        metrics: CodeMetrics::default(),
        analyzed_by_upstream: false,
        is_fallback: true,
        fallback_reason: Some(reason.to_string()),
        computed_at_millis: now_millis(),
        from_cache: false,
        from_database: false,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fallback_markers_are_set() {
        let result = synthesize(Some(RequestCategory::Analysis), "circuit breaker open");
        assert!(result.is_fallback);
        assert!(!result.analyzed_by_upstream);
        assert_eq!(result.quality_score, FALLBACK_QUALITY_SCORE);
        assert_eq!(
            result.fallback_reason.as_deref(),
            Some("circuit breaker open")
        );
    }

    #[test]
    fn every_category_produces_a_notice() {
        for category in [
            Some(RequestCategory::Analysis),
            Some(RequestCategory::CommitMessage),
            Some(RequestCategory::PrDescription),
            Some(RequestCategory::Multimodal),
            Some(RequestCategory::TeamAnalytics),
            None,
        ] {
            let result = synthesize(category, "outage");
            assert_eq!(result.suggestions.len(), 1, "for {category:?}");
            assert!(
                result.suggestions[0]
                    .message
                    .contains("temporarily unavailable"),
                "for {category:?}"
            );
        }
    }

    #[test]
    fn unknown_category_is_generic() {
        let result = synthesize(None, "outage");
        assert!(result.suggestions[0].message.contains("AI assistance"));
    }

    #[test]
    fn payload_is_shaped_like_a_real_result() {
        let result = synthesize(Some(RequestCategory::CommitMessage), "rate limited");
        // Serializes with the same shape callers always consume.
        let json = serde_json::to_value(&result).unwrap();
        assert_eq!(json["is_fallback"], true);
        assert_eq!(json["analyzed_by_upstream"], false);
        assert!(json["suggestions"].is_array());
        assert!(json["metrics"].is_object());
    }
}
