//! Integration tests using mock upstream analyzers.
//!
//! Validates the pipeline end-to-end without making real API calls:
//! cache idempotence, the durable store tier, single-flight
//! deduplication, circuit breaker behavior, batch isolation, and
//! fallback synthesis.

use std::collections::HashSet;
use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::time::Duration;

use async_trait::async_trait;
use indexmap::IndexMap;
use pretty_assertions::assert_eq;

use kritiq::breaker::{BreakerConfig, CircuitBreaker};
use kritiq::cache::CacheEngine;
use kritiq::constants::SERVICE_ANALYSIS;
use kritiq::models::{
    AnalysisRequest, AnalysisStatus, BatchEntry, CodeMetrics, SuggestionKind, SuggestionSeverity,
    SuggestionStatus,
};
use kritiq::notify::NoopNotifier;
use kritiq::pipeline::{AnalysisPipeline, AnalyzeError, PipelineConfig};
use kritiq::store::{AnalysisStore, FileStore};
use kritiq::upstream::{RawAnalysis, RawSuggestion, UpstreamAnalyzer, UpstreamError};

/// A mock analyzer that returns a canned analysis and counts calls.
struct CountingAnalyzer {
    calls: AtomicUsize,
    delay: Duration,
    score: u32,
}

impl CountingAnalyzer {
    fn new(score: u32) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            delay: Duration::ZERO,
            score,
        }
    }

    fn with_delay(score: u32, delay: Duration) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            delay,
            score,
        }
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UpstreamAnalyzer for CountingAnalyzer {
    async fn invoke(
        &self,
        _code_content: &str,
        _file_path: &str,
        _options: &IndexMap<String, serde_json::Value>,
    ) -> Result<RawAnalysis, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        if !self.delay.is_zero() {
            tokio::time::sleep(self.delay).await;
        }
        Ok(RawAnalysis {
            quality_score: self.score,
            suggestions: vec![RawSuggestion {
                kind: SuggestionKind::Maintainability,
                severity: SuggestionSeverity::Medium,
                line: 1,
                column: 1,
                message: "consider splitting this function".into(),
                suggested_fix: None,
                confidence: 0.7,
            }],
            patterns: vec!["module".into()],
            security_issues: vec![],
            metrics: CodeMetrics {
                complexity: 2,
                maintainability_index: 80,
                lines_of_code: 10,
                language: "javascript".into(),
            },
        })
    }
}

/// A mock analyzer that always fails with a fixed status.
struct FailingAnalyzer {
    calls: AtomicUsize,
    status: u16,
    message: String,
}

impl FailingAnalyzer {
    fn new(status: u16, message: &str) -> Self {
        Self {
            calls: AtomicUsize::new(0),
            status,
            message: message.to_string(),
        }
    }

    fn call_count(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl UpstreamAnalyzer for FailingAnalyzer {
    async fn invoke(
        &self,
        _code_content: &str,
        _file_path: &str,
        _options: &IndexMap<String, serde_json::Value>,
    ) -> Result<RawAnalysis, UpstreamError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        Err(UpstreamError::Api {
            status: Some(self.status),
            message: self.message.clone(),
        })
    }
}

/// A mock analyzer that fails for specific file paths only.
struct ScriptedAnalyzer {
    inner: CountingAnalyzer,
    fail_paths: HashSet<String>,
    fail_status: u16,
}

impl ScriptedAnalyzer {
    fn new(fail_paths: &[&str], fail_status: u16) -> Self {
        Self {
            inner: CountingAnalyzer::new(85),
            fail_paths: fail_paths.iter().map(|s| s.to_string()).collect(),
            fail_status,
        }
    }
}

#[async_trait]
impl UpstreamAnalyzer for ScriptedAnalyzer {
    async fn invoke(
        &self,
        code_content: &str,
        file_path: &str,
        options: &IndexMap<String, serde_json::Value>,
    ) -> Result<RawAnalysis, UpstreamError> {
        if self.fail_paths.contains(file_path) {
            return Err(UpstreamError::Api {
                status: Some(self.fail_status),
                message: "scripted failure".into(),
            });
        }
        self.inner.invoke(code_content, file_path, options).await
    }
}

/// Default tuning for tests: tight timeouts, 3-failure breaker.
fn test_pipeline_config() -> PipelineConfig {
    PipelineConfig {
        upstream_timeout: Duration::from_secs(2),
        store_timeout: Duration::from_secs(2),
        recent_max_age_millis: 5 * 60 * 1000,
        fallback_ttl: Duration::from_secs(60),
        batch_concurrency: 4,
    }
}

fn test_breaker_config() -> BreakerConfig {
    BreakerConfig {
        max_errors: 3,
        reset_window: Duration::from_secs(60),
    }
}

/// Assemble a pipeline over a temp-dir store.
fn build_pipeline(
    upstream: Arc<dyn UpstreamAnalyzer>,
    store_dir: &std::path::Path,
    breaker_config: BreakerConfig,
    pipeline_config: PipelineConfig,
) -> Arc<AnalysisPipeline> {
    Arc::new(AnalysisPipeline::new(
        upstream,
        Arc::new(CacheEngine::new(true, Duration::from_secs(300))),
        Arc::new(FileStore::new_with_dir(store_dir.to_path_buf())),
        Arc::new(CircuitBreaker::new(breaker_config)),
        Arc::new(NoopNotifier),
        pipeline_config,
    ))
}

fn request(content: &str, path: &str, user: &str) -> AnalysisRequest {
    AnalysisRequest::new(content, path, user)
}

#[tokio::test]
async fn analyze_returns_upstream_result_and_persists() {
    let dir = tempfile::tempdir().unwrap();
    let upstream = Arc::new(CountingAnalyzer::new(85));
    let pipeline = build_pipeline(
        Arc::clone(&upstream) as Arc<dyn UpstreamAnalyzer>,
        dir.path(),
        test_breaker_config(),
        test_pipeline_config(),
    );

    let result = pipeline
        .analyze(request("function f(){}", "a.js", "u1"))
        .await
        .expect("analysis should succeed");

    assert_eq!(result.quality_score, 85);
    assert!(result.analyzed_by_upstream);
    assert!(!result.is_fallback);
    assert!(!result.from_cache);
    assert_eq!(result.suggestions.len(), 1);
    assert_eq!(upstream.call_count(), 1);

    // The record landed in the durable store.
    let store = FileStore::new_with_dir(dir.path().to_path_buf());
    let fp = kritiq::fingerprint::of_request(&request("function f(){}", "a.js", "u1"));
    let record = store
        .find_recent(fp.as_str(), "u1", 60_000)
        .await
        .unwrap()
        .expect("record should be persisted");
    assert_eq!(record.status, AnalysisStatus::Completed);
    assert_eq!(record.result.quality_score, 85);
}

#[tokio::test]
async fn second_call_is_served_from_cache() {
    let dir = tempfile::tempdir().unwrap();
    let upstream = Arc::new(CountingAnalyzer::new(85));
    let pipeline = build_pipeline(
        Arc::clone(&upstream) as Arc<dyn UpstreamAnalyzer>,
        dir.path(),
        test_breaker_config(),
        test_pipeline_config(),
    );

    let first = pipeline
        .analyze(request("function f(){}", "a.js", "u1"))
        .await
        .unwrap();
    let second = pipeline
        .analyze(request("function f(){}", "a.js", "u1"))
        .await
        .unwrap();

    assert!(!first.from_cache);
    assert!(second.from_cache);
    assert_eq!(upstream.call_count(), 1, "upstream must be called once");

    // The cached content is byte-identical to the first result.
    assert_eq!(
        serde_json::to_string(&first).unwrap(),
        serde_json::to_string(&second.untagged()).unwrap()
    );
}

#[tokio::test]
async fn durable_store_serves_as_second_tier() {
    let dir = tempfile::tempdir().unwrap();

    // First pipeline computes and persists.
    let upstream_a = Arc::new(CountingAnalyzer::new(85));
    let pipeline_a = build_pipeline(
        Arc::clone(&upstream_a) as Arc<dyn UpstreamAnalyzer>,
        dir.path(),
        test_breaker_config(),
        test_pipeline_config(),
    );
    pipeline_a
        .analyze(request("const x = 1;", "b.js", "u1"))
        .await
        .unwrap();

    // Second pipeline shares the store but has a cold cache.
    let upstream_b = Arc::new(CountingAnalyzer::new(20));
    let pipeline_b = build_pipeline(
        Arc::clone(&upstream_b) as Arc<dyn UpstreamAnalyzer>,
        dir.path(),
        test_breaker_config(),
        test_pipeline_config(),
    );
    let result = pipeline_b
        .analyze(request("const x = 1;", "b.js", "u1"))
        .await
        .unwrap();

    assert!(result.from_database);
    assert!(!result.from_cache);
    assert_eq!(result.quality_score, 85, "stored result, not a recompute");
    assert_eq!(upstream_b.call_count(), 0, "no upstream call on store hit");

    // The store hit also warmed the cache.
    let again = pipeline_b
        .analyze(request("const x = 1;", "b.js", "u1"))
        .await
        .unwrap();
    assert!(again.from_cache);
}

#[tokio::test]
async fn concurrent_identical_requests_invoke_upstream_once() {
    let dir = tempfile::tempdir().unwrap();
    let upstream = Arc::new(CountingAnalyzer::with_delay(85, Duration::from_millis(150)));
    let pipeline = build_pipeline(
        Arc::clone(&upstream) as Arc<dyn UpstreamAnalyzer>,
        dir.path(),
        test_breaker_config(),
        test_pipeline_config(),
    );

    let mut handles = Vec::new();
    for _ in 0..4 {
        let pipeline = Arc::clone(&pipeline);
        handles.push(tokio::spawn(async move {
            pipeline
                .analyze(request("function g(){}", "dedup.js", "u1"))
                .await
        }));
    }

    for handle in handles {
        let result = handle.await.unwrap().expect("all callers should succeed");
        assert_eq!(result.quality_score, 85);
    }
    assert_eq!(upstream.call_count(), 1, "dedup gate must collapse calls");
}

#[tokio::test]
async fn breaker_opens_after_max_errors_and_short_circuits() {
    let dir = tempfile::tempdir().unwrap();
    let upstream = Arc::new(FailingAnalyzer::new(503, "service unavailable"));
    let pipeline = build_pipeline(
        Arc::clone(&upstream) as Arc<dyn UpstreamAnalyzer>,
        dir.path(),
        test_breaker_config(),
        test_pipeline_config(),
    );

    // Distinct content per call: separate fingerprints, no cache reuse.
    for i in 0..3 {
        let result = pipeline
            .analyze(request(&format!("code {i}"), "trip.js", "u1"))
            .await
            .unwrap();
        assert!(result.is_fallback);
    }
    assert_eq!(upstream.call_count(), 3);

    let stats = pipeline.error_stats();
    assert!(stats[SERVICE_ANALYSIS].circuit_open);
    assert_eq!(stats[SERVICE_ANALYSIS].error_count, 3);

    // Next call short-circuits: no upstream invocation, tagged reason.
    let result = pipeline
        .analyze(request("code next", "trip.js", "u1"))
        .await
        .unwrap();
    assert!(result.is_fallback);
    assert_eq!(
        result.fallback_reason.as_deref(),
        Some("circuit breaker open")
    );
    assert_eq!(upstream.call_count(), 3, "open breaker skips the upstream");
}

#[tokio::test]
async fn breaker_recloses_after_reset_window() {
    let dir = tempfile::tempdir().unwrap();
    let upstream = Arc::new(FailingAnalyzer::new(503, "service unavailable"));
    let pipeline = build_pipeline(
        Arc::clone(&upstream) as Arc<dyn UpstreamAnalyzer>,
        dir.path(),
        BreakerConfig {
            max_errors: 2,
            reset_window: Duration::from_millis(150),
        },
        test_pipeline_config(),
    );

    for i in 0..2 {
        pipeline
            .analyze(request(&format!("code {i}"), "window.js", "u1"))
            .await
            .unwrap();
    }
    assert!(pipeline.error_stats()[SERVICE_ANALYSIS].circuit_open);

    tokio::time::sleep(Duration::from_millis(200)).await;

    // After the cool-down the upstream is tried again.
    pipeline
        .analyze(request("code after window", "window.js", "u1"))
        .await
        .unwrap();
    assert_eq!(upstream.call_count(), 3);
}

#[tokio::test]
async fn manual_reset_closes_the_circuit() {
    let dir = tempfile::tempdir().unwrap();
    let upstream = Arc::new(FailingAnalyzer::new(503, "service unavailable"));
    let pipeline = build_pipeline(
        Arc::clone(&upstream) as Arc<dyn UpstreamAnalyzer>,
        dir.path(),
        test_breaker_config(),
        test_pipeline_config(),
    );

    for i in 0..3 {
        pipeline
            .analyze(request(&format!("code {i}"), "reset.js", "u1"))
            .await
            .unwrap();
    }
    assert!(pipeline.error_stats()[SERVICE_ANALYSIS].circuit_open);

    pipeline.reset_breaker(Some(SERVICE_ANALYSIS));
    assert!(!pipeline.error_stats()[SERVICE_ANALYSIS].circuit_open);

    pipeline
        .analyze(request("code after reset", "reset.js", "u1"))
        .await
        .unwrap();
    assert_eq!(upstream.call_count(), 4, "reset re-admits upstream calls");
}

#[tokio::test]
async fn auth_failures_surface_and_never_trip_the_breaker() {
    let dir = tempfile::tempdir().unwrap();
    let upstream = Arc::new(FailingAnalyzer::new(401, "invalid api key"));
    let pipeline = build_pipeline(
        Arc::clone(&upstream) as Arc<dyn UpstreamAnalyzer>,
        dir.path(),
        test_breaker_config(),
        test_pipeline_config(),
    );

    for i in 0..10 {
        let result = pipeline
            .analyze(request(&format!("code {i}"), "auth.js", "u1"))
            .await;
        assert!(matches!(result, Err(AnalyzeError::UpstreamAuth(_))));
    }

    assert_eq!(upstream.call_count(), 10, "every call reaches upstream");
    let stats = pipeline.error_stats();
    assert!(
        stats.get(SERVICE_ANALYSIS).is_none_or(|s| !s.circuit_open && s.error_count == 0),
        "auth failures must not count toward the breaker"
    );
}

#[tokio::test]
async fn validation_failures_surface_distinctly() {
    let dir = tempfile::tempdir().unwrap();
    let upstream = Arc::new(FailingAnalyzer::new(422, "validation failed"));
    let pipeline = build_pipeline(
        Arc::clone(&upstream) as Arc<dyn UpstreamAnalyzer>,
        dir.path(),
        test_breaker_config(),
        test_pipeline_config(),
    );

    let result = pipeline
        .analyze(request("code", "validation.js", "u1"))
        .await;
    assert!(matches!(result, Err(AnalyzeError::UpstreamValidation(_))));
    assert!(
        pipeline
            .error_stats()
            .get(SERVICE_ANALYSIS)
            .is_none_or(|s| s.error_count == 0)
    );
}

#[tokio::test]
async fn persistent_503_yields_marked_fallback() {
    let dir = tempfile::tempdir().unwrap();
    let upstream = Arc::new(FailingAnalyzer::new(503, "service unavailable"));
    let pipeline = build_pipeline(
        Arc::clone(&upstream) as Arc<dyn UpstreamAnalyzer>,
        dir.path(),
        test_breaker_config(),
        test_pipeline_config(),
    );

    let result = pipeline
        .analyze(request("function f(){}", "down.js", "u1"))
        .await
        .expect("fallback must resolve, not error");

    assert!(result.is_fallback);
    assert!(!result.analyzed_by_upstream);
    assert_eq!(result.quality_score, 70);
    assert_eq!(result.fallback_reason.as_deref(), Some("unavailable"));

    // The fallback was persisted as such.
    let store = FileStore::new_with_dir(dir.path().to_path_buf());
    let fp = kritiq::fingerprint::of_request(&request("function f(){}", "down.js", "u1"));
    // Fallback records never qualify as "recent completed".
    assert!(
        store
            .find_recent(fp.as_str(), "u1", 60_000)
            .await
            .unwrap()
            .is_none()
    );
}

#[tokio::test]
async fn upstream_timeout_degrades_to_fallback_and_counts() {
    let dir = tempfile::tempdir().unwrap();
    let upstream = Arc::new(CountingAnalyzer::with_delay(85, Duration::from_millis(300)));
    let mut config = test_pipeline_config();
    config.upstream_timeout = Duration::from_millis(50);
    let pipeline = build_pipeline(
        Arc::clone(&upstream) as Arc<dyn UpstreamAnalyzer>,
        dir.path(),
        test_breaker_config(),
        config,
    );

    let result = pipeline
        .analyze(request("slow code", "slow.js", "u1"))
        .await
        .unwrap();

    assert!(result.is_fallback);
    assert_eq!(result.fallback_reason.as_deref(), Some("timeout"));
    assert_eq!(pipeline.error_stats()[SERVICE_ANALYSIS].error_count, 1);
}

#[tokio::test]
async fn batch_isolates_per_item_failures() {
    let dir = tempfile::tempdir().unwrap();
    let upstream = Arc::new(ScriptedAnalyzer::new(&["item2.js"], 401));
    let pipeline = build_pipeline(
        upstream as Arc<dyn UpstreamAnalyzer>,
        dir.path(),
        test_breaker_config(),
        test_pipeline_config(),
    );

    let output = pipeline
        .analyze_batch(vec![
            request("code one", "item1.js", "u1"),
            request("code two", "item2.js", "u1"),
            request("code three", "item3.js", "u1"),
        ])
        .await;

    assert_eq!(output.results.len(), 3);
    assert!(matches!(output.results[0], BatchEntry::Completed(_)));
    match &output.results[1] {
        BatchEntry::Failed { file_path, error } => {
            assert_eq!(file_path, "item2.js");
            assert!(error.contains("authentication"));
        }
        other => panic!("item 2 should fail, got {other:?}"),
    }
    assert!(matches!(output.results[2], BatchEntry::Completed(_)));

    assert_eq!(output.summary.total, 3);
    assert_eq!(output.summary.successful, 2);
    assert_eq!(output.summary.failed, 1);
    assert_eq!(output.summary.average_quality_score, 85.0);
    assert_eq!(output.summary.total_suggestions, 2);
}

#[tokio::test]
async fn malformed_input_is_rejected_before_upstream() {
    let dir = tempfile::tempdir().unwrap();
    let upstream = Arc::new(CountingAnalyzer::new(85));
    let pipeline = build_pipeline(
        Arc::clone(&upstream) as Arc<dyn UpstreamAnalyzer>,
        dir.path(),
        test_breaker_config(),
        test_pipeline_config(),
    );

    let empty_content = pipeline.analyze(request("", "a.js", "u1")).await;
    assert!(matches!(empty_content, Err(AnalyzeError::InvalidInput(_))));

    let empty_path = pipeline.analyze(request("code", "", "u1")).await;
    assert!(matches!(empty_path, Err(AnalyzeError::InvalidInput(_))));

    assert_eq!(upstream.call_count(), 0);
}

#[tokio::test]
async fn suggestion_feedback_updates_store_and_invalidates_cache() {
    let dir = tempfile::tempdir().unwrap();
    let upstream = Arc::new(CountingAnalyzer::new(85));
    let pipeline = build_pipeline(
        Arc::clone(&upstream) as Arc<dyn UpstreamAnalyzer>,
        dir.path(),
        test_breaker_config(),
        test_pipeline_config(),
    );

    let req = request("function h(){}", "feedback.js", "u1");
    let result = pipeline.analyze(req.clone()).await.unwrap();
    let suggestion_id = result.suggestions[0].id.clone();

    let store = FileStore::new_with_dir(dir.path().to_path_buf());
    let fp = kritiq::fingerprint::of_request(&req);
    let record = store
        .find_recent(fp.as_str(), "u1", 60_000)
        .await
        .unwrap()
        .unwrap();

    pipeline
        .suggestion_feedback(&record.id, &suggestion_id, SuggestionStatus::Accepted, "u1")
        .await
        .expect("feedback should succeed");

    // The stored suggestion carries the new status.
    let updated = store
        .find_recent(fp.as_str(), "u1", 60_000)
        .await
        .unwrap()
        .unwrap();
    assert_eq!(
        updated.result.suggestions[0].status,
        SuggestionStatus::Accepted
    );

    // The cache was invalidated: the next analyze falls through to the
    // durable tier and returns the updated record.
    let after = pipeline.analyze(req).await.unwrap();
    assert!(after.from_database);
    assert_eq!(
        after.suggestions[0].status,
        SuggestionStatus::Accepted
    );
    assert_eq!(upstream.call_count(), 1, "no recompute after feedback");
}

#[tokio::test]
async fn fallback_is_cached_with_short_ttl() {
    let dir = tempfile::tempdir().unwrap();
    let upstream = Arc::new(FailingAnalyzer::new(503, "service unavailable"));
    let pipeline = build_pipeline(
        Arc::clone(&upstream) as Arc<dyn UpstreamAnalyzer>,
        dir.path(),
        test_breaker_config(),
        test_pipeline_config(),
    );

    let first = pipeline
        .analyze(request("cached fallback", "fb.js", "u1"))
        .await
        .unwrap();
    assert!(first.is_fallback);
    assert_eq!(upstream.call_count(), 1);

    // Within the fallback TTL the same request is served from cache,
    // shielding the failing upstream from repeat traffic.
    let second = pipeline
        .analyze(request("cached fallback", "fb.js", "u1"))
        .await
        .unwrap();
    assert!(second.is_fallback);
    assert!(second.from_cache);
    assert_eq!(upstream.call_count(), 1);
}
