//! Analysis pipeline: the resilient path from request to result.
//!
//! Composes the fingerprint engine, result cache, durable store,
//! single-flight gate, circuit breaker, fallback synthesizer, and the
//! upstream analyzer. For a well-formed request the pipeline always
//! returns a usable result: upstream instability is absorbed into
//! clearly-marked fallbacks, and storage trouble degrades to
//! "no cache" behavior. Only malformed input and caller-fixable
//! upstream rejections (auth, validation) surface as errors.

pub mod flight;

use std::sync::Arc;
use std::time::Duration;

use thiserror::Error;
use tokio::sync::Semaphore;
use tokio::task::JoinSet;
use tokio::time::timeout;

use crate::breaker::{CircuitBreaker, ServiceStats};
use crate::cache::CacheEngine;
use crate::constants::SERVICE_ANALYSIS;
use crate::fallback;
use crate::fingerprint::{self, Fingerprint};
use crate::models::result::now_millis;
use crate::models::{
    AnalysisRecord, AnalysisRequest, AnalysisResult, AnalysisStatus, BatchEntry, BatchOutput,
    BatchSummary, Suggestion, SuggestionStatus,
};
use crate::notify::{Notifier, NotifyEvent, NotifyPhase};
use crate::store::{AnalysisStore, StoreError};
use crate::telemetry::{self, PipelineEvent};
use crate::upstream::classify::{self, ErrorKind};
use crate::upstream::{RawAnalysis, UpstreamAnalyzer, UpstreamError};

use flight::FlightGate;

/// Errors surfaced to callers.
///
/// `Clone` because an outcome may be broadcast to every caller joined
/// on the same in-flight computation.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum AnalyzeError {
    /// Malformed request (empty content or path).
    #[error("invalid request: {0}")]
    InvalidInput(String),

    /// The upstream rejected our credentials; caller-fixable.
    #[error("upstream authentication failed: {0}")]
    UpstreamAuth(String),

    /// The upstream rejected the request itself; caller-fixable.
    #[error("upstream rejected request: {0}")]
    UpstreamValidation(String),

    /// An in-flight computation vanished without settling.
    #[error("internal pipeline error: {0}")]
    Internal(String),
}

/// Pipeline tuning knobs.
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    /// Bound on each upstream analyzer call.
    pub upstream_timeout: Duration,
    /// Bound on durable-store probes and writes.
    pub store_timeout: Duration,
    /// How old a stored analysis may be and still stand in for a
    /// fresh one.
    pub recent_max_age_millis: u64,
    /// TTL for cached fallback results (shorter than the engine's
    /// default so a recovered upstream is retried promptly).
    pub fallback_ttl: Duration,
    /// Concurrent analyses during batch fan-out.
    pub batch_concurrency: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            upstream_timeout: Duration::from_secs(crate::constants::DEFAULT_UPSTREAM_TIMEOUT_SECS),
            store_timeout: Duration::from_secs(crate::constants::DEFAULT_STORE_TIMEOUT_SECS),
            recent_max_age_millis: crate::constants::RECENT_ANALYSIS_MAX_AGE_MS,
            fallback_ttl: Duration::from_secs(crate::constants::DEFAULT_FALLBACK_TTL_SECS),
            batch_concurrency: crate::constants::DEFAULT_BATCH_CONCURRENCY,
        }
    }
}

/// The analysis pipeline.
///
/// All collaborators are injected at construction and shared behind
/// `Arc`s; the pipeline itself is safe to share across tasks.
pub struct AnalysisPipeline {
    upstream: Arc<dyn UpstreamAnalyzer>,
    cache: Arc<CacheEngine>,
    store: Arc<dyn AnalysisStore>,
    breaker: Arc<CircuitBreaker>,
    notifier: Arc<dyn Notifier>,
    gate: FlightGate<Result<AnalysisResult, AnalyzeError>>,
    config: PipelineConfig,
}

impl AnalysisPipeline {
    pub fn new(
        upstream: Arc<dyn UpstreamAnalyzer>,
        cache: Arc<CacheEngine>,
        store: Arc<dyn AnalysisStore>,
        breaker: Arc<CircuitBreaker>,
        notifier: Arc<dyn Notifier>,
        config: PipelineConfig,
    ) -> Self {
        Self {
            upstream,
            cache,
            store,
            breaker,
            notifier,
            gate: FlightGate::new(),
            config,
        }
    }

    /// Analyze one request.
    ///
    /// Resolution order: fast cache → durable store → single-flight
    /// upstream computation (breaker-gated, fallback on failure).
    pub async fn analyze(&self, request: AnalysisRequest) -> Result<AnalysisResult, AnalyzeError> {
        request.validate().map_err(AnalyzeError::InvalidInput)?;
        let fp = fingerprint::of_request(&request);

        if let Some(hit) = self.cache.get(&request.user_id, &fp) {
            return Ok(hit.tagged_from_cache());
        }

        if let Some(record) = self.probe_store(&request, &fp).await {
            telemetry::emit(PipelineEvent::DatabaseHit {
                fingerprint: fp.as_str(),
            });
            self.cache.put(&request.user_id, &fp, &record.result);
            return Ok(record.result.tagged_from_database());
        }

        let flight = self
            .gate
            .run_exclusive(fp.as_str(), || self.compute(&request, &fp))
            .await;
        match flight.outcome {
            Some(outcome) => outcome,
            None => Err(AnalyzeError::Internal(
                "in-flight analysis abandoned".to_string(),
            )),
        }
    }

    /// Fan `analyze` out over a batch.
    ///
    /// Items run concurrently up to the configured limit; each item's
    /// failure is captured in its own entry and never aborts siblings.
    /// Output order matches input order.
    pub async fn analyze_batch(self: &Arc<Self>, requests: Vec<AnalysisRequest>) -> BatchOutput {
        // Pre-filled so a panicked task still yields an entry.
        let mut entries: Vec<BatchEntry> = requests
            .iter()
            .map(|r| BatchEntry::Failed {
                file_path: r.file_path.clone(),
                error: "analysis task panicked".to_string(),
            })
            .collect();

        let semaphore = Arc::new(Semaphore::new(self.config.batch_concurrency.max(1)));
        let mut join_set = JoinSet::new();

        for (index, request) in requests.into_iter().enumerate() {
            let pipeline = Arc::clone(self);
            let sem = Arc::clone(&semaphore);
            join_set.spawn(async move {
                let _permit = sem.acquire().await.expect("semaphore closed");
                let file_path = request.file_path.clone();
                let entry = match pipeline.analyze(request).await {
                    Ok(result) => BatchEntry::Completed(result),
                    Err(e) => BatchEntry::Failed {
                        file_path,
                        error: e.to_string(),
                    },
                };
                (index, entry)
            });
        }

        while let Some(result) = join_set.join_next().await {
            match result {
                Ok((index, entry)) => entries[index] = entry,
                Err(e) => {
                    tracing::warn!(target: "kritiq::pipeline", "batch task panicked: {e}");
                }
            }
        }

        let summary = BatchSummary::from_entries(&entries);
        BatchOutput {
            results: entries,
            summary,
        }
    }

    /// Record a reviewer's verdict on one suggestion.
    ///
    /// Updates the durable record and invalidates the user's cache
    /// entries, since their cached results now carry a stale status.
    pub async fn suggestion_feedback(
        &self,
        analysis_id: &str,
        suggestion_id: &str,
        status: SuggestionStatus,
        user_id: &str,
    ) -> Result<(), StoreError> {
        self.store
            .update_suggestion(analysis_id, suggestion_id, status)
            .await?;
        let invalidated = self.cache.invalidate_user(user_id);
        tracing::debug!(
            target: "kritiq::pipeline",
            %user_id,
            invalidated,
            "cache invalidated after suggestion feedback"
        );
        Ok(())
    }

    /// Per-service breaker stats.
    pub fn error_stats(&self) -> std::collections::BTreeMap<String, ServiceStats> {
        self.breaker.stats()
    }

    /// Manually reset one breaker, or all of them.
    pub fn reset_breaker(&self, service: Option<&str>) {
        self.breaker.reset(service);
    }

    /// Probe the durable tier. Bounded and fail-open: a slow or broken
    /// store reads as "nothing recent".
    async fn probe_store(
        &self,
        request: &AnalysisRequest,
        fp: &Fingerprint,
    ) -> Option<AnalysisRecord> {
        let probe = self.store.find_recent(
            fp.as_str(),
            &request.user_id,
            self.config.recent_max_age_millis,
        );
        match timeout(self.config.store_timeout, probe).await {
            Ok(Ok(found)) => found,
            Ok(Err(e)) => {
                telemetry::emit(PipelineEvent::StoreError {
                    operation: "find_recent",
                    detail: &e.to_string(),
                });
                None
            }
            Err(_) => {
                telemetry::emit(PipelineEvent::StoreError {
                    operation: "find_recent",
                    detail: "probe timed out",
                });
                None
            }
        }
    }

    /// The leader body behind the single-flight gate: breaker check,
    /// bounded upstream call, failure absorption.
    async fn compute(
        &self,
        request: &AnalysisRequest,
        fp: &Fingerprint,
    ) -> Result<AnalysisResult, AnalyzeError> {
        self.notifier.notify(NotifyEvent::new(
            NotifyPhase::AnalysisStarted,
            &request.user_id,
            &request.file_path,
        ));

        if self.breaker.is_open(SERVICE_ANALYSIS) {
            return Ok(self
                .serve_fallback(request, fp, "circuit breaker open", None)
                .await);
        }

        let invoke = self.upstream.invoke(
            &request.code_content,
            &request.file_path,
            &request.options,
        );
        let raw = match timeout(self.config.upstream_timeout, invoke).await {
            Ok(Ok(raw)) => raw,
            Ok(Err(err)) => return self.absorb_failure(request, fp, err).await,
            Err(_) => {
                let err = UpstreamError::Api {
                    status: None,
                    message: format!(
                        "upstream call timed out after {}s",
                        self.config.upstream_timeout.as_secs()
                    ),
                };
                return self.absorb_failure(request, fp, err).await;
            }
        };

        let result = finalize(raw);
        self.persist(request, fp, AnalysisStatus::Completed, None, &result)
            .await;
        self.cache.put(&request.user_id, fp, &result);
        self.notifier.notify(
            NotifyEvent::new(
                NotifyPhase::AnalysisComplete,
                &request.user_id,
                &request.file_path,
            )
            .with_score(result.quality_score),
        );
        Ok(result)
    }

    /// Classify an upstream failure and resolve it per the error
    /// policy: caller-fixable kinds surface, everything else feeds the
    /// breaker and degrades to a fallback result.
    async fn absorb_failure(
        &self,
        request: &AnalysisRequest,
        fp: &Fingerprint,
        err: UpstreamError,
    ) -> Result<AnalysisResult, AnalyzeError> {
        let kind = classify::classify_error(&err);
        telemetry::emit(PipelineEvent::UpstreamFailure {
            service: SERVICE_ANALYSIS,
            kind,
        });

        match kind {
            ErrorKind::AuthFailure => {
                self.notify_error(request, &err.to_string());
                Err(AnalyzeError::UpstreamAuth(err.to_string()))
            }
            ErrorKind::ValidationFailure => {
                self.notify_error(request, &err.to_string());
                Err(AnalyzeError::UpstreamValidation(err.to_string()))
            }
            _ => {
                self.breaker.record_failure(SERVICE_ANALYSIS);
                Ok(self
                    .serve_fallback(request, fp, &kind.to_string(), Some(err.to_string()))
                    .await)
            }
        }
    }

    /// Synthesize, persist, cache (short TTL), and announce a fallback
    /// result.
    async fn serve_fallback(
        &self,
        request: &AnalysisRequest,
        fp: &Fingerprint,
        reason: &str,
        error: Option<String>,
    ) -> AnalysisResult {
        let category = request.category();
        telemetry::emit(PipelineEvent::FallbackServed {
            category: &category.map(|c| c.to_string()).unwrap_or_else(|| "generic".to_string()),
            reason,
        });

        let result = fallback::synthesize(category, reason);
        self.persist(request, fp, AnalysisStatus::Fallback, error.clone(), &result)
            .await;
        self.cache
            .put_with_ttl(&request.user_id, fp, &result, self.config.fallback_ttl);
        self.notify_error(request, error.as_deref().unwrap_or(reason));
        result
    }

    /// Persist a record, bounded and fail-open.
    async fn persist(
        &self,
        request: &AnalysisRequest,
        fp: &Fingerprint,
        status: AnalysisStatus,
        error: Option<String>,
        result: &AnalysisResult,
    ) {
        let record = AnalysisRecord::new(
            fp.as_str(),
            &request.user_id,
            &request.file_path,
            status,
            error,
            result.clone(),
        );
        match timeout(self.config.store_timeout, self.store.save(&record)).await {
            Ok(Ok(())) => {}
            Ok(Err(e)) => {
                telemetry::emit(PipelineEvent::StoreError {
                    operation: "save",
                    detail: &e.to_string(),
                });
            }
            Err(_) => {
                telemetry::emit(PipelineEvent::StoreError {
                    operation: "save",
                    detail: "write timed out",
                });
            }
        }
    }

    fn notify_error(&self, request: &AnalysisRequest, error: &str) {
        self.notifier.notify(
            NotifyEvent::new(
                NotifyPhase::AnalysisError,
                &request.user_id,
                &request.file_path,
            )
            .with_error(error),
        );
    }
}

/// Turn a raw upstream payload into the caller-facing result shape:
/// clamp the score, assign suggestion ids, stamp provenance.
fn finalize(raw: RawAnalysis) -> AnalysisResult {
    AnalysisResult {
        quality_score: raw.quality_score.min(100) as u8,
        suggestions: raw
            .suggestions
            .into_iter()
            .map(|s| {
                Suggestion::new(
                    s.kind,
                    s.severity,
                    s.line,
                    s.column,
                    s.message,
                    s.suggested_fix,
                    s.confidence,
                )
            })
            .collect(),
        patterns: raw.patterns,
        security_issues: raw.security_issues,
        metrics: raw.metrics,
        analyzed_by_upstream: true,
        is_fallback: false,
        fallback_reason: None,
        computed_at_millis: now_millis(),
        from_cache: false,
        from_database: false,
    }
}
