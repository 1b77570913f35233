//! Structured pipeline events.
//!
//! Every noteworthy pipeline transition (cache hit/miss, breaker
//! trip/reset, fallback served, swallowed storage errors) is emitted
//! as a structured `tracing` record through [`emit`]. Emission is
//! fire-and-forget: it never blocks, never fails, and never affects
//! the analysis outcome.

use crate::upstream::classify::ErrorKind;

/// A pipeline transition worth recording.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PipelineEvent<'a> {
    CacheHit { fingerprint: &'a str },
    CacheMiss { fingerprint: &'a str },
    DatabaseHit { fingerprint: &'a str },
    CircuitOpened { service: &'a str, failures: usize },
    CircuitClosed { service: &'a str },
    CircuitReset { service: &'a str },
    FallbackServed { category: &'a str, reason: &'a str },
    UpstreamFailure { service: &'a str, kind: ErrorKind },
    StoreError { operation: &'a str, detail: &'a str },
}

/// Emit an event to the logging backend.
pub fn emit(event: PipelineEvent<'_>) {
    match event {
        PipelineEvent::CacheHit { fingerprint } => {
            tracing::debug!(target: "kritiq::cache", %fingerprint, "cache hit");
        }
        PipelineEvent::CacheMiss { fingerprint } => {
            tracing::debug!(target: "kritiq::cache", %fingerprint, "cache miss");
        }
        PipelineEvent::DatabaseHit { fingerprint } => {
            tracing::debug!(target: "kritiq::store", %fingerprint, "recent analysis found in store");
        }
        PipelineEvent::CircuitOpened { service, failures } => {
            tracing::warn!(target: "kritiq::breaker", %service, failures, "circuit breaker opened");
        }
        PipelineEvent::CircuitClosed { service } => {
            tracing::info!(target: "kritiq::breaker", %service, "circuit breaker closed after cool-down");
        }
        PipelineEvent::CircuitReset { service } => {
            tracing::info!(target: "kritiq::breaker", %service, "circuit breaker manually reset");
        }
        PipelineEvent::FallbackServed { category, reason } => {
            tracing::warn!(target: "kritiq::pipeline", %category, %reason, "serving fallback result");
        }
        PipelineEvent::UpstreamFailure { service, kind } => {
            tracing::warn!(target: "kritiq::upstream", %service, kind = %kind, "upstream call failed");
        }
        PipelineEvent::StoreError { operation, detail } => {
            tracing::warn!(target: "kritiq::store", %operation, %detail, "storage error swallowed");
        }
    }
}
