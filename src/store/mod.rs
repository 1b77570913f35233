//! Durable analysis storage.
//!
//! The persisted store is the pipeline's second, slower-but-durable
//! cache tier and its audit trail. The pipeline treats it as a
//! best-effort collaborator: probe failures degrade to "not found" and
//! save failures are logged and swallowed.

pub mod file;

use async_trait::async_trait;
use thiserror::Error;

use crate::models::{AnalysisRecord, AnalysisStatus, SuggestionStatus};

pub use file::{FileStore, StoreStats};

/// Errors from the durable store.
#[derive(Error, Debug)]
pub enum StoreError {
    #[error("record not found: {0}")]
    NotFound(String),

    #[error("store I/O error: {0}")]
    Io(String),

    #[error("store serialization error: {0}")]
    Serialization(String),
}

impl From<std::io::Error> for StoreError {
    fn from(e: std::io::Error) -> Self {
        StoreError::Io(e.to_string())
    }
}

impl From<serde_json::Error> for StoreError {
    fn from(e: serde_json::Error) -> Self {
        StoreError::Serialization(e.to_string())
    }
}

/// The durable store interface consumed by the pipeline.
#[async_trait]
pub trait AnalysisStore: Send + Sync {
    /// Most recent completed analysis for this fingerprint and user,
    /// no older than `max_age_millis`. Fallback and failed records do
    /// not qualify.
    async fn find_recent(
        &self,
        fingerprint: &str,
        user_id: &str,
        max_age_millis: u64,
    ) -> Result<Option<AnalysisRecord>, StoreError>;

    /// Persist a record. A later save for the same fingerprint and
    /// user supersedes the earlier one.
    async fn save(&self, record: &AnalysisRecord) -> Result<(), StoreError>;

    /// Update the lifecycle status of an analysis record.
    async fn update_status(
        &self,
        analysis_id: &str,
        status: AnalysisStatus,
        error: Option<String>,
    ) -> Result<(), StoreError>;

    /// Update the review status of one suggestion within a record.
    async fn update_suggestion(
        &self,
        analysis_id: &str,
        suggestion_id: &str,
        status: SuggestionStatus,
    ) -> Result<(), StoreError>;
}
