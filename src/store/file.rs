//! Filesystem-based analysis store.
//!
//! Stores one JSON file per (user, fingerprint) pair under
//! `~/.config/kritiq/store/` by default. Suitable for a single-node
//! deployment and for tests; networked deployments implement
//! [`AnalysisStore`](super::AnalysisStore) over their database.

use std::path::PathBuf;

use async_trait::async_trait;

use crate::models::{AnalysisRecord, AnalysisStatus, SuggestionStatus};

use super::{AnalysisStore, StoreError};

/// Filesystem-based analysis store.
pub struct FileStore {
    store_dir: Option<PathBuf>,
}

impl FileStore {
    /// Create a store using the default directory.
    pub fn new() -> Self {
        let store_dir = dirs::config_dir().map(|d| d.join(crate::constants::CONFIG_DIR).join("store"));
        Self { store_dir }
    }

    /// Create a store with a specific directory (useful for testing).
    pub fn new_with_dir(store_dir: PathBuf) -> Self {
        Self {
            store_dir: Some(store_dir),
        }
    }

    /// The file path for a (user, fingerprint) pair.
    fn record_path(&self, user_id: &str, fingerprint: &str) -> Option<PathBuf> {
        self.store_dir
            .as_ref()
            .map(|dir| dir.join(format!("{user_id}_{fingerprint}.json")))
    }

    fn read_record(path: &std::path::Path) -> Option<AnalysisRecord> {
        let content = std::fs::read_to_string(path).ok()?;
        serde_json::from_str(&content).ok()
    }

    fn write_record(path: &std::path::Path, record: &AnalysisRecord) -> Result<(), StoreError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string(record)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Return the store directory path.
    pub fn path(&self) -> Option<&PathBuf> {
        self.store_dir.as_ref()
    }

    /// Remove all stored records.
    pub fn clear(&self) -> Result<StoreStats, std::io::Error> {
        let stats = self.stats()?;
        if let Some(ref dir) = self.store_dir {
            if dir.exists() {
                std::fs::remove_dir_all(dir)?;
            }
        }
        Ok(stats)
    }

    /// Compute statistics about the store.
    pub fn stats(&self) -> Result<StoreStats, std::io::Error> {
        let Some(ref dir) = self.store_dir else {
            return Ok(StoreStats::default());
        };
        if !dir.exists() {
            return Ok(StoreStats::default());
        }

        let mut stats = StoreStats::default();
        for entry in std::fs::read_dir(dir)? {
            let entry = entry?;
            if entry.path().extension().is_some_and(|e| e == "json") {
                stats.records += 1;
                stats.total_bytes += entry.metadata().map(|m| m.len()).unwrap_or(0);
            }
        }
        Ok(stats)
    }

    /// Scan the store directory for the record with this id.
    fn find_by_id(&self, analysis_id: &str) -> Result<(PathBuf, AnalysisRecord), StoreError> {
        let Some(ref dir) = self.store_dir else {
            return Err(StoreError::NotFound(analysis_id.to_string()));
        };
        if !dir.exists() {
            return Err(StoreError::NotFound(analysis_id.to_string()));
        }
        for entry in std::fs::read_dir(dir)? {
            let path = entry?.path();
            if path.extension().is_none_or(|e| e != "json") {
                continue;
            }
            if let Some(record) = Self::read_record(&path) {
                if record.id == analysis_id {
                    return Ok((path, record));
                }
            }
        }
        Err(StoreError::NotFound(analysis_id.to_string()))
    }
}

impl Default for FileStore {
    fn default() -> Self {
        Self::new()
    }
}

/// Statistics about the file store.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct StoreStats {
    /// Number of stored records.
    pub records: usize,
    /// Total size in bytes.
    pub total_bytes: u64,
}

impl StoreStats {
    /// Format total_bytes as a human-readable string.
    pub fn human_size(&self) -> String {
        const KB: u64 = 1024;
        const MB: u64 = 1024 * KB;

        if self.total_bytes >= MB {
            format!("{:.1} MiB", self.total_bytes as f64 / MB as f64)
        } else if self.total_bytes >= KB {
            format!("{:.1} KiB", self.total_bytes as f64 / KB as f64)
        } else {
            format!("{} B", self.total_bytes)
        }
    }
}

#[async_trait]
impl AnalysisStore for FileStore {
    async fn find_recent(
        &self,
        fingerprint: &str,
        user_id: &str,
        max_age_millis: u64,
    ) -> Result<Option<AnalysisRecord>, StoreError> {
        let Some(path) = self.record_path(user_id, fingerprint) else {
            return Ok(None);
        };
        if !path.exists() {
            return Ok(None);
        }
        let record = match Self::read_record(&path) {
            Some(r) => r,
            // Unreadable records count as absent, not as failures.
            None => return Ok(None),
        };
        if record.status != AnalysisStatus::Completed {
            return Ok(None);
        }
        if record.age_millis() > max_age_millis {
            return Ok(None);
        }
        Ok(Some(record))
    }

    async fn save(&self, record: &AnalysisRecord) -> Result<(), StoreError> {
        let Some(path) = self.record_path(&record.user_id, &record.fingerprint) else {
            return Ok(());
        };
        Self::write_record(&path, record)
    }

    async fn update_status(
        &self,
        analysis_id: &str,
        status: AnalysisStatus,
        error: Option<String>,
    ) -> Result<(), StoreError> {
        let (path, mut record) = self.find_by_id(analysis_id)?;
        record.status = status;
        record.error = error;
        Self::write_record(&path, &record)
    }

    async fn update_suggestion(
        &self,
        analysis_id: &str,
        suggestion_id: &str,
        status: SuggestionStatus,
    ) -> Result<(), StoreError> {
        let (path, mut record) = self.find_by_id(analysis_id)?;
        let suggestion = record
            .result
            .suggestions
            .iter_mut()
            .find(|s| s.id == suggestion_id)
            .ok_or_else(|| StoreError::NotFound(suggestion_id.to_string()))?;
        suggestion.status = status;
        Self::write_record(&path, &record)
    }
}
