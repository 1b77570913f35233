//! Content-derived fingerprints for analysis requests.
//!
//! A fingerprint is the sha256 digest of (code content, file path,
//! user, options) and serves as both the cache key and the
//! deduplication key. Options are serialized in canonical sorted-key
//! form before hashing so semantically identical option sets always
//! produce identical fingerprints, regardless of submission order.

use std::fmt;

use indexmap::IndexMap;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::models::AnalysisRequest;

/// Field separator fed into the hash between inputs. Prevents
/// ambiguity between adjacent fields (`("ab","c")` vs `("a","bc")`).
const FIELD_SEPARATOR: &[u8] = b"\x1f";

/// A stable, content-derived identifier for an analysis request.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Fingerprint(String);

impl Fingerprint {
    /// The hex digest string.
    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Fingerprint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

impl From<Fingerprint> for String {
    fn from(fp: Fingerprint) -> Self {
        fp.0
    }
}

/// Compute the fingerprint for a request's content fields.
pub fn fingerprint(
    code_content: &str,
    file_path: &str,
    user_id: &str,
    options: &IndexMap<String, serde_json::Value>,
) -> Fingerprint {
    let mut hasher = Sha256::new();
    hasher.update(code_content.as_bytes());
    hasher.update(FIELD_SEPARATOR);
    hasher.update(file_path.as_bytes());
    hasher.update(FIELD_SEPARATOR);
    hasher.update(user_id.as_bytes());
    hasher.update(FIELD_SEPARATOR);
    hasher.update(canonical_options(options).as_bytes());
    Fingerprint(hex::encode(hasher.finalize()))
}

/// Fingerprint an [`AnalysisRequest`] directly.
pub fn of_request(request: &AnalysisRequest) -> Fingerprint {
    fingerprint(
        &request.code_content,
        &request.file_path,
        &request.user_id,
        &request.options,
    )
}

/// Serialize options with sorted keys.
///
/// The top-level map is sorted explicitly; nested objects come out
/// sorted already because `serde_json::Value` stores objects in a
/// `BTreeMap` unless the `preserve_order` feature is enabled.
fn canonical_options(options: &IndexMap<String, serde_json::Value>) -> String {
    let mut entries: Vec<(&String, &serde_json::Value)> = options.iter().collect();
    entries.sort_by(|a, b| a.0.cmp(b.0));
    let sorted: serde_json::Map<String, serde_json::Value> = entries
        .into_iter()
        .map(|(k, v)| (k.clone(), v.clone()))
        .collect();
    serde_json::to_string(&serde_json::Value::Object(sorted))
        .unwrap_or_else(|_| "{}".to_string())
}
