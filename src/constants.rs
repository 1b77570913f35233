//! App-wide constants.
//!
//! Centralises the tool name, config paths, environment variable names,
//! service names, and pipeline defaults so a rename or retune only
//! requires changing this file.

/// Display name of the tool (lowercase).
pub const APP_NAME: &str = "kritiq";

/// Local config filename (e.g. `.kritiq.toml` in the working directory).
pub const CONFIG_FILENAME: &str = ".kritiq.toml";

/// Directory name under `~/.config/` for global config and the analysis store.
pub const CONFIG_DIR: &str = "kritiq";

// ── Upstream service names (circuit breaker keys) ───────────────────

/// The code analysis capability.
pub const SERVICE_ANALYSIS: &str = "analysis";

/// The commit message generation capability.
pub const SERVICE_COMMIT_GENERATION: &str = "commit-generation";

// ── Pipeline defaults ───────────────────────────────────────────────

/// Default TTL for cached analysis results, in seconds.
pub const DEFAULT_CACHE_TTL_SECS: u64 = 300;

/// Default TTL for cached fallback results, in seconds. Kept short so a
/// recovered upstream is retried promptly.
pub const DEFAULT_FALLBACK_TTL_SECS: u64 = 60;

/// Default per-call upstream timeout, in seconds.
pub const DEFAULT_UPSTREAM_TIMEOUT_SECS: u64 = 8;

/// Default bound on the durable-store probe, in seconds.
pub const DEFAULT_STORE_TIMEOUT_SECS: u64 = 3;

/// Maximum age of a durable-store record that may stand in for a fresh
/// analysis, in milliseconds.
pub const RECENT_ANALYSIS_MAX_AGE_MS: u64 = 5 * 60 * 1000;

/// Failures within the reset window before a breaker opens.
pub const DEFAULT_BREAKER_MAX_ERRORS: usize = 5;

/// Breaker reset window, in seconds.
pub const DEFAULT_BREAKER_RESET_WINDOW_SECS: u64 = 60;

/// Default concurrent analyses during batch fan-out.
pub const DEFAULT_BATCH_CONCURRENCY: usize = 4;

/// Quality score reported on synthesized fallback results.
pub const FALLBACK_QUALITY_SCORE: u8 = 70;

// ── Environment variable names ──────────────────────────────────────

pub const ENV_PROVIDER: &str = "KRITIQ_PROVIDER";
pub const ENV_MODEL: &str = "KRITIQ_MODEL";
pub const ENV_API_KEY: &str = "KRITIQ_API_KEY";
pub const ENV_BASE_URL: &str = "KRITIQ_BASE_URL";
pub const ENV_WEBHOOK_URL: &str = "KRITIQ_WEBHOOK_URL";
pub const ENV_STORE_DIR: &str = "KRITIQ_STORE_DIR";
