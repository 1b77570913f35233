//! kritiq — resilient AI code analysis pipeline (library crate).
//!
//! Re-exports public modules for integration tests and external use.

pub mod breaker;
pub mod cache;
pub mod config;
pub mod constants;
pub mod env;
pub mod fallback;
pub mod fingerprint;
pub mod models;
pub mod notify;
pub mod pipeline;
pub mod store;
pub mod telemetry;
pub mod upstream;
