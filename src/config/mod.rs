//! Configuration loading and layering.
//!
//! Handles `.kritiq.toml` loading, environment variable resolution,
//! and built-in defaults with proper priority ordering.

pub mod loader;

pub use loader::{
    BreakerSettings, CacheSettings, Config, NotifySettings, PipelineSettings, ProviderConfig,
    StoreSettings, TelemetrySettings,
};
