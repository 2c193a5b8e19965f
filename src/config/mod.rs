//! Engine configuration.
//!
//! This module defines [`EngineConfig`], which represents `.troupe/config.yaml`.
//! It supports forward-compatible YAML parsing (unknown fields are ignored),
//! sensible defaults for every field, validation of values, and host
//! detection for the limits that depend on where the engine runs.

mod host;
mod model;
mod operations;
pub mod types;


// Re-export public API
pub use host::{CONSTRAINED_HOST_ENV, HostEnvironment};
pub use model::EngineConfig;
pub use operations::{
    CONFIG_FILE, CONSTRAINED_PROMPT_LIMIT, CONSTRAINED_TIMEOUT_CEILING_SECS, DEFAULT_PROMPT_LIMIT,
    LIMITED_TIMEOUT_CEILING_SECS, TIMEOUT_ONLY_CEILING_SECS,
};
pub use types::{FallbackPolicy, ResourceLimitsConfig};
