//! Configuration enums, nested sections and serde default functions.

use serde::{Deserialize, Serialize};

/// What to do when the agent CLI cannot be run at all.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "snake_case")]
pub enum FallbackPolicy {
    /// Return a `completed` result marked as a simulation.
    #[default]
    Simulate,
    /// Return a `failed` result.
    Fail,
}

impl FallbackPolicy {
    /// Parse a fallback policy from a string.
    #[allow(clippy::should_implement_trait)]
    pub fn from_str(s: &str) -> Option<Self> {
        match s {
            "simulate" => Some(Self::Simulate),
            "fail" => Some(Self::Fail),
            _ => None,
        }
    }
}

/// OS-level limits applied to the agent process at spawn.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ResourceLimitsConfig {
    /// Apply OS limits where the platform supports them.
    pub enabled: bool,

    /// Address-space cap in MiB.
    pub max_memory_mb: u64,

    /// CPU-time cap in seconds.
    pub max_cpu_seconds: u64,

    /// Largest file the process may write, in MiB.
    pub max_file_size_mb: u64,

    /// Cap on processes owned by the user.
    pub max_processes: u64,
}

impl Default for ResourceLimitsConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_memory_mb: default_max_memory_mb(),
            max_cpu_seconds: default_max_cpu_seconds(),
            max_file_size_mb: default_max_file_size_mb(),
            max_processes: default_max_processes(),
        }
    }
}

// Default value functions for serde
pub(crate) fn default_cli_binary() -> String {
    "claude".to_string()
}
pub(crate) fn default_timeout_seconds() -> u64 {
    600
}
pub(crate) fn default_project_roles_dir() -> String {
    ".troupe/roles".to_string()
}
pub(crate) fn default_max_path_depth() -> usize {
    32
}
pub(crate) fn default_max_memory_mb() -> u64 {
    1024
}
pub(crate) fn default_max_cpu_seconds() -> u64 {
    600
}
pub(crate) fn default_max_file_size_mb() -> u64 {
    100
}
pub(crate) fn default_max_processes() -> u64 {
    256
}
