//! Config struct definition and default implementation.

use super::types::*;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Engine configuration.
///
/// This struct represents the contents of `.troupe/config.yaml`.
/// Unknown fields in the YAML are ignored for forward compatibility.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    // =========================================================================
    // Agent process
    // =========================================================================
    /// Agent CLI binary, looked up on PATH unless absolute.
    #[serde(default = "default_cli_binary")]
    pub cli_binary: String,

    /// Wall-clock budget for one execution, before host ceilings apply.
    #[serde(default = "default_timeout_seconds")]
    pub timeout_seconds: u64,

    /// Extra tool names to request from the CLI. Still allow-list filtered.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub extra_tools: Vec<String>,

    /// Working directory for the agent, relative to the project root.
    /// Must stay inside the project root.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub working_dir: Option<PathBuf>,

    /// Deepest project root path (in components) that will be accepted.
    #[serde(default = "default_max_path_depth")]
    pub max_path_depth: usize,

    #[serde(default)]
    pub resource_limits: ResourceLimitsConfig,

    // =========================================================================
    // Execution policy
    // =========================================================================
    /// Behaviour when the agent CLI cannot be run.
    #[serde(default)]
    pub fallback: FallbackPolicy,

    /// Turn `completed` results with violations into `restricted`.
    #[serde(default)]
    pub treat_violations_as_fatal: bool,

    /// Character budget for the role preamble. Host-dependent when unset.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub prompt_section_limit: Option<usize>,

    // =========================================================================
    // Role sources
    // =========================================================================
    /// Directory of global role templates. Bundled roles are used when unset
    /// or missing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub global_roles_dir: Option<PathBuf>,

    /// Project override directory, relative to the project root.
    #[serde(default = "default_project_roles_dir")]
    pub project_roles_dir: String,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            cli_binary: default_cli_binary(),
            timeout_seconds: default_timeout_seconds(),
            extra_tools: Vec::new(),
            working_dir: None,
            max_path_depth: default_max_path_depth(),
            resource_limits: ResourceLimitsConfig::default(),
            fallback: FallbackPolicy::default(),
            treat_violations_as_fatal: false,
            prompt_section_limit: None,
            global_roles_dir: None,
            project_roles_dir: default_project_roles_dir(),
        }
    }
}
