//! Config loading, validation, and derived settings.

use super::host::HostEnvironment;
use super::model::EngineConfig;
use crate::error::{Result, TroupeError};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Config file location relative to the project root.
pub const CONFIG_FILE: &str = ".troupe/config.yaml";

/// Role preamble budget on ordinary hosts.
pub const DEFAULT_PROMPT_LIMIT: usize = 2000;
/// Role preamble budget on constrained hosts.
pub const CONSTRAINED_PROMPT_LIMIT: usize = 1000;

/// Longest timeout allowed when OS resource limits are in force.
pub const LIMITED_TIMEOUT_CEILING_SECS: u64 = 3600;
/// Longest timeout allowed when only the timeout guards the process.
pub const TIMEOUT_ONLY_CEILING_SECS: u64 = 600;
/// Longest timeout allowed on constrained hosts.
pub const CONSTRAINED_TIMEOUT_CEILING_SECS: u64 = 300;

impl EngineConfig {
    /// Load config from a YAML file.
    ///
    /// Unknown fields in the YAML are silently ignored for forward compatibility.
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();

        let content = std::fs::read_to_string(path).map_err(|e| {
            TroupeError::ConfigError(format!(
                "failed to read config file '{}': {}",
                path.display(),
                e
            ))
        })?;

        Self::from_yaml(&content)
    }

    /// Load `<project_root>/.troupe/config.yaml`, or defaults when it is absent.
    pub fn load_for_project(project_root: &Path) -> Result<Self> {
        let path = project_root.join(CONFIG_FILE);
        if path.exists() {
            Self::load(&path)
        } else {
            Ok(Self::default())
        }
    }

    /// Parse config from a YAML string.
    pub fn from_yaml(yaml: &str) -> Result<Self> {
        if yaml.trim().is_empty() {
            return Ok(Self::default());
        }
        let config: EngineConfig = serde_yaml::from_str(yaml)
            .map_err(|e| TroupeError::ConfigError(format!("failed to parse config YAML: {}", e)))?;

        config.validate()?;
        Ok(config)
    }

    /// Serialize config to YAML string.
    pub fn to_yaml(&self) -> Result<String> {
        serde_yaml::to_string(self).map_err(|e| {
            TroupeError::ConfigError(format!("failed to serialize config to YAML: {}", e))
        })
    }

    /// Validate config values.
    ///
    /// Numeric settings must be positive, the binary must be named and the
    /// project role directory must be relative.
    pub fn validate(&self) -> Result<()> {
        if self.cli_binary.trim().is_empty() {
            return Err(invalid("cli_binary must not be empty"));
        }
        if self.timeout_seconds == 0 {
            return Err(invalid("timeout_seconds must be greater than 0"));
        }
        if self.max_path_depth == 0 {
            return Err(invalid("max_path_depth must be greater than 0"));
        }
        if self.prompt_section_limit == Some(0) {
            return Err(invalid("prompt_section_limit must be greater than 0"));
        }
        if Path::new(&self.project_roles_dir).is_absolute() {
            return Err(invalid("project_roles_dir must be relative to the project root"));
        }

        let limits = &self.resource_limits;
        for (name, value) in [
            ("max_memory_mb", limits.max_memory_mb),
            ("max_cpu_seconds", limits.max_cpu_seconds),
            ("max_file_size_mb", limits.max_file_size_mb),
            ("max_processes", limits.max_processes),
        ] {
            if value == 0 {
                return Err(invalid(&format!(
                    "resource_limits.{} must be greater than 0",
                    name
                )));
            }
        }

        Ok(())
    }

    /// Absolute project role directory for `project_root`.
    pub fn project_roles_path(&self, project_root: &Path) -> PathBuf {
        project_root.join(&self.project_roles_dir)
    }

    /// Role preamble budget on `host`.
    pub fn prompt_limit(&self, host: &HostEnvironment) -> usize {
        self.prompt_section_limit.unwrap_or(if host.is_constrained() {
            CONSTRAINED_PROMPT_LIMIT
        } else {
            DEFAULT_PROMPT_LIMIT
        })
    }

    /// Configured timeout clamped to the ceilings for `host`.
    ///
    /// `os_limits` says whether OS resource limits will actually be applied.
    pub fn effective_timeout(&self, host: &HostEnvironment, os_limits: bool) -> Duration {
        let mut ceiling = if os_limits {
            LIMITED_TIMEOUT_CEILING_SECS
        } else {
            TIMEOUT_ONLY_CEILING_SECS
        };
        if host.is_constrained() {
            ceiling = ceiling.min(CONSTRAINED_TIMEOUT_CEILING_SECS);
        }
        Duration::from_secs(self.timeout_seconds.min(ceiling))
    }
}

fn invalid(message: &str) -> TroupeError {
    TroupeError::ConfigError(format!("config validation failed: {}", message))
}
