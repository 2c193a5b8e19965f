//! Host environment detection.
//!
//! Containers and WSL tend to have tight memory and argument limits, so the
//! engine shrinks prompt preambles and timeouts there.

use std::path::Path;

/// Environment variable forcing constrained (truthy) or unconstrained
/// (`0`/`false`) behaviour.
pub const CONSTRAINED_HOST_ENV: &str = "TROUPE_CONSTRAINED_HOST";

/// What is known about the host the engine runs on.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct HostEnvironment {
    pub in_container: bool,
    pub in_wsl: bool,
    /// Explicit override from [`CONSTRAINED_HOST_ENV`].
    pub forced: Option<bool>,
}

impl HostEnvironment {
    /// Probe the running host.
    pub fn detect() -> Self {
        let container = std::env::var("container").ok();
        let proc_version = std::fs::read_to_string("/proc/version").ok();
        let forced = std::env::var(CONSTRAINED_HOST_ENV).ok();
        Self::from_probes(
            Path::new("/.dockerenv").exists(),
            container.as_deref(),
            proc_version.as_deref(),
            forced.as_deref(),
        )
    }

    /// Build from raw probe values.
    pub fn from_probes(
        dockerenv_exists: bool,
        container_env: Option<&str>,
        proc_version: Option<&str>,
        override_env: Option<&str>,
    ) -> Self {
        let in_container =
            dockerenv_exists || container_env.is_some_and(|value| !value.trim().is_empty());
        let in_wsl = proc_version.is_some_and(|version| {
            let version = version.to_ascii_lowercase();
            version.contains("microsoft") || version.contains("wsl")
        });
        let forced = override_env.and_then(|value| {
            match value.trim().to_ascii_lowercase().as_str() {
                "" => None,
                "0" | "false" | "no" | "off" => Some(false),
                _ => Some(true),
            }
        });
        Self {
            in_container,
            in_wsl,
            forced,
        }
    }

    pub fn is_constrained(&self) -> bool {
        self.forced.unwrap_or(self.in_container || self.in_wsl)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_plain_host_is_unconstrained() {
        let host = HostEnvironment::from_probes(false, None, Some("Linux version 6.1"), None);
        assert!(!host.is_constrained());
    }

    #[test]
    fn test_docker_and_container_env_are_constrained() {
        assert!(HostEnvironment::from_probes(true, None, None, None).is_constrained());
        assert!(HostEnvironment::from_probes(false, Some("podman"), None, None).is_constrained());
        assert!(!HostEnvironment::from_probes(false, Some(""), None, None).is_constrained());
    }

    #[test]
    fn test_wsl_is_constrained() {
        let host = HostEnvironment::from_probes(
            false,
            None,
            Some("Linux version 5.15.90.1-microsoft-standard-WSL2"),
            None,
        );
        assert!(host.in_wsl);
        assert!(host.is_constrained());
    }

    #[test]
    fn test_override_wins_both_ways() {
        assert!(!HostEnvironment::from_probes(true, None, None, Some("false")).is_constrained());
        assert!(!HostEnvironment::from_probes(true, None, None, Some("0")).is_constrained());
        assert!(HostEnvironment::from_probes(false, None, None, Some("1")).is_constrained());
        assert!(HostEnvironment::from_probes(true, None, None, Some(" ")).is_constrained());
    }
}
