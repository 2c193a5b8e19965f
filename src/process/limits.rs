//! OS resource limits for the agent process.
//!
//! On Unix the limits are applied with `setrlimit` in the child between fork
//! and exec. Elsewhere, or when limits are switched off, only the wall-clock
//! timeout guards the process; that downgrade is always logged.

use crate::config::ResourceLimitsConfig;
use std::fmt;
use std::sync::Arc;
use tokio::process::Command;
use tracing::warn;

/// Applies spawn-time resource constraints to a command.
pub trait ResourceLimiter: Send + Sync + fmt::Debug {
    fn name(&self) -> &'static str;

    /// Whether OS-level limits are actually enforced.
    fn enforces_os_limits(&self) -> bool;

    fn apply(&self, cmd: &mut Command);
}

/// Pick the limiter for this platform and configuration.
pub fn limiter_for(config: &ResourceLimitsConfig) -> Arc<dyn ResourceLimiter> {
    if !config.enabled {
        warn!("resource limits disabled by configuration; only the timeout will be enforced");
        return Arc::new(TimeoutOnlyLimiter);
    }

    #[cfg(unix)]
    {
        Arc::new(RlimitLimiter::new(config.clone()))
    }

    #[cfg(not(unix))]
    {
        warn!(
            "OS resource limits are not available on this platform; only the timeout will be enforced"
        );
        Arc::new(TimeoutOnlyLimiter)
    }
}

/// No OS limits; the executor's timeout is the only guard.
#[derive(Debug, Clone, Copy, Default)]
pub struct TimeoutOnlyLimiter;

impl ResourceLimiter for TimeoutOnlyLimiter {
    fn name(&self) -> &'static str {
        "timeout-only"
    }

    fn enforces_os_limits(&self) -> bool {
        false
    }

    fn apply(&self, _cmd: &mut Command) {}
}

#[cfg(unix)]
pub use unix::RlimitLimiter;

#[cfg(unix)]
mod unix {
    use super::ResourceLimiter;
    use crate::config::ResourceLimitsConfig;
    use std::io;
    use tokio::process::Command;

    const MIB: u64 = 1024 * 1024;

    /// `setrlimit`-based limits: address space, CPU time, file size and
    /// process count.
    #[derive(Debug, Clone)]
    pub struct RlimitLimiter {
        limits: ResourceLimitsConfig,
    }

    impl RlimitLimiter {
        pub fn new(limits: ResourceLimitsConfig) -> Self {
            Self { limits }
        }
    }

    fn to_rlim(value: u64) -> libc::rlim_t {
        libc::rlim_t::try_from(value).unwrap_or(libc::RLIM_INFINITY)
    }

    fn check(rc: libc::c_int) -> io::Result<()> {
        if rc == 0 {
            Ok(())
        } else {
            Err(io::Error::last_os_error())
        }
    }

    // Never ask for more than the current hard limit; raising it needs
    // privileges and would make the spawn fail.
    macro_rules! clamped {
        ($resource:expr, $desired:expr) => {{
            let mut current = libc::rlimit {
                rlim_cur: 0,
                rlim_max: 0,
            };
            // SAFETY: getrlimit only writes into `current`.
            let rc = unsafe { libc::getrlimit($resource, &mut current) };
            let hard = if rc == 0 {
                current.rlim_max
            } else {
                libc::RLIM_INFINITY
            };
            let value = to_rlim($desired).min(hard);
            libc::rlimit {
                rlim_cur: value,
                rlim_max: value,
            }
        }};
    }

    impl ResourceLimiter for RlimitLimiter {
        fn name(&self) -> &'static str {
            "rlimit"
        }

        fn enforces_os_limits(&self) -> bool {
            true
        }

        fn apply(&self, cmd: &mut Command) {
            let memory = clamped!(
                libc::RLIMIT_AS,
                self.limits.max_memory_mb.saturating_mul(MIB)
            );
            let cpu = clamped!(libc::RLIMIT_CPU, self.limits.max_cpu_seconds);
            let file_size = clamped!(
                libc::RLIMIT_FSIZE,
                self.limits.max_file_size_mb.saturating_mul(MIB)
            );
            let processes = clamped!(libc::RLIMIT_NPROC, self.limits.max_processes);

            // SAFETY: the closure runs in the forked child before exec and
            // only calls setrlimit, which is async-signal-safe.
            unsafe {
                cmd.pre_exec(move || {
                    check(libc::setrlimit(libc::RLIMIT_AS, &memory))?;
                    check(libc::setrlimit(libc::RLIMIT_CPU, &cpu))?;
                    check(libc::setrlimit(libc::RLIMIT_FSIZE, &file_size))?;
                    check(libc::setrlimit(libc::RLIMIT_NPROC, &processes))?;
                    Ok(())
                });
            }
        }
    }
}
