//! Troupe: a role execution engine for coding agents.
//!
//! A role is a named bundle of tool-group grants, restrictions and LLM
//! preferences. Troupe loads roles from YAML, validates them, renders a task
//! into a prompt under a role, runs an external agent CLI as a subprocess
//! with that prompt on stdin, and reports a structured result.
//!
//! - [`role`]: role model, parsing, validation and the registry
//! - [`enforce`]: per-execution capability checks
//! - [`execution`]: the [`RoleExecutor`](execution::RoleExecutor) facade
//! - [`process`]: subprocess pre-flight, spawn, timeout and parsing
//! - [`config`]: `.troupe/config.yaml` and host detection

pub mod config;
pub mod enforce;
pub mod error;
pub mod execution;
pub mod exit_codes;
pub mod process;
pub mod role;
