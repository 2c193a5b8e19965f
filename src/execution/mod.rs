//! Executing a task under a role.
//!
//! [`RoleExecutor`] is the entry point: it resolves the role, validates it,
//! assembles an [`ExecutionContext`], hands it to the process layer and
//! classifies what comes back as an [`ExecutionResult`].

mod context;
mod executor;
mod result;

pub use context::{ExecutionContext, LinkedDocument, TRUNCATION_MARKER};
pub use executor::{
    ExecutionError, ExecutionRequest, ExecutionSummary, ExecutorSettings, RoleExecutor,
    SIMULATION_MARKER,
};
pub use result::{ExecutionResult, ExecutionStatus, FailureKind};
