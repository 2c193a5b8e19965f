//! Exit code constants for the troupe CLI.
//!
//! - 0: Success
//! - 1: User error (bad args, unknown role, unreadable files)
//! - 2: Validation failure (role invalid, pre-flight rejection)
//! - 3: Execution failure (agent process failed or was restricted)
//! - 4: Timeout (agent process killed after exceeding its time budget)

/// Successful execution.
pub const SUCCESS: i32 = 0;

/// User error: bad arguments, unknown role, or unreadable input files.
pub const USER_ERROR: i32 = 1;

/// Validation failure: role definition invalid or pre-flight checks rejected the request.
pub const VALIDATION_FAILURE: i32 = 2;

/// Execution failure: the agent process exited non-zero or the result was restricted.
pub const EXECUTION_FAILURE: i32 = 3;

/// Timeout: the agent process exceeded its wall-clock budget and was killed.
pub const TIMEOUT: i32 = 4;
