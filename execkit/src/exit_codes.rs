//! Stable exit codes for the execkit CLI.

/// The command ran and exited 0, or a non-launching subcommand succeeded.
pub const OK: i32 = 0;
/// Invalid arguments or config, or an internal monitor error.
pub const INVALID: i32 = 1;
/// The command ran but exited non-zero or was killed by a signal.
pub const FAILED: i32 = 2;
/// The command outlived `--timeout` and was killed.
pub const TIMED_OUT: i32 = 3;
/// The command never ran (spawn failed, or the timeout cannot be enforced).
pub const LAUNCH_ERROR: i32 = 4;
