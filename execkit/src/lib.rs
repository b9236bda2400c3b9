//! Launch external commands with a frozen environment and optional hard timeouts.
//!
//! The crate keeps a strict separation:
//!
//! - **[`core`]**: Pure logic (argv handling, exit classification, result types).
//!   No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting operations (environment snapshot, process
//!   launch and exit monitoring, config files).
//!
//! Most callers want [`io::process::Launcher`], or the [`run`] and
//! [`run_with_timeout`] shortcuts that use the process-wide snapshot.

pub mod core;
pub mod exit_codes;
pub mod io;
pub mod logging;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;

pub use crate::core::command::CommandSpec;
pub use crate::core::types::{ChildExit, Execution, LaunchResult, RunOutcome, TimedOutcome};
pub use crate::io::env_snapshot::EnvSnapshot;
pub use crate::io::process::{Launcher, run, run_with_timeout};
