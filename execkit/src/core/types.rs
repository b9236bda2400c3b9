//! Shared result types for launches.
//!
//! These types carry no handles or I/O state. They are produced once per
//! launch and handed to the caller by value.

use std::time::Duration;

use serde::Serialize;

/// Sentinel exit code reported for timeouts, signals and launch errors.
pub const NO_EXIT_CODE: i32 = -1;

/// How a child that ran to completion terminated.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase", tag = "kind", content = "value")]
pub enum ChildExit {
    /// Normal exit with the given status code.
    Code(i32),
    /// Terminated by the given signal number.
    Signal(i32),
}

impl ChildExit {
    /// Exit code as reported to callers; signals map to [`NO_EXIT_CODE`].
    pub fn code(self) -> i32 {
        match self {
            ChildExit::Code(code) => code,
            ChildExit::Signal(_) => NO_EXIT_CODE,
        }
    }

    pub fn success(self) -> bool {
        self == ChildExit::Code(0)
    }
}

/// Outcome of a single launch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case", tag = "outcome")]
pub enum LaunchResult {
    /// The child started and exited with code 0.
    Success,
    /// The child started but exited non-zero or was killed by a signal.
    Failure { exit: ChildExit, diagnostic: String },
    /// The child outlived its deadline and was killed.
    TimedOut { diagnostic: String },
    /// No child ran: spawn failed, or the timeout could not be enforced.
    LaunchError { diagnostic: String },
}

impl LaunchResult {
    pub fn is_success(&self) -> bool {
        matches!(self, LaunchResult::Success)
    }

    pub fn is_timed_out(&self) -> bool {
        matches!(self, LaunchResult::TimedOut { .. })
    }

    /// Exit code in the `run_with_timeout` convention.
    pub fn exit_code(&self) -> i32 {
        match self {
            LaunchResult::Success => 0,
            LaunchResult::Failure { exit, .. } => exit.code(),
            LaunchResult::TimedOut { .. } | LaunchResult::LaunchError { .. } => NO_EXIT_CODE,
        }
    }

    /// Why the launch did not succeed; empty on success.
    pub fn diagnostic(&self) -> &str {
        match self {
            LaunchResult::Success => "",
            LaunchResult::Failure { diagnostic, .. }
            | LaunchResult::TimedOut { diagnostic }
            | LaunchResult::LaunchError { diagnostic } => diagnostic,
        }
    }
}

/// Full report of one launch.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Execution {
    pub result: LaunchResult,
    /// Pid of the child, if one was created.
    pub pid: Option<u32>,
    /// Captured standard error, kept even when the child succeeded.
    pub stderr: String,
    /// Bytes of standard error discarded past the configured limit.
    pub stderr_truncated: usize,
    /// Time between spawn and reap. Zero when no child was created.
    pub elapsed: Duration,
}

impl Execution {
    pub(crate) fn launch_error(diagnostic: String) -> Self {
        Self {
            result: LaunchResult::LaunchError { diagnostic },
            pid: None,
            stderr: String::new(),
            stderr_truncated: 0,
            elapsed: Duration::ZERO,
        }
    }
}

/// Result of an unbounded `run`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunOutcome {
    pub success: bool,
    pub diagnostic: String,
}

impl From<LaunchResult> for RunOutcome {
    fn from(result: LaunchResult) -> Self {
        Self {
            success: result.is_success(),
            diagnostic: result.diagnostic().to_string(),
        }
    }
}

/// Result of a bounded `run_with_timeout`.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TimedOutcome {
    pub exit_code: i32,
    pub timed_out: bool,
    pub diagnostic: String,
}

impl From<LaunchResult> for TimedOutcome {
    fn from(result: LaunchResult) -> Self {
        Self {
            exit_code: result.exit_code(),
            timed_out: result.is_timed_out(),
            diagnostic: result.diagnostic().to_string(),
        }
    }
}
