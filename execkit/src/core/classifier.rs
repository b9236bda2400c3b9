//! Deterministic classification of reaped exit statuses.

use std::os::unix::process::ExitStatusExt;
use std::process::ExitStatus;

use crate::core::types::{ChildExit, LaunchResult};

/// Translate a raw wait status into a [`ChildExit`].
///
/// A status that is neither an exit nor a signal (stopped/continued) cannot
/// come out of a blocking `wait`; it is reported as signal 0.
pub fn child_exit(status: ExitStatus) -> ChildExit {
    match (status.code(), status.signal()) {
        (Some(code), _) => ChildExit::Code(code),
        (None, Some(signal)) => ChildExit::Signal(signal),
        (None, None) => ChildExit::Signal(0),
    }
}

/// Classify a child that ran to completion.
///
/// Success carries no diagnostic. Failures always explain themselves, with
/// the captured stderr appended when the child wrote any.
pub fn classify_exit(exit: ChildExit, command_line: &str, stderr: &str) -> LaunchResult {
    if exit.success() {
        return LaunchResult::Success;
    }
    let reason = match exit {
        ChildExit::Code(code) => format!("`{command_line}` exited with status {code}"),
        ChildExit::Signal(signal) => format!("`{command_line}` was killed by signal {signal}"),
    };
    LaunchResult::Failure {
        exit,
        diagnostic: with_stderr(reason, stderr),
    }
}

/// Diagnostic for a child killed at its deadline.
pub fn timed_out(command_line: &str, timeout_millis: u128, stderr: &str) -> LaunchResult {
    let reason = format!("`{command_line}` timed out after {timeout_millis}ms and was killed");
    LaunchResult::TimedOut {
        diagnostic: with_stderr(reason, stderr),
    }
}

fn with_stderr(reason: String, stderr: &str) -> String {
    let stderr = stderr.trim_end();
    if stderr.is_empty() {
        reason
    } else {
        format!("{reason}: {stderr}")
    }
}
