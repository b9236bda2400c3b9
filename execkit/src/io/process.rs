//! Launch child processes from the environment snapshot, with optional deadlines.
//!
//! The untimed path drains stderr to EOF and then reaps. The timed path opens
//! a pidfd right after spawn and polls it together with the stderr pipe until
//! either the child exits or the deadline passes. Every child is reaped exactly
//! once, including on error paths (see [`ChildGuard`]).

use std::io::{ErrorKind, Read};
use std::os::fd::{AsFd, OwnedFd};
use std::process::{Child, ChildStderr, Command, ExitStatus, Stdio};
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use nix::errno::Errno;
use nix::poll::{PollFd, PollFlags, PollTimeout, poll};
use tracing::{debug, error, instrument, warn};

use crate::core::classifier::{child_exit, classify_exit, timed_out};
use crate::core::command::CommandSpec;
use crate::core::types::{Execution, NO_EXIT_CODE, RunOutcome, TimedOutcome};
use crate::io::config::{LauncherConfig, StdoutMode};
use crate::io::env_snapshot::{self, EnvSnapshot};
use crate::io::exit_watch::{ExitWatch, MECHANISM, Pidfd};

const READ_CHUNK: usize = 8192;

/// Callbacks around the lifetime of a launched child.
pub trait LaunchObserver {
    /// Called right after the child is created.
    fn on_start(&self, _pid: u32) {}
    /// Called right after the child is reaped.
    fn on_end(&self, _pid: u32) {}
}

/// Observer that does nothing.
#[derive(Debug, Clone, Copy, Default)]
pub struct NoopObserver;

impl LaunchObserver for NoopObserver {}

/// Launches commands with a fixed environment snapshot.
///
/// `W` decides whether timeouts can be enforced; see [`ExitWatch`].
#[derive(Debug, Clone)]
pub struct Launcher<'env, W = Pidfd> {
    env: &'env EnvSnapshot,
    watch: W,
    stderr_limit_bytes: usize,
    stdout: StdoutMode,
}

impl Launcher<'static, Pidfd> {
    /// Launcher using the process-wide snapshot and pidfd.
    pub fn new() -> Self {
        Launcher::with_snapshot(env_snapshot::global())
    }
}

impl Default for Launcher<'static, Pidfd> {
    fn default() -> Self {
        Self::new()
    }
}

impl<'env> Launcher<'env, Pidfd> {
    pub fn with_snapshot(env: &'env EnvSnapshot) -> Self {
        let defaults = LauncherConfig::default();
        Self {
            env,
            watch: Pidfd,
            stderr_limit_bytes: defaults.stderr_limit_bytes,
            stdout: defaults.stdout,
        }
    }
}

impl<'env, W: ExitWatch> Launcher<'env, W> {
    /// Swap the exit notification source.
    pub fn with_exit_watch<V: ExitWatch>(self, watch: V) -> Launcher<'env, V> {
        Launcher {
            env: self.env,
            watch,
            stderr_limit_bytes: self.stderr_limit_bytes,
            stdout: self.stdout,
        }
    }

    pub fn with_config(mut self, config: &LauncherConfig) -> Self {
        self.stderr_limit_bytes = config.stderr_limit_bytes;
        self.stdout = config.stdout;
        self
    }

    pub fn timeouts_supported(&self) -> bool {
        self.watch.is_available()
    }

    /// Run to completion. Success means the child started and exited 0.
    pub fn run(&self, spec: &CommandSpec) -> RunOutcome {
        match self.launch(spec, None) {
            Ok(execution) => execution.result.into(),
            Err(err) => RunOutcome {
                success: false,
                diagnostic: format!("{err:#}"),
            },
        }
    }

    /// Run with a deadline; the child is killed if it is still running then.
    pub fn run_with_timeout(&self, spec: &CommandSpec, timeout: Duration) -> TimedOutcome {
        match self.launch(spec, Some(timeout)) {
            Ok(execution) => execution.result.into(),
            Err(err) => TimedOutcome {
                exit_code: NO_EXIT_CODE,
                timed_out: false,
                diagnostic: format!("{err:#}"),
            },
        }
    }

    pub fn launch(&self, spec: &CommandSpec, timeout: Option<Duration>) -> Result<Execution> {
        self.launch_observed(spec, timeout, &NoopObserver)
    }

    /// Launch and report everything known about the child.
    ///
    /// Without a pidfd, an untimed launch falls back to reading stderr to EOF
    /// before reaping, so it also waits for any grandchild still holding the
    /// pipe open.
    ///
    /// `Err` is reserved for failures of the monitor itself (poll or wait).
    /// Spawn failures, non-zero exits and timeouts are values in the result.
    #[instrument(
        skip_all,
        fields(program = spec.program(), timeout_ms = timeout.map(millis))
    )]
    pub fn launch_observed(
        &self,
        spec: &CommandSpec,
        timeout: Option<Duration>,
        observer: &dyn LaunchObserver,
    ) -> Result<Execution> {
        let command_line = spec.command_line();
        if timeout.is_some() && !self.watch.is_available() {
            warn!("timeout requested but {MECHANISM} is unavailable");
            return Ok(Execution::launch_error(format!(
                "cannot enforce timeout for `{command_line}`: {MECHANISM} is not supported on this system"
            )));
        }

        debug!("spawning child process");
        let started = Instant::now();
        let mut child = match self.command(spec).spawn() {
            Ok(c) => c,
            Err(e) => {
                error!(err = %e, "failed to spawn command");
                return Ok(Execution::launch_error(format!(
                    "failed to spawn `{command_line}`: {e}"
                )));
            }
        };
        let pid = child.id();
        let stderr = child.stderr.take();
        let mut guard = ChildGuard::new(child, observer);
        observer.on_start(pid);
        debug!(pid, "spawned child process");

        let mut collector = StderrCollector::new(self.stderr_limit_bytes);
        // A deadline past the end of `Instant` is no deadline at all.
        let deadline = timeout.and_then(|t| started.checked_add(t));
        let pidfd = match (timeout, self.watch.is_available()) {
            (None, false) => None,
            (None, true) => match self.watch.watch(guard.child()) {
                Ok(fd) => Some(fd),
                Err(e) => {
                    warn!(pid, err = %e, "{MECHANISM} failed, waiting for stderr EOF");
                    None
                }
            },
            (Some(_), _) => match self.watch.watch(guard.child()) {
                Ok(fd) => Some(fd),
                Err(e) => {
                    error!(pid, err = %e, "{MECHANISM} failed");
                    guard.kill_and_reap()?;
                    return Ok(Execution {
                        elapsed: started.elapsed(),
                        pid: Some(pid),
                        ..Execution::launch_error(format!(
                            "{MECHANISM} failed for pid {pid}: {e}"
                        ))
                    });
                }
            },
        };
        let waited = match pidfd {
            Some(pidfd) => wait_until(&mut guard, &pidfd, stderr, &mut collector, deadline)?,
            None => {
                collector.read_to_end(stderr)?;
                Waited::Exited(guard.reap()?)
            }
        };
        let elapsed = started.elapsed();

        let stderr = String::from_utf8_lossy(&collector.buf).into_owned();
        let mut stderr_text = stderr.clone();
        if collector.truncated > 0 {
            warn!(stderr_truncated = collector.truncated, "stderr truncated");
            stderr_text.push_str(&collector.truncated_notice(spec.program()));
        }

        let result = match waited {
            Waited::Exited(status) => {
                classify_exit(child_exit(status), &command_line, &stderr_text)
            }
            Waited::Killed => {
                let timeout_ms = timeout.map_or(0, |t| t.as_millis());
                timed_out(&command_line, timeout_ms, &stderr_text)
            }
        };
        debug!(
            exit_code = result.exit_code(),
            timed_out = result.is_timed_out(),
            elapsed_ms = millis(elapsed),
            "command finished"
        );

        Ok(Execution {
            result,
            pid: Some(pid),
            stderr,
            stderr_truncated: collector.truncated,
            elapsed,
        })
    }

    fn command(&self, spec: &CommandSpec) -> Command {
        let mut command = Command::new(spec.program());
        command
            .args(spec.args())
            .env_clear()
            .envs(self.env.iter())
            .stdin(Stdio::null())
            .stderr(Stdio::piped());
        match self.stdout {
            StdoutMode::Inherit => command.stdout(Stdio::inherit()),
            StdoutMode::Null => command.stdout(Stdio::null()),
        };
        command
    }
}

/// Run `spec` with the process-wide snapshot.
pub fn run(spec: &CommandSpec) -> RunOutcome {
    Launcher::new().run(spec)
}

/// Run `spec` with the process-wide snapshot and a deadline.
pub fn run_with_timeout(spec: &CommandSpec, timeout: Duration) -> TimedOutcome {
    Launcher::new().run_with_timeout(spec, timeout)
}

enum Waited {
    Exited(ExitStatus),
    Killed,
}

/// Saturating milliseconds, for logs and summaries.
pub fn millis(duration: Duration) -> u64 {
    u64::try_from(duration.as_millis()).unwrap_or(u64::MAX)
}

/// Block until the pidfd fires or `deadline` passes, draining stderr meanwhile.
/// With no deadline the child is never killed.
fn wait_until(
    guard: &mut ChildGuard<'_>,
    pidfd: &OwnedFd,
    mut stderr: Option<ChildStderr>,
    collector: &mut StderrCollector,
    deadline: Option<Instant>,
) -> Result<Waited> {
    let exited = loop {
        let timeout = deadline.map_or(PollTimeout::NONE, |deadline| {
            poll_timeout(deadline.saturating_duration_since(Instant::now()))
        });
        let (exit_ready, stderr_ready) = {
            let mut fds = Vec::with_capacity(2);
            fds.push(PollFd::new(pidfd.as_fd(), PollFlags::POLLIN));
            if let Some(pipe) = stderr.as_ref() {
                fds.push(PollFd::new(pipe.as_fd(), PollFlags::POLLIN));
            }
            match poll(&mut fds, timeout) {
                Ok(_) => {}
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(e).context("poll for child exit"),
            }
            (is_ready(&fds[0]), fds.get(1).is_some_and(is_ready))
        };
        if stderr_ready {
            collector.read_once(&mut stderr)?;
        }
        if exit_ready {
            break true;
        }
        if deadline.is_some_and(|deadline| Instant::now() >= deadline) {
            break false;
        }
    };

    let waited = if exited {
        Waited::Exited(guard.reap()?)
    } else {
        warn!(pid = guard.child().id(), "command timed out, killing");
        guard.kill_and_reap()?;
        Waited::Killed
    };
    collector.drain_ready(&mut stderr)?;
    Ok(waited)
}

fn is_ready(fd: &PollFd<'_>) -> bool {
    fd.revents().is_some_and(|revents| {
        revents.intersects(PollFlags::POLLIN | PollFlags::POLLHUP | PollFlags::POLLERR)
    })
}

/// Round up to whole milliseconds so a sub-millisecond remainder still sleeps.
fn poll_timeout(remaining: Duration) -> PollTimeout {
    let rounded = u64::try_from(remaining.as_nanos().div_ceil(1_000_000)).unwrap_or(u64::MAX);
    PollTimeout::try_from(Duration::from_millis(rounded)).unwrap_or(PollTimeout::MAX)
}

/// Owns the child until it is reaped; kills and reaps it on drop otherwise.
struct ChildGuard<'a> {
    child: Child,
    observer: &'a dyn LaunchObserver,
    reaped: bool,
}

impl<'a> ChildGuard<'a> {
    fn new(child: Child, observer: &'a dyn LaunchObserver) -> Self {
        Self {
            child,
            observer,
            reaped: false,
        }
    }

    fn child(&self) -> &Child {
        &self.child
    }

    fn reap(&mut self) -> Result<ExitStatus> {
        let status = self.child.wait().context("wait for command")?;
        self.reaped = true;
        self.observer.on_end(self.child.id());
        Ok(status)
    }

    fn kill_and_reap(&mut self) -> Result<ExitStatus> {
        if let Err(e) = self.child.kill() {
            warn!(pid = self.child.id(), err = %e, "failed to kill command");
        }
        self.reap().context("wait command after kill")
    }
}

impl Drop for ChildGuard<'_> {
    fn drop(&mut self) {
        if self.reaped {
            return;
        }
        warn!(pid = self.child.id(), "abandoning command, killing");
        let _ = self.child.kill();
        if self.child.wait().is_ok() {
            self.observer.on_end(self.child.id());
        }
    }
}

/// Bounded stderr buffer. Bytes past the limit are counted and dropped while
/// the pipe keeps draining.
struct StderrCollector {
    buf: Vec<u8>,
    truncated: usize,
    limit: usize,
}

impl StderrCollector {
    fn new(limit: usize) -> Self {
        Self {
            buf: Vec::new(),
            truncated: 0,
            limit,
        }
    }

    fn push(&mut self, chunk: &[u8]) {
        let remaining = self.limit.saturating_sub(self.buf.len());
        let keep = chunk.len().min(remaining);
        self.buf.extend_from_slice(&chunk[..keep]);
        self.truncated += chunk.len() - keep;
    }

    fn read_to_end(&mut self, pipe: Option<ChildStderr>) -> Result<()> {
        let mut pipe = pipe;
        while pipe.is_some() {
            self.read_once(&mut pipe)?;
        }
        Ok(())
    }

    /// One `read(2)`; closes the pipe on EOF.
    fn read_once(&mut self, pipe: &mut Option<ChildStderr>) -> Result<()> {
        let Some(reader) = pipe.as_mut() else {
            return Ok(());
        };
        let mut chunk = [0u8; READ_CHUNK];
        match reader.read(&mut chunk) {
            Ok(0) => *pipe = None,
            Ok(n) => self.push(&chunk[..n]),
            Err(e) if e.kind() == ErrorKind::Interrupted => {}
            Err(e) => return Err(e).context("read stderr"),
        }
        Ok(())
    }

    /// Read whatever is already buffered without waiting for EOF. A grandchild
    /// holding the pipe open must not keep us blocked after the reap.
    fn drain_ready(&mut self, pipe: &mut Option<ChildStderr>) -> Result<()> {
        loop {
            let ready = match pipe.as_ref() {
                None => return Ok(()),
                Some(reader) => {
                    let mut fds = [PollFd::new(reader.as_fd(), PollFlags::POLLIN)];
                    match poll(&mut fds, PollTimeout::ZERO) {
                        Ok(_) => is_ready(&fds[0]),
                        Err(Errno::EINTR) => continue,
                        Err(e) => return Err(e).context("poll stderr"),
                    }
                }
            };
            if !ready {
                return Ok(());
            }
            self.read_once(pipe)?;
        }
    }

    fn truncated_notice(&self, label: &str) -> String {
        format!("\n[{label} stderr truncated {} bytes]\n", self.truncated)
    }
}
