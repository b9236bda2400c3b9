//! Test-only helpers: canned commands, fake exit watchers, observers.

use std::io;
use std::os::fd::OwnedFd;
use std::path::PathBuf;
use std::process::Child;
use std::sync::Mutex;

use tempfile::TempDir;

use crate::core::command::CommandSpec;
use crate::io::exit_watch::ExitWatch;
use crate::io::process::LaunchObserver;

/// `/usr/bin/id`, which succeeds silently on stderr.
pub fn id_command() -> CommandSpec {
    spec(["/usr/bin/id"])
}

/// `/usr/bin/printenv NAME`: exits 1 when `NAME` is unset.
pub fn printenv_command(name: &str) -> CommandSpec {
    spec(["/usr/bin/printenv", name])
}

pub fn sleep_command(seconds: u64) -> CommandSpec {
    spec(["/bin/sleep".to_string(), seconds.to_string()])
}

/// `/bin/sh -c SCRIPT`, for children that need shell features.
pub fn sh_command(script: &str) -> CommandSpec {
    spec(["/bin/sh", "-c", script])
}

fn spec<I, S>(argv: I) -> CommandSpec
where
    I: IntoIterator<Item = S>,
    S: Into<String>,
{
    CommandSpec::new(argv).expect("non-empty test command")
}

/// Exit watcher for a system without pidfd support.
#[derive(Debug, Clone, Copy, Default)]
pub struct Unavailable;

impl ExitWatch for Unavailable {
    fn is_available(&self) -> bool {
        false
    }

    fn watch(&self, _child: &Child) -> io::Result<OwnedFd> {
        Err(io::Error::new(io::ErrorKind::Unsupported, "pidfd disabled"))
    }
}

/// Exit watcher that claims support but fails to open the handle.
#[derive(Debug, Clone, Copy, Default)]
pub struct FailingWatch;

impl ExitWatch for FailingWatch {
    fn is_available(&self) -> bool {
        true
    }

    fn watch(&self, _child: &Child) -> io::Result<OwnedFd> {
        Err(io::Error::from_raw_os_error(libc::ENOSYS))
    }
}

/// Lifecycle event seen by [`RecordingObserver`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Event {
    Start(u32),
    End(u32),
}

/// Observer that records every callback in order.
#[derive(Debug, Default)]
pub struct RecordingObserver {
    events: Mutex<Vec<Event>>,
}

impl RecordingObserver {
    pub fn events(&self) -> Vec<Event> {
        self.events.lock().expect("observer lock").clone()
    }
}

impl LaunchObserver for RecordingObserver {
    fn on_start(&self, pid: u32) {
        self.events.lock().expect("observer lock").push(Event::Start(pid));
    }

    fn on_end(&self, pid: u32) {
        self.events.lock().expect("observer lock").push(Event::End(pid));
    }
}

/// Write `contents` to `execkit.toml` in a fresh temp dir.
pub fn temp_config(contents: &str) -> (TempDir, PathBuf) {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("execkit.toml");
    std::fs::write(&path, contents).expect("write config");
    (dir, path)
}
