//! Frozen copy of the process environment handed to every child.
//!
//! The live environment is read once, at the first call to [`init`] or
//! [`global`]. Later `set_var`/`remove_var` calls in this process are never
//! observed by children launched from the snapshot.

use std::ffi::{OsStr, OsString};
use std::sync::OnceLock;

use tracing::debug;

static SNAPSHOT: OnceLock<EnvSnapshot> = OnceLock::new();

/// An immutable, name-sorted list of environment variables.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct EnvSnapshot {
    vars: Vec<(OsString, OsString)>,
}

impl EnvSnapshot {
    /// Read the live environment now.
    pub fn capture() -> Self {
        Self::from_pairs(std::env::vars_os())
    }

    /// Build a snapshot from explicit pairs. Later duplicates win.
    pub fn from_pairs<I, K, V>(pairs: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<OsString>,
        V: Into<OsString>,
    {
        let mut vars: Vec<(OsString, OsString)> = Vec::new();
        for (key, value) in pairs {
            let key = key.into();
            let value = value.into();
            match vars.iter_mut().find(|(existing, _)| *existing == key) {
                Some(slot) => slot.1 = value,
                None => vars.push((key, value)),
            }
        }
        vars.sort_by(|a, b| a.0.cmp(&b.0));
        Self { vars }
    }

    pub fn get(&self, name: impl AsRef<OsStr>) -> Option<&OsStr> {
        let name = name.as_ref();
        self.vars
            .binary_search_by(|(key, _)| key.as_os_str().cmp(name))
            .ok()
            .map(|idx| self.vars[idx].1.as_os_str())
    }

    pub fn iter(&self) -> impl Iterator<Item = (&OsStr, &OsStr)> {
        self.vars.iter().map(|(k, v)| (k.as_os_str(), v.as_os_str()))
    }

    pub fn len(&self) -> usize {
        self.vars.len()
    }

    pub fn is_empty(&self) -> bool {
        self.vars.is_empty()
    }
}

/// Capture the process-wide snapshot if it has not been captured yet.
///
/// Call this early in `main`, before anything mutates the environment.
pub fn init() -> &'static EnvSnapshot {
    SNAPSHOT.get_or_init(|| {
        let snapshot = EnvSnapshot::capture();
        debug!(vars = snapshot.len(), "captured environment snapshot");
        snapshot
    })
}

/// The process-wide snapshot, captured lazily on first use.
pub fn global() -> &'static EnvSnapshot {
    init()
}
