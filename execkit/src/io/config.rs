//! Launcher configuration stored as TOML (e.g. `execkit.toml`).

use std::fs;
use std::io::Write;
use std::path::Path;
use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use serde::{Deserialize, Serialize};

/// Where the child's standard output goes.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum StdoutMode {
    /// Share the parent's stdout.
    #[default]
    Inherit,
    /// Discard.
    Null,
}

/// Launcher configuration (TOML).
///
/// Missing fields default to the values in [`LauncherConfig::default`].
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct LauncherConfig {
    /// Timeout applied by the CLI when `--timeout` is not given.
    /// Absent means wait for the child unconditionally.
    pub default_timeout_secs: Option<u64>,

    /// Keep at most this many bytes of child stderr in diagnostics.
    pub stderr_limit_bytes: usize,

    pub stdout: StdoutMode,
}

impl Default for LauncherConfig {
    fn default() -> Self {
        Self {
            default_timeout_secs: None,
            stderr_limit_bytes: 100_000,
            stdout: StdoutMode::Inherit,
        }
    }
}

impl LauncherConfig {
    pub fn validate(&self) -> Result<()> {
        if self.default_timeout_secs == Some(0) {
            return Err(anyhow!("default_timeout_secs must be > 0 when set"));
        }
        if self.stderr_limit_bytes == 0 {
            return Err(anyhow!("stderr_limit_bytes must be > 0"));
        }
        Ok(())
    }

    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout_secs.map(Duration::from_secs)
    }
}

/// Load config from a TOML file.
///
/// If the file is missing, returns `LauncherConfig::default()`.
pub fn load_config(path: &Path) -> Result<LauncherConfig> {
    if !path.exists() {
        let cfg = LauncherConfig::default();
        cfg.validate()?;
        return Ok(cfg);
    }
    let contents = fs::read_to_string(path).with_context(|| format!("read {}", path.display()))?;
    let cfg: LauncherConfig =
        toml::from_str(&contents).with_context(|| format!("parse {}", path.display()))?;
    cfg.validate()?;
    Ok(cfg)
}

/// Write `cfg` to `path`, replacing any existing file in one rename.
///
/// A reader never observes a half-written config.
pub fn write_config(path: &Path, cfg: &LauncherConfig) -> Result<()> {
    cfg.validate()?;
    let mut body = toml::to_string_pretty(cfg).context("serialize config toml")?;
    body.push('\n');
    replace_file(path, body.as_bytes())
}

fn replace_file(path: &Path, body: &[u8]) -> Result<()> {
    let dir = match path.parent() {
        Some(dir) if !dir.as_os_str().is_empty() => dir,
        _ => Path::new("."),
    };
    fs::create_dir_all(dir).with_context(|| format!("create directory {}", dir.display()))?;
    // Unique per process so two writers never share a staging file.
    let staging = dir.join(format!(".execkit-{}.toml.partial", std::process::id()));
    let staged = fs::File::create(&staging)
        .and_then(|mut file| {
            file.write_all(body)?;
            file.sync_all()
        })
        .with_context(|| format!("stage config {}", staging.display()));
    if let Err(e) = staged {
        let _ = fs::remove_file(&staging);
        return Err(e);
    }
    fs::rename(&staging, path).with_context(|| format!("install config {}", path.display()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn load_missing_returns_default() {
        let temp = tempfile::tempdir().expect("tempdir");
        let cfg = load_config(&temp.path().join("missing.toml")).expect("load");
        assert_eq!(cfg, LauncherConfig::default());
        assert_eq!(cfg.default_timeout(), None);
    }

    #[test]
    fn write_then_load_round_trips() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("nested/execkit.toml");
        let cfg = LauncherConfig {
            default_timeout_secs: Some(30),
            stderr_limit_bytes: 512,
            stdout: StdoutMode::Null,
        };
        write_config(&path, &cfg).expect("write");
        let loaded = load_config(&path).expect("load");
        assert_eq!(loaded, cfg);
    }

    #[test]
    fn partial_file_fills_defaults() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("execkit.toml");
        fs::write(&path, "stdout = \"null\"\n").expect("write");
        let cfg = load_config(&path).expect("load");
        assert_eq!(cfg.stdout, StdoutMode::Null);
        assert_eq!(cfg.stderr_limit_bytes, 100_000);
    }

    #[test]
    fn zero_limits_are_rejected() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("execkit.toml");
        fs::write(&path, "stderr_limit_bytes = 0\n").expect("write");
        let err = load_config(&path).unwrap_err();
        assert!(format!("{err:#}").contains("stderr_limit_bytes"));

        fs::write(&path, "default_timeout_secs = 0\n").expect("write");
        assert!(load_config(&path).is_err());
    }

    #[test]
    fn rewrite_replaces_file_and_leaves_no_staging() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("execkit.toml");
        fs::write(&path, "stdout = \"null\"\n").expect("write");
        write_config(&path, &LauncherConfig::default()).expect("write");
        assert_eq!(load_config(&path).expect("load"), LauncherConfig::default());
        let names: Vec<_> = fs::read_dir(temp.path())
            .expect("read_dir")
            .map(|entry| entry.expect("entry").file_name())
            .collect();
        assert_eq!(names, ["execkit.toml"]);
    }

    #[test]
    fn invalid_config_is_never_written() {
        let temp = tempfile::tempdir().expect("tempdir");
        let path = temp.path().join("execkit.toml");
        let cfg = LauncherConfig {
            stderr_limit_bytes: 0,
            ..LauncherConfig::default()
        };
        assert!(write_config(&path, &cfg).is_err());
        assert!(!path.exists());
    }
}
