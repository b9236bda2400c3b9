//! Run a command with a frozen environment and an optional hard timeout.
//!
//! The environment snapshot is captured before arguments are parsed, so the
//! child sees exactly the environment `execkit` was started with.

use std::path::{Path, PathBuf};
use std::time::Duration;

use anyhow::{Context, Result, bail};
use clap::{Parser, Subcommand};
use serde_json::json;

use execkit::core::command::CommandSpec;
use execkit::core::types::{Execution, LaunchResult};
use execkit::exit_codes;
use execkit::io::config::{LauncherConfig, load_config, write_config};
use execkit::io::env_snapshot;
use execkit::io::exit_watch::{ExitWatch, MECHANISM, Pidfd};
use execkit::io::process::{Launcher, millis};
use execkit::logging;

#[derive(Parser)]
#[command(
    name = "execkit",
    version,
    about = "Run commands with a frozen environment and hard timeouts"
)]
struct Cli {
    /// Log launcher activity to stderr (overridden by `RUST_LOG`).
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Launch a command and report its outcome through the exit code.
    Run {
        /// Kill the command after this many seconds.
        #[arg(short, long)]
        timeout: Option<u64>,
        /// Launcher config (TOML). Missing file means defaults.
        #[arg(short, long, default_value = "execkit.toml")]
        config: PathBuf,
        /// Print an execution summary as JSON on stdout.
        #[arg(long)]
        json: bool,
        /// Program and arguments, passed verbatim.
        #[arg(required = true, trailing_var_arg = true, allow_hyphen_values = true)]
        argv: Vec<String>,
    },
    /// Write a config file holding the defaults.
    Init {
        /// Where to write the config.
        #[arg(short, long, default_value = "execkit.toml")]
        config: PathBuf,
        /// Replace an existing file.
        #[arg(long)]
        force: bool,
    },
    /// Report whether timeouts can be enforced on this system.
    Check,
}

fn main() {
    env_snapshot::init();
    let code = match run() {
        Ok(code) => code,
        Err(err) => {
            eprintln!("{:#}", err);
            exit_codes::INVALID
        }
    };
    std::process::exit(code);
}

fn run() -> Result<i32> {
    let cli = Cli::parse();
    logging::init(cli.verbose)?;
    match cli.command {
        Command::Run {
            timeout,
            config,
            json,
            argv,
        } => cmd_run(timeout, &config, json, argv),
        Command::Init { config, force } => cmd_init(&config, force),
        Command::Check => Ok(cmd_check()),
    }
}

fn cmd_run(timeout: Option<u64>, config: &Path, json: bool, argv: Vec<String>) -> Result<i32> {
    let cfg = load_config(config)?;
    if timeout == Some(0) {
        bail!("--timeout must be > 0");
    }
    let timeout = timeout.map(Duration::from_secs).or(cfg.default_timeout());
    let spec = CommandSpec::new(argv)?;
    let launcher = Launcher::new().with_config(&cfg);
    let execution = launcher
        .launch(&spec, timeout)
        .with_context(|| format!("monitor `{}`", spec.command_line()))?;

    if json {
        println!("{}", summary(&execution)?);
    }
    if !execution.result.is_success() {
        eprintln!("{}", execution.result.diagnostic());
    }
    Ok(exit_code(&execution.result))
}

fn cmd_init(path: &Path, force: bool) -> Result<i32> {
    if path.exists() && !force {
        bail!("{} already exists (use --force to replace it)", path.display());
    }
    write_config(path, &LauncherConfig::default())?;
    println!("wrote {}", path.display());
    Ok(exit_codes::OK)
}

fn cmd_check() -> i32 {
    if Pidfd.is_available() {
        println!("pidfd: available");
    } else {
        println!("pidfd: unavailable ({MECHANISM} not supported)");
    }
    exit_codes::OK
}

fn exit_code(result: &LaunchResult) -> i32 {
    match result {
        LaunchResult::Success => exit_codes::OK,
        LaunchResult::Failure { .. } => exit_codes::FAILED,
        LaunchResult::TimedOut { .. } => exit_codes::TIMED_OUT,
        LaunchResult::LaunchError { .. } => exit_codes::LAUNCH_ERROR,
    }
}

fn summary(execution: &Execution) -> Result<String> {
    let value = json!({
        "result": execution.result,
        "exit_code": execution.result.exit_code(),
        "pid": execution.pid,
        "elapsed_ms": millis(execution.elapsed),
        "stderr": execution.stderr,
        "stderr_truncated": execution.stderr_truncated,
    });
    serde_json::to_string_pretty(&value).context("serialize execution summary")
}

#[cfg(test)]
mod tests {
    use super::*;
    use execkit::core::types::ChildExit;

    #[test]
    fn exit_codes_are_distinct_per_outcome() {
        let failure = LaunchResult::Failure {
            exit: ChildExit::Code(7),
            diagnostic: "x".to_string(),
        };
        let timeout = LaunchResult::TimedOut {
            diagnostic: "x".to_string(),
        };
        let launch = LaunchResult::LaunchError {
            diagnostic: "x".to_string(),
        };
        assert_eq!(exit_code(&LaunchResult::Success), exit_codes::OK);
        assert_eq!(exit_code(&failure), exit_codes::FAILED);
        assert_eq!(exit_code(&timeout), exit_codes::TIMED_OUT);
        assert_eq!(exit_code(&launch), exit_codes::LAUNCH_ERROR);
    }

    #[test]
    fn cli_keeps_hyphenated_child_args() {
        let cli = Cli::try_parse_from(["execkit", "run", "--", "/bin/ls", "-la"]).expect("parse");
        match cli.command {
            Command::Run { argv, timeout, .. } => {
                assert_eq!(argv, ["/bin/ls", "-la"]);
                assert_eq!(timeout, None);
            }
            _ => panic!("expected run"),
        }
    }

    #[test]
    fn summary_saturates_elapsed() {
        let execution = Execution {
            result: LaunchResult::Success,
            pid: Some(1),
            stderr: String::new(),
            stderr_truncated: 0,
            elapsed: Duration::MAX,
        };
        let value: serde_json::Value =
            serde_json::from_str(&summary(&execution).expect("summary")).expect("json");
        assert_eq!(value["elapsed_ms"], u64::MAX);
    }

    #[test]
    fn init_defaults_to_local_config() {
        let cli = Cli::try_parse_from(["execkit", "init"]).expect("parse");
        match cli.command {
            Command::Init { config, force } => {
                assert_eq!(config, PathBuf::from("execkit.toml"));
                assert!(!force);
            }
            _ => panic!("expected init"),
        }
    }
}
