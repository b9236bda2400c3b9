//! Side-effecting parts of execkit: environment, processes, config files.

pub mod config;
pub mod env_snapshot;
pub mod exit_watch;
pub mod process;
