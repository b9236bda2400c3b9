//! Argument vectors for launched commands.

use anyhow::{Result, bail};

/// An argv: element 0 is the program, the rest are passed verbatim.
///
/// No shell interpretation happens anywhere; element boundaries are argument
/// boundaries.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    argv: Vec<String>,
}

impl CommandSpec {
    pub fn new<I, S>(argv: I) -> Result<Self>
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        let argv: Vec<String> = argv.into_iter().map(Into::into).collect();
        match argv.first() {
            None => bail!("command must contain at least a program"),
            Some(program) if program.is_empty() => bail!("command program must be non-empty"),
            Some(_) => Ok(Self { argv }),
        }
    }

    pub fn program(&self) -> &str {
        &self.argv[0]
    }

    pub fn args(&self) -> &[String] {
        &self.argv[1..]
    }

    pub fn argv(&self) -> &[String] {
        &self.argv
    }

    /// Space-joined argv for diagnostics. Not meant to be re-parsed.
    pub fn command_line(&self) -> String {
        self.argv.join(" ")
    }
}
