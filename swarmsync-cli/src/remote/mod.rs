//! Remote execution channel
//!
//! Every effect on the managed host goes through a `RemoteExecutor`: a command
//! string goes in, exit status plus captured output come back. Payloads that
//! must not show up in process listings travel on stdin.

mod process;

#[cfg(test)]
pub mod fake;

pub use process::{LocalExecutor, SshExecutor};

use crate::config::SwarmConfig;
use crate::error::Result;
use async_trait::async_trait;
use std::sync::Arc;
use std::time::Duration;

/// A single command to run on the endpoint
#[derive(Clone, Default)]
pub struct RemoteCommand {
    pub command: String,
    pub stdin: Option<Vec<u8>>,
    pub timeout: Option<Duration>,
}

impl RemoteCommand {
    pub fn new(command: impl Into<String>) -> Self {
        Self {
            command: command.into(),
            ..Self::default()
        }
    }

    pub fn stdin(mut self, input: impl Into<Vec<u8>>) -> Self {
        self.stdin = Some(input.into());
        self
    }

    pub fn timeout(mut self, timeout: Duration) -> Self {
        self.timeout = Some(timeout);
        self
    }
}

// stdin may carry secret material, keep it out of debug output
impl std::fmt::Debug for RemoteCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RemoteCommand")
            .field("command", &self.command)
            .field("stdin", &self.stdin.as_ref().map(|bytes| format!("<{} bytes>", bytes.len())))
            .field("timeout", &self.timeout)
            .finish()
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandOutput {
    pub exit_code: i32,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.exit_code == 0
    }

    /// Non-empty trimmed stdout lines
    pub fn lines(&self) -> impl Iterator<Item = &str> {
        self.stdout.lines().map(str::trim).filter(|line| !line.is_empty())
    }
}

#[async_trait]
pub trait RemoteExecutor: Send + Sync {
    /// Human-readable endpoint name for diagnostics
    fn endpoint(&self) -> &str;

    /// Run one command. Transport failures (unreachable host, timeout) are
    /// `Connectivity` errors; a non-zero exit of the command itself is not
    /// an error at this layer.
    async fn run(&self, command: RemoteCommand) -> Result<CommandOutput>;

    async fn execute(&self, command: &str) -> Result<CommandOutput> {
        self.run(RemoteCommand::new(command)).await
    }

    async fn execute_with_input(&self, command: &str, input: &[u8]) -> Result<CommandOutput> {
        self.run(RemoteCommand::new(command).stdin(input)).await
    }
}

/// Build the executor the configuration asks for
pub fn connect(config: &SwarmConfig) -> Arc<dyn RemoteExecutor> {
    if config.is_local() {
        Arc::new(LocalExecutor::new(config.command_timeout()))
    } else {
        Arc::new(SshExecutor::from_config(config))
    }
}

/// Single-quote a word for a POSIX shell
pub fn quote(word: &str) -> String {
    if !word.is_empty()
        && word
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || "_-./:=@%+,".contains(c))
    {
        return word.to_string();
    }
    format!("'{}'", word.replace('\'', r"'\''"))
}
