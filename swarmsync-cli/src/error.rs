//! Error types for swarmsync
//!
//! Fatal kinds abort the run before any further remote mutation. Per-service
//! kinds are recorded in the run report and processing moves on.

use serde::Serialize;
use snafu::Snafu;
use std::path::PathBuf;

pub type Result<T, E = Error> = std::result::Result<T, E>;

/// Coarse classification used by the report and by the exit status
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    Connectivity,
    Configuration,
    SourceSync,
    Orchestrator,
    /// A service directory or one of its files could not be read
    ServiceRead,
    SecretOperation,
    Build,
    Deploy,
}

#[derive(Debug, Snafu)]
#[snafu(visibility(pub(crate)))]
pub enum Error {
    #[snafu(display("cannot reach {endpoint}: {reason}"))]
    Connectivity { endpoint: String, reason: String },

    #[snafu(display("failed to spawn {program} for {endpoint}: {source}"))]
    Spawn {
        program: String,
        endpoint: String,
        source: std::io::Error,
    },

    #[snafu(display("command timed out after {}s on {endpoint}: {command}", timeout_secs))]
    Timeout {
        endpoint: String,
        command: String,
        timeout_secs: u64,
    },

    #[snafu(display("configuration error: {message}"))]
    Configuration { message: String },

    #[snafu(display("failed to read config {}: {source}", path.display()))]
    ConfigRead {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("failed to parse config {}: {source}", path.display()))]
    ConfigParse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[snafu(display("failed to read {}: {source}", path.display()))]
    ReadSource {
        path: PathBuf,
        source: std::io::Error,
    },

    #[snafu(display("{service}: cannot read {path}: {message}"))]
    ServiceRead {
        service: String,
        path: String,
        message: String,
    },

    #[snafu(display("source sync failed (exit {exit_code}): {output}"))]
    SourceSync { exit_code: i32, output: String },

    #[snafu(display("orchestrator unavailable (exit {exit_code}): {output}"))]
    Orchestrator { exit_code: i32, output: String },

    #[snafu(display("{service}: secret {secret}: {message}"))]
    SecretOperation {
        service: String,
        secret: String,
        message: String,
    },

    #[snafu(display("{service}: build failed (exit {exit_code}): {output}"))]
    Build {
        service: String,
        exit_code: i32,
        output: String,
    },

    #[snafu(display("{service}: deploy failed (exit {exit_code}): {output}"))]
    Deploy {
        service: String,
        exit_code: i32,
        output: String,
    },
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::Connectivity { .. } | Error::Spawn { .. } | Error::Timeout { .. } => {
                ErrorKind::Connectivity
            }
            Error::Configuration { .. } | Error::ConfigRead { .. } | Error::ConfigParse { .. } => {
                ErrorKind::Configuration
            }
            Error::SourceSync { .. } => ErrorKind::SourceSync,
            Error::Orchestrator { .. } => ErrorKind::Orchestrator,
            Error::ReadSource { .. } | Error::ServiceRead { .. } => ErrorKind::ServiceRead,
            Error::SecretOperation { .. } => ErrorKind::SecretOperation,
            Error::Build { .. } => ErrorKind::Build,
            Error::Deploy { .. } => ErrorKind::Deploy,
        }
    }

    /// Fatal errors stop the whole run; everything else is scoped to one service
    pub fn is_fatal(&self) -> bool {
        matches!(
            self.kind(),
            ErrorKind::Connectivity
                | ErrorKind::Configuration
                | ErrorKind::SourceSync
                | ErrorKind::Orchestrator
        )
    }

    pub(crate) fn configuration(message: impl Into<String>) -> Self {
        Error::Configuration {
            message: message.into(),
        }
    }
}

/// Split transport failures (returned as `Err`) from everything else, which
/// the caller records against a single service.
pub(crate) fn isolate<T>(result: Result<T>) -> Result<Result<T, Error>> {
    match result {
        Ok(value) => Ok(Ok(value)),
        Err(e) if e.kind() == ErrorKind::Connectivity => Err(e),
        Err(e) => Ok(Err(e)),
    }
}

/// Collapse command output into a single diagnostic line for reports
pub(crate) fn summarize_output(stdout: &str, stderr: &str) -> String {
    let text = if stderr.trim().is_empty() { stdout } else { stderr };
    let text = text.trim();
    const LIMIT: usize = 400;
    if text.chars().count() > LIMIT {
        // keep the tail, docker prints the actual failure last
        let skip = text.chars().count() - LIMIT;
        format!("...{}", text.chars().skip(skip).collect::<String>())
    } else {
        text.to_string()
    }
}
