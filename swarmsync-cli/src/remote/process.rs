//! Process-backed executors: ssh to the manager node, or a local shell

use super::{CommandOutput, RemoteCommand, RemoteExecutor};
use crate::config::{LOCAL_ENDPOINT, SwarmConfig};
use crate::error::{ConnectivitySnafu, Result, SpawnSnafu, TimeoutSnafu};
use async_trait::async_trait;
use snafu::ResultExt;
use std::io;
use std::process::Stdio;
use std::time::Duration;
use tokio::io::AsyncWriteExt;
use tokio::process::Command;
use tracing::debug;

/// ssh reserves exit status 255 for its own failures
const SSH_TRANSPORT_FAILURE: i32 = 255;

/// Runs commands on one fixed host through the system `ssh` client
#[derive(Debug, Clone)]
pub struct SshExecutor {
    destination: String,
    port: Option<u16>,
    identity_file: Option<String>,
    options: Vec<String>,
    timeout: Duration,
}

impl SshExecutor {
    pub fn from_config(config: &SwarmConfig) -> Self {
        Self {
            destination: config.remote.host.clone(),
            port: config.remote.port,
            identity_file: config.remote.identity_file.clone(),
            options: config.remote.ssh_options.clone(),
            timeout: config.command_timeout(),
        }
    }

    fn ssh_args(&self, command: &str) -> Vec<String> {
        // BatchMode: never block on a password prompt
        let mut args = vec!["-o".to_string(), "BatchMode=yes".to_string()];
        if let Some(port) = self.port {
            args.push("-p".to_string());
            args.push(port.to_string());
        }
        if let Some(identity) = &self.identity_file {
            args.push("-i".to_string());
            args.push(identity.clone());
        }
        for option in &self.options {
            args.push("-o".to_string());
            args.push(option.clone());
        }
        args.push(self.destination.clone());
        args.push("--".to_string());
        args.push(command.to_string());
        args
    }
}

#[async_trait]
impl RemoteExecutor for SshExecutor {
    fn endpoint(&self) -> &str {
        &self.destination
    }

    async fn run(&self, request: RemoteCommand) -> Result<CommandOutput> {
        let mut command = Command::new("ssh");
        command.args(self.ssh_args(&request.command));
        let timeout = request.timeout.unwrap_or(self.timeout);
        let output = run_process(command, "ssh", &self.destination, &request, timeout).await?;

        if output.exit_code == SSH_TRANSPORT_FAILURE {
            return ConnectivitySnafu {
                endpoint: self.destination.clone(),
                reason: crate::error::summarize_output("", &output.stderr),
            }
            .fail();
        }
        Ok(output)
    }
}

/// Runs commands through `sh -c` on this machine, for tools running on the manager itself
#[derive(Debug, Clone)]
pub struct LocalExecutor {
    timeout: Duration,
}

impl LocalExecutor {
    pub fn new(timeout: Duration) -> Self {
        Self { timeout }
    }
}

#[async_trait]
impl RemoteExecutor for LocalExecutor {
    fn endpoint(&self) -> &str {
        LOCAL_ENDPOINT
    }

    async fn run(&self, request: RemoteCommand) -> Result<CommandOutput> {
        let mut command = Command::new("sh");
        command.arg("-c").arg(&request.command);
        let timeout = request.timeout.unwrap_or(self.timeout);
        run_process(command, "sh", LOCAL_ENDPOINT, &request, timeout).await
    }
}

async fn run_process(
    mut command: Command,
    program: &str,
    endpoint: &str,
    request: &RemoteCommand,
    timeout: Duration,
) -> Result<CommandOutput> {
    debug!(endpoint, command = %request.command, "executing");

    command
        .stdin(if request.stdin.is_some() {
            Stdio::piped()
        } else {
            Stdio::null()
        })
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .kill_on_drop(true);

    let mut child = command.spawn().context(SpawnSnafu { program, endpoint })?;

    let pipe = child.stdin.take();
    let input = request.stdin.as_deref();
    let feed = async move {
        let (Some(mut pipe), Some(input)) = (pipe, input) else {
            return Ok(());
        };
        match pipe.write_all(input).await {
            // the command exited without reading all of its input; its exit
            // status and stderr say why
            Err(e) if e.kind() == io::ErrorKind::BrokenPipe => {
                debug!(endpoint, "stdin closed early by the remote command");
                Ok(())
            }
            // dropping the pipe closes it so the remote side sees EOF
            result => result,
        }
    };
    let finished = async {
        let (fed, output) = tokio::join!(feed, child.wait_with_output());
        fed.and(output)
    };

    let output = match tokio::time::timeout(timeout, finished).await {
        Ok(result) => result.context(SpawnSnafu { program, endpoint })?,
        Err(_) => {
            return TimeoutSnafu {
                endpoint,
                command: request.command.clone(),
                timeout_secs: timeout.as_secs(),
            }
            .fail();
        }
    };

    let result = CommandOutput {
        // killed by signal has no code
        exit_code: output.status.code().unwrap_or(-1),
        stdout: String::from_utf8_lossy(&output.stdout).into_owned(),
        stderr: String::from_utf8_lossy(&output.stderr).into_owned(),
    };
    debug!(endpoint, exit_code = result.exit_code, "command finished");
    Ok(result)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::SwarmConfig;

    #[test]
    fn test_ssh_args() {
        let mut config = SwarmConfig::default();
        config.remote.host = "deploy@manager".into();
        config.remote.port = Some(2222);
        config.remote.identity_file = Some("/keys/id".into());
        config.remote.ssh_options = vec!["StrictHostKeyChecking=accept-new".into()];
        let ssh = SshExecutor::from_config(&config);

        assert_eq!(
            ssh.ssh_args("docker info"),
            vec![
                "-o",
                "BatchMode=yes",
                "-p",
                "2222",
                "-i",
                "/keys/id",
                "-o",
                "StrictHostKeyChecking=accept-new",
                "deploy@manager",
                "--",
                "docker info",
            ]
        );
    }

    #[tokio::test]
    async fn test_local_executor_captures_output() {
        let local = LocalExecutor::new(Duration::from_secs(10));
        let output = local.execute("echo out; echo err >&2; exit 3").await.unwrap();
        assert_eq!(output.exit_code, 3);
        assert_eq!(output.stdout.trim(), "out");
        assert_eq!(output.stderr.trim(), "err");
    }

    #[tokio::test]
    async fn test_local_executor_pipes_stdin() {
        let local = LocalExecutor::new(Duration::from_secs(10));
        let output = local.execute_with_input("cat", b"s3cr3t").await.unwrap();
        assert!(output.success());
        assert_eq!(output.stdout, "s3cr3t");
    }

    #[tokio::test]
    async fn test_local_executor_timeout_is_connectivity() {
        let local = LocalExecutor::new(Duration::from_millis(100));
        let err = local.execute("sleep 5").await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Connectivity);
        assert!(err.is_fatal());
    }

    #[tokio::test]
    async fn test_unread_stdin_is_a_command_failure() {
        let local = LocalExecutor::new(Duration::from_secs(10));
        let payload = vec![b'x'; 200 * 1024];
        let output = local
            .execute_with_input("echo 'payload rejected' >&2; exit 1", &payload)
            .await
            .unwrap();
        assert_eq!(output.exit_code, 1);
        assert!(output.stderr.contains("payload rejected"));
    }

    #[tokio::test]
    async fn test_large_stdin_is_streamed() {
        let local = LocalExecutor::new(Duration::from_secs(10));
        let payload = vec![b'y'; 512 * 1024];
        let output = local.execute_with_input("cat", &payload).await.unwrap();
        assert!(output.success());
        assert_eq!(output.stdout.len(), payload.len());
    }

    #[tokio::test]
    async fn test_stalled_reader_times_out() {
        let local = LocalExecutor::new(Duration::from_millis(200));
        let payload = vec![b'z'; 1024 * 1024];
        let err = local.execute_with_input("sleep 5", &payload).await.unwrap_err();
        assert_eq!(err.kind(), crate::error::ErrorKind::Connectivity);
    }
}
