//! Docker Swarm queries and mutations over the remote executor
//!
//! Every method maps to exactly one remote command. Decisions about what to
//! run live in the reconciler; this layer only builds and interprets commands.

use crate::config::SwarmConfig;
use crate::error::{OrchestratorSnafu, Result, SourceSyncSnafu, summarize_output};
use crate::remote::{CommandOutput, RemoteCommand, RemoteExecutor, quote};
use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, info};

const SECRET_REFS_TEMPLATE: &str =
    "{{range .Spec.TaskTemplate.ContainerSpec.Secrets}}{{println .SecretName}}{{end}}";

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SecretRemoval {
    Removed,
    AlreadyAbsent,
    Failed(CommandOutput),
}

pub struct SwarmClient {
    executor: Arc<dyn RemoteExecutor>,
    docker: String,
    build_timeout: Duration,
}

impl SwarmClient {
    pub fn new(executor: Arc<dyn RemoteExecutor>, config: &SwarmConfig) -> Self {
        Self {
            executor,
            docker: config.swarm.docker.clone(),
            build_timeout: config.build_timeout(),
        }
    }

    pub fn endpoint(&self) -> &str {
        self.executor.endpoint()
    }

    pub fn executor(&self) -> &Arc<dyn RemoteExecutor> {
        &self.executor
    }

    async fn docker(&self, args: &str) -> Result<CommandOutput> {
        self.executor.execute(&format!("{} {args}", self.docker)).await
    }

    /// `active`, `inactive`, `pending`, ... as reported by the daemon
    pub async fn node_state(&self) -> Result<String> {
        let output = self
            .docker(&format!("info --format {}", quote("{{.Swarm.LocalNodeState}}")))
            .await?;
        if !output.success() {
            return OrchestratorSnafu {
                exit_code: output.exit_code,
                output: summarize_output(&output.stdout, &output.stderr),
            }
            .fail();
        }
        Ok(output.stdout.trim().to_string())
    }

    /// First-time initialization of a single-node swarm
    pub async fn init(&self, advertise_addr: Option<&str>) -> Result<()> {
        let mut args = "swarm init".to_string();
        if let Some(addr) = advertise_addr {
            args.push_str(&format!(" --advertise-addr {}", quote(addr)));
        }
        let output = self.docker(&args).await?;
        if !output.success() {
            return OrchestratorSnafu {
                exit_code: output.exit_code,
                output: summarize_output(&output.stdout, &output.stderr),
            }
            .fail();
        }
        info!(endpoint = self.endpoint(), "swarm initialized");
        Ok(())
    }

    /// Secret names referenced by any running service
    pub async fn secrets_in_use(&self) -> Result<BTreeSet<String>> {
        let output = self
            .executor
            .execute(&format!(
                "{docker} service ls -q | xargs -r {docker} service inspect --format {}",
                quote(SECRET_REFS_TEMPLATE),
                docker = self.docker
            ))
            .await?;
        if !output.success() {
            return OrchestratorSnafu {
                exit_code: output.exit_code,
                output: summarize_output(&output.stdout, &output.stderr),
            }
            .fail();
        }
        Ok(output.lines().map(str::to_string).collect())
    }

    pub async fn is_secret_in_use(&self, name: &str) -> Result<bool> {
        let in_use = self.secrets_in_use().await?.contains(name);
        debug!(secret = name, in_use, "in-use check");
        Ok(in_use)
    }

    /// Names of all existing secrets
    pub async fn secret_names(&self) -> Result<BTreeSet<String>> {
        let output = self
            .docker(&format!("secret ls --format {}", quote("{{.Name}}")))
            .await?;
        if !output.success() {
            return OrchestratorSnafu {
                exit_code: output.exit_code,
                output: summarize_output(&output.stdout, &output.stderr),
            }
            .fail();
        }
        Ok(output.lines().map(str::to_string).collect())
    }

    pub async fn secret_exists(&self, name: &str) -> Result<bool> {
        // `--filter name=` matches substrings, compare exact names instead
        Ok(self.secret_names().await?.contains(name))
    }

    /// Remove a secret; an already missing secret is not a failure
    pub async fn remove_secret(&self, name: &str) -> Result<SecretRemoval> {
        let output = self.docker(&format!("secret rm {}", quote(name))).await?;
        if output.success() {
            return Ok(SecretRemoval::Removed);
        }
        let stderr = output.stderr.to_ascii_lowercase();
        if stderr.contains("no such secret") || stderr.contains("not found") {
            return Ok(SecretRemoval::AlreadyAbsent);
        }
        Ok(SecretRemoval::Failed(output))
    }

    /// Create a secret, the payload travels on stdin
    pub async fn create_secret(&self, name: &str, payload: &[u8]) -> Result<CommandOutput> {
        self.executor
            .execute_with_input(
                &format!("{} secret create {} -", self.docker, quote(name)),
                payload,
            )
            .await
    }

    pub async fn build_image(
        &self,
        tag: &str,
        context: &str,
        dockerfile: Option<&str>,
    ) -> Result<CommandOutput> {
        let mut command = format!("{} build -t {}", self.docker, quote(tag));
        if let Some(file) = dockerfile {
            command.push_str(&format!(" -f {}", quote(file)));
        }
        command.push_str(&format!(" {}", quote(context)));
        self.executor
            .run(RemoteCommand::new(command).timeout(self.build_timeout))
            .await
    }

    pub async fn deploy_stack(&self, stack: &str, descriptor: &str) -> Result<CommandOutput> {
        self.docker(&format!(
            "stack deploy -c {} {}",
            quote(descriptor),
            quote(stack)
        ))
        .await
    }

    /// Bring the checkout at `root` to the tip of `branch`, cloning if needed
    pub async fn sync_source(&self, root: &str, url: &str, branch: &str) -> Result<()> {
        let root_q = quote(root);
        let branch_q = quote(branch);
        let command = format!(
            "if test -d {root_q}/.git; then \
             git -C {root_q} fetch --prune origin && \
             git -C {root_q} checkout -B {branch_q} {origin}; \
             else git clone --branch {branch_q} {url} {root_q}; fi",
            origin = quote(&format!("origin/{branch}")),
            url = quote(url),
        );
        let output = self.executor.execute(&command).await?;
        if !output.success() {
            return SourceSyncSnafu {
                exit_code: output.exit_code,
                output: summarize_output(&output.stdout, &output.stderr),
            }
            .fail();
        }
        info!(root, branch, "source synchronized");
        Ok(())
    }
}
