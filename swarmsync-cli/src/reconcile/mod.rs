//! Reconciliation engine
//!
//! Discovery → (per service) secrets → build → deploy. Each service's pipeline
//! is independent: a failure is recorded against that service and the run
//! moves on. Only transport and configuration problems end the run early.

pub mod build;
pub mod cleanup;
pub mod deploy;
pub mod namespace;
pub mod secrets;

pub use cleanup::CleanupReport;
pub use namespace::{SecretNamespace, secret_name};

use crate::config::SwarmConfig;
use crate::credentials::CredentialEntry;
use crate::discovery::{self, EmbeddedBuild, ServiceDescriptor, ServiceFilter, ServiceSource};
use crate::error::{Error, OrchestratorSnafu, Result, isolate};
use crate::remote::RemoteExecutor;
use crate::report::{RunReport, ServiceReport, StageOutcome};
use crate::swarm::SwarmClient;
use std::collections::BTreeSet;
use std::sync::Arc;
use tracing::{info, warn};

struct ServicePlan {
    descriptor: ServiceDescriptor,
    entries: Result<Vec<CredentialEntry>, Error>,
}

pub struct Reconciler<'a> {
    config: &'a SwarmConfig,
    swarm: SwarmClient,
    source: ServiceSource,
}

impl<'a> Reconciler<'a> {
    pub fn new(config: &'a SwarmConfig, executor: Arc<dyn RemoteExecutor>) -> Self {
        let source = ServiceSource::from_config(config, Some(executor.clone()));
        Self::with_source(config, executor, source)
    }

    pub fn with_source(
        config: &'a SwarmConfig,
        executor: Arc<dyn RemoteExecutor>,
        source: ServiceSource,
    ) -> Self {
        Self {
            config,
            swarm: SwarmClient::new(executor, config),
            source,
        }
    }

    pub fn endpoint(&self) -> &str {
        self.swarm.endpoint()
    }

    /// Verify the manager is reachable, initialize the swarm on first use and
    /// optionally synchronize the source checkout
    pub async fn preflight(&self) -> Result<()> {
        let state = self.swarm.node_state().await?;
        match state.as_str() {
            "active" => {}
            "inactive" if self.config.swarm.init => {
                eprintln!("🚀 Initializing swarm on {}", self.endpoint());
                self.swarm
                    .init(self.config.swarm.advertise_addr.as_deref())
                    .await?;
            }
            other => {
                return OrchestratorSnafu {
                    exit_code: 0,
                    output: format!("swarm node state is `{other}`, expected `active`"),
                }
                .fail();
            }
        }

        if self.config.repository.sync {
            let url = self.config.repository.url.as_deref().ok_or_else(|| {
                Error::configuration("repository.url is required when source sync is enabled")
            })?;
            eprintln!("🔄 Synchronizing {} ({})", url, self.config.repository.branch);
            self.swarm
                .sync_source(&self.config.remote_root(), url, &self.config.repository.branch)
                .await?;
        }
        Ok(())
    }

    fn filter(&self) -> ServiceFilter {
        ServiceFilter::new(&self.config.layout)
    }

    fn service_dir(&self, service: &str) -> String {
        format!("{}/{service}", self.config.remote_root())
    }

    /// Every discovered service with its parsed credentials
    async fn plan(&self) -> Result<(Vec<ServicePlan>, SecretNamespace)> {
        let discovered =
            discovery::describe_all(&self.source, &self.filter(), &self.config.layout).await?;

        let mut namespace = SecretNamespace::new();
        let mut plans = Vec::with_capacity(discovered.len());
        for service in discovered {
            let plan = match service.descriptor {
                Ok(descriptor) => {
                    let entries = isolate(self.source.credentials(&descriptor).await)?;
                    if let Ok(entries) = &entries {
                        for entry in entries {
                            namespace.claim(&descriptor.name, &entry.key);
                        }
                    }
                    ServicePlan {
                        descriptor,
                        entries,
                    }
                }
                Err(error) => ServicePlan {
                    descriptor: ServiceDescriptor::unlisted(&service.name),
                    entries: Err(error),
                },
            };
            plans.push(plan);
        }
        Ok((plans, namespace))
    }

    /// Reject an unknown service filter before anything is changed on the
    /// manager. Discovery only reads, so it is safe ahead of preflight.
    pub async fn check_filter(&self, only: Option<&str>) -> Result<()> {
        let Some(name) = only else {
            return Ok(());
        };
        if matches!(self.source, ServiceSource::Remote { .. }) && self.config.repository.sync {
            // the remote checkout may only exist once preflight has synced it
            return Ok(());
        }
        let known = discovery::discover(&self.source, &self.filter()).await?;
        if known.contains(name) {
            Ok(())
        } else {
            Err(self.unknown_service(name))
        }
    }

    fn unknown_service(&self, name: &str) -> Error {
        Error::configuration(format!(
            "unknown service `{name}` under {}",
            self.source.describe()
        ))
    }

    /// Reconcile all discovered services, or just `only`
    pub async fn run(&self, only: Option<&str>) -> Result<RunReport> {
        // the namespace spans every service so a filtered run cannot collide
        // with secrets owned by services it does not touch
        let (plans, namespace) = self.plan().await?;

        if let Some(name) = only {
            if !plans.iter().any(|p| p.descriptor.name == name) {
                return Err(self.unknown_service(name));
            }
        }

        let mut report = RunReport::new(self.endpoint());
        for plan in plans
            .iter()
            .filter(|p| only.is_none_or(|name| name == p.descriptor.name))
        {
            eprintln!("🔧 {}", plan.descriptor.name);
            let service_report = self.reconcile_service(plan, &namespace).await?;
            report.push(service_report);
        }
        Ok(report)
    }

    async fn reconcile_service(
        &self,
        plan: &ServicePlan,
        namespace: &SecretNamespace,
    ) -> Result<ServiceReport> {
        let service = plan.descriptor.name.as_str();
        let dir = self.service_dir(service);
        let mut report = ServiceReport::new(service);

        match &plan.entries {
            Ok(entries) => {
                let (results, stage) =
                    secrets::reconcile_secrets(&self.swarm, service, entries, namespace).await?;
                report.secrets = results;
                report.secrets_stage = stage;
            }
            Err(e) => report.secrets_stage = StageOutcome::failed(e),
        }
        if report.secrets_stage.is_failed() {
            // deploying now could reference a secret that was never written
            let reason = if plan.entries.is_err() {
                "service files unreadable"
            } else {
                "secrets failed"
            };
            report.build = StageOutcome::skipped(reason);
            report.deploy = StageOutcome::skipped(reason);
            return Ok(report);
        }

        report.build = match isolate(self.build_plan(&plan.descriptor).await)? {
            Ok(build_plan) => {
                build::build_service(&self.swarm, service, &dir, build_plan.as_ref()).await?
            }
            Err(e) => {
                warn!(service, error = %e, "cannot resolve build descriptor");
                StageOutcome::failed(&Error::Build {
                    service: service.to_string(),
                    exit_code: -1,
                    output: e.to_string(),
                })
            }
        };
        if report.build.is_failed() {
            report.deploy = StageOutcome::skipped("build failed");
            return Ok(report);
        }

        report.deploy = deploy::deploy_service(
            &self.swarm,
            service,
            &dir,
            plan.descriptor.deploy_file.as_deref(),
        )
        .await?;
        info!(service, state = ?report.state(), "service reconciled");
        Ok(report)
    }

    async fn build_plan(&self, descriptor: &ServiceDescriptor) -> Result<Option<EmbeddedBuild>> {
        if !descriptor.has_build() {
            return Ok(None);
        }
        self.source.resolve_build(descriptor).await
    }

    /// Remove every secret in `service`'s namespace, in use or not
    pub async fn cleanup(&self, service: &str) -> Result<CleanupReport> {
        let all: BTreeSet<String> = discovery::discover(&self.source, &self.filter()).await?;
        if !all.contains(service) {
            warn!(service, "cleaning up a service that is not discovered locally");
        }
        cleanup::cleanup_service(&self.swarm, service, &all).await
    }
}
