//! Run report and summary output
//!
//! Results are only ever appended. Two reports from independent runs over
//! disjoint services can be merged without coordination.

use crate::error::{Error, ErrorKind};
use chrono::{DateTime, Utc};
use serde::Serialize;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum Stage {
    Secrets,
    Build,
    Deploy,
}

impl Stage {
    pub const ALL: [Stage; 3] = [Stage::Secrets, Stage::Build, Stage::Deploy];

    pub fn label(self) -> &'static str {
        match self {
            Stage::Secrets => "secrets",
            Stage::Build => "build",
            Stage::Deploy => "deploy",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum StageOutcome {
    Pending,
    Succeeded { detail: String },
    Skipped { reason: String },
    Failed { kind: ErrorKind, error: String },
}

impl StageOutcome {
    pub fn succeeded(detail: impl Into<String>) -> Self {
        StageOutcome::Succeeded {
            detail: detail.into(),
        }
    }

    pub fn skipped(reason: impl Into<String>) -> Self {
        StageOutcome::Skipped {
            reason: reason.into(),
        }
    }

    pub fn failed(error: &Error) -> Self {
        StageOutcome::Failed {
            kind: error.kind(),
            error: error.to_string(),
        }
    }

    pub fn is_failed(&self) -> bool {
        matches!(self, StageOutcome::Failed { .. })
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum SecretOutcome {
    Created,
    /// An existing secret was removed and recreated with the current value
    Replaced,
    SkippedInUse,
    Failed { error: String },
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SecretResult {
    pub key: String,
    pub secret: String,
    pub outcome: SecretOutcome,
}

/// Where a service ended up in its pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum ServiceState {
    Discovered,
    SecretsReconciled,
    Built,
    BuildSkipped,
    Done,
    Failed(Stage),
}

#[derive(Debug, Clone, Serialize)]
pub struct ServiceReport {
    pub service: String,
    pub secrets: Vec<SecretResult>,
    pub secrets_stage: StageOutcome,
    pub build: StageOutcome,
    pub deploy: StageOutcome,
}

impl ServiceReport {
    pub fn new(service: impl Into<String>) -> Self {
        Self {
            service: service.into(),
            secrets: Vec::new(),
            secrets_stage: StageOutcome::Pending,
            build: StageOutcome::Pending,
            deploy: StageOutcome::Pending,
        }
    }

    pub fn stage(&self, stage: Stage) -> &StageOutcome {
        match stage {
            Stage::Secrets => &self.secrets_stage,
            Stage::Build => &self.build,
            Stage::Deploy => &self.deploy,
        }
    }

    pub fn state(&self) -> ServiceState {
        if let Some(stage) = Stage::ALL.into_iter().find(|s| self.stage(*s).is_failed()) {
            return ServiceState::Failed(stage);
        }
        match (&self.secrets_stage, &self.build, &self.deploy) {
            (_, _, StageOutcome::Succeeded { .. } | StageOutcome::Skipped { .. }) => {
                ServiceState::Done
            }
            (_, StageOutcome::Succeeded { .. }, StageOutcome::Pending) => ServiceState::Built,
            (_, StageOutcome::Skipped { .. }, StageOutcome::Pending) => ServiceState::BuildSkipped,
            (StageOutcome::Pending, _, _) => ServiceState::Discovered,
            _ => ServiceState::SecretsReconciled,
        }
    }

    pub fn has_failures(&self) -> bool {
        matches!(self.state(), ServiceState::Failed(_))
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct RunReport {
    pub started_at: DateTime<Utc>,
    pub endpoint: String,
    pub services: Vec<ServiceReport>,
}

impl RunReport {
    pub fn new(endpoint: impl Into<String>) -> Self {
        Self {
            started_at: Utc::now(),
            endpoint: endpoint.into(),
            services: Vec::new(),
        }
    }

    pub fn push(&mut self, service: ServiceReport) {
        self.services.push(service);
    }

    pub fn merge(&mut self, other: RunReport) {
        self.started_at = self.started_at.min(other.started_at);
        self.services.extend(other.services);
    }

    pub fn has_failures(&self) -> bool {
        self.services.iter().any(ServiceReport::has_failures)
    }

    pub fn service(&self, name: &str) -> Option<&ServiceReport> {
        self.services.iter().find(|s| s.service == name)
    }
}

/// Print the per-stage summary for operators
pub fn print_summary(report: &RunReport) {
    println!();
    println!("📋 swarmsync summary ({})", report.endpoint);
    println!("━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━━");
    println!("Started: {}", report.started_at.to_rfc3339());

    if report.services.is_empty() {
        println!();
        println!("ℹ️  No services matched");
        return;
    }

    for stage in Stage::ALL {
        println!();
        println!("{}:", stage.label());
        for service in &report.services {
            match service.stage(stage) {
                StageOutcome::Succeeded { detail } => {
                    println!("  ✅ {} {}", service.service, detail);
                }
                StageOutcome::Skipped { reason } => {
                    println!("  ⏭️  {} ({})", service.service, reason);
                }
                StageOutcome::Failed { error, .. } => {
                    println!("  ❌ {} {}", service.service, error);
                }
                StageOutcome::Pending => {}
            }
        }
    }

    let failed: Vec<_> = report
        .services
        .iter()
        .filter(|s| s.has_failures())
        .map(|s| s.service.as_str())
        .collect();
    println!();
    if failed.is_empty() {
        println!("✅ All {} services reconciled", report.services.len());
    } else {
        println!(
            "⚠️  {} of {} services failed: {}",
            failed.len(),
            report.services.len(),
            failed.join(", ")
        );
    }
}
