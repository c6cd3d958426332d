//! Destructive removal of every secret namespaced to one service
//!
//! Unlike reconciliation this ignores in-use protection. Services that still
//! reference a removed secret will fail on their next task restart.

use super::namespace::SecretNamespace;
use crate::error::{Result, summarize_output};
use crate::swarm::{SecretRemoval, SwarmClient};
use serde::Serialize;
use std::collections::BTreeSet;
use tracing::warn;

#[derive(Debug, Clone, Default, Serialize)]
pub struct CleanupReport {
    pub service: String,
    pub removed: Vec<String>,
    pub failed: Vec<(String, String)>,
}

impl CleanupReport {
    pub fn has_failures(&self) -> bool {
        !self.failed.is_empty()
    }
}

pub async fn cleanup_service(
    swarm: &SwarmClient,
    service: &str,
    all_services: &BTreeSet<String>,
) -> Result<CleanupReport> {
    let existing = swarm.secret_names().await?;
    let targets = SecretNamespace::owned_by(service, &existing, all_services);

    let mut report = CleanupReport {
        service: service.to_string(),
        ..CleanupReport::default()
    };
    for name in targets {
        match swarm.remove_secret(&name).await? {
            SecretRemoval::Removed | SecretRemoval::AlreadyAbsent => report.removed.push(name),
            SecretRemoval::Failed(output) => {
                let reason = summarize_output(&output.stdout, &output.stderr);
                warn!(service, secret = %name, reason = %reason, "secret removal failed");
                report.failed.push((name, reason));
            }
        }
    }
    Ok(report)
}
