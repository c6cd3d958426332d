//! Secret reconciliation for one service
//!
//! Orchestrator secrets are immutable, so a changed value means delete then
//! create. A secret referenced by a running service is never touched.

use super::namespace::{SecretNamespace, secret_name};
use crate::credentials::CredentialEntry;
use crate::error::{Error, Result, isolate, summarize_output};
use crate::report::{SecretOutcome, SecretResult, StageOutcome};
use crate::swarm::{SecretRemoval, SwarmClient};
use tracing::{info, warn};

/// Reconcile every entry; a failure on one entry never stops the others.
/// Only transport failures are returned as `Err`.
pub async fn reconcile_secrets(
    swarm: &SwarmClient,
    service: &str,
    entries: &[CredentialEntry],
    namespace: &SecretNamespace,
) -> Result<(Vec<SecretResult>, StageOutcome)> {
    let mut results = Vec::with_capacity(entries.len());
    for entry in entries {
        let (secret, outcome) = match namespace.resolve(service, &entry.key) {
            Ok(name) => {
                let outcome = reconcile_one(swarm, &name, entry).await?;
                (name, outcome)
            }
            Err(reason) => (
                secret_name(service, &entry.key),
                SecretOutcome::Failed { error: reason },
            ),
        };
        match &outcome {
            SecretOutcome::Failed { error } => {
                warn!(service, secret = %secret, error = %error, "secret not reconciled");
            }
            other => info!(service, secret = %secret, outcome = ?other, "secret reconciled"),
        }
        results.push(SecretResult {
            key: entry.key.clone(),
            secret,
            outcome,
        });
    }

    let stage = stage_outcome(service, &results);
    Ok((results, stage))
}

async fn reconcile_one(
    swarm: &SwarmClient,
    name: &str,
    entry: &CredentialEntry,
) -> Result<SecretOutcome> {
    // re-queried for every secret, a previous step may have changed the answer
    match isolate(swarm.is_secret_in_use(name).await)? {
        Ok(true) => return Ok(SecretOutcome::SkippedInUse),
        Ok(false) => {}
        Err(e) => return Ok(failed(format!("in-use check failed: {e}"))),
    }

    let existed = match isolate(swarm.secret_exists(name).await)? {
        Ok(existed) => existed,
        Err(e) => return Ok(failed(format!("existence check failed: {e}"))),
    };

    if existed {
        match swarm.remove_secret(name).await? {
            SecretRemoval::Removed | SecretRemoval::AlreadyAbsent => {}
            SecretRemoval::Failed(output) => {
                return Ok(failed(format!(
                    "remove failed (exit {}): {}",
                    output.exit_code,
                    summarize_output(&output.stdout, &output.stderr)
                )));
            }
        }
    }

    let output = swarm.create_secret(name, entry.value.as_bytes()).await?;
    if !output.success() {
        return Ok(failed(format!(
            "create failed (exit {}): {}",
            output.exit_code,
            summarize_output(&output.stdout, &output.stderr)
        )));
    }

    Ok(if existed {
        SecretOutcome::Replaced
    } else {
        SecretOutcome::Created
    })
}

fn failed(error: String) -> SecretOutcome {
    SecretOutcome::Failed { error }
}

fn stage_outcome(service: &str, results: &[SecretResult]) -> StageOutcome {
    if results.is_empty() {
        return StageOutcome::skipped("no credentials");
    }

    let failures: Vec<&SecretResult> = results
        .iter()
        .filter(|r| matches!(r.outcome, SecretOutcome::Failed { .. }))
        .collect();
    if !failures.is_empty() {
        let names: Vec<&str> = failures.iter().map(|r| r.secret.as_str()).collect();
        let error = Error::SecretOperation {
            service: service.to_string(),
            secret: names.join(", "),
            message: format!("{} of {} secrets failed", failures.len(), results.len()),
        };
        return StageOutcome::failed(&error);
    }

    let in_use = results
        .iter()
        .filter(|r| r.outcome == SecretOutcome::SkippedInUse)
        .count();
    let created = results.len() - in_use;
    StageOutcome::succeeded(format!("{created} written, {in_use} kept (in use)"))
}
