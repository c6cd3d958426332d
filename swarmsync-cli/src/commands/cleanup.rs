use super::Outcome;
use crate::cli::OutputFormat;
use crate::config::SwarmConfig;
use crate::reconcile::Reconciler;
use crate::remote;
use anyhow::{Context, Result};

pub async fn handle_cleanup(
    config: &SwarmConfig,
    service: &str,
    confirmed: bool,
    format: OutputFormat,
) -> Result<Outcome> {
    if !confirmed {
        anyhow::bail!(
            "cleanup removes every `{}_*` secret, including secrets running services use; re-run with --yes",
            service.to_lowercase()
        );
    }
    config.validate()?;
    let reconciler = Reconciler::new(config, remote::connect(config));
    let report = reconciler
        .cleanup(service)
        .await
        .with_context(|| format!("cleanup of {service} against {} failed", reconciler.endpoint()))?;

    match format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&report).context("failed to serialize cleanup report")?
        ),
        OutputFormat::Text => {
            println!("🧹 cleanup {} → {}", report.service, reconciler.endpoint());
            if report.removed.is_empty() && report.failed.is_empty() {
                println!("ℹ️  no secrets found");
            }
            for name in &report.removed {
                println!("  🗑️  {name}");
            }
            for (name, reason) in &report.failed {
                println!("  ❌ {name} {reason}");
            }
        }
    }
    Ok(Outcome::from_failures(report.has_failures()))
}
