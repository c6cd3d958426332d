use super::Outcome;
use crate::cli::OutputFormat;
use crate::config::SwarmConfig;
use crate::reconcile::Reconciler;
use crate::remote;
use crate::report::print_summary;
use anyhow::{Context, Result};
use tracing::info;

pub async fn handle_deploy(
    config: &SwarmConfig,
    service: Option<&str>,
    format: OutputFormat,
) -> Result<Outcome> {
    config.validate()?;
    let executor = remote::connect(config);
    let reconciler = Reconciler::new(config, executor);

    reconciler.check_filter(service).await?;
    if format == OutputFormat::Text {
        println!("🐳 swarmsync deploy → {}", reconciler.endpoint());
    }
    reconciler
        .preflight()
        .await
        .with_context(|| format!("preflight against {} failed", reconciler.endpoint()))?;

    let report = reconciler.run(service).await?;
    info!(services = report.services.len(), "reconciliation finished");

    match format {
        OutputFormat::Text => print_summary(&report),
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&report).context("failed to serialize report")?
        ),
    }
    Ok(Outcome::from_failures(report.has_failures()))
}
