use super::Outcome;
use crate::cli::OutputFormat;
use crate::config::{DiscoveryMode, SwarmConfig};
use crate::discovery::{self, BuildSource, ServiceFilter, ServiceSource};
use crate::remote;
use anyhow::{Context, Result};
use serde::Serialize;

#[derive(Debug, Serialize)]
struct ListEntry {
    service: String,
    /// `None` when the credential file could not be read
    credentials: Option<usize>,
    build: &'static str,
    deploy_file: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

/// List services; local discovery never contacts the manager
pub async fn handle_list(
    config: &SwarmConfig,
    service: Option<&str>,
    format: OutputFormat,
) -> Result<Outcome> {
    let executor = match config.layout.discovery {
        DiscoveryMode::Remote => {
            config.validate()?;
            Some(remote::connect(config))
        }
        DiscoveryMode::Local => None,
    };
    let source = ServiceSource::from_config(config, executor);
    let filter = ServiceFilter::new(&config.layout).only(service);

    let mut entries = Vec::new();
    for discovered in discovery::describe_all(&source, &filter, &config.layout).await? {
        let descriptor = match discovered.descriptor {
            Ok(descriptor) => descriptor,
            Err(e) => {
                entries.push(ListEntry {
                    service: discovered.name,
                    credentials: None,
                    build: "unknown",
                    deploy_file: None,
                    error: Some(e.to_string()),
                });
                continue;
            }
        };
        let credentials = source.credentials(&descriptor).await.ok().map(|e| e.len());
        entries.push(ListEntry {
            build: match descriptor.build {
                BuildSource::Dockerfile(_) => "dockerfile",
                BuildSource::Embedded => "compose",
                BuildSource::None => "none",
            },
            service: descriptor.name,
            credentials,
            deploy_file: descriptor.deploy_file,
            error: None,
        });
    }

    if let Some(name) = service {
        if entries.is_empty() {
            anyhow::bail!("unknown service `{name}` under {}", source.describe());
        }
    }

    match format {
        OutputFormat::Json => println!(
            "{}",
            serde_json::to_string_pretty(&entries).context("failed to serialize listing")?
        ),
        OutputFormat::Text => print_listing(&source, &entries),
    }
    Ok(Outcome::from_failures(entries.iter().any(|e| e.error.is_some())))
}

fn print_listing(source: &ServiceSource, entries: &[ListEntry]) {
    println!("📦 services under {}", source.describe());
    if entries.is_empty() {
        println!("ℹ️  none found");
        return;
    }
    for entry in entries {
        if let Some(error) = &entry.error {
            println!("  ❌ {:<22} {error}", entry.service);
            continue;
        }
        let credentials = match entry.credentials {
            Some(count) => format!("{count} credentials"),
            None => "credentials unreadable".to_string(),
        };
        println!(
            "  {:<24} {:<22} build: {:<10} deploy: {}",
            entry.service,
            credentials,
            entry.build,
            entry.deploy_file.as_deref().unwrap_or("-")
        );
    }
}
