//! Command-line surface

use crate::commands::Commands;
use crate::config::{DiscoveryMode, Overrides};
use clap::{ArgAction, Parser, ValueEnum};
use std::path::PathBuf;

#[derive(Debug, Parser)]
#[command(name = "swarmsync")]
#[command(author, version, about = "Reconcile service directories against a remote Docker Swarm")]
pub struct Cli {
    /// Config file (default: ./swarmsync.toml, then ~/.config/swarmsync/config.toml)
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// ssh destination of the swarm manager, or `local`
    #[arg(long, env = "SWARMSYNC_HOST", global = true)]
    pub host: Option<String>,

    /// Local directory holding the service directories
    #[arg(long, global = true)]
    pub root: Option<PathBuf>,

    /// Path of the service tree on the manager
    #[arg(long, env = "SWARMSYNC_REMOTE_ROOT", global = true)]
    pub remote_root: Option<String>,

    /// Per-command timeout in seconds
    #[arg(long, global = true)]
    pub timeout: Option<u64>,

    /// Enumerate services locally or on the manager
    #[arg(long, value_enum, global = true)]
    pub discovery: Option<DiscoveryMode>,

    /// Output format
    #[arg(long, value_enum, default_value = "text", global = true)]
    pub format: OutputFormat,

    /// Increase log verbosity (-v info, -vv debug)
    #[arg(short, long, action = ArgAction::Count, global = true)]
    pub verbose: u8,

    /// Action to run (default: deploy)
    #[command(subcommand)]
    pub command: Option<Commands>,
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, ValueEnum)]
pub enum OutputFormat {
    #[default]
    Text,
    Json,
}

impl Cli {
    pub fn overrides(&self) -> Overrides {
        let sync = matches!(&self.command, Some(Commands::Deploy { sync: true, .. }));
        Overrides {
            host: self.host.clone(),
            root: self.root.clone(),
            remote_root: self.remote_root.clone(),
            timeout_secs: self.timeout,
            discovery: self.discovery,
            sync,
        }
    }

    /// The subcommand, with `deploy` standing in when none was given
    pub fn command(&self) -> Commands {
        self.command.clone().unwrap_or(Commands::Deploy {
            service: None,
            sync: false,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_action_is_deploy() {
        let cli = Cli::parse_from(["swarmsync", "--host", "local"]);
        assert!(matches!(cli.command(), Commands::Deploy { service: None, sync: false }));
        assert_eq!(cli.overrides().host.as_deref(), Some("local"));
    }

    #[test]
    fn test_deploy_filter_and_sync() {
        let cli = Cli::parse_from(["swarmsync", "deploy", "api", "--sync", "--timeout", "30"]);
        assert!(matches!(
            cli.command(),
            Commands::Deploy { service: Some(ref s), sync: true } if s == "api"
        ));
        let overrides = cli.overrides();
        assert!(overrides.sync);
        assert_eq!(overrides.timeout_secs, Some(30));
    }

    #[test]
    fn test_cleanup_requires_service() {
        assert!(Cli::try_parse_from(["swarmsync", "cleanup"]).is_err());
        let cli = Cli::parse_from(["swarmsync", "cleanup", "api", "--yes"]);
        assert!(matches!(cli.command(), Commands::Cleanup { yes: true, .. }));
    }

    #[test]
    fn test_global_flags_after_subcommand() {
        let cli = Cli::parse_from(["swarmsync", "list", "--format", "json", "--discovery", "remote", "-vv"]);
        assert_eq!(cli.format, OutputFormat::Json);
        assert_eq!(cli.discovery, Some(DiscoveryMode::Remote));
        assert_eq!(cli.verbose, 2);
    }
}
