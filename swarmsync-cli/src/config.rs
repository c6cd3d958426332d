//! Configuration for a reconciliation run
//!
//! Reads swarmsync.toml and layers CLI/env overrides on top. The resulting
//! `SwarmConfig` is handed to each component explicitly.

use crate::error::{ConfigParseSnafu, ConfigReadSnafu, Error, Result};
use serde::{Deserialize, Serialize};
use snafu::ResultExt;
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Endpoint name that runs commands through a local shell instead of ssh
pub const LOCAL_ENDPOINT: &str = "local";

const CONFIG_FILE_NAME: &str = "swarmsync.toml";

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
#[serde(default)]
pub struct SwarmConfig {
    pub remote: RemoteConfig,
    pub layout: LayoutConfig,
    pub repository: RepositoryConfig,
    pub swarm: SwarmSection,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RemoteConfig {
    /// ssh destination (`user@host`) or `local`
    pub host: String,
    pub port: Option<u16>,
    pub identity_file: Option<String>,
    /// Extra `-o` options passed to ssh
    pub ssh_options: Vec<String>,
    pub timeout_secs: u64,
    pub build_timeout_secs: u64,
}

impl Default for RemoteConfig {
    fn default() -> Self {
        Self {
            host: String::new(),
            port: None,
            identity_file: None,
            ssh_options: Vec::new(),
            timeout_secs: 120,
            build_timeout_secs: 1800,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Deserialize, Serialize, clap::ValueEnum)]
#[serde(rename_all = "lowercase")]
pub enum DiscoveryMode {
    #[default]
    Local,
    Remote,
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct LayoutConfig {
    /// Local directory holding one subdirectory per service
    pub root: PathBuf,
    /// Path of the same tree on the remote host
    pub remote_root: Option<String>,
    pub discovery: DiscoveryMode,
    pub credential_file: String,
    pub build_files: Vec<String>,
    pub deploy_files: Vec<String>,
    pub reserved: Vec<String>,
    pub skip_hidden: bool,
}

impl Default for LayoutConfig {
    fn default() -> Self {
        Self {
            root: PathBuf::from("."),
            remote_root: None,
            discovery: DiscoveryMode::Local,
            credential_file: ".env".to_string(),
            build_files: vec!["Dockerfile".to_string()],
            deploy_files: vec![
                "docker-compose.yml".to_string(),
                "docker-compose.yaml".to_string(),
                "compose.yml".to_string(),
                "compose.yaml".to_string(),
            ],
            reserved: vec!["scripts".to_string(), "docs".to_string(), ".git".to_string()],
            skip_hidden: true,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RepositoryConfig {
    pub url: Option<String>,
    pub branch: String,
    pub sync: bool,
}

impl Default for RepositoryConfig {
    fn default() -> Self {
        Self {
            url: None,
            branch: "main".to_string(),
            sync: false,
        }
    }
}

#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct SwarmSection {
    /// Docker binary on the remote host
    pub docker: String,
    /// Run `docker swarm init` when the node is not part of a swarm yet
    pub init: bool,
    pub advertise_addr: Option<String>,
}

impl Default for SwarmSection {
    fn default() -> Self {
        Self {
            docker: "docker".to_string(),
            init: true,
            advertise_addr: None,
        }
    }
}

/// Values coming from the command line; `None` leaves the file value alone
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub host: Option<String>,
    pub root: Option<PathBuf>,
    pub remote_root: Option<String>,
    pub timeout_secs: Option<u64>,
    pub discovery: Option<DiscoveryMode>,
    pub sync: bool,
}

impl SwarmConfig {
    /// Load configuration following the lookup order, then apply overrides
    pub fn load(explicit: Option<&Path>, overrides: &Overrides) -> Result<Self> {
        let mut config = match locate_config(explicit)? {
            Some(path) => Self::from_file(&path)?,
            None => Self::default(),
        };
        config.apply(overrides);
        Ok(config)
    }

    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path).context(ConfigReadSnafu { path })?;
        Self::from_toml(&content, path)
    }

    fn from_toml(content: &str, path: &Path) -> Result<Self> {
        toml::from_str(content).context(ConfigParseSnafu { path })
    }

    pub fn apply(&mut self, overrides: &Overrides) {
        if let Some(host) = &overrides.host {
            self.remote.host = host.clone();
        }
        if let Some(root) = &overrides.root {
            self.layout.root = root.clone();
        }
        if let Some(remote_root) = &overrides.remote_root {
            self.layout.remote_root = Some(remote_root.clone());
        }
        if let Some(timeout) = overrides.timeout_secs {
            self.remote.timeout_secs = timeout;
        }
        if let Some(discovery) = overrides.discovery {
            self.layout.discovery = discovery;
        }
        if overrides.sync {
            self.repository.sync = true;
        }
        self.layout.root = expand_path(&self.layout.root.to_string_lossy());
        if let Some(identity) = &self.remote.identity_file {
            self.remote.identity_file = Some(expand_path(identity).to_string_lossy().into_owned());
        }
    }

    /// Check everything a remote run needs; called before any command is sent
    pub fn validate(&self) -> Result<()> {
        if self.remote.host.trim().is_empty() {
            return Err(Error::configuration(
                "no remote host configured (set remote.host, --host or SWARMSYNC_HOST)",
            ));
        }
        if !self.is_local() && self.layout.remote_root.is_none() {
            return Err(Error::configuration(
                "layout.remote_root is required when the host is not `local`",
            ));
        }
        if self.remote.timeout_secs == 0 || self.remote.build_timeout_secs == 0 {
            return Err(Error::configuration("timeouts must be greater than zero"));
        }
        if self.layout.deploy_files.is_empty() {
            return Err(Error::configuration(
                "layout.deploy_files must name at least one descriptor",
            ));
        }
        if self.repository.sync && self.repository.url.is_none() {
            return Err(Error::configuration(
                "repository.url is required when source sync is enabled",
            ));
        }
        Ok(())
    }

    pub fn is_local(&self) -> bool {
        self.remote.host == LOCAL_ENDPOINT
    }

    /// Directory that holds the service tree from the executor's point of view
    pub fn remote_root(&self) -> String {
        match &self.layout.remote_root {
            Some(root) => root.trim_end_matches('/').to_string(),
            None => self.layout.root.to_string_lossy().trim_end_matches('/').to_string(),
        }
    }

    pub fn command_timeout(&self) -> Duration {
        Duration::from_secs(self.remote.timeout_secs)
    }

    pub fn build_timeout(&self) -> Duration {
        Duration::from_secs(self.remote.build_timeout_secs)
    }
}

fn locate_config(explicit: Option<&Path>) -> Result<Option<PathBuf>> {
    if let Some(path) = explicit {
        let path = expand_path(&path.to_string_lossy());
        if !path.exists() {
            return Err(Error::configuration(format!(
                "config file not found: {}",
                path.display()
            )));
        }
        return Ok(Some(path));
    }

    let candidates = [
        Some(PathBuf::from(CONFIG_FILE_NAME)),
        dirs::config_dir().map(|dir| dir.join("swarmsync").join("config.toml")),
    ];
    Ok(candidates.into_iter().flatten().find(|path| path.is_file()))
}

/// Expand a leading `~` and environment variables
fn expand_path(path: &str) -> PathBuf {
    match shellexpand::full(path) {
        Ok(expanded) => PathBuf::from(expanded.as_ref()),
        Err(_) => PathBuf::from(shellexpand::tilde(path).as_ref()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = SwarmConfig::default();
        assert_eq!(config.layout.credential_file, ".env");
        assert_eq!(config.layout.reserved, vec!["scripts", "docs", ".git"]);
        assert_eq!(config.remote.timeout_secs, 120);
        assert!(config.swarm.init);
    }

    #[test]
    fn test_parse_partial_toml() {
        let toml = r#"
            [remote]
            host = "deploy@manager"
            port = 2222

            [layout]
            remote_root = "/srv/stacks/"
            discovery = "remote"
        "#;
        let config = SwarmConfig::from_toml(toml, Path::new("swarmsync.toml")).unwrap();
        assert_eq!(config.remote.host, "deploy@manager");
        assert_eq!(config.remote.port, Some(2222));
        assert_eq!(config.remote.build_timeout_secs, 1800);
        assert_eq!(config.layout.discovery, DiscoveryMode::Remote);
        assert_eq!(config.remote_root(), "/srv/stacks");
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_parse_error_is_configuration() {
        let err = SwarmConfig::from_toml("[remote\nhost=", Path::new("bad.toml")).unwrap_err();
        assert!(err.is_fatal());
        assert_eq!(err.kind(), crate::error::ErrorKind::Configuration);
    }

    #[test]
    fn test_validate_requires_host() {
        let config = SwarmConfig::default();
        let err = config.validate().unwrap_err();
        assert!(err.to_string().contains("no remote host"));
    }

    #[test]
    fn test_validate_requires_remote_root_for_ssh() {
        let mut config = SwarmConfig::default();
        config.remote.host = "deploy@manager".into();
        assert!(config.validate().is_err());

        config.remote.host = LOCAL_ENDPOINT.into();
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_overrides_win() {
        let mut config = SwarmConfig::default();
        config.remote.host = "file-host".into();
        config.apply(&Overrides {
            host: Some("cli-host".into()),
            remote_root: Some("/opt/stacks".into()),
            timeout_secs: Some(7),
            sync: true,
            ..Overrides::default()
        });
        assert_eq!(config.remote.host, "cli-host");
        assert_eq!(config.remote_root(), "/opt/stacks");
        assert_eq!(config.command_timeout(), Duration::from_secs(7));
        assert!(config.repository.sync);
    }

    #[test]
    fn test_explicit_missing_config_fails() {
        let err = SwarmConfig::load(
            Some(Path::new("/definitely/not/here.toml")),
            &Overrides::default(),
        )
        .unwrap_err();
        assert!(err.to_string().contains("config file not found"));
    }

    #[test]
    fn test_expand_path_non_tilde() {
        assert_eq!(expand_path("/tmp/stacks"), PathBuf::from("/tmp/stacks"));
    }
}
