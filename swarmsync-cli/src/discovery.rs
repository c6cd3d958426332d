//! Service discovery
//!
//! A service is an immediate subdirectory of the service root. The directory
//! name is the stack name; which artifacts it carries is decided from its
//! file listing alone.

use crate::config::{DiscoveryMode, LayoutConfig, SwarmConfig};
use crate::credentials::{self, CredentialEntry};
use crate::error::{Error, ReadSourceSnafu, Result, ServiceReadSnafu, isolate, summarize_output};
use crate::remote::{RemoteExecutor, quote};
use serde::Deserialize;
use snafu::ResultExt;
use std::collections::{BTreeMap, BTreeSet};
use std::path::PathBuf;
use std::sync::Arc;
use tracing::{debug, warn};

/// Pure allow/deny predicate over discovered directory names
#[derive(Debug, Clone)]
pub struct ServiceFilter {
    deny: BTreeSet<String>,
    skip_hidden: bool,
    only: Option<String>,
}

impl ServiceFilter {
    pub fn new(layout: &LayoutConfig) -> Self {
        Self {
            deny: layout.reserved.iter().cloned().collect(),
            skip_hidden: layout.skip_hidden,
            only: None,
        }
    }

    /// Restrict to a single service name
    pub fn only(mut self, name: Option<&str>) -> Self {
        self.only = name.map(str::to_string);
        self
    }

    pub fn admits(&self, name: &str) -> bool {
        if name.is_empty() || self.deny.contains(name) {
            return false;
        }
        if self.skip_hidden && name.starts_with('.') {
            return false;
        }
        self.only.as_deref().is_none_or(|only| only == name)
    }
}

/// Where a standalone or embedded build gets its context from
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum BuildSource {
    Dockerfile(String),
    /// Build declared inside the deployment descriptor
    Embedded,
    None,
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ServiceDescriptor {
    pub name: String,
    pub credential_file: Option<String>,
    pub build: BuildSource,
    pub deploy_file: Option<String>,
}

impl ServiceDescriptor {
    /// Decide which artifacts a service has from the names in its directory
    pub fn from_listing(name: &str, files: &BTreeSet<String>, layout: &LayoutConfig) -> Self {
        let credential_file = files
            .contains(&layout.credential_file)
            .then(|| layout.credential_file.clone());
        let deploy_file = layout
            .deploy_files
            .iter()
            .find(|candidate| files.contains(*candidate))
            .cloned();
        let dockerfile = layout
            .build_files
            .iter()
            .find(|candidate| files.contains(*candidate))
            .cloned();
        // Embedded builds are only known after reading the descriptor
        let build = match dockerfile {
            Some(file) => BuildSource::Dockerfile(file),
            None => BuildSource::None,
        };
        Self {
            name: name.to_string(),
            credential_file,
            build,
            deploy_file,
        }
    }

    /// A service whose directory could not be listed
    pub fn unlisted(name: &str) -> Self {
        Self {
            name: name.to_string(),
            credential_file: None,
            build: BuildSource::None,
            deploy_file: None,
        }
    }

    pub fn has_credentials(&self) -> bool {
        self.credential_file.is_some()
    }

    pub fn has_build(&self) -> bool {
        self.build != BuildSource::None
    }
}

/// Build instructions found inside a compose file
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EmbeddedBuild {
    pub context: String,
    pub dockerfile: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ComposeFile {
    #[serde(default)]
    services: BTreeMap<String, ComposeService>,
}

#[derive(Debug, Deserialize)]
struct ComposeService {
    build: Option<ComposeBuild>,
}

#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum ComposeBuild {
    Context(String),
    Detailed {
        #[serde(default)]
        context: Option<String>,
        #[serde(default)]
        dockerfile: Option<String>,
    },
}

/// First `build` section of a compose file, if any
pub fn embedded_build(compose: &str) -> Option<EmbeddedBuild> {
    let parsed: ComposeFile = match serde_yaml::from_str(compose) {
        Ok(parsed) => parsed,
        Err(e) => {
            debug!(error = %e, "deployment descriptor is not parseable compose yaml");
            return None;
        }
    };
    parsed
        .services
        .into_values()
        .find_map(|service| service.build)
        .map(|build| match build {
            ComposeBuild::Context(context) => EmbeddedBuild {
                context,
                dockerfile: None,
            },
            ComposeBuild::Detailed {
                context,
                dockerfile,
            } => EmbeddedBuild {
                context: context.unwrap_or_else(|| ".".to_string()),
                dockerfile,
            },
        })
}

/// Where service directories are enumerated and read from
pub enum ServiceSource {
    Local(PathBuf),
    Remote {
        root: String,
        executor: Arc<dyn RemoteExecutor>,
    },
}

impl ServiceSource {
    pub fn from_config(config: &SwarmConfig, executor: Option<Arc<dyn RemoteExecutor>>) -> Self {
        match (config.layout.discovery, executor) {
            (DiscoveryMode::Remote, Some(executor)) => ServiceSource::Remote {
                root: config.remote_root(),
                executor,
            },
            _ => ServiceSource::Local(config.layout.root.clone()),
        }
    }

    pub fn describe(&self) -> String {
        match self {
            ServiceSource::Local(root) => root.display().to_string(),
            ServiceSource::Remote { root, executor } => format!("{}:{root}", executor.endpoint()),
        }
    }

    pub async fn list_dirs(&self) -> Result<Vec<String>> {
        match self {
            ServiceSource::Local(root) => {
                let unreadable = |e: std::io::Error| {
                    Error::configuration(format!("cannot read service root {}: {e}", root.display()))
                };
                let mut dirs = Vec::new();
                for entry in std::fs::read_dir(root).map_err(unreadable)? {
                    let entry = entry.map_err(unreadable)?;
                    if entry.path().is_dir() {
                        dirs.push(entry.file_name().to_string_lossy().into_owned());
                    }
                }
                Ok(dirs)
            }
            ServiceSource::Remote { root, executor } => {
                let output = executor
                    .execute(&format!(
                        "find {} -mindepth 1 -maxdepth 1 -type d -printf {}",
                        quote(root),
                        quote(r"%f\n")
                    ))
                    .await?;
                if !output.success() {
                    return Err(Error::configuration(format!(
                        "cannot list remote service root {root}: {}",
                        summarize_output(&output.stdout, &output.stderr)
                    )));
                }
                Ok(output.lines().map(str::to_string).collect())
            }
        }
    }

    pub async fn list_files(&self, service: &str) -> Result<BTreeSet<String>> {
        match self {
            ServiceSource::Local(root) => {
                let dir = root.join(service);
                let mut files = BTreeSet::new();
                let entries = std::fs::read_dir(&dir).context(ReadSourceSnafu { path: dir.clone() })?;
                for entry in entries {
                    let entry = entry.context(ReadSourceSnafu { path: dir.clone() })?;
                    files.insert(entry.file_name().to_string_lossy().into_owned());
                }
                Ok(files)
            }
            ServiceSource::Remote { root, executor } => {
                let dir = format!("{root}/{service}");
                let output = executor.execute(&format!("ls -1A {}", quote(&dir))).await?;
                if !output.success() {
                    return ServiceReadSnafu {
                        service,
                        path: dir,
                        message: summarize_output(&output.stdout, &output.stderr),
                    }
                    .fail();
                }
                Ok(output.lines().map(str::to_string).collect())
            }
        }
    }

    pub async fn read_file(&self, service: &str, file: &str) -> Result<String> {
        match self {
            ServiceSource::Local(root) => {
                let path = root.join(service).join(file);
                std::fs::read_to_string(&path).context(ReadSourceSnafu { path })
            }
            ServiceSource::Remote { root, executor } => {
                let path = format!("{root}/{service}/{file}");
                let output = executor.execute(&format!("cat {}", quote(&path))).await?;
                if !output.success() {
                    return ServiceReadSnafu {
                        service,
                        path,
                        message: summarize_output(&output.stdout, &output.stderr),
                    }
                    .fail();
                }
                Ok(output.stdout)
            }
        }
    }

    /// Credential entries of a service; no credential file means no entries
    pub async fn credentials(&self, service: &ServiceDescriptor) -> Result<Vec<CredentialEntry>> {
        match (&service.credential_file, self) {
            (None, _) => Ok(Vec::new()),
            (Some(file), ServiceSource::Local(root)) => {
                credentials::parse(&root.join(&service.name).join(file))
            }
            (Some(file), ServiceSource::Remote { .. }) => {
                let content = self.read_file(&service.name, file).await?;
                Ok(credentials::parse_str(&content))
            }
        }
    }

    /// Resolve the build source, reading the deployment descriptor when needed
    pub async fn resolve_build(&self, service: &ServiceDescriptor) -> Result<Option<EmbeddedBuild>> {
        match (&service.build, &service.deploy_file) {
            (BuildSource::Dockerfile(file), _) => Ok(Some(EmbeddedBuild {
                context: ".".to_string(),
                dockerfile: Some(file.clone()).filter(|f| f != "Dockerfile"),
            })),
            (_, Some(deploy)) => {
                let compose = self.read_file(&service.name, deploy).await?;
                Ok(embedded_build(&compose))
            }
            _ => Ok(None),
        }
    }
}

/// Enumerate services under the source, filtered and sorted
pub async fn discover(source: &ServiceSource, filter: &ServiceFilter) -> Result<BTreeSet<String>> {
    let names: BTreeSet<String> = source
        .list_dirs()
        .await?
        .into_iter()
        .filter(|name| filter.admits(name))
        .collect();
    debug!(source = %source.describe(), count = names.len(), "discovered services");
    Ok(names)
}

/// A discovered service, or why its directory could not be read
#[derive(Debug)]
pub struct DiscoveredService {
    pub name: String,
    pub descriptor: std::result::Result<ServiceDescriptor, Error>,
}

/// Discover and describe every admitted service. An unreadable service is
/// returned with its error; only transport failures abort discovery.
pub async fn describe_all(
    source: &ServiceSource,
    filter: &ServiceFilter,
    layout: &LayoutConfig,
) -> Result<Vec<DiscoveredService>> {
    let mut services = Vec::new();
    for name in discover(source, filter).await? {
        let files = match isolate(source.list_files(&name).await)? {
            Ok(files) => files,
            Err(error) => {
                warn!(service = %name, error = %error, "cannot list service directory");
                services.push(DiscoveredService {
                    name,
                    descriptor: Err(error),
                });
                continue;
            }
        };
        let mut descriptor = ServiceDescriptor::from_listing(&name, &files, layout);
        if descriptor.build == BuildSource::None && descriptor.deploy_file.is_some() {
            match isolate(source.resolve_build(&descriptor).await)? {
                Ok(Some(_)) => descriptor.build = BuildSource::Embedded,
                Ok(None) => {}
                Err(error) => {
                    warn!(service = %name, error = %error, "cannot inspect deployment descriptor");
                }
            }
        }
        services.push(DiscoveredService {
            name,
            descriptor: Ok(descriptor),
        });
    }
    Ok(services)
}
