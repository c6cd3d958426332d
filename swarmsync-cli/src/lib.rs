//! # swarmsync
//!
//! Reconciles a tree of service directories against a Docker Swarm manager
//! that is only reachable through command execution (ssh, or a local shell).
//!
//! Each service directory may hold:
//! - a credential file (`.env`) whose entries become swarm secrets named
//!   `<service>_<key>`
//! - a build descriptor (`Dockerfile`, or a `build:` section in the compose file)
//! - a deployment descriptor (`docker-compose.yml` and friends)
//!
//! Per service the pipeline is secrets → build → deploy. Secrets referenced by
//! a running service are never removed, and runs are safe to repeat.

pub mod cli;
pub mod commands;
pub mod config;
pub mod credentials;
pub mod discovery;
pub mod error;
pub mod reconcile;
pub mod remote;
pub mod report;
pub mod swarm;

pub use config::SwarmConfig;
pub use error::{Error, ErrorKind, Result};
pub use reconcile::Reconciler;
pub use remote::{CommandOutput, RemoteCommand, RemoteExecutor};
pub use report::RunReport;
