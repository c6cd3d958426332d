//! Subcommands and their handlers

pub mod cleanup;
pub mod deploy;
pub mod list;

use clap::Subcommand;

#[derive(Debug, Clone, Subcommand)]
pub enum Commands {
    /// Reconcile secrets, build images and deploy stacks (default)
    Deploy {
        /// Only reconcile this service
        service: Option<String>,

        /// Fetch the configured repository on the manager before deploying
        #[arg(long)]
        sync: bool,
    },

    /// Show discovered services and what each one provides
    List {
        /// Only show this service
        service: Option<String>,
    },

    /// Remove every secret namespaced to a service, including secrets in use
    Cleanup {
        service: String,

        /// Confirm removal of secrets that running services may reference
        #[arg(long)]
        yes: bool,
    },
}

/// How a completed command ended; fatal errors are returned as `Err` instead
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Outcome {
    Clean,
    Failures,
}

impl Outcome {
    pub fn from_failures(has_failures: bool) -> Self {
        if has_failures {
            Outcome::Failures
        } else {
            Outcome::Clean
        }
    }

    pub fn exit_code(self) -> i32 {
        match self {
            Outcome::Clean => 0,
            Outcome::Failures => 1,
        }
    }
}

/// Exit status for errors that stopped the run
pub const FATAL_EXIT_CODE: i32 = 2;
