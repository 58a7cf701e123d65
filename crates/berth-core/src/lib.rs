//! Live mirror of a container host's images and containers.
//!
//! This crate ties the engine gateway and the registry resolver together into
//! the `StateCache`: a snapshot of images (including intermediate layers
//! recovered from history) and containers, kept current by a background event
//! reconciler and a deletion confirmation worker, and announced to consumers
//! as `ChangeEvent` notifications. It also provides the digest-based
//! `UpdateChecker` and the `UpdateOrchestrator`, which pulls a new image and
//! stops, removes, recreates, and restarts a container while streaming a
//! human-readable progress log.

pub mod cache;
pub mod checker;
pub mod config;
pub mod debounce;
mod deletion;
pub mod lifecycle;
pub mod lineage;
pub mod progress;
mod reconcile;
pub mod sanitize;
mod stats;
pub mod updater;

pub use cache::{CacheWorkers, StateCache};
pub use checker::{is_up_to_date, UpdateChecker};
pub use config::MirrorConfig;
pub use debounce::StatsDebouncer;
pub use lifecycle::{validate_transition, UpdateStep};
pub use lineage::build_image_set;
pub use progress::ProgressLog;
pub use sanitize::{sanitize_for_recreate, MAC_ADDRESS_READ_ONLY_SINCE};
pub use updater::{UpdateOrchestrator, UpdateOutcome, UpdateProgress};

use berth_remote::RemoteError;
use berth_runtime::RuntimeError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum CoreError {
    #[error("{kind} not found: {id}")]
    NotFound { kind: &'static str, id: String },
    #[error("initial snapshot failed: {0}")]
    Snapshot(#[source] RuntimeError),
    #[error("runtime error: {0}")]
    Runtime(#[from] RuntimeError),
    #[error("remote error: {0}")]
    Remote(#[from] RemoteError),
    #[error("update check failed: {0}")]
    Check(#[from] CheckError),
    #[error("config error: {0}")]
    Config(String),
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

impl CoreError {
    pub(crate) fn image_not_found(id: &str) -> Self {
        CoreError::NotFound {
            kind: "image",
            id: id.to_owned(),
        }
    }

    pub(crate) fn container_not_found(id: &str) -> Self {
        CoreError::NotFound {
            kind: "container",
            id: id.to_owned(),
        }
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, CoreError::NotFound { .. })
    }
}

/// Why an update invocation stopped.
#[derive(Debug, Error)]
pub enum UpdateError {
    #[error("pull of {reference} failed: {source}")]
    Pull {
        reference: String,
        source: RuntimeError,
    },
    #[error("configuration of {container} unavailable: {source}")]
    ConfigurationUnavailable {
        container: String,
        source: RuntimeError,
    },
    #[error("{step} failed: {source}")]
    Step {
        step: UpdateStep,
        source: RuntimeError,
    },
    #[error("invalid update transition: {from} -> {to}")]
    InvalidTransition { from: UpdateStep, to: UpdateStep },
}

impl UpdateError {
    /// The step the workflow was in when it failed.
    pub fn step(&self) -> UpdateStep {
        match self {
            UpdateError::Pull { .. } | UpdateError::ConfigurationUnavailable { .. } => {
                UpdateStep::Pulling
            }
            UpdateError::Step { step, .. } => *step,
            UpdateError::InvalidTransition { from, .. } => *from,
        }
    }
}

/// Why a remote-version check could not reach a verdict.
#[derive(Debug, Error)]
pub enum CheckError {
    #[error("image {0} has no repository digests to compare")]
    NoLocalDigests(String),
    #[error("local image lookup failed: {0}")]
    Local(#[from] RuntimeError),
    #[error("remote digest lookup failed: {0}")]
    Remote(#[from] RemoteError),
}
