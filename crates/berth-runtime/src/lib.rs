//! Engine gateway for the Berth container host mirror.
//!
//! This crate defines the capability surface the mirror consumes from a
//! container engine (`EngineGateway`): listing, inspecting, creating, starting,
//! stopping and removing containers; listing, inspecting, pulling and removing
//! images; image history; stats; the event stream with its error signal; and
//! the server version. `MockEngine` implements it in memory for tests.

pub mod gateway;
pub mod mock;

pub use gateway::{EngineGateway, EventSubscription};
pub use mock::{MockEngine, MockOp};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("engine I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("engine '{0}' is not available")]
    BackendUnavailable(String),
    #[error("container not found: {0}")]
    ContainerNotFound(String),
    #[error("image not found: {0}")]
    ImageNotFound(String),
    #[error("conflict: {0}")]
    Conflict(String),
    #[error("engine request failed: {0}")]
    Engine(String),
    #[error("event stream closed: {0}")]
    StreamClosed(String),
    #[error("malformed engine payload: {0}")]
    Serialization(#[from] serde_json::Error),
}

impl RuntimeError {
    /// True when the engine positively reported the target as absent.
    pub fn is_not_found(&self) -> bool {
        matches!(
            self,
            RuntimeError::ContainerNotFound(_) | RuntimeError::ImageNotFound(_)
        )
    }
}
