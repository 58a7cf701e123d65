//! Data model for the Berth container host mirror.
//!
//! This crate defines what the mirror stores and exchanges: images and inferred
//! intermediate layers (`Image`), containers with their full declarative
//! configuration (`ContainerDetails`) and mirror-owned fields (`Container`),
//! raw engine events and the normalized change notifications republished to
//! consumers, pull progress, stats samples, engine API versions, and image
//! references.

pub mod container;
pub mod display;
pub mod event;
pub mod image;
pub mod progress;
pub mod reference;
pub mod stats;
pub mod types;
pub mod version;

pub use container::{
    Config, Container, ContainerDetails, ContainerState, ContainerSummary, EndpointSettings,
    HostConfig, NetworkSettings, PortBinding, UpdateState,
};
pub use display::{display_order, sort_for_display, DisplayTag};
pub use event::{ChangeEvent, ChangeKind, EngineEvent, EntityKind, EventAction, EventFilter};
pub use image::{Image, ImageHistoryEntry, MISSING_LAYER};
pub use progress::PullProgress;
pub use reference::{ImageReference, Platform, DOCKER_HUB_REGISTRY};
pub use stats::{ContainerStats, CpuStats, CpuUsage, MemoryStats};
pub use types::{ContainerId, ImageId};
pub use version::{ApiVersion, ServerVersion};

use serde::{Deserialize, Deserializer};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SchemaError {
    #[error("invalid image reference: {0}")]
    InvalidReference(String),
    #[error("invalid API version: {0}")]
    InvalidVersion(String),
}

/// Engines send `null` where an empty list or map is meant.
pub(crate) fn nullable<'de, D, T>(deserializer: D) -> Result<T, D::Error>
where
    D: Deserializer<'de>,
    T: Default + Deserialize<'de>,
{
    Ok(Option::<T>::deserialize(deserializer)?.unwrap_or_default())
}
