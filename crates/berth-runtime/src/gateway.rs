use crate::RuntimeError;
use async_trait::async_trait;
use berth_schema::{
    ContainerDetails, ContainerId, ContainerStats, ContainerSummary, EngineEvent, EventFilter,
    Image, ImageHistoryEntry, PullProgress, ServerVersion,
};
use tokio::sync::{mpsc, oneshot};

/// A live event subscription: the message stream plus a one-shot error signal
/// that fires when the engine connection breaks.
pub struct EventSubscription {
    pub events: mpsc::Receiver<EngineEvent>,
    pub errors: oneshot::Receiver<RuntimeError>,
}

/// Everything the mirror needs from a container engine.
///
/// Implementations map their native payloads into the schema types at this
/// boundary; nothing above this trait sees transport-specific data.
#[async_trait]
pub trait EngineGateway: Send + Sync {
    fn name(&self) -> &str;

    /// All containers, running or not.
    async fn list_containers(&self) -> Result<Vec<ContainerSummary>, RuntimeError>;

    async fn inspect_container(&self, id: &str) -> Result<ContainerDetails, RuntimeError>;

    /// Create a container named `name` from a captured configuration and
    /// return the new id. The container is not started.
    async fn create_container(
        &self,
        name: &str,
        details: &ContainerDetails,
    ) -> Result<ContainerId, RuntimeError>;

    async fn start_container(&self, id: &str) -> Result<(), RuntimeError>;

    async fn stop_container(&self, id: &str) -> Result<(), RuntimeError>;

    async fn remove_container(&self, id: &str) -> Result<(), RuntimeError>;

    /// Top-level images (intermediate layers are not listed).
    async fn list_images(&self) -> Result<Vec<Image>, RuntimeError>;

    /// Look up an image by id or reference.
    async fn inspect_image(&self, reference: &str) -> Result<Image, RuntimeError>;

    async fn image_history(&self, id: &str) -> Result<Vec<ImageHistoryEntry>, RuntimeError>;

    /// Pull `reference`, reporting each progress message as it arrives.
    async fn pull_image(
        &self,
        reference: &str,
        progress: &mut (dyn FnMut(PullProgress) + Send),
    ) -> Result<(), RuntimeError>;

    /// Remove an image, pruning untagged parents, without forcing.
    async fn remove_image(&self, id: &str) -> Result<(), RuntimeError>;

    async fn subscribe_events(&self, filter: &EventFilter)
        -> Result<EventSubscription, RuntimeError>;

    async fn stats_once(&self, id: &str) -> Result<ContainerStats, RuntimeError>;

    /// Continuous stats samples; the stream ends when the container goes away.
    async fn stats_stream(&self, id: &str)
        -> Result<mpsc::Receiver<ContainerStats>, RuntimeError>;

    async fn server_version(&self) -> Result<ServerVersion, RuntimeError>;
}
