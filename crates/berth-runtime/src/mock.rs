use crate::gateway::{EngineGateway, EventSubscription};
use crate::RuntimeError;
use async_trait::async_trait;
use berth_schema::{
    ContainerDetails, ContainerId, ContainerStats, ContainerSummary, EngineEvent, EventFilter,
    Image, ImageHistoryEntry, PullProgress, ServerVersion,
};
use std::collections::{BTreeMap, HashMap};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};

/// Gateway operations, used to script failures and delays.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum MockOp {
    ListContainers,
    InspectContainer,
    CreateContainer,
    StartContainer,
    StopContainer,
    RemoveContainer,
    ListImages,
    InspectImage,
    ImageHistory,
    PullImage,
    RemoveImage,
    SubscribeEvents,
    Stats,
    ServerVersion,
}

#[derive(Default)]
struct MockState {
    containers: BTreeMap<String, ContainerDetails>,
    /// Removed containers that still answer inspect for a number of calls.
    lingering: HashMap<String, (ContainerDetails, u32)>,
    images: Vec<Image>,
    history: HashMap<String, Vec<ImageHistoryEntry>>,
    failures: HashMap<(MockOp, Option<String>), String>,
    delays: HashMap<MockOp, Duration>,
    pull_transcripts: HashMap<String, Vec<PullProgress>>,
    pull_results: HashMap<String, Image>,
    subscribers: Vec<(EventFilter, mpsc::Sender<EngineEvent>)>,
    error_signals: Vec<oneshot::Sender<RuntimeError>>,
    stats_streams: HashMap<String, Vec<mpsc::Sender<ContainerStats>>>,
    stats: HashMap<String, ContainerStats>,
    api_version: String,
    created: Vec<ContainerDetails>,
    calls: Vec<String>,
    next_id: u64,
}

/// In-memory engine for tests and demos.
///
/// State changes made through the helper methods (`add_container`,
/// `drop_container`, ...) do not emit events on their own; call `emit` to
/// deliver whatever event a real engine would send.
pub struct MockEngine {
    state: Mutex<MockState>,
}

impl Default for MockEngine {
    fn default() -> Self {
        Self {
            state: Mutex::new(MockState {
                api_version: "1.45".to_owned(),
                ..MockState::default()
            }),
        }
    }
}

impl MockEngine {
    pub fn new() -> Self {
        Self::default()
    }

    fn state(&self) -> MutexGuard<'_, MockState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    pub fn add_image(&self, image: Image) {
        self.state().images.push(image);
    }

    pub fn drop_image(&self, id: &str) {
        self.state().images.retain(|i| i.id != *id);
    }

    pub fn set_history(&self, image_id: &str, history: Vec<ImageHistoryEntry>) {
        self.state().history.insert(image_id.to_owned(), history);
    }

    pub fn add_container(&self, details: ContainerDetails) {
        self.state()
            .containers
            .insert(details.id.to_string(), details);
    }

    /// Replace a container's configuration, as a rename or restart would.
    pub fn update_container(&self, details: ContainerDetails) {
        self.add_container(details);
    }

    /// The container vanishes from the engine immediately.
    pub fn drop_container(&self, id: &str) {
        let mut state = self.state();
        state.containers.remove(id);
        state.lingering.remove(id);
    }

    /// The container is removed but keeps answering inspect for `inspections`
    /// more calls, like an engine that reports `destroy` before reclaiming.
    pub fn linger_container(&self, id: &str, inspections: u32) {
        let mut state = self.state();
        if let Some(details) = state.containers.remove(id) {
            state.lingering.insert(id.to_owned(), (details, inspections));
        }
    }

    /// Make `op` fail for every target until cleared.
    pub fn fail(&self, op: MockOp, message: &str) {
        self.state().failures.insert((op, None), message.to_owned());
    }

    /// Make `op` fail only when aimed at `target`.
    pub fn fail_for(&self, op: MockOp, target: &str, message: &str) {
        self.state()
            .failures
            .insert((op, Some(target.to_owned())), message.to_owned());
    }

    pub fn clear_failures(&self) {
        self.state().failures.clear();
    }

    pub fn delay(&self, op: MockOp, delay: Duration) {
        self.state().delays.insert(op, delay);
    }

    pub fn set_pull_transcript(&self, reference: &str, messages: Vec<PullProgress>) {
        self.state()
            .pull_transcripts
            .insert(reference.to_owned(), messages);
    }

    /// Image that a pull of `reference` installs (replacing any image that
    /// carried the same tag).
    pub fn set_pull_result(&self, reference: &str, image: Image) {
        self.state()
            .pull_results
            .insert(reference.to_owned(), image);
    }

    pub fn set_api_version(&self, version: &str) {
        self.state().api_version = version.to_owned();
    }

    pub fn set_stats(&self, id: &str, stats: ContainerStats) {
        self.state().stats.insert(id.to_owned(), stats);
    }

    /// Deliver an event to every subscriber whose filter accepts it.
    pub fn emit(&self, event: EngineEvent) {
        let mut state = self.state();
        state.subscribers.retain(|(filter, tx)| {
            if !filter.matches(&event) {
                return !tx.is_closed();
            }
            match tx.try_send(event.clone()) {
                Ok(()) => true,
                Err(mpsc::error::TrySendError::Full(_)) => {
                    tracing::warn!("mock engine: subscriber queue full, event dropped");
                    true
                }
                Err(mpsc::error::TrySendError::Closed(_)) => false,
            }
        });
    }

    /// Break every event subscription with `message`.
    pub fn break_events(&self, message: &str) {
        let mut state = self.state();
        for signal in state.error_signals.drain(..) {
            let _ = signal.send(RuntimeError::StreamClosed(message.to_owned()));
        }
    }

    /// Push a stats sample to every open stream for `id`.
    pub fn push_stats(&self, id: &str, stats: &ContainerStats) {
        let mut state = self.state();
        if let Some(streams) = state.stats_streams.get_mut(id) {
            streams.retain(|tx| tx.try_send(stats.clone()).is_ok() || !tx.is_closed());
        }
    }

    /// Close every stats stream for `id`.
    pub fn end_stats(&self, id: &str) {
        self.state().stats_streams.remove(id);
    }

    /// Configurations submitted to `create_container`, in order.
    pub fn created(&self) -> Vec<ContainerDetails> {
        self.state().created.clone()
    }

    /// Log of mutating calls, e.g. `"stop c1"`.
    pub fn calls(&self) -> Vec<String> {
        self.state().calls.clone()
    }

    pub fn has_container(&self, id: &str) -> bool {
        self.state().containers.contains_key(id)
    }

    fn check(&self, op: MockOp, target: Option<&str>) -> Result<Option<Duration>, RuntimeError> {
        let state = self.state();
        if let Some(target) = target {
            if let Some(msg) = state.failures.get(&(op, Some(target.to_owned()))) {
                return Err(RuntimeError::Engine(msg.clone()));
            }
        }
        if let Some(msg) = state.failures.get(&(op, None)) {
            return Err(RuntimeError::Engine(msg.clone()));
        }
        Ok(state.delays.get(&op).copied())
    }

    /// Apply the scripted failure and delay for `op`. The state lock is released
    /// before sleeping.
    async fn enter(&self, op: MockOp, target: Option<&str>) -> Result<(), RuntimeError> {
        if let Some(delay) = self.check(op, target)? {
            tokio::time::sleep(delay).await;
        }
        Ok(())
    }

    fn record(&self, call: String) {
        self.state().calls.push(call);
    }
}

#[async_trait]
impl EngineGateway for MockEngine {
    fn name(&self) -> &str {
        "mock"
    }

    async fn list_containers(&self) -> Result<Vec<ContainerSummary>, RuntimeError> {
        self.enter(MockOp::ListContainers, None).await?;
        let state = self.state();
        Ok(state
            .containers
            .values()
            .map(|d| ContainerSummary {
                id: d.id.clone(),
                names: vec![d.name.clone()],
                image: d.config.image.clone(),
                state: d.state.status.clone(),
            })
            .collect())
    }

    async fn inspect_container(&self, id: &str) -> Result<ContainerDetails, RuntimeError> {
        self.enter(MockOp::InspectContainer, Some(id)).await?;
        let mut state = self.state();
        if let Some(details) = state.containers.get(id) {
            return Ok(details.clone());
        }
        if let Some((details, remaining)) = state.lingering.get_mut(id) {
            if *remaining > 0 {
                *remaining -= 1;
                return Ok(details.clone());
            }
        }
        Err(RuntimeError::ContainerNotFound(id.to_owned()))
    }

    async fn create_container(
        &self,
        name: &str,
        details: &ContainerDetails,
    ) -> Result<ContainerId, RuntimeError> {
        self.enter(MockOp::CreateContainer, Some(name)).await?;
        let mut state = self.state();
        let wanted = format!("/{}", name.trim_start_matches('/'));
        if state.containers.values().any(|c| c.name == wanted) {
            return Err(RuntimeError::Conflict(format!(
                "container name {wanted} is already in use"
            )));
        }
        state.next_id += 1;
        let id = ContainerId::new(format!("{:064x}", state.next_id));
        let mut created = details.clone();
        created.id = id.clone();
        created.name = wanted;
        created.state.running = false;
        created.state.status = "created".to_owned();
        if let Some(image) = state
            .images
            .iter()
            .find(|i| i.repo_tags.iter().any(|t| *t == created.config.image))
        {
            created.image = image.id.clone();
        }
        state.created.push(details.clone());
        state.calls.push(format!("create {name}"));
        state.containers.insert(id.to_string(), created);
        Ok(id)
    }

    async fn start_container(&self, id: &str) -> Result<(), RuntimeError> {
        self.enter(MockOp::StartContainer, Some(id)).await?;
        let mut state = self.state();
        let container = state
            .containers
            .get_mut(id)
            .ok_or_else(|| RuntimeError::ContainerNotFound(id.to_owned()))?;
        container.state.running = true;
        container.state.status = "running".to_owned();
        state.calls.push(format!("start {id}"));
        Ok(())
    }

    async fn stop_container(&self, id: &str) -> Result<(), RuntimeError> {
        self.enter(MockOp::StopContainer, Some(id)).await?;
        let mut state = self.state();
        let container = state
            .containers
            .get_mut(id)
            .ok_or_else(|| RuntimeError::ContainerNotFound(id.to_owned()))?;
        container.state.running = false;
        container.state.status = "exited".to_owned();
        state.calls.push(format!("stop {id}"));
        Ok(())
    }

    async fn remove_container(&self, id: &str) -> Result<(), RuntimeError> {
        self.enter(MockOp::RemoveContainer, Some(id)).await?;
        let mut state = self.state();
        if state.containers.remove(id).is_none() {
            return Err(RuntimeError::ContainerNotFound(id.to_owned()));
        }
        state.stats_streams.remove(id);
        state.calls.push(format!("remove {id}"));
        Ok(())
    }

    async fn list_images(&self) -> Result<Vec<Image>, RuntimeError> {
        self.enter(MockOp::ListImages, None).await?;
        Ok(self.state().images.clone())
    }

    async fn inspect_image(&self, reference: &str) -> Result<Image, RuntimeError> {
        self.enter(MockOp::InspectImage, Some(reference)).await?;
        let tagged = if reference.contains(':') || reference.contains('@') {
            reference.to_owned()
        } else {
            format!("{reference}:latest")
        };
        self.state()
            .images
            .iter()
            .find(|i| i.id == *reference || i.repo_tags.iter().any(|t| *t == tagged))
            .cloned()
            .ok_or_else(|| RuntimeError::ImageNotFound(reference.to_owned()))
    }

    async fn image_history(&self, id: &str) -> Result<Vec<ImageHistoryEntry>, RuntimeError> {
        self.enter(MockOp::ImageHistory, Some(id)).await?;
        let state = self.state();
        if let Some(history) = state.history.get(id) {
            return Ok(history.clone());
        }
        if state.images.iter().any(|i| i.id == *id) {
            return Ok(Vec::new());
        }
        Err(RuntimeError::ImageNotFound(id.to_owned()))
    }

    async fn pull_image(
        &self,
        reference: &str,
        progress: &mut (dyn FnMut(PullProgress) + Send),
    ) -> Result<(), RuntimeError> {
        self.enter(MockOp::PullImage, Some(reference)).await?;
        let transcript = self
            .state()
            .pull_transcripts
            .get(reference)
            .cloned()
            .unwrap_or_default();
        for message in transcript {
            progress(message);
            tokio::task::yield_now().await;
        }

        let mut state = self.state();
        if let Some(image) = state.pull_results.get(reference).cloned() {
            for existing in &mut state.images {
                existing.repo_tags.retain(|t| !image.repo_tags.contains(t));
            }
            state.images.retain(|i| i.id != image.id);
            state.images.push(image);
        }
        state.calls.push(format!("pull {reference}"));
        Ok(())
    }

    async fn remove_image(&self, id: &str) -> Result<(), RuntimeError> {
        self.enter(MockOp::RemoveImage, Some(id)).await?;
        let mut state = self.state();
        let before = state.images.len();
        state.images.retain(|i| i.id != *id);
        if state.images.len() == before {
            return Err(RuntimeError::ImageNotFound(id.to_owned()));
        }
        state.calls.push(format!("rmi {id}"));
        Ok(())
    }

    async fn subscribe_events(
        &self,
        filter: &EventFilter,
    ) -> Result<EventSubscription, RuntimeError> {
        self.enter(MockOp::SubscribeEvents, None).await?;
        let (tx, events) = mpsc::channel(256);
        let (err_tx, errors) = oneshot::channel();
        let mut state = self.state();
        state.subscribers.push((filter.clone(), tx));
        state.error_signals.push(err_tx);
        Ok(EventSubscription { events, errors })
    }

    async fn stats_once(&self, id: &str) -> Result<ContainerStats, RuntimeError> {
        self.enter(MockOp::Stats, Some(id)).await?;
        let state = self.state();
        if !state.containers.contains_key(id) {
            return Err(RuntimeError::ContainerNotFound(id.to_owned()));
        }
        Ok(state.stats.get(id).cloned().unwrap_or_default())
    }

    async fn stats_stream(
        &self,
        id: &str,
    ) -> Result<mpsc::Receiver<ContainerStats>, RuntimeError> {
        self.enter(MockOp::Stats, Some(id)).await?;
        let mut state = self.state();
        if !state.containers.contains_key(id) {
            return Err(RuntimeError::ContainerNotFound(id.to_owned()));
        }
        let (tx, rx) = mpsc::channel(16);
        state.stats_streams.entry(id.to_owned()).or_default().push(tx);
        Ok(rx)
    }

    async fn server_version(&self) -> Result<ServerVersion, RuntimeError> {
        self.enter(MockOp::ServerVersion, None).await?;
        Ok(ServerVersion {
            version: "mock".to_owned(),
            api_version: self.state().api_version.clone(),
            os: "linux".to_owned(),
            arch: "amd64".to_owned(),
        })
    }
}
