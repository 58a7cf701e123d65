use crate::checker::UpdateChecker;
use crate::config::MirrorConfig;
use crate::lineage::build_image_set;
use crate::{deletion, reconcile, stats, CoreError};
use berth_runtime::EngineGateway;
use berth_schema::{
    sort_for_display, ChangeEvent, ChangeKind, Container, ContainerDetails, ContainerId,
    ContainerStats, Image, ImageId, UpdateState,
};
use parking_lot::RwLock;
use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;

/// Images and containers, guarded together so joint reads are consistent.
#[derive(Default)]
struct Mirror {
    images: HashMap<ImageId, Image>,
    containers: HashMap<ContainerId, Container>,
}

struct Shared {
    gateway: Arc<dyn EngineGateway>,
    config: MirrorConfig,
    checker: Option<UpdateChecker>,
    mirror: RwLock<Mirror>,
    notify: mpsc::Sender<ChangeEvent>,
    started: AtomicBool,
}

/// Handles of the background tasks started by `load_and_start`.
///
/// The reconciler ends when the engine's event stream reports an error; the
/// deletion worker ends once the reconciler is gone and its queue drains.
pub struct CacheWorkers {
    pub reconciler: JoinHandle<()>,
    pub deletion: JoinHandle<()>,
}

/// In-memory mirror of the engine's images and containers.
///
/// Cloning is cheap and every clone shares the same state. Reads return owned
/// copies; the lock is never held across an engine call.
#[derive(Clone)]
pub struct StateCache {
    shared: Arc<Shared>,
}

impl StateCache {
    /// Create an empty cache and the receiving end of its change notifications.
    pub fn new(
        gateway: Arc<dyn EngineGateway>,
        config: MirrorConfig,
    ) -> (Self, mpsc::Receiver<ChangeEvent>) {
        Self::build(gateway, config, None)
    }

    /// Like `new`, with remote-version checks for discovered containers.
    pub fn with_checker(
        gateway: Arc<dyn EngineGateway>,
        config: MirrorConfig,
        checker: UpdateChecker,
    ) -> (Self, mpsc::Receiver<ChangeEvent>) {
        Self::build(gateway, config, Some(checker))
    }

    fn build(
        gateway: Arc<dyn EngineGateway>,
        config: MirrorConfig,
        checker: Option<UpdateChecker>,
    ) -> (Self, mpsc::Receiver<ChangeEvent>) {
        let (notify, events) = mpsc::channel(config.event_queue_capacity.max(1));
        let cache = Self {
            shared: Arc::new(Shared {
                gateway,
                config,
                checker,
                mirror: RwLock::new(Mirror::default()),
                notify,
                started: AtomicBool::new(false),
            }),
        };
        (cache, events)
    }

    pub fn config(&self) -> &MirrorConfig {
        &self.shared.config
    }

    pub(crate) fn gateway(&self) -> &Arc<dyn EngineGateway> {
        &self.shared.gateway
    }

    /// Snapshot images then containers, announce each, and start the event
    /// reconciler and the deletion confirmation worker.
    ///
    /// The event subscription is opened before the snapshot so changes that
    /// race it are queued and reconciled afterwards. Nothing is stored or
    /// announced unless both snapshots succeed; after a failure the call may
    /// be retried.
    pub async fn load_and_start(&self) -> Result<CacheWorkers, CoreError> {
        if self.shared.started.swap(true, Ordering::SeqCst) {
            return Err(CoreError::Config("cache already started".to_owned()));
        }
        let result = self.load().await;
        if let Err(e) = &result {
            tracing::warn!("initial snapshot failed: {e}");
            self.shared.started.store(false, Ordering::SeqCst);
        }
        result
    }

    async fn load(&self) -> Result<CacheWorkers, CoreError> {
        let gateway = Arc::clone(self.gateway());
        tracing::info!("loading state from {} engine", gateway.name());

        let subscription = gateway
            .subscribe_events(&self.shared.config.event_filter)
            .await
            .map_err(CoreError::Snapshot)?;

        let images = build_image_set(gateway.as_ref())
            .await
            .map_err(CoreError::Snapshot)?;
        let containers = self.snapshot_containers().await?;
        let image_count = images.len();
        let ids: Vec<ContainerId> = containers.keys().cloned().collect();

        self.shared.mirror.write().images = images;
        self.publish(ChangeEvent::loaded(ChangeKind::ImagesLoaded))
            .await;
        self.shared.mirror.write().containers = containers;
        self.publish(ChangeEvent::loaded(ChangeKind::ContainersLoaded))
            .await;
        tracing::info!(
            "snapshot loaded: {image_count} images, {} containers",
            ids.len()
        );

        let (deletions, candidates) =
            mpsc::channel(self.shared.config.deletion_queue_capacity.max(1));
        let deletion = tokio::spawn(deletion::run(self.clone(), candidates));
        let reconciler = tokio::spawn(reconcile::run(self.clone(), subscription, deletions));

        for id in ids {
            self.spawn_watchers(id);
        }

        Ok(CacheWorkers {
            reconciler,
            deletion,
        })
    }

    async fn snapshot_containers(&self) -> Result<HashMap<ContainerId, Container>, CoreError> {
        let gateway = self.gateway();
        let listed = gateway
            .list_containers()
            .await
            .map_err(CoreError::Snapshot)?;

        let mut containers = HashMap::with_capacity(listed.len());
        for summary in listed {
            match gateway.inspect_container(&summary.id).await {
                Ok(details) => {
                    containers.insert(details.id.clone(), Container::new(details));
                }
                // Removed between listing and inspection.
                Err(e) if e.is_not_found() => {
                    tracing::debug!("container {} vanished during snapshot", summary.id.short());
                }
                Err(e) => return Err(CoreError::Snapshot(e)),
            }
        }
        Ok(containers)
    }

    /// All images, tagged first, then by display tag.
    pub fn images(&self) -> Vec<Image> {
        let mut images: Vec<Image> = self.shared.mirror.read().images.values().cloned().collect();
        sort_for_display(&mut images);
        images
    }

    /// All containers, named first, then by display tag.
    pub fn containers(&self) -> Vec<Container> {
        let mut containers: Vec<Container> = self
            .shared
            .mirror
            .read()
            .containers
            .values()
            .cloned()
            .collect();
        sort_for_display(&mut containers);
        containers
    }

    pub fn image(&self, id: &str) -> Result<Image, CoreError> {
        self.shared
            .mirror
            .read()
            .images
            .get(id)
            .cloned()
            .ok_or_else(|| CoreError::image_not_found(id))
    }

    pub fn container(&self, id: &str) -> Result<Container, CoreError> {
        self.shared
            .mirror
            .read()
            .containers
            .get(id)
            .cloned()
            .ok_or_else(|| CoreError::container_not_found(id))
    }

    /// Images no current container was created from.
    pub fn images_unused(&self) -> Vec<Image> {
        let mut unused: Vec<Image> = {
            let mirror = self.shared.mirror.read();
            let used: HashSet<&ImageId> =
                mirror.containers.values().map(Container::image_id).collect();
            mirror
                .images
                .values()
                .filter(|i| !used.contains(&i.id))
                .cloned()
                .collect()
        };
        sort_for_display(&mut unused);
        unused
    }

    /// Record an update verdict. Returns `true` if the stored state changed.
    pub fn set_update_state(&self, id: &str, state: UpdateState) -> bool {
        let mut mirror = self.shared.mirror.write();
        match mirror.containers.get_mut(id) {
            Some(container) if container.update != state => {
                container.update = state;
                true
            }
            _ => false,
        }
    }

    /// Take a one-shot stats sample into the cache.
    pub async fn refresh_stats(&self, id: &str) -> Result<(), CoreError> {
        if !self.contains_container(id) {
            return Err(CoreError::container_not_found(id));
        }
        let sample = self.gateway().stats_once(id).await?;
        if !self.store_stats(id, sample) {
            return Err(CoreError::container_not_found(id));
        }
        self.publish(ChangeEvent::about(ChangeKind::ContainerStatsChanged, id))
            .await;
        Ok(())
    }

    /// Run a remote-version check for a cached container and store the verdict.
    pub async fn check_update(&self, id: &str) -> Result<UpdateState, CoreError> {
        let checker = self
            .shared
            .checker
            .as_ref()
            .ok_or_else(|| CoreError::Config("no update checker attached".to_owned()))?;
        let container = self.container(id)?;
        let state = checker.check(&container).await?;
        if self.set_update_state(id, state) {
            self.publish(ChangeEvent::about(ChangeKind::ContainerChanged, id))
                .await;
        }
        Ok(state)
    }

    /// Ask the engine to remove an image. The cache follows through the
    /// resulting image event.
    pub async fn remove_image(&self, id: &str) -> Result<(), CoreError> {
        if !self.shared.mirror.read().images.contains_key(id) {
            return Err(CoreError::image_not_found(id));
        }
        self.gateway().remove_image(id).await?;
        Ok(())
    }

    pub(crate) fn contains_container(&self, id: &str) -> bool {
        self.shared.mirror.read().containers.contains_key(id)
    }

    /// Replace a container entry from a fresh inspection, keeping the fields
    /// the mirror owns. Returns `true` if the id was not cached before.
    pub(crate) fn apply_container(&self, details: ContainerDetails) -> bool {
        let mut mirror = self.shared.mirror.write();
        match mirror.containers.get_mut(&details.id) {
            Some(existing) => {
                existing.details = details;
                false
            }
            None => {
                mirror
                    .containers
                    .insert(details.id.clone(), Container::new(details));
                true
            }
        }
    }

    pub(crate) fn remove_container(&self, id: &str) -> bool {
        self.shared.mirror.write().containers.remove(id).is_some()
    }

    /// Replace or drop an image entry after a fresh listing.
    pub(crate) fn apply_image(&self, id: &str, listed: Option<Image>) {
        let mut mirror = self.shared.mirror.write();
        match listed {
            Some(image) => {
                mirror.images.insert(image.id.clone(), image);
            }
            None => {
                mirror.images.remove(id);
            }
        }
    }

    /// Store a stats sample. Returns `false` once the container is gone.
    pub(crate) fn store_stats(&self, id: &str, sample: ContainerStats) -> bool {
        let mut mirror = self.shared.mirror.write();
        match mirror.containers.get_mut(id) {
            Some(container) => {
                container.stats = Some(sample);
                true
            }
            None => false,
        }
    }

    pub(crate) async fn publish(&self, event: ChangeEvent) {
        if self.shared.notify.send(event).await.is_err() {
            tracing::debug!("change notification dropped: receiver closed");
        }
    }

    /// Start the per-container background work a newly seen container gets.
    pub(crate) fn spawn_watchers(&self, id: ContainerId) {
        let config = &self.shared.config;
        if config.watch_stats {
            tokio::spawn(stats::watch(self.clone(), id.clone()));
        }
        if config.check_updates && self.shared.checker.is_some() {
            let cache = self.clone();
            tokio::spawn(async move {
                match cache.check_update(&id).await {
                    Ok(state) => tracing::debug!("container {} is {state}", id.short()),
                    Err(e) => tracing::warn!("update check for container {} failed: {e}", id.short()),
                }
            });
        }
    }
}
