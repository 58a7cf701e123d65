use crate::cache::StateCache;
use berth_runtime::EventSubscription;
use berth_schema::{ChangeEvent, ChangeKind, ContainerId, EngineEvent, EntityKind, EventAction};
use tokio::sync::mpsc;

/// Apply engine events to the cache until the subscription reports an error.
pub(crate) async fn run(
    cache: StateCache,
    subscription: EventSubscription,
    deletions: mpsc::Sender<ContainerId>,
) {
    let EventSubscription {
        mut events,
        mut errors,
    } = subscription;
    let mut errors_open = true;

    loop {
        tokio::select! {
            signal = &mut errors, if errors_open => match signal {
                Ok(e) => {
                    tracing::warn!("event stream failed, reconciler stopping: {e}");
                    break;
                }
                Err(_) => {
                    tracing::debug!("event error signal dropped");
                    errors_open = false;
                }
            },
            event = events.recv() => match event {
                Some(event) => reconcile(&cache, event, &deletions).await,
                None => {
                    tracing::info!("event stream ended, reconciler stopping");
                    break;
                }
            },
        }
    }
}

async fn reconcile(cache: &StateCache, event: EngineEvent, deletions: &mpsc::Sender<ContainerId>) {
    tracing::debug!(
        "engine event: {} {} {}",
        event.kind,
        event.action,
        event.actor_id
    );
    match event.kind {
        EntityKind::Container => reconcile_container(cache, event, deletions).await,
        EntityKind::Image => reconcile_image(cache, event).await,
        _ => {}
    }
}

async fn reconcile_container(
    cache: &StateCache,
    event: EngineEvent,
    deletions: &mpsc::Sender<ContainerId>,
) {
    let id = ContainerId::new(event.actor_id);
    let destroyed = event.action == EventAction::Destroy;

    match cache.gateway().inspect_container(&id).await {
        Ok(details) => {
            let discovered = cache.apply_container(details);
            if discovered && !destroyed {
                cache.spawn_watchers(id.clone());
            }
        }
        // Only a confirmed destroy removes an entry.
        Err(e) => tracing::warn!(
            "inspect of container {} after {} failed, keeping cached entry: {e}",
            id.short(),
            event.action
        ),
    }

    if destroyed {
        tracing::debug!("waiting for container {} to disappear", id.short());
        if deletions.send(id.clone()).await.is_err() {
            tracing::warn!("deletion worker gone, container {} stays cached", id.short());
        }
    }

    cache
        .publish(ChangeEvent::about(ChangeKind::ContainerChanged, id.into_inner()))
        .await;
}

async fn reconcile_image(cache: &StateCache, event: EngineEvent) {
    let id = event.actor_id;
    match cache.gateway().list_images().await {
        Ok(images) => {
            let listed = images.into_iter().find(|i| i.id == *id);
            cache.apply_image(&id, listed);
        }
        Err(e) => tracing::warn!("image listing after {} of {id} failed: {e}", event.action),
    }
    cache
        .publish(ChangeEvent::about(ChangeKind::ImageChanged, id))
        .await;
}
