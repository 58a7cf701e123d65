use crate::cache::StateCache;
use berth_schema::{ChangeEvent, ChangeKind, ContainerId};

/// Follow a container's stats stream, storing each sample and announcing it.
/// Ends when the stream closes or the container leaves the cache.
pub(crate) async fn watch(cache: StateCache, id: ContainerId) {
    let mut samples = match cache.gateway().stats_stream(&id).await {
        Ok(samples) => samples,
        Err(e) => {
            tracing::debug!("no stats for container {}: {e}", id.short());
            return;
        }
    };

    while let Some(sample) = samples.recv().await {
        if !cache.store_stats(&id, sample) {
            break;
        }
        cache
            .publish(ChangeEvent::about(
                ChangeKind::ContainerStatsChanged,
                id.as_str(),
            ))
            .await;
    }
    tracing::debug!("stats watcher for container {} stopped", id.short());
}
