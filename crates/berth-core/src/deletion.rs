use crate::cache::StateCache;
use berth_schema::{ChangeEvent, ChangeKind, ContainerId};
use tokio::sync::mpsc;

/// Confirm destroyed containers one at a time until the queue closes.
pub(crate) async fn run(cache: StateCache, mut candidates: mpsc::Receiver<ContainerId>) {
    while let Some(id) = candidates.recv().await {
        confirm(&cache, &id).await;
    }
    tracing::debug!("deletion worker stopped");
}

/// Re-inspect until the engine stops answering for `id`, then drop the entry.
///
/// If the container is still inspectable after the configured number of
/// attempts the entry is left alone; a later event will correct it.
async fn confirm(cache: &StateCache, id: &ContainerId) -> bool {
    let attempts = cache.config().deletion_attempts;
    let interval = cache.config().deletion_interval();

    for attempt in 1..=attempts {
        match cache.gateway().inspect_container(id).await {
            Err(e) => {
                tracing::debug!(
                    "container {} confirmed gone after {attempt} attempt(s): {e}",
                    id.short()
                );
                cache.remove_container(id);
                cache
                    .publish(ChangeEvent::about(ChangeKind::ContainerChanged, id.as_str()))
                    .await;
                return true;
            }
            Ok(_) => {
                tracing::debug!("destroyed container {} still present", id.short());
                if attempt < attempts {
                    tokio::time::sleep(interval).await;
                }
            }
        }
    }

    tracing::warn!(
        "container {} still inspectable after {attempts} attempts, leaving it cached",
        id.short()
    );
    false
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MirrorConfig;
    use berth_runtime::MockEngine;
    use berth_schema::ContainerDetails;
    use std::sync::Arc;
    use std::time::Duration;
    use tokio::time::Instant;

    fn setup(attempts: u32) -> (Arc<MockEngine>, StateCache, mpsc::Receiver<ChangeEvent>) {
        let engine = Arc::new(MockEngine::new());
        let details = ContainerDetails {
            id: ContainerId::new("c1"),
            name: "/web".to_owned(),
            ..ContainerDetails::default()
        };
        engine.add_container(details.clone());
        let config = MirrorConfig {
            deletion_attempts: attempts,
            ..MirrorConfig::default()
        };
        let (cache, rx) = StateCache::new(engine.clone(), config);
        cache.apply_container(details);
        (engine, cache, rx)
    }

    #[tokio::test(start_paused = true)]
    async fn first_failed_inspect_confirms() {
        let (engine, cache, mut rx) = setup(25);
        engine.linger_container("c1", 2);

        let start = Instant::now();
        assert!(confirm(&cache, &ContainerId::new("c1")).await);
        assert_eq!(start.elapsed(), Duration::from_millis(400));
        assert!(!cache.contains_container("c1"));
        assert_eq!(
            rx.try_recv().unwrap(),
            ChangeEvent::about(ChangeKind::ContainerChanged, "c1")
        );
    }

    #[tokio::test(start_paused = true)]
    async fn gives_up_after_the_last_attempt() {
        let (_engine, cache, mut rx) = setup(3);

        let start = Instant::now();
        assert!(!confirm(&cache, &ContainerId::new("c1")).await);
        // No pause after the final attempt.
        assert_eq!(start.elapsed(), Duration::from_millis(400));
        assert!(cache.contains_container("c1"));
        assert!(rx.try_recv().is_err());
    }
}
