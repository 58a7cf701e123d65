use berth_schema::{ChangeEvent, ChangeKind};
use std::collections::{BTreeMap, HashMap};
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::time::Instant;

enum Next {
    Event(Option<ChangeEvent>),
    Flush(String),
}

/// Wraps the cache's notification receiver so each container's stats
/// notifications reach the consumer at most once per window. Other kinds pass
/// straight through.
///
/// A burst of stats notifications for one container inside its window
/// collapses into the most recent one, delivered when the window closes.
/// Containers are throttled independently.
pub struct StatsDebouncer {
    inner: mpsc::Receiver<ChangeEvent>,
    window: Duration,
    last_sent: HashMap<String, Instant>,
    pending: BTreeMap<String, ChangeEvent>,
}

impl StatsDebouncer {
    pub fn new(inner: mpsc::Receiver<ChangeEvent>, window: Duration) -> Self {
        Self {
            inner,
            window,
            last_sent: HashMap::new(),
            pending: BTreeMap::new(),
        }
    }

    /// Next notification, or `None` once the cache is gone and nothing is
    /// pending.
    pub async fn recv(&mut self) -> Option<ChangeEvent> {
        loop {
            let next = match self.next_due() {
                Some((actor, deadline)) => tokio::select! {
                    event = self.inner.recv() => Next::Event(event),
                    () = tokio::time::sleep_until(deadline) => Next::Flush(actor),
                },
                None => Next::Event(self.inner.recv().await),
            };

            match next {
                Next::Flush(actor) => {
                    self.last_sent.insert(actor.clone(), Instant::now());
                    return self.pending.remove(&actor);
                }
                Next::Event(None) => return self.pending.pop_first().map(|(_, event)| event),
                Next::Event(Some(event)) if event.kind == ChangeKind::ContainerStatsChanged => {
                    let actor = event.actor_id.clone().unwrap_or_default();
                    let now = Instant::now();
                    self.forget_idle(now);
                    match self.last_sent.get(&actor) {
                        Some(last) if now < *last + self.window => {
                            self.pending.insert(actor, event);
                        }
                        _ => {
                            self.last_sent.insert(actor.clone(), now);
                            self.pending.remove(&actor);
                            return Some(event);
                        }
                    }
                }
                Next::Event(Some(event)) => return Some(event),
            }
        }
    }

    /// The pending container whose window closes first.
    fn next_due(&self) -> Option<(String, Instant)> {
        self.pending
            .keys()
            .filter_map(|actor| {
                self.last_sent
                    .get(actor)
                    .map(|last| (actor.clone(), *last + self.window))
            })
            .min_by_key(|(_, deadline)| *deadline)
    }

    fn forget_idle(&mut self, now: Instant) {
        let window = self.window;
        let pending = &self.pending;
        self.last_sent
            .retain(|actor, last| now < *last + window || pending.contains_key(actor));
    }
}
