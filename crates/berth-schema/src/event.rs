use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Kind of object an engine event is about.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EntityKind {
    Container,
    Image,
    Volume,
    Network,
    #[serde(untagged)]
    Other(String),
}

impl EntityKind {
    pub fn as_str(&self) -> &str {
        match self {
            EntityKind::Container => "container",
            EntityKind::Image => "image",
            EntityKind::Volume => "volume",
            EntityKind::Network => "network",
            EntityKind::Other(s) => s,
        }
    }
}

impl fmt::Display for EntityKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// What happened to the entity.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum EventAction {
    Create,
    Start,
    Restart,
    Stop,
    Remove,
    Die,
    Kill,
    Pause,
    Unpause,
    Rename,
    Destroy,
    Push,
    Pull,
    Prune,
    Delete,
    #[serde(untagged)]
    Other(String),
}

impl EventAction {
    /// Every action the mirror subscribes to.
    pub const WATCHED: [EventAction; 15] = [
        EventAction::Create,
        EventAction::Start,
        EventAction::Restart,
        EventAction::Stop,
        EventAction::Remove,
        EventAction::Die,
        EventAction::Kill,
        EventAction::Pause,
        EventAction::Unpause,
        EventAction::Rename,
        EventAction::Destroy,
        EventAction::Push,
        EventAction::Pull,
        EventAction::Prune,
        EventAction::Delete,
    ];

    pub fn as_str(&self) -> &str {
        match self {
            EventAction::Create => "create",
            EventAction::Start => "start",
            EventAction::Restart => "restart",
            EventAction::Stop => "stop",
            EventAction::Remove => "remove",
            EventAction::Die => "die",
            EventAction::Kill => "kill",
            EventAction::Pause => "pause",
            EventAction::Unpause => "unpause",
            EventAction::Rename => "rename",
            EventAction::Destroy => "destroy",
            EventAction::Push => "push",
            EventAction::Pull => "pull",
            EventAction::Prune => "prune",
            EventAction::Delete => "delete",
            EventAction::Other(s) => s,
        }
    }
}

impl fmt::Display for EventAction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A raw event from the engine's event stream.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineEvent {
    pub kind: EntityKind,
    pub action: EventAction,
    pub actor_id: String,
    #[serde(default)]
    pub time: Option<DateTime<Utc>>,
}

impl EngineEvent {
    pub fn new(kind: EntityKind, action: EventAction, actor_id: impl Into<String>) -> Self {
        Self {
            kind,
            action,
            actor_id: actor_id.into(),
            time: None,
        }
    }

    pub fn container(action: EventAction, id: impl Into<String>) -> Self {
        Self::new(EntityKind::Container, action, id)
    }

    pub fn image(action: EventAction, id: impl Into<String>) -> Self {
        Self::new(EntityKind::Image, action, id)
    }
}

/// Which events an event subscription should deliver.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EventFilter {
    pub kinds: Vec<EntityKind>,
    pub actions: Vec<EventAction>,
}

impl Default for EventFilter {
    fn default() -> Self {
        Self {
            kinds: vec![EntityKind::Container, EntityKind::Image],
            actions: EventAction::WATCHED.to_vec(),
        }
    }
}

impl EventFilter {
    /// An empty list means "no restriction" for that dimension.
    pub fn matches(&self, event: &EngineEvent) -> bool {
        (self.kinds.is_empty() || self.kinds.contains(&event.kind))
            && (self.actions.is_empty() || self.actions.contains(&event.action))
    }
}

/// Kind tag of a normalized change notification.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum ChangeKind {
    ImagesLoaded,
    ContainersLoaded,
    ImageChanged,
    ContainerChanged,
    ContainerStatsChanged,
}

impl fmt::Display for ChangeKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ChangeKind::ImagesLoaded => write!(f, "images-loaded"),
            ChangeKind::ContainersLoaded => write!(f, "containers-loaded"),
            ChangeKind::ImageChanged => write!(f, "image-changed"),
            ChangeKind::ContainerChanged => write!(f, "container-changed"),
            ChangeKind::ContainerStatsChanged => write!(f, "container-stats-changed"),
        }
    }
}

/// A hint that cached state changed. Consumers re-query the cache; the
/// notification itself carries no entity data.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct ChangeEvent {
    pub kind: ChangeKind,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub actor_id: Option<String>,
}

impl ChangeEvent {
    pub fn loaded(kind: ChangeKind) -> Self {
        Self {
            kind,
            actor_id: None,
        }
    }

    pub fn about(kind: ChangeKind, actor_id: impl Into<String>) -> Self {
        Self {
            kind,
            actor_id: Some(actor_id.into()),
        }
    }
}
