use crate::CoreError;
use berth_schema::EventFilter;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

/// Tuning knobs for the mirror. Every field has a default, so an empty TOML
/// document is a valid configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MirrorConfig {
    /// Capacity of the change notification queue handed to the consumer.
    pub event_queue_capacity: usize,
    pub deletion_queue_capacity: usize,
    /// How many times a destroyed container is re-inspected before giving up.
    pub deletion_attempts: u32,
    pub deletion_interval_ms: u64,
    pub spinner_interval_ms: u64,
    pub stats_debounce_ms: u64,
    pub watch_stats: bool,
    pub check_updates: bool,
    pub event_filter: EventFilter,
}

impl Default for MirrorConfig {
    fn default() -> Self {
        Self {
            event_queue_capacity: 20,
            deletion_queue_capacity: 20,
            deletion_attempts: 25,
            deletion_interval_ms: 200,
            spinner_interval_ms: 100,
            stats_debounce_ms: 1000,
            watch_stats: true,
            check_updates: true,
            event_filter: EventFilter::default(),
        }
    }
}

impl MirrorConfig {
    pub fn from_toml(content: &str) -> Result<Self, CoreError> {
        let config: Self =
            toml::from_str(content).map_err(|e| CoreError::Config(format!("invalid TOML: {e}")))?;
        config.validate()?;
        Ok(config)
    }

    pub fn load(path: &Path) -> Result<Self, CoreError> {
        let content = std::fs::read_to_string(path)?;
        Self::from_toml(&content)
    }

    pub fn to_toml(&self) -> Result<String, CoreError> {
        toml::to_string_pretty(self).map_err(|e| CoreError::Config(e.to_string()))
    }

    pub fn validate(&self) -> Result<(), CoreError> {
        if self.event_queue_capacity == 0 {
            return Err(CoreError::Config(
                "event_queue_capacity must be at least 1".to_owned(),
            ));
        }
        if self.deletion_queue_capacity == 0 {
            return Err(CoreError::Config(
                "deletion_queue_capacity must be at least 1".to_owned(),
            ));
        }
        if self.spinner_interval_ms == 0 {
            return Err(CoreError::Config(
                "spinner_interval_ms must be positive".to_owned(),
            ));
        }
        Ok(())
    }

    pub fn deletion_interval(&self) -> Duration {
        Duration::from_millis(self.deletion_interval_ms)
    }

    /// Spinner frame period, never shorter than 1ms.
    pub fn spinner_interval(&self) -> Duration {
        Duration::from_millis(self.spinner_interval_ms.max(1))
    }

    pub fn stats_debounce(&self) -> Duration {
        Duration::from_millis(self.stats_debounce_ms)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use berth_schema::{EntityKind, EventAction};

    #[test]
    fn empty_document_gives_defaults() {
        let config = MirrorConfig::from_toml("").unwrap();
        assert_eq!(config, MirrorConfig::default());
        assert_eq!(config.deletion_interval(), Duration::from_millis(200));
        assert_eq!(config.deletion_attempts, 25);
    }

    #[test]
    fn partial_override() {
        let config = MirrorConfig::from_toml(
            r#"
deletion_attempts = 5
watch_stats = false

[event_filter]
kinds = ["container"]
actions = ["destroy", "create"]
"#,
        )
        .unwrap();
        assert_eq!(config.deletion_attempts, 5);
        assert!(!config.watch_stats);
        assert!(config.check_updates);
        assert_eq!(config.event_filter.kinds, vec![EntityKind::Container]);
        assert_eq!(
            config.event_filter.actions,
            vec![EventAction::Destroy, EventAction::Create]
        );
    }

    #[test]
    fn zero_spinner_interval_is_clamped() {
        let config = MirrorConfig {
            spinner_interval_ms: 0,
            ..MirrorConfig::default()
        };
        assert!(config.validate().is_err());
        assert_eq!(config.spinner_interval(), Duration::from_millis(1));
    }

    #[test]
    fn zero_capacity_rejected() {
        let err = MirrorConfig::from_toml("event_queue_capacity = 0").unwrap_err();
        assert!(err.to_string().contains("event_queue_capacity"));
    }

    #[test]
    fn malformed_toml_rejected() {
        assert!(matches!(
            MirrorConfig::from_toml("deletion_attempts = \"many\""),
            Err(CoreError::Config(_))
        ));
    }

    #[test]
    fn file_roundtrip() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("berth.toml");
        let config = MirrorConfig {
            stats_debounce_ms: 250,
            ..MirrorConfig::default()
        };
        std::fs::write(&path, config.to_toml().unwrap()).unwrap();
        assert_eq!(MirrorConfig::load(&path).unwrap(), config);
    }
}
