use serde::{Deserialize, Serialize};
use serde_json::Value;

/// One message of an image pull, reduced to the fields the update log shows.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullProgress {
    pub status: String,
    #[serde(default)]
    pub layer_id: Option<String>,
    #[serde(default)]
    pub progress: Option<String>,
}

impl PullProgress {
    pub fn new(status: impl Into<String>) -> Self {
        Self {
            status: status.into(),
            layer_id: None,
            progress: None,
        }
    }

    #[must_use]
    pub fn with_layer(mut self, layer_id: impl Into<String>) -> Self {
        self.layer_id = Some(layer_id.into());
        self
    }

    #[must_use]
    pub fn with_progress(mut self, progress: impl Into<String>) -> Self {
        self.progress = Some(progress.into());
        self
    }

    /// Map a raw engine pull message (`{"status", "id", "progress", ...}`).
    /// Messages without a textual status carry nothing to display.
    pub fn from_message(msg: &Value) -> Option<Self> {
        let status = msg.get("status")?.as_str()?.to_owned();
        let text = |key: &str| {
            msg.get(key)
                .and_then(Value::as_str)
                .filter(|s| !s.is_empty())
                .map(str::to_owned)
        };
        Some(Self {
            status,
            layer_id: text("id"),
            progress: text("progress"),
        })
    }

    /// Status followed by the progress bar, if any.
    pub fn line(&self) -> String {
        match &self.progress {
            Some(p) => format!("{} {p}", self.status),
            None => self.status.clone(),
        }
    }
}
