use crate::display::DisplayTag;
use crate::types::ImageId;
use serde::{Deserialize, Serialize};

/// Placeholder id the engine reports for history layers it no longer holds.
pub const MISSING_LAYER: &str = "<missing>";

/// An image as listed by the engine, or an intermediate layer inferred from
/// history. Intermediate layers carry no tags and no digests.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct Image {
    #[serde(rename = "Id")]
    pub id: ImageId,
    #[serde(default, deserialize_with = "crate::nullable")]
    pub repo_tags: Vec<String>,
    #[serde(default, deserialize_with = "crate::nullable")]
    pub repo_digests: Vec<String>,
    #[serde(default)]
    pub size: i64,
    #[serde(default, rename = "ParentId")]
    pub parent_id: String,
}

impl Image {
    /// Synthetic entry for a layer only reachable through another image's history.
    pub fn intermediate(id: impl Into<ImageId>, size: i64) -> Self {
        Self {
            id: id.into(),
            repo_tags: Vec::new(),
            repo_digests: Vec::new(),
            size,
            parent_id: String::new(),
        }
    }

    pub fn is_intermediate(&self) -> bool {
        self.repo_tags.is_empty() && self.repo_digests.is_empty()
    }
}

impl DisplayTag for Image {
    fn display_tag(&self) -> &str {
        self.repo_tags
            .first()
            .or_else(|| self.repo_digests.first())
            .map_or(self.id.as_str(), String::as_str)
    }

    fn is_tagged(&self) -> bool {
        !self.repo_tags.is_empty()
    }
}

/// One row of `docker history`.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct ImageHistoryEntry {
    #[serde(rename = "Id")]
    pub id: String,
    #[serde(default)]
    pub size: i64,
    #[serde(default)]
    pub created_by: String,
}

impl ImageHistoryEntry {
    /// True when the row names a layer that can be looked up by id.
    pub fn is_addressable(&self) -> bool {
        !self.id.is_empty() && self.id != MISSING_LAYER
    }
}
