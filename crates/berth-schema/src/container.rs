use crate::display::DisplayTag;
use crate::stats::ContainerStats;
use crate::types::{ContainerId, ImageId};
use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};
use std::collections::BTreeMap;

/// Whether a newer image is published for the container's configured reference.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "kebab-case")]
pub enum UpdateState {
    #[default]
    Unknown,
    UpToDate,
    UpdateAvailable,
}

impl std::fmt::Display for UpdateState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            UpdateState::Unknown => write!(f, "unknown"),
            UpdateState::UpToDate => write!(f, "up-to-date"),
            UpdateState::UpdateAvailable => write!(f, "update-available"),
        }
    }
}

/// Row of the engine's container listing. Only the id is needed to inspect.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerSummary {
    #[serde(rename = "Id")]
    pub id: ContainerId,
    #[serde(default, deserialize_with = "crate::nullable")]
    pub names: Vec<String>,
    #[serde(default)]
    pub image: String,
    #[serde(default)]
    pub state: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerState {
    #[serde(default)]
    pub status: String,
    #[serde(default)]
    pub running: bool,
}

/// Full inspect payload: everything needed to recreate the container.
///
/// Fields the recreation path touches are typed; everything else the engine
/// reports is carried verbatim in `extra` so a resubmitted configuration loses
/// nothing.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct ContainerDetails {
    #[serde(rename = "Id")]
    pub id: ContainerId,
    #[serde(default)]
    pub name: String,
    /// Resolved image id the container was created from.
    #[serde(default)]
    pub image: ImageId,
    #[serde(default)]
    pub state: ContainerState,
    #[serde(default)]
    pub config: Config,
    #[serde(default)]
    pub host_config: HostConfig,
    #[serde(default)]
    pub network_settings: NetworkSettings,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl ContainerDetails {
    /// Container name without the engine's leading slash.
    pub fn display_name(&self) -> &str {
        self.name.trim_start_matches('/')
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct Config {
    #[serde(default)]
    pub hostname: String,
    /// Reference the container was created with, e.g. `nginx:latest`.
    #[serde(default)]
    pub image: String,
    #[serde(default, deserialize_with = "crate::nullable")]
    pub env: Vec<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cmd: Option<Vec<String>>,
    #[serde(default, deserialize_with = "crate::nullable")]
    pub labels: BTreeMap<String, String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub exposed_ports: Option<BTreeMap<String, Value>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "PascalCase")]
pub struct PortBinding {
    #[serde(default)]
    pub host_ip: String,
    #[serde(default)]
    pub host_port: String,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct HostConfig {
    #[serde(default)]
    pub network_mode: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub port_bindings: Option<BTreeMap<String, Vec<PortBinding>>>,
    #[serde(default)]
    pub publish_all_ports: bool,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

impl HostConfig {
    pub fn uses_host_network(&self) -> bool {
        self.network_mode == "host"
    }

    /// `container:<id>` mode: the network namespace belongs to another container.
    pub fn shares_network_namespace(&self) -> bool {
        self.network_mode.starts_with("container:")
    }
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct NetworkSettings {
    #[serde(default, deserialize_with = "crate::nullable")]
    pub networks: BTreeMap<String, EndpointSettings>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "PascalCase")]
pub struct EndpointSettings {
    #[serde(default, rename = "NetworkID")]
    pub network_id: String,
    #[serde(default)]
    pub mac_address: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aliases: Option<Vec<String>>,
    #[serde(flatten)]
    pub extra: Map<String, Value>,
}

/// A cached container: its inspected configuration plus the mutable fields the
/// mirror layers on top (latest stats sample, update flag).
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Container {
    pub details: ContainerDetails,
    pub stats: Option<ContainerStats>,
    pub update: UpdateState,
}

impl Container {
    pub fn new(details: ContainerDetails) -> Self {
        Self {
            details,
            stats: None,
            update: UpdateState::Unknown,
        }
    }

    pub fn id(&self) -> &ContainerId {
        &self.details.id
    }

    pub fn image_id(&self) -> &ImageId {
        &self.details.image
    }

    /// The configured image reference, used for pulls and registry lookups.
    pub fn image_reference(&self) -> &str {
        &self.details.config.image
    }

    pub fn name(&self) -> &str {
        self.details.display_name()
    }
}

impl DisplayTag for Container {
    fn display_tag(&self) -> &str {
        let name = self.name();
        if name.is_empty() {
            self.details.id.as_str()
        } else {
            name
        }
    }

    fn is_tagged(&self) -> bool {
        !self.name().is_empty()
    }
}
