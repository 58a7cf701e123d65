use crate::RemoteError;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

fn default_timeout_secs() -> u64 {
    30
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Credentials {
    pub username: String,
    pub password: String,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Credentials keyed by registry host (`ghcr.io`, `registry-1.docker.io`, ...).
    #[serde(default)]
    pub credentials: BTreeMap<String, Credentials>,
    /// Hosts spoken to over plain HTTP.
    #[serde(default)]
    pub insecure: Vec<String>,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            credentials: BTreeMap::new(),
            insecure: Vec::new(),
            timeout_secs: default_timeout_secs(),
        }
    }
}

impl RegistryConfig {
    #[must_use]
    pub fn with_credentials(mut self, registry: &str, username: &str, password: &str) -> Self {
        self.credentials.insert(
            registry.to_owned(),
            Credentials {
                username: username.to_owned(),
                password: password.to_owned(),
            },
        );
        self
    }

    #[must_use]
    pub fn with_insecure(mut self, registry: &str) -> Self {
        self.insecure.push(registry.to_owned());
        self
    }

    pub fn is_insecure(&self, registry: &str) -> bool {
        self.insecure.iter().any(|r| r == registry)
    }

    pub fn credentials_for(&self, registry: &str) -> Option<&Credentials> {
        self.credentials.get(registry)
    }

    /// Load config from `~/.config/berth/registry.json`, or defaults if absent.
    pub fn load_default() -> Result<Self, RemoteError> {
        let path = default_config_path()?;
        if !path.exists() {
            return Ok(Self::default());
        }
        Self::load(&path)
    }

    pub fn load(path: &Path) -> Result<Self, RemoteError> {
        let content = std::fs::read_to_string(path)?;
        serde_json::from_str(&content)
            .map_err(|e| RemoteError::Config(format!("invalid registry config: {e}")))
    }

    pub fn save(&self, path: &Path) -> Result<(), RemoteError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = serde_json::to_string_pretty(self)
            .map_err(|e| RemoteError::Serialization(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }
}

fn default_config_path() -> Result<PathBuf, RemoteError> {
    let home = std::env::var("HOME").map_err(|_| RemoteError::Config("HOME not set".to_owned()))?;
    Ok(PathBuf::from(home).join(".config/berth/registry.json"))
}
