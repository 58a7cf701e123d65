//! Registry digest lookup for Berth update checks.
//!
//! This crate answers one question: which manifest digest does a registry
//! currently publish for an image reference? `RegistryClient` asks over the
//! OCI distribution API with bearer-token negotiation, and `RegistryConfig`
//! holds per-registry credentials and plain-HTTP hosts.

pub mod auth;
pub mod config;
pub mod http;

pub use auth::{AuthChallenge, TokenCache};
pub use config::{Credentials, RegistryConfig};
pub use http::RegistryClient;

use async_trait::async_trait;
use berth_schema::{Platform, SchemaError};
use thiserror::Error;

#[derive(Debug, Error)]
pub enum RemoteError {
    #[error("remote I/O error: {0}")]
    Io(#[from] std::io::Error),
    #[error("HTTP error: {0}")]
    Http(String),
    #[error("registry authentication failed: {0}")]
    Auth(String),
    #[error("registry config error: {0}")]
    Config(String),
    #[error("serialization error: {0}")]
    Serialization(String),
    #[error("manifest not found: {0}")]
    NotFound(String),
    #[error("registry returned no digest for {0}")]
    MissingDigest(String),
    #[error(transparent)]
    Reference(#[from] SchemaError),
}

/// Resolves the manifest digest a registry publishes for a reference.
#[async_trait]
pub trait DigestResolver: Send + Sync {
    async fn resolve_digest(
        &self,
        reference: &str,
        platform: &Platform,
    ) -> Result<String, RemoteError>;
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reference_errors_pass_through() {
        let err: RemoteError = SchemaError::InvalidReference("Bad".to_owned()).into();
        assert_eq!(err.to_string(), "invalid image reference: Bad");
    }
}
