use crate::CheckError;
use berth_remote::DigestResolver;
use berth_runtime::EngineGateway;
use berth_schema::{Container, Platform, UpdateState};
use std::sync::Arc;

/// True when any local repository digest carries `remote` as a prefix or a
/// suffix. Registries are inconsistent about the `repo@` and `sha256:` parts.
pub fn is_up_to_date(local_digests: &[String], remote: &str) -> bool {
    !remote.is_empty()
        && local_digests
            .iter()
            .any(|d| d.starts_with(remote) || d.ends_with(remote))
}

/// Compares the digest a container's image was pulled at with the digest its
/// registry currently publishes.
#[derive(Clone)]
pub struct UpdateChecker {
    gateway: Arc<dyn EngineGateway>,
    resolver: Arc<dyn DigestResolver>,
    platform: Platform,
}

impl UpdateChecker {
    pub fn new(gateway: Arc<dyn EngineGateway>, resolver: Arc<dyn DigestResolver>) -> Self {
        Self {
            gateway,
            resolver,
            platform: Platform::host(),
        }
    }

    #[must_use]
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    pub fn platform(&self) -> &Platform {
        &self.platform
    }

    /// Verdict for an image reference. Never guesses: any lookup failure, or
    /// an image with no recorded digests, is an error.
    pub async fn check_reference(&self, reference: &str) -> Result<UpdateState, CheckError> {
        let image = self.gateway.inspect_image(reference).await?;
        if image.repo_digests.is_empty() {
            return Err(CheckError::NoLocalDigests(reference.to_owned()));
        }

        let remote = self
            .resolver
            .resolve_digest(reference, &self.platform)
            .await?;

        if is_up_to_date(&image.repo_digests, &remote) {
            Ok(UpdateState::UpToDate)
        } else {
            tracing::info!(
                "update available for {reference}: local {:?}, remote {remote}",
                image.repo_digests
            );
            Ok(UpdateState::UpdateAvailable)
        }
    }

    pub async fn check(&self, container: &Container) -> Result<UpdateState, CheckError> {
        self.check_reference(container.image_reference()).await
    }
}
