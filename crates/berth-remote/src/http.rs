use crate::auth::{basic_header, AuthChallenge, TokenCache, TokenResponse};
use crate::{DigestResolver, RegistryConfig, RemoteError};
use async_trait::async_trait;
use berth_schema::{ImageReference, Platform};
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;
use ureq::http::Response;
use ureq::Body;

const MANIFEST_ACCEPT: &str = "application/vnd.oci.image.index.v1+json, \
application/vnd.docker.distribution.manifest.list.v2+json, \
application/vnd.oci.image.manifest.v1+json, \
application/vnd.docker.distribution.manifest.v2+json";

const DIGEST_HEADER: &str = "docker-content-digest";

#[derive(Debug, Clone, Copy)]
enum Method {
    Head,
    Get,
}

#[derive(Debug, Deserialize)]
struct ManifestIndex {
    #[serde(default)]
    manifests: Vec<IndexEntry>,
}

#[derive(Debug, Deserialize)]
struct IndexEntry {
    digest: String,
    #[serde(default)]
    platform: Option<Platform>,
}

impl IndexEntry {
    fn matches(&self, platform: &Platform) -> bool {
        self.platform.as_ref().is_some_and(|p| {
            p.os == platform.os
                && p.architecture == platform.architecture
                && (platform.variant.is_none() || p.variant == platform.variant)
        })
    }
}

/// OCI distribution client for manifest digest lookups.
///
/// Talks to `GET|HEAD /v2/<repository>/manifests/<reference>`, negotiating a
/// bearer token from the registry's `WWW-Authenticate` challenge when the
/// first attempt is refused. Tokens are cached per registry and scope.
#[derive(Clone)]
pub struct RegistryClient {
    inner: Arc<Inner>,
}

struct Inner {
    config: RegistryConfig,
    agent: ureq::Agent,
    tokens: TokenCache,
}

impl RegistryClient {
    pub fn new(config: RegistryConfig) -> Self {
        let agent_config = ureq::Agent::config_builder()
            .http_status_as_error(false)
            .timeout_global(Some(Duration::from_secs(config.timeout_secs)))
            .build();
        let agent = ureq::Agent::new_with_config(agent_config);
        Self {
            inner: Arc::new(Inner {
                config,
                agent,
                tokens: TokenCache::default(),
            }),
        }
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.inner.config
    }

    fn manifest_url(&self, reference: &ImageReference) -> String {
        let scheme = if self.inner.config.is_insecure(&reference.registry) {
            "http"
        } else {
            "https"
        };
        format!(
            "{scheme}://{}/v2/{}/manifests/{}",
            reference.registry,
            reference.repository,
            reference.manifest_reference()
        )
    }

    /// Blocking lookup; `resolve_digest` runs this on the blocking pool.
    ///
    /// A `HEAD` is tried first. Registries that omit the digest header get a
    /// `GET`, and if that still carries no header but returns an image index,
    /// the entry for `platform` is used.
    pub fn resolve_blocking(
        &self,
        reference: &str,
        platform: &Platform,
    ) -> Result<String, RemoteError> {
        let reference = ImageReference::parse(reference)?;
        let url = self.manifest_url(&reference);
        let scope = format!("repository:{}:pull", reference.repository);
        tracing::debug!("resolving {reference} for {platform} via {url}");

        let mut authorization = self
            .inner
            .tokens
            .get(&reference.registry, &scope)
            .map(|t| format!("Bearer {t}"));

        let mut resp = self.send(Method::Head, &url, authorization.as_deref())?;
        if resp.status().as_u16() == 401 {
            if authorization.is_some() {
                self.inner.tokens.invalidate(&reference.registry, &scope);
            }
            authorization = Some(self.authorize(&resp, &reference, &scope)?);
            resp = self.send(Method::Head, &url, authorization.as_deref())?;
        }
        check_status(&resp, &url)?;
        if let Some(digest) = digest_header(&resp) {
            return Ok(digest);
        }

        tracing::debug!("no digest header on HEAD {url}, falling back to GET");
        let mut resp = self.send(Method::Get, &url, authorization.as_deref())?;
        check_status(&resp, &url)?;
        if let Some(digest) = digest_header(&resp) {
            return Ok(digest);
        }
        let body = resp
            .body_mut()
            .read_to_string()
            .map_err(|e| RemoteError::Http(e.to_string()))?;
        let index: ManifestIndex =
            serde_json::from_str(&body).map_err(|e| RemoteError::Serialization(e.to_string()))?;
        index
            .manifests
            .into_iter()
            .find(|m| m.matches(platform))
            .map(|m| m.digest)
            .ok_or_else(|| RemoteError::MissingDigest(reference.to_string()))
    }

    fn send(
        &self,
        method: Method,
        url: &str,
        authorization: Option<&str>,
    ) -> Result<Response<Body>, RemoteError> {
        let mut req = match method {
            Method::Head => self.inner.agent.head(url),
            Method::Get => self.inner.agent.get(url),
        }
        .header("Accept", MANIFEST_ACCEPT);
        if let Some(auth) = authorization {
            req = req.header("Authorization", auth);
        }
        req.call().map_err(|e| RemoteError::Http(e.to_string()))
    }

    /// Answer a 401 challenge with an `Authorization` header value.
    fn authorize(
        &self,
        resp: &Response<Body>,
        reference: &ImageReference,
        scope: &str,
    ) -> Result<String, RemoteError> {
        let credentials = self.inner.config.credentials_for(&reference.registry);
        let challenge = resp
            .headers()
            .get("www-authenticate")
            .and_then(|v| v.to_str().ok())
            .and_then(AuthChallenge::parse)
            .ok_or_else(|| {
                RemoteError::Auth(format!("{} sent no usable challenge", reference.registry))
            })?;

        match challenge {
            AuthChallenge::Basic { .. } => credentials.map(basic_header).ok_or_else(|| {
                RemoteError::Auth(format!("{} requires credentials", reference.registry))
            }),
            AuthChallenge::Bearer {
                realm,
                service,
                scope: challenge_scope,
            } => {
                let scope = challenge_scope.as_deref().unwrap_or(scope);
                tracing::debug!("requesting token from {realm} for {scope}");
                let mut req = self.inner.agent.get(realm.as_str()).query("scope", scope);
                if let Some(service) = &service {
                    req = req.query("service", service);
                }
                if let Some(creds) = credentials {
                    req = req.header("Authorization", basic_header(creds));
                }
                let mut token_resp = req.call().map_err(|e| RemoteError::Http(e.to_string()))?;
                let code = token_resp.status().as_u16();
                if code != 200 {
                    return Err(RemoteError::Auth(format!("token endpoint {realm} returned HTTP {code}")));
                }
                let body = token_resp
                    .body_mut()
                    .read_to_string()
                    .map_err(|e| RemoteError::Http(e.to_string()))?;
                let token = serde_json::from_str::<TokenResponse>(&body)
                    .map_err(|e| RemoteError::Serialization(e.to_string()))?
                    .into_token()
                    .ok_or_else(|| RemoteError::Auth(format!("token endpoint {realm} returned no token")))?;
                self.inner
                    .tokens
                    .insert(&reference.registry, scope, token.clone());
                Ok(format!("Bearer {token}"))
            }
        }
    }
}

fn check_status(resp: &Response<Body>, url: &str) -> Result<(), RemoteError> {
    match resp.status().as_u16() {
        200..=299 => Ok(()),
        401 | 403 => Err(RemoteError::Auth(format!("access denied for {url}"))),
        404 => Err(RemoteError::NotFound(url.to_owned())),
        code => Err(RemoteError::Http(format!("HTTP {code} for {url}"))),
    }
}

fn digest_header(resp: &Response<Body>) -> Option<String> {
    resp.headers()
        .get(DIGEST_HEADER)
        .and_then(|v| v.to_str().ok())
        .map(str::trim)
        .filter(|d| !d.is_empty())
        .map(str::to_owned)
}

#[async_trait]
impl DigestResolver for RegistryClient {
    async fn resolve_digest(
        &self,
        reference: &str,
        platform: &Platform,
    ) -> Result<String, RemoteError> {
        let client = self.clone();
        let reference = reference.to_owned();
        let platform = platform.clone();
        tokio::task::spawn_blocking(move || client.resolve_blocking(&reference, &platform))
            .await
            .map_err(|e| RemoteError::Http(format!("registry lookup task failed: {e}")))?
    }
}
