//! High-level registry operations built on [`AuthenticatedTransport`].

use std::sync::Arc;

use reqwest::{Method, StatusCode};

use crate::credentials::CredentialStore;
use crate::error::{RegistryError, Result};
use crate::manifest::Manifest;
use crate::reference::Reference;
use crate::registry::transport::AuthenticatedTransport;

pub struct RegistryClient {
    transport: AuthenticatedTransport,
}

impl RegistryClient {
    pub fn new(client: reqwest::Client, credentials: Arc<dyn CredentialStore>) -> Self {
        Self {
            transport: AuthenticatedTransport::new(client, credentials),
        }
    }

    pub fn transport(&self) -> &AuthenticatedTransport {
        &self.transport
    }

    /// HEAD the target object. 200 → exists, 401/404 → does not, anything
    /// else is an unexpected-status error.
    pub async fn ref_exists(&self, r: &Reference) -> Result<bool> {
        let registry = r.effective_registry();
        let response = self
            .transport
            .execute(Method::HEAD, &registry, &r.url_path(), &[], None, false)
            .await?;
        match response.status() {
            StatusCode::OK => Ok(true),
            StatusCode::UNAUTHORIZED | StatusCode::NOT_FOUND => Ok(false),
            other => Err(RegistryError::UnexpectedStatus {
                phase: "ref_exists",
                status: other,
                body: response.text().await.unwrap_or_default(),
            }),
        }
    }

    /// Resolve a tag reference to an equivalent digest reference. A
    /// reference that is already a digest is returned unchanged.
    pub async fn manifest_resolve_tag(&self, r: &Reference) -> Result<Reference> {
        if r.is_digest_ref() {
            return Ok(r.clone());
        }
        let registry = r.effective_registry();
        let response = self
            .transport
            .execute(Method::HEAD, &registry, &r.url_path(), &[], None, false)
            .await?;
        match response.status() {
            StatusCode::OK => {
                let digest = response
                    .headers()
                    .get("Docker-Content-Digest")
                    .and_then(|v| v.to_str().ok())
                    .ok_or_else(|| {
                        RegistryError::Decode(
                            "200 response to tag HEAD carried no Docker-Content-Digest".into(),
                        )
                    })?;
                Ok(r.with_ref(digest.to_string()))
            }
            other => Err(RegistryError::UnexpectedStatus {
                phase: "manifest_resolve_tag",
                status: other,
                body: response.text().await.unwrap_or_default(),
            }),
        }
    }

    /// Download and decode the manifest named by `r`.
    pub async fn manifest_download(&self, r: &Reference) -> Result<Manifest> {
        let registry = r.effective_registry();
        let response = self
            .transport
            .execute(Method::GET, &registry, &r.url_path(), &[], None, false)
            .await?;
        if response.status() != StatusCode::OK {
            return Err(RegistryError::UnexpectedStatus {
                phase: "manifest_download",
                status: response.status(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        let content_type = response
            .headers()
            .get(reqwest::header::CONTENT_TYPE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.split(';').next().unwrap_or(s).trim().to_string());
        let body = response.bytes().await?;
        Manifest::decode(&body, content_type.as_deref())
    }

    /// `GET /v2/_catalog` — the full repository list the registry is
    /// willing to report. Pagination via the `Link` header is not
    /// followed.
    pub async fn registry_repos(&self, registry: &crate::reference::Registry) -> Result<Vec<String>> {
        let response = self
            .transport
            .execute(Method::GET, registry, "v2/_catalog", &[], None, false)
            .await?;
        if response.status() != StatusCode::OK {
            return Err(RegistryError::UnexpectedStatus {
                phase: "registry_repos",
                status: response.status(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        let value: serde_json::Value = response.json().await?;
        let repos = value
            .get("repositories")
            .and_then(|v| v.as_array())
            .ok_or_else(|| RegistryError::Decode("catalog response missing repositories".into()))?;
        repos
            .iter()
            .map(|v| {
                v.as_str().map(|s| s.to_string()).ok_or_else(|| {
                    RegistryError::Decode("catalog entry was not a string".into())
                })
            })
            .collect()
    }

    /// `GET /v2/<repo>/tags/list` — every tag the registry reports for
    /// `repo`. Pagination via the `Link` header is not followed.
    pub async fn registry_repo_tags(&self, r: &Reference) -> Result<Vec<String>> {
        let registry = r.effective_registry();
        let path = format!("v2/{}/tags/list", r.repo.path());
        let response = self
            .transport
            .execute(Method::GET, &registry, &path, &[], None, false)
            .await?;
        if response.status() != StatusCode::OK {
            return Err(RegistryError::UnexpectedStatus {
                phase: "registry_repo_tags",
                status: response.status(),
                body: response.text().await.unwrap_or_default(),
            });
        }
        let value: serde_json::Value = response.json().await?;
        let tags = value
            .get("tags")
            .and_then(|v| v.as_array())
            .ok_or_else(|| RegistryError::Decode("tags response missing tags".into()))?;
        tags.iter()
            .map(|v| {
                v.as_str()
                    .map(|s| s.to_string())
                    .ok_or_else(|| RegistryError::Decode("tag entry was not a string".into()))
            })
            .collect()
    }
}

/// Used by `copy` to validate that `src` and `dst` name the same kind of
/// object before any network I/O happens.
pub fn require_same_kind(src: &Reference, dst: &Reference) -> Result<()> {
    if src.kind != dst.kind {
        return Err(RegistryError::Validation(format!(
            "source is a {:?} reference but destination is a {:?} reference",
            src.kind, dst.kind
        )));
    }
    Ok(())
}
