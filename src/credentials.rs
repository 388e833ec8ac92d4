//! Credential lookup for registry authentication.
//!
//! The transport needs exactly one operation — hostname in, optional
//! (user, password) out — so the contract is kept to a single method on
//! an `async_trait` rather than a richer trait surface. That leaves room
//! for a future credential-helper-backed implementation (shelling out to
//! `docker-credential-*`) without touching the transport.

use std::collections::HashMap;
use std::path::Path;

use async_trait::async_trait;
use base64::Engine as _;
use serde::Deserialize;

use crate::error::{RegistryError, Result};

#[async_trait]
pub trait CredentialStore: Send + Sync {
    /// Look up basic-auth credentials for `hostname`. `Ok(None)` means no
    /// credentials are configured for that host, not an error.
    async fn get_credentials(&self, hostname: &str) -> Result<Option<(String, String)>>;
}

#[derive(Debug, Deserialize)]
struct DockerConfigFile {
    #[serde(default)]
    auths: HashMap<String, DockerAuthEntry>,
}

#[derive(Debug, Deserialize)]
struct DockerAuthEntry {
    auth: Option<String>,
    #[serde(default)]
    username: Option<String>,
    #[serde(default)]
    password: Option<String>,
}

/// Reads credentials from a Docker-style `config.json`. Only the `auths`
/// map is consulted; `identitytoken`, `credsStore`, `email`, and every
/// other key credential helpers use are out of scope and ignored.
pub struct DockerConfigCredentialStore {
    auths: HashMap<String, (String, String)>,
}

impl DockerConfigCredentialStore {
    /// Load and parse `path`. A missing file is an error, not an empty
    /// store — callers that want to run with no credential file should
    /// not construct this store at all.
    pub fn load(path: &Path) -> Result<Self> {
        let contents = std::fs::read_to_string(path)?;
        Self::from_json_str(&contents)
    }

    fn from_json_str(contents: &str) -> Result<Self> {
        let file: DockerConfigFile = serde_json::from_str(contents)?;
        let mut auths = HashMap::with_capacity(file.auths.len());
        for (host, entry) in file.auths {
            if let Some(pair) = decode_auth_entry(&entry)? {
                auths.insert(host, pair);
            }
        }
        Ok(Self { auths })
    }

    /// Default credential file location, `~/.docker/config.json`,
    /// resolved via the `dirs` crate.
    pub fn default_path() -> Result<std::path::PathBuf> {
        let home = dirs::home_dir().ok_or_else(|| {
            RegistryError::Validation("could not determine home directory".into())
        })?;
        Ok(home.join(".docker").join("config.json"))
    }
}

fn decode_auth_entry(entry: &DockerAuthEntry) -> Result<Option<(String, String)>> {
    if let (Some(user), Some(pass)) = (&entry.username, &entry.password) {
        return Ok(Some((user.clone(), pass.clone())));
    }
    let Some(auth) = &entry.auth else {
        return Ok(None);
    };
    if auth.is_empty() {
        return Ok(None);
    }
    let decoded = base64::engine::general_purpose::STANDARD
        .decode(auth)
        .map_err(|e| RegistryError::Decode(format!("invalid base64 in auth entry: {e}")))?;
    let decoded = String::from_utf8(decoded)?;
    match decoded.split_once(':') {
        Some((user, pass)) => Ok(Some((user.to_string(), pass.to_string()))),
        None => Err(RegistryError::Decode(
            "auth entry did not decode to user:password".into(),
        )),
    }
}

#[async_trait]
impl CredentialStore for DockerConfigCredentialStore {
    async fn get_credentials(&self, hostname: &str) -> Result<Option<(String, String)>> {
        Ok(self.auths.get(hostname).cloned())
    }
}

/// In-memory credential store for tests and for embedding this crate as
/// a library without a filesystem dependency.
#[derive(Debug, Default, Clone)]
pub struct InMemoryCredentialStore {
    auths: HashMap<String, (String, String)>,
}

impl InMemoryCredentialStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_credentials(
        mut self,
        hostname: impl Into<String>,
        username: impl Into<String>,
        password: impl Into<String>,
    ) -> Self {
        self.auths
            .insert(hostname.into(), (username.into(), password.into()));
        self
    }
}

#[async_trait]
impl CredentialStore for InMemoryCredentialStore {
    async fn get_credentials(&self, hostname: &str) -> Result<Option<(String, String)>> {
        Ok(self.auths.get(hostname).cloned())
    }
}

/// A store that never has credentials for anything, used when no
/// `--auth-config` file was given and none could be found at the default
/// path.
#[derive(Debug, Default, Clone, Copy)]
pub struct EmptyCredentialStore;

#[async_trait]
impl CredentialStore for EmptyCredentialStore {
    async fn get_credentials(&self, _hostname: &str) -> Result<Option<(String, String)>> {
        Ok(None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn decodes_base64_auth_field() {
        let creds = "alice:s3cret";
        let encoded = base64::engine::general_purpose::STANDARD.encode(creds);
        let json = format!(
            r#"{{"auths": {{"registry.example.com": {{"auth": "{encoded}"}}}}}}"#
        );
        let store = DockerConfigCredentialStore::from_json_str(&json).unwrap();
        let got = store
            .get_credentials("registry.example.com")
            .await
            .unwrap();
        assert_eq!(got, Some(("alice".to_string(), "s3cret".to_string())));
    }

    #[tokio::test]
    async fn unknown_host_returns_none() {
        let store = DockerConfigCredentialStore::from_json_str(r#"{"auths": {}}"#).unwrap();
        assert_eq!(store.get_credentials("nope.example.com").await.unwrap(), None);
    }

    #[tokio::test]
    async fn prefers_explicit_username_password_over_auth_field() {
        let json = r#"{"auths": {"h": {"auth": "bm90aGluZw==", "username": "u", "password": "p"}}}"#;
        let store = DockerConfigCredentialStore::from_json_str(json).unwrap();
        let got = store.get_credentials("h").await.unwrap();
        assert_eq!(got, Some(("u".to_string(), "p".to_string())));
    }

    #[tokio::test]
    async fn in_memory_store_round_trips() {
        let store = InMemoryCredentialStore::new().with_credentials("h", "u", "p");
        assert_eq!(
            store.get_credentials("h").await.unwrap(),
            Some(("u".to_string(), "p".to_string()))
        );
        assert_eq!(store.get_credentials("other").await.unwrap(), None);
    }

    #[tokio::test]
    async fn empty_store_always_returns_none() {
        let store = EmptyCredentialStore;
        assert_eq!(store.get_credentials("anything").await.unwrap(), None);
    }
}
