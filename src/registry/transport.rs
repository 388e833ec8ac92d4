//! HTTP transport with transparent bearer-token acquisition.
//!
//! Every request the client makes — manifest HEAD/GET/PUT, blob
//! HEAD/GET/POST/PATCH/PUT, catalog and tag-list GET — goes through
//! [`AuthenticatedTransport::execute`]. Token acquisition is triggered
//! lazily by the first 401 rather than attempted up front, matching how
//! registries actually behave: some repositories are public and never
//! challenge at all.

use std::collections::HashMap;
use std::sync::Arc;

use reqwest::{Method, StatusCode};
use tokio::sync::Mutex;

use crate::credentials::CredentialStore;
use crate::error::{RegistryError, Result};
use crate::manifest::KNOWN_MEDIA_TYPES;
use crate::reference::Registry;

/// Coarse cache key for bearer tokens: hostname plus the first three path
/// segments after `/v2/`. This matches the granularity of a registry's
/// auth realm (typically scoped to one repository) and lets many blob
/// requests within the same repository reuse one token.
type AuthKey = (String, String);

fn auth_key(hostname: &str, path: &str) -> AuthKey {
    let segments: Vec<&str> = path.split('/').filter(|s| !s.is_empty()).take(3).collect();
    (hostname.to_string(), segments.join("/"))
}

pub struct AuthenticatedTransport {
    client: reqwest::Client,
    credentials: Arc<dyn CredentialStore>,
    tokens: Mutex<HashMap<AuthKey, String>>,
}

struct AuthChallenge {
    realm: String,
    params: HashMap<String, String>,
}

impl AuthenticatedTransport {
    pub fn new(client: reqwest::Client, credentials: Arc<dyn CredentialStore>) -> Self {
        Self {
            client,
            credentials,
            tokens: Mutex::new(HashMap::new()),
        }
    }

    fn accept_header() -> String {
        let mut types: Vec<&str> = KNOWN_MEDIA_TYPES.to_vec();
        types.push("*/*");
        types.join(", ")
    }

    /// Issue one request, transparently retrying exactly once on a 401
    /// with a freshly acquired bearer token.
    ///
    /// `path_or_url` is either a `v2/...`-rooted path to resolve against
    /// `registry`'s base URL, or (when `has_host` is `true`) an absolute
    /// URL already carrying its own host — used for blob-upload
    /// continuations whose `Location` may point at a different host
    /// entirely (common with cloud-backed blob storage).
    pub async fn execute(
        &self,
        method: Method,
        registry: &Registry,
        path_or_url: &str,
        extra_headers: &[(&str, String)],
        body: Option<reqwest::Body>,
        has_host: bool,
    ) -> Result<reqwest::Response> {
        let url = if has_host {
            path_or_url.to_string()
        } else {
            format!("{}/{}", registry.base_url(), path_or_url)
        };
        let parsed = url::Url::parse(&url)
            .map_err(|e| RegistryError::Validation(format!("invalid request URL {url:?}: {e}")))?;
        let hostname = parsed.host_str().unwrap_or(registry.credential_host()).to_string();
        let path = parsed.path().trim_start_matches('/').to_string();
        let key = auth_key(&hostname, &path);

        let credentials = self
            .credentials
            .get_credentials(registry.credential_host())
            .await?;

        let cached_token = self.tokens.lock().await.get(&key).cloned();

        let body_bytes = match &body {
            Some(b) => b.as_bytes().map(|b| b.to_vec()),
            None => None,
        };

        let response = self
            .send_once(method.clone(), &url, extra_headers, clone_body(&body, &body_bytes), cached_token.as_deref(), credentials.as_ref())
            .await?;

        if response.status() != StatusCode::UNAUTHORIZED || cached_token.is_some() {
            return Ok(response);
        }

        let www_auth = response
            .headers()
            .get(reqwest::header::WWW_AUTHENTICATE)
            .and_then(|v| v.to_str().ok())
            .map(|s| s.to_string());

        let Some(www_auth) = www_auth else {
            return Err(RegistryError::Unauthorized(
                "401 response carried no WWW-Authenticate header".into(),
            ));
        };

        let challenge = parse_bearer_challenge(&www_auth)?;
        let token = self
            .acquire_token(&challenge, credentials.as_ref())
            .await?;
        self.tokens.lock().await.insert(key, token.clone());

        let retry = self
            .send_once(method, &url, extra_headers, clone_body(&body, &body_bytes), Some(&token), credentials.as_ref())
            .await?;

        if retry.status() == StatusCode::UNAUTHORIZED {
            return Err(RegistryError::Unauthorized(format!(
                "401 after bearer token retry for {url}"
            )));
        }
        Ok(retry)
    }

    async fn send_once(
        &self,
        method: Method,
        url: &str,
        extra_headers: &[(&str, String)],
        body: Option<reqwest::Body>,
        bearer_token: Option<&str>,
        credentials: Option<&(String, String)>,
    ) -> Result<reqwest::Response> {
        let mut req = self
            .client
            .request(method, url)
            .header(reqwest::header::ACCEPT, Self::accept_header());

        for (name, value) in extra_headers {
            req = req.header(*name, value.as_str());
        }

        if let Some(token) = bearer_token {
            req = req.bearer_auth(token);
        } else if let Some((user, pass)) = credentials {
            req = req.basic_auth(user, Some(pass));
        }

        if let Some(body) = body {
            req = req.body(body);
        }

        Ok(req.send().await?)
    }

    async fn acquire_token(
        &self,
        challenge: &AuthChallenge,
        credentials: Option<&(String, String)>,
    ) -> Result<String> {
        let mut req = self.client.get(&challenge.realm).query(&challenge.params);
        if let Some((user, pass)) = credentials {
            req = req.basic_auth(user, Some(pass));
        }
        let response = req.send().await?;
        if response.status() != StatusCode::OK {
            return Err(RegistryError::Unauthorized(format!(
                "token endpoint {} returned {}",
                challenge.realm,
                response.status()
            )));
        }
        let body: serde_json::Value = response.json().await?;
        let token = body
            .get("access_token")
            .or_else(|| body.get("token"))
            .and_then(|v| v.as_str());
        match token {
            Some(t) => Ok(t.to_string()),
            None => Err(RegistryError::Decode(
                "token response carried neither access_token nor token".into(),
            )),
        }
    }
}

fn clone_body(original: &Option<reqwest::Body>, bytes: &Option<Vec<u8>>) -> Option<reqwest::Body> {
    match (original, bytes) {
        (Some(_), Some(b)) => Some(reqwest::Body::from(b.clone())),
        _ => None,
    }
}

/// Parse a `WWW-Authenticate: Bearer realm="...",service="...",scope="..."`
/// header. Respects double-quoted values that themselves contain commas
/// or equals signs — a naive `split(',')` would break on a scope like
/// `repository:a,b:pull`.
fn parse_bearer_challenge(header: &str) -> Result<AuthChallenge> {
    let rest = header.strip_prefix("Bearer ").ok_or_else(|| {
        RegistryError::Decode(format!("unsupported WWW-Authenticate scheme: {header:?}"))
    })?;

    let mut params = HashMap::new();
    let chars: Vec<char> = rest.chars().collect();
    let mut i = 0;
    while i < chars.len() {
        while i < chars.len() && (chars[i] == ',' || chars[i] == ' ') {
            i += 1;
        }
        if i >= chars.len() {
            break;
        }
        let key_start = i;
        while i < chars.len() && chars[i] != '=' {
            i += 1;
        }
        let key: String = chars[key_start..i].iter().collect();
        i += 1; // skip '='
        if i >= chars.len() {
            break;
        }
        let value = if chars[i] == '"' {
            i += 1;
            let value_start = i;
            while i < chars.len() && chars[i] != '"' {
                i += 1;
            }
            let value: String = chars[value_start..i].iter().collect();
            i += 1; // skip closing quote
            value
        } else {
            let value_start = i;
            while i < chars.len() && chars[i] != ',' {
                i += 1;
            }
            chars[value_start..i].iter().collect()
        };
        params.insert(key, value);
    }

    let realm = params
        .remove("realm")
        .ok_or_else(|| RegistryError::Decode("Bearer challenge missing realm".into()))?;

    Ok(AuthChallenge { realm, params })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_simple_challenge() {
        let header = r#"Bearer realm="https://auth.example.com/token",service="registry.example.com""#;
        let c = parse_bearer_challenge(header).unwrap();
        assert_eq!(c.realm, "https://auth.example.com/token");
        assert_eq!(c.params.get("service").unwrap(), "registry.example.com");
    }

    #[test]
    fn respects_quoted_commas_in_scope() {
        let header = r#"Bearer realm="https://auth.example.com/token",service="r.example.com",scope="repository:a,b:pull,push""#;
        let c = parse_bearer_challenge(header).unwrap();
        assert_eq!(c.params.get("scope").unwrap(), "repository:a,b:pull,push");
    }

    #[test]
    fn rejects_non_bearer_scheme() {
        assert!(parse_bearer_challenge("Basic realm=\"x\"").is_err());
    }

    #[test]
    fn missing_realm_is_an_error() {
        let header = r#"Bearer service="registry.example.com""#;
        assert!(parse_bearer_challenge(header).is_err());
    }

    #[test]
    fn auth_key_uses_first_three_path_segments() {
        let key = auth_key("registry.example.com", "v2/library/alpine/manifests/latest");
        assert_eq!(key, ("registry.example.com".to_string(), "v2/library/alpine".to_string()));
    }
}
