//! Typed identifiers for registries, repositories, and manifest/blob refs,
//! plus the Docker reference-grammar parser that turns a CLI-supplied
//! string into a [`Reference`].

use std::fmt;

use crate::error::{RegistryError, Result};

/// A registry host. The `host_alias` exists because credential files key
/// entries by the friendly hostname (`docker.io`) while the actual API
/// endpoint lives elsewhere (`registry-1.docker.io`); credential lookups
/// prefer the alias over the host when both are present.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Registry {
    pub host: String,
    pub port: u16,
    pub scheme: String,
    pub host_alias: Option<String>,
}

impl Registry {
    pub fn new(host: impl Into<String>) -> Self {
        Self {
            host: host.into(),
            port: 443,
            scheme: "https".to_string(),
            host_alias: None,
        }
    }

    pub fn with_alias(mut self, alias: impl Into<String>) -> Self {
        self.host_alias = Some(alias.into());
        self
    }

    /// The default registry substituted for references that name no host:
    /// Docker Hub's real endpoint, aliased to the name credential files use.
    pub fn default_registry() -> Self {
        Registry::new("registry-1.docker.io").with_alias("docker.io")
    }

    /// Base URL of the form `scheme://host:port`.
    pub fn base_url(&self) -> String {
        format!("{}://{}:{}", self.scheme, self.host, self.port)
    }

    /// The hostname credential lookups should use: the alias if set,
    /// otherwise the host itself.
    pub fn credential_host(&self) -> &str {
        self.host_alias.as_deref().unwrap_or(&self.host)
    }
}

impl fmt::Display for Registry {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.host)
    }
}

/// An ordered, non-empty sequence of repository path segments, e.g.
/// `["library", "alpine"]`.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct RepoName(Vec<String>);

impl RepoName {
    pub fn new(segments: Vec<String>) -> Result<Self> {
        if segments.is_empty() || segments.iter().any(|s| s.is_empty()) {
            return Err(RegistryError::Validation(
                "repository name must have at least one non-empty segment".into(),
            ));
        }
        Ok(RepoName(segments))
    }

    pub fn segments(&self) -> &[String] {
        &self.0
    }

    /// Slash-joined form used in URL paths.
    pub fn path(&self) -> String {
        self.0.join("/")
    }
}

impl fmt::Display for RepoName {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.path())
    }
}

/// Which class of object a [`Reference`] names. Only `Blob` has an upload
/// flow; the URL template segment differs between the two.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ObjectKind {
    Blob,
    Manifest,
}

impl ObjectKind {
    fn url_segment(self) -> &'static str {
        match self {
            ObjectKind::Blob => "blobs",
            ObjectKind::Manifest => "manifests",
        }
    }
}

/// A reference to a single blob or manifest on a (possibly implicit)
/// registry. `ref_str` is either a `sha256:`-digest or a tag name.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Reference {
    pub registry: Option<Registry>,
    pub repo: RepoName,
    pub ref_str: String,
    pub kind: ObjectKind,
}

impl Reference {
    pub fn new(
        registry: Option<Registry>,
        repo: RepoName,
        ref_str: impl Into<String>,
        kind: ObjectKind,
    ) -> Self {
        Self {
            registry,
            repo,
            ref_str: ref_str.into(),
            kind,
        }
    }

    /// Returns a copy of this reference with `ref_str` replaced, keeping
    /// registry/repo/kind the same. Used by the copy engine to build child
    /// refs that share the parent's registry and repository.
    pub fn with_ref(&self, ref_str: impl Into<String>) -> Self {
        Self {
            registry: self.registry.clone(),
            repo: self.repo.clone(),
            ref_str: ref_str.into(),
            kind: self.kind,
        }
    }

    pub fn as_manifest(&self) -> Self {
        Self {
            kind: ObjectKind::Manifest,
            ..self.clone()
        }
    }

    pub fn as_blob(&self) -> Self {
        Self {
            kind: ObjectKind::Blob,
            ..self.clone()
        }
    }

    /// `true` if `ref_str` is a `sha256:<64 hex>` digest rather than a tag.
    pub fn is_digest_ref(&self) -> bool {
        is_digest(&self.ref_str)
    }

    /// The registry this reference resolves against, substituting the
    /// process-wide default when none was given in the source string.
    pub fn effective_registry(&self) -> Registry {
        self.registry.clone().unwrap_or_else(Registry::default_registry)
    }

    /// Path component (no leading slash) of this object's URL, e.g.
    /// `v2/library/alpine/manifests/latest`.
    pub fn url_path(&self) -> String {
        format!(
            "v2/{}/{}/{}",
            self.repo.path(),
            self.kind.url_segment(),
            self.ref_str
        )
    }

    /// Path component for initiating a blob upload. Only meaningful when
    /// `kind == ObjectKind::Blob`.
    pub fn upload_init_path(&self) -> String {
        format!("v2/{}/blobs/uploads/", self.repo.path())
    }
}

impl fmt::Display for Reference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let repo = &self.repo;
        match &self.registry {
            Some(r) => write!(f, "{}/{}", r, repo)?,
            None => write!(f, "{}", repo)?,
        }
        if self.is_digest_ref() {
            write!(f, "@{}", self.ref_str)
        } else {
            write!(f, ":{}", self.ref_str)
        }
    }
}

/// `true` if `s` matches `sha256:[0-9a-f]{64}` exactly.
pub fn is_digest(s: &str) -> bool {
    match s.strip_prefix("sha256:") {
        Some(hex) => hex.len() == 64 && hex.chars().all(|c| c.is_ascii_hexdigit()),
        None => false,
    }
}

/// Parse a Docker-grammar reference string: `[registry[:port]/]repo[:tag|@digest]`.
///
/// A registry prefix is recognized when the first `/`-delimited segment
/// contains a `.` or `:`, or is literally `localhost`. When no registry
/// prefix is present the repo is returned with `registry: None` — the
/// caller substitutes the default registry, this function never does.
/// A single-segment repo (`alpine`) is expanded to `library/alpine`. A
/// `@sha256:...` suffix takes precedence over a `:tag` suffix when both
/// are present. A bare repo with neither suffix parses with `ref_str`
/// left unset by the caller's convention — here represented as `"latest"`
/// only when the caller explicitly asks for a manifest default; this
/// parser instead returns `None` for the ref and lets call sites decide.
pub fn parse_image_name(input: &str, kind: ObjectKind) -> Result<Reference> {
    let (registry_part, rest) = split_registry(input);

    let (path_part, ref_part) = split_ref(rest);

    let segments: Vec<String> = path_part.split('/').map(|s| s.to_string()).collect();
    let segments = if segments.len() == 1 {
        vec!["library".to_string(), segments.into_iter().next().unwrap()]
    } else {
        segments
    };
    let repo = RepoName::new(segments)?;

    let registry = match registry_part {
        Some(host_and_port) => Some(parse_registry(host_and_port)),
        None => None,
    };

    let ref_str = ref_part.unwrap_or_else(|| "latest".to_string());

    Ok(Reference::new(registry, repo, ref_str, kind))
}

fn parse_registry(host_and_port: &str) -> Registry {
    if let Some((host, port)) = host_and_port.split_once(':') {
        if let Ok(port) = port.parse::<u16>() {
            return Registry {
                host: host.to_string(),
                port,
                scheme: "https".to_string(),
                host_alias: None,
            };
        }
    }
    Registry::new(host_and_port)
}

/// Split `input` into an optional registry prefix and the remaining
/// `repo[:tag|@digest]` string.
fn split_registry(input: &str) -> (Option<&str>, &str) {
    let first_segment_end = input.find('/');
    let first_segment = match first_segment_end {
        Some(pos) => &input[..pos],
        None => return (None, input),
    };

    let looks_like_registry =
        first_segment.contains('.') || first_segment.contains(':') || first_segment == "localhost";

    if looks_like_registry {
        (Some(first_segment), &input[first_segment_end.unwrap() + 1..])
    } else {
        (None, input)
    }
}

/// Split `repo[:tag|@digest]` (no registry prefix) into the repo path and
/// an optional ref string, preferring a `@sha256:...` digest over a
/// trailing `:tag`.
fn split_ref(rest: &str) -> (&str, Option<String>) {
    if let Some(at_pos) = rest.find('@') {
        let (repo_and_tag, digest) = (&rest[..at_pos], &rest[at_pos + 1..]);
        // A `:tag` may still be attached ahead of the digest (`repo:tag@digest`);
        // digest wins, so the tag is dropped along with its colon.
        let repo = match repo_and_tag.rfind(':') {
            Some(colon_pos) => &repo_and_tag[..colon_pos],
            None => repo_and_tag,
        };
        return (repo, Some(digest.to_string()));
    }

    // A colon inside the path (e.g. a registry port we already split off)
    // can't appear here; any remaining colon separates the tag.
    if let Some(colon_pos) = rest.rfind(':') {
        // Guard against a colon that belongs to a digest-less path like
        // `myrepo` with no tag at all never reaching here without a colon.
        let (repo, tag) = (&rest[..colon_pos], &rest[colon_pos + 1..]);
        return (repo, Some(tag.to_string()));
    }

    (rest, None)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_bare_repo_with_default_registry() {
        let r = parse_image_name("alpine", ObjectKind::Manifest).unwrap();
        assert!(r.registry.is_none());
        assert_eq!(r.repo.segments(), &["library", "alpine"]);
        assert_eq!(r.ref_str, "latest");
    }

    #[test]
    fn parses_multi_segment_repo_without_registry() {
        let r = parse_image_name("library/alpine:3.18", ObjectKind::Manifest).unwrap();
        assert!(r.registry.is_none());
        assert_eq!(r.repo.segments(), &["library", "alpine"]);
        assert_eq!(r.ref_str, "3.18");
    }

    #[test]
    fn digest_takes_precedence_over_tag() {
        let digest = "sha256:".to_string() + &"a".repeat(64);
        let input = format!("gcr.io/foo/bar:1.2@{digest}");
        let r = parse_image_name(&input, ObjectKind::Manifest).unwrap();
        assert_eq!(r.registry.as_ref().unwrap().host, "gcr.io");
        assert_eq!(r.repo.segments(), &["foo", "bar"]);
        assert_eq!(r.ref_str, digest);
        assert!(r.is_digest_ref());
    }

    #[test]
    fn recognizes_localhost_and_port_as_registry() {
        let r = parse_image_name("localhost:5000/myrepo:dev", ObjectKind::Manifest).unwrap();
        let reg = r.registry.unwrap();
        assert_eq!(reg.host, "localhost");
        assert_eq!(reg.port, 5000);
        assert_eq!(r.repo.segments(), &["myrepo"]);
        assert_eq!(r.ref_str, "dev");
    }

    #[test]
    fn url_paths_match_templates() {
        let r = parse_image_name("library/alpine:latest", ObjectKind::Manifest).unwrap();
        assert_eq!(r.url_path(), "v2/library/alpine/manifests/latest");
        let b = r.as_blob().with_ref("sha256:".to_string() + &"0".repeat(64));
        assert_eq!(
            b.url_path(),
            format!("v2/library/alpine/blobs/sha256:{}", "0".repeat(64))
        );
        assert_eq!(b.upload_init_path(), "v2/library/alpine/blobs/uploads/");
    }

    #[test]
    fn is_digest_matches_only_well_formed_digests() {
        assert!(is_digest(&("sha256:".to_string() + &"a".repeat(64))));
        assert!(!is_digest("sha256:abc"));
        assert!(!is_digest("latest"));
    }
}
