//! Polymorphic manifest decoding, dependency extraction, and canonical
//! serialization.
//!
//! A [`Manifest`] wraps one of three variants ([`ManifestList`],
//! [`ImageManifest`], [`ManifestV1`]) behind a static media-type table
//! rather than runtime subclass registration — manifests never form
//! cycles, so a plain tree of owned children (dependency lists hold
//! digest strings, not manifest objects) is all the fan-out in the copy
//! engine needs.

use std::collections::BTreeMap;
use std::sync::OnceLock;

use serde::{Deserialize, Serialize};
use sha2::{Digest as _, Sha256};

use crate::error::{RegistryError, Result};

pub const MEDIA_TYPE_MANIFEST_LIST_DOCKER: &str =
    "application/vnd.docker.distribution.manifest.list.v2+json";
pub const MEDIA_TYPE_MANIFEST_LIST_OCI: &str = "application/vnd.oci.image.index.v1+json";
pub const MEDIA_TYPE_IMAGE_MANIFEST_DOCKER: &str =
    "application/vnd.docker.distribution.manifest.v2+json";
pub const MEDIA_TYPE_IMAGE_MANIFEST_OCI: &str = "application/vnd.oci.image.manifest.v1+json";
pub const MEDIA_TYPE_V1: &str = "application/vnd.docker.distribution.manifest.v1+json";
pub const MEDIA_TYPE_V1_SIGNED: &str = "application/vnd.docker.distribution.manifest.v1+prettyjws";

/// Every manifest media type this client recognizes, in the order used to
/// build the `Accept` header the transport sends on every request.
pub const KNOWN_MEDIA_TYPES: &[&str] = &[
    MEDIA_TYPE_MANIFEST_LIST_DOCKER,
    MEDIA_TYPE_MANIFEST_LIST_OCI,
    MEDIA_TYPE_IMAGE_MANIFEST_DOCKER,
    MEDIA_TYPE_IMAGE_MANIFEST_OCI,
    MEDIA_TYPE_V1,
    MEDIA_TYPE_V1_SIGNED,
];

/// Generic content-addressed pointer used throughout the manifest types.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Descriptor {
    #[serde(rename = "mediaType")]
    pub media_type: String,
    pub size: i64,
    pub digest: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Platform {
    pub architecture: String,
    pub os: String,
    #[serde(rename = "os.version", default, skip_serializing_if = "String::is_empty")]
    pub os_version: String,
    #[serde(rename = "os.features", default, skip_serializing_if = "Vec::is_empty")]
    pub os_features: Vec<String>,
    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub variant: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub features: Vec<String>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestListItem {
    #[serde(rename = "mediaType")]
    pub media_type: String,
    pub size: i64,
    pub digest: String,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub urls: Vec<String>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
    pub platform: Platform,
}

/// A manifest list / image index: references other manifests by digest.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestList {
    #[serde(rename = "schemaVersion")]
    pub schema_version: u32,
    #[serde(rename = "mediaType")]
    pub media_type: String,
    pub manifests: Vec<ManifestListItem>,
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub annotations: BTreeMap<String, String>,
}

/// A single image manifest: one config blob plus an ordered layer list.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ImageManifest {
    #[serde(rename = "schemaVersion")]
    pub schema_version: u32,
    #[serde(rename = "mediaType")]
    pub media_type: String,
    pub config: Descriptor,
    pub layers: Vec<Descriptor>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct FsLayer {
    #[serde(rename = "blobSum")]
    pub blob_sum: String,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HistoryEntry {
    #[serde(rename = "v1Compatibility")]
    pub v1_compatibility: String,
}

/// Legacy schema-1 manifest. No upload path creates one; it may only be
/// encountered on read. Signatures, if present in the wire payload, are
/// silently dropped by `serde`'s default "ignore unknown fields" behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ManifestV1 {
    pub name: String,
    pub tag: String,
    pub architecture: String,
    #[serde(rename = "fsLayers")]
    pub fs_layers: Vec<FsLayer>,
    pub history: Vec<HistoryEntry>,
    #[serde(rename = "schemaVersion")]
    pub schema_version: u32,
}

#[derive(Debug, Clone)]
enum ManifestVariant {
    List(ManifestList),
    Image(ImageManifest),
    V1(ManifestV1),
}

/// A decoded manifest of any supported media type, with its canonical
/// byte form and digest computed lazily and memoized for the life of the
/// instance.
#[derive(Debug)]
pub struct Manifest {
    variant: ManifestVariant,
    digest_cache: OnceLock<String>,
}

impl Clone for Manifest {
    fn clone(&self) -> Self {
        Self {
            variant: self.variant.clone(),
            digest_cache: OnceLock::new(),
        }
    }
}

impl Manifest {
    fn from_variant(variant: ManifestVariant) -> Self {
        Self {
            variant,
            digest_cache: OnceLock::new(),
        }
    }

    /// Decode `body` using `media_type_hint` (typically the response's
    /// `Content-Type`, with any `; charset=...` parameter stripped) to
    /// select the variant. When no hint is given the document must
    /// declare its own `mediaType`; legacy V1 manifests have none and so
    /// can only be decoded via an explicit hint.
    pub fn decode(body: &[u8], media_type_hint: Option<&str>) -> Result<Self> {
        let media_type = match media_type_hint {
            Some(hint) => hint.to_string(),
            None => {
                let value: serde_json::Value = serde_json::from_slice(body)?;
                value
                    .get("mediaType")
                    .and_then(|v| v.as_str())
                    .map(|s| s.to_string())
                    .ok_or_else(|| {
                        RegistryError::Decode(
                            "document has no mediaType and none was given".into(),
                        )
                    })?
            }
        };

        match media_type.as_str() {
            MEDIA_TYPE_MANIFEST_LIST_DOCKER | MEDIA_TYPE_MANIFEST_LIST_OCI => {
                let m: ManifestList = serde_json::from_slice(body)?;
                if m.schema_version != 2 {
                    return Err(RegistryError::Decode(format!(
                        "manifest list has foreign schemaVersion {}",
                        m.schema_version
                    )));
                }
                Ok(Self::from_variant(ManifestVariant::List(m)))
            }
            MEDIA_TYPE_IMAGE_MANIFEST_DOCKER | MEDIA_TYPE_IMAGE_MANIFEST_OCI => {
                let m: ImageManifest = serde_json::from_slice(body)?;
                if m.schema_version != 2 {
                    return Err(RegistryError::Decode(format!(
                        "image manifest has foreign schemaVersion {}",
                        m.schema_version
                    )));
                }
                Ok(Self::from_variant(ManifestVariant::Image(m)))
            }
            MEDIA_TYPE_V1 | MEDIA_TYPE_V1_SIGNED => {
                let m: ManifestV1 = serde_json::from_slice(body)?;
                if m.schema_version != 1 {
                    return Err(RegistryError::Decode(format!(
                        "v1 manifest has foreign schemaVersion {}",
                        m.schema_version
                    )));
                }
                Ok(Self::from_variant(ManifestVariant::V1(m)))
            }
            other => Err(RegistryError::Decode(format!(
                "unknown manifest media type {other:?}"
            ))),
        }
    }

    /// The media type of this manifest. V1 manifests carry no `mediaType`
    /// field on the wire, so this reports the constant for that variant.
    pub fn media_type(&self) -> &str {
        match &self.variant {
            ManifestVariant::List(m) => &m.media_type,
            ManifestVariant::Image(m) => &m.media_type,
            ManifestVariant::V1(_) => MEDIA_TYPE_V1,
        }
    }

    /// Digests of child manifests this manifest references, in document
    /// order. Empty except for the list variant.
    pub fn manifest_dependencies(&self) -> Vec<String> {
        match &self.variant {
            ManifestVariant::List(m) => m.manifests.iter().map(|i| i.digest.clone()).collect(),
            _ => Vec::new(),
        }
    }

    /// Digests of blobs this manifest references, in document order
    /// (layers before config, matching the wire field order). Empty for
    /// the list variant.
    pub fn blob_dependencies(&self) -> Vec<String> {
        match &self.variant {
            ManifestVariant::Image(m) => {
                let mut deps: Vec<String> = m.layers.iter().map(|l| l.digest.clone()).collect();
                deps.push(m.config.digest.clone());
                deps
            }
            ManifestVariant::V1(m) => m.fs_layers.iter().map(|l| l.blob_sum.clone()).collect(),
            ManifestVariant::List(_) => Vec::new(),
        }
    }

    pub fn as_list(&self) -> Option<&ManifestList> {
        match &self.variant {
            ManifestVariant::List(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_image(&self) -> Option<&ImageManifest> {
        match &self.variant {
            ManifestVariant::Image(m) => Some(m),
            _ => None,
        }
    }

    pub fn as_v1(&self) -> Option<&ManifestV1> {
        match &self.variant {
            ManifestVariant::V1(m) => Some(m),
            _ => None,
        }
    }

    /// Canonical byte representation used for digest computation and for
    /// outbound manifest PUTs.
    ///
    /// For media types beginning `application/vnd.docker.`: JSON with
    /// 3-space indentation, `": "` key/value separator, field order as
    /// declared on the Rust struct (which mirrors the wire schema),
    /// produced by serializing the typed struct directly through a
    /// `serde_json` pretty formatter so declaration order survives.
    ///
    /// For every other media type: JSON with lexicographically sorted
    /// keys and no whitespace. This relies on `serde_json::Value`'s map
    /// type being a `BTreeMap` (the crate's default when the
    /// `preserve_order` feature is not enabled, which it isn't here) —
    /// round-tripping through `Value` sorts keys for free.
    pub fn canonical(&self) -> Result<Vec<u8>> {
        if self.media_type().starts_with("application/vnd.docker.") {
            let formatter = serde_json::ser::PrettyFormatter::with_indent(b"   ");
            let mut buf = Vec::new();
            let mut ser = serde_json::Serializer::with_formatter(&mut buf, formatter);
            match &self.variant {
                ManifestVariant::List(m) => serde::Serialize::serialize(m, &mut ser)
                    .map_err(RegistryError::from)?,
                ManifestVariant::Image(m) => serde::Serialize::serialize(m, &mut ser)
                    .map_err(RegistryError::from)?,
                ManifestVariant::V1(m) => serde::Serialize::serialize(m, &mut ser)
                    .map_err(RegistryError::from)?,
            };
            Ok(buf)
        } else {
            let value = match &self.variant {
                ManifestVariant::List(m) => serde_json::to_value(m)?,
                ManifestVariant::Image(m) => serde_json::to_value(m)?,
                ManifestVariant::V1(m) => serde_json::to_value(m)?,
            };
            Ok(serde_json::to_vec(&value)?)
        }
    }

    /// `sha256:` followed by the hex digest of [`Self::canonical`],
    /// memoized after the first call. Note the server's own reported
    /// digest (`Docker-Content-Digest`) may disagree with this value
    /// because different canonicalizers exist in the wild; tag
    /// resolution trusts the server's digest, and only outbound manifest
    /// PUTs use this locally-computed one.
    pub fn digest(&self) -> Result<String> {
        if let Some(cached) = self.digest_cache.get() {
            return Ok(cached.clone());
        }
        let bytes = self.canonical()?;
        let mut hasher = Sha256::new();
        hasher.update(&bytes);
        let digest = format!("sha256:{:x}", hasher.finalize());
        let _ = self.digest_cache.set(digest.clone());
        Ok(digest)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn sample_image_manifest_json() -> &'static str {
        r#"{
            "schemaVersion": 2,
            "mediaType": "application/vnd.docker.distribution.manifest.v2+json",
            "config": {
                "mediaType": "application/vnd.docker.container.image.v1+json",
                "size": 1234,
                "digest": "sha256:aaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaaa"
            },
            "layers": [
                {
                    "mediaType": "application/vnd.docker.image.rootfs.diff.tar.gzip",
                    "size": 42,
                    "digest": "sha256:bbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbbb"
                }
            ]
        }"#
    }

    fn sample_oci_index_json() -> &'static str {
        r#"{
            "schemaVersion": 2,
            "mediaType": "application/vnd.oci.image.index.v1+json",
            "manifests": [
                {
                    "mediaType": "application/vnd.oci.image.manifest.v1+json",
                    "size": 7143,
                    "digest": "sha256:cccccccccccccccccccccccccccccccccccccccccccccccccccccccccccccc",
                    "platform": { "architecture": "amd64", "os": "linux" }
                }
            ]
        }"#
    }

    #[test]
    fn decodes_image_manifest_with_hint() {
        let body = sample_image_manifest_json().as_bytes();
        let m = Manifest::decode(
            body,
            Some("application/vnd.docker.distribution.manifest.v2+json"),
        )
        .unwrap();
        assert_eq!(m.blob_dependencies().len(), 2);
        assert!(m.manifest_dependencies().is_empty());
    }

    #[test]
    fn decodes_using_declared_media_type_when_no_hint() {
        let body = sample_oci_index_json().as_bytes();
        let m = Manifest::decode(body, None).unwrap();
        assert_eq!(m.manifest_dependencies().len(), 1);
        assert!(m.blob_dependencies().is_empty());
    }

    #[test]
    fn unknown_media_type_fails() {
        let body = br#"{"mediaType":"application/x-nonsense","schemaVersion":2}"#;
        assert!(Manifest::decode(body, None).is_err());
    }

    #[test]
    fn missing_media_type_with_no_hint_fails() {
        let body = br#"{"schemaVersion":2}"#;
        assert!(Manifest::decode(body, None).is_err());
    }

    #[test]
    fn docker_media_type_canonical_form_uses_three_space_pretty_printing() {
        let body = sample_image_manifest_json().as_bytes();
        let m = Manifest::decode(
            body,
            Some("application/vnd.docker.distribution.manifest.v2+json"),
        )
        .unwrap();
        let canonical = String::from_utf8(m.canonical().unwrap()).unwrap();
        assert!(canonical.contains("\n   \""));
        assert!(canonical.contains("\": "));
    }

    #[test]
    fn oci_media_type_canonical_form_is_compact_and_sorted() {
        let body = sample_oci_index_json().as_bytes();
        let m = Manifest::decode(body, None).unwrap();
        let canonical = String::from_utf8(m.canonical().unwrap()).unwrap();
        assert!(!canonical.contains('\n'));
        assert!(canonical.contains("\"manifests\""));
        // `manifests` precedes `mediaType`/`schemaVersion` alphabetically.
        let manifests_pos = canonical.find("\"manifests\"").unwrap();
        let schema_pos = canonical.find("\"schemaVersion\"").unwrap();
        assert!(manifests_pos < schema_pos);
    }

    #[test]
    fn digest_round_trips_and_is_memoized() {
        let body = sample_image_manifest_json().as_bytes();
        let m = Manifest::decode(
            body,
            Some("application/vnd.docker.distribution.manifest.v2+json"),
        )
        .unwrap();
        let canonical = m.canonical().unwrap();
        let mut hasher = Sha256::new();
        hasher.update(&canonical);
        let expected = format!("sha256:{:x}", hasher.finalize());
        assert_eq!(m.digest().unwrap(), expected);
        // second call hits the memoized value and must still match
        assert_eq!(m.digest().unwrap(), expected);
    }

    #[test]
    fn v1_manifest_decodes_and_ignores_signatures() {
        let body = br#"{
            "name": "library/alpine",
            "tag": "latest",
            "architecture": "amd64",
            "fsLayers": [{"blobSum": "sha256:dddddddddddddddddddddddddddddddddddddddddddddddddddddddddddddddd"}],
            "history": [{"v1Compatibility": "{}"}],
            "schemaVersion": 1,
            "signatures": [{"header": {}, "signature": "xyz"}]
        }"#;
        let m = Manifest::decode(body, Some(MEDIA_TYPE_V1)).unwrap();
        assert_eq!(m.blob_dependencies(), vec!["sha256:dddddddddddddddddddddddddddddddddddddddddddddddddddddddddddddddd"]);
        assert_eq!(m.media_type(), MEDIA_TYPE_V1);
    }
}
