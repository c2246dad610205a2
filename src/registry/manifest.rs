//! Manifest models and the schema-v1/schema-v2 merge
//!
//! A tag is fetched twice: once with the legacy schema-v1 Accept header (which
//! still carries the image history) and once as schema v2 (which carries the
//! real digest, config and layer sizes). [`TagDetail::merge`] folds whichever
//! responses succeeded into one view.

use crate::digest::DigestUtils;
use crate::error::{RegistryError, Result};
use serde::{Deserialize, Serialize};
use serde_json::Value;

pub const MEDIA_TYPE_MANIFEST_V1: &str = "application/vnd.docker.distribution.manifest.v1+json";
pub const MEDIA_TYPE_MANIFEST_V1_SIGNED: &str =
    "application/vnd.docker.distribution.manifest.v1+prettyjws";
const ACCEPT_V1: &str = "application/vnd.docker.distribution.manifest.v1+prettyjws, \
     application/vnd.docker.distribution.manifest.v1+json";
pub const MEDIA_TYPE_MANIFEST_V2: &str = "application/vnd.docker.distribution.manifest.v2+json";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ManifestSchema {
    V1,
    V2,
}

impl ManifestSchema {
    pub fn accept_header(&self) -> &'static str {
        match self {
            ManifestSchema::V1 => ACCEPT_V1,
            ManifestSchema::V2 => MEDIA_TYPE_MANIFEST_V2,
        }
    }
}

/// Raw manifest GET response
#[derive(Debug, Clone)]
pub struct ManifestResponse {
    pub body: Vec<u8>,
    /// `Docker-Content-Digest` header, when the registry sent one
    pub digest: Option<String>,
    pub content_type: Option<String>,
}

impl ManifestResponse {
    pub fn new(body: Vec<u8>, digest: Option<String>) -> Self {
        Self {
            body,
            digest,
            content_type: None,
        }
    }

    /// Registry-reported digest, or the digest of the exact bytes received
    pub fn digest(&self) -> String {
        self.digest
            .clone()
            .filter(|d| !d.is_empty())
            .unwrap_or_else(|| DigestUtils::compute_docker_digest(&self.body))
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    #[serde(default)]
    pub media_type: String,
    #[serde(default)]
    pub size: u64,
    pub digest: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestV2 {
    pub schema_version: u32,
    #[serde(default)]
    pub media_type: Option<String>,
    #[serde(default)]
    pub config: Option<Descriptor>,
    #[serde(default)]
    pub layers: Vec<Descriptor>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct FsLayer {
    pub blob_sum: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct V1History {
    pub v1_compatibility: String,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestV1 {
    pub schema_version: u32,
    #[serde(default)]
    pub name: Option<String>,
    #[serde(default)]
    pub tag: Option<String>,
    #[serde(default)]
    pub architecture: Option<String>,
    #[serde(default)]
    pub fs_layers: Vec<FsLayer>,
    #[serde(default)]
    pub history: Vec<V1History>,
}

/// Image config embedded (as a JSON string) in each schema-v1 history entry
#[derive(Debug, Clone, Default, Deserialize)]
struct V1Compatibility {
    #[serde(default)]
    id: Option<String>,
    #[serde(default)]
    created: Option<String>,
    #[serde(default)]
    os: Option<String>,
    #[serde(default)]
    architecture: Option<String>,
    #[serde(default, rename = "Size")]
    size: Option<u64>,
    #[serde(default)]
    container_config: Option<ContainerConfig>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ContainerConfig {
    #[serde(default, rename = "Cmd")]
    cmd: Option<Vec<String>>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HistoryEntry {
    pub id: Option<String>,
    pub created: Option<String>,
    pub created_by: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LayerInfo {
    pub digest: String,
    pub size: u64,
    pub media_type: Option<String>,
}

/// A successfully fetched and parsed schema-v1 manifest
#[derive(Debug, Clone)]
pub struct ResolvedV1 {
    pub manifest: ManifestV1,
    pub digest: String,
}

impl ResolvedV1 {
    pub fn from_response(response: &ManifestResponse) -> Result<Self> {
        let manifest: ManifestV1 = serde_json::from_slice(&response.body)
            .map_err(|e| RegistryError::Parse(format!("invalid schema v1 manifest: {}", e)))?;
        if manifest.schema_version != 1 {
            return Err(RegistryError::Parse(format!(
                "expected a schema v1 manifest, got schemaVersion {}",
                manifest.schema_version
            )));
        }
        Ok(Self {
            manifest,
            digest: response.digest(),
        })
    }

    fn compatibility(&self) -> Vec<V1Compatibility> {
        self.manifest
            .history
            .iter()
            .map(|h| serde_json::from_str(&h.v1_compatibility).unwrap_or_default())
            .collect()
    }
}

/// A successfully fetched and parsed schema-v2 manifest, with its raw JSON
#[derive(Debug, Clone)]
pub struct ResolvedV2 {
    pub manifest: ManifestV2,
    pub raw: Value,
    pub digest: String,
}

impl ResolvedV2 {
    pub fn from_response(response: &ManifestResponse) -> Result<Self> {
        let raw: Value = serde_json::from_slice(&response.body)
            .map_err(|e| RegistryError::Parse(format!("invalid schema v2 manifest: {}", e)))?;
        let manifest: ManifestV2 = serde_json::from_value(raw.clone())
            .map_err(|e| RegistryError::Parse(format!("invalid schema v2 manifest: {}", e)))?;
        if manifest.schema_version != 2 {
            return Err(RegistryError::Parse(format!(
                "expected a schema v2 manifest, got schemaVersion {}",
                manifest.schema_version
            )));
        }
        Ok(Self {
            manifest,
            raw,
            digest: response.digest(),
        })
    }
}

/// Which schema fetches contributed to a [`TagDetail`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct ManifestSources {
    pub v1: bool,
    pub v2: bool,
}

/// Merged, read-only view of one tag
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct TagDetail {
    pub name: String,
    pub manifest_digest: String,
    /// Config digest
    pub image_id: Option<String>,
    pub os: Option<String>,
    pub architecture: Option<String>,
    pub size: u64,
    pub layers: Vec<LayerInfo>,
    pub history: Vec<HistoryEntry>,
    pub manifest_v2: Option<Value>,
    pub sources: ManifestSources,
}

impl TagDetail {
    /// Fold the schema responses that succeeded into one view.
    ///
    /// Schema v2 decides digest, size, layers and config; schema v1 supplies
    /// the tag name, history, os and architecture. Returns `None` when
    /// neither response is available.
    pub fn merge(requested: &str, v1: Option<&ResolvedV1>, v2: Option<&ResolvedV2>) -> Option<Self> {
        if v1.is_none() && v2.is_none() {
            return None;
        }

        let compat = v1.map(|r| r.compatibility()).unwrap_or_default();
        let newest = compat.first();

        let name = v1
            .and_then(|r| r.manifest.tag.clone())
            .filter(|t| !t.is_empty())
            .unwrap_or_else(|| requested.to_string());

        let os = newest.and_then(|c| c.os.clone());
        let architecture = v1
            .and_then(|r| r.manifest.architecture.clone())
            .or_else(|| newest.and_then(|c| c.architecture.clone()));

        let history = compat
            .iter()
            .map(|c| HistoryEntry {
                id: c.id.clone(),
                created: c.created.clone(),
                created_by: c
                    .container_config
                    .as_ref()
                    .and_then(|cc| cc.cmd.as_ref())
                    .map(|cmd| cmd.join(" ")),
            })
            .collect();

        let detail = match (v1, v2) {
            (_, Some(v2)) => {
                let layers: Vec<LayerInfo> = v2
                    .manifest
                    .layers
                    .iter()
                    .map(|l| LayerInfo {
                        digest: l.digest.clone(),
                        size: l.size,
                        media_type: Some(l.media_type.clone()).filter(|m| !m.is_empty()),
                    })
                    .collect();
                TagDetail {
                    name,
                    manifest_digest: v2.digest.clone(),
                    image_id: v2.manifest.config.as_ref().map(|c| c.digest.clone()),
                    os,
                    architecture,
                    size: layers.iter().map(|l| l.size).sum(),
                    layers,
                    history,
                    manifest_v2: Some(v2.raw.clone()),
                    sources: ManifestSources {
                        v1: v1.is_some(),
                        v2: true,
                    },
                }
            }
            (Some(v1), None) => {
                // fsLayers and history both run newest first and pair up
                let layers = v1
                    .manifest
                    .fs_layers
                    .iter()
                    .enumerate()
                    .map(|(i, l)| LayerInfo {
                        digest: l.blob_sum.clone(),
                        size: compat.get(i).and_then(|c| c.size).unwrap_or(0),
                        media_type: None,
                    })
                    .collect::<Vec<_>>();
                TagDetail {
                    name,
                    manifest_digest: v1.digest.clone(),
                    image_id: newest.and_then(|c| c.id.clone()),
                    os,
                    architecture,
                    size: layers.iter().map(|l| l.size).sum(),
                    layers,
                    history,
                    manifest_v2: None,
                    sources: ManifestSources {
                        v1: true,
                        v2: false,
                    },
                }
            }
            (None, None) => return None,
        };

        Some(detail)
    }
}

/// Short form of a tag, the unit of batch operations
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Tag {
    pub name: String,
    pub config_digest: Option<String>,
    pub manifest_digest: String,
    pub raw_manifest: Value,
}

impl Tag {
    pub fn from_v2(name: &str, resolved: ResolvedV2) -> Self {
        Self {
            name: name.to_string(),
            config_digest: resolved.manifest.config.map(|c| c.digest),
            manifest_digest: resolved.digest,
            raw_manifest: resolved.raw,
        }
    }

    /// Recreate this tag's manifest under `name`
    pub fn push_as(&self, name: &str) -> TagPush {
        TagPush {
            name: name.to_string(),
            manifest: self.raw_manifest.clone(),
        }
    }
}

/// A manifest to PUT under a tag name
#[derive(Debug, Clone, PartialEq)]
pub struct TagPush {
    pub name: String,
    pub manifest: Value,
}

impl TagPush {
    pub fn new(name: impl Into<String>, manifest: Value) -> Self {
        Self {
            name: name.into(),
            manifest,
        }
    }

    /// Manifest body ready to send: any `digest` field carried over from a
    /// previous resolution is removed.
    pub fn body(&self) -> Value {
        strip_digest(self.manifest.clone())
    }

    pub fn content_type(&self) -> &str {
        self.manifest
            .get("mediaType")
            .and_then(Value::as_str)
            .unwrap_or(MEDIA_TYPE_MANIFEST_V2)
    }
}

/// Remove the top-level `digest` field from a manifest body
pub fn strip_digest(mut manifest: Value) -> Value {
    if let Some(object) = manifest.as_object_mut() {
        object.remove("digest");
    }
    manifest
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn v1_response(tag: Option<&str>, digest: &str) -> ManifestResponse {
        let mut body = json!({
            "schemaVersion": 1,
            "name": "team/api",
            "architecture": "amd64",
            "fsLayers": [
                { "blobSum": "sha256:top" },
                { "blobSum": "sha256:base" }
            ],
            "history": [
                { "v1Compatibility": json!({
                    "id": "top-id",
                    "created": "2024-03-01T10:00:00Z",
                    "os": "linux",
                    "Size": 120,
                    "container_config": { "Cmd": ["/bin/sh", "-c", "#(nop) CMD [\"serve\"]"] }
                }).to_string() },
                { "v1Compatibility": json!({
                    "id": "base-id",
                    "created": "2024-02-01T10:00:00Z",
                    "Size": 3000,
                    "container_config": { "Cmd": null }
                }).to_string() }
            ]
        });
        if let Some(tag) = tag {
            body["tag"] = json!(tag);
        }
        ManifestResponse::new(serde_json::to_vec(&body).unwrap(), Some(digest.to_string()))
    }

    fn v2_response(digest: Option<&str>) -> ManifestResponse {
        let body = json!({
            "schemaVersion": 2,
            "mediaType": MEDIA_TYPE_MANIFEST_V2,
            "config": { "mediaType": "application/vnd.docker.container.image.v1+json", "size": 1400, "digest": "sha256:config" },
            "layers": [
                { "mediaType": "application/vnd.docker.image.rootfs.diff.tar.gzip", "size": 3000, "digest": "sha256:base" },
                { "mediaType": "application/vnd.docker.image.rootfs.diff.tar.gzip", "size": 120, "digest": "sha256:top" }
            ]
        });
        ManifestResponse::new(serde_json::to_vec(&body).unwrap(), digest.map(str::to_string))
    }

    #[test]
    fn test_merge_prefers_v2_digest() {
        let v1 = ResolvedV1::from_response(&v1_response(Some("1.0"), "sha256:aaaa")).unwrap();
        let v2 = ResolvedV2::from_response(&v2_response(Some("sha256:bbbb"))).unwrap();

        let detail = TagDetail::merge("1.0", Some(&v1), Some(&v2)).unwrap();
        assert_eq!(detail.manifest_digest, "sha256:bbbb");
        assert_eq!(detail.image_id.as_deref(), Some("sha256:config"));
        assert_eq!(detail.size, 3120);
        assert_eq!(detail.os.as_deref(), Some("linux"));
        assert_eq!(detail.architecture.as_deref(), Some("amd64"));
        assert_eq!(detail.history.len(), 2);
        assert_eq!(
            detail.history[0].created_by.as_deref(),
            Some("/bin/sh -c #(nop) CMD [\"serve\"]")
        );
        assert_eq!(detail.history[1].created_by, None);
        assert!(detail.sources.v1 && detail.sources.v2);
    }

    #[test]
    fn test_merge_v1_only_uses_v1_digest() {
        let v1 = ResolvedV1::from_response(&v1_response(Some("1.0"), "sha256:aaaa")).unwrap();

        let detail = TagDetail::merge("1.0", Some(&v1), None).unwrap();
        assert_eq!(detail.manifest_digest, "sha256:aaaa");
        assert_eq!(detail.manifest_v2, None);
        assert_eq!(detail.size, 3120);
        assert_eq!(detail.layers[0].digest, "sha256:top");
        assert_eq!(detail.image_id.as_deref(), Some("top-id"));
    }

    #[test]
    fn test_merge_v2_only_falls_back_to_requested_name() {
        let v2 = ResolvedV2::from_response(&v2_response(Some("sha256:bbbb"))).unwrap();

        let detail = TagDetail::merge("edge", None, Some(&v2)).unwrap();
        assert_eq!(detail.name, "edge");
        assert_eq!(detail.manifest_digest, "sha256:bbbb");
        assert!(detail.history.is_empty());
        assert_eq!(detail.os, None);
    }

    #[test]
    fn test_merge_name_falls_back_when_v1_omits_tag() {
        let v1 = ResolvedV1::from_response(&v1_response(None, "sha256:aaaa")).unwrap();
        let detail = TagDetail::merge("requested", Some(&v1), None).unwrap();
        assert_eq!(detail.name, "requested");
    }

    #[test]
    fn test_schema_mismatch_is_rejected() {
        let v1_body = v1_response(Some("1.0"), "sha256:aaaa");
        assert!(matches!(ResolvedV2::from_response(&v1_body), Err(RegistryError::Parse(_))));

        let v2_body = v2_response(Some("sha256:bbbb"));
        assert!(matches!(ResolvedV1::from_response(&v2_body), Err(RegistryError::Parse(_))));
    }

    #[test]
    fn test_merge_keeps_v1_layers_when_v2_answer_is_legacy() {
        // Legacy-only image: the v2 request is answered with the v1 body
        let v1 = ResolvedV1::from_response(&v1_response(Some("1.0"), "sha256:aaaa")).unwrap();
        let v2 = ResolvedV2::from_response(&v1_response(Some("1.0"), "sha256:aaaa")).ok();

        let detail = TagDetail::merge("1.0", Some(&v1), v2.as_ref()).unwrap();
        assert!(!detail.sources.v2);
        assert_eq!(detail.layers.len(), 2);
        assert_eq!(detail.size, 3120);
    }

    #[test]
    fn test_merge_nothing() {
        assert_eq!(TagDetail::merge("x", None, None), None);
    }

    #[test]
    fn test_digest_computed_when_header_missing() {
        let response = v2_response(None);
        let resolved = ResolvedV2::from_response(&response).unwrap();
        assert_eq!(resolved.digest, DigestUtils::compute_docker_digest(&response.body));
    }

    #[test]
    fn test_tag_push_strips_digest() {
        let push = TagPush::new(
            "v2",
            json!({ "schemaVersion": 2, "mediaType": MEDIA_TYPE_MANIFEST_V2, "digest": "sha256:old", "layers": [] }),
        );
        let body = push.body();
        assert!(body.get("digest").is_none());
        assert_eq!(body["schemaVersion"], 2);
        assert_eq!(push.content_type(), MEDIA_TYPE_MANIFEST_V2);
        assert!(push.manifest.get("digest").is_some());
    }

    #[test]
    fn test_short_tag_from_v2() {
        let resolved = ResolvedV2::from_response(&v2_response(Some("sha256:bbbb"))).unwrap();
        let tag = Tag::from_v2("1.0", resolved);
        assert_eq!(tag.config_digest.as_deref(), Some("sha256:config"));
        assert_eq!(tag.manifest_digest, "sha256:bbbb");
        assert_eq!(tag.push_as("1.1").name, "1.1");
    }
}
