//! Registry manifest documents
//!
//! Covers the Docker v2 schema 2 manifest and manifest list, plus their OCI
//! counterparts. A response body is classified by its `mediaType` before it
//! is decoded; when the field is missing the document shape decides.

use serde::de::IgnoredAny;
use serde::{Deserialize, Serialize};

use crate::error::handlers::truncate_body;
use crate::error::{PullError, Result};

pub const DOCKER_MANIFEST_V2: &str = "application/vnd.docker.distribution.manifest.v2+json";
pub const DOCKER_MANIFEST_LIST: &str = "application/vnd.docker.distribution.manifest.list.v2+json";
pub const OCI_MANIFEST: &str = "application/vnd.oci.image.manifest.v1+json";
pub const OCI_INDEX: &str = "application/vnd.oci.image.index.v1+json";

pub const DOCKER_LAYER_GZIP: &str = "application/vnd.docker.image.rootfs.diff.tar.gzip";
pub const DOCKER_LAYER_FOREIGN_GZIP: &str =
    "application/vnd.docker.image.rootfs.foreign.diff.tar.gzip";
pub const DOCKER_LAYER_TAR: &str = "application/vnd.docker.image.rootfs.diff.tar";
pub const OCI_LAYER_GZIP: &str = "application/vnd.oci.image.layer.v1.tar+gzip";
pub const OCI_LAYER_TAR: &str = "application/vnd.oci.image.layer.v1.tar";
pub const OCI_LAYER_NONDIST_GZIP: &str =
    "application/vnd.oci.image.layer.nondistributable.v1.tar+gzip";
pub const OCI_LAYER_NONDIST_TAR: &str = "application/vnd.oci.image.layer.nondistributable.v1.tar";

/// Accept header for the first manifest request: lists and single manifests
pub const ACCEPT_ANY_MANIFEST: &str = "application/vnd.docker.distribution.manifest.list.v2+json, \
     application/vnd.docker.distribution.manifest.v2+json, \
     application/vnd.oci.image.index.v1+json, \
     application/vnd.oci.image.manifest.v1+json";

/// Accept header when re-fetching a platform manifest by digest
pub const ACCEPT_SINGLE_MANIFEST: &str = "application/vnd.docker.distribution.manifest.v2+json, \
     application/vnd.oci.image.manifest.v1+json";

const TARGET_OS: &str = "linux";
const TARGET_ARCHITECTURE: &str = "amd64";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ManifestType {
    DockerV2,
    DockerList,
    OciManifest,
    OciIndex,
}

impl ManifestType {
    pub fn from_media_type(media_type: &str) -> Option<Self> {
        match media_type {
            DOCKER_MANIFEST_V2 => Some(ManifestType::DockerV2),
            DOCKER_MANIFEST_LIST => Some(ManifestType::DockerList),
            OCI_MANIFEST => Some(ManifestType::OciManifest),
            OCI_INDEX => Some(ManifestType::OciIndex),
            _ => None,
        }
    }

    pub fn is_list(&self) -> bool {
        matches!(self, ManifestType::DockerList | ManifestType::OciIndex)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Platform {
    pub architecture: String,
    pub os: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub variant: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestListEntry {
    #[serde(default)]
    pub media_type: String,
    #[serde(default)]
    pub size: u64,
    pub digest: String,
    #[serde(default)]
    pub platform: Option<Platform>,
}

impl ManifestListEntry {
    fn is_platform(&self, os: &str, architecture: &str) -> bool {
        self.platform
            .as_ref()
            .is_some_and(|p| p.os == os && p.architecture == architecture)
    }

    pub fn platform_label(&self) -> String {
        match &self.platform {
            Some(p) => match &p.variant {
                Some(variant) => format!("{}/{}/{}", p.os, p.architecture, variant),
                None => format!("{}/{}", p.os, p.architecture),
            },
            None => "unknown platform".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ManifestList {
    pub schema_version: u32,
    #[serde(default)]
    pub media_type: Option<String>,
    #[serde(rename = "manifests", default)]
    pub entries: Vec<ManifestListEntry>,
}

impl ManifestList {
    /// linux/amd64 when present, otherwise the first entry in list order
    pub fn select_platform(&self) -> Option<&ManifestListEntry> {
        self.entries
            .iter()
            .find(|entry| entry.is_platform(TARGET_OS, TARGET_ARCHITECTURE))
            .or_else(|| self.entries.first())
    }
}

/// Content descriptor
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Descriptor {
    #[serde(default)]
    pub media_type: String,
    #[serde(default)]
    pub size: u64,
    pub digest: String,
}

/// How a layer blob is stored on the wire
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LayerCompression {
    Gzip,
    None,
}

impl Descriptor {
    /// Decide from the declared media type how to turn this layer into a
    /// plain tar. Layers without a media type are assumed to be gzip.
    pub fn compression(&self) -> Result<LayerCompression> {
        match self.media_type.as_str() {
            "" | DOCKER_LAYER_GZIP | DOCKER_LAYER_FOREIGN_GZIP | OCI_LAYER_GZIP
            | OCI_LAYER_NONDIST_GZIP => Ok(LayerCompression::Gzip),
            DOCKER_LAYER_TAR | OCI_LAYER_TAR | OCI_LAYER_NONDIST_TAR => {
                Ok(LayerCompression::None)
            }
            other => Err(PullError::ArchiveBuild(format!(
                "unsupported layer compression for {}: {}",
                self.digest, other
            ))),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ImageManifest {
    pub schema_version: u32,
    #[serde(default)]
    pub media_type: Option<String>,
    pub config: Descriptor,
    #[serde(default)]
    pub layers: Vec<Descriptor>,
}

impl ImageManifest {
    /// Get total compressed size of all layers.
    pub fn total_layer_size(&self) -> u64 {
        self.layers.iter().map(|l| l.size).sum()
    }
}

/// A decoded manifest endpoint response
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ManifestDocument {
    List(ManifestList),
    Image(ImageManifest),
}

/// Just enough of a manifest to tell which kind it is
#[derive(Deserialize)]
#[serde(rename_all = "camelCase")]
struct ManifestShape {
    schema_version: Option<u32>,
    media_type: Option<String>,
    manifests: Option<IgnoredAny>,
    config: Option<IgnoredAny>,
}

impl ManifestDocument {
    pub fn decode(body: &[u8]) -> Result<Self> {
        let shape: ManifestShape =
            serde_json::from_slice(body).map_err(|e| decode_error(e.to_string(), body))?;

        match shape.schema_version {
            Some(2) => {}
            Some(other) => {
                return Err(decode_error(
                    format!("unsupported schemaVersion {}", other),
                    body,
                ));
            }
            None => return Err(decode_error("missing schemaVersion".to_string(), body)),
        }

        let is_list = match shape.media_type.as_deref().and_then(ManifestType::from_media_type) {
            Some(manifest_type) => manifest_type.is_list(),
            None if shape.manifests.is_some() => true,
            None if shape.config.is_some() => false,
            None => {
                return Err(decode_error(
                    format!(
                        "unrecognized manifest media type {:?}",
                        shape.media_type.unwrap_or_default()
                    ),
                    body,
                ));
            }
        };

        if is_list {
            serde_json::from_slice(body)
                .map(ManifestDocument::List)
                .map_err(|e| decode_error(format!("invalid manifest list: {}", e), body))
        } else {
            serde_json::from_slice(body)
                .map(ManifestDocument::Image)
                .map_err(|e| decode_error(format!("invalid image manifest: {}", e), body))
        }
    }
}

fn decode_error(reason: String, body: &[u8]) -> PullError {
    PullError::ManifestDecode {
        reason,
        body: truncate_body(&String::from_utf8_lossy(body)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn list_entry(digest: &str, os: &str, arch: &str) -> serde_json::Value {
        serde_json::json!({
            "mediaType": DOCKER_MANIFEST_V2,
            "size": 1234,
            "digest": digest,
            "platform": { "architecture": arch, "os": os }
        })
    }

    fn decode_list(entries: Vec<serde_json::Value>) -> ManifestList {
        let body = serde_json::json!({
            "schemaVersion": 2,
            "mediaType": DOCKER_MANIFEST_LIST,
            "manifests": entries,
        });
        match ManifestDocument::decode(body.to_string().as_bytes()).unwrap() {
            ManifestDocument::List(list) => list,
            other => panic!("expected a list, got {other:?}"),
        }
    }

    #[test]
    fn test_select_prefers_linux_amd64() {
        let list = decode_list(vec![
            list_entry("sha256:arm", "linux", "arm64"),
            list_entry("sha256:amd", "linux", "amd64"),
        ]);
        assert_eq!(list.select_platform().unwrap().digest, "sha256:amd");
    }

    #[test]
    fn test_select_falls_back_to_first_entry() {
        let list = decode_list(vec![
            list_entry("sha256:arm", "linux", "arm64"),
            list_entry("sha256:win", "windows", "amd64"),
        ]);
        assert_eq!(list.select_platform().unwrap().digest, "sha256:arm");
    }

    #[test]
    fn test_select_on_empty_list() {
        let list = decode_list(vec![]);
        assert!(list.entries.is_empty());
        assert!(list.select_platform().is_none());
    }

    #[test]
    fn test_decode_single_manifest() {
        let body = serde_json::json!({
            "schemaVersion": 2,
            "mediaType": DOCKER_MANIFEST_V2,
            "config": { "mediaType": "application/vnd.docker.container.image.v1+json", "size": 7, "digest": "sha256:cfg" },
            "layers": [
                { "mediaType": DOCKER_LAYER_GZIP, "size": 10, "digest": "sha256:l0" },
                { "mediaType": DOCKER_LAYER_GZIP, "size": 20, "digest": "sha256:l1" }
            ]
        });
        let ManifestDocument::Image(manifest) =
            ManifestDocument::decode(body.to_string().as_bytes()).unwrap()
        else {
            panic!("expected an image manifest");
        };
        assert_eq!(manifest.config.digest, "sha256:cfg");
        let digests: Vec<_> = manifest.layers.iter().map(|l| l.digest.as_str()).collect();
        assert_eq!(digests, ["sha256:l0", "sha256:l1"]);
        assert_eq!(manifest.total_layer_size(), 30);
    }

    #[test]
    fn test_shape_decides_without_media_type() {
        let index = serde_json::json!({
            "schemaVersion": 2,
            "manifests": [ { "digest": "sha256:x", "platform": { "os": "linux", "architecture": "amd64" } } ]
        });
        assert!(matches!(
            ManifestDocument::decode(index.to_string().as_bytes()).unwrap(),
            ManifestDocument::List(_)
        ));

        let manifest = serde_json::json!({
            "schemaVersion": 2,
            "config": { "digest": "sha256:cfg" },
            "layers": []
        });
        assert!(matches!(
            ManifestDocument::decode(manifest.to_string().as_bytes()).unwrap(),
            ManifestDocument::Image(_)
        ));
    }

    #[test]
    fn test_decode_rejects_garbage_with_body() {
        let err = ManifestDocument::decode(b"<html>not json</html>").unwrap_err();
        match err {
            PullError::ManifestDecode { body, .. } => assert!(body.contains("not json")),
            other => panic!("unexpected error: {other:?}"),
        }
    }

    #[test]
    fn test_decode_rejects_schema_v1() {
        let body = br#"{"schemaVersion": 1, "name": "library/nginx", "fsLayers": []}"#;
        assert!(matches!(
            ManifestDocument::decode(body),
            Err(PullError::ManifestDecode { .. })
        ));
    }

    #[test]
    fn test_layer_compression_from_media_type() {
        let layer = |media_type: &str| Descriptor {
            media_type: media_type.to_string(),
            size: 0,
            digest: "sha256:l".to_string(),
        };
        assert_eq!(layer(DOCKER_LAYER_GZIP).compression().unwrap(), LayerCompression::Gzip);
        assert_eq!(layer(OCI_LAYER_GZIP).compression().unwrap(), LayerCompression::Gzip);
        assert_eq!(layer("").compression().unwrap(), LayerCompression::Gzip);
        assert_eq!(layer(OCI_LAYER_TAR).compression().unwrap(), LayerCompression::None);
        assert!(matches!(
            layer("application/vnd.oci.image.layer.v1.tar+zstd").compression(),
            Err(PullError::ArchiveBuild(msg)) if msg.contains("unsupported layer compression")
        ));
    }

    #[test]
    fn test_platform_label() {
        let entry = ManifestListEntry {
            media_type: String::new(),
            size: 0,
            digest: "sha256:x".to_string(),
            platform: Some(Platform {
                architecture: "arm".to_string(),
                os: "linux".to_string(),
                variant: Some("v7".to_string()),
            }),
        };
        assert_eq!(entry.platform_label(), "linux/arm/v7");
    }
}
