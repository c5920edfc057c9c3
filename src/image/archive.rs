//! Legacy `docker save` archive assembly
//!
//! Layout written by [`ArchiveBuilder`]:
//!
//! ```text
//! <config-hex>.json
//! <layer-hex>/            (one directory per layer, manifest order)
//! <layer-hex>/layer.tar   (decompressed layer)
//! manifest.json
//! repositories
//! ```

use std::collections::{BTreeMap, HashSet};
use std::io::{self, Read, Write};
use std::time::{SystemTime, UNIX_EPOCH};

use bytes::Bytes;
use flate2::read::MultiGzDecoder;
use serde::Serialize;
use tar::{Builder, EntryType, Header};

use crate::error::{PullError, Result};
use crate::image::digest::DigestUtils;
use crate::image::manifest::{ImageManifest, LayerCompression};
use crate::image::reference::ImageReference;

const FILE_MODE: u32 = 0o644;
const DIR_MODE: u32 = 0o755;

/// Everything the network stages produce for one image
#[derive(Debug, Clone)]
pub struct FetchedImage {
    pub reference: ImageReference,
    pub manifest: ImageManifest,
    pub config: Bytes,
    /// Raw layer blobs, indexed like `manifest.layers`
    pub layers: Vec<Bytes>,
}

impl FetchedImage {
    pub fn total_layer_bytes(&self) -> u64 {
        self.layers.iter().map(|l| l.len() as u64).sum()
    }
}

#[derive(Serialize)]
#[serde(rename_all = "PascalCase")]
struct ArchiveManifestEntry {
    config: String,
    repo_tags: Vec<String>,
    layers: Vec<String>,
}

/// Layer that passed validation, ready to be written
struct PlannedLayer<'a> {
    hex: &'a str,
    compression: LayerCompression,
    data: &'a Bytes,
}

pub struct ArchiveBuilder<'a> {
    image: &'a FetchedImage,
    mtime: u64,
}

impl<'a> ArchiveBuilder<'a> {
    pub fn new(image: &'a FetchedImage) -> Self {
        let mtime = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map(|d| d.as_secs())
            .unwrap_or_default();
        Self { image, mtime }
    }

    /// Override the modification time stamped on every entry
    pub fn with_mtime(mut self, mtime: u64) -> Self {
        self.mtime = mtime;
        self
    }

    /// Write the complete archive to `writer` and hand the writer back.
    ///
    /// All validation happens before the first byte is written, so a
    /// rejected image leaves `writer` untouched.
    pub fn write_to<W: Write>(&self, writer: W) -> Result<W> {
        let config_hex = DigestUtils::hex_part(&self.image.manifest.config.digest)?;
        let layers = self.plan_layers()?;

        let mut builder = Builder::new(writer);
        let config_name = format!("{}.json", config_hex);
        self.append_file(&mut builder, &config_name, &self.image.config)?;

        let mut written = HashSet::new();
        let mut layer_paths = Vec::with_capacity(layers.len());
        for layer in &layers {
            let layer_path = format!("{}/layer.tar", layer.hex);
            // Repeated digests share one directory
            if written.insert(layer.hex) {
                self.append_dir(&mut builder, &format!("{}/", layer.hex))?;
                match layer.compression {
                    LayerCompression::Gzip => {
                        let plain = gunzip(layer.hex, layer.data)?;
                        self.append_file(&mut builder, &layer_path, &plain)?;
                    }
                    LayerCompression::None => {
                        self.append_file(&mut builder, &layer_path, layer.data)?;
                    }
                }
            }
            layer_paths.push(layer_path);
        }

        let manifest = vec![ArchiveManifestEntry {
            config: config_name,
            repo_tags: vec![self.image.reference.repo_tag()],
            layers: layer_paths,
        }];
        let manifest_json = serde_json::to_vec(&manifest)
            .map_err(|e| PullError::ArchiveBuild(format!("serializing manifest.json: {}", e)))?;
        self.append_file(&mut builder, "manifest.json", &manifest_json)?;

        // Planned layers are never empty
        let last_hex = layers.last().map(|l| l.hex).unwrap_or_default();
        let mut tags = BTreeMap::new();
        tags.insert(self.image.reference.tag.clone(), last_hex.to_string());
        let mut repositories = BTreeMap::new();
        repositories.insert(self.image.reference.repository.clone(), tags);
        let repositories_json = serde_json::to_vec(&repositories)
            .map_err(|e| PullError::ArchiveBuild(format!("serializing repositories: {}", e)))?;
        self.append_file(&mut builder, "repositories", &repositories_json)?;

        builder
            .into_inner()
            .map_err(|e| archive_io_error("finishing archive", e))
    }

    fn plan_layers(&self) -> Result<Vec<PlannedLayer<'a>>> {
        let image: &'a FetchedImage = self.image;
        let manifest = &image.manifest;
        if manifest.layers.is_empty() {
            return Err(PullError::ArchiveBuild(
                "image manifest lists no layers".to_string(),
            ));
        }
        if manifest.layers.len() != image.layers.len() {
            return Err(PullError::ArchiveBuild(format!(
                "manifest lists {} layers but {} were downloaded",
                manifest.layers.len(),
                image.layers.len()
            )));
        }

        manifest
            .layers
            .iter()
            .zip(&image.layers)
            .map(|(descriptor, data)| {
                Ok::<_, PullError>(PlannedLayer {
                    hex: DigestUtils::hex_part(&descriptor.digest)?,
                    compression: descriptor.compression()?,
                    data,
                })
            })
            .collect()
    }

    fn append_file<W: Write>(&self, builder: &mut Builder<W>, path: &str, data: &[u8]) -> Result<()> {
        let mut header = Header::new_gnu();
        header.set_entry_type(EntryType::Regular);
        header.set_size(data.len() as u64);
        header.set_mode(FILE_MODE);
        header.set_mtime(self.mtime);
        builder
            .append_data(&mut header, path, data)
            .map_err(|e| archive_io_error(&format!("writing {}", path), e))
    }

    fn append_dir<W: Write>(&self, builder: &mut Builder<W>, path: &str) -> Result<()> {
        let mut header = Header::new_gnu();
        header.set_entry_type(EntryType::Directory);
        header.set_size(0);
        header.set_mode(DIR_MODE);
        header.set_mtime(self.mtime);
        builder
            .append_data(&mut header, path, io::empty())
            .map_err(|e| archive_io_error(&format!("writing {}", path), e))
    }
}

fn gunzip(hex: &str, data: &[u8]) -> Result<Vec<u8>> {
    let mut plain = Vec::with_capacity(data.len() * 2);
    // Concatenated gzip members form one stream
    MultiGzDecoder::new(data)
        .read_to_end(&mut plain)
        .map_err(|e| PullError::ArchiveBuild(format!("decompressing layer {}: {}", hex, e)))?;
    Ok(plain)
}

fn archive_io_error(context: &str, err: io::Error) -> PullError {
    PullError::ArchiveBuild(format!("{}: {}", context, err))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::image::manifest::{DOCKER_LAYER_GZIP, DOCKER_MANIFEST_V2, Descriptor, OCI_LAYER_TAR};
    use flate2::Compression;
    use flate2::write::GzEncoder;
    use std::collections::HashMap;

    struct Entry {
        kind: EntryType,
        mode: u32,
        mtime: u64,
        data: Vec<u8>,
    }

    fn gzip(data: &[u8]) -> Bytes {
        let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
        encoder.write_all(data).unwrap();
        Bytes::from(encoder.finish().unwrap())
    }

    fn hex_digest(fill: char) -> String {
        format!("sha256:{}", fill.to_string().repeat(64))
    }

    fn layer(fill: char, media_type: &str) -> Descriptor {
        Descriptor {
            media_type: media_type.to_string(),
            size: 0,
            digest: hex_digest(fill),
        }
    }

    fn image(layers: Vec<(Descriptor, Bytes)>) -> FetchedImage {
        let (descriptors, blobs) = layers.into_iter().unzip();
        FetchedImage {
            reference: ImageReference::parse("nginx:1.25"),
            manifest: ImageManifest {
                schema_version: 2,
                media_type: Some(DOCKER_MANIFEST_V2.to_string()),
                config: Descriptor {
                    media_type: "application/vnd.docker.container.image.v1+json".to_string(),
                    size: 2,
                    digest: hex_digest('c'),
                },
                layers: descriptors,
            },
            config: Bytes::from_static(b"{}"),
            layers: blobs,
        }
    }

    fn read_entries(archive: &[u8]) -> (Vec<String>, HashMap<String, Entry>) {
        let mut order = Vec::new();
        let mut entries = HashMap::new();
        let mut reader = tar::Archive::new(archive);
        for entry in reader.entries().unwrap() {
            let mut entry = entry.unwrap();
            let path = entry.path().unwrap().to_string_lossy().trim_end_matches('/').to_string();
            let header = entry.header();
            let kind = header.entry_type();
            let mode = header.mode().unwrap();
            let mtime = header.mtime().unwrap();
            let mut data = Vec::new();
            entry.read_to_end(&mut data).unwrap();
            order.push(path.clone());
            entries.insert(path, Entry { kind, mode, mtime, data });
        }
        (order, entries)
    }

    #[test]
    fn test_layers_are_stored_decompressed() {
        let plain = b"layer one contents".repeat(100);
        let img = image(vec![(layer('a', DOCKER_LAYER_GZIP), gzip(&plain))]);

        let archive = ArchiveBuilder::new(&img).write_to(Vec::new()).unwrap();
        let (_, entries) = read_entries(&archive);

        let layer_tar = &entries[&format!("{}/layer.tar", "a".repeat(64))];
        assert_eq!(layer_tar.data, plain);
        assert_eq!(layer_tar.data.len(), plain.len());
    }

    #[test]
    fn test_multi_member_gzip_layer_is_fully_decompressed() {
        let mut blob = gzip(b"first-half;").to_vec();
        blob.extend_from_slice(&gzip(b"second-half"));
        let img = image(vec![(layer('a', DOCKER_LAYER_GZIP), Bytes::from(blob))]);

        let archive = ArchiveBuilder::new(&img).write_to(Vec::new()).unwrap();
        let (_, entries) = read_entries(&archive);

        let layer_tar = &entries[&format!("{}/layer.tar", "a".repeat(64))];
        assert_eq!(layer_tar.data, b"first-half;second-half");
        assert_eq!(layer_tar.data.len(), 22);
    }

    #[test]
    fn test_entry_order_and_manifest_json() {
        let img = image(vec![
            (layer('a', DOCKER_LAYER_GZIP), gzip(b"first")),
            (layer('b', DOCKER_LAYER_GZIP), gzip(b"second")),
            (layer('d', OCI_LAYER_TAR), Bytes::from_static(b"third")),
        ]);

        let archive = ArchiveBuilder::new(&img).write_to(Vec::new()).unwrap();
        let (order, entries) = read_entries(&archive);
        let (a, b, d, c) = ("a".repeat(64), "b".repeat(64), "d".repeat(64), "c".repeat(64));

        assert_eq!(
            order,
            vec![
                format!("{c}.json"),
                a.clone(),
                format!("{a}/layer.tar"),
                b.clone(),
                format!("{b}/layer.tar"),
                d.clone(),
                format!("{d}/layer.tar"),
                "manifest.json".to_string(),
                "repositories".to_string(),
            ]
        );

        let manifest: serde_json::Value =
            serde_json::from_slice(&entries["manifest.json"].data).unwrap();
        assert_eq!(
            manifest,
            serde_json::json!([{
                "Config": format!("{c}.json"),
                "RepoTags": ["library/nginx:1.25"],
                "Layers": [
                    format!("{a}/layer.tar"),
                    format!("{b}/layer.tar"),
                    format!("{d}/layer.tar"),
                ]
            }])
        );
        assert_eq!(entries[&format!("{d}/layer.tar")].data, b"third");
        assert_eq!(entries[&format!("{c}.json")].data, b"{}");
    }

    #[test]
    fn test_repositories_points_at_last_layer() {
        let img = image(vec![
            (layer('a', DOCKER_LAYER_GZIP), gzip(b"first")),
            (layer('b', DOCKER_LAYER_GZIP), gzip(b"second")),
        ]);

        let archive = ArchiveBuilder::new(&img).write_to(Vec::new()).unwrap();
        let (_, entries) = read_entries(&archive);

        let repositories: serde_json::Value =
            serde_json::from_slice(&entries["repositories"].data).unwrap();
        assert_eq!(
            repositories,
            serde_json::json!({ "library/nginx": { "1.25": "b".repeat(64) } })
        );
    }

    #[test]
    fn test_modes_and_mtime() {
        let img = image(vec![(layer('a', DOCKER_LAYER_GZIP), gzip(b"x"))]);

        let archive = ArchiveBuilder::new(&img)
            .with_mtime(1_700_000_000)
            .write_to(Vec::new())
            .unwrap();
        let (_, entries) = read_entries(&archive);

        let dir = &entries[&"a".repeat(64)];
        assert_eq!(dir.kind, EntryType::Directory);
        assert_eq!(dir.mode, 0o755);
        for name in ["manifest.json", "repositories"] {
            assert_eq!(entries[name].mode, 0o644);
            assert_eq!(entries[name].kind, EntryType::Regular);
        }
        assert!(entries.values().all(|e| e.mtime == 1_700_000_000));
    }

    #[test]
    fn test_repeated_layer_written_once() {
        let img = image(vec![
            (layer('a', DOCKER_LAYER_GZIP), gzip(b"same")),
            (layer('a', DOCKER_LAYER_GZIP), gzip(b"same")),
        ]);

        let archive = ArchiveBuilder::new(&img).write_to(Vec::new()).unwrap();
        let (order, entries) = read_entries(&archive);

        let layer_path = format!("{}/layer.tar", "a".repeat(64));
        assert_eq!(order.iter().filter(|p| **p == layer_path).count(), 1);
        let manifest: serde_json::Value =
            serde_json::from_slice(&entries["manifest.json"].data).unwrap();
        assert_eq!(manifest[0]["Layers"].as_array().unwrap().len(), 2);
    }

    #[test]
    fn test_zero_layers_fails_before_writing() {
        let img = image(vec![]);
        let err = ArchiveBuilder::new(&img).write_to(Vec::new()).unwrap_err();
        assert!(matches!(err, PullError::ArchiveBuild(msg) if msg.contains("no layers")));
    }

    #[test]
    fn test_layer_count_mismatch_fails() {
        let mut img = image(vec![(layer('a', DOCKER_LAYER_GZIP), gzip(b"x"))]);
        img.layers.push(gzip(b"extra"));
        assert!(matches!(
            ArchiveBuilder::new(&img).write_to(Vec::new()),
            Err(PullError::ArchiveBuild(_))
        ));
    }

    #[test]
    fn test_unsupported_compression_fails() {
        let img = image(vec![(
            layer('a', "application/vnd.oci.image.layer.v1.tar+zstd"),
            Bytes::from_static(b"zstd bytes"),
        )]);
        let err = ArchiveBuilder::new(&img).write_to(Vec::new()).unwrap_err();
        assert!(err.to_string().contains("unsupported layer compression"));
    }

    #[test]
    fn test_corrupt_gzip_is_an_archive_error() {
        let img = image(vec![(
            layer('a', DOCKER_LAYER_GZIP),
            Bytes::from_static(b"definitely not gzip"),
        )]);
        assert!(matches!(
            ArchiveBuilder::new(&img).write_to(Vec::new()),
            Err(PullError::ArchiveBuild(msg)) if msg.contains("decompressing layer")
        ));
    }
}
