//! Docker image handling module
//!
//! Reference parsing, manifest documents, legacy archive assembly and the
//! [`ImageManager`] that drives a pull from reference to archive.

pub mod archive;
pub mod digest;
pub mod image_manager;
pub mod manifest;
pub mod reference;
pub mod sink;

pub use archive::{ArchiveBuilder, FetchedImage};
pub use digest::DigestUtils;
pub use image_manager::ImageManager;
pub use manifest::{Descriptor, ImageManifest, ManifestDocument, ManifestList, ManifestListEntry, Platform};
pub use reference::ImageReference;
pub use sink::{ArchiveSink, Delivery, DockerLoadSink, FileSink};
