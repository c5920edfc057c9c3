//! Docker Registry HTTP API v2 client
//!
//! [`RegistryClient`] wraps the auth, manifest and blob operations;
//! [`DownloadPipeline`] drives the concurrent layer downloads.

pub mod client;
pub mod operations;
pub mod pipeline;

pub use client::{RegistryClient, RegistryClientBuilder};
pub use operations::{AuthOperations, AuthToken, BlobOperations, ManifestOperations};
pub use pipeline::{DownloadPipeline, PipelineConfig};
