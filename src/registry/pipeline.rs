//! Layer download pipeline
//!
//! Fetches every layer of a manifest with at most `max_concurrent`
//! requests in flight. Results come back indexed by manifest position no
//! matter which download finishes first; the first failure aborts the rest.

use bytes::Bytes;
use futures::future::try_join_all;
use tokio::sync::Semaphore;

use crate::error::{BlobRole, PullError, Result, StageContext};
use crate::image::digest::DigestUtils;
use crate::image::manifest::Descriptor;
use crate::image::reference::ImageReference;
use crate::logging::Logger;
use crate::registry::RegistryClient;

const BYTES_PER_MB: f64 = 1024.0 * 1024.0;

/// Basic pipeline configuration
#[derive(Debug, Clone)]
pub struct PipelineConfig {
    pub max_concurrent: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { max_concurrent: 3 }
    }
}

pub struct DownloadPipeline {
    logger: Logger,
    config: PipelineConfig,
}

impl DownloadPipeline {
    pub fn new(logger: Logger) -> Self {
        Self {
            logger,
            config: PipelineConfig::default(),
        }
    }

    pub fn with_config(mut self, config: PipelineConfig) -> Self {
        self.config = config;
        self
    }

    /// Download all `layers`, returning their bodies in the same order.
    ///
    /// Each failure is wrapped in a `downloading layer N` stage.
    pub async fn download_layers(
        &self,
        client: &RegistryClient,
        reference: &ImageReference,
        layers: &[Descriptor],
        token: Option<&str>,
    ) -> Result<Vec<Bytes>> {
        let total = layers.len();
        let semaphore = Semaphore::new(self.config.max_concurrent.max(1));
        let semaphore = &semaphore;

        self.logger.info(&format!(
            "Downloading {} layer(s), up to {} at a time",
            total, self.config.max_concurrent
        ));

        let downloads = layers.iter().enumerate().map(|(index, layer)| async move {
            let stage = format!("downloading layer {}", index + 1);
            let _permit = semaphore
                .acquire()
                .await
                .map_err(|_| PullError::Cancelled)
                .stage(stage.as_str())?;

            self.logger.step(&format!(
                "[{}/{}] Downloading {} ({:.2} MB)",
                index + 1,
                total,
                DigestUtils::short(&layer.digest),
                layer.size as f64 / BYTES_PER_MB
            ));

            client
                .fetch_blob(reference, &layer.digest, BlobRole::Layer(index), token)
                .await
                .stage(stage)
        });

        let blobs = try_join_all(downloads).await?;

        let total_bytes: u64 = blobs.iter().map(|b| b.len() as u64).sum();
        self.logger.success(&format!(
            "Downloaded {} layer(s), {}",
            total,
            self.logger.format_size(total_bytes)
        ));
        Ok(blobs)
    }
}
