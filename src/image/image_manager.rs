//! Image manager - top-level pull pipeline
//!
//! Wires the stages together: token, manifest, config blob, layer blobs,
//! then hands the result to an [`ArchiveSink`]. Every stage error is wrapped
//! with the stage name before it leaves this module.

use std::path::{Path, PathBuf};

use tracing::info;

use crate::config::PullerConfig;
use crate::error::{BlobRole, Result, StageContext};
use crate::image::archive::FetchedImage;
use crate::image::digest::DigestUtils;
use crate::image::reference::ImageReference;
use crate::image::sink::{ArchiveSink, Delivery, DockerLoadSink, FileSink};
use crate::logging::Logger;
use crate::registry::{DownloadPipeline, PipelineConfig, RegistryClient};

pub struct ImageManager {
    client: RegistryClient,
    output: Logger,
    pipeline_config: PipelineConfig,
}

impl ImageManager {
    pub fn new(config: PullerConfig, output: Logger) -> Result<Self> {
        let pipeline_config = PipelineConfig {
            max_concurrent: config.max_concurrent_downloads,
        };
        let client = RegistryClient::builder(config)
            .with_logger(output.clone())
            .build()?;

        Ok(Self {
            client,
            output,
            pipeline_config,
        })
    }

    pub fn config(&self) -> &PullerConfig {
        self.client.config()
    }

    /// Parse `image` strictly against the configured default registry
    pub fn parse_reference(&self, image: &str) -> Result<ImageReference> {
        ImageReference::parse_strict(image, &self.config().default_registry)
    }

    /// Run the network stages and buffer the whole image in memory
    pub async fn fetch_image(&self, reference: &ImageReference) -> Result<FetchedImage> {
        self.output.section(&format!("Pulling {}", reference));
        info!(%reference, "pull started");

        let token = self
            .client
            .get_token(reference)
            .await
            .stage("fetching auth token")?;
        let token = token.as_deref();

        self.output.step("Resolving manifest");
        let manifest = self
            .client
            .resolve_manifest(reference, token)
            .await
            .stage("resolving manifest")?;
        self.output.info(&format!(
            "Image has {} layer(s), {} compressed",
            manifest.layers.len(),
            self.output.format_size(manifest.total_layer_size())
        ));

        self.output.step(&format!(
            "Downloading config {}",
            DigestUtils::short(&manifest.config.digest)
        ));
        let config = self
            .client
            .fetch_blob(reference, &manifest.config.digest, BlobRole::Config, token)
            .await
            .stage("downloading config")?;
        self.output
            .detail(&format!("Config size: {}", self.output.format_size(config.len() as u64)));

        let layers = DownloadPipeline::new(self.output.clone())
            .with_config(self.pipeline_config.clone())
            .download_layers(&self.client, reference, &manifest.layers, token)
            .await?;

        Ok(FetchedImage {
            reference: reference.clone(),
            manifest,
            config,
            layers,
        })
    }

    /// Fetch the image and hand it to `sink`
    pub async fn pull_into(&self, reference: &ImageReference, sink: &dyn ArchiveSink) -> Result<Delivery> {
        let image = self.fetch_image(reference).await?;

        let layer_count = image.layers.len();
        let layer_bytes = image.total_layer_bytes();

        let stage = sink.describe();
        self.output.step(&format!("Building archive and {}", stage));
        let delivery = sink.accept(image).await.stage(stage)?;

        let destination = match &delivery {
            Delivery::Written { path, size } => {
                self.output.success(&format!("Saved {} to {}", reference, path.display()));
                format!("{} ({})", path.display(), self.output.format_size(*size))
            }
            Delivery::Loaded { command } => {
                self.output
                    .success(&format!("Loaded {} with {}", reference, command));
                format!("{} load", command)
            }
        };
        self.output.summary_kv(
            "Summary",
            &[
                ("Image", reference.to_string()),
                (
                    "Layers",
                    format!("{} ({})", layer_count, self.output.format_size(layer_bytes)),
                ),
                ("Output", destination),
                (
                    "Duration",
                    self.output.format_duration(self.output.elapsed()),
                ),
            ],
        );
        Ok(delivery)
    }

    /// Write the archive to `path`, or to the default file name in the
    /// current directory
    pub async fn pull_to_file(&self, reference: &ImageReference, path: Option<&Path>) -> Result<PathBuf> {
        let path = match path {
            Some(path) => path.to_path_buf(),
            None => PathBuf::from(reference.output_file_name()),
        };
        self.pull_into(reference, &FileSink::new(&path)).await?;
        Ok(path)
    }

    /// Build the archive in a temporary directory and load it with the
    /// configured load command
    pub async fn pull_and_load(&self, reference: &ImageReference) -> Result<()> {
        let sink = DockerLoadSink::new(self.config().load_command.clone(), self.output.clone());
        self.pull_into(reference, &sink).await?;
        Ok(())
    }
}
