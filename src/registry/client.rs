//! Registry client
//!
//! Owns the shared HTTP client and hands out the per-concern operation
//! handles (auth, manifests, blobs) used by the pull pipeline.

use bytes::Bytes;
use reqwest::Client;

use crate::config::PullerConfig;
use crate::error::{BlobRole, PullError, Result};
use crate::image::manifest::ImageManifest;
use crate::image::reference::ImageReference;
use crate::logging::Logger;
use crate::registry::operations::{AuthOperations, BlobOperations, ManifestOperations};

pub struct RegistryClientBuilder {
    config: PullerConfig,
    output: Logger,
}

impl RegistryClientBuilder {
    pub fn new(config: PullerConfig) -> Self {
        Self {
            config,
            output: Logger::new(false),
        }
    }

    pub fn with_logger(mut self, output: Logger) -> Self {
        self.output = output;
        self
    }

    pub fn build(self) -> Result<RegistryClient> {
        self.config.validate()?;

        let client = Client::builder()
            .connect_timeout(self.config.connect_timeout())
            .timeout(self.config.request_timeout())
            .user_agent(concat!(env!("CARGO_PKG_NAME"), "/", env!("CARGO_PKG_VERSION")))
            .build()
            .map_err(|e| PullError::Config(format!("Failed to build HTTP client: {}", e)))?;

        let scheme = self.config.scheme();
        let auth_ops = AuthOperations::new(client.clone(), self.config.clone(), self.output.clone());
        let manifest_ops = ManifestOperations::new(client.clone(), scheme, self.output.clone());
        let blob_ops = BlobOperations::new(client, scheme, self.output.clone());

        Ok(RegistryClient {
            config: self.config,
            auth_ops,
            manifest_ops,
            blob_ops,
        })
    }
}

#[derive(Clone)]
pub struct RegistryClient {
    config: PullerConfig,
    auth_ops: AuthOperations,
    manifest_ops: ManifestOperations,
    blob_ops: BlobOperations,
}

impl RegistryClient {
    pub fn builder(config: PullerConfig) -> RegistryClientBuilder {
        RegistryClientBuilder::new(config)
    }

    pub fn config(&self) -> &PullerConfig {
        &self.config
    }

    pub async fn get_token(&self, reference: &ImageReference) -> Result<Option<String>> {
        self.auth_ops
            .get_token(&reference.registry, &reference.repository)
            .await
    }

    pub async fn resolve_manifest(
        &self,
        reference: &ImageReference,
        token: Option<&str>,
    ) -> Result<ImageManifest> {
        self.manifest_ops
            .resolve(&reference.registry, &reference.repository, &reference.tag, token)
            .await
    }

    pub async fn fetch_blob(
        &self,
        reference: &ImageReference,
        digest: &str,
        role: BlobRole,
        token: Option<&str>,
    ) -> Result<Bytes> {
        self.blob_ops
            .fetch(&reference.registry, &reference.repository, digest, role, token)
            .await
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_build_rejects_invalid_config() {
        let config = PullerConfig::default().with_max_concurrent_downloads(0);
        assert!(matches!(
            RegistryClient::builder(config).build(),
            Err(PullError::Config(_))
        ));
    }

    #[test]
    fn test_build_with_defaults() {
        let client = RegistryClient::builder(PullerConfig::default())
            .with_logger(Logger::new_quiet())
            .build()
            .unwrap();
        assert_eq!(client.config().scheme(), "https");
    }
}
