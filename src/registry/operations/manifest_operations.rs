//! Manifest operations for registry client
//!
//! `GET /v2/{name}/manifests/{reference}`. The first request accepts both
//! manifest lists and single manifests; a list is narrowed to one platform
//! and that platform's manifest is fetched by digest.

use reqwest::Client;
use reqwest::header::{ACCEPT, CONTENT_TYPE};
use tracing::debug;

use crate::error::handlers::{HttpErrorHandler, NetworkErrorHandler};
use crate::error::{PullError, Result};
use crate::image::manifest::{
    ACCEPT_ANY_MANIFEST, ACCEPT_SINGLE_MANIFEST, ImageManifest, ManifestDocument,
};
use crate::logging::Logger;
use crate::registry::operations::{registry_url, with_bearer};

#[derive(Clone)]
pub struct ManifestOperations {
    client: Client,
    scheme: &'static str,
    output: Logger,
}

impl ManifestOperations {
    pub fn new(client: Client, scheme: &'static str, output: Logger) -> Self {
        Self {
            client,
            scheme,
            output,
        }
    }

    /// Resolve `reference` (tag or digest) to a single image manifest.
    pub async fn resolve(
        &self,
        registry: &str,
        repository: &str,
        reference: &str,
        token: Option<&str>,
    ) -> Result<ImageManifest> {
        let body = self
            .pull_manifest(registry, repository, reference, ACCEPT_ANY_MANIFEST, token)
            .await?;

        let list = match ManifestDocument::decode(&body)? {
            ManifestDocument::Image(manifest) => return Ok(manifest),
            ManifestDocument::List(list) => list,
        };

        self.output.verbose(&format!(
            "Manifest list with {} platform(s) found",
            list.entries.len()
        ));
        let entry = list.select_platform().ok_or_else(|| {
            PullError::ManifestListResolution(format!(
                "manifest list for {}:{} has no entries",
                repository, reference
            ))
        })?;
        self.output
            .info(&format!("Selected platform {}", entry.platform_label()));

        let body = self
            .pull_manifest(registry, repository, &entry.digest, ACCEPT_SINGLE_MANIFEST, token)
            .await?;
        match ManifestDocument::decode(&body)? {
            ManifestDocument::Image(manifest) => Ok(manifest),
            ManifestDocument::List(_) => Err(PullError::ManifestListResolution(format!(
                "platform entry {} is itself a manifest list",
                entry.digest
            ))),
        }
    }

    /// Raw manifest body for `reference`, negotiated with `accept`
    pub async fn pull_manifest(
        &self,
        registry: &str,
        repository: &str,
        reference: &str,
        accept: &str,
        token: Option<&str>,
    ) -> Result<Vec<u8>> {
        let url = registry_url(self.scheme, registry, repository, "manifests", reference)?;
        debug!(%url, "fetching manifest");

        let request = with_bearer(self.client.get(url).header(ACCEPT, accept), token);
        let response = request
            .send()
            .await
            .map_err(|e| NetworkErrorHandler::handle_network_error(&e, "manifest request"))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error response".to_string());
            return Err(HttpErrorHandler::handle_manifest_error(status, &error_text));
        }

        debug!(
            %status,
            content_type = ?response.headers().get(CONTENT_TYPE),
            "manifest response"
        );
        let body = response
            .bytes()
            .await
            .map_err(|e| NetworkErrorHandler::handle_network_error(&e, "manifest response"))?;
        Ok(body.to_vec())
    }
}
