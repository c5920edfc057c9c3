//! Blob operations for registry client
//!
//! `GET /v2/{name}/blobs/{digest}`, returning the body exactly as served.

use bytes::Bytes;
use reqwest::Client;
use tracing::debug;

use crate::error::handlers::{HttpErrorHandler, NetworkErrorHandler};
use crate::error::{BlobRole, Result};
use crate::logging::Logger;
use crate::registry::operations::{registry_url, with_bearer};

#[derive(Clone)]
pub struct BlobOperations {
    client: Client,
    scheme: &'static str,
    output: Logger,
}

impl BlobOperations {
    pub fn new(client: Client, scheme: &'static str, output: Logger) -> Self {
        Self {
            client,
            scheme,
            output,
        }
    }

    /// Download one blob. Failures are tagged with `role`.
    pub async fn fetch(
        &self,
        registry: &str,
        repository: &str,
        digest: &str,
        role: BlobRole,
        token: Option<&str>,
    ) -> Result<Bytes> {
        let url = registry_url(self.scheme, registry, repository, "blobs", digest)?;
        debug!(%url, %role, "fetching blob");

        let response = with_bearer(self.client.get(url), token)
            .send()
            .await
            .map_err(|e| NetworkErrorHandler::handle_blob_transport_error(&e, role))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error response".to_string());
            return Err(HttpErrorHandler::handle_blob_error(role, status, &error_text));
        }

        let data = response
            .bytes()
            .await
            .map_err(|e| NetworkErrorHandler::handle_blob_transport_error(&e, role))?;

        self.output.detail(&format!(
            "Fetched {} ({})",
            role,
            self.output.format_size(data.len() as u64)
        ));
        Ok(data)
    }
}
