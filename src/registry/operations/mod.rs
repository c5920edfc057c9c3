//! Registry operations module
//!
//! One handle per Registry HTTP API v2 concern, all sharing the
//! `reqwest::Client` owned by [`crate::registry::RegistryClient`].

pub mod auth_operations;
pub mod blob_operations;
pub mod manifest_operations;

pub use auth_operations::{AuthOperations, AuthToken};
pub use blob_operations::BlobOperations;
pub use manifest_operations::ManifestOperations;

use reqwest::RequestBuilder;
use url::Url;

use crate::error::{PullError, Result};

/// `<scheme>://<registry>/v2/<repository>/<endpoint>/<reference>`
pub(crate) fn registry_url(
    scheme: &str,
    registry: &str,
    repository: &str,
    endpoint: &str,
    reference: &str,
) -> Result<Url> {
    let mut url = Url::parse(&format!("{}://{}/", scheme, registry)).map_err(|e| {
        PullError::ReferenceParse(format!("invalid registry host {:?}: {}", registry, e))
    })?;
    url.path_segments_mut()
        .map_err(|_| {
            PullError::ReferenceParse(format!("registry {:?} is not a usable base URL", registry))
        })?
        .clear()
        .push("v2")
        .extend(repository.split('/'))
        .push(endpoint)
        .push(reference);
    Ok(url)
}

/// Attach the bearer token when there is one
pub(crate) fn with_bearer(request: RequestBuilder, token: Option<&str>) -> RequestBuilder {
    match token {
        Some(token) => request.bearer_auth(token),
        None => request,
    }
}
