//! Authentication operations for registry client
//!
//! Anonymous pull tokens from the default registry's token service:
//! `GET <auth-url>?service=<service>&scope=repository:<repo>:pull`.
//! Other registries are contacted without a token.

use reqwest::Client;
use serde::Deserialize;
use tracing::debug;
use url::Url;

use crate::config::PullerConfig;
use crate::error::handlers::{HttpErrorHandler, NetworkErrorHandler};
use crate::error::{PullError, Result};
use crate::logging::Logger;

/// Token service response. Registries differ on which field they fill.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct AuthToken {
    #[serde(default)]
    pub token: String,
    #[serde(default)]
    pub access_token: String,
    #[serde(default)]
    pub expires_in: Option<u64>,
}

impl AuthToken {
    /// The usable bearer token, preferring `token` over `access_token`
    pub fn into_bearer(self) -> Option<String> {
        if !self.token.is_empty() {
            Some(self.token)
        } else if !self.access_token.is_empty() {
            Some(self.access_token)
        } else {
            None
        }
    }
}

#[derive(Clone)]
pub struct AuthOperations {
    client: Client,
    config: PullerConfig,
    output: Logger,
}

impl AuthOperations {
    pub fn new(client: Client, config: PullerConfig, output: Logger) -> Self {
        Self {
            client,
            config,
            output,
        }
    }

    /// Fetch a pull-scoped token for `repository`, or `None` when the
    /// registry is not the one whose token service is configured.
    pub async fn get_token(&self, registry: &str, repository: &str) -> Result<Option<String>> {
        if !self.config.is_default_registry(registry) {
            self.output
                .verbose(&format!("No token service known for {}, pulling anonymously", registry));
            return Ok(None);
        }

        let url = self.token_url(repository)?;
        debug!(%url, "requesting pull token");

        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| NetworkErrorHandler::handle_network_error(&e, "token request"))?;

        let status = response.status();
        if !status.is_success() {
            let error_text = response
                .text()
                .await
                .unwrap_or_else(|_| "Failed to read error response".to_string());
            return Err(HttpErrorHandler::handle_auth_error(status, &error_text));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| NetworkErrorHandler::handle_network_error(&e, "token response"))?;
        let token: AuthToken = serde_json::from_slice(&body)
            .map_err(|e| PullError::Auth(format!("Undecodable token response: {}", e)))?;

        debug!(expires_in = ?token.expires_in, "token issued");
        let bearer = token.into_bearer();
        if bearer.is_some() {
            self.output
                .verbose(&format!("Obtained pull token for {}", repository));
        } else {
            self.output
                .verbose("Token service returned an empty token, continuing anonymously");
        }
        Ok(bearer)
    }

    fn token_url(&self, repository: &str) -> Result<Url> {
        let mut url = Url::parse(&self.config.auth_url).map_err(|e| {
            PullError::Config(format!("Invalid auth url {}: {}", self.config.auth_url, e))
        })?;
        url.query_pairs_mut()
            .append_pair("service", &self.config.auth_service)
            .append_pair("scope", &format!("repository:{}:pull", repository));
        Ok(url)
    }
}
