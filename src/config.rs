//! Configuration for registry endpoints, timeouts and the load command

use crate::error::{PullError, Result};
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Docker Hub registry host
pub const DOCKER_HUB_REGISTRY: &str = "registry-1.docker.io";
/// Docker Hub token endpoint
pub const DOCKER_HUB_AUTH_URL: &str = "https://auth.docker.io/token";
/// Service name Docker Hub expects in token requests
pub const DOCKER_HUB_AUTH_SERVICE: &str = "registry.docker.io";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PullerConfig {
    /// Registry used when a reference names no registry host
    pub default_registry: String,
    /// Token endpoint of the default registry
    pub auth_url: String,
    /// `service` parameter sent to the token endpoint
    pub auth_service: String,
    /// Talk plain HTTP to registries instead of HTTPS
    pub insecure: bool,
    pub connect_timeout_secs: u64,
    pub request_timeout_secs: u64,
    pub max_concurrent_downloads: usize,
    /// Executable invoked as `<load_command> load -i <archive>`
    pub load_command: String,
}

impl Default for PullerConfig {
    fn default() -> Self {
        Self {
            default_registry: DOCKER_HUB_REGISTRY.to_string(),
            auth_url: DOCKER_HUB_AUTH_URL.to_string(),
            auth_service: DOCKER_HUB_AUTH_SERVICE.to_string(),
            insecure: false,
            connect_timeout_secs: 30,
            request_timeout_secs: 600,
            max_concurrent_downloads: 3,
            load_command: "docker".to_string(),
        }
    }
}

impl PullerConfig {
    /// Create config from environment variables and defaults
    pub fn from_env() -> Self {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    fn from_lookup<F>(lookup: F) -> Self
    where
        F: Fn(&str) -> Option<String>,
    {
        let mut config = Self::default();

        if let Some(val) = lookup("PULLER_DEFAULT_REGISTRY") {
            config.default_registry = val;
        }
        if let Some(val) = lookup("PULLER_AUTH_URL") {
            config.auth_url = val;
        }
        if let Some(val) = lookup("PULLER_AUTH_SERVICE") {
            config.auth_service = val;
        }
        if let Some(val) = lookup("PULLER_INSECURE") {
            config.insecure = val.to_lowercase() == "true" || val == "1";
        }
        if let Some(val) = lookup("PULLER_CONNECT_TIMEOUT") {
            if let Ok(timeout) = val.parse() {
                config.connect_timeout_secs = timeout;
            }
        }
        if let Some(val) = lookup("PULLER_TIMEOUT") {
            if let Ok(timeout) = val.parse() {
                config.request_timeout_secs = timeout;
            }
        }
        if let Some(val) = lookup("PULLER_MAX_CONCURRENT") {
            if let Ok(max_concurrent) = val.parse() {
                config.max_concurrent_downloads = max_concurrent;
            }
        }
        if let Some(val) = lookup("PULLER_LOAD_COMMAND") {
            config.load_command = val;
        }

        config
    }

    pub fn validate(&self) -> Result<()> {
        if self.default_registry.is_empty() {
            return Err(PullError::Config(
                "default registry cannot be empty".to_string(),
            ));
        }
        if !self.auth_url.starts_with("http://") && !self.auth_url.starts_with("https://") {
            return Err(PullError::Config(format!(
                "Invalid auth url: {}. Must start with http:// or https://",
                self.auth_url
            )));
        }
        if self.connect_timeout_secs == 0 || self.request_timeout_secs == 0 {
            return Err(PullError::Config(
                "timeouts must be greater than 0".to_string(),
            ));
        }
        if self.max_concurrent_downloads == 0 {
            return Err(PullError::Config(
                "max_concurrent_downloads must be greater than 0".to_string(),
            ));
        }
        if self.load_command.trim().is_empty() {
            return Err(PullError::Config(
                "load command cannot be empty".to_string(),
            ));
        }
        Ok(())
    }

    pub fn with_insecure(mut self, insecure: bool) -> Self {
        self.insecure = insecure;
        self
    }

    pub fn with_request_timeout(mut self, secs: u64) -> Self {
        self.request_timeout_secs = secs;
        self
    }

    pub fn with_max_concurrent_downloads(mut self, max_concurrent: usize) -> Self {
        self.max_concurrent_downloads = max_concurrent;
        self
    }

    pub fn scheme(&self) -> &'static str {
        if self.insecure { "http" } else { "https" }
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }

    pub fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.request_timeout_secs)
    }

    /// Whether `registry` is the one whose token endpoint we know about
    pub fn is_default_registry(&self, registry: &str) -> bool {
        registry == self.default_registry
    }
}
