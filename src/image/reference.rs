//! Image reference parsing
//!
//! Turns user input such as `nginx`, `siglens/siglens:latest` or
//! `localhost:5000/myapp` into the registry host, repository path and tag
//! used by every later stage.

use std::fmt;
use std::str::FromStr;

use crate::config::DOCKER_HUB_REGISTRY;
use crate::error::PullError;

pub const DEFAULT_TAG: &str = "latest";
/// Namespace Docker Hub uses for official images
pub const OFFICIAL_NAMESPACE: &str = "library";
const LOCALHOST: &str = "localhost";

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ImageReference {
    pub registry: String,
    pub repository: String,
    pub tag: String,
}

impl ImageReference {
    /// Parse a reference against the Docker Hub registry.
    ///
    /// Never fails: malformed input yields a best-effort reference. Use
    /// [`str::parse`] for the validating variant.
    pub fn parse(image: &str) -> Self {
        Self::parse_with_default(image, DOCKER_HUB_REGISTRY)
    }

    /// Parse a reference, using `default_registry` when the input names no
    /// registry host.
    ///
    /// - `nginx` -> `<default>/library/nginx:latest`
    /// - `nginx:1.20` -> `<default>/library/nginx:1.20`
    /// - `siglens/siglens:latest` -> `<default>/siglens/siglens:latest`
    /// - `registry.example.com/app:v1` -> `registry.example.com/app:v1`
    /// - `localhost:5000/myapp` -> `localhost:5000/myapp:latest`
    pub fn parse_with_default(image: &str, default_registry: &str) -> Self {
        let mut registry = default_registry.to_string();
        let mut tag = DEFAULT_TAG.to_string();

        // A colon followed by a slash belongs to host:port, not to a tag
        let image_path = match image.split_once(':') {
            Some((path, rest)) if !rest.contains('/') => {
                tag = rest.to_string();
                path
            }
            _ => image,
        };

        let repository = match image_path.split_once('/') {
            Some((first, rest)) if is_registry_host(first) => {
                registry = first.to_string();
                match rest.split_once(':') {
                    Some((repo, explicit_tag)) => {
                        tag = explicit_tag.to_string();
                        repo.to_string()
                    }
                    None => rest.to_string(),
                }
            }
            _ if !image_path.contains('/') => {
                format!("{}/{}", OFFICIAL_NAMESPACE, image_path)
            }
            _ => image_path.to_string(),
        };

        Self {
            registry,
            repository,
            tag,
        }
    }

    /// Strict parse with a custom default registry.
    pub fn parse_strict(image: &str, default_registry: &str) -> Result<Self, PullError> {
        if image.is_empty() {
            return Err(PullError::ReferenceParse(
                "image reference is empty".to_string(),
            ));
        }
        if image.chars().any(char::is_whitespace) {
            return Err(PullError::ReferenceParse(format!(
                "image reference contains whitespace: {:?}",
                image
            )));
        }

        let reference = Self::parse_with_default(image, default_registry);

        if reference.registry.is_empty() {
            return Err(PullError::ReferenceParse(format!(
                "empty registry host in {:?}",
                image
            )));
        }
        if reference.repository.split('/').any(str::is_empty) {
            return Err(PullError::ReferenceParse(format!(
                "empty repository path segment in {:?}",
                image
            )));
        }
        if reference.tag.is_empty() {
            return Err(PullError::ReferenceParse(format!(
                "empty tag in {:?}",
                image
            )));
        }
        if reference.tag.contains(':') {
            return Err(PullError::ReferenceParse(format!(
                "ambiguous colons in {:?}",
                image
            )));
        }

        Ok(reference)
    }

    /// `<repository>:<tag>`, as written into the archive's `RepoTags`
    pub fn repo_tag(&self) -> String {
        format!("{}:{}", self.repository, self.tag)
    }

    /// Default archive file name: `library/nginx:1.25` -> `nginx_1.25.tar`
    pub fn output_file_name(&self) -> String {
        let safe_name = self.repository.replace('/', "_");
        let official_prefix = format!("{}_", OFFICIAL_NAMESPACE);
        let safe_name = safe_name
            .strip_prefix(&official_prefix)
            .unwrap_or(&safe_name);
        format!("{}_{}.tar", safe_name, self.tag)
    }
}

impl FromStr for ImageReference {
    type Err = PullError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::parse_strict(s, DOCKER_HUB_REGISTRY)
    }
}

impl fmt::Display for ImageReference {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}:{}", self.registry, self.repository, self.tag)
    }
}

fn is_registry_host(segment: &str) -> bool {
    segment.contains('.') || segment.contains(':') || segment == LOCALHOST
}
