//! Error types for the pull pipeline
//!
//! Every stage reports failures through [`PullError`]. The top-level
//! pipeline wraps stage errors in [`PullError::Stage`] so the final message
//! names the step that failed, e.g. `downloading layer 3 failed: ...`.

pub mod handlers;

use std::fmt;

use thiserror::Error;

pub type Result<T> = std::result::Result<T, PullError>;

/// Which blob a fetch was for, used to tag blob errors.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BlobRole {
    Config,
    /// Zero-based position in the manifest's layer list.
    Layer(usize),
}

impl fmt::Display for BlobRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BlobRole::Config => write!(f, "config"),
            BlobRole::Layer(index) => write!(f, "layer {}", index + 1),
        }
    }
}

#[derive(Debug, Error)]
pub enum PullError {
    #[error("Invalid image reference: {0}")]
    ReferenceParse(String),

    #[error("Authentication error: {0}")]
    Auth(String),

    #[error("Manifest request failed with status {status}: {body}")]
    Manifest { status: u16, body: String },

    #[error("Failed to decode manifest: {reason} (response: {body})")]
    ManifestDecode { reason: String, body: String },

    #[error("Manifest list resolution failed: {0}")]
    ManifestListResolution(String),

    #[error("Failed to download {role} blob{}: {reason}", status_suffix(.status))]
    Blob {
        role: BlobRole,
        status: Option<u16>,
        reason: String,
    },

    #[error("Failed to build image archive: {0}")]
    ArchiveBuild(String),

    #[error("`{command}` failed: {status}")]
    ExternalLoad { command: String, status: String },

    #[error("Network error: {0}")]
    Network(String),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("Operation cancelled")]
    Cancelled,

    #[error("{stage} failed: {source}")]
    Stage {
        stage: String,
        #[source]
        source: Box<PullError>,
    },
}

fn status_suffix(status: &Option<u16>) -> String {
    match status {
        Some(code) => format!(" (status {})", code),
        None => String::new(),
    }
}

impl PullError {
    /// Wrap this error with the name of the pipeline stage it came from.
    pub fn in_stage(self, stage: impl Into<String>) -> Self {
        PullError::Stage {
            stage: stage.into(),
            source: Box::new(self),
        }
    }

    /// The innermost error, skipping any stage wrappers.
    pub fn root(&self) -> &PullError {
        match self {
            PullError::Stage { source, .. } => source.root(),
            other => other,
        }
    }
}

/// Attach stage context to a fallible result.
pub trait StageContext<T> {
    fn stage(self, stage: impl Into<String>) -> Result<T>;
}

impl<T> StageContext<T> for Result<T> {
    fn stage(self, stage: impl Into<String>) -> Result<T> {
        self.map_err(|e| e.in_stage(stage))
    }
}
