//! Docker Image Puller Library
//!
//! Pulls an image from a Docker Registry HTTP API v2 endpoint and writes it
//! as a `docker save` compatible archive with decompressed layers.
//!
//! ```no_run
//! use docker_image_puller::{ImageManager, ImageReference, Logger, PullerConfig};
//!
//! # async fn example() -> docker_image_puller::Result<()> {
//! let manager = ImageManager::new(PullerConfig::from_env(), Logger::new(false))?;
//! let reference = ImageReference::parse("nginx:1.25");
//! let path = manager.pull_to_file(&reference, None).await?;
//! println!("saved to {}", path.display());
//! # Ok(())
//! # }
//! ```

pub mod cli;
pub mod config;
pub mod error;
pub mod image;
pub mod logging;
pub mod registry;

pub use config::PullerConfig;
pub use error::{PullError, Result};
pub use image::{ImageManager, ImageReference};
pub use logging::Logger;
