//! Command line interface module
//!
//! Argument parsing and the runner that maps `pull` / `dl` onto the
//! [`crate::image::ImageManager`] pipeline.

pub mod args;
pub mod runner;

pub use args::{Args, Command};
pub use runner::Runner;
