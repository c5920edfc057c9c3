//! Command-line argument parsing

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::config::PullerConfig;

#[derive(Parser, Debug)]
#[command(name = "docker-image-puller")]
#[command(about = "Pull Docker images from a registry without a Docker daemon")]
#[command(version)]
pub struct Args {
    #[command(subcommand)]
    pub command: Command,

    /// Verbose output
    #[arg(long = "verbose", short = 'v', global = true, help = "Enable verbose output")]
    pub verbose: bool,

    /// Quiet mode
    #[arg(
        long = "quiet",
        short = 'q',
        global = true,
        conflicts_with = "verbose",
        help = "Only print errors"
    )]
    pub quiet: bool,

    /// Plain HTTP registries
    #[arg(
        long = "insecure",
        global = true,
        help = "Talk plain HTTP to the registry instead of HTTPS"
    )]
    pub insecure: bool,

    /// Request timeout in seconds
    #[arg(
        long = "timeout",
        short = 't',
        global = true,
        help = "Total timeout for each registry request in seconds"
    )]
    pub timeout: Option<u64>,

    /// Number of concurrent layer downloads
    #[arg(
        long = "concurrency",
        short = 'j',
        global = true,
        help = "Number of layers downloaded at the same time"
    )]
    pub concurrency: Option<usize>,
}

#[derive(Subcommand, Debug, Clone, PartialEq, Eq)]
pub enum Command {
    /// Pull an image and load it with `docker load`
    Pull {
        /// Image reference, e.g. nginx:1.25 or localhost:5000/app
        image: String,
    },
    /// Download an image and save it as a tar archive
    Dl {
        /// Image reference, e.g. nginx:1.25 or localhost:5000/app
        image: String,

        /// Output file (default: <repository>_<tag>.tar in the current directory)
        #[arg(long = "output", short = 'o')]
        output: Option<PathBuf>,
    },
}

impl Command {
    pub fn image(&self) -> &str {
        match self {
            Command::Pull { image } | Command::Dl { image, .. } => image,
        }
    }
}

impl Args {
    pub fn parse_args() -> Self {
        Args::parse()
    }

    /// Apply command-line overrides on top of `config`
    pub fn apply_to(&self, config: PullerConfig) -> PullerConfig {
        let mut config = if self.insecure {
            config.with_insecure(true)
        } else {
            config
        };
        if let Some(timeout) = self.timeout {
            config = config.with_request_timeout(timeout);
        }
        if let Some(concurrency) = self.concurrency {
            config = config.with_max_concurrent_downloads(concurrency);
        }
        config
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_pull_subcommand() {
        let args = Args::try_parse_from(["docker-image-puller", "pull", "nginx"]).unwrap();
        assert_eq!(args.command, Command::Pull { image: "nginx".to_string() });
        assert!(!args.verbose);
    }

    #[test]
    fn test_dl_with_output_and_global_flags() {
        let args = Args::try_parse_from([
            "docker-image-puller",
            "dl",
            "localhost:5000/app:v1",
            "-o",
            "/tmp/app.tar",
            "--insecure",
            "-j",
            "5",
        ])
        .unwrap();

        assert_eq!(
            args.command,
            Command::Dl {
                image: "localhost:5000/app:v1".to_string(),
                output: Some(PathBuf::from("/tmp/app.tar")),
            }
        );
        let config = args.apply_to(PullerConfig::default());
        assert!(config.insecure);
        assert_eq!(config.max_concurrent_downloads, 5);
        assert_eq!(config.request_timeout_secs, 600);
    }

    #[test]
    fn test_verbose_conflicts_with_quiet() {
        assert!(Args::try_parse_from(["docker-image-puller", "-v", "-q", "pull", "nginx"]).is_err());
    }

    #[test]
    fn test_missing_image_is_rejected() {
        assert!(Args::try_parse_from(["docker-image-puller", "dl"]).is_err());
    }
}
