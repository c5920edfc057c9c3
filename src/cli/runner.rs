//! Runner: turns parsed arguments into a pull

use crate::cli::args::{Args, Command};
use crate::config::PullerConfig;
use crate::error::{PullError, Result};
use crate::image::ImageManager;
use crate::logging::Logger;

pub struct Runner {
    args: Args,
    output: Logger,
}

impl Runner {
    pub fn new(args: Args) -> Self {
        let output = if args.quiet {
            Logger::new_quiet()
        } else {
            Logger::new(args.verbose)
        };
        Self { args, output }
    }

    pub fn output(&self) -> &Logger {
        &self.output
    }

    /// Run the selected command, stopping early on Ctrl-C
    pub async fn run(&self) -> Result<()> {
        tokio::select! {
            result = self.execute() => result,
            // Dropping `execute()` cancels any archive write in progress
            _ = tokio::signal::ctrl_c() => {
                self.output.warning("Interrupted, cleaning up");
                Err(PullError::Cancelled)
            }
        }
    }

    async fn execute(&self) -> Result<()> {
        let config = self.args.apply_to(PullerConfig::from_env());
        let manager = ImageManager::new(config, self.output.clone())?;
        let reference = manager.parse_reference(self.args.command.image())?;

        self.output.verbose(&format!(
            "Registry: {}, repository: {}, tag: {}",
            reference.registry, reference.repository, reference.tag
        ));

        match &self.args.command {
            Command::Pull { .. } => manager.pull_and_load(&reference).await,
            Command::Dl { output, .. } => manager
                .pull_to_file(&reference, output.as_deref())
                .await
                .map(|_| ()),
        }
    }
}
