use std::process::ExitCode;

use docker_image_puller::cli::{Args, Runner};
use docker_image_puller::logging::init_tracing;

// Returning normally lets the runtime wait for in-flight archive writers,
// which remove their temporary files once cancelled.
#[tokio::main]
async fn main() -> ExitCode {
    let args = Args::parse_args();
    init_tracing(args.verbose);

    let runner = Runner::new(args);
    match runner.run().await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            runner.output().error(&e.to_string());
            ExitCode::FAILURE
        }
    }
}
