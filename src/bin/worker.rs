//! Worker process: runs one test case against one engine build
//!
//! Launched by the driver with the shared memory region name as its only
//! argument. The outcome travels through the region, so the exit code is 0
//! unless the region itself could not be used.

use clap::Parser;
use framecheck::common::logging;
use framecheck::engine::avisynth::AvisynthLoader;
use framecheck::ipc::worker;

#[derive(Parser)]
#[command(name = "framecheck-worker", about = "framecheck worker process")]
struct Args {
    /// Shared memory region holding the startup envelope
    region: String,
}

fn main() {
    let args = Args::parse();
    logging::init_worker();

    if let Err(e) = worker::serve(&args.region, &AvisynthLoader) {
        tracing::error!(error = %e, region = %args.region, "Worker could not use its region");
        std::process::exit(1);
    }
}
