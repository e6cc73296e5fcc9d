//! Pandolabo streaming demo
//!
//! Streams payloads from the transfer queue to the compute queue without a
//! window. Two threads record the staging copy into secondary command
//! buffers, the primary releases the shared buffer, and the compute queue
//! acquires it behind a timeline semaphore. The result is read back and
//! verified at the end.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p pandolabo-streaming -- [OPTIONS]
//! ```
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level (e.g., info, debug, trace)

mod config;
mod stream;

use pandolabo_gpu::GpuContextBuilder;
use tracing::{error, info};
use tracing_subscriber::EnvFilter;

use crate::config::AppConfig;
use crate::stream::Streamer;

fn main() -> anyhow::Result<()> {
    let args: Vec<String> = std::env::args().collect();
    if args.iter().any(|arg| arg == "-h" || arg == "--help") {
        print_help();
        return Ok(());
    }

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let config = AppConfig::default().apply_args(&args)?;
    info!(
        "Pandolabo streaming: iterations={}, words={}, threshold={}",
        config.iterations, config.payload_words, config.timeline_threshold
    );

    if let Err(e) = run(config) {
        error!("Streaming failed: {e:#}");
        return Err(e);
    }
    Ok(())
}

fn run(config: AppConfig) -> anyhow::Result<()> {
    let ctx = GpuContextBuilder::new()
        .app_name("pandolabo-streaming")
        .validation(config.validation)
        .headless()
        .build()?;

    let mut streamer = Streamer::new(&ctx, config)?;
    streamer.clear_result(&ctx)?;
    streamer.run()?;
    streamer.verify(&ctx)?;

    ctx.wait_idle()?;
    Ok(())
}

fn print_help() {
    eprintln!(
        "Pandolabo streaming demo

USAGE:
    cargo run -p pandolabo-streaming -- [OPTIONS]

OPTIONS:
    -n, --iterations <N>    Payloads to stream (default: 16)
    -w, --words <N>         Words per payload, even (default: 4096)
    -t, --threshold <N>     Timeline value that triggers semaphore recreation (default: 8)
    --validation            Enable Vulkan validation layers
    -h, --help              Print this help message

ENVIRONMENT VARIABLES:
    RUST_LOG                Set log level (e.g., info, debug, trace)"
    );
}
