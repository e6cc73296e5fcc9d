//! Pandolabo demo viewer
//!
//! Opens a window and clears it every frame with a colour uploaded through
//! the transfer queue. The upload signals a per-slot timeline that the
//! graphics submission waits on, and the uniform buffer is released and
//! acquired across queue families when they differ.
//!
//! ## Usage
//!
//! ```bash
//! cargo run -p pandolabo-viewer -- [OPTIONS]
//! ```
//!
//! ## Environment Variables
//!
//! - `RUST_LOG`: Set log level (e.g., info, debug, trace)

mod runner;
mod viewer;

use tracing_subscriber::EnvFilter;

use crate::runner::AppConfig;

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

    let config = AppConfig::new("Pandolabo Viewer").apply_args(&args)?;
    runner::run(config)
}

fn print_help() {
    eprintln!(
        "Pandolabo demo viewer

USAGE:
    cargo run -p pandolabo-viewer -- [OPTIONS]

OPTIONS:
    --size <W>x<H>          Initial window size (default: 1280x720)
    --no-vsync              Disable vsync
    --validation            Enable Vulkan validation layers
    -h, --help              Print this help message

ENVIRONMENT VARIABLES:
    RUST_LOG                Set log level (e.g., info, debug, trace)"
    );
}
