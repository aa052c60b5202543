// SPDX-License-Identifier: GPL-3.0-only

use clap::{Parser, Subcommand};
use std::path::PathBuf;

mod cli;

#[derive(Parser)]
#[command(name = "stream-compositor")]
#[command(about = "Real-time video compositor: filters, overlays and orientation for encoder surfaces")]
#[command(version = env!("GIT_VERSION"))]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Composite a still image through the pipeline and save the result
    Render(cli::RenderArgs),

    /// Show version and GPU adapter information
    Info {
        /// Print the default configuration as JSON
        #[arg(long)]
        config: bool,
    },

    /// Write the default configuration to a file
    InitConfig {
        /// Destination path
        path: PathBuf,
    },
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    // Set RUST_LOG to control log level, e.g. RUST_LOG=stream_compositor=debug
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .with_target(true)
        .with_level(true)
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Render(args) => cli::render(args),
        Commands::Info { config } => cli::info(config),
        Commands::InitConfig { path } => cli::init_config(path),
    }
}
