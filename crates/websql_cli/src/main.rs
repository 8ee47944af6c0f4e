//! WebSQL CLI
//!
//! Replays transaction scenarios through the coordinator against a
//! scripted backend.
//!
//! # Commands
//!
//! - `simulate` - Run a scenario file and print every bridge call and callback
//! - `version` - Show version information

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

/// WebSQL shim command-line tools.
#[derive(Parser)]
#[command(name = "websql")]
#[command(author, version, about, long_about = None)]
struct Cli {
    /// Enable verbose output
    #[arg(global = true, short, long)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Replay a scenario file
    Simulate {
        /// Path to the scenario JSON file
        scenario: PathBuf,

        /// Output format (text, json)
        #[arg(short, long, default_value = "text")]
        format: String,
    },

    /// Show version information
    Version,
}

fn main() -> Result<(), Box<dyn std::error::Error>> {
    let cli = Cli::parse();

    // Initialize logging
    let filter = if cli.verbose {
        EnvFilter::new("debug")
    } else {
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"))
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Simulate { scenario, format } => {
            commands::simulate::run(&scenario, &format)?;
        }
        Commands::Version => {
            println!("WebSQL CLI v{}", env!("CARGO_PKG_VERSION"));
            println!("WebSQL Core v{}", websql_core::VERSION);
        }
    }

    Ok(())
}
