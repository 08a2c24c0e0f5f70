// Command Line Interface Module
// clap command surface for the stats server and its offline tools

pub mod commands;

use clap::{Parser, Subcommand, ValueEnum};
use colored::*;

/// vstats - vehicle usage statistics server
#[derive(Parser)]
#[command(name = "vstats")]
#[command(version)]
#[command(about = "Tracks per-vehicle spawn counts and drive time", long_about = None)]
pub struct Cli {
    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Run the stats server (websocket + HTTP)
    Serve {
        /// Configuration file path
        #[arg(short, long, default_value = "vstats.toml")]
        config: String,
    },

    /// Print the leaderboard from the data file and refresh the HTML report
    Report {
        /// Configuration file path
        #[arg(short, long, default_value = "vstats.toml")]
        config: String,

        /// Output format
        #[arg(short, long, value_enum, default_value_t = ReportFormat::Text)]
        format: ReportFormat,

        /// Entries shown in chat format (defaults to aggregator.top_n)
        #[arg(short, long)]
        top: Option<usize>,
    },

    /// Reset all statistics in the data file (console only, server must be stopped)
    Reset {
        /// Configuration file path
        #[arg(short, long, default_value = "vstats.toml")]
        config: String,
    },

    /// Validate configuration file
    Validate {
        /// Configuration file to validate
        #[arg(short, long, default_value = "vstats.toml")]
        file: String,
    },

    /// List the vehicle kinds in the catalog
    Catalog {
        /// Configuration file path
        #[arg(short, long, default_value = "vstats.toml")]
        config: String,
    },

    /// Connect to a server and drive one vehicle as a tracker would
    Drive {
        /// Configuration file path (tracker timing)
        #[arg(short, long, default_value = "vstats.toml")]
        config: String,

        /// Websocket endpoint
        #[arg(short, long, default_value = "ws://127.0.0.1:30125/ws")]
        url: String,

        /// Vehicle model name
        #[arg(long)]
        vehicle: String,

        /// Seconds to stay in the vehicle
        #[arg(short, long, default_value = "65")]
        seconds: u64,

        /// Sit as a passenger instead of the driver
        #[arg(long)]
        passenger: bool,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ReportFormat {
    Text,
    Chat,
    Json,
}

/// Print a success message
pub fn success(msg: &str) {
    println!("{} {}", "✓".green().bold(), msg);
}

/// Print an error message
pub fn error(msg: &str) {
    eprintln!("{} {}", "✗".red().bold(), msg);
}

/// Print an info message
pub fn info(msg: &str) {
    println!("{} {}", "ℹ".blue().bold(), msg);
}

/// Print a warning message
pub fn warning(msg: &str) {
    println!("{} {}", "⚠".yellow().bold(), msg);
}
