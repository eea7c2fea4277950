//! CLI argument definitions using clap
//!
//! Commands:
//! - aerodb-history collection --config <path> --source <name>
//! - aerodb-history clear --config <path> --source <name>
//! - aerodb-history verify --config <path> --source <name>

use clap::{Parser, Subcommand};
use std::path::PathBuf;

use crate::observability::LogFormat;

/// Maintenance tool for AeroDB history collections
#[derive(Parser, Debug)]
#[command(name = "aerodb-history")]
#[command(version, about, long_about = None)]
pub struct Cli {
    /// Log output format: human or json
    #[arg(long, global = true, default_value = "human")]
    pub log_format: LogFormat,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Subcommand, Debug)]
pub enum Command {
    /// Print the history collection name of a source collection
    Collection {
        /// Path to configuration file
        #[arg(long, default_value = "./aerodb-history.json")]
        config: PathBuf,

        /// Source collection name
        #[arg(long)]
        source: String,
    },

    /// Remove every history record of a source collection
    Clear {
        /// Path to configuration file
        #[arg(long, default_value = "./aerodb-history.json")]
        config: PathBuf,

        /// Source collection name
        #[arg(long)]
        source: String,
    },

    /// Check the checksums of a history collection and count its records
    Verify {
        /// Path to configuration file
        #[arg(long, default_value = "./aerodb-history.json")]
        config: PathBuf,

        /// Source collection name
        #[arg(long)]
        source: String,
    },
}

impl Cli {
    /// Parse command line arguments
    pub fn parse_args() -> Self {
        Cli::parse()
    }
}
