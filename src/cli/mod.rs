//! CLI module for aerodb-history
//!
//! Provides maintenance commands for file-backed history collections:
//! - collection: print the derived history collection name
//! - clear: remove every record of a history collection
//! - verify: check record checksums

mod args;
mod commands;
mod errors;

pub use args::{Cli, Command};
pub use commands::{clear, collection, run_command, verify, CliConfig};
pub use errors::{CliError, CliResult};

use crate::observability::init_logging;

/// Parse arguments and run the selected command
pub fn run() -> CliResult<()> {
    let cli = Cli::parse_args();
    init_logging(cli.log_format);

    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()?;
    let output = runtime.block_on(run_command(cli.command))?;

    println!("{}", serde_json::to_string(&output)?);
    Ok(())
}
