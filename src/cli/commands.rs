//! CLI command implementations
//!
//! Each command loads the configuration, acts on the file-backed history
//! store under `data_dir` and returns a JSON response:
//!
//! ```text
//! {"status": "ok", "data": {...}}
//! ```

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::{json, Value};

use crate::history::{FileHistoryStore, HistoryConfig, HistoryOptions, MutationCoordinator};
use crate::observability::Event;

use super::args::Command;
use super::errors::{CliError, CliResult};

/// Configuration file structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CliConfig {
    /// Directory of the file history store (required)
    pub data_dir: PathBuf,

    /// History options, inline at the top level
    #[serde(flatten)]
    pub history: HistoryOptions,
}

impl CliConfig {
    /// Load configuration from file
    pub fn load(path: &Path) -> CliResult<Self> {
        let content = std::fs::read_to_string(path)
            .map_err(|e| CliError::config_error(format!("Failed to read config: {}", e)))?;

        let config: CliConfig = serde_json::from_str(&content)
            .map_err(|e| CliError::config_error(format!("Invalid config JSON: {}", e)))?;

        config.validate()?;

        tracing::debug!(
            event = %Event::ConfigLoaded,
            path = %path.display(),
            data_dir = %config.data_dir.display()
        );
        Ok(config)
    }

    fn validate(&self) -> CliResult<()> {
        if self.data_dir.as_os_str().is_empty() {
            return Err(CliError::config_error("data_dir must not be empty"));
        }
        self.history
            .validate()
            .map_err(|e| CliError::config_error(e.to_string()))
    }

    async fn coordinator(&self) -> CliResult<(MutationCoordinator, Arc<FileHistoryStore>)> {
        let store = Arc::new(FileHistoryStore::open(&self.data_dir).await?);
        let config = HistoryConfig::from_options(self.history.clone());
        let coordinator = MutationCoordinator::new(&config, store.clone())?;
        Ok((coordinator, store))
    }
}

/// Run a parsed command, returning the response body
pub async fn run_command(command: Command) -> CliResult<Value> {
    let data = match command {
        Command::Collection { config, source } => collection(&config, &source)?,
        Command::Clear { config, source } => clear(&config, &source).await?,
        Command::Verify { config, source } => verify(&config, &source).await?,
    };

    Ok(json!({
        "status": "ok",
        "data": data
    }))
}

/// Derive the history collection name for `source`
pub fn collection(config_path: &Path, source: &str) -> CliResult<Value> {
    let config = CliConfig::load(config_path)?;
    let name = crate::history::history_collection_name(
        source,
        config.history.custom_collection_name.as_deref(),
    );

    Ok(json!({
        "source": source,
        "history_collection": name
    }))
}

/// Clear the history collection of `source`
pub async fn clear(config_path: &Path, source: &str) -> CliResult<Value> {
    let config = CliConfig::load(config_path)?;
    let (coordinator, _store) = config.coordinator().await?;

    coordinator.clear_history(source).await?;

    Ok(json!({
        "history_collection": coordinator.history_collection_name(source),
        "cleared": true
    }))
}

/// Verify every record checksum of the history collection of `source`
pub async fn verify(config_path: &Path, source: &str) -> CliResult<Value> {
    let config = CliConfig::load(config_path)?;
    let (coordinator, store) = config.coordinator().await?;
    let name = coordinator.history_collection_name(source);

    let records = store.verify(&name).await?;

    tracing::info!(event = %Event::Verified, collection = %name, records = records.len());

    Ok(json!({
        "history_collection": name,
        "records": records.len(),
        "valid": true
    }))
}
