//! History Configuration
//!
//! `HistoryOptions` is the serializable part, loaded from JSON. Functions
//! (custom diff, metadata derivations) cannot come from a file, so they are
//! attached to a `HistoryConfig` in code. Each component is constructed from
//! the config and keeps only the settings it needs.

use std::fmt;
use std::path::Path;
use std::sync::Arc;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use super::diff::{CustomDiff, DiffEngine};
use super::errors::{HistoryError, HistoryResult};
use super::metadata::{validate_descriptors, MetadataDescriptor, MetadataEnricher};

/// Suffix appended to a source collection name
pub const HISTORY_SUFFIX: &str = "_history";

/// Derive the history collection name for a source collection.
///
/// A configured custom name always wins.
pub fn history_collection_name(source: &str, custom: Option<&str>) -> String {
    match custom {
        Some(name) => name.to_string(),
        None => format!("{}{}", source, HISTORY_SUFFIX),
    }
}

/// Serializable history options
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct HistoryOptions {
    /// Overrides the derived history collection name
    #[serde(default)]
    pub custom_collection_name: Option<String>,

    /// Record sparse diffs for updates instead of full snapshots
    #[serde(default)]
    pub diff_only: bool,

    /// Identifier field (default: "_id")
    #[serde(default = "default_id_field")]
    pub id_field: String,

    /// Version marker excluded from history (default: "__v")
    #[serde(default = "default_version_field")]
    pub version_field: String,

    /// Limit for each asynchronous step, in milliseconds (default: none)
    #[serde(default)]
    pub async_timeout_ms: Option<u64>,
}

fn default_id_field() -> String {
    "_id".to_string()
}

fn default_version_field() -> String {
    "__v".to_string()
}

impl Default for HistoryOptions {
    fn default() -> Self {
        Self {
            custom_collection_name: None,
            diff_only: false,
            id_field: default_id_field(),
            version_field: default_version_field(),
            async_timeout_ms: None,
        }
    }
}

impl HistoryOptions {
    /// Load options from a JSON file
    pub fn load(path: &Path) -> HistoryResult<Self> {
        let content = std::fs::read_to_string(path).map_err(|e| {
            HistoryError::InvalidConfig(format!("Failed to read {}: {}", path.display(), e))
        })?;
        Self::from_json(&content)
    }

    /// Parse options from a JSON string
    pub fn from_json(content: &str) -> HistoryResult<Self> {
        let options: HistoryOptions = serde_json::from_str(content)
            .map_err(|e| HistoryError::InvalidConfig(format!("Invalid config JSON: {}", e)))?;
        options.validate()?;
        Ok(options)
    }

    pub fn validate(&self) -> HistoryResult<()> {
        if self.id_field.is_empty() {
            return Err(HistoryError::InvalidConfig("id_field must not be empty".into()));
        }
        if self.version_field.is_empty() {
            return Err(HistoryError::InvalidConfig(
                "version_field must not be empty".into(),
            ));
        }
        if self.id_field == self.version_field {
            return Err(HistoryError::InvalidConfig(
                "id_field and version_field must differ".into(),
            ));
        }
        if matches!(&self.custom_collection_name, Some(name) if name.trim().is_empty()) {
            return Err(HistoryError::InvalidConfig(
                "custom_collection_name must not be blank".into(),
            ));
        }
        if self.async_timeout_ms == Some(0) {
            return Err(HistoryError::InvalidConfig(
                "async_timeout_ms must be > 0".into(),
            ));
        }
        Ok(())
    }

    pub fn async_timeout(&self) -> Option<Duration> {
        self.async_timeout_ms.map(Duration::from_millis)
    }
}

/// Full history configuration
#[derive(Clone, Default)]
pub struct HistoryConfig {
    pub options: HistoryOptions,
    pub custom_diff: Option<Arc<dyn CustomDiff>>,
    pub metadata: Vec<MetadataDescriptor>,
}

impl HistoryConfig {
    pub fn from_options(options: HistoryOptions) -> Self {
        Self {
            options,
            ..Default::default()
        }
    }

    /// Enable or disable diff mode
    pub fn diff_only(mut self, enabled: bool) -> Self {
        self.options.diff_only = enabled;
        self
    }

    pub fn with_collection_name(mut self, name: impl Into<String>) -> Self {
        self.options.custom_collection_name = Some(name.into());
        self
    }

    pub fn with_custom_diff(mut self, custom: impl CustomDiff + 'static) -> Self {
        self.custom_diff = Some(Arc::new(custom));
        self
    }

    /// Append a metadata descriptor; declaration order is kept
    pub fn with_metadata(mut self, descriptor: MetadataDescriptor) -> Self {
        self.metadata.push(descriptor);
        self
    }

    pub fn with_async_timeout(mut self, timeout: Duration) -> Self {
        self.options.async_timeout_ms = Some(timeout.as_millis().max(1) as u64);
        self
    }

    pub fn validate(&self) -> HistoryResult<()> {
        self.options.validate()?;
        validate_descriptors(&self.metadata)
    }

    /// History collection name for a source collection
    pub fn history_collection_name(&self, source: &str) -> String {
        history_collection_name(source, self.options.custom_collection_name.as_deref())
    }

    pub(crate) fn diff_engine(&self) -> DiffEngine {
        let engine = DiffEngine::new(self.options.id_field.clone());
        match &self.custom_diff {
            Some(custom) => engine.with_custom_diff(Arc::clone(custom)),
            None => engine,
        }
    }

    pub(crate) fn enricher(&self) -> MetadataEnricher {
        MetadataEnricher::new(self.metadata.clone()).with_timeout(self.options.async_timeout())
    }
}

impl fmt::Debug for HistoryConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HistoryConfig")
            .field("options", &self.options)
            .field("custom_diff", &self.custom_diff.is_some())
            .field("metadata", &self.metadata)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;
    use tempfile::NamedTempFile;

    #[test]
    fn test_history_collection_name() {
        assert_eq!(history_collection_name("users", None), "users_history");
        assert_eq!(history_collection_name("users", Some("audit")), "audit");
    }

    #[test]
    fn test_default_options() {
        let options = HistoryOptions::default();
        assert_eq!(options.id_field, "_id");
        assert_eq!(options.version_field, "__v");
        assert!(!options.diff_only);
        assert!(options.async_timeout().is_none());
    }

    #[test]
    fn test_from_json_applies_defaults() {
        let options = HistoryOptions::from_json(r#"{"diff_only": true}"#).unwrap();
        assert!(options.diff_only);
        assert_eq!(options.id_field, "_id");
    }

    #[test]
    fn test_from_json_rejects_invalid() {
        assert!(HistoryOptions::from_json("not json").is_err());
        assert!(HistoryOptions::from_json(r#"{"id_field": "__v"}"#).is_err());
        assert!(HistoryOptions::from_json(r#"{"custom_collection_name": " "}"#).is_err());
        assert!(HistoryOptions::from_json(r#"{"async_timeout_ms": 0}"#).is_err());
    }

    #[test]
    fn test_load_from_file() {
        let mut file = NamedTempFile::new().unwrap();
        write!(
            file,
            r#"{{"custom_collection_name": "audit_trail", "async_timeout_ms": 250}}"#
        )
        .unwrap();

        let options = HistoryOptions::load(file.path()).unwrap();
        assert_eq!(options.custom_collection_name.as_deref(), Some("audit_trail"));
        assert_eq!(options.async_timeout(), Some(Duration::from_millis(250)));
    }

    #[test]
    fn test_load_missing_file() {
        let err = HistoryOptions::load(Path::new("/nonexistent/history.json")).unwrap_err();
        assert_eq!(err.code(), "AERO_HISTORY_INVALID_CONFIG");
    }

    #[test]
    fn test_config_validate_checks_metadata() {
        let config = HistoryConfig::default()
            .with_metadata(MetadataDescriptor::field("o", "owner"));
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_config_collection_name_override() {
        let config = HistoryConfig::default().with_collection_name("audit");
        assert_eq!(config.history_collection_name("users"), "audit");
        assert_eq!(
            HistoryConfig::default().history_collection_name("users"),
            "users_history"
        );
    }
}
