//! Metadata Enricher
//!
//! Resolves the declared metadata descriptors into extra fields on a history
//! record. Descriptors are independent and resolve concurrently, but
//! [`MetadataEnricher::enrich`] returns only once every descriptor has
//! resolved or one has failed. The first failure aborts the enrichment and no
//! partially enriched record is produced.

use std::collections::HashSet;
use std::fmt;
use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use futures_util::future::try_join_all;
use serde_json::Value;

use super::errors::{HistoryError, HistoryResult};
use super::record::{Document, HistoryRecord, RESERVED_FIELDS};

/// Boxed future returned by asynchronous derivations
pub type BoxFuture<'a, T> = Pin<Box<dyn Future<Output = T> + Send + 'a>>;

/// Synchronous derivation: `(before, after) -> value`
pub type DeriveFn = Arc<dyn Fn(Option<&Document>, Option<&Document>) -> Value + Send + Sync>;

/// Asynchronous derivation: `(before, after) -> future of value or error`
pub type DeriveAsyncFn = Arc<
    dyn Fn(Option<Arc<Document>>, Option<Arc<Document>>) -> BoxFuture<'static, Result<Value, String>>
        + Send
        + Sync,
>;

/// Where a metadata value comes from
#[derive(Clone)]
pub enum MetadataSource {
    /// Copy this field from the after-snapshot
    Field(String),
    /// Compute from the snapshots
    Derive(DeriveFn),
    /// Compute asynchronously from the snapshots
    DeriveAsync(DeriveAsyncFn),
}

impl fmt::Debug for MetadataSource {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MetadataSource::Field(name) => f.debug_tuple("Field").field(name).finish(),
            MetadataSource::Derive(_) => f.write_str("Derive(..)"),
            MetadataSource::DeriveAsync(_) => f.write_str("DeriveAsync(..)"),
        }
    }
}

/// One extra field on every history record
#[derive(Debug, Clone)]
pub struct MetadataDescriptor {
    /// Output field name on the record
    pub key: String,
    /// Value source
    pub source: MetadataSource,
}

impl MetadataDescriptor {
    /// Copy `field` from the after-snapshot into `key`
    pub fn field(key: impl Into<String>, field: impl Into<String>) -> Self {
        Self {
            key: key.into(),
            source: MetadataSource::Field(field.into()),
        }
    }

    /// Derive `key` synchronously
    pub fn derive<F>(key: impl Into<String>, f: F) -> Self
    where
        F: Fn(Option<&Document>, Option<&Document>) -> Value + Send + Sync + 'static,
    {
        Self {
            key: key.into(),
            source: MetadataSource::Derive(Arc::new(f)),
        }
    }

    /// Derive `key` asynchronously
    pub fn derive_async<F, Fut>(key: impl Into<String>, f: F) -> Self
    where
        F: Fn(Option<Arc<Document>>, Option<Arc<Document>>) -> Fut + Send + Sync + 'static,
        Fut: Future<Output = Result<Value, String>> + Send + 'static,
    {
        Self {
            key: key.into(),
            source: MetadataSource::DeriveAsync(Arc::new(
                move |before: Option<Arc<Document>>,
                      after: Option<Arc<Document>>|
                      -> BoxFuture<'static, Result<Value, String>> {
                    Box::pin(f(before, after))
                },
            )),
        }
    }
}

/// Reject duplicate keys and keys that shadow the record envelope
pub fn validate_descriptors(descriptors: &[MetadataDescriptor]) -> HistoryResult<()> {
    let mut seen = HashSet::new();
    for descriptor in descriptors {
        if descriptor.key.is_empty() {
            return Err(HistoryError::InvalidConfig(
                "metadata key must not be empty".to_string(),
            ));
        }
        if RESERVED_FIELDS.contains(&descriptor.key.as_str()) {
            return Err(HistoryError::InvalidConfig(format!(
                "metadata key '{}' is reserved",
                descriptor.key
            )));
        }
        if !seen.insert(descriptor.key.as_str()) {
            return Err(HistoryError::InvalidConfig(format!(
                "duplicate metadata key '{}'",
                descriptor.key
            )));
        }
    }
    Ok(())
}

/// Resolves metadata descriptors onto history records
#[derive(Debug, Clone, Default)]
pub struct MetadataEnricher {
    descriptors: Vec<MetadataDescriptor>,
    timeout: Option<Duration>,
}

impl MetadataEnricher {
    pub fn new(descriptors: Vec<MetadataDescriptor>) -> Self {
        Self {
            descriptors,
            timeout: None,
        }
    }

    /// Bound each asynchronous derivation by `timeout`
    pub fn with_timeout(mut self, timeout: Option<Duration>) -> Self {
        self.timeout = timeout;
        self
    }

    pub fn is_empty(&self) -> bool {
        self.descriptors.is_empty()
    }

    pub fn len(&self) -> usize {
        self.descriptors.len()
    }

    /// Resolve every descriptor and attach the results to `record`
    pub async fn enrich(
        &self,
        before: Option<&Document>,
        after: Option<&Document>,
        record: HistoryRecord,
    ) -> HistoryResult<HistoryRecord> {
        if self.descriptors.is_empty() {
            return Ok(record);
        }

        let shared = if self.has_async() {
            (before.cloned().map(Arc::new), after.cloned().map(Arc::new))
        } else {
            (None, None)
        };

        let pending = self
            .descriptors
            .iter()
            .map(|descriptor| self.resolve(descriptor, before, after, &shared));
        let fields = try_join_all(pending).await?;

        Ok(record.with_metadata(fields))
    }

    fn has_async(&self) -> bool {
        self.descriptors
            .iter()
            .any(|d| matches!(d.source, MetadataSource::DeriveAsync(_)))
    }

    async fn resolve(
        &self,
        descriptor: &MetadataDescriptor,
        before: Option<&Document>,
        after: Option<&Document>,
        shared: &(Option<Arc<Document>>, Option<Arc<Document>>),
    ) -> HistoryResult<(String, Value)> {
        let value = match &descriptor.source {
            MetadataSource::Field(name) => after
                .and_then(|doc| doc.get(name))
                .cloned()
                .unwrap_or(Value::Null),
            MetadataSource::Derive(f) => f(before, after),
            MetadataSource::DeriveAsync(f) => {
                let pending = f(shared.0.clone(), shared.1.clone());
                let outcome = match self.timeout {
                    Some(limit) => tokio::time::timeout(limit, pending)
                        .await
                        .map_err(|_| HistoryError::timeout(format!("metadata:{}", descriptor.key)))?,
                    None => pending.await,
                };
                outcome.map_err(|reason| HistoryError::metadata_failed(&descriptor.key, reason))?
            }
        };

        Ok((descriptor.key.clone(), value))
    }
}
