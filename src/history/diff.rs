//! Diff Engine
//!
//! Computes the sparse change set recorded for diff-mode updates: every
//! top-level field of the new snapshot whose value differs from the prior
//! snapshot, plus the identifier field unconditionally.

use std::fmt;
use std::sync::Arc;

use serde_json::Value;

use super::equality::values_equal;
use super::record::Document;
use crate::observability::Event;

/// Decision reported by a custom diff for one field
#[derive(Debug, Clone, PartialEq)]
pub enum FieldDiff {
    /// Record the field with this value
    Record(Value),
    /// The field is unchanged under the custom semantics
    Skip,
}

/// Per-field override of the comparison semantics.
///
/// Returning `None` declines, and the field is compared with
/// [`values_equal`] instead.
pub trait CustomDiff: Send + Sync {
    fn diff(&self, field: &str, new_value: &Value, old_value: Option<&Value>) -> Option<FieldDiff>;
}

impl<F> CustomDiff for F
where
    F: Fn(&str, &Value, Option<&Value>) -> Option<FieldDiff> + Send + Sync,
{
    fn diff(&self, field: &str, new_value: &Value, old_value: Option<&Value>) -> Option<FieldDiff> {
        self(field, new_value, old_value)
    }
}

/// Diff engine configured with the identifier field and an optional custom diff
#[derive(Clone)]
pub struct DiffEngine {
    id_field: String,
    custom: Option<Arc<dyn CustomDiff>>,
}

impl DiffEngine {
    /// Create a diff engine using structural equality only
    pub fn new(id_field: impl Into<String>) -> Self {
        Self {
            id_field: id_field.into(),
            custom: None,
        }
    }

    /// Attach a custom per-field diff
    pub fn with_custom_diff(mut self, custom: Arc<dyn CustomDiff>) -> Self {
        self.custom = Some(custom);
        self
    }

    /// Identifier field that is always carried into the diff
    pub fn id_field(&self) -> &str {
        &self.id_field
    }

    /// Compute the diff between `before` and `after`.
    ///
    /// When `before` is `None` the new snapshot is used as its own baseline,
    /// which yields a diff holding only the identifier. This under-records the
    /// mutation, so the fallback is logged at WARN.
    pub fn compute_diff(&self, before: Option<&Document>, after: &Document) -> Document {
        let baseline = match before {
            Some(before) => before,
            None => {
                let id = after.get(&self.id_field).cloned().unwrap_or_default();
                tracing::warn!(
                    event = %Event::BaselineFallback,
                    id = %id,
                    "prior snapshot unavailable, diffing document against itself"
                );
                after
            }
        };

        let mut diff = Document::new();
        if let Some(id) = after.get(&self.id_field) {
            diff.insert(self.id_field.clone(), id.clone());
        }

        for (field, new_value) in after {
            if field == &self.id_field {
                continue;
            }
            let old_value = baseline.get(field);

            let overridden = self
                .custom
                .as_ref()
                .and_then(|custom| custom.diff(field, new_value, old_value));

            match overridden {
                Some(FieldDiff::Record(value)) => {
                    diff.insert(field.clone(), value);
                }
                Some(FieldDiff::Skip) => {}
                None => {
                    if !values_equal(Some(new_value), old_value) {
                        diff.insert(field.clone(), new_value.clone());
                    }
                }
            }
        }

        diff
    }
}

impl fmt::Debug for DiffEngine {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DiffEngine")
            .field("id_field", &self.id_field)
            .field("custom", &self.custom.is_some())
            .finish()
    }
}
