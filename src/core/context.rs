//! Request Context
//!
//! Context carried through the execution pipeline.

use std::collections::HashMap;

use serde_json::Value;
use uuid::Uuid;

/// Context carried through the execution pipeline
#[derive(Debug, Clone)]
pub struct RequestContext {
    /// Request ID for tracing
    pub request_id: Uuid,

    /// Annotations added by middleware
    pub metadata: HashMap<String, Value>,
}

impl RequestContext {
    /// Create a new request context
    pub fn new() -> Self {
        Self {
            request_id: Uuid::new_v4(),
            metadata: HashMap::new(),
        }
    }

    /// Add metadata
    pub fn with_metadata(mut self, key: impl Into<String>, value: Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }
}

impl Default for RequestContext {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_contexts_have_distinct_ids() {
        let a = RequestContext::new();
        let b = RequestContext::new();
        assert_ne!(a.request_id, b.request_id);
    }

    #[test]
    fn test_with_metadata() {
        let ctx = RequestContext::default().with_metadata("source", Value::from("cli"));
        assert_eq!(ctx.metadata.get("source"), Some(&Value::from("cli")));
    }
}
