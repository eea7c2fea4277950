//! Execution Pipeline
//!
//! Deterministic middleware pipeline for all operations:
//! middleware in registration order, then the executor.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;

use serde_json::Value;

use super::context::RequestContext;
use super::error::CoreResult;
use super::middleware::Middleware;
use super::operation::Operation;

/// Result of an operation
pub type OperationResult = CoreResult<Value>;

/// Next middleware in chain
pub struct Next<'a> {
    middleware: &'a [Arc<dyn Middleware>],
    executor: &'a dyn OperationExecutor,
}

impl<'a> Next<'a> {
    pub(crate) fn new(
        middleware: &'a [Arc<dyn Middleware>],
        executor: &'a dyn OperationExecutor,
    ) -> Self {
        Self {
            middleware,
            executor,
        }
    }

    /// Run the next middleware or executor
    pub fn run(
        self,
        op: &'a Operation,
        ctx: &'a mut RequestContext,
    ) -> Pin<Box<dyn Future<Output = OperationResult> + Send + 'a>> {
        Box::pin(async move {
            if let Some((first, rest)) = self.middleware.split_first() {
                let next = Next::new(rest, self.executor);
                first.process(op, ctx, next).await
            } else {
                // End of middleware chain, execute operation
                self.executor.execute(op, ctx).await
            }
        })
    }
}

/// Operation executor (final stage of pipeline)
pub trait OperationExecutor: Send + Sync {
    /// Execute the operation
    fn execute(
        &self,
        op: &Operation,
        ctx: &RequestContext,
    ) -> Pin<Box<dyn Future<Output = OperationResult> + Send + '_>>;
}

/// The unified execution pipeline
pub struct Pipeline {
    middleware: Vec<Arc<dyn Middleware>>,
    executor: Arc<dyn OperationExecutor>,
}

impl Pipeline {
    /// Create a new pipeline with the given executor
    pub fn new(executor: impl OperationExecutor + 'static) -> Self {
        Self {
            middleware: Vec::new(),
            executor: Arc::new(executor),
        }
    }

    /// Add middleware to the pipeline
    pub fn with_middleware(mut self, m: impl Middleware + 'static) -> Self {
        self.middleware.push(Arc::new(m));
        self
    }

    /// Execute an operation through the pipeline
    pub async fn execute(&self, op: Operation, mut ctx: RequestContext) -> OperationResult {
        let next = Next::new(&self.middleware, self.executor.as_ref());
        next.run(&op, &mut ctx).await
    }

    /// Get the number of middleware stages
    pub fn middleware_count(&self) -> usize {
        self.middleware.len()
    }
}
