use crate::error::ToolError;
use async_trait::async_trait;
use serde_json::{Map, Value};
use std::sync::Arc;

/// The callable half of a registered tool.
#[async_trait]
pub trait ToolHandler: Send + Sync {
    /// Invoke with arguments keyed by parameter name. Output is plain text.
    async fn call(&self, args: &Map<String, Value>) -> Result<String, ToolError>;
}

struct FnHandler<F>(F);

#[async_trait]
impl<F> ToolHandler for FnHandler<F>
where
    F: Fn(&Map<String, Value>) -> Result<String, ToolError> + Send + Sync,
{
    async fn call(&self, args: &Map<String, Value>) -> Result<String, ToolError> {
        (self.0)(args)
    }
}

/// Wrap a synchronous closure as a handler.
pub fn handler_fn<F>(f: F) -> Arc<dyn ToolHandler>
where
    F: Fn(&Map<String, Value>) -> Result<String, ToolError> + Send + Sync + 'static,
{
    Arc::new(FnHandler(f))
}
