use crate::definition::ToolDefinition;
use crate::error::ToolError;
use crate::traits::ToolHandler;
use serde_json::{Map, Value};
use std::collections::HashMap;
use std::sync::Arc;
use tracing::{debug, info};

struct RegisteredTool {
    definition: ToolDefinition,
    handler: Arc<dyn ToolHandler>,
}

/// Fixed catalog of tools, kept in registration order.
pub struct ToolRegistry {
    order: Vec<String>,
    tools: HashMap<String, RegisteredTool>,
}

impl ToolRegistry {
    pub fn new() -> Self {
        Self {
            order: Vec::new(),
            tools: HashMap::new(),
        }
    }

    pub fn register(
        &mut self,
        definition: ToolDefinition,
        handler: Arc<dyn ToolHandler>,
    ) -> Result<&mut Self, ToolError> {
        let name = definition.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(ToolError::DuplicateTool(name));
        }

        debug!("Registered tool: {}", name);
        self.order.push(name.clone());
        self.tools.insert(name, RegisteredTool { definition, handler });
        Ok(self)
    }

    pub fn get(&self, name: &str) -> Option<&ToolDefinition> {
        self.tools.get(name).map(|t| &t.definition)
    }

    pub fn list(&self) -> Vec<String> {
        self.order.clone()
    }

    pub fn count(&self) -> usize {
        self.order.len()
    }

    pub fn definitions(&self) -> impl Iterator<Item = &ToolDefinition> {
        self.order
            .iter()
            .filter_map(|name| self.tools.get(name))
            .map(|t| &t.definition)
    }

    /// Tool list in the completion service's function format.
    pub fn catalog(&self) -> Vec<Value> {
        self.definitions()
            .map(ToolDefinition::to_function_spec)
            .collect()
    }

    /// Run the named tool with `args` expanded as named parameters.
    ///
    /// Values are not checked against the declared types here; the handler
    /// decides what it accepts.
    pub async fn dispatch(&self, name: &str, args: &Value) -> Result<String, ToolError> {
        let tool = self
            .tools
            .get(name)
            .ok_or_else(|| ToolError::UnknownTool(name.to_string()))?;

        info!("Dispatching tool: {}", name);

        let empty = Map::new();
        let args = match args {
            Value::Object(map) => map,
            Value::Null => &empty,
            other => {
                return Err(ToolError::invalid(
                    name,
                    format!("arguments must be a JSON object, got {}", other),
                ))
            }
        };

        tool.handler.call(args).await
    }
}

impl Default for ToolRegistry {
    fn default() -> Self {
        Self::new()
    }
}
