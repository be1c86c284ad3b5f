//! Static tool declarations.

use crate::schema::ParamType;
use serde_json::{json, Map, Value};

#[derive(Debug, Clone, PartialEq)]
pub struct ToolParam {
    pub name: String,
    pub ty: ParamType,
    /// A parameter without a default value is required.
    pub required: bool,
}

/// Name, description and parameter list of one tool.
#[derive(Debug, Clone, PartialEq)]
pub struct ToolDefinition {
    name: String,
    description: String,
    params: Vec<ToolParam>,
}

impl ToolDefinition {
    pub fn builder(name: impl Into<String>) -> ToolDefinitionBuilder {
        ToolDefinitionBuilder {
            name: name.into(),
            description: String::new(),
            params: Vec::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn description(&self) -> &str {
        &self.description
    }

    pub fn params(&self) -> &[ToolParam] {
        &self.params
    }

    pub fn param(&self, name: &str) -> Option<&ToolParam> {
        self.params.iter().find(|p| p.name == name)
    }

    /// Object schema of the parameter list, in declaration order.
    pub fn parameters_schema(&self) -> Value {
        let mut properties = Map::new();
        let mut required = Vec::new();

        for param in &self.params {
            properties.insert(param.name.clone(), param.ty.schema());
            if param.required {
                required.push(Value::String(param.name.clone()));
            }
        }

        json!({
            "type": "object",
            "properties": properties,
            "required": required
        })
    }

    /// Entry for the completion service's `tools` list.
    pub fn to_function_spec(&self) -> Value {
        json!({
            "type": "function",
            "function": {
                "name": self.name,
                "description": self.description,
                "parameters": self.parameters_schema()
            }
        })
    }
}

pub struct ToolDefinitionBuilder {
    name: String,
    description: String,
    params: Vec<ToolParam>,
}

impl ToolDefinitionBuilder {
    pub fn description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    /// Add a parameter that has no default.
    pub fn param(self, name: impl Into<String>, ty: ParamType) -> Self {
        self.push(name.into(), ty, true)
    }

    /// Add a parameter that has a default.
    pub fn optional(self, name: impl Into<String>, ty: ParamType) -> Self {
        self.push(name.into(), ty, false)
    }

    fn push(mut self, name: String, ty: ParamType, required: bool) -> Self {
        // Redeclaring a name replaces it in place.
        match self.params.iter_mut().find(|p| p.name == name) {
            Some(existing) => {
                existing.ty = ty;
                existing.required = required;
            }
            None => self.params.push(ToolParam { name, ty, required }),
        }
        self
    }

    pub fn build(self) -> ToolDefinition {
        ToolDefinition {
            name: self.name,
            description: self.description,
            params: self.params,
        }
    }
}
