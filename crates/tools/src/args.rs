//! Named-argument access for handlers.
//!
//! The registry passes arguments through untouched; handlers use this to pull
//! typed values out and report mismatches as their own errors.

use crate::error::ToolError;
use serde_json::{Map, Value};

pub struct Args<'a> {
    tool: &'a str,
    map: &'a Map<String, Value>,
}

impl<'a> Args<'a> {
    pub fn new(tool: &'a str, map: &'a Map<String, Value>) -> Self {
        Self { tool, map }
    }

    /// Reject names the handler does not declare.
    pub fn expect_only(&self, known: &[&str]) -> Result<(), ToolError> {
        match self.map.keys().find(|k| !known.contains(&k.as_str())) {
            Some(unexpected) => Err(ToolError::invalid(
                self.tool,
                format!("unexpected argument `{}`", unexpected),
            )),
            None => Ok(()),
        }
    }

    pub fn str(&self, name: &str) -> Result<&'a str, ToolError> {
        self.opt_str(name)?.ok_or_else(|| {
            ToolError::invalid(self.tool, format!("missing required argument `{}`", name))
        })
    }

    /// `None` for an absent or null argument.
    pub fn opt_str(&self, name: &str) -> Result<Option<&'a str>, ToolError> {
        match self.map.get(name) {
            None | Some(Value::Null) => Ok(None),
            Some(Value::String(s)) => Ok(Some(s.as_str())),
            Some(other) => Err(ToolError::invalid(
                self.tool,
                format!("argument `{}` must be a string, got {}", name, other),
            )),
        }
    }
}
