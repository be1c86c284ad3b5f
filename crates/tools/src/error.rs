use mangafmt_executor::SandboxError;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ToolError {
    #[error("Got tool call for `{0}`, but not present in list of tools")]
    UnknownTool(String),

    #[error("Tool `{0}` is already registered")]
    DuplicateTool(String),

    #[error("Invalid arguments for `{tool}`: {reason}")]
    InvalidArguments { tool: String, reason: String },

    #[error("Sandbox error: {0}")]
    Sandbox(#[from] SandboxError),
}

impl ToolError {
    pub fn invalid(tool: &str, reason: impl Into<String>) -> Self {
        ToolError::InvalidArguments {
            tool: tool.to_string(),
            reason: reason.into(),
        }
    }

    /// Fatal errors end the run instead of being reported back to the model.
    pub fn is_fatal(&self) -> bool {
        match self {
            ToolError::Sandbox(e) => e.poisons_session(),
            _ => false,
        }
    }
}
