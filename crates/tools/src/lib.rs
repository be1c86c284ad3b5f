pub mod args;
pub mod definition;
pub mod error;
pub mod registry;
pub mod sandbox_tools;
pub mod schema;
pub mod traits;

pub use definition::{ToolDefinition, ToolDefinitionBuilder, ToolParam};
pub use error::ToolError;
pub use registry::ToolRegistry;
pub use sandbox_tools::{register_sandbox_tools, sandbox_tool_definitions, SharedSession};
pub use schema::ParamType;
pub use traits::{handler_fn, ToolHandler};
