//! The sandbox shell operations exposed to the model.

use crate::args::Args;
use crate::definition::ToolDefinition;
use crate::error::ToolError;
use crate::registry::ToolRegistry;
use crate::schema::ParamType;
use crate::traits::ToolHandler;
use async_trait::async_trait;
use mangafmt_executor::SandboxSession;
use serde_json::{Map, Value};
use std::sync::Arc;
use tokio::sync::Mutex;

/// The one shell session, shared by every sandbox tool.
pub type SharedSession = Arc<Mutex<SandboxSession>>;

const CONVERT_DOC: &str = "Convert between image formats as well as resize an image, blur, crop, despeckle, dither, draw on, flip, join, re-sample, and much more.
This is equivalent to running the imagemagick convert command `convert {string}`.

Example: `convert(\"my-directory/my-directory-*.jpeg ./my-directory.pdf\")` aliases to `convert my-directory/my-directory-*.jpeg ./my-directory.pdf`";

const CP_DOC: &str = "Copies files/directories to another location.
This is equivalent to running `cp {string}`.";

const MV_DOC: &str = "Moves files/directories to another location.
This is equivalent to running `mv {string}`.";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Pwd,
    Ls,
    Cd,
    Convert,
    Unar,
    Cp,
    Mv,
}

impl Operation {
    const ALL: [Operation; 7] = [
        Operation::Pwd,
        Operation::Ls,
        Operation::Cd,
        Operation::Convert,
        Operation::Unar,
        Operation::Cp,
        Operation::Mv,
    ];

    fn name(self) -> &'static str {
        match self {
            Operation::Pwd => "pwd",
            Operation::Ls => "ls",
            Operation::Cd => "cd",
            Operation::Convert => "convert",
            Operation::Unar => "unar",
            Operation::Cp => "cp",
            Operation::Mv => "mv",
        }
    }

    /// Name of the single string parameter, if any.
    fn param(self) -> Option<&'static str> {
        match self {
            Operation::Pwd => None,
            Operation::Ls | Operation::Cd => Some("dir"),
            Operation::Unar => Some("filename"),
            Operation::Convert | Operation::Cp | Operation::Mv => Some("string"),
        }
    }

    fn definition(self) -> ToolDefinition {
        let builder = ToolDefinition::builder(self.name());
        let builder = match self {
            Operation::Pwd => builder.description("Return working directory name"),
            Operation::Ls => builder
                .description("Return contents of given directory (default: working directory)")
                .optional("dir", ParamType::optional(ParamType::String)),
            Operation::Cd => builder
                .description("Change working directory to given directory")
                .param("dir", ParamType::String),
            Operation::Convert => builder
                .description(CONVERT_DOC)
                .param("string", ParamType::String),
            Operation::Unar => builder
                .description("Extracts given tarball")
                .param("filename", ParamType::String),
            Operation::Cp => builder.description(CP_DOC).param("string", ParamType::String),
            Operation::Mv => builder.description(MV_DOC).param("string", ParamType::String),
        };
        builder.build()
    }
}

struct SandboxTool {
    op: Operation,
    session: SharedSession,
}

#[async_trait]
impl ToolHandler for SandboxTool {
    async fn call(&self, args: &Map<String, Value>) -> Result<String, ToolError> {
        let name = self.op.name();
        let args = Args::new(name, args);
        args.expect_only(self.op.param().as_slice())?;

        let mut session = self.session.lock().await;
        let output = match self.op {
            Operation::Pwd => session.pwd().await?,
            Operation::Ls => session.ls(args.opt_str("dir")?).await?,
            Operation::Cd => session.cd(args.str("dir")?).await?,
            Operation::Convert => session.convert(args.str("string")?).await?,
            Operation::Unar => session.unar(args.str("filename")?).await?,
            Operation::Cp => session.cp(args.str("string")?).await?,
            Operation::Mv => session.mv(args.str("string")?).await?,
        };

        Ok(output)
    }
}

/// Declarations of every sandbox tool, in catalog order.
pub fn sandbox_tool_definitions() -> Vec<ToolDefinition> {
    Operation::ALL.iter().map(|op| op.definition()).collect()
}

pub fn register_sandbox_tools(
    registry: &mut ToolRegistry,
    session: SharedSession,
) -> Result<(), ToolError> {
    for op in Operation::ALL {
        registry.register(
            op.definition(),
            Arc::new(SandboxTool {
                op,
                session: session.clone(),
            }),
        )?;
    }
    Ok(())
}
