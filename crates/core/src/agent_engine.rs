//! The orchestration loop: completion request, tool batch, repeat.

use crate::conversation::Conversation;
use mangafmt_providers::{CompletionService, ProviderError, ToolInvocationRequest};
use mangafmt_tools::{ToolError, ToolRegistry};
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),
    #[error("Sandbox failed while running `{tool}`: {source}")]
    Sandbox { tool: String, source: ToolError },
    #[error("Max iterations ({0}) reached without a final answer")]
    MaxIterations(usize),
}

#[derive(Debug)]
pub enum LoopState {
    AwaitingResponse,
    ExecutingTools(Vec<ToolInvocationRequest>),
    Done(Option<String>),
}

#[derive(Debug)]
pub struct RunOutcome {
    /// Final text from the model, when it sent any.
    pub answer: Option<String>,
    pub conversation: Conversation,
    /// Number of completed `ExecutingTools` phases.
    pub tool_phases: usize,
    pub completions: usize,
}

pub struct AgentEngine {
    provider: Arc<dyn CompletionService>,
    registry: Arc<ToolRegistry>,
    max_iterations: Option<usize>,
}

impl AgentEngine {
    pub fn new(provider: Arc<dyn CompletionService>, registry: Arc<ToolRegistry>) -> Self {
        Self {
            provider,
            registry,
            max_iterations: None,
        }
    }

    /// Cap the number of completion requests per run.
    pub fn with_max_iterations(mut self, max_iterations: Option<usize>) -> Self {
        self.max_iterations = max_iterations;
        self
    }

    pub async fn run(&self, system_prompt: &str, user_input: &str) -> Result<RunOutcome, EngineError> {
        info!("Starting run with {}", self.provider.name());

        let catalog = self.registry.catalog();
        let mut conversation = Conversation::seeded(system_prompt, user_input);
        let mut state = LoopState::AwaitingResponse;
        let mut completions = 0;
        let mut tool_phases = 0;

        loop {
            state = match state {
                LoopState::AwaitingResponse => {
                    if let Some(max) = self.max_iterations {
                        if completions >= max {
                            warn!("Stopping after {} completion requests", max);
                            return Err(EngineError::MaxIterations(max));
                        }
                    }

                    debug_assert!(conversation.unanswered_calls().is_empty());
                    debug!(
                        "Completion request {} with {} messages",
                        completions + 1,
                        conversation.len()
                    );

                    let completion = self
                        .provider
                        .complete(conversation.messages(), &catalog)
                        .await
                        .map_err(|e| {
                            error!("Completion request failed: {}", e);
                            e
                        })?;
                    completions += 1;
                    conversation.push_assistant(&completion);

                    if completion.requests_tools() {
                        LoopState::ExecutingTools(completion.tool_calls)
                    } else {
                        LoopState::Done(completion.content)
                    }
                }
                LoopState::ExecutingTools(batch) => {
                    self.execute_batch(&mut conversation, batch).await?;
                    tool_phases += 1;
                    LoopState::AwaitingResponse
                }
                LoopState::Done(answer) => {
                    info!(
                        "Run finished after {} completion requests, {} tool phases",
                        completions, tool_phases
                    );
                    return Ok(RunOutcome {
                        answer,
                        conversation,
                        tool_phases,
                        completions,
                    });
                }
            };
        }
    }

    /// Run every call in order. Failures become result text unless the
    /// sandbox itself is gone.
    async fn execute_batch(
        &self,
        conversation: &mut Conversation,
        batch: Vec<ToolInvocationRequest>,
    ) -> Result<(), EngineError> {
        for call in batch {
            info!("Executing tool: {}", call.name);

            let output = match self.registry.dispatch(&call.name, &call.arguments).await {
                Ok(output) => output,
                Err(e) if e.is_fatal() => {
                    error!("Tool `{}` broke the sandbox session: {}", call.name, e);
                    return Err(EngineError::Sandbox {
                        tool: call.name,
                        source: e,
                    });
                }
                Err(e) => {
                    warn!("Tool `{}` failed: {}", call.name, e);
                    format!("Error: {}", e)
                }
            };

            conversation.push_tool_result(&call.id, output);
        }
        Ok(())
    }
}
