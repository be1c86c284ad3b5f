pub mod agent_engine;
pub mod conversation;

pub use agent_engine::{AgentEngine, EngineError, LoopState, RunOutcome};
pub use conversation::Conversation;
