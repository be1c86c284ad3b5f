//! Assembly of the mangafmt agent: sandbox, tool registry, completion client
//! and orchestration loop.

pub mod config;
pub mod telemetry;

use config::{Config, ConfigError};
use mangafmt_core::{AgentEngine, EngineError, RunOutcome};
use mangafmt_executor::{IsolationBoundary, SandboxError, SandboxSession, SessionOptions};
use mangafmt_providers::{CompletionService, OpenAICompatibleProvider};
use mangafmt_tools::{register_sandbox_tools, SharedSession, ToolError, ToolRegistry};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use thiserror::Error;
use tokio::sync::Mutex;
use tracing::{info, warn};

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),
    #[error("Failed to read system prompt {path}: {source}")]
    Prompt {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error(transparent)]
    Sandbox(#[from] SandboxError),
    #[error("Tool registration failed: {0}")]
    Tools(#[from] ToolError),
    #[error(transparent)]
    Engine(#[from] EngineError),
}

pub fn load_system_prompt(path: &Path) -> Result<String, AgentError> {
    std::fs::read_to_string(path).map_err(|source| AgentError::Prompt {
        path: path.to_path_buf(),
        source,
    })
}

/// Pick the isolation boundary for `config`.
///
/// Falls back to an unisolated shell only when the platform cannot isolate
/// and `allow_unisolated` is set.
pub fn build_boundary(config: &Config) -> Result<IsolationBoundary, AgentError> {
    select_boundary(
        config,
        IsolationBoundary::new(&config.download_dir, &config.archive_dir),
    )
}

/// Apply the `allow_unisolated` policy to the outcome of building an
/// isolated boundary.
pub fn select_boundary(
    config: &Config,
    isolated: Result<IsolationBoundary, SandboxError>,
) -> Result<IsolationBoundary, AgentError> {
    match isolated {
        Ok(boundary) => Ok(boundary),
        Err(SandboxError::UnsupportedPlatform(reason)) if config.allow_unisolated => {
            warn!("Isolation unavailable ({}); continuing unisolated", reason);
            Ok(IsolationBoundary::unisolated(
                &config.download_dir,
                &config.archive_dir,
            )?)
        }
        Err(e) => Err(e.into()),
    }
}

/// Combine a run's result with the sandbox teardown that followed it.
///
/// A teardown failure is logged and never replaces the run's own outcome.
pub fn finish<T>(
    run: Result<T, AgentError>,
    shutdown: Result<(), AgentError>,
) -> Result<T, AgentError> {
    if let Err(e) = shutdown {
        warn!("Sandbox shutdown failed: {}", e);
    }
    run
}

/// Owns the sandbox session for its whole lifetime.
///
/// Call [`MangaFormatAgent::shutdown`] on the normal path. Dropping the agent
/// kills the shell's process group.
pub struct MangaFormatAgent {
    system_prompt: String,
    session: SharedSession,
    engine: AgentEngine,
}

impl MangaFormatAgent {
    pub async fn new(config: &Config, system_prompt: String) -> Result<Self, AgentError> {
        let boundary = build_boundary(config)?;
        let provider: Arc<dyn CompletionService> = Arc::new(OpenAICompatibleProvider::new(
            config.base_url.clone(),
            Some(config.openai_key.clone()),
            config.model_code.clone(),
        ));
        let options = SessionOptions {
            command_timeout: config.command_timeout(),
            ..SessionOptions::default()
        };
        let max_iterations = Some(config.max_iterations);

        let started = Self::with_provider(
            &boundary,
            options.clone(),
            provider.clone(),
            system_prompt.clone(),
            max_iterations,
        )
        .await;

        // bwrap may pass the namespace check and still fail the real launch.
        match started {
            Err(AgentError::Sandbox(e @ SandboxError::UnsupportedPlatform(_)))
                if boundary.is_isolated() =>
            {
                let fallback = select_boundary(config, Err(e))?;
                Self::with_provider(&fallback, options, provider, system_prompt, max_iterations)
                    .await
            }
            other => other,
        }
    }

    pub async fn with_provider(
        boundary: &IsolationBoundary,
        options: SessionOptions,
        provider: Arc<dyn CompletionService>,
        system_prompt: String,
        max_iterations: Option<usize>,
    ) -> Result<Self, AgentError> {
        let session: SharedSession =
            Arc::new(Mutex::new(SandboxSession::spawn(boundary, options).await?));

        let mut registry = ToolRegistry::new();
        register_sandbox_tools(&mut registry, session.clone())?;
        info!("Agent ready with {} tools", registry.count());

        let engine =
            AgentEngine::new(provider, Arc::new(registry)).with_max_iterations(max_iterations);

        Ok(Self {
            system_prompt,
            session,
            engine,
        })
    }

    pub async fn orchestrate(&self, input: &str) -> Result<RunOutcome, AgentError> {
        Ok(self.engine.run(&self.system_prompt, input).await?)
    }

    /// Stop the shell and wait for it to exit.
    pub async fn shutdown(self) -> Result<(), AgentError> {
        let MangaFormatAgent {
            session, engine, ..
        } = self;
        drop(engine);

        match Arc::try_unwrap(session) {
            Ok(session) => {
                session.into_inner().shutdown().await?;
                info!("Sandbox shell stopped");
            }
            Err(_) => warn!("Sandbox session still shared; leaving teardown to drop"),
        }
        Ok(())
    }
}
