use std::time::Duration;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SandboxError {
    #[error("Configuration error: {0}")]
    Configuration(String),

    #[error("Unsupported platform: {0}")]
    UnsupportedPlatform(String),

    #[error("Failed to spawn sandbox shell: {0}")]
    Spawn(String),

    #[error("Shell did not answer `{command}` within {after:?}")]
    Timeout { command: String, after: Duration },

    #[error("Shell closed its output stream")]
    Closed,

    #[error("Session is unusable after an earlier failure")]
    Unusable,

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),
}

impl SandboxError {
    /// True when the shell's state can no longer be trusted.
    pub fn poisons_session(&self) -> bool {
        matches!(
            self,
            SandboxError::Timeout { .. }
                | SandboxError::Closed
                | SandboxError::Unusable
                | SandboxError::Io(_)
        )
    }
}
