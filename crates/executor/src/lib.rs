//! Sandboxed shell execution for mangafmt.
//!
//! A single long-lived `bash` runs inside a bubblewrap namespace. Commands are
//! written to its stdin and their output is recovered from stdout by watching
//! for a per-session sentinel line.

pub mod error;
pub mod isolation;
pub mod sentinel;
pub mod session;

pub use error::SandboxError;
pub use isolation::{IsolationBoundary, LaunchSpec, ARCHIVE_MOUNT, DOWNLOAD_MOUNT};
pub use sentinel::{Captured, CommandPhase, SentinelParser};
pub use session::{SandboxSession, SessionOptions, SessionState};
