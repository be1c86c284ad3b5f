//! The long-lived sandbox shell.

use crate::error::SandboxError;
use crate::isolation::IsolationBoundary;
use crate::sentinel::{Captured, CommandPhase, SentinelParser};
use std::process::Stdio;
use std::time::Duration;
use tokio::io::{AsyncReadExt, AsyncWriteExt};
use tokio::process::{Child, ChildStderr, ChildStdin, ChildStdout, Command};
use tokio::time::timeout;
use tracing::{debug, error, info, warn};

const READ_CHUNK: usize = 4096;

/// Shell setup sent once before the first command. Stderr is folded into
/// stdout so error text reaches the model with the rest of the output.
const HANDSHAKE: &str = "exec 2>&1\n\
PS1=''\n\
PS2=''\n\
bind 'set enable-bracketed-paste off' >/dev/null 2>&1 || true\n";

#[derive(Debug, Clone)]
pub struct SessionOptions {
    /// Upper bound for one command's round trip.
    pub command_timeout: Duration,
    /// How long `shutdown` waits for `exit` before killing the shell.
    pub shutdown_grace: Duration,
}

impl Default for SessionOptions {
    fn default() -> Self {
        Self {
            command_timeout: Duration::from_secs(120),
            shutdown_grace: Duration::from_secs(2),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Ready,
    /// A command timed out or the stream broke; shell state is unknown.
    Poisoned,
    Closed,
}

pub struct SandboxSession {
    child: Child,
    stdin: ChildStdin,
    stdout: ChildStdout,
    /// bwrap's own stderr; the shell redirects its stderr during the handshake.
    stderr: Option<ChildStderr>,
    parser: SentinelParser,
    options: SessionOptions,
    state: SessionState,
}

impl SandboxSession {
    /// Spawn the shell inside `boundary` and wait until it answers.
    pub async fn spawn(
        boundary: &IsolationBoundary,
        options: SessionOptions,
    ) -> Result<Self, SandboxError> {
        let spec = boundary.launch_spec();
        info!(
            "Spawning sandbox shell: {} (isolated: {})",
            spec.program.display(),
            boundary.is_isolated()
        );

        let mut cmd = Command::new(&spec.program);
        cmd.args(&spec.args)
            .current_dir(&spec.cwd)
            .env("TERM", "dumb")
            .stdin(Stdio::piped())
            .stdout(Stdio::piped())
            .stderr(if boundary.is_isolated() {
                Stdio::piped()
            } else {
                Stdio::null()
            })
            .kill_on_drop(true);

        // Own process group so teardown reaches anything the shell started.
        #[cfg(unix)]
        {
            cmd.process_group(0);
        }

        let mut child = cmd
            .spawn()
            .map_err(|e| SandboxError::Spawn(format!("{}: {}", spec.program.display(), e)))?;

        let stdin = child
            .stdin
            .take()
            .ok_or_else(|| SandboxError::Spawn("shell stdin not captured".to_string()))?;
        let stdout = child
            .stdout
            .take()
            .ok_or_else(|| SandboxError::Spawn("shell stdout not captured".to_string()))?;
        let stderr = child.stderr.take();

        let mut session = Self {
            child,
            stdin,
            stdout,
            stderr,
            parser: SentinelParser::with_random_sentinel(),
            options,
            state: SessionState::Ready,
        };

        let script = format!("{}{}\n", HANDSHAKE, session.parser.marker_command());
        if let Err(e) = session.round_trip(script, "<handshake>").await {
            return Err(session.launch_failure(e).await);
        }
        debug!("Sandbox shell ready, sentinel {}", session.parser.sentinel());

        Ok(session)
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn is_usable(&self) -> bool {
        self.state == SessionState::Ready
    }

    /// Run one command line and return its output with trailing newlines trimmed.
    ///
    /// A nonzero exit status is not an error; the shell's own error text is
    /// part of the returned output.
    pub async fn execute(&mut self, line: &str) -> Result<String, SandboxError> {
        let captured = self.execute_captured(line).await?;
        if captured.exit_status != 0 {
            debug!("`{}` exited with status {}", line, captured.exit_status);
        }
        Ok(captured.output)
    }

    /// Like [`execute`](Self::execute) but keeps the exit status.
    pub async fn execute_captured(&mut self, line: &str) -> Result<Captured, SandboxError> {
        if self.state != SessionState::Ready {
            return Err(SandboxError::Unusable);
        }

        let body = if line.trim().is_empty() { ":" } else { line };
        // Brace group keeps `cd` in this shell; /dev/null keeps commands off
        // the protocol stream.
        let script = format!(
            "{{\n{}\n}} </dev/null\n{}\n",
            body,
            self.parser.marker_command()
        );

        debug!(phase = ?CommandPhase::SendingCommand, "{}", line);
        self.round_trip(script, line).await
    }

    pub async fn pwd(&mut self) -> Result<String, SandboxError> {
        self.execute("pwd").await
    }

    pub async fn ls(&mut self, dir: Option<&str>) -> Result<String, SandboxError> {
        match dir {
            Some(dir) if !dir.is_empty() => self.execute(&format!("ls -lagh {}", dir)).await,
            _ => self.execute("ls -lagh").await,
        }
    }

    pub async fn cd(&mut self, dir: &str) -> Result<String, SandboxError> {
        self.execute(&format!("cd {}", dir)).await
    }

    /// Arguments go straight to ImageMagick's `convert`.
    pub async fn convert(&mut self, args: &str) -> Result<String, SandboxError> {
        self.execute(&format!("convert {}", args)).await
    }

    pub async fn unar(&mut self, filename: &str) -> Result<String, SandboxError> {
        self.execute(&format!("unar {}", filename)).await
    }

    pub async fn cp(&mut self, args: &str) -> Result<String, SandboxError> {
        self.execute(&format!("cp {}", args)).await
    }

    pub async fn mv(&mut self, args: &str) -> Result<String, SandboxError> {
        self.execute(&format!("mv {}", args)).await
    }

    /// Ask the shell to exit, then make sure it is gone.
    pub async fn shutdown(mut self) -> Result<(), SandboxError> {
        if self.state == SessionState::Ready {
            let _ = self.stdin.write_all(b"exit\n").await;
            let _ = self.stdin.flush().await;
        }

        match timeout(self.options.shutdown_grace, self.child.wait()).await {
            Ok(Ok(status)) => info!("Sandbox shell exited: {}", status),
            Ok(Err(e)) => {
                warn!("Waiting for sandbox shell failed: {}", e);
                self.kill_group();
            }
            Err(_) => {
                warn!("Sandbox shell ignored exit, killing");
                self.kill_group();
                let _ = self.child.kill().await;
            }
        }

        self.state = SessionState::Closed;
        Ok(())
    }

    /// Turn a broken handshake under bwrap into the reason bwrap printed.
    async fn launch_failure(&mut self, e: SandboxError) -> SandboxError {
        let Some(mut stderr) = self.stderr.take() else {
            return e;
        };
        if !matches!(e, SandboxError::Closed | SandboxError::Io(_)) {
            return e;
        }

        let mut reason = String::new();
        let _ = timeout(Duration::from_secs(1), stderr.read_to_string(&mut reason)).await;
        let reason = reason.trim();

        SandboxError::UnsupportedPlatform(if reason.is_empty() {
            format!("bubblewrap exited before the shell started ({})", e)
        } else {
            format!("bubblewrap could not start the shell: {}", reason)
        })
    }

    async fn round_trip(&mut self, script: String, command: &str) -> Result<Captured, SandboxError> {
        let after = self.options.command_timeout;

        match timeout(after, self.write_and_capture(&script)).await {
            Ok(Ok(captured)) => {
                debug!(phase = ?CommandPhase::Captured, status = captured.exit_status, "{}", command);
                Ok(captured)
            }
            Ok(Err(e)) => {
                error!("Sandbox shell failed during `{}`: {}", command, e);
                self.state = SessionState::Poisoned;
                Err(e)
            }
            Err(_) => {
                error!("Sandbox shell timed out after {:?} on `{}`", after, command);
                self.state = SessionState::Poisoned;
                Err(SandboxError::Timeout {
                    command: command.to_string(),
                    after,
                })
            }
        }
    }

    async fn write_and_capture(&mut self, script: &str) -> Result<Captured, SandboxError> {
        self.stdin.write_all(script.as_bytes()).await?;
        self.stdin.flush().await?;
        debug!(phase = ?CommandPhase::AwaitingSentinel);

        let mut chunk = [0u8; READ_CHUNK];
        loop {
            let n = self.stdout.read(&mut chunk).await?;
            if n == 0 {
                return Err(SandboxError::Closed);
            }
            if let Some(captured) = self.parser.feed(&chunk[..n]) {
                return Ok(captured);
            }
        }
    }

    #[cfg(unix)]
    fn kill_group(&self) {
        if let Some(pid) = self.child.id() {
            // SAFETY: signals the process group created at spawn; no memory is touched.
            unsafe {
                libc::killpg(pid as libc::pid_t, libc::SIGKILL);
            }
        }
    }

    #[cfg(not(unix))]
    fn kill_group(&self) {}
}

impl Drop for SandboxSession {
    fn drop(&mut self) {
        if self.state != SessionState::Closed {
            self.kill_group();
        }
    }
}
