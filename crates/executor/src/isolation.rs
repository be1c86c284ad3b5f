//! Namespace isolation for the sandbox shell.

use crate::error::SandboxError;
use std::path::{Path, PathBuf};
use std::process::{Command, Stdio};
use tracing::{info, warn};

/// Mount point of the working-files directory inside the sandbox.
pub const DOWNLOAD_MOUNT: &str = "/download";
/// Mount point of the archive directory inside the sandbox.
pub const ARCHIVE_MOUNT: &str = "/archive";

const SHELL: &str = "/bin/bash";

/// Host directories exposed read-only inside the sandbox.
const RO_BINDS: &[(&str, bool)] = &[
    ("/usr", true),
    ("/bin", false),
    ("/lib", false),
    ("/lib64", false),
    ("/etc", true),
];

const NAMESPACE_CHECK: &[&str] = &[
    "--unshare-pid",
    "--unshare-uts",
    "--unshare-ipc",
    "--unshare-net",
    "--die-with-parent",
    "--ro-bind",
    "/",
    "/",
    "--proc",
    "/proc",
    "true",
];

/// A launchable shell command line.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct LaunchSpec {
    pub program: PathBuf,
    pub args: Vec<String>,
    pub cwd: PathBuf,
}

#[derive(Debug, Clone)]
enum Mode {
    Bubblewrap { bwrap: PathBuf },
    Unisolated,
}

#[derive(Debug, Clone)]
pub struct IsolationBoundary {
    download_dir: PathBuf,
    archive_dir: PathBuf,
    mode: Mode,
}

impl IsolationBoundary {
    /// Build a bubblewrap boundary binding `download_dir` and `archive_dir`
    /// read-write at [`DOWNLOAD_MOUNT`] and [`ARCHIVE_MOUNT`].
    pub fn new(
        download_dir: impl AsRef<Path>,
        archive_dir: impl AsRef<Path>,
    ) -> Result<Self, SandboxError> {
        let download_dir = resolve_dir("download", download_dir.as_ref())?;
        let archive_dir = resolve_dir("archive", archive_dir.as_ref())?;

        if !cfg!(target_os = "linux") {
            return Err(SandboxError::UnsupportedPlatform(format!(
                "namespace isolation requires Linux, running on {}",
                std::env::consts::OS
            )));
        }

        let bwrap = find_on_path("bwrap").ok_or_else(|| {
            SandboxError::UnsupportedPlatform("bubblewrap (`bwrap`) not found on PATH".to_string())
        })?;

        Self::bubblewrap(download_dir, archive_dir, bwrap)
    }

    /// Like [`new`](Self::new) with an explicit `bwrap` binary.
    pub fn with_bwrap(
        download_dir: impl AsRef<Path>,
        archive_dir: impl AsRef<Path>,
        bwrap: impl Into<PathBuf>,
    ) -> Result<Self, SandboxError> {
        let download_dir = resolve_dir("download", download_dir.as_ref())?;
        let archive_dir = resolve_dir("archive", archive_dir.as_ref())?;
        Self::bubblewrap(download_dir, archive_dir, bwrap.into())
    }

    fn bubblewrap(
        download_dir: PathBuf,
        archive_dir: PathBuf,
        bwrap: PathBuf,
    ) -> Result<Self, SandboxError> {
        check_namespaces(&bwrap)?;
        info!("Isolation boundary using {}", bwrap.display());

        Ok(Self {
            download_dir,
            archive_dir,
            mode: Mode::Bubblewrap { bwrap },
        })
    }

    /// Degraded boundary: a plain host shell started in `download_dir`.
    ///
    /// Nothing is isolated. Callers must only reach this through an explicit
    /// opt-in.
    pub fn unisolated(
        download_dir: impl AsRef<Path>,
        archive_dir: impl AsRef<Path>,
    ) -> Result<Self, SandboxError> {
        let download_dir = resolve_dir("download", download_dir.as_ref())?;
        let archive_dir = resolve_dir("archive", archive_dir.as_ref())?;

        warn!(
            "Running WITHOUT namespace isolation; shell has full host access as {}",
            download_dir.display()
        );

        Ok(Self {
            download_dir,
            archive_dir,
            mode: Mode::Unisolated,
        })
    }

    pub fn is_isolated(&self) -> bool {
        matches!(self.mode, Mode::Bubblewrap { .. })
    }

    /// Path of the working-files directory as the shell sees it.
    pub fn download_path(&self) -> PathBuf {
        match self.mode {
            Mode::Bubblewrap { .. } => PathBuf::from(DOWNLOAD_MOUNT),
            Mode::Unisolated => self.download_dir.clone(),
        }
    }

    /// Path of the archive directory as the shell sees it.
    pub fn archive_path(&self) -> PathBuf {
        match self.mode {
            Mode::Bubblewrap { .. } => PathBuf::from(ARCHIVE_MOUNT),
            Mode::Unisolated => self.archive_dir.clone(),
        }
    }

    pub fn launch_spec(&self) -> LaunchSpec {
        let shell_args = ["--noprofile".to_string(), "--norc".to_string()];

        match &self.mode {
            Mode::Unisolated => LaunchSpec {
                program: PathBuf::from(SHELL),
                args: shell_args.to_vec(),
                cwd: self.download_dir.clone(),
            },
            Mode::Bubblewrap { bwrap } => {
                let mut args: Vec<String> = [
                    "--unshare-pid",
                    "--unshare-uts",
                    "--unshare-ipc",
                    "--unshare-net",
                    "--die-with-parent",
                    "--new-session",
                    "--dev-bind",
                    "/dev",
                    "/dev",
                    "--proc",
                    "/proc",
                ]
                .iter()
                .map(|s| s.to_string())
                .collect();

                for (path, required) in RO_BINDS {
                    let flag = if *required { "--ro-bind" } else { "--ro-bind-try" };
                    args.extend([flag.to_string(), path.to_string(), path.to_string()]);
                }

                args.extend(["--tmpfs".to_string(), "/tmp".to_string()]);
                args.extend([
                    "--bind".to_string(),
                    self.download_dir.to_string_lossy().to_string(),
                    DOWNLOAD_MOUNT.to_string(),
                ]);
                args.extend([
                    "--bind".to_string(),
                    self.archive_dir.to_string_lossy().to_string(),
                    ARCHIVE_MOUNT.to_string(),
                ]);
                args.extend(["--chdir".to_string(), DOWNLOAD_MOUNT.to_string()]);
                args.push(SHELL.to_string());
                args.extend(shell_args);

                LaunchSpec {
                    program: bwrap.clone(),
                    args,
                    cwd: self.download_dir.clone(),
                }
            }
        }
    }
}

fn resolve_dir(label: &str, path: &Path) -> Result<PathBuf, SandboxError> {
    let canonical = path.canonicalize().map_err(|e| {
        SandboxError::Configuration(format!(
            "{} directory {} is not accessible: {}",
            label,
            path.display(),
            e
        ))
    })?;

    if !canonical.is_dir() {
        return Err(SandboxError::Configuration(format!(
            "{} path {} is not a directory",
            label,
            canonical.display()
        )));
    }

    Ok(canonical)
}

/// Run a trivial command under the same namespaces the shell will get.
///
/// An installed `bwrap` is not enough: containers often forbid
/// unprivileged user namespaces.
fn check_namespaces(bwrap: &Path) -> Result<(), SandboxError> {
    let output = Command::new(bwrap)
        .args(NAMESPACE_CHECK)
        .stdin(Stdio::null())
        .stdout(Stdio::null())
        .output()
        .map_err(|e| {
            SandboxError::UnsupportedPlatform(format!("cannot run {}: {}", bwrap.display(), e))
        })?;

    if output.status.success() {
        return Ok(());
    }

    let reason = String::from_utf8_lossy(&output.stderr).trim().to_string();
    warn!("{} cannot create namespaces: {}", bwrap.display(), reason);
    Err(SandboxError::UnsupportedPlatform(format!(
        "{} cannot create namespaces ({}): {}",
        bwrap.display(),
        output.status,
        reason
    )))
}

fn find_on_path(binary: &str) -> Option<PathBuf> {
    let paths = std::env::var_os("PATH")?;
    std::env::split_paths(&paths)
        .map(|dir| dir.join(binary))
        .find(|candidate| candidate.is_file())
}
