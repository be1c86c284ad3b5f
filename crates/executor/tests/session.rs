#![allow(clippy::unwrap_used, clippy::expect_used, clippy::panic)]

use mangafmt_executor::*;
use std::time::{Duration, Instant};
use tempfile::TempDir;

struct Fixture {
    download: TempDir,
    archive: TempDir,
    boundary: IsolationBoundary,
}

fn fixture() -> Fixture {
    let download = TempDir::new().unwrap();
    let archive = TempDir::new().unwrap();
    let boundary = IsolationBoundary::unisolated(download.path(), archive.path()).unwrap();
    Fixture {
        download,
        archive,
        boundary,
    }
}

async fn spawn(fx: &Fixture) -> SandboxSession {
    SandboxSession::spawn(&fx.boundary, SessionOptions::default())
        .await
        .unwrap()
}

#[tokio::test]
async fn test_starts_in_download_dir() {
    let fx = fixture();
    let mut session = spawn(&fx).await;

    let pwd = session.pwd().await.unwrap();
    assert_eq!(pwd, fx.boundary.download_path().to_string_lossy());

    session.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_cd_then_pwd_returns_archive() {
    let fx = fixture();
    let mut session = spawn(&fx).await;
    let archive = fx.boundary.archive_path().to_string_lossy().to_string();

    let out = session.cd(&archive).await.unwrap();
    assert_eq!(out, "");

    let pwd = session.pwd().await.unwrap();
    assert_eq!(pwd, archive);
}

#[tokio::test]
async fn test_shell_state_persists_between_commands() {
    let fx = fixture();
    let mut session = spawn(&fx).await;

    session.execute("export MANGA_TITLE=berserk").await.unwrap();
    let out = session.execute("echo $MANGA_TITLE").await.unwrap();
    assert_eq!(out, "berserk");
}

#[tokio::test]
async fn test_output_without_trailing_newline() {
    let fx = fixture();
    let mut session = spawn(&fx).await;

    let out = session.execute("printf 'abc'").await.unwrap();
    assert_eq!(out, "abc");
}

#[tokio::test]
async fn test_multiline_output_keeps_inner_newlines() {
    let fx = fixture();
    let mut session = spawn(&fx).await;

    let out = session.execute("printf 'a\\n\\nb\\n\\n\\n'").await.unwrap();
    assert_eq!(out, "a\n\nb");
}

#[tokio::test]
async fn test_nonzero_exit_returns_error_text() {
    let fx = fixture();
    let mut session = spawn(&fx).await;

    let captured = session
        .execute_captured("ls does-not-exist")
        .await
        .unwrap();
    assert_ne!(captured.exit_status, 0);
    assert!(captured.output.contains("does-not-exist"));
    assert!(session.is_usable());
}

#[tokio::test]
async fn test_commands_cannot_read_protocol_stream() {
    let fx = fixture();
    let mut session = spawn(&fx).await;

    let out = session.execute("cat").await.unwrap();
    assert_eq!(out, "");

    let out = session.execute("echo still-synced").await.unwrap();
    assert_eq!(out, "still-synced");
}

#[tokio::test]
async fn test_empty_line_is_noop() {
    let fx = fixture();
    let mut session = spawn(&fx).await;

    assert_eq!(session.execute("").await.unwrap(), "");
    assert!(session.is_usable());
}

#[tokio::test]
async fn test_cp_and_mv_touch_host_directories() {
    let fx = fixture();
    std::fs::write(fx.download.path().join("page-01.jpg"), b"jpeg").unwrap();
    let mut session = spawn(&fx).await;
    let archive = fx.boundary.archive_path().to_string_lossy().to_string();

    session.cp("page-01.jpg page-02.jpg").await.unwrap();
    session
        .mv(&format!("page-02.jpg {}/", archive))
        .await
        .unwrap();

    assert!(fx.download.path().join("page-01.jpg").exists());
    assert!(!fx.download.path().join("page-02.jpg").exists());
    assert!(fx.archive.path().join("page-02.jpg").exists());

    let listing = session.ls(Some(&archive)).await.unwrap();
    assert!(listing.contains("page-02.jpg"));
}

#[tokio::test]
async fn test_timeout_poisons_session() {
    let fx = fixture();
    let options = SessionOptions {
        command_timeout: Duration::from_millis(300),
        ..SessionOptions::default()
    };
    let mut session = SandboxSession::spawn(&fx.boundary, options).await.unwrap();

    let started = Instant::now();
    let result = session.execute("sleep 5").await;
    assert!(started.elapsed() < Duration::from_secs(3));

    match result {
        Err(SandboxError::Timeout { command, .. }) => assert_eq!(command, "sleep 5"),
        other => panic!("Expected timeout, got {:?}", other),
    }
    assert_eq!(session.state(), SessionState::Poisoned);

    let again = session.execute("pwd").await;
    assert!(matches!(again, Err(SandboxError::Unusable)));

    session.shutdown().await.unwrap();
}

#[tokio::test]
async fn test_exit_closes_session() {
    let fx = fixture();
    let mut session = spawn(&fx).await;

    let result = session.execute("exit 0").await;
    assert!(matches!(result, Err(SandboxError::Closed)));
    assert!(!session.is_usable());
}

#[cfg(unix)]
#[tokio::test]
async fn test_bwrap_failing_at_launch_is_unsupported_platform() {
    use std::os::unix::fs::PermissionsExt;

    let download = TempDir::new().unwrap();
    let archive = TempDir::new().unwrap();
    let bin = TempDir::new().unwrap();

    // Passes the namespace check, then refuses the real launch.
    let bwrap = bin.path().join("bwrap");
    std::fs::write(
        &bwrap,
        "#!/bin/sh\n\
         for last; do :; done\n\
         [ \"$last\" = true ] && exit 0\n\
         echo 'bwrap: Can'\\''t mount proc on /newroot/proc: Operation not permitted' >&2\n\
         exit 1\n",
    )
    .unwrap();
    std::fs::set_permissions(&bwrap, std::fs::Permissions::from_mode(0o755)).unwrap();

    let boundary = IsolationBoundary::with_bwrap(download.path(), archive.path(), &bwrap).unwrap();
    assert!(boundary.is_isolated());

    let result = SandboxSession::spawn(&boundary, SessionOptions::default()).await;
    match result {
        Err(SandboxError::UnsupportedPlatform(msg)) => {
            assert!(msg.contains("mount proc"), "unexpected reason: {}", msg)
        }
        Err(other) => panic!("Expected unsupported platform, got {:?}", other),
        Ok(_) => panic!("Expected launch to fail"),
    }
}
