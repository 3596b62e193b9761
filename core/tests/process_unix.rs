//! Integration tests for Unix process lifecycle coordination
//!
//! These tests run real children and verify that the coordinator:
//! - Hands back a pid and all three streams only for successful launches
//! - Reports creation failures as `LaunchFailure`, never as an exit code
//! - Releases every waiter with the same exit status
//! - Treats signals to exited children as no-ops

#![cfg(unix)]
#![allow(unsafe_code)] // Required for libc calls in tests

use sitter_core::process::{spawn, spawn_async, CommandSpec, ExitStatus, Launcher, Signal};
use sitter_core::CoreError;
use std::io::{ErrorKind, Read, Write};
use std::time::{Duration, Instant};

fn sh(script: &str) -> CommandSpec {
    CommandSpec::new(["sh", "-c", script])
}

/// Test that a successful spawn exposes a pid and all streams immediately
#[test]
fn test_spawn_exposes_pid_and_streams() {
    let mut child = spawn(CommandSpec::new(["sleep", "1"])).expect("Failed to spawn sleep");

    assert!(child.pid() > 0);
    assert!(child.stdin().is_some());
    assert!(child.stdout().is_some());
    assert!(child.stderr().is_some());

    // The pid names a live process we can probe
    let result = unsafe { libc::kill(child.pid() as i32, 0) };
    assert_eq!(result, 0);

    child.destroy().expect("destroy");
    child.wait();
}

/// Test the stdin → stdout round trip through `cat`
#[test]
fn test_echo_stdin_to_stdout() {
    let mut child = spawn(CommandSpec::new(["cat"])).expect("Failed to spawn cat");

    let mut stdin = child.take_stdin().expect("stdin");
    stdin.write_all(b"ping").expect("write");
    drop(stdin);

    let mut out = Vec::new();
    child
        .stdout()
        .expect("stdout")
        .read_to_end(&mut out)
        .expect("read");
    assert_eq!(out, b"ping");

    assert_eq!(child.wait().code(), 0);
}

/// Test that stderr is wired separately from stdout
#[test]
fn test_stderr_is_separate() {
    let mut child = spawn(sh("echo out; echo err >&2")).expect("Failed to spawn sh");

    let out = child.take_stdout().unwrap().read_to_end_vec().unwrap();
    let err = child.take_stderr().unwrap().read_to_end_vec().unwrap();
    assert_eq!(out, b"out\n");
    assert_eq!(err, b"err\n");
    assert!(child.wait().success());
}

/// Test error handling for a nonexistent executable path
#[test]
fn test_spawn_nonexistent_path_is_launch_failure() {
    let result = spawn(CommandSpec::new(["/nonexistent/path/to/binary_12345"]));

    match result {
        Err(CoreError::LaunchFailure { program, source }) => {
            assert_eq!(program, "/nonexistent/path/to/binary_12345");
            assert_eq!(source.kind(), ErrorKind::NotFound);
        }
        Err(e) => panic!("Expected LaunchFailure error, got: {:?}", e),
        Ok(child) => panic!("Expected LaunchFailure, got process {}", child.pid()),
    }
}

/// Test error handling for a bare command name missing from PATH
#[test]
fn test_spawn_nonexistent_command_is_launch_failure() {
    let err = spawn(CommandSpec::new(["this_command_definitely_does_not_exist_12345"]))
        .expect_err("spawn must fail");
    assert!(err.is_launch_failure());
    assert_eq!(err.launch_error_kind(), Some(ErrorKind::NotFound));
}

/// Test that a non-executable file fails at exec time with permission denied
#[test]
fn test_spawn_non_executable_file() {
    let file = tempfile::NamedTempFile::new().expect("tempfile");
    let err = spawn(CommandSpec::new([file.path()])).expect_err("spawn must fail");
    assert_eq!(err.launch_error_kind(), Some(ErrorKind::PermissionDenied));
}

/// Test that a child that starts and fails is an exit code, not a launch failure
#[test]
fn test_failing_child_is_not_launch_failure() {
    let child = spawn(sh("exit 3")).expect("sh starts fine");
    assert_eq!(child.wait(), ExitStatus::Exited(3));
}

/// Test `exit_value` while running and after exit
#[test]
fn test_exit_value_polling() {
    let child = spawn(sh("sleep 0.2; exit 7")).expect("Failed to spawn sh");

    match child.exit_value() {
        Err(CoreError::NotExited { pid }) => assert_eq!(pid, child.pid()),
        other => panic!("Expected NotExited, got {:?}", other),
    }

    let deadline = Instant::now() + Duration::from_secs(10);
    let status = loop {
        match child.exit_value() {
            Ok(status) => break status,
            Err(CoreError::NotExited { .. }) if Instant::now() < deadline => {
                std::thread::sleep(Duration::from_millis(20));
            }
            Err(e) => panic!("exit_value failed: {}", e),
        }
    };
    assert_eq!(status.code(), 7);
}

/// Test that concurrent waiters all observe the same exit
#[test]
fn test_concurrent_waiters() {
    let child = spawn(sh("sleep 0.2; exit 42")).expect("Failed to spawn sh");
    let started = Instant::now();

    let statuses: Vec<ExitStatus> = std::thread::scope(|scope| {
        let handles: Vec<_> = (0..6).map(|_| scope.spawn(|| child.wait())).collect();
        handles.into_iter().map(|h| h.join().unwrap()).collect()
    });

    assert_eq!(statuses.len(), 6);
    assert!(statuses.iter().all(|s| s.code() == 42));
    assert!(started.elapsed() < Duration::from_secs(10));

    // Later waiters return immediately with the same status
    assert_eq!(child.waiter().wait().code(), 42);
}

/// Test destroy on an already-exited process
#[test]
fn test_destroy_after_exit_is_noop() {
    let child = spawn(CommandSpec::new(["true"])).expect("Failed to spawn true");
    assert_eq!(child.wait().code(), 0);

    child.destroy().expect("destroy after exit must succeed");
    child.signal(Signal::SIGTERM).expect("signal after exit must succeed");
    assert_eq!(child.exit_value().unwrap().code(), 0);
    assert!(!child.is_alive());
}

/// Test SIGTERM handling for a long-running process
#[test]
fn test_sigterm_termination() {
    let child = spawn(CommandSpec::new(["sleep", "30"])).expect("Failed to spawn sleep");
    assert!(child.is_alive());

    child.signal(Signal::SIGTERM).expect("Failed to send SIGTERM");

    let status = child
        .wait_timeout(Duration::from_secs(5))
        .expect("sleep should die promptly after SIGTERM");
    assert_eq!(status, ExitStatus::Signaled(libc::SIGTERM));
    assert!(!status.success());
    assert_eq!(status.code(), 128 + libc::SIGTERM);
}

/// Test SIGKILL handling through destroy
#[test]
fn test_destroy_kills_running_process() {
    let child = spawn(CommandSpec::new(["sleep", "30"])).expect("Failed to spawn sleep");

    child.destroy().expect("Failed to destroy");

    let status = child
        .wait_timeout(Duration::from_secs(5))
        .expect("sleep should die promptly after SIGKILL");
    assert_eq!(status.signal(), Some(libc::SIGKILL));
}

/// Test that a configured kill signal is used by destroy
#[test]
fn test_destroy_with_configured_signal() {
    let launcher = Launcher::new().with_kill_signal(Signal::SIGUSR1);
    let child = launcher
        .spawn(CommandSpec::new(["sleep", "30"]))
        .expect("Failed to spawn sleep");

    child.destroy().expect("Failed to destroy");
    let status = child.wait_timeout(Duration::from_secs(5)).expect("exit");
    assert_eq!(status.signal(), Some(libc::SIGUSR1));
}

/// Test that a timed-out wait leaves the handle usable
#[test]
fn test_wait_timeout_then_wait() {
    let child = spawn(sh("sleep 0.3; exit 5")).expect("Failed to spawn sh");

    assert_eq!(child.wait_timeout(Duration::from_millis(10)), None);
    assert!(child.is_alive());
    assert_eq!(child.wait().code(), 5);
}

/// Test that an explicit environment replaces the inherited one
#[test]
fn test_explicit_environment() {
    let cmd = sh("printf '%s' \"$SITTER_TEST_VALUE\"")
        .with_env(["SITTER_TEST_VALUE=hello", "PATH=/usr/bin:/bin"]);
    let mut child = spawn(cmd).expect("Failed to spawn sh");

    let out = child.take_stdout().unwrap().read_to_end_vec().unwrap();
    assert_eq!(out, b"hello");
    assert!(child.wait().success());
}

/// Test spawning multiple processes
#[test]
fn test_multiple_processes() {
    let child1 = spawn(CommandSpec::new(["sleep", "2"])).expect("Failed to spawn first sleep");
    let child2 = spawn(CommandSpec::new(["sleep", "2"])).expect("Failed to spawn second sleep");

    // Should have different PIDs
    assert_ne!(child1.pid(), child2.pid());

    // Clean up both
    child1.destroy().unwrap();
    child2.destroy().unwrap();
    assert!(!child1.wait().success());
    assert!(!child2.wait().success());
}

/// Test that dropping a handle still leaves the child reaped
#[test]
fn test_dropped_handle_child_is_reaped() {
    let child = spawn(CommandSpec::new(["true"])).expect("Failed to spawn true");
    let pid = child.pid() as i32;
    let waiter = child.waiter();
    drop(child);

    assert!(waiter.wait_timeout(Duration::from_secs(5)).is_some());
    // Reaped: the pid no longer names our zombie
    let result = unsafe { libc::waitpid(pid, std::ptr::null_mut(), libc::WNOHANG) };
    assert_eq!(result, -1);
}

#[tokio::test]
async fn test_async_spawn_and_wait() {
    let mut child = spawn_async(sh("echo async; exit 6"))
        .await
        .expect("Failed to spawn sh");
    let mut stdout = child.take_stdout().expect("stdout");

    let out = tokio::task::spawn_blocking(move || stdout.read_to_end_vec())
        .await
        .expect("join")
        .expect("read");
    assert_eq!(out, b"async\n");

    let status = tokio::time::timeout(Duration::from_secs(10), child.wait_async())
        .await
        .expect("child should exit");
    assert_eq!(status.code(), 6);
}

#[tokio::test]
async fn test_async_wait_is_cancellable() {
    let child = spawn_async(CommandSpec::new(["sleep", "30"]))
        .await
        .expect("Failed to spawn sleep");

    // Timing out drops the wait future; the handle is unaffected
    let timed_out = tokio::time::timeout(Duration::from_millis(50), child.wait_async()).await;
    assert!(timed_out.is_err());
    assert!(child.is_alive());

    child.destroy().expect("destroy");
    let status = tokio::time::timeout(Duration::from_secs(5), child.wait_async())
        .await
        .expect("child should exit after destroy");
    assert_eq!(status.signal(), Some(libc::SIGKILL));
}

#[tokio::test]
async fn test_async_spawn_failure() {
    let err = spawn_async(CommandSpec::new(["/nonexistent/binary"]))
        .await
        .expect_err("spawn must fail");
    assert!(matches!(err, CoreError::LaunchFailure { .. }));
}
