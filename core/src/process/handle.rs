//! Launching a child and the handle the caller gets back
//!
//! [`Launcher::spawn`] starts a monitor thread, then blocks on the launch
//! handshake until creation has unambiguously succeeded or failed. It either
//! returns a fully usable [`ProcessHandle`] (pid and all three streams) or
//! the creation error exactly as the OS reported it, wrapped in
//! [`CoreError::LaunchFailure`].
//!
//! After that the handle is a read-only view of the monitor's state plus the
//! parent's stream ends. Any number of threads or tasks may wait for the
//! exit, through the handle itself or through cloned [`ExitWaiter`]s; they are
//! all released by the same broadcast.
//!
//! ## Example
//!
//! ```rust,no_run
//! use sitter_core::process::{spawn, CommandSpec};
//! use std::io::{Read, Write};
//!
//! let mut child = spawn(CommandSpec::new(["cat"]))?;
//! let mut stdin = child.take_stdin().expect("stdin");
//! stdin.write_all(b"ping")?;
//! drop(stdin);
//!
//! let mut out = String::new();
//! child.stdout().expect("stdout").read_to_string(&mut out)?;
//! assert_eq!(out, "ping");
//! assert!(child.wait().success());
//! # Ok::<(), Box<dyn std::error::Error>>(())
//! ```

use super::command::CommandSpec;
use super::handshake::{ExitStatus, HandshakeRx, LaunchOutcome, Liveness};
use super::monitor::{self, Shared};
use super::signal::dispatch;
use super::stdio::{ChildInput, ChildOutput};
use super::unix::{ProcessPrimitives, UnixPrimitives};
use crate::config::LaunchConfig;
use crate::{CoreError, Result};
use nix::sys::signal::Signal;
use nix::unistd::Pid;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Sequence for monitor thread names; pids are unknown when threads start
static MONITOR_SEQ: AtomicU64 = AtomicU64::new(0);

/// Starts children with a fixed set of primitives and settings
#[derive(Debug, Clone)]
pub struct Launcher {
    primitives: Arc<dyn ProcessPrimitives>,
    kill_signal: Signal,
    thread_name: String,
}

impl Default for Launcher {
    fn default() -> Self {
        Self::new()
    }
}

impl Launcher {
    /// Launcher using the Unix primitives and default settings
    pub fn new() -> Self {
        Self::with_primitives(Arc::new(UnixPrimitives::new()))
    }

    /// Launcher using custom primitives
    pub fn with_primitives(primitives: Arc<dyn ProcessPrimitives>) -> Self {
        let defaults = LaunchConfig::default();
        Self {
            kill_signal: primitives.default_kill_signal(),
            primitives,
            thread_name: defaults.monitor_thread_name,
        }
    }

    /// Launcher using the Unix primitives and a validated configuration
    pub fn from_config(config: &LaunchConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            kill_signal: config.kill_signal()?,
            thread_name: config.monitor_thread_name.clone(),
            ..Self::new()
        })
    }

    /// Override the signal `destroy` sends
    pub fn with_kill_signal(mut self, signal: Signal) -> Self {
        self.kill_signal = signal;
        self
    }

    /// Signal `destroy` will send on handles from this launcher
    pub fn kill_signal(&self) -> Signal {
        self.kill_signal
    }

    /// Launch `command`, blocking until creation succeeds or fails.
    ///
    /// Must not be called from inside an async runtime; use
    /// [`Launcher::spawn_async`] there.
    pub fn spawn(&self, command: CommandSpec) -> Result<ProcessHandle> {
        let program = command.display_program();
        let (shared, handshake) = self.start(command, &program)?;
        self.finish(&program, shared, handshake.wait())
    }

    /// Launch `command`, awaiting the handshake instead of blocking.
    ///
    /// Dropping the future before it completes leaves the child to its
    /// monitor, which still reaps it.
    pub async fn spawn_async(&self, command: CommandSpec) -> Result<ProcessHandle> {
        let program = command.display_program();
        let (shared, handshake) = self.start(command, &program)?;
        self.finish(&program, shared, handshake.resolved().await)
    }

    fn start(&self, command: CommandSpec, program: &str) -> Result<(Arc<Shared>, HandshakeRx)> {
        let seq = MONITOR_SEQ.fetch_add(1, Ordering::Relaxed);
        let thread_name = format!("{}-{}", self.thread_name, seq);
        debug!("Launching '{}' via {}", program, thread_name);

        monitor::start(Arc::clone(&self.primitives), command, thread_name)
            .map_err(|e| CoreError::launch(program, e))
    }

    fn finish(
        &self,
        program: &str,
        shared: Arc<Shared>,
        outcome: LaunchOutcome,
    ) -> Result<ProcessHandle> {
        let launched = outcome.map_err(|e| CoreError::launch(program, e))?;
        Ok(ProcessHandle {
            pid: launched.pid,
            stdin: Some(launched.stdin),
            stdout: Some(launched.stdout),
            stderr: Some(launched.stderr),
            shared,
            primitives: Arc::clone(&self.primitives),
            kill_signal: self.kill_signal,
        })
    }
}

/// Launch `command` with the default [`Launcher`]
pub fn spawn(command: CommandSpec) -> Result<ProcessHandle> {
    Launcher::new().spawn(command)
}

/// Launch `command` with the default [`Launcher`] from async code
pub async fn spawn_async(command: CommandSpec) -> Result<ProcessHandle> {
    Launcher::new().spawn_async(command).await
}

/// A launched child process
///
/// Dropping the handle closes any streams still held but does not signal
/// the child; its monitor keeps running and reaps it when it exits.
#[derive(Debug)]
pub struct ProcessHandle {
    pid: Pid,
    stdin: Option<ChildInput>,
    stdout: Option<ChildOutput>,
    stderr: Option<ChildOutput>,
    shared: Arc<Shared>,
    primitives: Arc<dyn ProcessPrimitives>,
    kill_signal: Signal,
}

impl ProcessHandle {
    /// Get the process ID
    pub fn pid(&self) -> u32 {
        self.pid.as_raw() as u32
    }

    /// The child's standard input, unless taken
    pub fn stdin(&mut self) -> Option<&mut ChildInput> {
        self.stdin.as_mut()
    }

    /// The child's standard output, unless taken
    pub fn stdout(&mut self) -> Option<&mut ChildOutput> {
        self.stdout.as_mut()
    }

    /// The child's standard error, unless taken
    pub fn stderr(&mut self) -> Option<&mut ChildOutput> {
        self.stderr.as_mut()
    }

    /// Take ownership of the child's standard input. Dropping it closes the
    /// child's input.
    pub fn take_stdin(&mut self) -> Option<ChildInput> {
        self.stdin.take()
    }

    /// Take ownership of the child's standard output
    pub fn take_stdout(&mut self) -> Option<ChildOutput> {
        self.stdout.take()
    }

    /// Take ownership of the child's standard error
    pub fn take_stderr(&mut self) -> Option<ChildOutput> {
        self.stderr.take()
    }

    /// Whether the child is still running (not yet reaped)
    pub fn is_alive(&self) -> bool {
        self.shared.liveness().is_running()
    }

    /// Block until the child exits and return its status.
    ///
    /// Every caller is released by the same exit; there is no timeout.
    pub fn wait(&self) -> ExitStatus {
        self.shared.wait_exit()
    }

    /// Block until the child exits or `timeout` elapses.
    ///
    /// `None` means the timeout expired; the handle is unaffected and the
    /// wait can be retried.
    pub fn wait_timeout(&self, timeout: Duration) -> Option<ExitStatus> {
        self.shared.wait_exit_timeout(timeout)
    }

    /// Wait for the exit from async code. Cancel by dropping the future.
    pub async fn wait_async(&self) -> ExitStatus {
        self.shared.wait_exit_async().await
    }

    /// The exit status if the child has exited, without blocking
    pub fn exit_value(&self) -> Result<ExitStatus> {
        match self.shared.liveness() {
            Liveness::Exited(status) => Ok(status),
            _ => Err(CoreError::NotExited { pid: self.pid() }),
        }
    }

    /// A cloneable observer of this child's exit
    pub fn waiter(&self) -> ExitWaiter {
        ExitWaiter {
            pid: self.pid,
            shared: Arc::clone(&self.shared),
        }
    }

    /// Send `signal` to the child if it is still running.
    ///
    /// Returns without error when the child has already exited. Delivery is
    /// fire-and-forget; use [`ProcessHandle::wait`] to observe the effect.
    pub fn signal(&self, signal: Signal) -> Result<()> {
        dispatch(self.primitives.as_ref(), &self.shared, self.pid, signal)
    }

    /// Forcefully stop the child with the launcher's kill signal (`SIGKILL`
    /// by default). A no-op once the child has exited.
    pub fn destroy(&self) -> Result<()> {
        self.signal(self.kill_signal)
    }
}

/// Cheap, cloneable observer of one child's exit
#[derive(Debug, Clone)]
pub struct ExitWaiter {
    pid: Pid,
    shared: Arc<Shared>,
}

impl ExitWaiter {
    /// Process being observed
    pub fn pid(&self) -> u32 {
        self.pid.as_raw() as u32
    }

    /// Block until the child exits
    pub fn wait(&self) -> ExitStatus {
        self.shared.wait_exit()
    }

    /// Block until the child exits or `timeout` elapses
    pub fn wait_timeout(&self, timeout: Duration) -> Option<ExitStatus> {
        self.shared.wait_exit_timeout(timeout)
    }

    /// Wait for the exit from async code
    pub async fn wait_async(&self) -> ExitStatus {
        self.shared.wait_exit_async().await
    }

    /// Exit status if already exited
    pub fn try_status(&self) -> Option<ExitStatus> {
        self.shared.liveness().exit_status()
    }
}
