//! Monitor routine: the dedicated thread that owns a child's blocking calls
//!
//! One monitor thread is started per launch and runs this state machine to
//! completion, exactly once:
//!
//! ```text
//! Idle → Creating → Failed
//!                 → Running → Waiting → Exited
//! ```
//!
//! The monitor is the only writer of the child's [`Liveness`]. It publishes
//! every transition through [`Shared`], which keeps a mutex-guarded copy for
//! blocking readers (with a condvar for the exit broadcast) and a watch
//! channel for async readers. The creation outcome travels separately, over
//! the one-shot handshake, so waiting for creation and waiting for exit never
//! share a wakeup primitive.

use super::command::CommandSpec;
use super::handshake::{
    decode_exec_report, handshake, ExecReport, ExitStatus, HandshakeRx, HandshakeTx, Launched,
    LaunchOutcome, Liveness, RELEASE_TOKEN,
};
use super::unix::{ProcessPrimitives, RawChild};
use nix::sys::signal::Signal;
use nix::unistd::Pid;
use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::OwnedFd;
use std::sync::{Arc, Condvar, Mutex, MutexGuard, PoisonError};
use std::thread;
use std::time::Duration;
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

/// State shared between one monitor and every handle/waiter of its child
#[derive(Debug)]
pub(crate) struct Shared {
    state: Mutex<Liveness>,
    exited: Condvar,
    watch: watch::Sender<Liveness>,
}

impl Shared {
    pub(crate) fn new() -> Arc<Self> {
        let (watch, _) = watch::channel(Liveness::Starting);
        Arc::new(Self {
            state: Mutex::new(Liveness::Starting),
            exited: Condvar::new(),
            watch,
        })
    }

    fn lock(&self) -> MutexGuard<'_, Liveness> {
        // Nothing panics while holding the lock; a poisoned state is still valid
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Current liveness
    pub(crate) fn liveness(&self) -> Liveness {
        *self.lock()
    }

    /// Apply a forward transition and wake everyone observing it
    pub(crate) fn transition(&self, next: Liveness) -> bool {
        let mut state = self.lock();
        if !state.advance(next) {
            return false;
        }
        self.watch.send_replace(next);
        if next.is_exited() {
            self.exited.notify_all();
        }
        true
    }

    /// Block until the child is reaped
    pub(crate) fn wait_exit(&self) -> ExitStatus {
        let state = self.lock();
        let state = self
            .exited
            .wait_while(state, |s| !s.is_exited())
            .unwrap_or_else(PoisonError::into_inner);
        state.exit_status().unwrap_or(ExitStatus::Unknown)
    }

    /// Block until the child is reaped or `timeout` elapses
    pub(crate) fn wait_exit_timeout(&self, timeout: Duration) -> Option<ExitStatus> {
        let state = self.lock();
        let (state, _) = self
            .exited
            .wait_timeout_while(state, timeout, |s| !s.is_exited())
            .unwrap_or_else(PoisonError::into_inner);
        state.exit_status()
    }

    /// Wait for the child to be reaped without blocking a thread
    pub(crate) async fn wait_exit_async(&self) -> ExitStatus {
        let mut rx = self.watch.subscribe();
        let status = rx
            .wait_for(Liveness::is_exited)
            .await
            .ok()
            .and_then(|state| state.exit_status());
        // The sender lives in `self`, so the channel cannot close under us
        status.unwrap_or(ExitStatus::Unknown)
    }
}

/// Everything one monitor thread owns
struct Monitor {
    primitives: Arc<dyn ProcessPrimitives>,
    shared: Arc<Shared>,
    handshake: HandshakeTx,
    command: CommandSpec,
}

/// Start the monitor for `command` on a new thread named `thread_name`.
///
/// Returns the shared state and the caller's side of the handshake. The
/// caller must observe the handshake to learn whether creation succeeded.
pub(crate) fn start(
    primitives: Arc<dyn ProcessPrimitives>,
    command: CommandSpec,
    thread_name: String,
) -> io::Result<(Arc<Shared>, HandshakeRx)> {
    let shared = Shared::new();
    let (tx, rx) = handshake();
    let monitor = Monitor {
        primitives,
        shared: Arc::clone(&shared),
        handshake: tx,
        command,
    };

    debug!("Starting monitor thread {}", thread_name);
    thread::Builder::new()
        .name(thread_name)
        .spawn(move || monitor.run())?;

    Ok((shared, rx))
}

impl Monitor {
    fn run(self) {
        let Monitor {
            primitives,
            shared,
            handshake,
            command,
        } = self;
        let program = command.display_program();

        // Creating
        let launched = match create_and_release(primitives.as_ref(), &command) {
            Ok(launched) => launched,
            Err(e) => {
                warn!("Failed to launch '{}': {}", program, e);
                shared.transition(Liveness::Failed);
                handshake.resolve(Err(e));
                return;
            }
        };
        let pid = launched.pid;

        // Running: liveness is published before the caller can resume
        shared.transition(Liveness::Running);
        info!("Launched '{}' as process {}", program, pid);
        if !handshake.resolve(Ok(launched)) {
            debug!("Caller stopped waiting for process {}; still reaping it", pid);
        }

        // Waiting
        let status = match primitives.wait_for_exit(pid) {
            Ok(status) => status,
            Err(e) => {
                error!("Failed to wait for process {}: {}", pid, e);
                ExitStatus::Unknown
            }
        };

        // Exited
        info!("Process {} exited: {}", pid, status);
        shared.transition(Liveness::Exited(status));
    }
}

/// Create the child, release it, and learn whether its `exec` succeeded.
///
/// On any failure the child (if one was forked) is reaped here and no
/// stream of it escapes.
fn create_and_release(
    primitives: &dyn ProcessPrimitives,
    command: &CommandSpec,
) -> LaunchOutcome {
    let RawChild {
        pid,
        stdin,
        stdout,
        stderr,
        sync,
        exec_report,
    } = primitives.create(command)?;

    let launched = Launched {
        pid,
        stdin: stdin.into(),
        stdout: stdout.into(),
        stderr: stderr.into(),
    };

    release(sync, pid);

    let failure = match read_exec_report(exec_report) {
        Ok(ExecReport::Executed) => return Ok(launched),
        Ok(ExecReport::Failed(e)) => e,
        Ok(ExecReport::Corrupt(len)) => io::Error::new(
            io::ErrorKind::InvalidData,
            format!("malformed exec report from process {} ({} bytes)", pid, len),
        ),
        Err(e) => {
            // The child's state is unknown; make sure it cannot run on
            let _ = primitives.send_signal(pid, Signal::SIGKILL);
            e
        }
    };

    drop(launched);
    match primitives.wait_for_exit(pid) {
        Ok(status) => debug!("Reaped failed child {}: {}", pid, status),
        Err(e) => warn!("Failed to reap failed child {}: {}", pid, e),
    }
    Err(failure)
}

/// Let the child continue to `exec`
fn release(sync: OwnedFd, pid: Pid) {
    let mut sync = File::from(sync);
    if let Err(e) = sync.write_all(&RELEASE_TOKEN) {
        // The child is already gone; the exec report and exit wait tell the rest
        debug!("Could not release process {}: {}", pid, e);
    }
}

fn read_exec_report(exec_report: OwnedFd) -> io::Result<ExecReport> {
    let mut bytes = Vec::new();
    File::from(exec_report).read_to_end(&mut bytes)?;
    Ok(decode_exec_report(&bytes))
}
