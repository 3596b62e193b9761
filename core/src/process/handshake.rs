//! Launch handshake protocol
//!
//! Process creation is split across two threads of control: the caller that
//! asked for the process and the monitor thread that owns the blocking OS
//! calls. This module holds the pieces both sides agree on:
//!
//! - [`Liveness`]: the forward-only lifecycle of one child
//! - [`ExitStatus`]: what the exit wait reported
//! - the one-shot handshake channel that moves the creation outcome (three
//!   streams and a pid, or the original `io::Error`) to the caller
//! - the bytes exchanged with the forked child: the release token that lets
//!   it proceed to `exec`, and the exec-report record it writes back if
//!   `exec` fails
//!
//! ```text
//! caller                     monitor                       child
//!   | start monitor            |                             |
//!   |------------------------->| create (fork)               |
//!   | blocks on handshake      |---------------------------->| blocks on sync pipe
//!   |                          | close child ends, wrap fds  |
//!   |                          | write release token ------->| exec
//!   |                          | read exec report <----------| (EOF or errno)
//!   |<-- Launched / io::Error -|                             |
//!   |                          | wait for exit ............. | exits
//!   | wait() / exit_value()    | publish Exited, wake all    |
//! ```

use super::stdio::{ChildInput, ChildOutput};
use nix::unistd::Pid;
use std::fmt;
use std::io;
use tokio::sync::oneshot;
use tracing::warn;

/// Byte written to the sync pipe to let the child continue to `exec`
pub(crate) const RELEASE_TOKEN: [u8; 1] = [0];

/// Trailer of an exec-report record, guards against short or foreign writes
pub(crate) const EXEC_REPORT_FOOTER: [u8; 4] = *b"NOEX";

/// Size of an exec-report record: big-endian errno followed by the footer
pub(crate) const EXEC_REPORT_LEN: usize = 8;

/// How a child process ended, as reported by the exit wait
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ExitStatus {
    /// Normal termination with the given exit code
    Exited(i32),
    /// Terminated by the given signal number
    Signaled(i32),
    /// The exit wait failed; the real status could not be collected
    Unknown,
}

impl ExitStatus {
    /// Integer status in shell convention: the exit code, `128 + signal`
    /// for a signal death, or `-1` when the status is unknown
    pub fn code(&self) -> i32 {
        match *self {
            ExitStatus::Exited(code) => code,
            ExitStatus::Signaled(signal) => 128 + signal,
            ExitStatus::Unknown => -1,
        }
    }

    /// Whether the child exited normally with code 0
    pub fn success(&self) -> bool {
        matches!(self, ExitStatus::Exited(0))
    }

    /// Exit code, if the child terminated normally
    pub fn exit_code(&self) -> Option<i32> {
        match *self {
            ExitStatus::Exited(code) => Some(code),
            _ => None,
        }
    }

    /// Signal number, if the child was killed by a signal
    pub fn signal(&self) -> Option<i32> {
        match *self {
            ExitStatus::Signaled(signal) => Some(signal),
            _ => None,
        }
    }
}

impl fmt::Display for ExitStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match *self {
            ExitStatus::Exited(code) => write!(f, "exit code {}", code),
            ExitStatus::Signaled(signal) => write!(f, "killed by signal {}", signal),
            ExitStatus::Unknown => write!(f, "unknown exit status"),
        }
    }
}

/// Lifecycle of one child as tracked by its monitor
///
/// Only moves forward: `Starting → Running → Exited`, or `Starting → Failed`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Liveness {
    /// Creation has not resolved yet
    Starting,
    /// Created and not yet reaped
    Running,
    /// Reaped; the status never changes afterwards
    Exited(ExitStatus),
    /// Creation failed; no pid and no streams exist
    Failed,
}

impl Liveness {
    /// Whether the child is created and not yet reaped
    pub fn is_running(&self) -> bool {
        matches!(self, Liveness::Running)
    }

    /// Whether the child has been reaped
    pub fn is_exited(&self) -> bool {
        matches!(self, Liveness::Exited(_))
    }

    /// The recorded exit status, only present once exited
    pub fn exit_status(&self) -> Option<ExitStatus> {
        match *self {
            Liveness::Exited(status) => Some(status),
            _ => None,
        }
    }

    /// Apply a transition if it is one of the forward edges.
    ///
    /// Returns `false` and leaves `self` untouched otherwise.
    pub(crate) fn advance(&mut self, next: Liveness) -> bool {
        let allowed = matches!(
            (*self, next),
            (Liveness::Starting, Liveness::Running)
                | (Liveness::Starting, Liveness::Failed)
                | (Liveness::Running, Liveness::Exited(_))
        );
        if allowed {
            *self = next;
        } else {
            warn!("Rejected liveness transition {:?} -> {:?}", self, next);
        }
        allowed
    }
}

/// Everything the caller receives from a successful creation
#[derive(Debug)]
pub(crate) struct Launched {
    pub(crate) pid: Pid,
    pub(crate) stdin: ChildInput,
    pub(crate) stdout: ChildOutput,
    pub(crate) stderr: ChildOutput,
}

/// Creation outcome carried across the handshake
pub(crate) type LaunchOutcome = std::result::Result<Launched, io::Error>;

/// Monitor side of the handshake; resolves exactly once
#[derive(Debug)]
pub(crate) struct HandshakeTx(oneshot::Sender<LaunchOutcome>);

/// Caller side of the handshake; observed exactly once
#[derive(Debug)]
pub(crate) struct HandshakeRx(oneshot::Receiver<LaunchOutcome>);

/// Create a connected handshake pair
pub(crate) fn handshake() -> (HandshakeTx, HandshakeRx) {
    let (tx, rx) = oneshot::channel();
    (HandshakeTx(tx), HandshakeRx(rx))
}

impl HandshakeTx {
    /// Release the caller with the creation outcome.
    ///
    /// Returns `false` if the caller stopped waiting; the outcome (and any
    /// streams it holds) is dropped in that case.
    pub(crate) fn resolve(self, outcome: LaunchOutcome) -> bool {
        self.0.send(outcome).is_ok()
    }
}

impl HandshakeRx {
    /// Block the current thread until the monitor resolves the handshake.
    ///
    /// Must not be called from within an async runtime.
    pub(crate) fn wait(self) -> LaunchOutcome {
        self.0.blocking_recv().unwrap_or_else(|_| Err(abandoned()))
    }

    /// Await the handshake from async code
    pub(crate) async fn resolved(self) -> LaunchOutcome {
        self.0.await.unwrap_or_else(|_| Err(abandoned()))
    }
}

fn abandoned() -> io::Error {
    io::Error::other("launch monitor exited before completing the handshake")
}

/// What the child reported through the exec-report pipe
#[derive(Debug)]
pub(crate) enum ExecReport {
    /// Pipe closed with no data: `exec` succeeded (close-on-exec fired)
    Executed,
    /// `exec` failed with the carried OS error
    Failed(io::Error),
    /// Something other than a well-formed record arrived
    Corrupt(usize),
}

/// Encode an `exec` failure for the parent. Runs in the forked child, so it
/// must not allocate.
pub(crate) fn encode_exec_error(errno: i32) -> [u8; EXEC_REPORT_LEN] {
    let e = errno.to_be_bytes();
    let f = EXEC_REPORT_FOOTER;
    [e[0], e[1], e[2], e[3], f[0], f[1], f[2], f[3]]
}

/// Interpret the bytes read from the exec-report pipe up to EOF
pub(crate) fn decode_exec_report(bytes: &[u8]) -> ExecReport {
    match bytes.len() {
        0 => ExecReport::Executed,
        EXEC_REPORT_LEN if bytes[4..] == EXEC_REPORT_FOOTER => {
            let errno = i32::from_be_bytes([bytes[0], bytes[1], bytes[2], bytes[3]]);
            ExecReport::Failed(io::Error::from_raw_os_error(errno))
        }
        n => ExecReport::Corrupt(n),
    }
}
