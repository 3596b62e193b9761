//! Scripted process primitives for exercising the monitor and handle
//! without forking real children

use super::command::CommandSpec;
use super::handshake::{encode_exec_error, ExitStatus};
use super::unix::{ProcessPrimitives, RawChild};
use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::signal::Signal;
use nix::unistd::{pipe2, Pid};
use std::fs::File;
use std::io::{self, Write};
use std::os::fd::OwnedFd;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{mpsc, Mutex};

/// Fake child whose exit is decided by the test
#[derive(Debug)]
pub(crate) struct ScriptedPrimitives {
    pid: Pid,
    create_error: Mutex<Option<io::Error>>,
    exec_errno: Option<i32>,
    signal_error: Option<Errno>,
    exits_tx: Mutex<mpsc::Sender<io::Result<ExitStatus>>>,
    exits_rx: Mutex<mpsc::Receiver<io::Result<ExitStatus>>>,
    held: Mutex<Vec<OwnedFd>>,
    signals: Mutex<Vec<(Pid, Signal)>>,
    reaped: AtomicUsize,
}

impl ScriptedPrimitives {
    /// A child that starts fine and exits when told to
    pub(crate) fn new() -> Self {
        let (tx, rx) = mpsc::channel();
        Self {
            pid: Pid::from_raw(4242),
            create_error: Mutex::new(None),
            exec_errno: None,
            signal_error: None,
            exits_tx: Mutex::new(tx),
            exits_rx: Mutex::new(rx),
            held: Mutex::new(Vec::new()),
            signals: Mutex::new(Vec::new()),
            reaped: AtomicUsize::new(0),
        }
    }

    /// Creation itself fails with `error`
    pub(crate) fn failing_create(error: io::Error) -> Self {
        let scripted = Self::new();
        *scripted.create_error.lock().unwrap() = Some(error);
        scripted
    }

    /// Fork succeeds but `exec` reports `errno`
    pub(crate) fn failing_exec(errno: i32) -> Self {
        Self {
            exec_errno: Some(errno),
            ..Self::new()
        }
    }

    /// Every signal delivery is refused with `errno`
    pub(crate) fn refusing_signals(errno: Errno) -> Self {
        Self {
            signal_error: Some(errno),
            ..Self::new()
        }
    }

    pub(crate) fn pid(&self) -> Pid {
        self.pid
    }

    /// Make the pending exit wait return `result`
    pub(crate) fn exit_with(&self, result: io::Result<ExitStatus>) {
        let _ = self.exits_tx.lock().unwrap().send(result);
    }

    /// Signals delivered so far
    pub(crate) fn signals(&self) -> Vec<(Pid, Signal)> {
        self.signals.lock().unwrap().clone()
    }

    /// Number of completed exit waits
    pub(crate) fn reaped(&self) -> usize {
        self.reaped.load(Ordering::SeqCst)
    }
}

impl ProcessPrimitives for ScriptedPrimitives {
    fn create(&self, _command: &CommandSpec) -> io::Result<RawChild> {
        if let Some(e) = self.create_error.lock().unwrap().take() {
            return Err(e);
        }

        let (stdin_child, stdin) = pipe2(OFlag::O_CLOEXEC)?;
        let (stdout, _) = pipe2(OFlag::O_CLOEXEC)?;
        let (stderr, _) = pipe2(OFlag::O_CLOEXEC)?;
        let (sync_child, sync) = pipe2(OFlag::O_CLOEXEC)?;
        let (exec_report, report_child) = pipe2(OFlag::O_CLOEXEC)?;

        if let Some(errno) = self.exec_errno {
            File::from(report_child).write_all(&encode_exec_error(errno))?;
        }
        self.held.lock().unwrap().extend([stdin_child, sync_child]);

        Ok(RawChild {
            pid: self.pid,
            stdin,
            stdout,
            stderr,
            sync,
            exec_report,
        })
    }

    fn wait_for_exit(&self, _pid: Pid) -> io::Result<ExitStatus> {
        let result = if self.exec_errno.is_some() {
            Ok(ExitStatus::Exited(127))
        } else {
            self.exits_rx
                .lock()
                .unwrap()
                .recv()
                .unwrap_or_else(|_| Err(io::Error::other("script ended")))
        };
        self.reaped.fetch_add(1, Ordering::SeqCst);
        result
    }

    fn send_signal(&self, pid: Pid, signal: Signal) -> nix::Result<()> {
        if let Some(errno) = self.signal_error {
            return Err(errno);
        }
        self.signals.lock().unwrap().push((pid, signal));
        self.exit_with(Ok(ExitStatus::Signaled(signal as i32)));
        Ok(())
    }
}
