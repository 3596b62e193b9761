//! Unix process primitives: fork/exec with a release pipe, waitpid, kill
//!
//! This module is the OS-facing half of the coordinator. The monitor thread
//! talks to it only through [`ProcessPrimitives`], so tests can substitute a
//! scripted implementation.
//!
//! ## Creation
//!
//! [`UnixPrimitives::create`] forks a child that does not run the target
//! program right away:
//!
//! - Every pipe is created close-on-exec, so nothing leaks into the program
//!   except the three descriptors installed on fds 0, 1 and 2.
//! - The child blocks reading one byte from the sync pipe. The parent writes
//!   that byte only after it has closed its copies of the child-side ends.
//! - If `exec` fails, the child writes `errno` into the exec-report pipe and
//!   exits with 127. A successful `exec` closes the pipe, so the parent reads
//!   EOF.
//!
//! Everything the child touches between `fork` and `exec` (C strings, pointer
//! arrays, raw fds) is prepared before forking; the child only makes
//! async-signal-safe libc calls.

// Allow unsafe code for this module since fork/exec requires raw libc calls
#![allow(unsafe_code)]

use super::command::CommandSpec;
use super::handshake::{encode_exec_error, ExitStatus};
use nix::errno::Errno;
use nix::fcntl::OFlag;
use nix::sys::signal::{kill, Signal};
use nix::sys::wait::{waitpid, WaitStatus};
use nix::unistd::{fork, pipe2, ForkResult, Pid};
use std::env;
use std::ffi::{CString, OsStr};
use std::fmt;
use std::io;
use std::os::fd::{AsRawFd, OwnedFd, RawFd};
use std::os::unix::ffi::OsStrExt;
use std::os::unix::fs::PermissionsExt;
use std::path::{Path, PathBuf};
use std::ptr;
use tracing::{debug, trace};

/// `PATH` used when neither the command nor the parent provides one
const DEFAULT_PATH: &str = "/usr/local/bin:/usr/bin:/bin";

/// Exit code of a child that could not be released or could not `exec`
const CHILD_SETUP_FAILED: libc::c_int = 127;

/// A freshly forked child that has not been released yet
///
/// All descriptors are the parent's ends. The child stays blocked before
/// `exec` until a byte is written to `sync` (or `sync` is closed, which
/// makes it exit).
#[derive(Debug)]
pub struct RawChild {
    /// Process id of the child
    pub pid: Pid,
    /// Write end of the child's stdin
    pub stdin: OwnedFd,
    /// Read end of the child's stdout
    pub stdout: OwnedFd,
    /// Read end of the child's stderr
    pub stderr: OwnedFd,
    /// Write end of the release pipe
    pub sync: OwnedFd,
    /// Read end of the exec-report pipe
    pub exec_report: OwnedFd,
}

/// The OS operations the monitor routine is built on
pub trait ProcessPrimitives: Send + Sync + fmt::Debug {
    /// Create the child, stopped before `exec`
    fn create(&self, command: &CommandSpec) -> io::Result<RawChild>;

    /// Block until `pid` exits and reap it. Called at most once per child.
    fn wait_for_exit(&self, pid: Pid) -> io::Result<ExitStatus>;

    /// Deliver `signal` to `pid`
    fn send_signal(&self, pid: Pid, signal: Signal) -> nix::Result<()>;

    /// The platform's forceful-stop signal
    fn default_kill_signal(&self) -> Signal {
        Signal::SIGKILL
    }
}

/// [`ProcessPrimitives`] backed by fork, execve, waitpid and kill
#[derive(Copy, Clone, Debug, Default)]
pub struct UnixPrimitives;

impl UnixPrimitives {
    /// Create a new Unix primitives backend
    pub fn new() -> Self {
        Self
    }
}

impl ProcessPrimitives for UnixPrimitives {
    fn create(&self, command: &CommandSpec) -> io::Result<RawChild> {
        let prepared = PreparedExec::new(command)?;

        let (stdin_child, stdin_parent) = pipe2(OFlag::O_CLOEXEC)?;
        let (stdout_parent, stdout_child) = pipe2(OFlag::O_CLOEXEC)?;
        let (stderr_parent, stderr_child) = pipe2(OFlag::O_CLOEXEC)?;
        let (sync_child, sync_parent) = pipe2(OFlag::O_CLOEXEC)?;
        let (report_parent, report_child) = pipe2(OFlag::O_CLOEXEC)?;

        let fds = ChildFds {
            stdin: stdin_child.as_raw_fd(),
            stdout: stdout_child.as_raw_fd(),
            stderr: stderr_child.as_raw_fd(),
            sync_read: sync_child.as_raw_fd(),
            sync_write: sync_parent.as_raw_fd(),
            report: report_child.as_raw_fd(),
        };

        // Safety: the child branch only calls async-signal-safe functions on
        // data prepared above and never returns.
        match unsafe { fork() }? {
            ForkResult::Child => unsafe { exec_child(&prepared, &fds) },
            ForkResult::Parent { child } => {
                drop(stdin_child);
                drop(stdout_child);
                drop(stderr_child);
                drop(sync_child);
                drop(report_child);
                debug!(
                    "Forked child {} for {:?}, holding it before exec",
                    child, prepared.program
                );
                Ok(RawChild {
                    pid: child,
                    stdin: stdin_parent,
                    stdout: stdout_parent,
                    stderr: stderr_parent,
                    sync: sync_parent,
                    exec_report: report_parent,
                })
            }
        }
    }

    fn wait_for_exit(&self, pid: Pid) -> io::Result<ExitStatus> {
        loop {
            match waitpid(pid, None) {
                Ok(WaitStatus::Exited(_, code)) => return Ok(ExitStatus::Exited(code)),
                Ok(WaitStatus::Signaled(_, signal, _)) => {
                    return Ok(ExitStatus::Signaled(signal as i32))
                }
                Ok(other) => trace!("Ignoring wait status {:?} for {}", other, pid),
                Err(Errno::EINTR) => continue,
                Err(e) => return Err(e.into()),
            }
        }
    }

    fn send_signal(&self, pid: Pid, signal: Signal) -> nix::Result<()> {
        kill(pid, signal)
    }
}

/// Raw descriptor numbers the child needs after `fork`
struct ChildFds {
    stdin: RawFd,
    stdout: RawFd,
    stderr: RawFd,
    sync_read: RawFd,
    sync_write: RawFd,
    report: RawFd,
}

/// C-level `execve` arguments, built before forking
struct PreparedExec {
    program: CString,
    _argv: Vec<CString>,
    argv_ptrs: Vec<*const libc::c_char>,
    envp: Option<(Vec<CString>, Vec<*const libc::c_char>)>,
}

impl PreparedExec {
    fn new(command: &CommandSpec) -> io::Result<Self> {
        let program = command.program().ok_or_else(|| {
            io::Error::new(io::ErrorKind::InvalidInput, "argv must name a program")
        })?;

        let fallback = env::var_os("PATH");
        let path_var = command
            .path_var()
            .or(fallback.as_deref())
            .unwrap_or_else(|| OsStr::new(DEFAULT_PATH));
        let resolved = resolve_program(program, path_var)?;

        let program = to_cstring(resolved.as_os_str())?;
        let argv = command
            .argv()
            .iter()
            .map(|arg| to_cstring(arg))
            .collect::<io::Result<Vec<_>>>()?;
        let argv_ptrs = null_terminated(&argv);

        let envp = match command.envp() {
            Some(entries) => {
                let entries = entries
                    .iter()
                    .map(|entry| to_cstring(entry))
                    .collect::<io::Result<Vec<_>>>()?;
                let ptrs = null_terminated(&entries);
                Some((entries, ptrs))
            }
            None => None,
        };

        Ok(Self {
            program,
            _argv: argv,
            argv_ptrs,
            envp,
        })
    }
}

fn to_cstring(s: &OsStr) -> io::Result<CString> {
    CString::new(s.as_bytes()).map_err(|_| {
        io::Error::new(
            io::ErrorKind::InvalidInput,
            "nul byte found in provided data",
        )
    })
}

fn null_terminated(strings: &[CString]) -> Vec<*const libc::c_char> {
    strings
        .iter()
        .map(|s| s.as_ptr())
        .chain(std::iter::once(ptr::null()))
        .collect()
}

/// Resolve `program` to a path the child can `execve`.
///
/// Names containing `/` are used as given; `exec` reports whether they exist.
/// Bare names are searched on `path_var`.
pub(crate) fn resolve_program(program: &OsStr, path_var: &OsStr) -> io::Result<PathBuf> {
    if program.is_empty() {
        return Err(io::Error::new(
            io::ErrorKind::InvalidInput,
            "program name is empty",
        ));
    }
    if program.as_bytes().contains(&b'/') {
        return Ok(PathBuf::from(program));
    }
    env::split_paths(path_var)
        .map(|dir| dir.join(program))
        .find(|candidate| is_executable(candidate))
        .ok_or_else(|| {
            io::Error::new(
                io::ErrorKind::NotFound,
                format!("program '{}' not found on PATH", program.to_string_lossy()),
            )
        })
}

fn is_executable(path: &Path) -> bool {
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

/// Child side of `create`. Never returns.
///
/// # Safety
///
/// Must only be called in the child right after `fork()`; it makes no
/// allocations and uses only async-signal-safe calls.
unsafe fn exec_child(prepared: &PreparedExec, fds: &ChildFds) -> ! {
    libc::close(fds.sync_write);

    // Hold here until the parent has finished its side of the setup
    let mut token = [0u8; 1];
    loop {
        let n = libc::read(fds.sync_read, token.as_mut_ptr().cast(), 1);
        if n == 1 {
            break;
        }
        if n == 0 || Errno::last_raw() != libc::EINTR {
            // Parent closed the sync pipe without releasing us
            libc::_exit(CHILD_SETUP_FAILED);
        }
    }
    libc::close(fds.sync_read);

    for (fd, target) in [
        (fds.stdin, libc::STDIN_FILENO),
        (fds.stdout, libc::STDOUT_FILENO),
        (fds.stderr, libc::STDERR_FILENO),
    ] {
        if install_fd(fd, target) < 0 {
            report_and_exit(fds.report, Errno::last_raw());
        }
    }

    // Rust ignores SIGPIPE and the monitor thread may have a signal mask;
    // neither should leak into the new program.
    libc::signal(libc::SIGPIPE, libc::SIG_DFL);
    let mut empty: libc::sigset_t = std::mem::zeroed();
    libc::sigemptyset(&mut empty);
    libc::pthread_sigmask(libc::SIG_SETMASK, &empty, ptr::null_mut());

    match &prepared.envp {
        Some((_, envp_ptrs)) => {
            libc::execve(
                prepared.program.as_ptr(),
                prepared.argv_ptrs.as_ptr(),
                envp_ptrs.as_ptr(),
            );
        }
        None => {
            libc::execv(prepared.program.as_ptr(), prepared.argv_ptrs.as_ptr());
        }
    }
    report_and_exit(fds.report, Errno::last_raw())
}

/// Put `fd` on `target`, clearing close-on-exec on the result
unsafe fn install_fd(fd: RawFd, target: RawFd) -> libc::c_int {
    if fd == target {
        libc::fcntl(fd, libc::F_SETFD, 0)
    } else {
        libc::dup2(fd, target)
    }
}

unsafe fn report_and_exit(report: RawFd, errno: i32) -> ! {
    let record = encode_exec_error(errno);
    // Short of PIPE_BUF, so the write is atomic
    libc::write(report, record.as_ptr().cast(), record.len());
    libc::_exit(CHILD_SETUP_FAILED)
}
