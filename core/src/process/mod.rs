//! Process lifecycle coordination for the sitter core library
//!
//! This module launches one external process per [`spawn`], hands the caller
//! its pid and standard streams only after creation has unambiguously
//! succeeded, reaps its exit status exactly once for any number of waiters,
//! and delivers signals to it while it is still running.
//!
//! ## Components
//!
//! - [`handshake`]: liveness states, exit status, and the launch handshake
//! - [`unix`]: the OS primitives (fork/exec, waitpid, kill) behind a trait
//! - `monitor`: the per-process thread that owns the blocking calls
//! - [`handle`]: [`Launcher`], [`ProcessHandle`] and [`ExitWaiter`]
//! - [`signal`]: liveness-guarded signal delivery
//!
//! ## Platform Support
//!
//! - **Unix**: fork/exec with a release pipe, one monitor thread per child

pub mod command;
pub mod handle;
pub mod handshake;
mod monitor;
pub mod signal;
pub mod stdio;
pub mod unix;

#[cfg(test)]
pub(crate) mod testing;

pub use command::CommandSpec;
pub use handle::{spawn, spawn_async, ExitWaiter, Launcher, ProcessHandle};
pub use handshake::{ExitStatus, Liveness};
pub use nix::sys::signal::Signal;
pub use signal::{default_kill_signal, parse_signal, send_signal};
pub use stdio::{ChildInput, ChildOutput};
pub use unix::{ProcessPrimitives, RawChild, UnixPrimitives};
