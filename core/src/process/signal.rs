//! Signal dispatch
//!
//! Delivery is guarded by a liveness check taken immediately before the
//! `kill(2)` call: a child that is not `Running` is never signaled, so once
//! the monitor has reaped it its pid (which the OS may hand to an unrelated
//! process) is left alone.
//!
//! The check and the delivery are two separate steps. A child that exits and
//! is reaped between them can still cause a signal to reach a recycled pid.
//! Closing that window needs handle-based signaling (pidfd or process
//! groups), which this crate does not use.
//!
//! `ESRCH` from the OS means the target is already gone and counts as
//! success. Any other errno is reported as [`CoreError::SignalDelivery`].

use super::monitor::Shared;
use super::unix::{ProcessPrimitives, UnixPrimitives};
use crate::{CoreError, Result};
use nix::errno::Errno;
use nix::sys::signal::Signal;
use nix::unistd::Pid;
use std::str::FromStr;
use tracing::{debug, error};

/// The platform's forceful-stop signal, used by `destroy` unless configured
pub fn default_kill_signal() -> Signal {
    UnixPrimitives.default_kill_signal()
}

/// Send `signal` to an arbitrary process id, without any liveness guard.
///
/// `pid` must name a single process: `0` and values outside the positive
/// `pid_t` range (which would address process groups) are rejected.
///
/// ## Example
///
/// ```rust,no_run
/// use sitter_core::process::{send_signal, Signal};
///
/// send_signal(12345, Signal::SIGTERM)?;
/// # Ok::<(), sitter_core::CoreError>(())
/// ```
pub fn send_signal(pid: u32, signal: Signal) -> Result<()> {
    let raw = i32::try_from(pid)
        .ok()
        .filter(|p| *p > 0)
        .ok_or_else(|| CoreError::ValidationError(format!("invalid process id {}", pid)))?;
    deliver(&UnixPrimitives, Pid::from_raw(raw), signal)
}

/// Parse a signal given as a name (`SIGTERM`, `TERM`, case-insensitive) or
/// a number (`15`)
pub fn parse_signal(value: &str) -> Result<Signal> {
    let value = value.trim();
    if let Ok(number) = value.parse::<i32>() {
        return Signal::try_from(number)
            .map_err(|_| CoreError::ValidationError(format!("unknown signal number {}", number)));
    }
    let upper = value.to_ascii_uppercase();
    let name = if upper.starts_with("SIG") {
        upper
    } else {
        format!("SIG{}", upper)
    };
    Signal::from_str(&name)
        .map_err(|_| CoreError::ValidationError(format!("unknown signal name '{}'", value)))
}

/// Deliver `signal` to a monitored child if it is still running
pub(crate) fn dispatch(
    primitives: &dyn ProcessPrimitives,
    shared: &Shared,
    pid: Pid,
    signal: Signal,
) -> Result<()> {
    let liveness = shared.liveness();
    if !liveness.is_running() {
        debug!(
            "Not sending {} to process {}: it is {:?}",
            signal, pid, liveness
        );
        return Ok(());
    }
    deliver(primitives, pid, signal)
}

fn deliver(primitives: &dyn ProcessPrimitives, pid: Pid, signal: Signal) -> Result<()> {
    debug!("Sending {} to process {}", signal, pid);

    match primitives.send_signal(pid, signal) {
        Ok(()) => {
            debug!("Successfully sent {} to process {}", signal, pid);
            Ok(())
        }
        Err(Errno::ESRCH) => {
            // Process doesn't exist, which means it already exited
            debug!("Process {} already exited", pid);
            Ok(())
        }
        Err(e) => {
            error!("Failed to send {} to process {}: {}", signal, pid, e);
            Err(CoreError::SignalDelivery {
                pid: pid.as_raw() as u32,
                signal,
                source: e,
            })
        }
    }
}
