//! Run one command under the sitter process coordinator
//!
//! The `sitter` binary launches a command, forwards this process's stdin to
//! it and its stdout/stderr back, relays Ctrl-C as `SIGINT`, optionally
//! destroys it after a timeout, and exits with the child's status code.

pub mod error;

pub use error::{CliError, Result};

use sitter_core::config::load_config_from_toml_path;
use sitter_core::process::{ChildOutput, Signal};
use sitter_core::{CommandSpec, ExitStatus, LaunchConfig, Launcher};
use std::ffi::OsString;
use std::io::{self, Read, Write};
use std::path::Path;
use std::time::Duration;
use std::thread;
use tokio::sync::oneshot;
use tracing::{debug, info, warn};

/// How long to keep draining output after the child exits; grandchildren
/// may hold the pipes open indefinitely
const DRAIN_GRACE: Duration = Duration::from_secs(1);

/// Everything needed to run one command
#[derive(Debug, Clone, PartialEq)]
pub struct RunOptions {
    /// Full argument vector of the command
    pub command: Vec<OsString>,
    /// Destroy the command if it runs longer than this
    pub timeout: Option<Duration>,
    /// Launcher settings
    pub config: LaunchConfig,
}

impl RunOptions {
    /// Assemble options from raw command-line values
    pub fn from_args(
        command: Vec<OsString>,
        config_path: Option<&Path>,
        kill_signal: Option<&str>,
        timeout_secs: Option<f64>,
    ) -> Result<Self> {
        if command.is_empty() {
            return Err(CliError::InvalidArgument("no command given".to_string()));
        }

        let mut config = match config_path {
            Some(path) => load_config_from_toml_path(path)
                .map_err(|e| CliError::ConfigError(e.to_string()))?,
            None => LaunchConfig::default(),
        };
        if let Some(signal) = kill_signal {
            config.kill_signal = signal.to_string();
        }
        config
            .validate()
            .map_err(|e| CliError::ConfigError(e.to_string()))?;

        let timeout = timeout_secs
            .map(|secs| {
                Duration::try_from_secs_f64(secs)
                    .ok()
                    .filter(|d| !d.is_zero())
                    .ok_or_else(|| {
                        CliError::InvalidArgument(format!(
                            "timeout must be a positive number of seconds, got {}",
                            secs
                        ))
                    })
            })
            .transpose()?;

        Ok(Self {
            command,
            timeout,
            config,
        })
    }
}

/// Launch the command, relay its streams, and return its exit status
pub async fn run(options: RunOptions) -> Result<ExitStatus> {
    let launcher = Launcher::from_config(&options.config)?;
    let mut child = launcher
        .spawn_async(CommandSpec::new(options.command))
        .await?;
    info!("Running process {}", child.pid());

    let stdout_done = child
        .take_stdout()
        .map(|out| relay(out, io::stdout(), "sitter-stdout"))
        .transpose()?;
    let stderr_done = child
        .take_stderr()
        .map(|err| relay(err, io::stderr(), "sitter-stderr"))
        .transpose()?;
    if let Some(mut stdin) = child.take_stdin() {
        // Detached: our stdin may never reach EOF
        thread::Builder::new()
            .name("sitter-stdin".to_string())
            .spawn(move || {
                if let Err(e) = io::copy(&mut io::stdin().lock(), &mut stdin) {
                    debug!("Stopped forwarding stdin: {}", e);
                }
            })?;
    }

    let deadline = async {
        match options.timeout {
            Some(timeout) => tokio::time::sleep(timeout).await,
            None => std::future::pending().await,
        }
    };

    let status = tokio::select! {
        status = child.wait_async() => status,
        _ = tokio::signal::ctrl_c() => {
            info!("Interrupted; forwarding SIGINT to process {}", child.pid());
            child.signal(Signal::SIGINT)?;
            child.wait_async().await
        }
        _ = deadline => {
            warn!(
                "Process {} still running after {:?}; destroying it",
                child.pid(),
                options.timeout.unwrap_or_default()
            );
            child.destroy()?;
            child.wait_async().await
        }
    };
    info!("Process {} finished: {}", child.pid(), status);

    for done in [stdout_done, stderr_done].into_iter().flatten() {
        if tokio::time::timeout(DRAIN_GRACE, done).await.is_err() {
            debug!("Output still open after exit; not waiting for it");
        }
    }

    Ok(status)
}

/// Copy a child's output stream to one of ours until EOF on a detached
/// thread; the receiver resolves when the copy ends
fn relay<W>(
    mut from: ChildOutput,
    mut to: W,
    name: &str,
) -> io::Result<oneshot::Receiver<()>>
where
    W: Write + Send + 'static,
{
    let (done_tx, done_rx) = oneshot::channel();
    thread::Builder::new().name(name.to_string()).spawn(move || {
        let mut buf = [0u8; 8192];
        loop {
            match from.read(&mut buf) {
                Ok(0) => break,
                Ok(n) => {
                    if to.write_all(&buf[..n]).and_then(|_| to.flush()).is_err() {
                        break;
                    }
                }
                Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
                Err(e) => {
                    debug!("Stopped relaying output: {}", e);
                    break;
                }
            }
        }
        let _ = done_tx.send(());
    })?;
    Ok(done_rx)
}
