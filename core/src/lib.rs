//! Core functionality for the sitter project
//!
//! This crate launches an external process, synchronizes with it before it
//! runs any user code, exposes its standard streams and pid, reaps its exit
//! status exactly once, and delivers signals to it. See [`process`] for the
//! lifecycle and [`config`] for the settings a [`Launcher`] accepts.

pub mod config;
pub mod error;
pub mod process;


pub use config::LaunchConfig;
pub use error::{CoreError, Result};
pub use process::{
    spawn, spawn_async, CommandSpec, ExitStatus, ExitWaiter, Launcher, ProcessHandle, Signal,
};

/// Core utilities and helper functions
pub mod utils {
    use tracing::info;

    /// Initialize tracing for the application
    pub fn init_tracing(level: &str) -> crate::Result<()> {
        use tracing_subscriber::{fmt, EnvFilter};

        let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

        fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .try_init()
            .map_err(|e| crate::CoreError::InitializationError(e.to_string()))?;

        info!("Tracing initialized with level: {}", level);
        Ok(())
    }
}
