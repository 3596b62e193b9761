//! Core error types and utilities

use nix::errno::Errno;
use nix::sys::signal::Signal;
use thiserror::Error;

/// Core-specific error types
#[derive(Error, Debug)]
pub enum CoreError {
    /// The child could not be created. `source` is the OS error exactly as
    /// the creation primitive reported it.
    #[error("Failed to launch '{program}': {source}")]
    LaunchFailure {
        /// Program (argv[0]) that was being launched
        program: String,
        /// Original cause, kind and message intact
        #[source]
        source: std::io::Error,
    },

    /// `exit_value` was asked for before the child was reaped
    #[error("Process {pid} has not exited yet")]
    NotExited {
        /// Process that is still running
        pid: u32,
    },

    /// The OS refused to deliver a signal
    #[error("Failed to deliver {signal} to process {pid}: {source}")]
    SignalDelivery {
        /// Target process
        pid: u32,
        /// Signal that was refused
        signal: Signal,
        /// Errno returned by kill(2)
        #[source]
        source: Errno,
    },

    #[error("Configuration error: {0}")]
    ConfigurationError(String),

    #[error("Validation error: {0}")]
    ValidationError(String),

    #[error("Initialization error: {0}")]
    InitializationError(String),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("Generic error: {0}")]
    Other(String),
}

impl CoreError {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            CoreError::ConfigurationError(_) => "CORE001",
            CoreError::ValidationError(_) => "CORE002",
            CoreError::InitializationError(_) => "CORE003",
            CoreError::IoError(_) => "CORE005",
            CoreError::LaunchFailure { .. } => "CORE101",
            CoreError::NotExited { .. } => "CORE102",
            CoreError::SignalDelivery { .. } => "CORE103",
            CoreError::Other(_) => "CORE999",
        }
    }

    /// Build a launch failure for `program` from the original OS error
    pub fn launch(program: impl Into<String>, source: std::io::Error) -> Self {
        CoreError::LaunchFailure {
            program: program.into(),
            source,
        }
    }

    /// Whether this error came from the creation attempt
    pub fn is_launch_failure(&self) -> bool {
        matches!(self, CoreError::LaunchFailure { .. })
    }

    /// The `io::ErrorKind` of a launch failure's cause, if this is one
    pub fn launch_error_kind(&self) -> Option<std::io::ErrorKind> {
        match self {
            CoreError::LaunchFailure { source, .. } => Some(source.kind()),
            _ => None,
        }
    }
}

/// Core-specific result type
pub type Result<T> = std::result::Result<T, CoreError>;

// Convenience implementations
impl From<&str> for CoreError {
    fn from(s: &str) -> Self {
        CoreError::Other(s.to_string())
    }
}

impl From<String> for CoreError {
    fn from(s: String) -> Self {
        CoreError::Other(s)
    }
}
