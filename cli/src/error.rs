//! CLI error types

use sitter_core::CoreError;
use thiserror::Error;

/// Exit code when the command could not be launched (shell convention)
pub const EXIT_LAUNCH_FAILED: i32 = 127;

/// Exit code for bad arguments or configuration
pub const EXIT_USAGE: i32 = 2;

/// CLI-specific error types
#[derive(Error, Debug)]
pub enum CliError {
    #[error("Invalid argument: {0}")]
    InvalidArgument(String),

    #[error("Configuration error: {0}")]
    ConfigError(String),

    #[error(transparent)]
    Core(#[from] CoreError),

    #[error("I/O error: {0}")]
    IoError(#[from] std::io::Error),
}

impl CliError {
    /// Get error code for this error type
    pub fn code(&self) -> &'static str {
        match self {
            CliError::InvalidArgument(_) => "CLI002",
            CliError::ConfigError(_) => "CLI003",
            CliError::Core(_) => "CLI006",
            CliError::IoError(_) => "CLI008",
        }
    }

    /// Process exit code `sitter` should terminate with
    pub fn exit_code(&self) -> i32 {
        match self {
            CliError::InvalidArgument(_) | CliError::ConfigError(_) => EXIT_USAGE,
            CliError::Core(CoreError::LaunchFailure { .. }) => EXIT_LAUNCH_FAILED,
            CliError::Core(CoreError::ConfigurationError(_))
            | CliError::Core(CoreError::ValidationError(_)) => EXIT_USAGE,
            _ => 1,
        }
    }
}

/// CLI-specific result type
pub type Result<T> = std::result::Result<T, CliError>;
