//! Launcher configuration loading and validation
//!
//! The configuration is a small TOML document; every key is optional and
//! falls back to the defaults below.
//!
//! ```toml
//! killSignal = "SIGTERM"
//! monitorThreadName = "my-app-monitor"
//! ```

use crate::process::parse_signal;
use crate::{CoreError, Result};
use nix::sys::signal::Signal;
use serde::Deserialize;
use std::fs;
use std::path::Path;

/// Default signal sent by `destroy`
pub const DEFAULT_KILL_SIGNAL: &str = "SIGKILL";

/// Default prefix for monitor thread names
pub const DEFAULT_MONITOR_THREAD_NAME: &str = "sitter-monitor";

/// Settings applied to every child started by a `Launcher`
#[derive(Debug, Deserialize, Clone, PartialEq, Eq)]
#[serde(rename_all = "camelCase", default, deny_unknown_fields)]
pub struct LaunchConfig {
    /// Signal sent by `destroy`, by name (`SIGKILL`, `TERM`) or number
    pub kill_signal: String,
    /// Prefix for monitor thread names; a sequence number is appended
    pub monitor_thread_name: String,
}

impl Default for LaunchConfig {
    fn default() -> Self {
        Self {
            kill_signal: DEFAULT_KILL_SIGNAL.to_string(),
            monitor_thread_name: DEFAULT_MONITOR_THREAD_NAME.to_string(),
        }
    }
}

impl LaunchConfig {
    /// Validate the configuration and return `Result<()>` with field-path errors
    pub fn validate(&self) -> Result<()> {
        if let Err(e) = parse_signal(&self.kill_signal) {
            return Err(CoreError::ValidationError(format!("killSignal: {}", e)));
        }

        let name = &self.monitor_thread_name;
        if name.trim().is_empty() {
            return Err(CoreError::ValidationError(
                "monitorThreadName: cannot be empty".to_string(),
            ));
        }
        if name.contains('\0') {
            return Err(CoreError::ValidationError(
                "monitorThreadName: cannot contain NUL bytes".to_string(),
            ));
        }
        Ok(())
    }

    /// The configured kill signal
    pub fn kill_signal(&self) -> Result<Signal> {
        parse_signal(&self.kill_signal)
    }
}

/// Load launcher config from TOML file path
pub fn load_config_from_toml_path(path: impl AsRef<Path>) -> Result<LaunchConfig> {
    let data = fs::read_to_string(&path).map_err(|e| {
        CoreError::ConfigurationError(format!("Failed to read config {:?}: {}", path.as_ref(), e))
    })?;
    load_config_from_toml_str(&data)
}

/// Load launcher config from a TOML string
pub fn load_config_from_toml_str(input: &str) -> Result<LaunchConfig> {
    let cfg: LaunchConfig = toml::from_str(input)
        .map_err(|e| CoreError::ConfigurationError(format!("TOML parse error: {}", e)))?;
    cfg.validate()?;
    Ok(cfg)
}
