//! The already-marshaled command line handed to the creation primitive

use std::ffi::{OsStr, OsString};
use std::os::unix::ffi::OsStrExt;

/// Argument vector and optional environment for one child
///
/// `argv[0]` names the program. A name without a `/` is searched on `PATH`
/// (taken from `envp` when one is given). `envp` entries are `KEY=VALUE`;
/// `None` inherits the parent's environment.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    argv: Vec<OsString>,
    envp: Option<Vec<OsString>>,
}

impl CommandSpec {
    /// Build a command from its full argument vector
    pub fn new<I, S>(argv: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        Self {
            argv: argv.into_iter().map(Into::into).collect(),
            envp: None,
        }
    }

    /// Replace the inherited environment with explicit `KEY=VALUE` entries
    pub fn with_env<I, S>(mut self, envp: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<OsString>,
    {
        self.envp = Some(envp.into_iter().map(Into::into).collect());
        self
    }

    /// The program name, if argv is non-empty
    pub fn program(&self) -> Option<&OsStr> {
        self.argv.first().map(OsString::as_os_str)
    }

    /// Full argument vector including argv[0]
    pub fn argv(&self) -> &[OsString] {
        &self.argv
    }

    /// Explicit environment, or `None` when inheriting
    pub fn envp(&self) -> Option<&[OsString]> {
        self.envp.as_deref()
    }

    /// Program name for messages and logs
    pub fn display_program(&self) -> String {
        self.program()
            .map(|p| p.to_string_lossy().into_owned())
            .unwrap_or_default()
    }

    /// `PATH` value from the explicit environment, if one was given and it
    /// sets `PATH`
    pub(crate) fn path_var(&self) -> Option<&OsStr> {
        self.envp.as_ref()?.iter().rev().find_map(|entry| {
            entry
                .as_bytes()
                .strip_prefix(b"PATH=")
                .map(OsStr::from_bytes)
        })
    }
}
