//! Test utilities for CLI crate integration tests.
#![allow(dead_code)]

use std::io::Write;
use std::process::{Command, Output, Stdio};

/// Path to the built `sitter` binary
pub fn sitter_bin() -> &'static str {
    env!("CARGO_BIN_EXE_sitter")
}

/// Run `sitter` with `args`, feeding `input` on stdin, and collect its output.
///
/// # Panics
///
/// Panics if the binary cannot be started or its output cannot be read.
pub fn run_sitter(args: &[&str], input: &[u8]) -> Output {
    let mut child = Command::new(sitter_bin())
        .args(args)
        .env_remove("RUST_LOG")
        .stdin(Stdio::piped())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .expect("failed to start sitter");

    let mut stdin = child.stdin.take().expect("stdin");
    stdin.write_all(input).expect("write stdin");
    drop(stdin);

    child.wait_with_output().expect("sitter output")
}
