//! Parent-side ends of a child's standard streams
//!
//! These are thin wrappers over the pipe descriptors handed back by the
//! creation primitive. Buffering and framing are left to the caller; wrap in
//! `BufReader`/`BufWriter` as needed. Dropping a [`ChildInput`] closes the
//! child's stdin, which is how the child sees end-of-input.

use std::fs::File;
use std::io::{self, Read, Write};
use std::os::fd::{AsFd, AsRawFd, BorrowedFd, OwnedFd, RawFd};

/// Writable end connected to the child's standard input
#[derive(Debug)]
pub struct ChildInput {
    inner: File,
}

/// Readable end connected to the child's standard output or standard error
#[derive(Debug)]
pub struct ChildOutput {
    inner: File,
}

impl ChildInput {
    /// Consume the wrapper and return the underlying file
    pub fn into_file(self) -> File {
        self.inner
    }
}

impl ChildOutput {
    /// Consume the wrapper and return the underlying file
    pub fn into_file(self) -> File {
        self.inner
    }

    /// Read everything until the child closes its end
    pub fn read_to_end_vec(&mut self) -> io::Result<Vec<u8>> {
        let mut buf = Vec::new();
        self.inner.read_to_end(&mut buf)?;
        Ok(buf)
    }
}

impl From<OwnedFd> for ChildInput {
    fn from(fd: OwnedFd) -> Self {
        Self { inner: File::from(fd) }
    }
}

impl From<OwnedFd> for ChildOutput {
    fn from(fd: OwnedFd) -> Self {
        Self { inner: File::from(fd) }
    }
}

impl Write for ChildInput {
    fn write(&mut self, buf: &[u8]) -> io::Result<usize> {
        self.inner.write(buf)
    }

    fn flush(&mut self) -> io::Result<()> {
        self.inner.flush()
    }
}

impl Read for ChildOutput {
    fn read(&mut self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.read(buf)
    }
}

impl AsFd for ChildInput {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.inner.as_fd()
    }
}

impl AsFd for ChildOutput {
    fn as_fd(&self) -> BorrowedFd<'_> {
        self.inner.as_fd()
    }
}

impl AsRawFd for ChildInput {
    fn as_raw_fd(&self) -> RawFd {
        self.inner.as_raw_fd()
    }
}

impl AsRawFd for ChildOutput {
    fn as_raw_fd(&self) -> RawFd {
        self.inner.as_raw_fd()
    }
}
