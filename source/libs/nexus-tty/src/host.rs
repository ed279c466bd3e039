// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Host process streams backing the guest tty devices
//! OWNERS: @runtime
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: Covered by ops tests

use core::fmt;
use std::io::{self, Read, Write};
use std::sync::Arc;

use parking_lot::Mutex;

/// Host output stream a device flushes to.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum HostStream {
    /// Host standard input.
    Stdin,
    /// Host standard output.
    Stdout,
    /// Host standard error.
    Stderr,
}

impl fmt::Display for HostStream {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Stdin => f.write_str("stdin"),
            Self::Stdout => f.write_str("stdout"),
            Self::Stderr => f.write_str("stderr"),
        }
    }
}

/// Writable host stream owned by a single device.
pub type HostSink = Box<dyn Write + Send>;

/// Host input stream shared by every device reading from it.
#[derive(Clone)]
pub struct SharedInput {
    inner: Arc<Mutex<Box<dyn Read + Send>>>,
}

impl SharedInput {
    /// Wraps `reader`.
    pub fn new<R>(reader: R) -> Self
    where
        R: Read + Send + 'static,
    {
        Self {
            inner: Arc::new(Mutex::new(Box::new(reader))),
        }
    }

    /// One blocking read of up to `buf.len()` bytes; `Ok(0)` is end-of-stream.
    pub fn read(&self, buf: &mut [u8]) -> io::Result<usize> {
        self.inner.lock().read(buf)
    }
}

impl fmt::Debug for SharedInput {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SharedInput").finish_non_exhaustive()
    }
}

/// Host streams handed to the stream binding manager.
pub struct HostStreams {
    /// Input stream read by both devices.
    pub input: SharedInput,
    /// Primary output stream.
    pub stdout: HostSink,
    /// Error stream.
    pub stderr: HostSink,
}

impl HostStreams {
    /// Builds a set from arbitrary readers and writers.
    pub fn new<R, O, E>(input: R, stdout: O, stderr: E) -> Self
    where
        R: Read + Send + 'static,
        O: Write + Send + 'static,
        E: Write + Send + 'static,
    {
        Self {
            input: SharedInput::new(input),
            stdout: Box::new(stdout),
            stderr: Box::new(stderr),
        }
    }

    /// Wires the real standard streams of this process.
    pub fn process() -> Self {
        Self::new(io::stdin(), io::stdout(), io::stderr())
    }
}

impl fmt::Debug for HostStreams {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("HostStreams").finish_non_exhaustive()
    }
}
