// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Device operation set for host-backed tty devices
//! OWNERS: @runtime
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: Unit tests (buffering, EOF, host failures)
//!
//! Input is refilled one host read at a time into a bounded buffer. Output is
//! line buffered: a newline or the close sentinel writes the whole pending
//! buffer to the host stream in one call.

use std::collections::VecDeque;
use std::io::{ErrorKind, Write};

use log::{debug, warn};

use crate::error::{Result, TtyError};
use crate::host::{HostSink, HostStream, SharedInput};

/// Outcome of [`DeviceOps::get_char`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum GetChar {
    /// Next input byte.
    Byte(u8),
    /// No data is available right now; the caller may retry.
    NoData,
    /// The host stream reported end-of-stream on this call.
    Eof,
}

/// Input to [`DeviceOps::put_char`].
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum PutChar {
    /// Byte to buffer.
    Byte(u8),
    /// Flush sentinel, sent when the guest closes the stream.
    Close,
}

/// Operations a guest filesystem invokes on a character device.
pub trait DeviceOps: Send {
    /// Returns the next input byte, refilling from the host when empty.
    fn get_char(&mut self) -> Result<GetChar>;

    /// Buffers a byte; newline or [`PutChar::Close`] flushes.
    fn put_char(&mut self, value: PutChar) -> Result<()>;

    /// Writes any pending output. No-op when nothing is pending.
    fn flush(&mut self) -> Result<()>;

    /// Input bytes already buffered and readable without host I/O.
    fn buffered(&self) -> usize {
        0
    }
}

/// Tty operation set bridging one guest device to the host streams.
pub struct TtyOps {
    host_input: SharedInput,
    chunk: Vec<u8>,
    input: VecDeque<u8>,
    output: Vec<u8>,
    sink: HostSink,
    stream: HostStream,
}

impl TtyOps {
    /// Creates an operation set reading from `host_input` in chunks of
    /// `read_chunk` bytes and flushing to `sink`.
    pub fn new(
        host_input: SharedInput,
        sink: HostSink,
        stream: HostStream,
        read_chunk: usize,
    ) -> Self {
        let read_chunk = read_chunk.max(1);
        Self {
            host_input,
            chunk: vec![0; read_chunk],
            input: VecDeque::with_capacity(read_chunk),
            output: Vec::new(),
            sink,
            stream,
        }
    }

    /// Host stream this device flushes to.
    pub fn stream(&self) -> HostStream {
        self.stream
    }

    /// Output bytes waiting for a flush.
    pub fn pending_output(&self) -> &[u8] {
        &self.output
    }

    /// Returns `Some` when the host read produced no bytes to buffer.
    fn refill(&mut self) -> Result<Option<GetChar>> {
        let read = loop {
            match self.host_input.read(&mut self.chunk) {
                Ok(read) => break read,
                Err(err) if err.kind() == ErrorKind::Interrupted => continue,
                Err(err) if err.kind() == ErrorKind::WouldBlock => {
                    return Ok(Some(GetChar::NoData))
                }
                Err(err) if host_closed(err.kind()) => {
                    debug!("nexus-tty: host stdin closed ({err}), reporting eof");
                    return Ok(Some(GetChar::Eof));
                }
                Err(source) => {
                    return Err(TtyError::HostIo {
                        stream: HostStream::Stdin,
                        source,
                    })
                }
            }
        };
        if read == 0 {
            return Ok(Some(GetChar::Eof));
        }
        debug!("nexus-tty: read {read} bytes from host stdin");
        self.input.extend(&self.chunk[..read]);
        Ok(None)
    }

    fn write_out(&mut self) -> Result<()> {
        if self.output.is_empty() {
            return Ok(());
        }
        let result = self
            .sink
            .write_all(&self.output)
            .and_then(|()| self.sink.flush());
        let len = self.output.len();
        self.output.clear();
        match result {
            Ok(()) => {
                debug!("nexus-tty: flushed {len} bytes to host {}", self.stream);
                Ok(())
            }
            Err(source) => {
                warn!(
                    "nexus-tty: dropped {len} bytes, host {} write failed: {source}",
                    self.stream
                );
                Err(TtyError::HostIo {
                    stream: self.stream,
                    source,
                })
            }
        }
    }
}

fn host_closed(kind: ErrorKind) -> bool {
    matches!(
        kind,
        ErrorKind::BrokenPipe | ErrorKind::UnexpectedEof | ErrorKind::ConnectionAborted
    )
}

impl DeviceOps for TtyOps {
    fn get_char(&mut self) -> Result<GetChar> {
        if self.input.is_empty() {
            if let Some(outcome) = self.refill()? {
                return Ok(outcome);
            }
        }
        Ok(self.input.pop_front().map_or(GetChar::NoData, GetChar::Byte))
    }

    fn put_char(&mut self, value: PutChar) -> Result<()> {
        let flush = match value {
            PutChar::Byte(byte) => {
                self.output.push(byte);
                byte == b'\n'
            }
            PutChar::Close => true,
        };
        if flush {
            self.write_out()
        } else {
            Ok(())
        }
    }

    fn flush(&mut self) -> Result<()> {
        self.write_out()
    }

    fn buffered(&self) -> usize {
        self.input.len()
    }
}
