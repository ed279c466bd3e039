// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Character device stream semantics on top of a device operation set
//! OWNERS: @runtime
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: Unit tests (partial reads, failed flushes, close flush)

use core::fmt;

use log::warn;

use crate::fs::{DeviceId, FsError};
use crate::ops::{DeviceOps, GetChar, PutChar};

/// One registered character device.
pub struct CharDevice {
    id: DeviceId,
    ops: Box<dyn DeviceOps>,
    opens: usize,
}

impl CharDevice {
    /// Attaches `ops` to `id`.
    pub fn new(id: DeviceId, ops: Box<dyn DeviceOps>) -> Self {
        Self { id, ops, opens: 0 }
    }

    /// Device identifier.
    pub fn id(&self) -> DeviceId {
        self.id
    }

    /// Whether at least one guest descriptor holds the device open.
    pub fn is_open(&self) -> bool {
        self.opens > 0
    }

    /// Records a new guest descriptor on the device.
    pub fn open(&mut self) {
        self.opens += 1;
    }

    /// Drops one guest descriptor. The last release sends the close sentinel.
    pub fn release(&mut self) -> Result<(), FsError> {
        self.opens = self.opens.saturating_sub(1);
        if self.opens > 0 {
            return Ok(());
        }
        self.ops.put_char(PutChar::Close).map_err(|err| {
            warn!("nexus-tty: device {} close flush failed: {err}", self.id);
            FsError::Io(err.to_string())
        })
    }

    /// Reads up to `buf.len()` bytes.
    ///
    /// Blocks for the first byte only; once the device's input buffer is
    /// drained the read returns short instead of issuing another host read.
    pub fn read(&mut self, buf: &mut [u8]) -> Result<usize, FsError> {
        let mut filled = 0;
        while filled < buf.len() {
            if filled > 0 && self.ops.buffered() == 0 {
                break;
            }
            match self.ops.get_char() {
                Ok(GetChar::Byte(byte)) => {
                    buf[filled] = byte;
                    filled += 1;
                }
                Ok(GetChar::NoData) if filled == 0 => return Err(FsError::WouldBlock),
                Ok(GetChar::NoData | GetChar::Eof) => break,
                Err(err) if filled == 0 => return Err(FsError::Io(err.to_string())),
                Err(err) => {
                    warn!("nexus-tty: device {} short read after {filled} bytes: {err}", self.id);
                    break;
                }
            }
        }
        Ok(filled)
    }

    /// Writes `buf` byte by byte.
    ///
    /// Fails with [`FsError::Io`] if a host flush triggered by the call
    /// fails; the dropped line is not reported as written.
    pub fn write(&mut self, buf: &[u8]) -> Result<usize, FsError> {
        for (offset, &byte) in buf.iter().enumerate() {
            if let Err(err) = self.ops.put_char(PutChar::Byte(byte)) {
                warn!(
                    "nexus-tty: device {} write failed at byte {offset}: {err}",
                    self.id
                );
                return Err(FsError::Io(err.to_string()));
            }
        }
        Ok(buf.len())
    }

    /// Flushes pending output.
    pub fn fsync(&mut self) -> Result<(), FsError> {
        self.ops.flush().map_err(|err| FsError::Io(err.to_string()))
    }
}

impl fmt::Debug for CharDevice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CharDevice")
            .field("id", &self.id)
            .field("opens", &self.opens)
            .finish_non_exhaustive()
    }
}
