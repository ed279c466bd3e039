// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Guest session owning the filesystem, device table and stream binding
//! OWNERS: @runtime
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: Unit tests (cat/echo through host-backed stdio)

use std::thread;

use clap::ValueEnum;
use log::{info, warn};
use thiserror::Error;

use nexus_guestfs::{DeviceTable, MemFs};
use nexus_tty::{BindConfig, ConfigError, Fd, FsError, GuestFs, HostStreams, StreamBinder, TtyError};

const GUEST_STDIN: Fd = 0;
const GUEST_STDOUT: Fd = 1;
const GUEST_STDERR: Fd = 2;
const COPY_CHUNK: usize = 4096;

/// Errors that abort guest startup.
#[derive(Debug, Error)]
pub enum RunError {
    /// Configuration file was unusable.
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),
    /// Guest filesystem could not be prepared.
    #[error("guest filesystem: {0}")]
    Fs(#[from] FsError),
    /// Standard streams could not be bound.
    #[error("stdio binding: {0}")]
    Tty(#[from] TtyError),
}

/// Built-in guest programs.
#[derive(Clone, Copy, Debug, PartialEq, Eq, ValueEnum)]
pub enum Program {
    /// Copy guest stdin to guest stdout until end of input.
    Cat,
    /// Write the arguments joined by spaces to guest stdout.
    Echo,
}

/// One guest runtime instance.
pub struct GuestSession {
    fs: MemFs,
    devices: DeviceTable,
    binder: StreamBinder,
}

impl GuestSession {
    /// Builds the guest filesystem and binds its stdio to `host`.
    pub fn boot(config: BindConfig, host: HostStreams) -> Result<Self, RunError> {
        let mut fs = MemFs::with_standard_streams()?;
        let mut devices = fs.devices();
        let mut binder = StreamBinder::new(config)?;
        binder.bind(&mut fs, &mut devices, host)?;
        Ok(Self {
            fs,
            devices,
            binder,
        })
    }

    /// Runs `program` and returns its exit status.
    pub fn run(&mut self, program: Program, args: &[String]) -> u8 {
        info!("guest-run: starting {program:?}");
        let result = match program {
            Program::Cat => self.cat(),
            Program::Echo => {
                let mut line = args.join(" ");
                line.push('\n');
                self.write_all(GUEST_STDOUT, line.as_bytes())
            }
        };
        match result {
            Ok(()) => 0,
            Err(err) => {
                let message = format!("{program:?}: {err}\n");
                if let Err(report) = self.write_all(GUEST_STDERR, message.as_bytes()) {
                    warn!("guest-run: could not report failure on guest stderr: {report}");
                }
                1
            }
        }
    }

    /// Closes guest stdio (flushing pending output) and releases the binding.
    pub fn shutdown(mut self) -> Result<(), RunError> {
        for fd in [GUEST_STDIN, GUEST_STDOUT, GUEST_STDERR] {
            if self.fs.descriptor(fd).is_some() {
                self.fs.close(fd)?;
            }
        }
        self.binder.reset(&mut self.fs, &mut self.devices)?;
        Ok(())
    }

    fn cat(&mut self) -> Result<(), FsError> {
        let mut buf = [0u8; COPY_CHUNK];
        loop {
            let read = match self.fs.read(GUEST_STDIN, &mut buf) {
                Ok(0) => return Ok(()),
                Ok(read) => read,
                Err(FsError::WouldBlock) => {
                    thread::yield_now();
                    continue;
                }
                Err(err) => return Err(err),
            };
            self.write_all(GUEST_STDOUT, &buf[..read])?;
        }
    }

    fn write_all(&mut self, fd: Fd, mut bytes: &[u8]) -> Result<(), FsError> {
        while !bytes.is_empty() {
            let written = self.fs.write(fd, bytes)?;
            if written == 0 {
                return Err(FsError::Io("write accepted no bytes".into()));
            }
            bytes = &bytes[written..];
        }
        Ok(())
    }
}
