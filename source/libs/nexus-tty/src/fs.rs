// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Primitives consumed from the guest virtual filesystem
//! OWNERS: @runtime
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: Exercised through nexus-guestfs and tests/tty_e2e

use core::fmt;

use thiserror::Error;

use crate::ops::DeviceOps;

/// Guest file descriptor slot.
pub type Fd = u32;

/// Device identifier (major/minor pair).
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct DeviceId {
    major: u32,
    minor: u32,
}

impl DeviceId {
    /// Builds an identifier from its parts.
    pub const fn new(major: u32, minor: u32) -> Self {
        Self { major, minor }
    }

    /// Major number.
    pub const fn major(self) -> u32 {
        self.major
    }

    /// Minor number.
    pub const fn minor(self) -> u32 {
        self.minor
    }
}

impl fmt::Display for DeviceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.major, self.minor)
    }
}

/// Access mode requested when opening a guest path.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum OpenMode {
    /// Read access only.
    ReadOnly,
    /// Write access only.
    WriteOnly,
    /// Read and write access.
    ReadWrite,
}

impl OpenMode {
    /// Whether reads are permitted.
    pub fn readable(self) -> bool {
        matches!(self, Self::ReadOnly | Self::ReadWrite)
    }

    /// Whether writes are permitted.
    pub fn writable(self) -> bool {
        matches!(self, Self::WriteOnly | Self::ReadWrite)
    }
}

/// Node kind reported by [`GuestFs::lstat`] without following symlinks.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum NodeKind {
    /// Directory.
    Directory,
    /// Regular file.
    File,
    /// Character device node.
    Device(DeviceId),
    /// Symbolic link and its raw target.
    Symlink(String),
}

/// Open descriptor bookkeeping.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Descriptor {
    /// Path the descriptor was opened with.
    pub path: String,
    /// Access mode of the descriptor.
    pub mode: OpenMode,
}

/// Errors reported by guest filesystem primitives.
#[derive(Clone, Debug, Error, PartialEq, Eq)]
pub enum FsError {
    /// Path does not exist.
    #[error("no such file or directory: {0}")]
    NotFound(String),
    /// Path or device already exists.
    #[error("already exists: {0}")]
    Exists(String),
    /// Descriptor slot is not open.
    #[error("bad file descriptor {0}")]
    BadDescriptor(Fd),
    /// Parent component is not a directory.
    #[error("not a directory: {0}")]
    NotADirectory(String),
    /// Path does not name a device node.
    #[error("not a device: {0}")]
    NotADevice(String),
    /// Operation not permitted by the descriptor's access mode.
    #[error("access denied")]
    AccessDenied,
    /// Too many levels of symbolic links.
    #[error("too many symlinks resolving {0}")]
    Loop(String),
    /// Device node references an unregistered device.
    #[error("no device registered for {0}")]
    NoDevice(DeviceId),
    /// Device has no data available yet.
    #[error("resource temporarily unavailable")]
    WouldBlock,
    /// Device level I/O failure.
    #[error("io error: {0}")]
    Io(String),
}

/// Device table and major number allocator owned by the guest runtime.
pub trait DeviceRegistry {
    /// Returns a major number never handed out before in this process lifetime.
    fn alloc_major(&mut self) -> u32;

    /// Attaches an operation set to `id`. Fails with [`FsError::Exists`] if `id` is taken.
    fn register(&mut self, id: DeviceId, ops: Box<dyn DeviceOps>) -> Result<(), FsError>;

    /// Detaches the operation set registered for `id`. Returns whether one was present.
    fn unregister(&mut self, id: DeviceId) -> bool;

    /// Whether `id` currently has an operation set.
    fn is_registered(&self, id: DeviceId) -> bool;
}

/// Filesystem primitives the stream binding manager relies on.
///
/// Semantics are POSIX-like: `unlink` of a missing path is an error and
/// `open` returns the lowest free descriptor slot.
pub trait GuestFs {
    /// Creates a character device node at `path`.
    fn mkdev(&mut self, path: &str, id: DeviceId) -> Result<(), FsError>;

    /// Creates a symbolic link at `link` pointing to `target`.
    fn symlink(&mut self, target: &str, link: &str) -> Result<(), FsError>;

    /// Removes a non-directory node.
    fn unlink(&mut self, path: &str) -> Result<(), FsError>;

    /// Describes the node at `path` without following a trailing symlink.
    fn lstat(&self, path: &str) -> Result<NodeKind, FsError>;

    /// Opens `path` with `mode`, returning the lowest free descriptor.
    fn open(&mut self, path: &str, mode: OpenMode) -> Result<Fd, FsError>;

    /// Closes descriptor `fd`.
    fn close(&mut self, fd: Fd) -> Result<(), FsError>;

    /// Returns the bookkeeping for `fd` if it is open.
    fn descriptor(&self, fd: Fd) -> Option<Descriptor>;
}
