// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

use core::fmt;

use thiserror::Error;

use crate::config::ConfigError;
use crate::fs::FsError;
use crate::host::HostStream;

/// Result alias used across the crate.
pub type Result<T> = core::result::Result<T, TtyError>;

/// Step of the stream binding sequence, reported on failure.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum BindStep {
    /// Allocating a device identifier.
    Allocate,
    /// Registering an operation set.
    Register,
    /// Creating a device node.
    MakeNode,
    /// Removing a prior stdio path.
    Unlink,
    /// Linking a stdio path to a device node.
    Symlink,
    /// Closing a prior descriptor slot.
    Close,
    /// Reopening a descriptor slot on the new path.
    Reopen,
    /// Restoring the pre-binding layout.
    Restore,
}

impl fmt::Display for BindStep {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Allocate => "allocate device",
            Self::Register => "register device",
            Self::MakeNode => "create device node",
            Self::Unlink => "unlink stdio path",
            Self::Symlink => "symlink stdio path",
            Self::Close => "close descriptor",
            Self::Reopen => "reopen descriptor",
            Self::Restore => "restore prior stdio",
        };
        f.write_str(label)
    }
}

/// Errors surfaced by tty devices and stream binding.
#[derive(Debug, Error)]
pub enum TtyError {
    /// Reading from or writing to a host stream failed.
    #[error("host {stream} i/o error: {source}")]
    HostIo {
        /// Host stream involved.
        stream: HostStream,
        /// Underlying error.
        source: std::io::Error,
    },
    /// Binding already applied or a device identifier is taken.
    #[error("binding conflict: {0}")]
    BindingConflict(String),
    /// A filesystem primitive failed while binding.
    #[error("{step} failed on {path}: {source}")]
    PathOperation {
        /// Failing step.
        step: BindStep,
        /// Path or descriptor the step operated on.
        path: String,
        /// Filesystem error.
        source: FsError,
    },
    /// Binding failed and the prior layout could not be fully restored.
    #[error("{failure}; rollback incomplete at {path}: {rollback}")]
    RollbackIncomplete {
        /// Original failure.
        failure: Box<TtyError>,
        /// Path or descriptor that could not be restored.
        path: String,
        /// First error hit while restoring.
        rollback: FsError,
    },
    /// Configuration could not be loaded.
    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl TtyError {
    pub(crate) fn path(step: BindStep, path: impl Into<String>, source: FsError) -> Self {
        Self::PathOperation {
            step,
            path: path.into(),
            source,
        }
    }

    /// Whether this error came from a host stream.
    pub fn is_host_io(&self) -> bool {
        matches!(self, Self::HostIo { .. })
    }
}
