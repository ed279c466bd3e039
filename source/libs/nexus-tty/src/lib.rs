// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Host-backed tty devices for a guest virtual filesystem
//! OWNERS: @runtime
//! STATUS: Functional (host-first)
//! API_STABILITY: Unstable
//! TEST_COVERAGE: Unit tests per module + tests/tty_e2e
//!
//! PUBLIC API:
//!   - DeviceOps / TtyOps: get_char, put_char, flush over host streams
//!   - CharDevice: open/read/write/release semantics for one device
//!   - StreamBinder: swaps guest stdin/stdout/stderr onto host-backed devices
//!   - GuestFs / DeviceRegistry: primitives consumed from the guest filesystem
//!   - BindConfig: TOML configuration
//!   - TtyError: error taxonomy
//!
//! DEPENDENCIES:
//!   - log: diagnostics
//!   - parking_lot: shared host input lock
//!   - serde/toml: configuration
//!   - thiserror: error enums

#![forbid(unsafe_code)]
#![deny(clippy::all, missing_docs)]

mod binding;
mod config;
mod device;
mod error;
mod fs;
mod host;
mod ops;

pub use binding::{StreamBinder, StreamBinding};
pub use config::{BindConfig, ConfigError, DEFAULT_READ_CHUNK, MAX_READ_CHUNK};
pub use device::CharDevice;
pub use error::{BindStep, Result, TtyError};
pub use fs::{Descriptor, DeviceId, DeviceRegistry, Fd, FsError, GuestFs, NodeKind, OpenMode};
pub use host::{HostSink, HostStream, HostStreams, SharedInput};
pub use ops::{DeviceOps, GetChar, PutChar, TtyOps};
