// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: In-memory guest virtual filesystem used to host tty bindings
//! OWNERS: @runtime
//! STATUS: Functional (host-first)
//! API_STABILITY: Unstable
//! TEST_COVERAGE: Unit tests + tests/tty_e2e
//!
//! PUBLIC API:
//!   - MemFs: path table, symlinks, device nodes, descriptor table
//!   - DeviceTable: device registry with a per-session major counter
//!   - NullOps: device-op set that discards writes and reads EOF
//!
//! DEPENDENCIES:
//!   - nexus-tty: consumed GuestFs/DeviceRegistry traits and CharDevice
//!   - parking_lot: device table and per-device exclusion

#![forbid(unsafe_code)]
#![deny(clippy::all, missing_docs)]

mod devices;
mod memfs;
mod path;

pub use devices::{DeviceTable, NullOps, FIRST_DYNAMIC_MAJOR};
pub use memfs::{MemFs, MAX_SYMLINK_DEPTH};
