// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

use std::collections::HashMap;
use std::sync::Arc;

use log::debug;
use parking_lot::Mutex;

use nexus_tty::{CharDevice, DeviceId, DeviceOps, DeviceRegistry, FsError, GetChar, PutChar};

/// First major number handed out by [`DeviceTable::alloc_major`].
pub const FIRST_DYNAMIC_MAJOR: u32 = 64;

struct TableInner {
    next_major: u32,
    devices: HashMap<DeviceId, Arc<Mutex<CharDevice>>>,
}

/// Shared handle to a session's character device table.
///
/// Each device sits behind its own lock, so guest threads get one exclusive
/// owner per device at a time. A read holds that lock while it waits on the
/// host, and stdin shares its device with stdout: a guest thread blocked
/// reading stdin stalls stdout writers until input arrives. stderr is
/// unaffected.
#[derive(Clone)]
pub struct DeviceTable {
    inner: Arc<Mutex<TableInner>>,
}

impl DeviceTable {
    /// Creates an empty table.
    pub fn new() -> Self {
        Self {
            inner: Arc::new(Mutex::new(TableInner {
                next_major: FIRST_DYNAMIC_MAJOR,
                devices: HashMap::new(),
            })),
        }
    }

    /// Looks up the device registered for `id`.
    pub fn get(&self, id: DeviceId) -> Option<Arc<Mutex<CharDevice>>> {
        self.inner.lock().devices.get(&id).cloned()
    }

    /// Number of registered devices.
    pub fn len(&self) -> usize {
        self.inner.lock().devices.len()
    }

    /// Whether no device is registered.
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for DeviceTable {
    fn default() -> Self {
        Self::new()
    }
}

impl DeviceRegistry for DeviceTable {
    fn alloc_major(&mut self) -> u32 {
        let mut inner = self.inner.lock();
        let major = inner.next_major;
        inner.next_major = major.checked_add(1).unwrap_or(u32::MAX);
        major
    }

    fn register(&mut self, id: DeviceId, ops: Box<dyn DeviceOps>) -> Result<(), FsError> {
        let mut inner = self.inner.lock();
        if inner.devices.contains_key(&id) {
            return Err(FsError::Exists(id.to_string()));
        }
        inner
            .devices
            .insert(id, Arc::new(Mutex::new(CharDevice::new(id, ops))));
        debug!("guestfs: registered device {id}");
        Ok(())
    }

    fn unregister(&mut self, id: DeviceId) -> bool {
        let removed = self.inner.lock().devices.remove(&id).is_some();
        if removed {
            debug!("guestfs: unregistered device {id}");
        }
        removed
    }

    fn is_registered(&self, id: DeviceId) -> bool {
        self.inner.lock().devices.contains_key(&id)
    }
}

/// Null device: reads report EOF, writes are discarded.
#[derive(Clone, Copy, Debug, Default)]
pub struct NullOps;

impl DeviceOps for NullOps {
    fn get_char(&mut self) -> nexus_tty::Result<GetChar> {
        Ok(GetChar::Eof)
    }

    fn put_char(&mut self, _value: PutChar) -> nexus_tty::Result<()> {
        Ok(())
    }

    fn flush(&mut self) -> nexus_tty::Result<()> {
        Ok(())
    }
}
