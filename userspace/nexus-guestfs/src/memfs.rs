// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: In-memory node table, symlink resolution and descriptor table
//! OWNERS: @runtime
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: Unit tests (paths, symlinks, descriptors, devices)

use std::collections::{BTreeMap, VecDeque};
use std::sync::Arc;

use log::debug;
use parking_lot::Mutex;

use nexus_tty::{
    CharDevice, Descriptor, DeviceId, DeviceRegistry, Fd, FsError, GuestFs, NodeKind, OpenMode,
};

use crate::devices::{DeviceTable, NullOps};
use crate::path;

/// Maximum symlinks followed while resolving one path.
pub const MAX_SYMLINK_DEPTH: usize = 40;

const NULL_DEVICE: DeviceId = DeviceId::new(1, 3);
const TTY_DEVICE: DeviceId = DeviceId::new(5, 0);
const TTY1_DEVICE: DeviceId = DeviceId::new(6, 0);

#[derive(Clone, Debug)]
enum Node {
    Directory,
    File(Vec<u8>),
    Device(DeviceId),
    Symlink(String),
}

enum Target {
    Device(Arc<Mutex<CharDevice>>),
    File { path: String, offset: usize },
}

struct OpenFile {
    path: String,
    mode: OpenMode,
    target: Target,
}

/// In-memory guest filesystem.
pub struct MemFs {
    nodes: BTreeMap<String, Node>,
    fds: Vec<Option<OpenFile>>,
    devices: DeviceTable,
}

impl MemFs {
    /// Creates a filesystem holding only `/` with a fresh device table.
    pub fn new() -> Self {
        Self::with_devices(DeviceTable::new())
    }

    /// Creates a filesystem holding only `/` backed by `devices`.
    pub fn with_devices(devices: DeviceTable) -> Self {
        let mut nodes = BTreeMap::new();
        nodes.insert("/".to_string(), Node::Directory);
        Self {
            nodes,
            fds: Vec::new(),
            devices,
        }
    }

    /// Builds the usual guest stdio layout: `/dev/null`, `/dev/tty` and
    /// `/dev/tty1` as null devices, `/dev/stdin` and `/dev/stdout` linked to
    /// `/dev/tty`, `/dev/stderr` linked to `/dev/tty1`, and descriptors 0, 1
    /// and 2 open on the stdio paths.
    pub fn with_standard_streams() -> Result<Self, FsError> {
        let mut fs = Self::new();
        fs.mkdir("/dev")?;
        for (path, id) in [
            ("/dev/null", NULL_DEVICE),
            ("/dev/tty", TTY_DEVICE),
            ("/dev/tty1", TTY1_DEVICE),
        ] {
            fs.devices.register(id, Box::new(NullOps))?;
            fs.mkdev(path, id)?;
        }
        fs.symlink("/dev/tty", "/dev/stdin")?;
        fs.symlink("/dev/tty", "/dev/stdout")?;
        fs.symlink("/dev/tty1", "/dev/stderr")?;
        fs.open("/dev/stdin", OpenMode::ReadOnly)?;
        fs.open("/dev/stdout", OpenMode::WriteOnly)?;
        fs.open("/dev/stderr", OpenMode::WriteOnly)?;
        Ok(fs)
    }

    /// Handle to the device table; it doubles as the session's [`DeviceRegistry`].
    pub fn devices(&self) -> DeviceTable {
        self.devices.clone()
    }

    /// Creates a directory.
    pub fn mkdir(&mut self, path: &str) -> Result<(), FsError> {
        self.create(path, Node::Directory)
    }

    /// Creates or replaces a regular file with `bytes`.
    pub fn write_file(&mut self, path: &str, bytes: &[u8]) -> Result<(), FsError> {
        let canonical = self.resolve(path, true)?;
        match self.nodes.get_mut(&canonical) {
            Some(Node::File(contents)) => {
                *contents = bytes.to_vec();
                Ok(())
            }
            Some(_) => Err(FsError::Exists(path.to_string())),
            None => self.create(path, Node::File(bytes.to_vec())),
        }
    }

    /// Contents of the regular file at `path`.
    pub fn read_file(&self, path: &str) -> Result<Vec<u8>, FsError> {
        let canonical = self.resolve(path, true)?;
        match self.nodes.get(&canonical) {
            Some(Node::File(contents)) => Ok(contents.clone()),
            Some(_) => Err(FsError::AccessDenied),
            None => Err(FsError::NotFound(path.to_string())),
        }
    }

    /// Describes the node at `path`, following symlinks.
    pub fn stat(&self, path: &str) -> Result<NodeKind, FsError> {
        let canonical = self.resolve(path, true)?;
        self.kind_of(&canonical, path)
    }

    /// Target of the symlink at `path`.
    pub fn readlink(&self, path: &str) -> Result<String, FsError> {
        match self.lstat(path)? {
            NodeKind::Symlink(target) => Ok(target),
            _ => Err(FsError::AccessDenied),
        }
    }

    /// Reads from descriptor `fd`.
    pub fn read(&mut self, fd: Fd, buf: &mut [u8]) -> Result<usize, FsError> {
        let file = open_file(&mut self.fds, fd)?;
        if !file.mode.readable() {
            return Err(FsError::AccessDenied);
        }
        match &mut file.target {
            Target::Device(device) => device.lock().read(buf),
            Target::File { path, offset } => {
                let contents = match self.nodes.get(path.as_str()) {
                    Some(Node::File(contents)) => contents,
                    _ => return Err(FsError::NotFound(path.clone())),
                };
                let start = (*offset).min(contents.len());
                let len = buf.len().min(contents.len() - start);
                buf[..len].copy_from_slice(&contents[start..start + len]);
                *offset = start + len;
                Ok(len)
            }
        }
    }

    /// Writes to descriptor `fd`, returning the bytes accepted.
    pub fn write(&mut self, fd: Fd, buf: &[u8]) -> Result<usize, FsError> {
        let file = open_file(&mut self.fds, fd)?;
        if !file.mode.writable() {
            return Err(FsError::AccessDenied);
        }
        match &mut file.target {
            Target::Device(device) => device.lock().write(buf),
            Target::File { path, offset } => {
                let contents = match self.nodes.get_mut(path.as_str()) {
                    Some(Node::File(contents)) => contents,
                    _ => return Err(FsError::NotFound(path.clone())),
                };
                let end = *offset + buf.len();
                if contents.len() < end {
                    contents.resize(end, 0);
                }
                contents[*offset..end].copy_from_slice(buf);
                *offset = end;
                Ok(buf.len())
            }
        }
    }

    /// Flushes pending device output for `fd`.
    pub fn fsync(&mut self, fd: Fd) -> Result<(), FsError> {
        match &open_file(&mut self.fds, fd)?.target {
            Target::Device(device) => device.lock().fsync(),
            Target::File { .. } => Ok(()),
        }
    }

    fn kind_of(&self, canonical: &str, path: &str) -> Result<NodeKind, FsError> {
        match self.nodes.get(canonical) {
            Some(Node::Directory) => Ok(NodeKind::Directory),
            Some(Node::File(_)) => Ok(NodeKind::File),
            Some(Node::Device(id)) => Ok(NodeKind::Device(*id)),
            Some(Node::Symlink(target)) => Ok(NodeKind::Symlink(target.clone())),
            None => Err(FsError::NotFound(path.to_string())),
        }
    }

    fn create(&mut self, path: &str, node: Node) -> Result<(), FsError> {
        let canonical = self.resolve(path, false)?;
        if self.nodes.contains_key(&canonical) {
            return Err(FsError::Exists(path.to_string()));
        }
        let parent = path::parent(&canonical);
        match self.nodes.get(parent) {
            Some(Node::Directory) => {}
            Some(_) => return Err(FsError::NotADirectory(parent.to_string())),
            None => return Err(FsError::NotFound(parent.to_string())),
        }
        debug!("guestfs: create {canonical}");
        self.nodes.insert(canonical, node);
        Ok(())
    }

    /// Canonical path of `path`, following symlinks in every component and
    /// in the last one only when `follow_final` is set.
    fn resolve(&self, path: &str, follow_final: bool) -> Result<String, FsError> {
        let mut pending: VecDeque<String> = path::components(path).map(str::to_string).collect();
        let mut resolved: Vec<String> = Vec::new();
        let mut depth = 0;
        while let Some(part) = pending.pop_front() {
            match part.as_str() {
                "." => continue,
                ".." => {
                    resolved.pop();
                    continue;
                }
                _ => {}
            }
            let is_last = pending.is_empty();
            resolved.push(part);
            let candidate = path::join(&resolved);
            match self.nodes.get(&candidate) {
                Some(Node::Symlink(target)) if !is_last || follow_final => {
                    depth += 1;
                    if depth > MAX_SYMLINK_DEPTH {
                        return Err(FsError::Loop(path.to_string()));
                    }
                    resolved.pop();
                    if target.starts_with('/') {
                        resolved.clear();
                    }
                    for part in path::components(target).rev() {
                        pending.push_front(part.to_string());
                    }
                }
                Some(Node::Directory) => {}
                Some(_) if !is_last => return Err(FsError::NotADirectory(candidate)),
                None if !is_last => return Err(FsError::NotFound(candidate)),
                _ => {}
            }
        }
        Ok(path::join(&resolved))
    }
}

fn open_file(fds: &mut [Option<OpenFile>], fd: Fd) -> Result<&mut OpenFile, FsError> {
    fds.get_mut(fd as usize)
        .and_then(Option::as_mut)
        .ok_or(FsError::BadDescriptor(fd))
}

impl Default for MemFs {
    fn default() -> Self {
        Self::new()
    }
}

impl GuestFs for MemFs {
    fn mkdev(&mut self, path: &str, id: DeviceId) -> Result<(), FsError> {
        self.create(path, Node::Device(id))
    }

    fn symlink(&mut self, target: &str, link: &str) -> Result<(), FsError> {
        self.create(link, Node::Symlink(target.to_string()))
    }

    fn unlink(&mut self, path: &str) -> Result<(), FsError> {
        let canonical = self.resolve(path, false)?;
        match self.nodes.get(&canonical) {
            None => Err(FsError::NotFound(path.to_string())),
            Some(Node::Directory) => Err(FsError::AccessDenied),
            Some(_) => {
                debug!("guestfs: unlink {canonical}");
                self.nodes.remove(&canonical);
                Ok(())
            }
        }
    }

    fn lstat(&self, path: &str) -> Result<NodeKind, FsError> {
        let canonical = self.resolve(path, false)?;
        self.kind_of(&canonical, path)
    }

    fn open(&mut self, path: &str, mode: OpenMode) -> Result<Fd, FsError> {
        let canonical = self.resolve(path, true)?;
        let target = match self.nodes.get(&canonical) {
            None => return Err(FsError::NotFound(path.to_string())),
            Some(Node::Directory | Node::Symlink(_)) => return Err(FsError::AccessDenied),
            Some(Node::File(_)) => Target::File {
                path: canonical,
                offset: 0,
            },
            Some(Node::Device(id)) => {
                let device = self.devices.get(*id).ok_or(FsError::NoDevice(*id))?;
                device.lock().open();
                Target::Device(device)
            }
        };
        let file = OpenFile {
            path: path.to_string(),
            mode,
            target,
        };
        let fd = match self.fds.iter().position(Option::is_none) {
            Some(slot) => {
                self.fds[slot] = Some(file);
                slot
            }
            None => {
                self.fds.push(Some(file));
                self.fds.len() - 1
            }
        };
        let fd = Fd::try_from(fd).map_err(|_| FsError::Io("descriptor table full".into()))?;
        debug!("guestfs: open {path} -> fd {fd}");
        Ok(fd)
    }

    fn close(&mut self, fd: Fd) -> Result<(), FsError> {
        let file = self
            .fds
            .get_mut(fd as usize)
            .and_then(Option::take)
            .ok_or(FsError::BadDescriptor(fd))?;
        debug!("guestfs: close fd {fd} ({})", file.path);
        match file.target {
            Target::Device(device) => device.lock().release(),
            Target::File { .. } => Ok(()),
        }
    }

    fn descriptor(&self, fd: Fd) -> Option<Descriptor> {
        self.fds
            .get(fd as usize)
            .and_then(Option::as_ref)
            .map(|file| Descriptor {
                path: file.path.clone(),
                mode: file.mode,
            })
    }
}
