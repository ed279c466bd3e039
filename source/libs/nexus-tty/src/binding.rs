// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Stream binding manager for guest stdin/stdout/stderr
//! OWNERS: @runtime
//! STATUS: Functional
//! API_STABILITY: Unstable
//! TEST_COVERAGE: tests/tty_e2e (binding, conflicts, rollback, reset)
//!
//! Binding allocates two tty devices (stdout-class and stderr-class), exposes
//! them as device nodes, relinks the guest stdio paths onto them and reopens
//! descriptor slots 0, 1 and 2. Every mutation is journaled so a failure at
//! any step restores the prior layout.

use log::{error, info, warn};

use crate::config::BindConfig;
use crate::error::{BindStep, Result, TtyError};
use crate::fs::{Descriptor, DeviceId, DeviceRegistry, Fd, FsError, GuestFs, NodeKind, OpenMode};
use crate::host::{HostStream, HostStreams};
use crate::ops::TtyOps;

const STDIO_SLOTS: [Fd; 3] = [0, 1, 2];

/// Devices and paths installed by a successful binding.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct StreamBinding {
    tty: DeviceId,
    tty_err: DeviceId,
    tty_path: String,
    tty_err_path: String,
}

impl StreamBinding {
    /// Device backing stdin and stdout.
    pub fn tty(&self) -> DeviceId {
        self.tty
    }

    /// Device backing stderr.
    pub fn tty_err(&self) -> DeviceId {
        self.tty_err
    }

    /// Device node path of [`StreamBinding::tty`].
    pub fn tty_path(&self) -> &str {
        &self.tty_path
    }

    /// Device node path of [`StreamBinding::tty_err`].
    pub fn tty_err_path(&self) -> &str {
        &self.tty_err_path
    }

    /// Device a stdio slot is bound to.
    pub fn device_for_slot(&self, fd: Fd) -> Option<DeviceId> {
        match fd {
            0 | 1 => Some(self.tty),
            2 => Some(self.tty_err),
            _ => None,
        }
    }
}

/// Applied mutation, undone in reverse order on rollback.
#[derive(Clone, Debug)]
enum JournalEntry {
    Registered(DeviceId),
    NodeCreated(String),
    Unlinked { path: String, prior: NodeKind },
    Linked(String),
    Closed { fd: Fd, prior: Descriptor },
    Opened(Fd),
}

/// Per-session stream binding manager.
#[derive(Debug)]
pub struct StreamBinder {
    config: BindConfig,
    binding: Option<StreamBinding>,
    journal: Vec<JournalEntry>,
}

impl StreamBinder {
    /// Creates a binder after validating `config`.
    pub fn new(config: BindConfig) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config,
            binding: None,
            journal: Vec::new(),
        })
    }

    /// Active binding, if any.
    pub fn binding(&self) -> Option<&StreamBinding> {
        self.binding.as_ref()
    }

    /// Configuration in use.
    pub fn config(&self) -> &BindConfig {
        &self.config
    }

    /// Rebinds guest stdio onto host-backed tty devices.
    ///
    /// All-or-nothing: on failure the prior paths, descriptors and device
    /// registrations are restored. A second call without [`StreamBinder::reset`]
    /// fails with [`TtyError::BindingConflict`] and changes nothing.
    pub fn bind<F, R>(
        &mut self,
        fs: &mut F,
        registry: &mut R,
        host: HostStreams,
    ) -> Result<&StreamBinding>
    where
        F: GuestFs + ?Sized,
        R: DeviceRegistry + ?Sized,
    {
        if let Some(existing) = &self.binding {
            return Err(TtyError::BindingConflict(format!(
                "standard streams already bound to {} and {}",
                existing.tty, existing.tty_err
            )));
        }
        debug_assert!(self.journal.is_empty());
        match self.apply(fs, registry, host) {
            Ok(binding) => {
                info!(
                    "nexus-tty: bound stdin/stdout -> {} ({}), stderr -> {} ({})",
                    binding.tty_path, binding.tty, binding.tty_err_path, binding.tty_err
                );
                Ok(self.binding.insert(binding))
            }
            Err(failure) => {
                error!("nexus-tty: binding aborted: {failure}");
                let journal = std::mem::take(&mut self.journal);
                match undo(fs, registry, journal) {
                    Ok(()) => Err(failure),
                    Err(incomplete) => {
                        error!(
                            "nexus-tty: rollback incomplete at {}: {}",
                            incomplete.path, incomplete.source
                        );
                        Err(TtyError::RollbackIncomplete {
                            failure: Box::new(failure),
                            path: incomplete.path,
                            rollback: incomplete.source,
                        })
                    }
                }
            }
        }
    }

    /// Undoes an active binding and unregisters its devices.
    ///
    /// No-op when nothing is bound. Devices allocated by a later `bind` get
    /// fresh major numbers. If a step cannot be undone the binding stays
    /// active and keeps the steps still to undo, so `reset` can be retried.
    pub fn reset<F, R>(&mut self, fs: &mut F, registry: &mut R) -> Result<()>
    where
        F: GuestFs + ?Sized,
        R: DeviceRegistry + ?Sized,
    {
        let Some(binding) = &self.binding else {
            return Ok(());
        };
        let (tty, tty_err) = (binding.tty, binding.tty_err);
        let journal = std::mem::take(&mut self.journal);
        if let Err(incomplete) = undo(fs, registry, journal) {
            self.journal = incomplete.remaining;
            return Err(TtyError::path(
                BindStep::Restore,
                incomplete.path,
                incomplete.source,
            ));
        }
        self.binding = None;
        info!("nexus-tty: released {tty} and {tty_err}");
        Ok(())
    }

    fn apply<F, R>(
        &mut self,
        fs: &mut F,
        registry: &mut R,
        host: HostStreams,
    ) -> Result<StreamBinding>
    where
        F: GuestFs + ?Sized,
        R: DeviceRegistry + ?Sized,
    {
        let tty = allocate(registry, None)?;
        let tty_err = allocate(registry, Some(tty))?;

        let HostStreams {
            input,
            stdout,
            stderr,
        } = host;
        let chunk = self.config.read_chunk;
        let devices = [
            (tty, TtyOps::new(input.clone(), stdout, HostStream::Stdout, chunk)),
            (tty_err, TtyOps::new(input, stderr, HostStream::Stderr, chunk)),
        ];
        for (id, ops) in devices {
            registry.register(id, Box::new(ops)).map_err(|err| match err {
                FsError::Exists(_) => {
                    TtyError::BindingConflict(format!("device {id} already registered"))
                }
                other => TtyError::path(BindStep::Register, id.to_string(), other),
            })?;
            self.journal.push(JournalEntry::Registered(id));
        }

        let config = self.config.clone();
        for (path, id) in [(&config.tty_path, tty), (&config.tty_err_path, tty_err)] {
            fs.mkdev(path, id)
                .map_err(|err| TtyError::path(BindStep::MakeNode, path.as_str(), err))?;
            self.journal.push(JournalEntry::NodeCreated(path.clone()));
        }

        for path in config.stdio_paths() {
            self.unlink_prior(fs, path)?;
        }
        let links = [
            (&config.tty_path, &config.stdin_path),
            (&config.tty_path, &config.stdout_path),
            (&config.tty_err_path, &config.stderr_path),
        ];
        for (target, link) in links {
            fs.symlink(target, link)
                .map_err(|err| TtyError::path(BindStep::Symlink, link.as_str(), err))?;
            self.journal.push(JournalEntry::Linked(link.clone()));
        }

        for fd in STDIO_SLOTS {
            if let Some(prior) = fs.descriptor(fd) {
                fs.close(fd)
                    .map_err(|err| TtyError::path(BindStep::Close, format!("fd {fd}"), err))?;
                self.journal.push(JournalEntry::Closed { fd, prior });
            }
        }
        let modes = [OpenMode::ReadOnly, OpenMode::WriteOnly, OpenMode::WriteOnly];
        for ((fd, path), mode) in STDIO_SLOTS.into_iter().zip(config.stdio_paths()).zip(modes) {
            open_at(fs, path, mode, fd)
                .map_err(|err| TtyError::path(BindStep::Reopen, path, err))?;
            self.journal.push(JournalEntry::Opened(fd));
        }

        Ok(StreamBinding {
            tty,
            tty_err,
            tty_path: config.tty_path,
            tty_err_path: config.tty_err_path,
        })
    }

    fn unlink_prior<F>(&mut self, fs: &mut F, path: &str) -> Result<()>
    where
        F: GuestFs + ?Sized,
    {
        let prior = match fs.lstat(path) {
            Ok(kind @ (NodeKind::Symlink(_) | NodeKind::Device(_))) => kind,
            Ok(NodeKind::File | NodeKind::Directory) => {
                return Err(TtyError::path(
                    BindStep::Unlink,
                    path,
                    FsError::Exists(path.to_string()),
                ))
            }
            Err(FsError::NotFound(_)) => return Ok(()),
            Err(err) => return Err(TtyError::path(BindStep::Unlink, path, err)),
        };
        fs.unlink(path)
            .map_err(|err| TtyError::path(BindStep::Unlink, path, err))?;
        self.journal.push(JournalEntry::Unlinked {
            path: path.to_string(),
            prior,
        });
        Ok(())
    }
}

fn allocate<R>(registry: &mut R, previous: Option<DeviceId>) -> Result<DeviceId>
where
    R: DeviceRegistry + ?Sized,
{
    let id = DeviceId::new(registry.alloc_major(), 0);
    if registry.is_registered(id) || previous == Some(id) {
        return Err(TtyError::BindingConflict(format!(
            "allocated device {id} is already in use"
        )));
    }
    Ok(id)
}

/// Opens `path` so that it lands exactly in descriptor `slot`.
///
/// Lower free slots are filled with placeholders that are closed afterwards.
fn open_at<F>(fs: &mut F, path: &str, mode: OpenMode, slot: Fd) -> core::result::Result<(), FsError>
where
    F: GuestFs + ?Sized,
{
    let mut placeholders = Vec::new();
    let result = loop {
        match fs.open(path, mode) {
            Ok(fd) if fd == slot => break Ok(()),
            Ok(fd) if fd < slot => placeholders.push(fd),
            Ok(fd) => {
                if let Err(err) = fs.close(fd) {
                    warn!("nexus-tty: releasing fd {fd} opened on {path} failed: {err}");
                }
                break Err(FsError::BadDescriptor(slot));
            }
            Err(err) => break Err(err),
        }
    };
    for fd in placeholders {
        fs.close(fd)?;
    }
    result
}

/// First failure of an [`undo`] pass plus the entries it could not revert.
struct UndoIncomplete {
    path: String,
    source: FsError,
    remaining: Vec<JournalEntry>,
}

/// Reverts `journal`, continuing past failures and reporting the first one.
fn undo<F, R>(
    fs: &mut F,
    registry: &mut R,
    journal: Vec<JournalEntry>,
) -> core::result::Result<(), UndoIncomplete>
where
    F: GuestFs + ?Sized,
    R: DeviceRegistry + ?Sized,
{
    let mut failed = Vec::new();
    let mut reopen = Vec::new();
    for entry in journal.into_iter().rev() {
        let (path, result) = match &entry {
            // The guest may already have closed the slot itself.
            JournalEntry::Opened(fd) if fs.descriptor(*fd).is_none() => continue,
            JournalEntry::Opened(fd) => (format!("fd {fd}"), fs.close(*fd)),
            JournalEntry::Closed { fd, prior } => {
                reopen.push((*fd, prior.clone()));
                continue;
            }
            JournalEntry::Linked(path) | JournalEntry::NodeCreated(path) => {
                (path.clone(), fs.unlink(path))
            }
            JournalEntry::Unlinked { path, prior } => {
                let result = match prior {
                    NodeKind::Symlink(target) => fs.symlink(target, path),
                    NodeKind::Device(id) => fs.mkdev(path, *id),
                    NodeKind::File | NodeKind::Directory => Ok(()),
                };
                (path.clone(), result)
            }
            JournalEntry::Registered(id) => {
                registry.unregister(*id);
                continue;
            }
        };
        if let Err(err) = result {
            error!("nexus-tty: restore {path} failed: {err}");
            failed.push((path, err, entry));
        }
    }
    reopen.sort_by_key(|(fd, _)| *fd);
    for (fd, prior) in reopen {
        if let Err(err) = open_at(fs, &prior.path, prior.mode, fd) {
            error!("nexus-tty: restore fd {fd} failed: {err}");
            failed.push((format!("fd {fd}"), err, JournalEntry::Closed { fd, prior }));
        }
    }
    let mut failed = failed.into_iter();
    let Some((path, source, entry)) = failed.next() else {
        return Ok(());
    };
    let mut remaining: Vec<JournalEntry> = core::iter::once(entry)
        .chain(failed.map(|(_, _, entry)| entry))
        .collect();
    remaining.reverse();
    Err(UndoIncomplete {
        path,
        source,
        remaining,
    })
}
