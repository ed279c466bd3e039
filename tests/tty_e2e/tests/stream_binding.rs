// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Stream binding end-to-end tests
//! INTENT: Guest stdio rebinding onto host-backed tty devices over nexus-guestfs
//! DEPS: nexus-tty (StreamBinder), nexus-guestfs (MemFs, DeviceTable)
//! TESTS: Fresh and default layouts, double binding, reset, rollback on every failing step

use nexus_guestfs::{MemFs, NullOps, FIRST_DYNAMIC_MAJOR};
use nexus_tty::{
    BindConfig, BindStep, Descriptor, DeviceId, DeviceRegistry, FsError, GuestFs, NodeKind,
    OpenMode, StreamBinder, StreamBinding, TtyError,
};
use tty_e2e::{recording_host, stdio_layout, Fault, FaultyFs};

const NO_INPUT: [&[u8]; 0] = [];

fn binder() -> StreamBinder {
    StreamBinder::new(BindConfig::default()).expect("default config is valid")
}

fn bind<F, R>(binder: &mut StreamBinder, fs: &mut F, devices: &mut R) -> Result<StreamBinding, TtyError>
where
    F: GuestFs,
    R: DeviceRegistry,
{
    let (host, _, _) = recording_host(NO_INPUT);
    binder.bind(fs, devices, host).cloned()
}

#[test]
fn binds_default_guest_layout() {
    let mut fs = MemFs::with_standard_streams().unwrap();
    let mut devices = fs.devices();
    let mut binder = binder();
    let binding = bind(&mut binder, &mut fs, &mut devices).expect("binding succeeds");

    assert_ne!(binding.tty(), binding.tty_err());
    assert!(binding.tty().major() >= FIRST_DYNAMIC_MAJOR);
    assert!(binding.tty_err().major() >= FIRST_DYNAMIC_MAJOR);
    assert!(devices.is_registered(binding.tty()));
    assert!(devices.is_registered(binding.tty_err()));

    assert_eq!(fs.lstat("/dev/stdin").unwrap(), NodeKind::Symlink("/dev/hosttty".into()));
    assert_eq!(fs.lstat("/dev/stdout").unwrap(), NodeKind::Symlink("/dev/hosttty".into()));
    assert_eq!(fs.lstat("/dev/stderr").unwrap(), NodeKind::Symlink("/dev/hostttyerr".into()));
    assert_eq!(fs.stat("/dev/stdin").unwrap(), NodeKind::Device(binding.tty()));
    assert_eq!(fs.stat("/dev/stdout").unwrap(), NodeKind::Device(binding.tty()));
    assert_eq!(fs.stat("/dev/stderr").unwrap(), NodeKind::Device(binding.tty_err()));

    let expected = [
        ("/dev/stdin", OpenMode::ReadOnly),
        ("/dev/stdout", OpenMode::WriteOnly),
        ("/dev/stderr", OpenMode::WriteOnly),
    ];
    for (fd, (path, mode)) in expected.into_iter().enumerate() {
        assert_eq!(
            fs.descriptor(fd as u32),
            Some(Descriptor {
                path: path.into(),
                mode
            })
        );
        assert!(binding.device_for_slot(fd as u32).is_some());
    }
    assert_eq!(binder.binding(), Some(&binding));
}

#[test]
fn binds_filesystem_without_prior_stdio() {
    let mut fs = MemFs::new();
    fs.mkdir("/dev").unwrap();
    let mut devices = fs.devices();
    let mut binder = binder();
    let binding = bind(&mut binder, &mut fs, &mut devices).expect("binding succeeds");

    let resolved: Vec<DeviceId> = ["/dev/stdin", "/dev/stdout", "/dev/stderr"]
        .iter()
        .map(|path| match fs.stat(path).unwrap() {
            NodeKind::Device(id) => id,
            other => panic!("{path} resolved to {other:?}"),
        })
        .collect();
    assert_eq!(resolved, vec![binding.tty(), binding.tty(), binding.tty_err()]);
    assert_ne!(binding.tty(), binding.tty_err());
    assert_eq!(devices.len(), 2);
    for fd in 0..3 {
        assert!(fs.descriptor(fd).is_some(), "slot {fd} not reopened");
    }
}

#[test]
fn second_bind_is_a_conflict_and_changes_nothing() {
    let mut fs = MemFs::with_standard_streams().unwrap();
    let mut devices = fs.devices();
    let mut binder = binder();
    let first = bind(&mut binder, &mut fs, &mut devices).unwrap();
    let layout = stdio_layout(&fs);
    let registered = devices.len();

    let err = bind(&mut binder, &mut fs, &mut devices).unwrap_err();
    assert!(matches!(err, TtyError::BindingConflict(_)), "got {err}");
    assert_eq!(binder.binding(), Some(&first));
    assert_eq!(stdio_layout(&fs), layout);
    assert_eq!(devices.len(), registered);
    assert_eq!(devices.alloc_major(), first.tty_err().major() + 1);
}

#[test]
fn reset_restores_layout_and_rebinding_gets_fresh_devices() {
    let mut fs = MemFs::with_standard_streams().unwrap();
    let mut devices = fs.devices();
    let pristine = stdio_layout(&fs);
    let mut binder = binder();
    let first = bind(&mut binder, &mut fs, &mut devices).unwrap();

    binder.reset(&mut fs, &mut devices).unwrap();
    assert!(binder.binding().is_none());
    assert_eq!(stdio_layout(&fs), pristine);
    assert!(!devices.is_registered(first.tty()));
    assert!(!devices.is_registered(first.tty_err()));
    assert_eq!(
        fs.lstat("/dev/hosttty").unwrap_err(),
        FsError::NotFound("/dev/hosttty".into())
    );

    let second = bind(&mut binder, &mut fs, &mut devices).unwrap();
    assert!(second.tty().major() > first.tty_err().major());
    assert!(second.tty_err().major() > second.tty().major());

    binder.reset(&mut fs, &mut devices).unwrap();
    binder.reset(&mut fs, &mut devices).unwrap();
}

#[test]
fn failed_reset_keeps_binding_and_can_be_retried() {
    let mut fs = FaultyFs::new(
        MemFs::with_standard_streams().unwrap(),
        Fault::Unlink("/dev/hosttty"),
    );
    let mut devices = fs.inner.devices();
    let pristine = stdio_layout(&fs);
    let registered = devices.len();
    let mut binder = binder();
    let first = bind(&mut binder, &mut fs, &mut devices).unwrap();
    assert!(fs.armed());

    match binder.reset(&mut fs, &mut devices).unwrap_err() {
        TtyError::PathOperation { step, path, .. } => {
            assert_eq!(step, BindStep::Restore);
            assert_eq!(path, "/dev/hosttty");
        }
        other => panic!("unexpected error: {other}"),
    }
    assert_eq!(binder.binding(), Some(&first));
    assert!(matches!(
        bind(&mut binder, &mut fs, &mut devices).unwrap_err(),
        TtyError::BindingConflict(_)
    ));

    binder.reset(&mut fs, &mut devices).unwrap();
    assert!(binder.binding().is_none());
    assert_eq!(stdio_layout(&fs), pristine);
    assert_eq!(devices.len(), registered);
    assert!(matches!(fs.lstat("/dev/hosttty"), Err(FsError::NotFound(_))));

    bind(&mut binder, &mut fs, &mut devices).expect("rebinding after a retried reset");
}

fn assert_rolled_back(fault: Fault, step: BindStep, path: &str) {
    let mut fs = FaultyFs::new(MemFs::with_standard_streams().unwrap(), fault);
    let mut devices = fs.inner.devices();
    let before = stdio_layout(&fs);
    let registered = devices.len();
    let mut binder = binder();

    match bind(&mut binder, &mut fs, &mut devices).unwrap_err() {
        TtyError::PathOperation {
            step: failed,
            path: failed_path,
            ..
        } => {
            assert_eq!(failed, step);
            assert_eq!(failed_path, path);
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(!fs.armed());
    assert!(binder.binding().is_none());
    assert_eq!(stdio_layout(&fs), before);
    assert_eq!(devices.len(), registered);
    for node in ["/dev/hosttty", "/dev/hostttyerr"] {
        assert!(matches!(fs.lstat(node), Err(FsError::NotFound(_))), "{node} left behind");
    }

    bind(&mut binder, &mut fs, &mut devices).expect("binding succeeds once the fault is gone");
}

#[test]
fn failed_device_node_rolls_back() {
    assert_rolled_back(Fault::Mkdev("/dev/hostttyerr"), BindStep::MakeNode, "/dev/hostttyerr");
}

#[test]
fn failed_unlink_rolls_back() {
    assert_rolled_back(Fault::Unlink("/dev/stderr"), BindStep::Unlink, "/dev/stderr");
}

#[test]
fn failed_symlink_rolls_back() {
    assert_rolled_back(Fault::Symlink("/dev/stderr"), BindStep::Symlink, "/dev/stderr");
}

#[test]
fn failed_close_rolls_back() {
    assert_rolled_back(Fault::Close(1), BindStep::Close, "fd 1");
}

#[test]
fn failed_reopen_rolls_back() {
    assert_rolled_back(Fault::Open("/dev/stdout"), BindStep::Reopen, "/dev/stdout");
}

#[test]
fn regular_file_at_stdio_path_aborts() {
    let mut fs = MemFs::new();
    fs.mkdir("/dev").unwrap();
    fs.write_file("/dev/stdout", b"").unwrap();
    let mut devices = fs.devices();
    let before = stdio_layout(&fs);
    let mut binder = binder();

    let err = bind(&mut binder, &mut fs, &mut devices).unwrap_err();
    assert!(matches!(
        err,
        TtyError::PathOperation {
            step: BindStep::Unlink,
            source: FsError::Exists(_),
            ..
        }
    ));
    assert_eq!(stdio_layout(&fs), before);
    assert!(devices.is_empty());
}

#[test]
fn taken_device_identifier_is_a_conflict() {
    let mut fs = MemFs::with_standard_streams().unwrap();
    let mut devices = fs.devices();
    devices
        .register(DeviceId::new(FIRST_DYNAMIC_MAJOR, 0), Box::new(NullOps))
        .unwrap();
    let before = stdio_layout(&fs);
    let registered = devices.len();
    let mut binder = binder();

    let err = bind(&mut binder, &mut fs, &mut devices).unwrap_err();
    assert!(matches!(err, TtyError::BindingConflict(_)), "got {err}");
    assert!(binder.binding().is_none());
    assert_eq!(stdio_layout(&fs), before);
    assert_eq!(devices.len(), registered);
}

#[test]
fn incomplete_rollback_names_both_failures() {
    let mut fs = FaultyFs::persistent(
        MemFs::with_standard_streams().unwrap(),
        Fault::Symlink("/dev/stdout"),
    );
    let mut devices = fs.inner.devices();
    let mut binder = binder();

    match bind(&mut binder, &mut fs, &mut devices).unwrap_err() {
        TtyError::RollbackIncomplete { failure, path, .. } => {
            assert_eq!(path, "/dev/stdout");
            assert!(matches!(
                *failure,
                TtyError::PathOperation {
                    step: BindStep::Symlink,
                    ..
                }
            ));
        }
        other => panic!("unexpected error: {other}"),
    }
    assert!(binder.binding().is_none());
    assert_eq!(fs.lstat("/dev/stdin").unwrap(), NodeKind::Symlink("/dev/tty".into()));
    assert_eq!(fs.lstat("/dev/stderr").unwrap(), NodeKind::Symlink("/dev/tty1".into()));
}
