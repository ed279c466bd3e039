// Copyright 2026 Open Nexus OS Contributors
// SPDX-License-Identifier: Apache-2.0

//! CONTEXT: Byte transfer through bound guest stdio
//! INTENT: Guest reads and writes on slots 0-2 reach the host streams with line buffering
//! DEPS: nexus-tty (StreamBinder), nexus-guestfs (MemFs)
//! TESTS: Line flush, close flush, fsync, chunked stdin, non-sticky EOF, shared tty device

use nexus_guestfs::MemFs;
use nexus_tty::{BindConfig, GuestFs, OpenMode, StreamBinder};
use tty_e2e::{recording_host, RecordingSink};

fn bound_guest<I, C>(input: I) -> (MemFs, RecordingSink, RecordingSink)
where
    I: IntoIterator<Item = C>,
    C: AsRef<[u8]>,
{
    let mut fs = MemFs::with_standard_streams().unwrap();
    let mut devices = fs.devices();
    let (host, stdout, stderr) = recording_host(input);
    let mut binder = StreamBinder::new(BindConfig::default()).unwrap();
    binder.bind(&mut fs, &mut devices, host).unwrap();
    (fs, stdout, stderr)
}

const NO_INPUT: [&[u8]; 0] = [];

#[test]
fn guest_line_reaches_host_in_one_write() {
    let (mut fs, stdout, stderr) = bound_guest(NO_INPUT);

    assert_eq!(fs.write(1, b"ok\n").unwrap(), 3);
    assert_eq!(stdout.calls(), vec![b"ok\n".to_vec()]);
    assert!(stderr.calls().is_empty());
}

#[test]
fn output_is_held_until_newline() {
    let (mut fs, stdout, _) = bound_guest(NO_INPUT);

    fs.write(1, b"o").unwrap();
    fs.write(1, b"k").unwrap();
    assert!(stdout.calls().is_empty());

    fs.write(1, b"\nrest").unwrap();
    assert_eq!(stdout.calls(), vec![b"ok\n".to_vec()]);
}

#[test]
fn stderr_tail_is_flushed_on_close() {
    let (mut fs, stdout, stderr) = bound_guest(NO_INPUT);

    fs.write(2, b"warning").unwrap();
    assert!(stderr.calls().is_empty());

    fs.close(2).unwrap();
    assert_eq!(stderr.calls(), vec![b"warning".to_vec()]);
    assert!(stdout.calls().is_empty());
}

#[test]
fn shared_device_flushes_on_last_close_only() {
    let (mut fs, stdout, _) = bound_guest(NO_INPUT);

    fs.write(1, b"partial").unwrap();
    fs.close(1).unwrap();
    assert!(stdout.calls().is_empty(), "stdin still holds the tty open");

    fs.close(0).unwrap();
    assert_eq!(stdout.bytes(), b"partial");
}

#[test]
fn fsync_pushes_prompt_without_newline() {
    let (mut fs, stdout, _) = bound_guest(NO_INPUT);

    fs.write(1, b"prompt> ").unwrap();
    fs.fsync(1).unwrap();
    fs.fsync(1).unwrap();
    assert_eq!(stdout.calls(), vec![b"prompt> ".to_vec()]);
}

#[test]
fn stdin_reads_host_chunk_then_end_of_file() {
    let (mut fs, _, _) = bound_guest([b"ab"]);
    let mut buf = [0u8; 16];

    assert_eq!(fs.read(0, &mut buf).unwrap(), 2);
    assert_eq!(&buf[..2], b"ab");
    assert_eq!(fs.read(0, &mut buf).unwrap(), 0);
}

#[test]
fn end_of_file_is_not_sticky() {
    let (mut fs, _, _) = bound_guest(vec![b"first\n".to_vec(), Vec::new(), b"second\n".to_vec()]);
    let mut buf = [0u8; 16];

    assert_eq!(fs.read(0, &mut buf).unwrap(), 6);
    assert_eq!(&buf[..6], b"first\n");
    assert_eq!(fs.read(0, &mut buf).unwrap(), 0);
    assert_eq!(fs.read(0, &mut buf).unwrap(), 7);
    assert_eq!(&buf[..7], b"second\n");
}

#[test]
fn stdin_and_stdout_share_one_device() {
    let (fs, _, _) = bound_guest(NO_INPUT);

    assert_eq!(fs.stat("/dev/stdin").unwrap(), fs.stat("/dev/stdout").unwrap());
    assert_ne!(fs.stat("/dev/stdout").unwrap(), fs.stat("/dev/stderr").unwrap());
}

#[test]
fn new_descriptor_on_stdout_path_reaches_host() {
    let (mut fs, stdout, _) = bound_guest(NO_INPUT);

    let fd = fs.open("/dev/stdout", OpenMode::WriteOnly).unwrap();
    assert!(fd > 2);
    fs.write(fd, b"x\n").unwrap();
    assert_eq!(stdout.calls(), vec![b"x\n".to_vec()]);
}
