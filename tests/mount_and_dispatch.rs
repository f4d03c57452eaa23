//! Boundary-behaviour tests from spec.md §8, driven through the public
//! `Vfs` API against the in-memory `RamFs` test double.

mod support;

use std::sync::Arc;

use support::{rdonly, write_create, RamFs};
use vfscore::{MountFlags, Vfs, VfsError};

fn vfs() -> Vfs {
    Vfs::default()
}

#[test]
fn open_reaches_matching_prefix_and_translates_path() {
    let _ = env_logger::try_init();
    let v = vfs();
    let ram = Arc::new(RamFs::new());
    ram.seed("/file", b"hello");
    v.register("/foo", ram, MountFlags::DEFAULT).unwrap();

    let fd = v.open("/foo/file", rdonly(), 0).unwrap();
    let mut buf = [0u8; 5];
    assert_eq!(v.read(fd, &mut buf).unwrap(), 5);
    assert_eq!(&buf, b"hello");
    v.close(fd).unwrap();
}

#[test]
fn sibling_prefix_does_not_match() {
    let v = vfs();
    v.register("/foo", Arc::new(RamFs::new()), MountFlags::DEFAULT).unwrap();
    assert_eq!(v.open("/foo1/file", rdonly(), 0).unwrap_err(), VfsError::NoEntry);
}

#[test]
fn longest_prefix_wins_regardless_of_registration_order() {
    // /foo/bar registered before /foo: the longer one must still win.
    let v = vfs();
    let inner = Arc::new(RamFs::new());
    inner.seed("/file", b"inner");
    let outer = Arc::new(RamFs::new());
    outer.seed("/bar/file", b"outer");
    v.register("/foo/bar", inner, MountFlags::DEFAULT).unwrap();
    v.register("/foo", outer, MountFlags::DEFAULT).unwrap();

    let fd = v.open("/foo/bar/file", rdonly(), 0).unwrap();
    let mut buf = [0u8; 5];
    v.read(fd, &mut buf).unwrap();
    assert_eq!(&buf, b"inner");
}

#[test]
fn unregister_of_shorter_prefix_leaves_longer_one_reachable() {
    let v = vfs();
    let inner = Arc::new(RamFs::new());
    inner.seed("/file", b"inner");
    v.register("/foo/bar", inner, MountFlags::DEFAULT).unwrap();
    v.register("/foo", Arc::new(RamFs::new()), MountFlags::DEFAULT).unwrap();

    v.unregister("/foo").unwrap();

    let fd = v.open("/foo/bar/file", rdonly(), 0).unwrap();
    let mut buf = [0u8; 5];
    v.read(fd, &mut buf).unwrap();
    assert_eq!(&buf, b"inner");
}

#[test]
fn unregister_unknown_prefix_is_invalid_state() {
    let v = vfs();
    v.register("/foo", Arc::new(RamFs::new()), MountFlags::DEFAULT).unwrap();
    v.register("/foo/bar", Arc::new(RamFs::new()), MountFlags::DEFAULT).unwrap();
    assert_eq!(v.unregister("/foo/b").unwrap_err(), VfsError::InvalidState);
}

#[test]
fn fallback_mount_receives_unmatched_paths() {
    let v = vfs();
    let fallback = Arc::new(RamFs::new());
    fallback.seed("/tmp/foo", b"fb");
    fallback.seed("foo", b"relative");
    v.register("", fallback, MountFlags::DEFAULT).unwrap();

    let fd = v.open("/tmp/foo", rdonly(), 0).unwrap();
    let mut buf = [0u8; 2];
    v.read(fd, &mut buf).unwrap();
    assert_eq!(&buf, b"fb");

    let fd2 = v.open("foo", rdonly(), 0).unwrap();
    let mut buf2 = [0u8; 8];
    let n = v.read(fd2, &mut buf2).unwrap();
    assert_eq!(&buf2[..n], b"relative");
}

#[test]
fn opendir_matches_both_with_and_without_trailing_slash() {
    let v = vfs();
    let ram = Arc::new(RamFs::new());
    ram.seed("/a", b"");
    v.register("/foo", ram, MountFlags::DEFAULT).unwrap();

    let h1 = v.opendir("/foo").unwrap();
    v.closedir(h1).unwrap();
    let h2 = v.opendir("/foo/").unwrap();
    v.closedir(h2).unwrap();
}

#[test]
fn readonly_mount_rejects_mutating_open_and_mkdir() {
    let v = vfs();
    let ram = Arc::new(RamFs::new());
    ram.seed("/file", b"x");
    v.register("/ro", ram, MountFlags::READONLY_FS).unwrap();

    assert_eq!(v.open("/ro/file", write_create(), 0).unwrap_err(), VfsError::ReadOnly);
    assert_eq!(v.mkdir("/ro/sub", 0o755).unwrap_err(), VfsError::ReadOnly);
    // Reads still work.
    let fd = v.open("/ro/file", rdonly(), 0).unwrap();
    let mut buf = [0u8; 1];
    assert_eq!(v.read(fd, &mut buf).unwrap(), 1);
}

#[test]
fn set_readonly_flag_applies_after_registration() {
    let v = vfs();
    let ram = Arc::new(RamFs::new());
    v.register("/rw", ram, MountFlags::DEFAULT).unwrap();
    assert!(v.open("/rw/new", write_create(), 0).is_ok());

    v.set_readonly_flag("/rw").unwrap();
    assert_eq!(v.open("/rw/other", write_create(), 0).unwrap_err(), VfsError::ReadOnly);
}

#[test]
fn rename_across_different_mounts_is_cross_device() {
    let v = vfs();
    v.register("/a", Arc::new(RamFs::new()), MountFlags::DEFAULT).unwrap();
    v.register("/b", Arc::new(RamFs::new()), MountFlags::DEFAULT).unwrap();
    assert_eq!(v.rename("/a/x", "/b/y").unwrap_err(), VfsError::CrossDevice);
}

#[test]
fn rename_within_same_mount_succeeds() {
    let v = vfs();
    let ram = Arc::new(RamFs::new());
    ram.seed("/x", b"data");
    v.register("/a", ram, MountFlags::DEFAULT).unwrap();
    v.rename("/a/x", "/a/y").unwrap();
    let fd = v.open("/a/y", rdonly(), 0).unwrap();
    let mut buf = [0u8; 4];
    v.read(fd, &mut buf).unwrap();
    assert_eq!(&buf, b"data");
}

#[test]
fn readdir_lists_seeded_files_in_sorted_order() {
    let v = vfs();
    let ram = Arc::new(RamFs::new());
    ram.seed("/b", b"");
    ram.seed("/a", b"");
    v.register("/dir", ram, MountFlags::DEFAULT).unwrap();

    let mut handle = v.opendir("/dir").unwrap();
    let mut names = Vec::new();
    while let Some(entry) = v.readdir(&mut handle).unwrap() {
        names.push(entry.name);
    }
    assert_eq!(names, vec!["a".to_string(), "b".to_string()]);
    v.closedir(handle).unwrap();
}

#[test]
fn open_missing_mount_is_no_entry() {
    let v = vfs();
    assert_eq!(v.open("/nowhere", rdonly(), 0).unwrap_err(), VfsError::NoEntry);
}

#[test]
fn descriptor_table_exhaustion_on_open_frees_backend_fd_and_reports_no_memory() {
    let v = Vfs::with_config(vfscore::VfsConfig { fds_max: 1, ..Default::default() });
    let ram = Arc::new(RamFs::new());
    ram.seed("/a", b"");
    ram.seed("/b", b"");
    v.register("/r", ram, MountFlags::DEFAULT).unwrap();

    let first = v.open("/r/a", rdonly(), 0).unwrap();
    assert_eq!(v.open("/r/b", rdonly(), 0).unwrap_err(), VfsError::NoMemory);
    v.close(first).unwrap();
    assert!(v.open("/r/b", rdonly(), 0).is_ok());
}
