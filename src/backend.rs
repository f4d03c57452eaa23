//! The operation-set contract a backend must satisfy.
//!
//! The original core represents this as a struct of function pointers, two
//! variants of each op selected by a `CONTEXT_PTR` flag, with optional
//! directory and select sub-records represented by null sub-struct pointers.
//! Here it becomes a `Backend` trait whose methods default to
//! [`VfsError::NotImplemented`] (the direct analogue of a null function-pointer
//! slot — see `fuser::Filesystem` for the pattern this is lifted from), and
//! two further traits, `DirBackend` and `SelectBackend`, that a `Backend`
//! opts into by overriding `as_dir_backend`/`as_select_backend`.

#[cfg(any(feature = "dir", feature = "select"))]
use std::any::Any;
#[cfg(feature = "select")]
use std::time::Duration;

use log::warn;

use crate::error::{VfsError, VfsResult};
#[cfg(feature = "select")]
use crate::fd_set::FdSet;
use crate::open_flags::OpenFlags;
#[cfg(feature = "select")]
use crate::select::SelectSem;

/// A backend's opaque per-handle state for an open directory stream.
///
/// The core only ever moves this around and tags it with the owning mount's
/// index (see [`crate::mount::DirHandle`]); it never inspects the contents.
/// A backend downcasts it back to its own concrete type inside its
/// `DirBackend` methods.
#[cfg(feature = "dir")]
pub type DirHandleState = Box<dyn Any + Send>;

/// A backend's opaque per-call armed-select state, produced by
/// `start_select` and consumed by the matching `end_select`.
#[cfg(feature = "select")]
pub type DriverArgs = Box<dyn Any + Send>;

/// Minimal POSIX-shaped metadata, as returned by `stat`/`fstat`.
#[derive(Copy, Clone, Debug, Default, Eq, PartialEq)]
pub struct Stat {
    pub st_mode: u32,
    pub st_size: i64,
    pub st_mtime: i64,
    pub st_atime: i64,
    pub st_ctime: i64,
}

/// One entry produced by `readdir`.
#[cfg(feature = "dir")]
#[derive(Clone, Debug, Eq, PartialEq)]
pub struct DirEntry {
    pub name: String,
    pub is_dir: bool,
}

/// An opaque `ioctl` argument bundle: a command id plus an untyped payload
/// pointer, exactly as DESIGN NOTES prescribes ("do not attempt to type
/// it"). The core never dereferences this; it is forwarded verbatim.
pub struct IoctlArg {
    pub cmd: u32,
    pub arg: *mut std::ffi::c_void,
}

/// The required, always-present operation set: plain file I/O.
///
/// Every method defaults to logging a warning and returning
/// [`VfsError::NotImplemented`], mirroring a null slot in the original
/// function-pointer table.
pub trait Backend: Send + Sync {
    fn open(&self, path: &str, flags: OpenFlags, mode: u32) -> VfsResult<i32> {
        let _ = (path, flags, mode);
        warn!("backend does not implement open");
        Err(VfsError::NotImplemented)
    }

    fn close(&self, local_fd: i32) -> VfsResult<()> {
        let _ = local_fd;
        warn!("backend does not implement close");
        Err(VfsError::NotImplemented)
    }

    fn read(&self, local_fd: i32, buf: &mut [u8]) -> VfsResult<usize> {
        let _ = (local_fd, buf);
        warn!("backend does not implement read");
        Err(VfsError::NotImplemented)
    }

    fn write(&self, local_fd: i32, buf: &[u8]) -> VfsResult<usize> {
        let _ = (local_fd, buf);
        warn!("backend does not implement write");
        Err(VfsError::NotImplemented)
    }

    fn pread(&self, local_fd: i32, buf: &mut [u8], offset: i64) -> VfsResult<usize> {
        let _ = (local_fd, buf, offset);
        warn!("backend does not implement pread");
        Err(VfsError::NotImplemented)
    }

    fn pwrite(&self, local_fd: i32, buf: &[u8], offset: i64) -> VfsResult<usize> {
        let _ = (local_fd, buf, offset);
        warn!("backend does not implement pwrite");
        Err(VfsError::NotImplemented)
    }

    fn lseek(&self, local_fd: i32, offset: i64, whence: i32) -> VfsResult<i64> {
        let _ = (local_fd, offset, whence);
        warn!("backend does not implement lseek");
        Err(VfsError::NotImplemented)
    }

    fn fstat(&self, local_fd: i32) -> VfsResult<Stat> {
        let _ = local_fd;
        warn!("backend does not implement fstat");
        Err(VfsError::NotImplemented)
    }

    fn fcntl(&self, local_fd: i32, cmd: i32, arg: i32) -> VfsResult<i32> {
        let _ = (local_fd, cmd, arg);
        warn!("backend does not implement fcntl");
        Err(VfsError::NotImplemented)
    }

    fn ioctl(&self, local_fd: i32, arg: IoctlArg) -> VfsResult<i32> {
        let _ = (local_fd, arg);
        warn!("backend does not implement ioctl");
        Err(VfsError::NotImplemented)
    }

    fn fsync(&self, local_fd: i32) -> VfsResult<()> {
        let _ = local_fd;
        warn!("backend does not implement fsync");
        Err(VfsError::NotImplemented)
    }

    /// Opt in to the directory operation sub-record. Defaults to absent,
    /// the analogue of a null `dir` sub-struct pointer.
    #[cfg(feature = "dir")]
    fn as_dir_backend(&self) -> Option<&dyn DirBackend> {
        None
    }

    /// Opt in to the select operation sub-record. Defaults to absent, the
    /// analogue of a null `select` sub-struct pointer.
    #[cfg(feature = "select")]
    fn as_select_backend(&self) -> Option<&dyn SelectBackend> {
        None
    }
}

/// The optional directory-operation sub-record.
#[cfg(feature = "dir")]
pub trait DirBackend: Send + Sync {
    fn stat(&self, path: &str) -> VfsResult<Stat> {
        let _ = path;
        Err(VfsError::NotImplemented)
    }

    fn link(&self, existing: &str, new: &str) -> VfsResult<()> {
        let _ = (existing, new);
        Err(VfsError::NotImplemented)
    }

    fn unlink(&self, path: &str) -> VfsResult<()> {
        let _ = path;
        Err(VfsError::NotImplemented)
    }

    fn rename(&self, from: &str, to: &str) -> VfsResult<()> {
        let _ = (from, to);
        Err(VfsError::NotImplemented)
    }

    fn opendir(&self, path: &str) -> VfsResult<DirHandleState> {
        let _ = path;
        Err(VfsError::NotImplemented)
    }

    fn readdir(&self, handle: &mut DirHandleState) -> VfsResult<Option<DirEntry>> {
        let _ = handle;
        Err(VfsError::NotImplemented)
    }

    fn readdir_r(&self, handle: &mut DirHandleState) -> VfsResult<Option<DirEntry>> {
        self.readdir(handle)
    }

    fn telldir(&self, handle: &DirHandleState) -> VfsResult<i64> {
        let _ = handle;
        Err(VfsError::NotImplemented)
    }

    fn seekdir(&self, handle: &mut DirHandleState, loc: i64) -> VfsResult<()> {
        let _ = (handle, loc);
        Err(VfsError::NotImplemented)
    }

    /// `rewinddir` is defined in terms of this: `seekdir(handle, 0)`.
    fn rewinddir(&self, handle: &mut DirHandleState) -> VfsResult<()> {
        self.seekdir(handle, 0)
    }

    fn closedir(&self, handle: DirHandleState) -> VfsResult<()> {
        let _ = handle;
        Err(VfsError::NotImplemented)
    }

    fn mkdir(&self, path: &str, mode: u32) -> VfsResult<()> {
        let _ = (path, mode);
        Err(VfsError::NotImplemented)
    }

    fn rmdir(&self, path: &str) -> VfsResult<()> {
        let _ = path;
        Err(VfsError::NotImplemented)
    }

    fn access(&self, path: &str, mode: i32) -> VfsResult<()> {
        let _ = (path, mode);
        Err(VfsError::NotImplemented)
    }

    fn truncate(&self, path: &str, len: i64) -> VfsResult<()> {
        let _ = (path, len);
        Err(VfsError::NotImplemented)
    }

    fn ftruncate(&self, local_fd: i32, len: i64) -> VfsResult<()> {
        let _ = (local_fd, len);
        Err(VfsError::NotImplemented)
    }

    fn utime(&self, path: &str, actime: i64, modtime: i64) -> VfsResult<()> {
        let _ = (path, actime, modtime);
        Err(VfsError::NotImplemented)
    }
}

/// A fd-set a select backend can read the requested fds from and correct
/// in place as it learns which ones are actually ready.
///
/// The original core hands `start_select` raw `xf_fd_set *` pointers into
/// the calling thread's stack frame, which a driver ISR mutates directly
/// while the call is blocked on the select semaphore — safe there only
/// because the frame outlives the wait. `Arc<Mutex<FdSet>>` is the safe
/// Rust equivalent: a backend clones it into whatever state it stashes in
/// `DriverArgs` (or hands to a background thread/ISR handler) and clears
/// the bits of fds it determines are not ready before signalling.
#[cfg(feature = "select")]
pub type SharedFdSet = std::sync::Arc<parking_lot::Mutex<FdSet>>;

/// The optional select-operation sub-record.
///
/// `start_select` defaulting to [`VfsError::NotSupported`] (rather than
/// `NotImplemented`) is deliberate: a backend that has nothing to arm this
/// round is expected behaviour (§4.6 step 4), not a missing feature.
#[cfg(feature = "select")]
pub trait SelectBackend: Send + Sync {
    /// Arms asynchronous notification for the fds requested in
    /// `readfds`/`writefds`/`errorfds` (already filtered to this backend's
    /// own local fds). A backend that determines readiness is expected to
    /// clear the bits of whichever fds are *not* ready from these sets
    /// before (or at any point up to) signalling `sem` — the core folds
    /// back whatever is left set once the wait completes (§4.6 step 7).
    fn start_select(
        &self,
        nfds: usize,
        readfds: SharedFdSet,
        writefds: SharedFdSet,
        errorfds: SharedFdSet,
        sem: SelectSem,
    ) -> VfsResult<DriverArgs> {
        let _ = (nfds, readfds, writefds, errorfds, sem);
        Err(VfsError::NotSupported)
    }

    fn end_select(&self, driver_args: DriverArgs) -> VfsResult<()> {
        let _ = driver_args;
        Ok(())
    }

    fn socket_select(
        &self,
        nfds: usize,
        readfds: &mut FdSet,
        writefds: &mut FdSet,
        errorfds: &mut FdSet,
        timeout: Option<Duration>,
    ) -> VfsResult<usize> {
        let _ = (nfds, readfds, writefds, errorfds, timeout);
        Err(VfsError::NotImplemented)
    }

    fn stop_socket_select(&self, sem: SelectSem) -> VfsResult<()> {
        let _ = sem;
        Err(VfsError::NotImplemented)
    }

    /// Interrupt-context variant. `woken` must always be written, even on
    /// the error path — the original core's historical bug of dropping this
    /// output on one branch is exactly what must not be reproduced here.
    fn stop_socket_select_isr(&self, sem: SelectSem, woken: &mut bool) -> VfsResult<()> {
        *woken = false;
        let _ = sem;
        Err(VfsError::NotImplemented)
    }

    fn get_socket_select_semaphore(&self) -> Option<SelectSem> {
        None
    }

    /// Drains one permit from a semaphore this backend handed out via
    /// `get_socket_select_semaphore`, called once per `select` round after
    /// folding results back (§4.6 step 8) so a permit left over from
    /// `select_triggered` doesn't wake the next `socket_select` spuriously.
    /// The default is a no-op: a backend that never supplies an external
    /// semaphore has nothing to drain.
    fn drain_socket_select_semaphore(&self, sem: SelectSem) -> VfsResult<()> {
        let _ = sem;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct Bare;
    impl Backend for Bare {}

    #[test]
    fn default_methods_report_not_implemented() {
        let b = Bare;
        assert_eq!(
            b.open("/x", OpenFlags(libc::O_RDONLY), 0).unwrap_err(),
            VfsError::NotImplemented
        );
        assert!(b.as_dir_backend().is_none());
        assert!(b.as_select_backend().is_none());
    }
}
