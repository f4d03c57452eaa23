//! The process-scoped service value (`Vfs`) and the two op dispatchers
//! (file-op, directory-op) that resolve a path or fd and call the matching
//! backend op.
//!
//! `mount.rs` and `select.rs` both add `impl Vfs` blocks of their own; this
//! module owns the struct definition plus §4.4/§4.5.

use std::sync::Arc;

#[cfg(feature = "dir")]
use log::trace;

#[cfg(feature = "dir")]
use crate::backend::{DirEntry, DirHandleState};
use crate::backend::{Backend, IoctlArg, Stat};
use crate::config::VfsConfig;
use crate::error::{VfsError, VfsResult};
use crate::fd_table::FdTable;
use crate::flags::MountFlags;
use crate::mount::MountTable;
use crate::open_flags::OpenFlags;
use crate::path;

/// The process-scoped VFS dispatcher: one mount table, one descriptor
/// table, shared by every public operation.
///
/// This is the encapsulation DESIGN NOTES §9 calls for in place of the
/// original's three free-standing module-scope tables and lock; a thin
/// `Default`/`with_config` pair of constructors stands in for the lazy
/// first-registration initialisation the C core performs.
pub struct Vfs {
    pub(crate) mounts: MountTable,
    pub(crate) fds: FdTable,
    pub(crate) config: VfsConfig,
}

impl Default for Vfs {
    fn default() -> Self {
        Vfs::with_config(VfsConfig::default())
    }
}

impl Vfs {
    pub fn with_config(config: VfsConfig) -> Self {
        Vfs {
            mounts: MountTable::new(config.max_count),
            fds: FdTable::new(config.fds_max),
            config,
        }
    }

    pub fn config(&self) -> &VfsConfig {
        &self.config
    }

    /// Resolves a global fd to its owning backend and local fd. `BadFd`
    /// covers both "out of range" and "row unused" per spec.md §4.7.
    fn resolve_fd(&self, fd: i32) -> VfsResult<(Arc<dyn Backend>, i32)> {
        if fd < 0 {
            return Err(VfsError::BadFd);
        }
        let row = self.fds.row(fd as usize).ok_or(VfsError::BadFd)?;
        let (backend_index, local_fd) = row.read().ok_or(VfsError::BadFd)?;
        let backend = self.mounts.backend_at(backend_index).ok_or(VfsError::BadFd)?;
        Ok((backend, local_fd as i32))
    }

    /// Resolves `path` to a backend plus the backend-relative path, failing
    /// with `NoEntry` if no mount matches.
    fn resolve_path(&self, path: &str) -> VfsResult<(usize, String, Arc<dyn Backend>, MountFlags)> {
        self.mounts.resolve_path(path).ok_or(VfsError::NoEntry)
    }

    // ---- §4.4 File-op dispatcher -----------------------------------------

    /// Opens `path`, returning the global fd. `READONLY_FS` mounts reject
    /// any access mode other than `O_RDONLY` before the backend is ever
    /// called.
    pub fn open(&self, path: &str, flags: OpenFlags, mode: u32) -> VfsResult<i32> {
        let (index, _prefix, backend, mount_flags) = self.resolve_path(path)?;
        if flags.acc_mode().is_mutating() && mount_flags.contains(MountFlags::READONLY_FS) {
            return Err(VfsError::ReadOnly);
        }
        let relative = self.translate(path)?;
        let backend_fd = backend.open(&relative, flags, mode)?;
        match self.fds.allocate_transient(index, backend_fd as u16) {
            Some(fd) => Ok(fd as i32),
            None => {
                let _ = backend.close(backend_fd);
                Err(VfsError::NoMemory)
            }
        }
    }

    fn translate(&self, path: &str) -> VfsResult<String> {
        let (_, prefix, _, _) = self.resolve_path(path)?;
        Ok(path::translate_path(&prefix, path).to_string())
    }

    /// Closes `fd`. Non-permanent rows with no pending select are freed
    /// immediately; one with a pending select is marked pending-close
    /// instead (spec.md §4.3/§4.4).
    pub fn close(&self, fd: i32) -> VfsResult<()> {
        let (backend, local_fd) = self.resolve_fd(fd)?;
        let result = backend.close(local_fd);
        self.fds.release_on_close(fd as usize);
        result
    }

    pub fn read(&self, fd: i32, buf: &mut [u8]) -> VfsResult<usize> {
        let (backend, local_fd) = self.resolve_fd(fd)?;
        backend.read(local_fd, buf)
    }

    pub fn write(&self, fd: i32, buf: &[u8]) -> VfsResult<usize> {
        let (backend, local_fd) = self.resolve_fd(fd)?;
        backend.write(local_fd, buf)
    }

    pub fn pread(&self, fd: i32, buf: &mut [u8], offset: i64) -> VfsResult<usize> {
        let (backend, local_fd) = self.resolve_fd(fd)?;
        backend.pread(local_fd, buf, offset)
    }

    pub fn pwrite(&self, fd: i32, buf: &[u8], offset: i64) -> VfsResult<usize> {
        let (backend, local_fd) = self.resolve_fd(fd)?;
        backend.pwrite(local_fd, buf, offset)
    }

    pub fn lseek(&self, fd: i32, offset: i64, whence: i32) -> VfsResult<i64> {
        let (backend, local_fd) = self.resolve_fd(fd)?;
        backend.lseek(local_fd, offset, whence)
    }

    pub fn fstat(&self, fd: i32) -> VfsResult<Stat> {
        let (backend, local_fd) = self.resolve_fd(fd)?;
        backend.fstat(local_fd)
    }

    pub fn fcntl(&self, fd: i32, cmd: i32, arg: i32) -> VfsResult<i32> {
        let (backend, local_fd) = self.resolve_fd(fd)?;
        backend.fcntl(local_fd, cmd, arg)
    }

    /// Forwards `arg` verbatim; the core never interprets an `ioctl`
    /// command (DESIGN NOTES §9 "Variadic ioctl").
    pub fn ioctl(&self, fd: i32, arg: IoctlArg) -> VfsResult<i32> {
        let (backend, local_fd) = self.resolve_fd(fd)?;
        backend.ioctl(local_fd, arg)
    }

    pub fn fsync(&self, fd: i32) -> VfsResult<()> {
        let (backend, local_fd) = self.resolve_fd(fd)?;
        backend.fsync(local_fd)
    }

    // ---- §4.5 Directory-op dispatcher ------------------------------------
    #[cfg(feature = "dir")]
    fn dir_backend_for_path(&self, path: &str) -> VfsResult<(usize, String, Arc<dyn Backend>, MountFlags)> {
        self.resolve_path(path)
    }

    #[cfg(feature = "dir")]
    pub fn stat(&self, path: &str) -> VfsResult<Stat> {
        let (_, _, backend, _) = self.dir_backend_for_path(path)?;
        let relative = self.translate(path)?;
        let dir = backend.as_dir_backend().ok_or(VfsError::NotImplemented)?;
        dir.stat(&relative)
    }

    #[cfg(feature = "dir")]
    pub fn unlink(&self, path: &str) -> VfsResult<()> {
        let (_, _, backend, flags) = self.dir_backend_for_path(path)?;
        if flags.contains(MountFlags::READONLY_FS) {
            return Err(VfsError::ReadOnly);
        }
        let relative = self.translate(path)?;
        let dir = backend.as_dir_backend().ok_or(VfsError::NotImplemented)?;
        dir.unlink(&relative)
    }

    #[cfg(feature = "dir")]
    pub fn mkdir(&self, path: &str, mode: u32) -> VfsResult<()> {
        let (_, _, backend, flags) = self.dir_backend_for_path(path)?;
        if flags.contains(MountFlags::READONLY_FS) {
            return Err(VfsError::ReadOnly);
        }
        let relative = self.translate(path)?;
        let dir = backend.as_dir_backend().ok_or(VfsError::NotImplemented)?;
        dir.mkdir(&relative, mode)
    }

    #[cfg(feature = "dir")]
    pub fn rmdir(&self, path: &str) -> VfsResult<()> {
        let (_, _, backend, flags) = self.dir_backend_for_path(path)?;
        if flags.contains(MountFlags::READONLY_FS) {
            return Err(VfsError::ReadOnly);
        }
        let relative = self.translate(path)?;
        let dir = backend.as_dir_backend().ok_or(VfsError::NotImplemented)?;
        dir.rmdir(&relative)
    }

    #[cfg(feature = "dir")]
    pub fn access(&self, path: &str, mode: i32) -> VfsResult<()> {
        let (_, _, backend, _) = self.dir_backend_for_path(path)?;
        let relative = self.translate(path)?;
        let dir = backend.as_dir_backend().ok_or(VfsError::NotImplemented)?;
        dir.access(&relative, mode)
    }

    #[cfg(feature = "dir")]
    pub fn truncate(&self, path: &str, len: i64) -> VfsResult<()> {
        let (_, _, backend, flags) = self.dir_backend_for_path(path)?;
        if flags.contains(MountFlags::READONLY_FS) {
            return Err(VfsError::ReadOnly);
        }
        let relative = self.translate(path)?;
        let dir = backend.as_dir_backend().ok_or(VfsError::NotImplemented)?;
        dir.truncate(&relative, len)
    }

    #[cfg(feature = "dir")]
    pub fn ftruncate(&self, fd: i32, len: i64) -> VfsResult<()> {
        let (backend, local_fd) = self.resolve_fd(fd)?;
        let dir = backend.as_dir_backend().ok_or(VfsError::NotImplemented)?;
        dir.ftruncate(local_fd, len)
    }

    #[cfg(feature = "dir")]
    pub fn utime(&self, path: &str, actime: i64, modtime: i64) -> VfsResult<()> {
        let (_, _, backend, _) = self.dir_backend_for_path(path)?;
        let relative = self.translate(path)?;
        let dir = backend.as_dir_backend().ok_or(VfsError::NotImplemented)?;
        dir.utime(&relative, actime, modtime)
    }

    /// `link`/`rename` require both paths to resolve to the same mount;
    /// otherwise `CrossDevice` (spec.md §4.5).
    #[cfg(feature = "dir")]
    pub fn link(&self, existing: &str, new: &str) -> VfsResult<()> {
        let (existing_idx, _, backend, flags) = self.dir_backend_for_path(existing)?;
        let (new_idx, _, _, _) = self.dir_backend_for_path(new)?;
        if existing_idx != new_idx {
            return Err(VfsError::CrossDevice);
        }
        if flags.contains(MountFlags::READONLY_FS) {
            return Err(VfsError::ReadOnly);
        }
        let existing_rel = self.translate(existing)?;
        let new_rel = self.translate(new)?;
        let dir = backend.as_dir_backend().ok_or(VfsError::NotImplemented)?;
        dir.link(&existing_rel, &new_rel)
    }

    #[cfg(feature = "dir")]
    pub fn rename(&self, from: &str, to: &str) -> VfsResult<()> {
        let (from_idx, _, backend, flags) = self.dir_backend_for_path(from)?;
        let (to_idx, _, _, _) = self.dir_backend_for_path(to)?;
        if from_idx != to_idx {
            return Err(VfsError::CrossDevice);
        }
        if flags.contains(MountFlags::READONLY_FS) {
            return Err(VfsError::ReadOnly);
        }
        let from_rel = self.translate(from)?;
        let to_rel = self.translate(to)?;
        let dir = backend.as_dir_backend().ok_or(VfsError::NotImplemented)?;
        dir.rename(&from_rel, &to_rel)
    }

    /// Opens a directory stream, tagging the returned handle with the
    /// owning mount's index (`dd_vfs_idx`) so later `readdir`/`seekdir`/
    /// `closedir` calls can find the mount without re-resolving a path.
    #[cfg(feature = "dir")]
    pub fn opendir(&self, path: &str) -> VfsResult<DirHandle> {
        let (index, _, backend, _) = self.dir_backend_for_path(path)?;
        let relative = self.translate(path)?;
        let dir = backend.as_dir_backend().ok_or(VfsError::NotImplemented)?;
        let state = dir.opendir(&relative)?;
        trace!("opendir({path:?}) -> mount {index}");
        Ok(DirHandle { dd_vfs_idx: index as u16, state })
    }

    #[cfg(feature = "dir")]
    fn dir_backend_for_handle(&self, handle: &DirHandle) -> VfsResult<Arc<dyn Backend>> {
        self.mounts.backend_at(handle.dd_vfs_idx as usize).ok_or(VfsError::BadFd)
    }

    #[cfg(feature = "dir")]
    pub fn readdir(&self, handle: &mut DirHandle) -> VfsResult<Option<DirEntry>> {
        let backend = self.dir_backend_for_handle(handle)?;
        let dir = backend.as_dir_backend().ok_or(VfsError::NotImplemented)?;
        dir.readdir(&mut handle.state)
    }

    #[cfg(feature = "dir")]
    pub fn readdir_r(&self, handle: &mut DirHandle) -> VfsResult<Option<DirEntry>> {
        let backend = self.dir_backend_for_handle(handle)?;
        let dir = backend.as_dir_backend().ok_or(VfsError::NotImplemented)?;
        dir.readdir_r(&mut handle.state)
    }

    #[cfg(feature = "dir")]
    pub fn telldir(&self, handle: &DirHandle) -> VfsResult<i64> {
        let backend = self.dir_backend_for_handle(handle)?;
        let dir = backend.as_dir_backend().ok_or(VfsError::NotImplemented)?;
        dir.telldir(&handle.state)
    }

    #[cfg(feature = "dir")]
    pub fn seekdir(&self, handle: &mut DirHandle, loc: i64) -> VfsResult<()> {
        let backend = self.dir_backend_for_handle(handle)?;
        let dir = backend.as_dir_backend().ok_or(VfsError::NotImplemented)?;
        dir.seekdir(&mut handle.state, loc)
    }

    /// `rewinddir` is `seekdir(dir, 0)` (spec.md §4.5).
    #[cfg(feature = "dir")]
    pub fn rewinddir(&self, handle: &mut DirHandle) -> VfsResult<()> {
        self.seekdir(handle, 0)
    }

    #[cfg(feature = "dir")]
    pub fn closedir(&self, handle: DirHandle) -> VfsResult<()> {
        let backend = self.dir_backend_for_handle(&handle)?;
        let dir = backend.as_dir_backend().ok_or(VfsError::NotImplemented)?;
        dir.closedir(handle.state)
    }
}

/// The opaque directory handle returned by [`Vfs::opendir`]. The leading
/// `dd_vfs_idx` field is reserved for the core; backends only ever see the
/// `state` they produced themselves, never this wrapper.
#[cfg(feature = "dir")]
pub struct DirHandle {
    pub dd_vfs_idx: u16,
    state: DirHandleState,
}
