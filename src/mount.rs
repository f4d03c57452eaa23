//! The mount table: registration, unregistration, and the fixed-capacity
//! backing store path resolution reads from.

use std::sync::Arc;
use std::sync::atomic::{AtomicUsize, Ordering};

use log::debug;
use parking_lot::RwLock;

use crate::backend::Backend;
use crate::config::PREFIX_LEN_IGNORED;
use crate::dispatch::Vfs;
use crate::error::{VfsError, VfsResult};
use crate::flags::MountFlags;
use crate::path;

/// One registered backend.
pub struct MountEntry {
    pub prefix: String,
    ignored: bool,
    pub flags: MountFlags,
    pub backend: Arc<dyn Backend>,
}

impl MountEntry {
    pub fn new(prefix: String, backend: Arc<dyn Backend>, flags: MountFlags) -> Self {
        MountEntry { prefix, ignored: false, flags, backend }
    }

    pub fn new_ignored(backend: Arc<dyn Backend>, flags: MountFlags) -> Self {
        MountEntry { prefix: String::new(), ignored: true, flags, backend }
    }

    /// `IGNORED` for range/id-registered entries, else the prefix length.
    pub fn prefix_len(&self) -> usize {
        if self.ignored { PREFIX_LEN_IGNORED } else { self.prefix.len() }
    }

    pub fn is_readonly(&self) -> bool {
        self.flags.contains(MountFlags::READONLY_FS)
    }
}

/// Fixed-capacity array of `Option<MountEntry>`, plus the high-water-mark
/// `s_count` that lets scans (path resolution, select) stop early without
/// touching slots that have never been used.
pub struct MountTable {
    slots: RwLock<Vec<Option<MountEntry>>>,
    count: AtomicUsize,
    capacity: usize,
}

impl MountTable {
    pub fn new(capacity: usize) -> Self {
        let mut slots = Vec::with_capacity(capacity);
        slots.resize_with(capacity, || None);
        MountTable {
            slots: RwLock::new(slots),
            count: AtomicUsize::new(0),
            capacity,
        }
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }

    /// `s_count`: read without taking the slot lock, matching the
    /// single-snapshot discipline `select` depends on (§4.6, §5).
    pub fn snapshot_count(&self) -> usize {
        self.count.load(Ordering::Acquire)
    }

    pub fn backend_at(&self, index: usize) -> Option<Arc<dyn Backend>> {
        self.slots.read().get(index).and_then(|s| s.as_ref()).map(|e| e.backend.clone())
    }

    pub fn all_backends(&self) -> Vec<Arc<dyn Backend>> {
        self.slots.read().iter().filter_map(|s| s.as_ref()).map(|e| e.backend.clone()).collect()
    }

    fn insert(&self, entry: MountEntry) -> VfsResult<usize> {
        let mut slots = self.slots.write();
        let index = slots.iter().position(|s| s.is_none()).ok_or(VfsError::NoMemory)?;
        slots[index] = Some(entry);
        let new_count = index + 1;
        if new_count > self.count.load(Ordering::Acquire) {
            self.count.store(new_count, Ordering::Release);
        }
        Ok(index)
    }

    fn remove_by<F>(&self, matcher: F) -> VfsResult<usize>
    where
        F: Fn(&MountEntry) -> bool,
    {
        let mut slots = self.slots.write();
        let index = slots
            .iter()
            .position(|s| s.as_ref().is_some_and(&matcher))
            .ok_or(VfsError::InvalidState)?;
        slots[index] = None;
        Ok(index)
    }

    fn with_entry_mut<F, T>(&self, index: usize, f: F) -> VfsResult<T>
    where
        F: FnOnce(&mut MountEntry) -> T,
    {
        let mut slots = self.slots.write();
        match slots.get_mut(index).and_then(|s| s.as_mut()) {
            Some(entry) => Ok(f(entry)),
            None => Err(VfsError::InvalidState),
        }
    }

    /// A read-locked snapshot suitable for path resolution; cloned into a
    /// plain `Vec` so [`path::resolve`] can work over an ordinary slice
    /// without holding the lock across the whole dispatch call.
    pub fn resolve_path<'a>(&self, path: &str) -> Option<(usize, String, Arc<dyn Backend>, MountFlags)> {
        let slots = self.slots.read();
        let count = self.snapshot_count().min(slots.len());
        path::resolve(path, &slots[..count]).map(|(index, entry)| {
            (index, entry.prefix.clone(), entry.backend.clone(), entry.flags)
        })
    }
}

impl Vfs {
    /// Registers a backend under `prefix`. Validates the prefix, allocates
    /// the lowest free slot, and returns its stable index.
    pub fn register(&self, prefix: &str, backend: Arc<dyn Backend>, flags: MountFlags) -> VfsResult<usize> {
        path::validate_prefix(prefix, self.config.path_max)?;
        let entry = MountEntry::new(prefix.to_string(), backend, flags);
        let index = self.mounts.insert(entry)?;
        debug!("registered mount {index} at prefix {prefix:?}");
        Ok(index)
    }

    /// Registers a backend with no path prefix, pre-claiming the
    /// half-open descriptor range `[min_fd, max_fd)` as permanent rows. If
    /// any row in the range is already occupied the whole call is rolled
    /// back.
    pub fn register_fd_range(
        &self,
        backend: Arc<dyn Backend>,
        flags: MountFlags,
        min_fd: usize,
        max_fd: usize,
    ) -> VfsResult<usize> {
        if min_fd > max_fd || max_fd > self.fds.capacity() {
            return Err(VfsError::InvalidArgument);
        }
        let entry = MountEntry::new_ignored(backend, flags);
        let index = self.mounts.insert(entry)?;
        for fd in min_fd..max_fd {
            if !self.fds.claim_permanent(fd, index, fd as u16) {
                // Roll back: release whatever this mount claimed so far
                // and drop the mount entry itself.
                self.fds.release_all_for_backend(index);
                let _ = self.unregister_with_id(index);
                return Err(VfsError::InvalidArgument);
            }
        }
        debug!("registered fd-range mount {index} over [{min_fd}, {max_fd})");
        Ok(index)
    }

    /// Registers a backend with no path prefix and no pre-claimed fds;
    /// descriptor rows are claimed lazily via `register_fd`.
    pub fn register_with_id(&self, backend: Arc<dyn Backend>, flags: MountFlags) -> VfsResult<usize> {
        let entry = MountEntry::new_ignored(backend, flags);
        let index = self.mounts.insert(entry)?;
        debug!("registered id-only mount {index}");
        Ok(index)
    }

    /// Claims a descriptor row for a mount registered via
    /// [`Vfs::register_with_id`]. `local_fd = None` means "use the global
    /// fd itself as the local fd", the `-1` convention in the original.
    pub fn register_fd_with_local_fd(
        &self,
        index: usize,
        local_fd: Option<u16>,
        permanent: bool,
    ) -> VfsResult<usize> {
        if self.mounts.backend_at(index).is_none() {
            return Err(VfsError::InvalidState);
        }
        let fd = if permanent {
            self.fds.allocate_permanent(index, 0)
        } else {
            self.fds.allocate_transient(index, 0)
        }
        .ok_or(VfsError::NoMemory)?;
        if let Some(resolved_local) = local_fd {
            self.fds.set_local_fd(fd, resolved_local);
        } else {
            self.fds.set_local_fd(fd, fd as u16);
        }
        Ok(fd)
    }

    pub fn register_fd(&self, index: usize, permanent: bool) -> VfsResult<usize> {
        self.register_fd_with_local_fd(index, None, permanent)
    }

    /// Unregisters the mount at `prefix`, exact match. Sweeps the
    /// descriptor table so every row it owned becomes unused.
    pub fn unregister(&self, prefix: &str) -> VfsResult<()> {
        let index = self.mounts.remove_by(|e| e.is_path_mount() && e.prefix == prefix)?;
        self.fds.release_all_for_backend(index);
        debug!("unregistered mount {index} at prefix {prefix:?}");
        Ok(())
    }

    /// Unregisters by mount index, as used for range/id-registered mounts
    /// and as the general-purpose form.
    pub fn unregister_with_id(&self, index: usize) -> VfsResult<()> {
        let mut slots = self.mounts.slots.write();
        if slots.get(index).and_then(|s| s.as_ref()).is_none() {
            return Err(VfsError::InvalidState);
        }
        slots[index] = None;
        drop(slots);
        self.fds.release_all_for_backend(index);
        debug!("unregistered mount {index}");
        Ok(())
    }

    pub fn set_readonly_flag(&self, prefix: &str) -> VfsResult<()> {
        let index = self
            .mounts
            .slots
            .read()
            .iter()
            .position(|s| s.as_ref().is_some_and(|e| e.is_path_mount() && e.prefix == prefix))
            .ok_or(VfsError::InvalidState)?;
        self.mounts.with_entry_mut(index, |entry| entry.flags |= MountFlags::READONLY_FS)
    }
}

impl MountEntry {
    fn is_path_mount(&self) -> bool {
        !self.ignored
    }
}
