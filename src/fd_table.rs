//! The descriptor table: global fd (row index) → (backend index, local fd).
//!
//! `backend_index` and `local_fd` are read without the fd-table lock on the
//! hot dispatch path (§4.3, §5 "Lock-free reads"); registration and
//! unregistration, which is what can change them, always go through the
//! lock first and then publish with `Release` ordering, so a lock-free
//! `Acquire` read either sees the old, fully consistent row or the new one.
//!
//! The lock-free-reads allowance covers reads only. Every transition that
//! checks a row's state and then changes it — allocate, claim, release,
//! sweep — is a compound operation and races if left to bare atomics (two
//! `open`s can both observe the same row `is_unused()` before either
//! claims it, and both return the same fd). `FdTable::lock` serialises all
//! of those; only single-field atomic reads bypass it.

use std::sync::atomic::{AtomicBool, AtomicI32, AtomicU16, Ordering};

use parking_lot::Mutex;

/// One descriptor-table row. The global fd is this row's index in the
/// table, never stored explicitly.
pub struct FdRow {
    /// `-1` when unused.
    backend_index: AtomicI32,
    local_fd: AtomicU16,
    permanent: AtomicBool,
    has_pending_close: AtomicBool,
    has_pending_select: AtomicBool,
}

const UNUSED: i32 = -1;

impl FdRow {
    fn unused() -> Self {
        FdRow {
            backend_index: AtomicI32::new(UNUSED),
            local_fd: AtomicU16::new(0),
            permanent: AtomicBool::new(false),
            has_pending_close: AtomicBool::new(false),
            has_pending_select: AtomicBool::new(false),
        }
    }

    /// Lock-free read: `(backend_index, local_fd)`, or `None` if unused.
    pub fn read(&self) -> Option<(usize, u16)> {
        let backend_index = self.backend_index.load(Ordering::Acquire);
        if backend_index < 0 {
            return None;
        }
        Some((backend_index as usize, self.local_fd.load(Ordering::Acquire)))
    }

    pub fn is_unused(&self) -> bool {
        self.backend_index.load(Ordering::Acquire) < 0
    }

    pub fn is_permanent(&self) -> bool {
        self.permanent.load(Ordering::Acquire)
    }

    pub fn has_pending_select(&self) -> bool {
        self.has_pending_select.load(Ordering::Acquire)
    }

    pub fn set_pending_select(&self, value: bool) {
        self.has_pending_select.store(value, Ordering::Release);
    }

    pub fn has_pending_close(&self) -> bool {
        self.has_pending_close.load(Ordering::Acquire)
    }

    fn claim(&self, backend_index: usize, local_fd: u16, permanent: bool) {
        self.local_fd.store(local_fd, Ordering::Release);
        self.permanent.store(permanent, Ordering::Release);
        self.has_pending_close.store(false, Ordering::Release);
        self.has_pending_select.store(false, Ordering::Release);
        // Publish last: a non-negative read of backend_index now implies a
        // fully initialised row.
        self.backend_index.store(backend_index as i32, Ordering::Release);
    }

    fn release(&self) {
        self.backend_index.store(UNUSED, Ordering::Release);
        self.permanent.store(false, Ordering::Release);
        self.has_pending_close.store(false, Ordering::Release);
        self.has_pending_select.store(false, Ordering::Release);
    }
}

/// Fixed-capacity descriptor table guarded by a single lock for every
/// mutating (multi-field) transition. `fds_max` is the table's capacity;
/// rows are allocated by lowest-index-first scanning, as in the original.
pub struct FdTable {
    rows: Vec<FdRow>,
    /// Serialises allocate/claim/release/sweep. Reads of a row's
    /// `backend_index`/`local_fd` never take this (§5 "Lock-free reads").
    lock: Mutex<()>,
}

impl FdTable {
    pub fn new(fds_max: usize) -> Self {
        let mut rows = Vec::with_capacity(fds_max);
        rows.resize_with(fds_max, FdRow::unused);
        FdTable { rows, lock: Mutex::new(()) }
    }

    pub fn capacity(&self) -> usize {
        self.rows.len()
    }

    pub fn row(&self, fd: usize) -> Option<&FdRow> {
        self.rows.get(fd)
    }

    /// Overwrites the local fd of an already-claimed row, for
    /// `register_fd_with_local_fd` callers that want a local fd other
    /// than the one auto-assigned at claim time.
    pub fn set_local_fd(&self, fd: usize, local_fd: u16) {
        let _guard = self.lock.lock();
        if let Some(row) = self.rows.get(fd) {
            row.local_fd.store(local_fd, Ordering::Release);
        }
    }

    /// Allocates the lowest unused row for `backend_index`/`local_fd`,
    /// marking it transient (`permanent = false`). Used by `open`. The
    /// scan-then-claim happens under the lock so two concurrent callers
    /// can never claim the same row.
    pub fn allocate_transient(&self, backend_index: usize, local_fd: u16) -> Option<usize> {
        let _guard = self.lock.lock();
        for (fd, row) in self.rows.iter().enumerate() {
            if row.is_unused() {
                row.claim(backend_index, local_fd, false);
                return Some(fd);
            }
        }
        None
    }

    /// Claims an explicit row for a permanent fd (`register_fd*`). Fails if
    /// already occupied or out of range.
    pub fn claim_permanent(&self, fd: usize, backend_index: usize, local_fd: u16) -> bool {
        let _guard = self.lock.lock();
        match self.rows.get(fd) {
            Some(row) if row.is_unused() => {
                row.claim(backend_index, local_fd, true);
                true
            }
            _ => false,
        }
    }

    /// Scans for the lowest unused row and claims it as permanent, used by
    /// `register_fd` when no explicit fd is requested.
    pub fn allocate_permanent(&self, backend_index: usize, local_fd: u16) -> Option<usize> {
        let _guard = self.lock.lock();
        for (fd, row) in self.rows.iter().enumerate() {
            if row.is_unused() {
                row.claim(backend_index, local_fd, true);
                return Some(fd);
            }
        }
        None
    }

    /// `close` transition: if not permanent, frees the row unless a select
    /// is pending, in which case it is marked pending-close instead.
    pub fn release_on_close(&self, fd: usize) {
        let _guard = self.lock.lock();
        if let Some(row) = self.rows.get(fd) {
            if row.is_permanent() {
                return;
            }
            if row.has_pending_select() {
                row.has_pending_close.store(true, Ordering::Release);
            } else {
                row.release();
            }
        }
    }

    /// Unregister sweep: resets every row owned by `backend_index`,
    /// unconditionally, regardless of pending select/close state.
    pub fn release_all_for_backend(&self, backend_index: usize) {
        let _guard = self.lock.lock();
        for row in &self.rows {
            if row.backend_index.load(Ordering::Acquire) == backend_index as i32 {
                row.release();
            }
        }
    }

    /// Post-select sweep (§4.6 step 9): frees rows whose close was
    /// deferred, and always clears the pending-select flag, for fds in
    /// `[0, nfds)`.
    pub fn sweep_after_select(&self, nfds: usize) {
        let _guard = self.lock.lock();
        for row in self.rows.iter().take(nfds) {
            if row.has_pending_close() {
                row.release();
            } else {
                row.set_pending_select(false);
            }
        }
    }

    /// §4.6 step 3: under the same lock as `release_on_close`, marks
    /// `has_pending_select` (if `mark_error`) and reads `(backend_index,
    /// local_fd)`. Locking the mark-then-read pair closes the race where
    /// `close` could free a row between `select` observing it and `select`
    /// flagging it pending.
    pub fn snapshot_for_select(&self, fd: usize, mark_error: bool) -> Option<(usize, u16)> {
        let _guard = self.lock.lock();
        let row = self.rows.get(fd)?;
        if mark_error {
            row.has_pending_select.store(true, Ordering::Release);
        }
        row.read()
    }
}
