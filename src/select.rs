//! The multiplexed `select`: splits a global `fd_set` across backends,
//! drives each one's `start_select`/`end_select`, optionally delegates
//! permanent (socket) fds to a dedicated socket backend, and blocks on a
//! shared semaphore until something signals readiness or the timeout
//! elapses.

use std::sync::{Arc, Condvar, Mutex};
use std::time::{Duration, Instant};

use log::{debug, trace, warn};
use smallvec::SmallVec;

use crate::backend::{DriverArgs, SharedFdSet};
use crate::dispatch::Vfs;
use crate::error::{VfsError, VfsResult};
use crate::fd_set::FdSet;

/// A binary semaphore the core owns outright, used when no registered
/// backend supplies its own (i.e. no permanent/socket fd is in play this
/// round). Mirrors the plain counting semaphore the original allocates
/// per in-flight `select`.
pub struct LocalSemaphore {
    signalled: Mutex<bool>,
    condvar: Condvar,
}

impl LocalSemaphore {
    fn new() -> Arc<Self> {
        Arc::new(LocalSemaphore {
            signalled: Mutex::new(false),
            condvar: Condvar::new(),
        })
    }

    fn signal(&self) {
        let mut guard = self.signalled.lock().unwrap();
        *guard = true;
        self.condvar.notify_all();
    }

    /// Waits until signalled or `timeout` elapses (`None` = wait forever).
    /// Returns whether it was actually signalled (vs. timing out).
    fn wait(&self, timeout: Option<Duration>) -> bool {
        let mut guard = self.signalled.lock().unwrap();
        match timeout {
            None => {
                while !*guard {
                    guard = self.condvar.wait(guard).unwrap();
                }
                true
            }
            Some(timeout) => {
                let deadline = Instant::now() + timeout;
                while !*guard {
                    let now = Instant::now();
                    if now >= deadline {
                        return false;
                    }
                    let (next_guard, result) =
                        self.condvar.wait_timeout(guard, deadline - now).unwrap();
                    guard = next_guard;
                    if result.timed_out() && !*guard {
                        return false;
                    }
                }
                true
            }
        }
    }
}

/// The semaphore a `select` call is waiting on: either a fresh one the core
/// allocated itself, or one handed to us by a backend's
/// `get_socket_select_semaphore`. [`Vfs::select_triggered`] dispatches on
/// this to decide whether to signal directly or to ask a backend to stop
/// its `socket_select`.
#[derive(Clone)]
pub enum SelectSem {
    Local(Arc<LocalSemaphore>),
    External(Arc<dyn std::any::Any + Send + Sync>),
}

struct MountSelectState {
    mount_index: usize,
    read: SharedFdSet,
    write: SharedFdSet,
    error: SharedFdSet,
    isset: bool,
    driver_args: Option<DriverArgs>,
    started: bool,
}

impl Vfs {
    /// Splits `readfds`/`writefds`/`errorfds` across the registered
    /// backends, waits for readiness or `timeout`, and returns the number
    /// of ready fds (as POSIX `select` would), with the three sets
    /// rewritten in place to contain only the fds that are actually ready.
    pub fn select(
        &self,
        nfds: usize,
        readfds: &mut FdSet,
        writefds: &mut FdSet,
        errorfds: &mut FdSet,
        timeout: Option<Duration>,
    ) -> VfsResult<usize> {
        if nfds > self.fds.capacity() {
            return Err(VfsError::InvalidArgument);
        }

        // Step 1: snapshot s_count and allocate per-mount triples. Inline
        // storage covers the common case (mount count ≤ the default
        // `MAX_COUNT` of 8) without a heap allocation per `select` call.
        let vfs_count = self.mounts.snapshot_count();
        let mut per_mount: SmallVec<[MountSelectState; 8]> = (0..vfs_count)
            .map(|index| MountSelectState {
                mount_index: index,
                read: Arc::new(parking_lot::Mutex::new(FdSet::new(self.fds.capacity()))),
                write: Arc::new(parking_lot::Mutex::new(FdSet::new(self.fds.capacity()))),
                error: Arc::new(parking_lot::Mutex::new(FdSet::new(self.fds.capacity()))),
                isset: false,
                driver_args: None,
                started: false,
            })
            .collect();

        let mut socket_backend_index: Option<usize> = None;

        // Step 3: snapshot each fd's (backend_index, local_fd) and bucket it.
        for fd in 0..nfds {
            let in_read = readfds.contains(fd);
            let in_write = writefds.contains(fd);
            let in_error = errorfds.contains(fd);
            if !in_read && !in_write && !in_error {
                continue;
            }
            let Some((backend_index, local_fd)) = self.fds.snapshot_for_select(fd, in_error) else {
                continue;
            };
            let Some(row) = self.fds.row(fd) else { continue };
            if row.is_permanent() {
                // Permanent fds are pre-bound socket-like endpoints; leave
                // them in the global sets for the socket backend and
                // remember which mount that is.
                socket_backend_index.get_or_insert(backend_index);
                continue;
            }
            let Some(state) = per_mount.get_mut(backend_index) else {
                continue;
            };
            if in_read {
                state.read.lock().set(local_fd as usize);
                readfds.clear(fd);
                state.isset = true;
            }
            if in_write {
                state.write.lock().set(local_fd as usize);
                writefds.clear(fd);
                state.isset = true;
            }
            if in_error {
                state.error.lock().set(local_fd as usize);
                errorfds.clear(fd);
                state.isset = true;
            }
        }

        // Step 2: choose a semaphore.
        let socket_backend = socket_backend_index.and_then(|idx| self.mounts.backend_at(idx).map(|b| (idx, b)));
        let sem = match &socket_backend {
            Some((_, backend)) => match backend.as_select_backend().and_then(|s| s.get_socket_select_semaphore()) {
                Some(sem) => sem,
                None => SelectSem::Local(LocalSemaphore::new()),
            },
            None => SelectSem::Local(LocalSemaphore::new()),
        };

        // Step 4: arm each mount with isset.
        for state in per_mount.iter_mut().filter(|s| s.isset) {
            let Some(backend) = self.mounts.backend_at(state.mount_index) else {
                continue;
            };
            let Some(select_backend) = backend.as_select_backend() else {
                continue;
            };
            match select_backend.start_select(nfds, state.read.clone(), state.write.clone(), state.error.clone(), sem.clone()) {
                Ok(args) => {
                    state.driver_args = Some(args);
                    state.started = true;
                }
                Err(VfsError::NotSupported) => {
                    trace!("mount {} opted out of this select round", state.mount_index);
                }
                Err(err) => {
                    warn!("start_select failed on mount {}: {err}", state.mount_index);
                    for prior in per_mount.iter_mut().filter(|s| s.started) {
                        if let Some(backend) = self.mounts.backend_at(prior.mount_index) {
                            if let Some(select_backend) = backend.as_select_backend() {
                                if let Some(args) = prior.driver_args.take() {
                                    let _ = select_backend.end_select(args);
                                }
                            }
                        }
                    }
                    self.fds.sweep_after_select(nfds);
                    return Err(VfsError::Interrupted);
                }
            }
        }

        // Step 5: wait, either via the socket backend or the shared semaphore.
        let mut seed = 0usize;
        if let Some((_, backend)) = &socket_backend {
            if let Some(select_backend) = backend.as_select_backend() {
                match select_backend.socket_select(nfds, readfds, writefds, errorfds, timeout) {
                    Ok(count) => seed = count,
                    Err(err) => warn!("socket_select failed: {err}"),
                }
            }
        } else {
            readfds.clear_all();
            writefds.clear_all();
            errorfds.clear_all();
            if let SelectSem::Local(local) = &sem {
                local.wait(timeout.map(|t| t + Duration::from_millis(1)));
            }
        }

        // Step 6: end_select on every mount that was successfully started.
        for state in per_mount.iter_mut().filter(|s| s.started) {
            if let Some(backend) = self.mounts.backend_at(state.mount_index) {
                if let Some(select_backend) = backend.as_select_backend() {
                    if let Some(args) = state.driver_args.take() {
                        if let Err(err) = select_backend.end_select(args) {
                            warn!("end_select failed on mount {}: {err}", state.mount_index);
                        }
                    }
                }
            }
        }

        // Step 7: fold per-mount results back into the global sets.
        let mut count = seed;
        for fd in 0..nfds {
            let Some(row) = self.fds.row(fd) else { continue };
            let Some((backend_index, local_fd)) = row.read() else {
                continue;
            };
            let Some(state) = per_mount.get(backend_index) else {
                continue;
            };
            let local_fd = local_fd as usize;
            if state.read.lock().contains(local_fd) {
                readfds.set(fd);
                count += 1;
            }
            if state.write.lock().contains(local_fd) {
                writefds.set(fd);
                count += 1;
            }
            if state.error.lock().contains(local_fd) {
                errorfds.set(fd);
                count += 1;
            }
        }

        // Step 8: a `Local` semaphore is dropped with `sem`/`per_mount`; an
        // `External` one is owned by its backend and must have the permit
        // it signalled drained here, or the next `socket_select` wakes
        // spuriously on a stale permit.
        if let SelectSem::External(_) = &sem {
            if let Some((_, backend)) = &socket_backend {
                if let Some(select_backend) = backend.as_select_backend() {
                    if let Err(err) = select_backend.drain_socket_select_semaphore(sem.clone()) {
                        warn!("drain_socket_select_semaphore failed: {err}");
                    }
                }
            }
        }

        // Step 9: sweep pending-close/pending-select state.
        self.fds.sweep_after_select(nfds);

        debug!("select returning {count} ready fds out of {nfds} requested");
        Ok(count)
    }

    /// Signals that a wait condition became true. If `sem` is a local
    /// semaphore this releases it directly; otherwise the call is routed to
    /// whichever mount's `SelectBackend::stop_socket_select` owns it.
    pub fn select_triggered(&self, sem: SelectSem) -> VfsResult<()> {
        match sem {
            SelectSem::Local(local) => {
                local.signal();
                Ok(())
            }
            SelectSem::External(_) => {
                for backend in self.mounts.all_backends() {
                    if let Some(select_backend) = backend.as_select_backend() {
                        if select_backend.get_socket_select_semaphore().is_some() {
                            return select_backend.stop_socket_select(sem);
                        }
                    }
                }
                Err(VfsError::NotImplemented)
            }
        }
    }

    /// Interrupt-context counterpart of [`Vfs::select_triggered`]. `woken`
    /// is always written by the backend call, never silently dropped.
    pub fn select_triggered_isr(&self, sem: SelectSem, woken: &mut bool) -> VfsResult<()> {
        match sem {
            SelectSem::Local(local) => {
                local.signal();
                *woken = true;
                Ok(())
            }
            SelectSem::External(_) => {
                for backend in self.mounts.all_backends() {
                    if let Some(select_backend) = backend.as_select_backend() {
                        if select_backend.get_socket_select_semaphore().is_some() {
                            return select_backend.stop_socket_select_isr(sem, woken);
                        }
                    }
                }
                *woken = false;
                Err(VfsError::NotImplemented)
            }
        }
    }
}
