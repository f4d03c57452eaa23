//! Shared test doubles: a small in-memory RAM filesystem backend and a
//! socket-like permanent-fd backend, used across the integration tests in
//! lieu of a real mounted kernel filesystem (`fuser`'s integration tests
//! mount against one; this crate has no kernel driver to mount against).

use std::collections::HashMap;
use std::sync::atomic::{AtomicI32, Ordering};
use std::sync::Mutex;

use vfscore::{Backend, DirBackend, DirEntry, DirHandleState, OpenFlags, Stat, VfsError, VfsResult};

struct RamFile {
    data: Vec<u8>,
}

struct RamOpenFile {
    path: String,
    cursor: usize,
}

struct RamDirHandle {
    names: Vec<String>,
    pos: usize,
}

/// A trivial in-memory filesystem: files are named by their full
/// backend-relative path (no real directory nesting), opened fds are a
/// small side table keyed by a locally-issued integer.
pub struct RamFs {
    files: Mutex<HashMap<String, RamFile>>,
    open: Mutex<HashMap<i32, RamOpenFile>>,
    next_local_fd: AtomicI32,
}

impl RamFs {
    pub fn new() -> Self {
        RamFs {
            files: Mutex::new(HashMap::new()),
            open: Mutex::new(HashMap::new()),
            next_local_fd: AtomicI32::new(1),
        }
    }

    pub fn seed(&self, path: &str, contents: &[u8]) {
        self.files.lock().unwrap().insert(path.to_string(), RamFile { data: contents.to_vec() });
    }
}

impl Backend for RamFs {
    fn open(&self, path: &str, flags: OpenFlags, _mode: u32) -> VfsResult<i32> {
        let mut files = self.files.lock().unwrap();
        if !files.contains_key(path) {
            if flags.creates() {
                files.insert(path.to_string(), RamFile { data: Vec::new() });
            } else {
                return Err(VfsError::NoEntry);
            }
        }
        drop(files);
        let local_fd = self.next_local_fd.fetch_add(1, Ordering::SeqCst);
        self.open.lock().unwrap().insert(local_fd, RamOpenFile { path: path.to_string(), cursor: 0 });
        Ok(local_fd)
    }

    fn close(&self, local_fd: i32) -> VfsResult<()> {
        self.open.lock().unwrap().remove(&local_fd).ok_or(VfsError::BadFd)?;
        Ok(())
    }

    fn read(&self, local_fd: i32, buf: &mut [u8]) -> VfsResult<usize> {
        let mut open = self.open.lock().unwrap();
        let entry = open.get_mut(&local_fd).ok_or(VfsError::BadFd)?;
        let files = self.files.lock().unwrap();
        let file = files.get(&entry.path).ok_or(VfsError::NoEntry)?;
        let remaining = &file.data[entry.cursor.min(file.data.len())..];
        let n = remaining.len().min(buf.len());
        buf[..n].copy_from_slice(&remaining[..n]);
        entry.cursor += n;
        Ok(n)
    }

    fn write(&self, local_fd: i32, buf: &[u8]) -> VfsResult<usize> {
        let mut open = self.open.lock().unwrap();
        let entry = open.get_mut(&local_fd).ok_or(VfsError::BadFd)?;
        let mut files = self.files.lock().unwrap();
        let file = files.get_mut(&entry.path).ok_or(VfsError::NoEntry)?;
        if entry.cursor + buf.len() > file.data.len() {
            file.data.resize(entry.cursor + buf.len(), 0);
        }
        file.data[entry.cursor..entry.cursor + buf.len()].copy_from_slice(buf);
        entry.cursor += buf.len();
        Ok(buf.len())
    }

    fn lseek(&self, local_fd: i32, offset: i64, whence: i32) -> VfsResult<i64> {
        let mut open = self.open.lock().unwrap();
        let entry = open.get_mut(&local_fd).ok_or(VfsError::BadFd)?;
        let files = self.files.lock().unwrap();
        let len = files.get(&entry.path).map(|f| f.data.len()).unwrap_or(0) as i64;
        let base = match whence {
            libc::SEEK_SET => 0,
            libc::SEEK_CUR => entry.cursor as i64,
            libc::SEEK_END => len,
            _ => return Err(VfsError::InvalidArgument),
        };
        let new_pos = base + offset;
        if new_pos < 0 {
            return Err(VfsError::InvalidArgument);
        }
        entry.cursor = new_pos as usize;
        Ok(new_pos)
    }

    fn fstat(&self, local_fd: i32) -> VfsResult<Stat> {
        let open = self.open.lock().unwrap();
        let entry = open.get(&local_fd).ok_or(VfsError::BadFd)?;
        let files = self.files.lock().unwrap();
        let file = files.get(&entry.path).ok_or(VfsError::NoEntry)?;
        Ok(Stat { st_size: file.data.len() as i64, ..Default::default() })
    }

    fn as_dir_backend(&self) -> Option<&dyn DirBackend> {
        Some(self)
    }
}

impl DirBackend for RamFs {
    fn stat(&self, path: &str) -> VfsResult<Stat> {
        let files = self.files.lock().unwrap();
        let file = files.get(path).ok_or(VfsError::NoEntry)?;
        Ok(Stat { st_size: file.data.len() as i64, ..Default::default() })
    }

    fn unlink(&self, path: &str) -> VfsResult<()> {
        self.files.lock().unwrap().remove(path).map(|_| ()).ok_or(VfsError::NoEntry)
    }

    fn rename(&self, from: &str, to: &str) -> VfsResult<()> {
        let mut files = self.files.lock().unwrap();
        let file = files.remove(from).ok_or(VfsError::NoEntry)?;
        files.insert(to.to_string(), file);
        Ok(())
    }

    fn mkdir(&self, _path: &str, _mode: u32) -> VfsResult<()> {
        Ok(())
    }

    fn opendir(&self, path: &str) -> VfsResult<DirHandleState> {
        let prefix = if path == "/" { String::new() } else { format!("{path}/") };
        let mut names: Vec<String> = self
            .files
            .lock()
            .unwrap()
            .keys()
            .filter_map(|k| k.strip_prefix(prefix.as_str()).map(|s| s.to_string()))
            .filter(|s| !s.is_empty())
            .collect();
        names.sort();
        Ok(Box::new(RamDirHandle { names, pos: 0 }))
    }

    fn readdir(&self, handle: &mut DirHandleState) -> VfsResult<Option<DirEntry>> {
        let h = handle.downcast_mut::<RamDirHandle>().ok_or(VfsError::BadFd)?;
        if h.pos >= h.names.len() {
            return Ok(None);
        }
        let name = h.names[h.pos].clone();
        h.pos += 1;
        Ok(Some(DirEntry { name, is_dir: false }))
    }

    fn telldir(&self, handle: &DirHandleState) -> VfsResult<i64> {
        Ok(handle.downcast_ref::<RamDirHandle>().ok_or(VfsError::BadFd)?.pos as i64)
    }

    fn seekdir(&self, handle: &mut DirHandleState, loc: i64) -> VfsResult<()> {
        handle.downcast_mut::<RamDirHandle>().ok_or(VfsError::BadFd)?.pos = loc as usize;
        Ok(())
    }

    fn closedir(&self, _handle: DirHandleState) -> VfsResult<()> {
        Ok(())
    }
}

/// Convenience: `O_RDONLY`/`O_WRONLY`/`O_CREAT` as [`OpenFlags`].
pub fn rdonly() -> OpenFlags {
    OpenFlags(libc::O_RDONLY)
}

pub fn write_create() -> OpenFlags {
    OpenFlags(libc::O_WRONLY | libc::O_CREAT)
}
