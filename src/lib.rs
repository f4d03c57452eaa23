//! `vfscore`: an embeddable dispatcher that multiplexes POSIX-style file
//! I/O (`open`/`read`/`write`/`close`/`lseek`, directory operations, and
//! `select`) across pluggable backends selected by path prefix.
//!
//! A single [`Vfs`] value owns one mount table and one descriptor table.
//! Backends implement [`Backend`] (and optionally [`DirBackend`] /
//! [`SelectBackend`]) and are registered under a path prefix with
//! [`Vfs::register`]; application code then calls [`Vfs::open`] and friends
//! with ordinary paths or the `fd` they got back, exactly as it would call
//! into a single filesystem.
//!
//! This crate does not buffer I/O, cache directory entries, enforce
//! permission bits, interpret file contents, or provide POSIX signal
//! semantics around blocking calls — see the module docs for what each
//! piece *does* own.

mod backend;
mod config;
mod dispatch;
mod error;
#[cfg(feature = "select")]
mod fd_set;
mod fd_table;
mod flags;
mod mount;
mod open_flags;
mod path;
#[cfg(feature = "select")]
mod select;

#[cfg(feature = "dir")]
pub use backend::{DirBackend, DirEntry, DirHandleState};
#[cfg(feature = "select")]
pub use backend::{DriverArgs, SelectBackend, SharedFdSet};
pub use backend::{Backend, IoctlArg, Stat};
pub use config::{PREFIX_LEN_IGNORED, VfsConfig};
#[cfg(feature = "dir")]
pub use dispatch::DirHandle;
pub use dispatch::Vfs;
pub use error::{VfsError, VfsResult};
#[cfg(feature = "select")]
pub use fd_set::FdSet;
pub use flags::MountFlags;
pub use open_flags::{OpenAccMode, OpenFlags};
#[cfg(feature = "select")]
pub use select::SelectSem;
