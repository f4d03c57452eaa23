use std::fmt;

/// Error kinds surfaced by the core dispatcher.
///
/// These mirror the POSIX errno a backend would have set; [`VfsError::as_errno`]
/// gives the numeric code for callers that need to hand it back through a
/// POSIX-shaped API.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
#[non_exhaustive]
pub enum VfsError {
    /// Malformed prefix; out-of-range fd in a registration call; null required argument.
    InvalidArgument,
    /// Mount or descriptor table full; allocation failure for deep-copy or per-call buffers.
    NoMemory,
    /// Unregister of an unknown prefix/index.
    InvalidState,
    /// Backend op slot is absent.
    NotImplemented,
    /// fd out of range, row unused, or owning mount gone.
    BadFd,
    /// No mount resolves the given path.
    NoEntry,
    /// Two-path op whose endpoints resolve to different mounts.
    CrossDevice,
    /// Mutating op on a `READONLY_FS` mount.
    ReadOnly,
    /// Select aborted because some backend's `start_select` failed.
    Interrupted,
    /// Internal-only: a backend opted out of this round of select. Never
    /// escapes the select multiplexer to a caller.
    NotSupported,
}

impl VfsError {
    /// The POSIX errno code a backend implementing this operation directly
    /// would have set. Used by callers that bridge this crate back onto a
    /// POSIX-shaped surface (the demo backends, integration tests).
    pub fn as_errno(&self) -> i32 {
        match self {
            VfsError::InvalidArgument => libc::EINVAL,
            VfsError::NoMemory => libc::ENOMEM,
            VfsError::InvalidState => libc::EINVAL,
            VfsError::NotImplemented => libc::ENOSYS,
            VfsError::BadFd => libc::EBADF,
            VfsError::NoEntry => libc::ENOENT,
            VfsError::CrossDevice => libc::EXDEV,
            VfsError::ReadOnly => libc::EROFS,
            VfsError::Interrupted => libc::EINTR,
            VfsError::NotSupported => libc::ENOTSUP,
        }
    }
}

impl fmt::Display for VfsError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let msg = match self {
            VfsError::InvalidArgument => "invalid argument",
            VfsError::NoMemory => "no memory",
            VfsError::InvalidState => "invalid state",
            VfsError::NotImplemented => "not implemented",
            VfsError::BadFd => "bad file descriptor",
            VfsError::NoEntry => "no such entry",
            VfsError::CrossDevice => "cross-device link",
            VfsError::ReadOnly => "read-only filesystem",
            VfsError::Interrupted => "interrupted",
            VfsError::NotSupported => "not supported",
        };
        f.write_str(msg)
    }
}

impl std::error::Error for VfsError {}

pub type VfsResult<T> = Result<T, VfsError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn errno_mapping_matches_posix() {
        assert_eq!(VfsError::BadFd.as_errno(), libc::EBADF);
        assert_eq!(VfsError::NoEntry.as_errno(), libc::ENOENT);
        assert_eq!(VfsError::ReadOnly.as_errno(), libc::EROFS);
        assert_eq!(VfsError::CrossDevice.as_errno(), libc::EXDEV);
    }

    #[test]
    fn display_is_human_readable() {
        assert_eq!(VfsError::NotImplemented.to_string(), "not implemented");
    }
}
