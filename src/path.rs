//! Path prefix validation and the longest-prefix-match resolver.

use crate::config::PREFIX_LEN_IGNORED;
use crate::error::{VfsError, VfsResult};
use crate::mount::MountEntry;

/// Validates a path prefix per the exact rules: empty is the fallback
/// mount (accepted), length 1 is rejected outright, anything over
/// `path_max` is rejected, and anything else must start with `/` and not
/// end with `/`.
pub fn validate_prefix(prefix: &str, path_max: usize) -> VfsResult<()> {
    let n = prefix.len();
    if n == 0 {
        return Ok(());
    }
    if n == 1 {
        return Err(VfsError::InvalidArgument);
    }
    if n > path_max {
        return Err(VfsError::InvalidArgument);
    }
    if !prefix.starts_with('/') || prefix.ends_with('/') {
        return Err(VfsError::InvalidArgument);
    }
    Ok(())
}

/// Whether `path` is routed by a mount registered under `prefix`.
///
/// `prefix_len == 0` is the fallback mount and matches everything; a
/// non-empty prefix matches when `path` starts with it and either
/// consumes the whole prefix or is immediately followed by `/` (so `/data`
/// does not match `/data1/foo`).
fn prefix_matches(prefix: &str, path: &str) -> bool {
    let prefix_len = prefix.len();
    if path.len() < prefix_len || &path[..prefix_len] != prefix {
        return false;
    }
    if prefix_len == 0 {
        return true;
    }
    path.len() == prefix_len || path.as_bytes()[prefix_len] == b'/'
}

/// Finds the best-matching mount for `path` among `mounts[0..vfs_count]`,
/// by index order. Entries with `IGNORED` prefix length never participate.
/// Among matches, the longest non-fallback prefix wins; ties (and the
/// fallback) go to the later-scanned entry.
pub fn resolve<'a>(path: &str, mounts: &'a [Option<MountEntry>]) -> Option<(usize, &'a MountEntry)> {
    let mut best: Option<(usize, &MountEntry)> = None;
    for (index, slot) in mounts.iter().enumerate() {
        let Some(entry) = slot else { continue };
        if entry.prefix_len() == PREFIX_LEN_IGNORED {
            continue;
        }
        if !prefix_matches(&entry.prefix, path) {
            continue;
        }
        let is_fallback = entry.prefix.is_empty();
        match best {
            None => best = Some((index, entry)),
            Some((_, current)) => {
                let current_is_fallback = current.prefix.is_empty();
                if current_is_fallback && !is_fallback {
                    best = Some((index, entry));
                } else if current_is_fallback == is_fallback && entry.prefix.len() >= current.prefix.len() {
                    best = Some((index, entry));
                }
            }
        }
    }
    best
}

/// Produces the backend-relative path for a matched mount: `"/"` if `path`
/// is exactly the prefix, otherwise the suffix starting at the prefix
/// boundary (which, by the matching rule, always begins with `/`, or is
/// empty for the fallback mount).
pub fn translate_path<'a>(prefix: &str, path: &'a str) -> &'a str {
    if path.len() == prefix.len() {
        "/"
    } else {
        &path[prefix.len()..]
    }
}
