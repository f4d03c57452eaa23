/// Table capacities and other compile-time-in-spirit knobs.
///
/// The original C core hardcodes these as build-time `#define`s
/// (`xf_vfs_config_internal.h`); this crate keeps the same defaults but
/// makes them a runtime value so tests can exercise small tables without
/// recompiling.
#[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
pub struct VfsConfig {
    /// Maximum number of simultaneously registered mounts.
    pub max_count: usize,
    /// Maximum number of simultaneously open descriptors.
    pub fds_max: usize,
    /// Maximum path prefix length, excluding the terminator.
    pub path_max: usize,
    /// Maximum directory entry name length, for backends that care.
    pub dirent_name_size: usize,
}

impl Default for VfsConfig {
    fn default() -> Self {
        VfsConfig {
            max_count: 8,
            fds_max: 64,
            path_max: 15,
            dirent_name_size: 256,
        }
    }
}

/// Sentinel prefix length marking a mount entry created through the
/// range/id registration APIs: it has no path prefix and is excluded from
/// path resolution entirely.
pub const PREFIX_LEN_IGNORED: usize = usize::MAX;
