use std::fmt;

bitflags::bitflags! {
    /// Flags on a mount entry.
    ///
    /// `CONTEXT_PTR` from the original C core (selecting between a bare and a
    /// context-aware calling convention for each backend op) has no
    /// counterpart here: a [`crate::backend::Backend`] trait object always
    /// carries its own state through `&self`, so there is nothing left to
    /// discriminate on.
    #[derive(Copy, Clone, Debug, Eq, PartialEq, Hash)]
    pub struct MountFlags: u32 {
        /// No special behaviour.
        const DEFAULT = 0;
        /// Reject mutating operations with [`crate::error::VfsError::ReadOnly`].
        const READONLY_FS = 1 << 0;
        /// Accepted for API parity with the original core; a no-op here.
        ///
        /// The C flag tells the dispatcher whether it owns a deep copy of the
        /// operation-set memory (and must free it on unregister) or merely
        /// borrows a caller-owned static table. Backends in this crate are
        /// always held as `Arc<dyn Backend>`, so unregistering a mount only
        /// ever drops a reference count; the use-after-free this flag guards
        /// against in C cannot occur in either case.
        const STATIC = 1 << 1;
    }
}

impl Default for MountFlags {
    fn default() -> Self {
        MountFlags::DEFAULT
    }
}

impl fmt::Display for MountFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        fmt::Debug::fmt(self, f)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_is_empty() {
        assert_eq!(MountFlags::default(), MountFlags::DEFAULT);
        assert!(!MountFlags::DEFAULT.contains(MountFlags::READONLY_FS));
    }
}
