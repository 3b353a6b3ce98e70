/// Opaque token referencing a cache entry in the [`MeshManager`].
///
/// Handles are allocated monotonically and never reused, even after the
/// entry they referred to has been evicted. The zero value is reserved as
/// "no mesh" and is what the loading functions return on failure.
///
/// [`MeshManager`]: crate::MeshManager
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct MeshHandle(u32);

impl MeshHandle {
    /// The reserved "invalid / none" handle.
    pub const INVALID: MeshHandle = MeshHandle(0);

    pub(crate) fn new(raw: u32) -> Self {
        MeshHandle(raw)
    }

    pub fn is_valid(&self) -> bool {
        self.0 != 0
    }

    /// Raw integer value, mainly useful for logging and debugging.
    pub fn raw(&self) -> u32 {
        self.0
    }
}

impl Default for MeshHandle {
    fn default() -> Self {
        MeshHandle::INVALID
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn invalid_handle_is_zero() {
        assert_eq!(MeshHandle::INVALID.raw(), 0);
        assert!(!MeshHandle::INVALID.is_valid());
        assert_eq!(MeshHandle::default(), MeshHandle::INVALID);
    }

    #[test]
    fn nonzero_handle_is_valid() {
        assert!(MeshHandle::new(1).is_valid());
    }
}
