//! Reserved probe-storage identifiers.
//!
//! The instrumenter injects these members and recognises them again to detect
//! a module that was instrumented before. The runtime registry relies on the
//! same names, so they are defined exactly once.

use crate::bytecode::access::AccessFlags;

/// Reserved field and accessor method used to hold and retrieve the probe array.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StorageMarker {
    /// Name of the static probe array field
    pub field_name: &'static str,
    /// Descriptor of the probe array field
    pub field_desc: &'static str,
    /// Access flags of the probe array field
    pub field_access: AccessFlags,
    /// Name of the static accessor method
    pub accessor_name: &'static str,
    /// Descriptor of the accessor method
    pub accessor_desc: &'static str,
    /// Access flags of the accessor method
    pub accessor_access: AccessFlags,
}

/// The one storage marker shared by every component.
pub const STORAGE_MARKER: StorageMarker = StorageMarker {
    field_name: "$covprobeData",
    field_desc: "[Z",
    field_access: AccessFlags::STATIC.union(AccessFlags::SYNTHETIC),
    accessor_name: "$covprobeInit",
    accessor_desc: "()[Z",
    accessor_access: AccessFlags::PRIVATE
        .union(AccessFlags::STATIC)
        .union(AccessFlags::SYNTHETIC),
};

impl StorageMarker {
    /// Whether `name` is the reserved field name.
    #[inline]
    #[must_use]
    pub fn is_field(&self, name: &str) -> bool {
        name == self.field_name
    }

    /// Whether `name` is the reserved accessor name.
    #[inline]
    #[must_use]
    pub fn is_accessor(&self, name: &str) -> bool {
        name == self.accessor_name
    }
}
