//! Module identifiers.

use serde::{Deserialize, Serialize};
use std::fmt;

/// Type-safe module identifier
///
/// Keys a module's probe array in the runtime registry. Two builds of the
/// same module must produce the same id, so ids are usually derived from
/// the module's unmodified bytes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct ModuleId(u64);

impl ModuleId {
    /// Create a new module ID
    #[inline]
    #[must_use]
    pub const fn new(id: u64) -> Self {
        Self(id)
    }

    /// Derive the id from the first eight bytes of the content's BLAKE3 digest.
    #[must_use]
    pub fn from_content(bytes: &[u8]) -> Self {
        let digest = blake3::hash(bytes);
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest.as_bytes()[..8]);
        Self(u64::from_be_bytes(head))
    }

    /// Get the inner value
    #[inline]
    #[must_use]
    pub const fn as_u64(self) -> u64 {
        self.0
    }

    /// Id from the signed constant loaded by injected code.
    #[inline]
    #[must_use]
    pub const fn from_i64(value: i64) -> Self {
        Self(u64::from_ne_bytes(value.to_ne_bytes()))
    }

    /// The id as the signed constant loaded by injected code.
    #[inline]
    #[must_use]
    pub const fn as_i64(self) -> i64 {
        i64::from_ne_bytes(self.0.to_ne_bytes())
    }
}

impl fmt::Display for ModuleId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:016x}", self.0)
    }
}
