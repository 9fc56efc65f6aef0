//! Branch target labels.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

static NEXT_LABEL: AtomicU32 = AtomicU32::new(0);

/// A position in a method body that branches can target.
///
/// Labels are allocated from a process-wide counter so that labels created
/// by injected code never collide with labels replayed from an input body.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct Label(u32);

impl Label {
    /// Allocate a fresh, never before returned label.
    #[must_use]
    pub fn fresh() -> Self {
        Self(NEXT_LABEL.fetch_add(1, Ordering::Relaxed))
    }

    /// Get the inner value
    #[inline]
    #[must_use]
    pub const fn as_u32(self) -> u32 {
        self.0
    }
}

impl fmt::Display for Label {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "L{}", self.0)
    }
}
