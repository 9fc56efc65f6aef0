//! Access flags for modules, fields and methods.

use bitflags::bitflags;
use serde::{Deserialize, Serialize};

bitflags! {
    /// Access and property flags.
    ///
    /// Bit values are shared between module, field and method declarations;
    /// not every bit is meaningful for every kind of declaration.
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
    pub struct AccessFlags: u16 {
        const PUBLIC = 0x0001;
        const PRIVATE = 0x0002;
        const PROTECTED = 0x0004;
        const STATIC = 0x0008;
        const FINAL = 0x0010;
        const SUPER = 0x0020;
        const VOLATILE = 0x0040;
        const TRANSIENT = 0x0080;
        const NATIVE = 0x0100;
        const INTERFACE = 0x0200;
        const ABSTRACT = 0x0400;
        const STRICT = 0x0800;
        const SYNTHETIC = 0x1000;
        const ANNOTATION = 0x2000;
        const ENUM = 0x4000;
    }
}

impl AccessFlags {
    /// Static member.
    #[inline]
    #[must_use]
    pub const fn is_static(self) -> bool {
        self.contains(Self::STATIC)
    }

    /// Interface declaration.
    #[inline]
    #[must_use]
    pub const fn is_interface(self) -> bool {
        self.contains(Self::INTERFACE)
    }

    /// No visibility bit set (package-private).
    #[inline]
    #[must_use]
    pub const fn is_package_private(self) -> bool {
        !self.intersects(Self::PUBLIC.union(Self::PRIVATE).union(Self::PROTECTED))
    }
}
