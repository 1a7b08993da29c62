//! Access flags shared by classes, fields and methods.
//!
//! Bit values follow the DEX `access_flags` table. Some bits are overloaded
//! by item kind (`0x40` is `volatile` on fields and `bridge` on methods);
//! this type does not track the item kind, callers pick the right constant.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

#[derive(Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Default)]
#[repr(transparent)]
pub struct AccessFlags(u32);

impl AccessFlags {
    pub const NONE: Self = Self(0);
    pub const PUBLIC: Self = Self(0x0001);
    pub const PRIVATE: Self = Self(0x0002);
    pub const PROTECTED: Self = Self(0x0004);
    pub const STATIC: Self = Self(0x0008);
    pub const FINAL: Self = Self(0x0010);
    pub const SYNCHRONIZED: Self = Self(0x0020);
    pub const BRIDGE: Self = Self(0x0040);
    pub const VARARGS: Self = Self(0x0080);
    pub const NATIVE: Self = Self(0x0100);
    pub const INTERFACE: Self = Self(0x0200);
    pub const ABSTRACT: Self = Self(0x0400);
    pub const SYNTHETIC: Self = Self(0x1000);
    pub const CONSTRUCTOR: Self = Self(0x1_0000);

    /// Visibility bits.
    pub const VISIBILITY: Self = Self(0x0007);

    #[inline]
    pub const fn from_bits(bits: u32) -> Self {
        Self(bits)
    }

    #[inline]
    pub const fn bits(self) -> u32 {
        self.0
    }

    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    #[inline]
    pub const fn union(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    #[inline]
    pub const fn intersection(self, other: Self) -> Self {
        Self(self.0 & other.0)
    }

    #[inline]
    pub const fn without(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }

    #[inline]
    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Keyword names of the set bits, in bit order (method interpretation).
    pub fn keywords(self) -> Vec<&'static str> {
        const NAMES: [(AccessFlags, &str); 13] = [
            (AccessFlags::PUBLIC, "public"),
            (AccessFlags::PRIVATE, "private"),
            (AccessFlags::PROTECTED, "protected"),
            (AccessFlags::STATIC, "static"),
            (AccessFlags::FINAL, "final"),
            (AccessFlags::SYNCHRONIZED, "synchronized"),
            (AccessFlags::BRIDGE, "bridge"),
            (AccessFlags::VARARGS, "varargs"),
            (AccessFlags::NATIVE, "native"),
            (AccessFlags::INTERFACE, "interface"),
            (AccessFlags::ABSTRACT, "abstract"),
            (AccessFlags::SYNTHETIC, "synthetic"),
            (AccessFlags::CONSTRUCTOR, "constructor"),
        ];
        NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect()
    }
}

impl BitOr for AccessFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.union(rhs)
    }
}

impl BitOrAssign for AccessFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for AccessFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "AccessFlags({:#06x}: {})", self.0, self.keywords().join(" "))
    }
}

impl fmt::Display for AccessFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.keywords().join(" "))
    }
}
