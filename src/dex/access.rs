//! Access flags for classes, fields and methods.

use std::fmt;
use std::ops::{BitAnd, BitOr, BitOrAssign, Not};

/// Bit set of `ACC_*` flags.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default, PartialOrd, Ord)]
pub struct DexAccessFlags(u32);

pub const ACC_PUBLIC: DexAccessFlags = DexAccessFlags(0x0001);
pub const ACC_PRIVATE: DexAccessFlags = DexAccessFlags(0x0002);
pub const ACC_PROTECTED: DexAccessFlags = DexAccessFlags(0x0004);
pub const ACC_STATIC: DexAccessFlags = DexAccessFlags(0x0008);
pub const ACC_FINAL: DexAccessFlags = DexAccessFlags(0x0010);
pub const ACC_SYNCHRONIZED: DexAccessFlags = DexAccessFlags(0x0020);
pub const ACC_VOLATILE: DexAccessFlags = DexAccessFlags(0x0040);
pub const ACC_BRIDGE: DexAccessFlags = DexAccessFlags(0x0040);
pub const ACC_TRANSIENT: DexAccessFlags = DexAccessFlags(0x0080);
pub const ACC_VARARGS: DexAccessFlags = DexAccessFlags(0x0080);
pub const ACC_NATIVE: DexAccessFlags = DexAccessFlags(0x0100);
pub const ACC_INTERFACE: DexAccessFlags = DexAccessFlags(0x0200);
pub const ACC_ABSTRACT: DexAccessFlags = DexAccessFlags(0x0400);
pub const ACC_STRICT: DexAccessFlags = DexAccessFlags(0x0800);
pub const ACC_SYNTHETIC: DexAccessFlags = DexAccessFlags(0x1000);
pub const ACC_ANNOTATION: DexAccessFlags = DexAccessFlags(0x2000);
pub const ACC_ENUM: DexAccessFlags = DexAccessFlags(0x4000);
pub const ACC_CONSTRUCTOR: DexAccessFlags = DexAccessFlags(0x1_0000);
pub const ACC_DECLARED_SYNCHRONIZED: DexAccessFlags = DexAccessFlags(0x2_0000);

/// Spelling used by the assembler, in bit order.
const FLAG_NAMES: &[(&str, DexAccessFlags)] = &[
    ("public", ACC_PUBLIC),
    ("private", ACC_PRIVATE),
    ("protected", ACC_PROTECTED),
    ("static", ACC_STATIC),
    ("final", ACC_FINAL),
    ("synchronized", ACC_SYNCHRONIZED),
    ("volatile", ACC_VOLATILE),
    ("bridge", ACC_BRIDGE),
    ("transient", ACC_TRANSIENT),
    ("varargs", ACC_VARARGS),
    ("native", ACC_NATIVE),
    ("interface", ACC_INTERFACE),
    ("abstract", ACC_ABSTRACT),
    ("strict", ACC_STRICT),
    ("synthetic", ACC_SYNTHETIC),
    ("annotation", ACC_ANNOTATION),
    ("enum", ACC_ENUM),
    ("constructor", ACC_CONSTRUCTOR),
    ("declared_synchronized", ACC_DECLARED_SYNCHRONIZED),
];

impl DexAccessFlags {
    pub const fn empty() -> Self {
        DexAccessFlags(0)
    }

    pub const fn from_bits(bits: u32) -> Self {
        DexAccessFlags(bits)
    }

    pub const fn bits(self) -> u32 {
        self.0
    }

    pub const fn contains(self, other: DexAccessFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: DexAccessFlags) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: DexAccessFlags) {
        self.0 &= !other.0;
    }

    pub fn is_public(self) -> bool {
        self.contains(ACC_PUBLIC)
    }

    pub fn is_private(self) -> bool {
        self.contains(ACC_PRIVATE)
    }

    pub fn is_protected(self) -> bool {
        self.contains(ACC_PROTECTED)
    }

    /// Neither public, protected nor private.
    pub fn is_package_private(self) -> bool {
        self.0 & (ACC_PUBLIC.0 | ACC_PROTECTED.0 | ACC_PRIVATE.0) == 0
    }

    pub fn is_static(self) -> bool {
        self.contains(ACC_STATIC)
    }

    pub fn is_final(self) -> bool {
        self.contains(ACC_FINAL)
    }

    pub fn is_native(self) -> bool {
        self.contains(ACC_NATIVE)
    }

    pub fn is_interface(self) -> bool {
        self.contains(ACC_INTERFACE)
    }

    pub fn is_abstract(self) -> bool {
        self.contains(ACC_ABSTRACT)
    }

    pub fn is_constructor(self) -> bool {
        self.contains(ACC_CONSTRUCTOR)
    }

    pub fn is_synthetic(self) -> bool {
        self.contains(ACC_SYNTHETIC)
    }

    /// Parse one assembler flag name.
    pub fn from_name(name: &str) -> Option<DexAccessFlags> {
        FLAG_NAMES
            .iter()
            .find(|(n, _)| *n == name)
            .map(|(_, flag)| *flag)
    }
}

impl BitOr for DexAccessFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        DexAccessFlags(self.0 | rhs.0)
    }
}

impl BitOrAssign for DexAccessFlags {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for DexAccessFlags {
    type Output = Self;

    fn bitand(self, rhs: Self) -> Self {
        DexAccessFlags(self.0 & rhs.0)
    }
}

impl Not for DexAccessFlags {
    type Output = Self;

    fn not(self) -> Self {
        DexAccessFlags(!self.0)
    }
}

impl fmt::Debug for DexAccessFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "DexAccessFlags({:#x})", self.0)
    }
}

impl fmt::Display for DexAccessFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let mut first = true;
        let mut seen = 0u32;
        for (name, flag) in FLAG_NAMES {
            // Aliased bits (volatile/bridge, transient/varargs) print once.
            if self.contains(*flag) && seen & flag.0 == 0 {
                if !first {
                    f.write_str(" ")?;
                }
                f.write_str(name)?;
                seen |= flag.0;
                first = false;
            }
        }
        Ok(())
    }
}
