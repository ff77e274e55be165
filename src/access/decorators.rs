//! Access decorators.
//!
//! A [`DecoratorSet`] describes one memory access: where it points (heap, native,
//! array element), its memory ordering, what kind of reference it reads, and
//! special handling such as patching or boolean masking.

use std::fmt;
use std::ops::{BitOr, BitOrAssign};

#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
pub struct DecoratorSet(u32);

impl DecoratorSet {
    pub const NONE: DecoratorSet = DecoratorSet(0);

    pub const IN_HEAP: DecoratorSet = DecoratorSet(1 << 0);
    pub const IN_NATIVE: DecoratorSet = DecoratorSet(1 << 1);
    pub const IS_ARRAY: DecoratorSet = DecoratorSet(1 << 2);

    pub const MO_RELAXED: DecoratorSet = DecoratorSet(1 << 3);
    pub const MO_ACQUIRE: DecoratorSet = DecoratorSet(1 << 4);
    pub const MO_RELEASE: DecoratorSet = DecoratorSet(1 << 5);
    /// Sequentially consistent; volatile fields.
    pub const MO_SEQ_CST: DecoratorSet = DecoratorSet(1 << 6);

    pub const ACCESS_READ: DecoratorSet = DecoratorSet(1 << 7);
    pub const ACCESS_WRITE: DecoratorSet = DecoratorSet(1 << 8);

    pub const ON_STRONG_OOP_REF: DecoratorSet = DecoratorSet(1 << 9);
    pub const ON_WEAK_OOP_REF: DecoratorSet = DecoratorSet(1 << 10);
    /// Reference of unknown strength (unsafe accesses).
    pub const ON_UNKNOWN_OOP_REF: DecoratorSet = DecoratorSet(1 << 11);

    /// Field offset unknown until the class is resolved.
    pub const NEEDS_PATCHING: DecoratorSet = DecoratorSet(1 << 12);
    /// Normalize loaded/stored booleans to 0 or 1.
    pub const MASK_BOOLEAN: DecoratorSet = DecoratorSet(1 << 13);
    pub const UNSAFE_ACCESS: DecoratorSet = DecoratorSet(1 << 14);
    /// Bypass collector barriers.
    pub const AS_RAW: DecoratorSet = DecoratorSet(1 << 15);

    const MO_MASK: u32 = Self::MO_RELAXED.0 | Self::MO_ACQUIRE.0 | Self::MO_RELEASE.0 | Self::MO_SEQ_CST.0;

    const NAMES: [(DecoratorSet, &'static str); 16] = [
        (Self::IN_HEAP, "IN_HEAP"),
        (Self::IN_NATIVE, "IN_NATIVE"),
        (Self::IS_ARRAY, "IS_ARRAY"),
        (Self::MO_RELAXED, "MO_RELAXED"),
        (Self::MO_ACQUIRE, "MO_ACQUIRE"),
        (Self::MO_RELEASE, "MO_RELEASE"),
        (Self::MO_SEQ_CST, "MO_SEQ_CST"),
        (Self::ACCESS_READ, "ACCESS_READ"),
        (Self::ACCESS_WRITE, "ACCESS_WRITE"),
        (Self::ON_STRONG_OOP_REF, "ON_STRONG_OOP_REF"),
        (Self::ON_WEAK_OOP_REF, "ON_WEAK_OOP_REF"),
        (Self::ON_UNKNOWN_OOP_REF, "ON_UNKNOWN_OOP_REF"),
        (Self::NEEDS_PATCHING, "NEEDS_PATCHING"),
        (Self::MASK_BOOLEAN, "MASK_BOOLEAN"),
        (Self::UNSAFE_ACCESS, "UNSAFE_ACCESS"),
        (Self::AS_RAW, "AS_RAW"),
    ];

    pub fn contains(self, other: DecoratorSet) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn intersects(self, other: DecoratorSet) -> bool {
        self.0 & other.0 != 0
    }

    pub fn without(self, other: DecoratorSet) -> DecoratorSet {
        DecoratorSet(self.0 & !other.0)
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Whether any memory-ordering bit is set.
    pub fn has_memory_order(self) -> bool {
        self.0 & Self::MO_MASK != 0
    }
}

impl BitOr for DecoratorSet {
    type Output = DecoratorSet;

    fn bitor(self, rhs: DecoratorSet) -> DecoratorSet {
        DecoratorSet(self.0 | rhs.0)
    }
}

impl BitOrAssign for DecoratorSet {
    fn bitor_assign(&mut self, rhs: DecoratorSet) {
        self.0 |= rhs.0;
    }
}

impl fmt::Debug for DecoratorSet {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let names: Vec<&str> = Self::NAMES
            .iter()
            .filter(|(bit, _)| self.contains(*bit))
            .map(|(_, name)| *name)
            .collect();
        if names.is_empty() {
            write!(f, "NONE")
        } else {
            write!(f, "{}", names.join("|"))
        }
    }
}
