//! Capability masks and tags
//!
//! Entities carry a [`TraitMask`] computed once when their traits change.
//! Queries test it with two ANDs instead of looking traits up per call.

use serde::{Deserialize, Serialize};
use std::ops::{BitAnd, BitOr, BitOrAssign, Not};

/// Bitset of entity capabilities (one bit per trait).
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct TraitMask(pub u64);

impl TraitMask {
    pub const EMPTY: Self = Self(0);

    // Bits used by the grid itself. Callers own the rest.
    pub const AGENT: Self = Self::bit(0);
    pub const OBSTACLE: Self = Self::bit(1);
    pub const DYING: Self = Self::bit(2);
    pub const NO_COLLISION: Self = Self::bit(3);

    /// First bit free for caller-defined traits.
    pub const FIRST_USER_BIT: u32 = 16;

    pub const fn bit(index: u32) -> Self {
        Self(1u64 << index)
    }

    pub const fn user(index: u32) -> Self {
        Self::bit(Self::FIRST_USER_BIT + index)
    }

    #[inline]
    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    #[inline]
    pub const fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    pub const fn is_empty(self) -> bool {
        self.0 == 0
    }

    pub fn insert(&mut self, other: Self) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: Self) {
        self.0 &= !other.0;
    }
}

impl BitOr for TraitMask {
    type Output = Self;
    fn bitor(self, rhs: Self) -> Self {
        Self(self.0 | rhs.0)
    }
}

impl BitOrAssign for TraitMask {
    fn bitor_assign(&mut self, rhs: Self) {
        self.0 |= rhs.0;
    }
}

impl BitAnd for TraitMask {
    type Output = Self;
    fn bitand(self, rhs: Self) -> Self {
        Self(self.0 & rhs.0)
    }
}

impl Not for TraitMask {
    type Output = Self;
    fn not(self) -> Self {
        Self(!self.0)
    }
}

/// "Has all of `include` and none of `exclude`".
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TraitFilter {
    pub include: TraitMask,
    pub exclude: TraitMask,
}

impl TraitFilter {
    /// Matches everything.
    pub const ANY: Self = Self {
        include: TraitMask::EMPTY,
        exclude: TraitMask::EMPTY,
    };

    pub const fn new(include: TraitMask, exclude: TraitMask) -> Self {
        Self { include, exclude }
    }

    pub fn including(mut self, mask: TraitMask) -> Self {
        self.include |= mask;
        self
    }

    pub fn excluding(mut self, mask: TraitMask) -> Self {
        self.exclude |= mask;
        self
    }

    #[inline]
    pub fn matches(&self, mask: TraitMask) -> bool {
        mask.contains(self.include) && !mask.intersects(self.exclude)
    }
}

/// Avoidance group index, `0..=9`.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct AvoidanceGroup(u8);

impl AvoidanceGroup {
    pub const COUNT: u8 = 10;

    /// Trait bits of all groups.
    pub const ALL_BITS: TraitMask = TraitMask(((1u64 << Self::COUNT) - 1) << 4);

    /// Out-of-range indices are clamped to the last group.
    pub fn new(index: u8) -> Self {
        Self(index.min(Self::COUNT - 1))
    }

    pub fn index(self) -> u8 {
        self.0
    }

    /// Trait bit carried by members of this group.
    pub fn trait_bit(self) -> TraitMask {
        TraitMask::bit(4 + self.0 as u32)
    }
}

/// Set of avoidance groups.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct AvoidanceGroups(u16);

impl AvoidanceGroups {
    pub const NONE: Self = Self(0);

    pub fn with(mut self, group: AvoidanceGroup) -> Self {
        self.0 |= 1 << group.index();
        self
    }

    pub fn contains(self, group: AvoidanceGroup) -> bool {
        self.0 & (1 << group.index()) != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }

    /// Trait bits of every group in the set.
    pub fn trait_mask(self) -> TraitMask {
        (0..AvoidanceGroup::COUNT)
            .map(AvoidanceGroup::new)
            .filter(|group| self.contains(*group))
            .fold(TraitMask::EMPTY, |mask, group| mask | group.trait_bit())
    }
}

/// Sub-type / team tag.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Category(pub u8);

/// Obstacle collision channels tested by occlusion checks.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct CollisionChannels(pub u32);

impl CollisionChannels {
    pub const NONE: Self = Self(0);
    pub const ALL: Self = Self(u32::MAX);

    pub const fn channel(index: u32) -> Self {
        Self(1 << index)
    }

    #[inline]
    pub fn intersects(self, other: Self) -> bool {
        self.0 & other.0 != 0
    }

    pub fn is_empty(self) -> bool {
        self.0 == 0
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn filter_requires_include_and_rejects_exclude() {
        let fast = TraitMask::user(0);
        let flying = TraitMask::user(1);
        let filter = TraitFilter::ANY.including(TraitMask::AGENT).excluding(flying);

        assert!(filter.matches(TraitMask::AGENT | fast));
        assert!(!filter.matches(TraitMask::AGENT | flying));
        assert!(!filter.matches(fast));
        assert!(TraitFilter::ANY.matches(TraitMask::EMPTY));
    }

    #[test]
    fn groups_map_to_distinct_trait_bits() {
        let groups = AvoidanceGroups::NONE
            .with(AvoidanceGroup::new(0))
            .with(AvoidanceGroup::new(9));
        let mask = groups.trait_mask();
        assert!(mask.contains(AvoidanceGroup::new(0).trait_bit()));
        assert!(mask.contains(AvoidanceGroup::new(9).trait_bit()));
        assert!(!mask.intersects(AvoidanceGroup::new(5).trait_bit()));
        assert!(!mask.intersects(TraitMask::user(0)));
        assert_eq!(AvoidanceGroup::new(200).index(), 9);
    }
}
