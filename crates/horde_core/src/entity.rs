//! Entity handle with generational index
//!
//! Handles are 8-byte copies that reference records in a [`Population`].
//! The generation counter lets the grid keep stale handles for a frame
//! without reading recycled slots.
//!
//! [`Population`]: crate::store::Population

/// Entity handle (generation-indexed for safety)
///
/// Format: [32-bit index | 32-bit generation]
/// - Index: slot in the owning store
/// - Generation: incremented when the slot is freed
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct EntityHandle {
    index: u32,
    generation: u32,
}

impl EntityHandle {
    pub const fn new(index: u32, generation: u32) -> Self {
        Self { index, generation }
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn generation(&self) -> u32 {
        self.generation
    }

    /// Serialize to 64-bit integer
    pub fn to_bits(&self) -> u64 {
        ((self.generation as u64) << 32) | (self.index as u64)
    }

    /// Deserialize from 64-bit integer
    pub fn from_bits(bits: u64) -> Self {
        Self {
            index: bits as u32,
            generation: (bits >> 32) as u32,
        }
    }

    /// 32-bit hash used to deduplicate grid entries inside one query.
    ///
    /// The mix is a bijection on the slot index, so two live entities can
    /// never collide.
    #[inline]
    pub fn grid_hash(&self) -> u32 {
        let mut h = self.index;
        h ^= h >> 16;
        h = h.wrapping_mul(0x7feb_352d);
        h ^= h >> 15;
        h = h.wrapping_mul(0x846c_a68b);
        h ^= h >> 16;
        h
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn bits_round_trip() {
        let handle = EntityHandle::new(42, 7);
        assert_eq!(EntityHandle::from_bits(handle.to_bits()), handle);
    }

    #[test]
    fn grid_hash_is_distinct_for_distinct_slots() {
        let mut seen = std::collections::HashSet::new();
        for index in 0..10_000 {
            assert!(seen.insert(EntityHandle::new(index, 0).grid_hash()));
        }
    }
}
