use crate::entity::EntityHandle;
use crate::traits::CollisionChannels;
use glam::{Vec2, Vec3};
use parking_lot::{Mutex, MutexGuard};
use smallvec::SmallVec;

/// Entries kept inline before a cell spills to the heap.
pub const INLINE_ENTRIES: usize = 8;

/// One polygon edge of an edge obstacle, from `position.xy` to `end`.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct EdgeData {
    pub end: Vec2,
    /// Unit direction of this edge.
    pub direction: Vec2,
    /// Unit direction of the edge starting at `end`.
    pub next_direction: Vec2,
    pub convex: bool,
    pub next_convex: bool,
    pub height: f32,
}

#[derive(Debug, Copy, Clone, PartialEq)]
pub enum EntryShape {
    Sphere,
    Edge(EdgeData),
}

/// Snapshot of one registered entity, stored by value in every cell it touches.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct GridEntry {
    pub entity: EntityHandle,
    pub hash: u32,
    pub position: Vec3,
    pub radius: f32,
    pub channels: CollisionChannels,
    pub shape: EntryShape,
}

impl GridEntry {
    pub fn sphere(entity: EntityHandle, position: Vec3, radius: f32) -> Self {
        Self {
            entity,
            hash: entity.grid_hash(),
            position,
            radius,
            channels: CollisionChannels::NONE,
            shape: EntryShape::Sphere,
        }
    }

    pub fn with_channels(mut self, channels: CollisionChannels) -> Self {
        self.channels = channels;
        self
    }

    pub fn edge(&self) -> Option<&EdgeData> {
        match &self.shape {
            EntryShape::Edge(edge) => Some(edge),
            EntryShape::Sphere => None,
        }
    }
}

pub(crate) type EntryList = SmallVec<[GridEntry; INLINE_ENTRIES]>;

#[derive(Debug, Default)]
pub(crate) struct CellSlot {
    pub entries: EntryList,
    pub registered: bool,
}

/// A bucket of entries guarded by its own futex mutex.
///
/// Writers go through [`GridCell::lock`], which only the registration pass
/// can reach. Readers use [`GridCell::entries`] while no pass exists.
#[derive(Debug, Default)]
pub struct GridCell {
    slot: Mutex<CellSlot>,
}

impl GridCell {
    pub(crate) fn lock(&self) -> CellGuard<'_> {
        CellGuard {
            slot: self.slot.lock(),
        }
    }

    pub(crate) fn slot_mut(&mut self) -> &mut CellSlot {
        self.slot.get_mut()
    }

    /// Lock-free read of the cell contents.
    ///
    /// # Safety
    /// No [`CellGuard`] on this cell may be alive. The grid guarantees this
    /// because guards only exist inside a `RegistrationPass`, which borrows
    /// the grid mutably.
    #[inline]
    pub(crate) unsafe fn entries(&self) -> &[GridEntry] {
        // SAFETY: caller guarantees there is no concurrent writer.
        unsafe { &(*self.slot.data_ptr()).entries }
    }
}

/// RAII scoped lock over one cell. Critical sections stay O(1).
pub(crate) struct CellGuard<'a> {
    slot: MutexGuard<'a, CellSlot>,
}

impl CellGuard<'_> {
    /// Append `entry` and report whether this was the cell's first entry of
    /// the frame.
    #[inline]
    pub fn push(&mut self, entry: GridEntry) -> bool {
        self.slot.entries.push(entry);
        !std::mem::replace(&mut self.slot.registered, true)
    }

    pub fn clear(&mut self) {
        self.slot.entries.clear();
        self.slot.registered = false;
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn first_push_marks_registered() {
        let cell = GridCell::default();
        let handle = EntityHandle::new(1, 0);
        {
            let mut guard = cell.lock();
            assert!(guard.push(GridEntry::sphere(handle, Vec3::ZERO, 1.0)));
            assert!(!guard.push(GridEntry::sphere(EntityHandle::new(2, 0), Vec3::ONE, 1.0)));
        }
        // SAFETY: the guard above has been dropped.
        let entries = unsafe { cell.entries() };
        assert_eq!(entries.len(), 2);

        cell.lock().clear();
        assert!(unsafe { cell.entries() }.is_empty());
    }
}
