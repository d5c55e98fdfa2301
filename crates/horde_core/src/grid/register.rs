//! Per-frame registration pass.

use super::cell::GridEntry;
use super::uniform::{Layer, UniformGrid};
use glam::{IVec3, Vec2, Vec3};
use rayon::prelude::*;
use std::sync::atomic::{AtomicU32, AtomicUsize, Ordering};

/// Totals reported when a pass finishes.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct RegistrationSummary {
    pub cleared_cells: usize,
    pub entries: usize,
    pub skipped: usize,
}

/// Exclusive write access to a grid for one frame.
///
/// Every method takes `&self` and is safe to call from many threads at
/// once: each append locks only the target cell. Reads of the grid are
/// impossible while the pass is alive because it borrows the grid mutably.
pub struct RegistrationPass<'g> {
    grid: &'g UniformGrid,
    cleared_cells: usize,
    entries: AtomicUsize,
    skipped: AtomicUsize,
}

impl<'g> RegistrationPass<'g> {
    pub(super) fn begin(grid: &'g mut UniformGrid) -> Self {
        grid.agent_reach.store(0, Ordering::Relaxed);
        grid.agent_radius_max.store(0, Ordering::Relaxed);

        let grid: &'g UniformGrid = grid;
        let cleared_cells = grid
            .occupied
            .par_iter()
            .map(|shard| {
                let indices = std::mem::take(&mut *shard.lock());
                for &index in &indices {
                    for layer in [Layer::Agents, Layer::Obstacles] {
                        grid.cell(layer, index as usize).lock().clear();
                    }
                }
                indices.len()
            })
            .sum();

        Self {
            grid,
            cleared_cells,
            entries: AtomicUsize::new(0),
            skipped: AtomicUsize::new(0),
        }
    }

    pub fn grid_config(&self) -> &super::GridConfig {
        self.grid.config()
    }

    /// Place an agent into the cell containing its position, or into every
    /// cell its sphere overlaps when `multi_cell` is set. Agents whose
    /// center lies outside the grid are skipped.
    pub fn register_agent(&self, entry: GridEntry, multi_cell: bool) {
        if !self.accepts(&entry) || !self.grid.contains_location(entry.position) {
            self.skipped.fetch_add(1, Ordering::Relaxed);
            return;
        }

        fetch_max_f32(&self.grid.agent_radius_max, entry.radius);
        if multi_cell {
            self.place_sphere(Layer::Agents, entry);
        } else {
            fetch_max_f32(&self.grid.agent_reach, entry.radius);
            self.place_single(Layer::Agents, entry);
        }
    }

    /// Place a sphere obstacle into every cell its sphere overlaps.
    pub fn register_sphere_obstacle(&self, entry: GridEntry, layer: Layer) {
        debug_assert!(layer != Layer::Agents);
        if !self.accepts(&entry) || self.place_sphere(layer, entry) == 0 {
            self.skipped.fetch_add(1, Ordering::Relaxed);
        }
    }

    /// Place an edge obstacle into every cell its inflated segment crosses
    /// within its height band.
    pub fn register_edge_obstacle(&self, entry: GridEntry, layer: Layer) {
        debug_assert!(layer != Layer::Agents);
        let Some(edge) = entry.edge().copied() else {
            self.register_sphere_obstacle(entry, layer);
            return;
        };
        if !self.accepts(&entry) {
            self.skipped.fetch_add(1, Ordering::Relaxed);
            return;
        }

        let start = entry.position.truncate();
        let half_height = edge.height * 0.5;
        let reach = Vec3::new(entry.radius, entry.radius, half_height);
        let min = start.min(edge.end).extend(entry.position.z) - reach;
        let max = start.max(edge.end).extend(entry.position.z) + reach;
        let half_cell = self.grid.cell_size() * 0.5;
        let cell_reach = entry.radius + half_cell.truncate().length();

        let mut placed = 0;
        for coord in self.grid.coords_in_box(min, max) {
            let center = self.grid.coord_to_location(coord);
            if distance_sq_to_segment_2d(center.truncate(), start, edge.end) > cell_reach * cell_reach {
                continue;
            }
            if self.push(layer, coord, entry) {
                placed += 1;
            }
        }
        if placed == 0 {
            self.skipped.fetch_add(1, Ordering::Relaxed);
        }
    }

    fn accepts(&self, entry: &GridEntry) -> bool {
        entry.position.is_finite() && entry.radius.is_finite() && entry.radius >= 0.0
    }

    fn place_single(&self, layer: Layer, entry: GridEntry) {
        let coord = self.grid.location_to_coord(entry.position);
        self.push(layer, coord, entry);
    }

    fn place_sphere(&self, layer: Layer, entry: GridEntry) -> usize {
        let reach = Vec3::splat(entry.radius);
        let radius_sq = entry.radius * entry.radius;
        let mut placed = 0;
        for coord in self
            .grid
            .coords_in_box(entry.position - reach, entry.position + reach)
        {
            if self.grid.distance_sq_to_cell(coord, entry.position) > radius_sq {
                continue;
            }
            if self.push(layer, coord, entry) {
                placed += 1;
            }
        }
        placed
    }

    /// Append under the cell lock; queue the cell for clearing the first
    /// time a transient layer touches it this frame.
    fn push(&self, layer: Layer, coord: IVec3, entry: GridEntry) -> bool {
        let Some(index) = self.grid.coord_to_index(coord) else {
            return false;
        };
        let first = self.grid.cell(layer, index).lock().push(entry);
        if first && layer.is_transient() {
            let shard = index % self.grid.occupied.len();
            self.grid.occupied[shard].lock().push(index as u32);
        }
        self.entries.fetch_add(1, Ordering::Relaxed);
        true
    }

    pub fn finish(self) -> RegistrationSummary {
        let summary = RegistrationSummary {
            cleared_cells: self.cleared_cells,
            entries: self.entries.load(Ordering::Relaxed),
            skipped: self.skipped.load(Ordering::Relaxed),
        };
        tracing::trace!(?summary, "registration pass finished");
        summary
    }
}

/// Monotonic max over non-negative f32 stored as bits.
fn fetch_max_f32(slot: &AtomicU32, value: f32) {
    // Non-negative floats order the same as their bit patterns.
    slot.fetch_max(value.max(0.0).to_bits(), Ordering::Relaxed);
}

pub(crate) fn distance_sq_to_segment_2d(point: Vec2, a: Vec2, b: Vec2) -> f32 {
    let ab = b - a;
    let len_sq = ab.length_squared();
    if len_sq <= f32::EPSILON {
        return point.distance_squared(a);
    }
    let t = ((point - a).dot(ab) / len_sq).clamp(0.0, 1.0);
    point.distance_squared(a + ab * t)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debug::NullSink;
    use crate::entity::EntityHandle;
    use crate::grid::cell::{EdgeData, EntryShape};
    use crate::grid::GridConfig;
    use glam::UVec3;
    use std::sync::Arc;

    fn grid() -> UniformGrid {
        let config = GridConfig {
            cell_size: Vec3::ONE,
            grid_size: UVec3::splat(10),
            origin: Vec3::ZERO,
            ..GridConfig::default()
        }
        .with_threads(4, 1);
        UniformGrid::new(config, Arc::new(NullSink)).unwrap()
    }

    fn agent(index: u32, position: Vec3, radius: f32) -> GridEntry {
        GridEntry::sphere(EntityHandle::new(index, 0), position, radius)
    }

    fn total(grid: &UniformGrid, layer: Layer) -> usize {
        (0..grid.cell_count()).map(|i| grid.entries_at(layer, i).len()).sum()
    }

    #[test]
    fn single_cell_and_out_of_bounds() {
        let mut grid = grid();
        let pass = grid.begin_registration();
        pass.register_agent(agent(0, Vec3::splat(0.5), 0.4), false);
        pass.register_agent(agent(1, Vec3::splat(-1.0), 0.4), false);
        pass.register_agent(agent(2, Vec3::splat(f32::NAN), 0.4), false);
        let summary = pass.finish();

        assert_eq!(summary.entries, 1);
        assert_eq!(summary.skipped, 2);
        assert_eq!(grid.entries(Layer::Agents, IVec3::ZERO).len(), 1);
        assert_eq!(grid.occupied_count(), 1);
        assert!((grid.agent_reach() - 0.4).abs() < 1e-6);
    }

    #[test]
    fn multi_cell_covers_overlapped_cells() {
        let mut grid = grid();
        let pass = grid.begin_registration();
        pass.register_agent(agent(0, Vec3::new(5.0, 5.0, 5.0), 0.6), true);
        pass.finish();

        // Sphere centered on a cell corner touches the 8 surrounding cells.
        assert_eq!(total(&grid, Layer::Agents), 8);
        assert_eq!(grid.agent_reach(), 0.0);
        assert!((grid.max_agent_radius() - 0.6).abs() < 1e-6);
    }

    #[test]
    fn next_pass_clears_only_transient_layers() {
        let mut grid = grid();
        {
            let pass = grid.begin_registration();
            pass.register_agent(agent(0, Vec3::splat(1.5), 0.2), false);
            pass.register_sphere_obstacle(agent(1, Vec3::splat(3.5), 0.2), Layer::Obstacles);
            pass.register_sphere_obstacle(agent(2, Vec3::splat(6.5), 0.2), Layer::StaticObstacles);
            pass.finish();
        }
        assert_eq!(grid.occupied_count(), 2);

        let summary = grid.begin_registration().finish();
        assert_eq!(summary.cleared_cells, 2);
        assert_eq!(total(&grid, Layer::Agents), 0);
        assert_eq!(total(&grid, Layer::Obstacles), 0);
        assert_eq!(total(&grid, Layer::StaticObstacles), 1);

        grid.clear_static_obstacles();
        assert_eq!(total(&grid, Layer::StaticObstacles), 0);
    }

    #[test]
    fn edge_obstacle_follows_segment() {
        let mut grid = grid();
        let mut entry = agent(0, Vec3::new(0.5, 5.5, 0.5), 0.1);
        entry.shape = EntryShape::Edge(EdgeData {
            end: Vec2::new(9.5, 5.5),
            direction: Vec2::X,
            next_direction: Vec2::NEG_X,
            convex: true,
            next_convex: true,
            height: 1.0,
        });
        let pass = grid.begin_registration();
        pass.register_edge_obstacle(entry, Layer::StaticObstacles);
        pass.finish();

        for x in 0..10 {
            assert_eq!(grid.entries(Layer::StaticObstacles, IVec3::new(x, 5, 0)).len(), 1);
        }
        assert!(grid.entries(Layer::StaticObstacles, IVec3::new(3, 8, 0)).is_empty());
    }

    #[test]
    fn parallel_registration_keeps_every_entry() {
        let mut grid = grid();
        let pass = grid.begin_registration();
        (0..2000u32).into_par_iter().for_each(|i| {
            let p = Vec3::new((i % 10) as f32 + 0.5, ((i / 10) % 10) as f32 + 0.5, 0.5);
            pass.register_agent(agent(i, p, 0.1), false);
        });
        assert_eq!(pass.finish().entries, 2000);
        assert_eq!(total(&grid, Layer::Agents), 2000);
        assert_eq!(grid.occupied_count(), 100);
    }
}
