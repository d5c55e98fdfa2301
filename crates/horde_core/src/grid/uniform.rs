//! Dense 3D grid of cells over a fixed world volume.
//!
//! Positions map to cells with a pure affine transform plus `floor`, so
//! query code can turn a world-space box into a coordinate range without
//! touching the cells.

use super::cell::{GridCell, GridEntry};
use super::config::{GridConfig, GridError};
use super::register::RegistrationPass;
use crate::debug::DebugSink;
use glam::{IVec3, Vec3};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::Arc;

/// Which set of cells an entry lives in.
#[derive(Debug, Copy, Clone, PartialEq, Eq, Hash)]
pub enum Layer {
    /// Moving agents. Cleared every frame. Shape queries read this layer.
    Agents = 0,
    /// Obstacles re-registered every frame.
    Obstacles = 1,
    /// Obstacles registered once and kept until explicitly cleared.
    StaticObstacles = 2,
}

impl Layer {
    pub const ALL: [Layer; 3] = [Layer::Agents, Layer::Obstacles, Layer::StaticObstacles];
    pub const OBSTACLES: [Layer; 2] = [Layer::Obstacles, Layer::StaticObstacles];

    /// Cleared through the occupied-cells worklist.
    pub fn is_transient(self) -> bool {
        self != Layer::StaticObstacles
    }
}

pub struct UniformGrid {
    config: GridConfig,
    inv_cell_size: Vec3,
    dims: IVec3,
    layers: [Vec<GridCell>; 3],
    /// Cells first touched this frame, sharded by `index % shards`.
    pub(super) occupied: Vec<Mutex<Vec<u32>>>,
    /// Largest radius among single-cell agent entries this frame (f32 bits).
    pub(super) agent_reach: AtomicU32,
    /// Largest radius among all agent entries this frame (f32 bits).
    pub(super) agent_radius_max: AtomicU32,
    debug: Arc<dyn DebugSink>,
}

impl UniformGrid {
    pub fn new(config: GridConfig, debug: Arc<dyn DebugSink>) -> Result<Self, GridError> {
        config.validate()?;

        let cells = config.cell_count() as usize;
        let layers = [
            Self::allocate(cells),
            Self::allocate(cells),
            Self::allocate(cells),
        ];
        let shards = config.max_threads;

        tracing::info!(
            dims = ?config.grid_size,
            cell_size = ?config.cell_size,
            origin = ?config.origin,
            shards,
            "neighbor grid allocated"
        );

        Ok(Self {
            inv_cell_size: config.cell_size.recip(),
            dims: config.grid_size.as_ivec3(),
            layers,
            occupied: (0..shards).map(|_| Mutex::new(Vec::new())).collect(),
            agent_reach: AtomicU32::new(0),
            agent_radius_max: AtomicU32::new(0),
            debug,
            config,
        })
    }

    fn allocate(cells: usize) -> Vec<GridCell> {
        let mut layer = Vec::with_capacity(cells);
        layer.resize_with(cells, GridCell::default);
        layer
    }

    pub fn config(&self) -> &GridConfig {
        &self.config
    }

    pub fn cell_size(&self) -> Vec3 {
        self.config.cell_size
    }

    pub fn dims(&self) -> IVec3 {
        self.dims
    }

    pub fn cell_count(&self) -> usize {
        self.layers[0].len()
    }

    /// World-space `(min, max)` corners of the grid volume.
    pub fn bounds(&self) -> (Vec3, Vec3) {
        (self.config.origin, self.config.bounds_max())
    }

    pub fn debug_sink(&self) -> &dyn DebugSink {
        self.debug.as_ref()
    }

    /// Length of one cell's diagonal.
    pub fn cell_diagonal(&self) -> f32 {
        self.config.cell_size.length()
    }

    /// Farthest any point of a cell lies from the cell center.
    pub fn half_diagonal(&self) -> f32 {
        0.5 * self.cell_diagonal()
    }

    #[inline]
    pub fn location_to_coord(&self, location: Vec3) -> IVec3 {
        ((location - self.config.origin) * self.inv_cell_size)
            .floor()
            .as_ivec3()
    }

    /// Center of the cell at `coord`.
    #[inline]
    pub fn coord_to_location(&self, coord: IVec3) -> Vec3 {
        coord.as_vec3() * self.config.cell_size + self.config.origin + self.config.cell_size * 0.5
    }

    #[inline]
    pub fn is_inside(&self, coord: IVec3) -> bool {
        coord.cmpge(IVec3::ZERO).all() && coord.cmplt(self.dims).all()
    }

    pub fn contains_location(&self, location: Vec3) -> bool {
        self.is_inside(self.location_to_coord(location))
    }

    #[inline]
    pub fn coord_to_index(&self, coord: IVec3) -> Option<usize> {
        if !self.is_inside(coord) {
            return None;
        }
        Some((coord.x + self.dims.x * (coord.y + self.dims.y * coord.z)) as usize)
    }

    pub fn index_to_coord(&self, index: usize) -> IVec3 {
        let index = index as i32;
        let plane = self.dims.x * self.dims.y;
        IVec3::new(
            index % self.dims.x,
            (index % plane) / self.dims.x,
            index / plane,
        )
    }

    /// Inclusive coordinate range of cells overlapping the box `[min, max]`,
    /// clipped to the grid. `None` when the box misses the grid entirely.
    pub fn coord_range(&self, min: Vec3, max: Vec3) -> Option<(IVec3, IVec3)> {
        let lo = self.location_to_coord(min).max(IVec3::ZERO);
        let hi = self.location_to_coord(max).min(self.dims - IVec3::ONE);
        lo.cmple(hi).all().then_some((lo, hi))
    }

    /// Every in-bounds coordinate overlapping `[min, max]`, x fastest.
    pub fn coords_in_box(&self, min: Vec3, max: Vec3) -> impl Iterator<Item = IVec3> {
        let (lo, hi) = self
            .coord_range(min, max)
            .unwrap_or((IVec3::ONE, IVec3::ZERO));
        (lo.z..=hi.z).flat_map(move |z| {
            (lo.y..=hi.y).flat_map(move |y| (lo.x..=hi.x).map(move |x| IVec3::new(x, y, z)))
        })
    }

    /// Distance from `point` to the nearest point of the cell box at `coord`.
    pub fn distance_sq_to_cell(&self, coord: IVec3, point: Vec3) -> f32 {
        let half = self.config.cell_size * 0.5;
        let center = self.coord_to_location(coord);
        let outside = ((point - center).abs() - half).max(Vec3::ZERO);
        outside.length_squared()
    }

    pub(crate) fn cell(&self, layer: Layer, index: usize) -> &GridCell {
        &self.layers[layer as usize][index]
    }

    /// Entries of one cell. Empty for out-of-bounds coordinates.
    #[inline]
    pub fn entries(&self, layer: Layer, coord: IVec3) -> &[GridEntry] {
        match self.coord_to_index(coord) {
            Some(index) => self.entries_at(layer, index),
            None => &[],
        }
    }

    #[inline]
    pub fn entries_at(&self, layer: Layer, index: usize) -> &[GridEntry] {
        // SAFETY: cell guards only exist inside a `RegistrationPass`, which
        // holds `&mut self`. Holding `&self` here rules that out.
        unsafe { self.layers[layer as usize][index].entries() }
    }

    /// Largest radius a single-cell agent registered with this frame.
    ///
    /// Queries widen their candidate region by this much so an entry whose
    /// center sits in an unvisited cell can still be found.
    pub fn agent_reach(&self) -> f32 {
        f32::from_bits(self.agent_reach.load(Ordering::Relaxed))
    }

    pub fn max_agent_radius(&self) -> f32 {
        f32::from_bits(self.agent_radius_max.load(Ordering::Relaxed))
    }

    /// Number of cells queued for clearing at the next registration pass.
    pub fn occupied_count(&self) -> usize {
        self.occupied.iter().map(|shard| shard.lock().len()).sum()
    }

    /// Open the frame's registration pass.
    ///
    /// Cells recorded in the occupied worklist are cleared first. While the
    /// returned pass is alive the grid cannot be read.
    pub fn begin_registration(&mut self) -> RegistrationPass<'_> {
        RegistrationPass::begin(self)
    }

    /// Drop every static obstacle. Their records must be re-registered.
    pub fn clear_static_obstacles(&mut self) {
        for cell in &mut self.layers[Layer::StaticObstacles as usize] {
            let slot = cell.slot_mut();
            slot.entries.clear();
            slot.registered = false;
        }
        tracing::debug!("static obstacle layer cleared");
    }
}

impl std::fmt::Debug for UniformGrid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UniformGrid")
            .field("config", &self.config)
            .field("dims", &self.dims)
            .finish_non_exhaustive()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debug::NullSink;
    use glam::UVec3;

    fn grid(cell: Vec3, dims: UVec3) -> UniformGrid {
        let config = GridConfig {
            cell_size: cell,
            grid_size: dims,
            origin: Vec3::ZERO,
            ..GridConfig::default()
        };
        UniformGrid::new(config, Arc::new(NullSink)).unwrap()
    }

    #[test]
    fn coordinate_conversion_round_trips() {
        let grid = grid(Vec3::new(2.0, 1.0, 4.0), UVec3::new(5, 6, 2));
        for index in 0..grid.cell_count() {
            let coord = grid.index_to_coord(index);
            assert!(grid.is_inside(coord));
            assert_eq!(grid.coord_to_index(coord), Some(index));
            let center = grid.coord_to_location(coord);
            assert_eq!(grid.location_to_coord(center), coord);
        }
    }

    #[test]
    fn boundaries_and_negative_coordinates() {
        let grid = grid(Vec3::ONE, UVec3::splat(10));
        assert_eq!(grid.location_to_coord(Vec3::new(-0.01, 0.0, 9.99)), IVec3::new(-1, 0, 9));
        assert!(!grid.contains_location(Vec3::splat(10.0)));
        assert!(grid.contains_location(Vec3::splat(9.999)));
        assert_eq!(grid.coord_to_index(IVec3::new(10, 0, 0)), None);
        assert!(grid.entries(Layer::Agents, IVec3::splat(-3)).is_empty());
    }

    #[test]
    fn coord_range_clips_to_grid() {
        let grid = grid(Vec3::ONE, UVec3::splat(10));
        let (lo, hi) = grid.coord_range(Vec3::splat(-5.0), Vec3::splat(2.5)).unwrap();
        assert_eq!(lo, IVec3::ZERO);
        assert_eq!(hi, IVec3::splat(2));
        assert_eq!(grid.coords_in_box(Vec3::splat(-5.0), Vec3::splat(2.5)).count(), 27);
        assert!(grid.coord_range(Vec3::splat(20.0), Vec3::splat(30.0)).is_none());
        assert_eq!(grid.coords_in_box(Vec3::splat(20.0), Vec3::splat(30.0)).count(), 0);
    }

    #[test]
    fn cell_box_distance() {
        let grid = grid(Vec3::ONE, UVec3::splat(10));
        let coord = IVec3::new(2, 2, 2);
        assert_eq!(grid.distance_sq_to_cell(coord, Vec3::splat(2.5)), 0.0);
        assert!((grid.distance_sq_to_cell(coord, Vec3::new(5.0, 2.5, 2.5)) - 4.0).abs() < 1e-5);
    }
}
