use glam::{UVec3, Vec3};
use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Smallest accepted cell edge, in world units.
pub const MIN_CELL_SIZE: f32 = 1e-3;

/// Upper bound on cells per layer; larger grids are a configuration error.
pub const MAX_CELLS: u64 = 1 << 26;

/// Errors raised while building a grid. Per-frame operations never fail.
#[derive(Debug, Error)]
pub enum GridError {
    #[error("cell size on axis {axis} must be finite and at least {min}, got {value}", min = MIN_CELL_SIZE)]
    InvalidCellSize { axis: char, value: f32 },

    #[error("grid dimensions must be non-zero, got {x}x{y}x{z}")]
    InvalidGridSize { x: u32, y: u32, z: u32 },

    #[error("grid of {cells} cells exceeds the {max} cell limit", max = MAX_CELLS)]
    TooManyCells { cells: u64 },

    #[error("grid origin must be finite")]
    InvalidOrigin,

    #[error("max_threads must be at least 1, got {max_threads}")]
    InvalidThreads { max_threads: usize },

    #[error("min_batch_size must be at least 1")]
    InvalidBatchSize,

    #[error("grid is still held by {holders} background queries")]
    GridInUse { holders: usize },

    #[error("failed to start worker pool: {0}")]
    WorkerPool(#[from] rayon::ThreadPoolBuildError),
}

/// Plain-value configuration of a [`UniformGrid`](super::UniformGrid).
///
/// When deserialized without an `origin`, the grid is centered on the world
/// origin for whatever `cell_size` and `grid_size` were given.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(from = "RawGridConfig")]
pub struct GridConfig {
    /// Edge length of one cell per axis.
    pub cell_size: Vec3,
    /// Number of cells per axis.
    pub grid_size: UVec3,
    /// World-space minimum corner of the grid volume.
    pub origin: Vec3,
    pub max_threads: usize,
    pub min_batch_size: usize,
    /// Pass duration above which a warning is logged.
    pub frame_budget_ms: f32,
}

impl Default for GridConfig {
    fn default() -> Self {
        let cell_size = Vec3::splat(300.0);
        let grid_size = UVec3::new(20, 20, 1);
        Self {
            origin: -cell_size * grid_size.as_vec3() * 0.5,
            cell_size,
            grid_size,
            max_threads: std::thread::available_parallelism()
                .map(|n| n.get())
                .unwrap_or(1),
            min_batch_size: 100,
            frame_budget_ms: 4.0,
        }
    }
}

/// Serialized form; a missing origin means "centered".
#[derive(Deserialize)]
#[serde(default)]
struct RawGridConfig {
    cell_size: Vec3,
    grid_size: UVec3,
    origin: Option<Vec3>,
    max_threads: usize,
    min_batch_size: usize,
    frame_budget_ms: f32,
}

impl Default for RawGridConfig {
    fn default() -> Self {
        let defaults = GridConfig::default();
        Self {
            cell_size: defaults.cell_size,
            grid_size: defaults.grid_size,
            origin: None,
            max_threads: defaults.max_threads,
            min_batch_size: defaults.min_batch_size,
            frame_budget_ms: defaults.frame_budget_ms,
        }
    }
}

impl From<RawGridConfig> for GridConfig {
    fn from(raw: RawGridConfig) -> Self {
        Self {
            origin: raw
                .origin
                .unwrap_or_else(|| -raw.cell_size * raw.grid_size.as_vec3() * 0.5),
            cell_size: raw.cell_size,
            grid_size: raw.grid_size,
            max_threads: raw.max_threads,
            min_batch_size: raw.min_batch_size,
            frame_budget_ms: raw.frame_budget_ms,
        }
    }
}

impl GridConfig {
    /// Grid of `grid_size` cells centered on `center`.
    pub fn centered(center: Vec3, cell_size: Vec3, grid_size: UVec3) -> Self {
        Self {
            origin: center - cell_size * grid_size.as_vec3() * 0.5,
            cell_size,
            grid_size,
            ..Self::default()
        }
    }

    /// Smallest grid of `cell_size` cells covering `[min, max]`.
    pub fn from_bounds(min: Vec3, max: Vec3, cell_size: Vec3) -> Self {
        let extent = (max - min).max(Vec3::ZERO);
        let cells = (extent / cell_size.max(Vec3::splat(MIN_CELL_SIZE))).ceil().max(Vec3::ONE);
        Self {
            origin: min,
            cell_size,
            grid_size: cells.as_uvec3(),
            ..Self::default()
        }
    }

    pub fn with_threads(mut self, max_threads: usize, min_batch_size: usize) -> Self {
        self.max_threads = max_threads;
        self.min_batch_size = min_batch_size;
        self
    }

    pub fn cell_count(&self) -> u64 {
        self.grid_size.x as u64 * self.grid_size.y as u64 * self.grid_size.z as u64
    }

    pub fn bounds_max(&self) -> Vec3 {
        self.origin + self.cell_size * self.grid_size.as_vec3()
    }

    pub fn validate(&self) -> Result<(), GridError> {
        for (axis, value) in [('x', self.cell_size.x), ('y', self.cell_size.y), ('z', self.cell_size.z)] {
            if !value.is_finite() || value < MIN_CELL_SIZE {
                return Err(GridError::InvalidCellSize { axis, value });
            }
        }

        let UVec3 { x, y, z } = self.grid_size;
        if x == 0 || y == 0 || z == 0 {
            return Err(GridError::InvalidGridSize { x, y, z });
        }

        let cells = self.cell_count();
        if cells > MAX_CELLS {
            return Err(GridError::TooManyCells { cells });
        }

        if !self.origin.is_finite() {
            return Err(GridError::InvalidOrigin);
        }

        if self.max_threads == 0 {
            return Err(GridError::InvalidThreads {
                max_threads: self.max_threads,
            });
        }

        if self.min_batch_size == 0 {
            return Err(GridError::InvalidBatchSize);
        }

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_is_valid() {
        let config = GridConfig::default();
        config.validate().unwrap();
        assert_eq!(config.cell_count(), 400);
        assert_eq!(config.origin, Vec3::new(-3000.0, -3000.0, -150.0));
    }

    #[test]
    fn from_bounds_covers_volume() {
        let config = GridConfig::from_bounds(Vec3::ZERO, Vec3::splat(10.0), Vec3::ONE);
        assert_eq!(config.grid_size, UVec3::splat(10));
        assert_eq!(config.bounds_max(), Vec3::splat(10.0));

        let config = GridConfig::from_bounds(Vec3::ZERO, Vec3::new(10.5, 1.0, 1.0), Vec3::ONE);
        assert_eq!(config.grid_size.x, 11);
    }

    #[test]
    fn rejects_bad_values() {
        let mut config = GridConfig::default();
        config.cell_size.y = 0.0;
        assert!(matches!(
            config.validate(),
            Err(GridError::InvalidCellSize { axis: 'y', .. })
        ));

        let mut config = GridConfig::default();
        config.grid_size = UVec3::new(4, 0, 4);
        assert!(matches!(config.validate(), Err(GridError::InvalidGridSize { .. })));

        let mut config = GridConfig::default();
        config.grid_size = UVec3::splat(1 << 10);
        assert!(matches!(config.validate(), Err(GridError::TooManyCells { .. })));

        let config = GridConfig::default().with_threads(0, 10);
        assert!(matches!(config.validate(), Err(GridError::InvalidThreads { .. })));
    }

    #[test]
    fn deserializes_partial_json() {
        let config: GridConfig =
            serde_json::from_str(r#"{ "cell_size": [2.0, 2.0, 4.0], "grid_size": [8, 8, 2] }"#)
                .unwrap();
        assert_eq!(config.cell_size, Vec3::new(2.0, 2.0, 4.0));
        assert_eq!(config.min_batch_size, 100);
        assert_eq!(config.origin, Vec3::new(-8.0, -8.0, -4.0));
        assert_eq!(config.bounds_max(), Vec3::new(8.0, 8.0, 4.0));
    }

    #[test]
    fn explicit_origin_is_kept() {
        let config: GridConfig =
            serde_json::from_str(r#"{ "grid_size": [4, 4, 1], "origin": [1.0, 2.0, 3.0] }"#).unwrap();
        assert_eq!(config.origin, Vec3::new(1.0, 2.0, 3.0));

        let round_trip: GridConfig = serde_json::from_str(&serde_json::to_string(&config).unwrap()).unwrap();
        assert_eq!(round_trip, config);
    }
}
