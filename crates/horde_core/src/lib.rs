//! Horde Core
//!
//! Spatial neighbor grid for large crowds:
//! - Uniform 3D cell grid, rebuilt in parallel each frame
//! - Sphere, swept-sphere and sector queries (sync and async)
//! - ORCA local avoidance for agents against agents and obstacles
//! - [`NeighborGrid`](neighbor_grid::NeighborGrid) frame driver

pub mod avoidance;
pub mod debug;
pub mod entity;
pub mod grid;
pub mod neighbor_grid;
pub mod parallel;
pub mod query;
pub mod store;
pub mod traits;

pub use glam;
pub use neighbor_grid::NeighborGrid;

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
