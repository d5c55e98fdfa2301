//! Uniform neighbor grid.
//!
//! - [`GridCell`]: lock-guarded bucket of [`GridEntry`] values
//! - [`UniformGrid`]: the 3D cell array and coordinate conversion
//! - [`RegistrationPass`]: concurrent per-frame population of the grid

mod cell;
mod config;
mod register;
mod uniform;

pub use cell::{EdgeData, EntryShape, GridCell, GridEntry, INLINE_ENTRIES};
pub use config::{GridConfig, GridError, MAX_CELLS, MIN_CELL_SIZE};
pub use register::{RegistrationPass, RegistrationSummary};
pub use uniform::{Layer, UniformGrid};

pub(crate) use register::distance_sq_to_segment_2d;
