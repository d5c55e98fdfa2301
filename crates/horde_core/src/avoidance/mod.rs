//! Local collision avoidance.
//!
//! Each agent builds one half-plane constraint per neighbor (the set of
//! velocities that stay collision-free over a look-ahead horizon) and picks
//! the velocity closest to its preferred one that satisfies them. The
//! solver is a pure function of neighbor snapshots; [`AvoidancePass`]
//! gathers the snapshots from the grid and runs it for every agent.

mod line;
mod lp;
mod pass;
mod solver;

pub use line::OrcaLine;
pub use pass::{AvoidancePass, AvoidanceSummary};
pub use solver::{compute_avoiding_velocity, AgentNeighbor, AvoidingAgent, ObstacleNeighbor};

use crate::traits::{AvoidanceGroup, AvoidanceGroups};
use glam::Vec2;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Debug, Error, PartialEq)]
pub enum AvoidanceConfigError {
    #[error("radius multiplier must be positive, got {0}")]
    InvalidRadiusMultiplier(f32),

    #[error("trace distance must be non-negative, got {0}")]
    InvalidTraceDistance(f32),

    #[error("{which} time horizon must be positive, got {value}")]
    InvalidTimeHorizon { which: &'static str, value: f32 },
}

/// Per-agent avoidance settings.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct AvoidanceConfig {
    pub enabled: bool,
    /// Inflates the grid radius for avoidance only.
    pub radius_multiplier: f32,
    /// Extra horizontal reach when searching for agent neighbors.
    pub trace_distance: f32,
    pub max_neighbors: usize,
    pub time_horizon_agent: f32,
    pub time_horizon_obstacle: f32,
    /// Group this agent belongs to, if any.
    pub group: Option<AvoidanceGroup>,
    /// Agents in these groups are not avoided.
    pub ignore_groups: AvoidanceGroups,
}

impl Default for AvoidanceConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            radius_multiplier: 1.0,
            trace_distance: 150.0,
            max_neighbors: 10,
            time_horizon_agent: 1.0,
            time_horizon_obstacle: 0.1,
            group: None,
            ignore_groups: AvoidanceGroups::NONE,
        }
    }
}

impl AvoidanceConfig {
    pub fn validate(&self) -> Result<(), AvoidanceConfigError> {
        if !(self.radius_multiplier.is_finite() && self.radius_multiplier > 0.0) {
            return Err(AvoidanceConfigError::InvalidRadiusMultiplier(self.radius_multiplier));
        }
        if !(self.trace_distance.is_finite() && self.trace_distance >= 0.0) {
            return Err(AvoidanceConfigError::InvalidTraceDistance(self.trace_distance));
        }
        for (which, value) in [
            ("agent", self.time_horizon_agent),
            ("obstacle", self.time_horizon_obstacle),
        ] {
            if !(value.is_finite() && value > 0.0) {
                return Err(AvoidanceConfigError::InvalidTimeHorizon { which, value });
            }
        }
        Ok(())
    }
}

/// Planar snapshot other agents read during the avoidance pass.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct AvoidanceState {
    pub position: Vec2,
    /// Grid radius times the radius multiplier.
    pub radius: f32,
    pub velocity: Vec2,
    /// False while launched or knocked back; others then take full
    /// responsibility for avoiding this agent.
    pub can_avoid: bool,
}
