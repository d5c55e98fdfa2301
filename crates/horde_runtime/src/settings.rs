//! Demo settings

use anyhow::{Context, Result};
use glam::{UVec3, Vec3};
use horde_core::avoidance::AvoidanceConfig;
use horde_core::grid::GridConfig;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Everything the demo reads from its JSON settings file.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct Settings {
    pub grid: GridConfig,
    pub crowd: CrowdSettings,
    pub simulation: SimulationSettings,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct CrowdSettings {
    pub agents: usize,
    pub agent_radius: f32,
    pub speed: f32,
    /// Agents spawn on a ring of this radius and walk to the opposite side.
    pub ring_radius: f32,
    pub sphere_obstacles: usize,
    pub obstacle_radius: f32,
    pub avoidance: AvoidanceConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SimulationSettings {
    pub frames: u32,
    pub time_step: f32,
    pub seed: u64,
    /// Log a timing summary every this many frames.
    pub report_every: u32,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            grid: GridConfig::centered(Vec3::ZERO, Vec3::new(4.0, 4.0, 8.0), UVec3::new(64, 64, 1)),
            crowd: CrowdSettings::default(),
            simulation: SimulationSettings::default(),
        }
    }
}

impl Default for CrowdSettings {
    fn default() -> Self {
        Self {
            agents: 2_000,
            agent_radius: 0.5,
            speed: 2.0,
            ring_radius: 100.0,
            sphere_obstacles: 12,
            obstacle_radius: 3.0,
            avoidance: AvoidanceConfig {
                trace_distance: 6.0,
                time_horizon_agent: 2.0,
                time_horizon_obstacle: 1.0,
                ..AvoidanceConfig::default()
            },
        }
    }
}

impl Default for SimulationSettings {
    fn default() -> Self {
        Self {
            frames: 600,
            time_step: 1.0 / 30.0,
            seed: 42,
            report_every: 60,
        }
    }
}

impl Settings {
    pub fn load(path: &Path) -> Result<Self> {
        let text = std::fs::read_to_string(path)
            .with_context(|| format!("reading settings from {}", path.display()))?;
        let settings: Settings = serde_json::from_str(&text)
            .with_context(|| format!("parsing settings in {}", path.display()))?;
        settings.validate()?;
        Ok(settings)
    }

    pub fn validate(&self) -> Result<()> {
        self.grid.validate()?;
        self.crowd.avoidance.validate()?;
        anyhow::ensure!(
            self.simulation.time_step.is_finite() && self.simulation.time_step > 0.0,
            "time_step must be positive, got {}",
            self.simulation.time_step
        );
        anyhow::ensure!(self.crowd.agent_radius > 0.0, "agent_radius must be positive");
        anyhow::ensure!(
            self.crowd.ring_radius.is_finite() && self.crowd.ring_radius > 0.0,
            "ring_radius must be positive, got {}",
            self.crowd.ring_radius
        );
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn defaults_are_valid() {
        Settings::default().validate().unwrap();
    }

    #[test]
    fn partial_json_fills_defaults() {
        let settings: Settings =
            serde_json::from_str(r#"{ "crowd": { "agents": 10 }, "simulation": { "frames": 5 } }"#).unwrap();
        assert_eq!(settings.crowd.agents, 10);
        assert_eq!(settings.crowd.speed, 2.0);
        assert_eq!(settings.simulation.frames, 5);
        settings.validate().unwrap();
    }

    #[test]
    fn rejects_empty_ring() {
        let mut settings = Settings::default();
        settings.crowd.ring_radius = 0.0;
        let error = settings.validate().unwrap_err();
        assert!(error.to_string().contains("ring_radius"));
    }
}
