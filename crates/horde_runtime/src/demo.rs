//! Crowd scene driven through the neighbor grid.
//!
//! Agents start on a ring and walk to the opposite side, around a few
//! sphere obstacles and a square wall in the middle. Each frame also
//! issues the kinds of queries gameplay code would: a ranked sphere
//! query, a sector "vision" query and an async sweep.

use crate::settings::Settings;
use anyhow::Result;
use glam::Vec2;
use horde_core::debug::NullSink;
use horde_core::entity::EntityHandle;
use horde_core::query::{QueryOptions, Sector, SortMode, Sphere, Sweep};
use horde_core::store::{AgentRecord, ObstacleKind, ObstacleRecord, Population};
use horde_core::traits::CollisionChannels;
use horde_core::NeighborGrid;
use horde_metrics::FrameTimer;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

/// Totals gathered over a run.
#[derive(Debug, Default, Clone, Copy)]
pub struct RunReport {
    pub frames: u32,
    pub arrived: usize,
    pub sphere_hits: usize,
    pub sector_hits: usize,
    pub async_hits: usize,
}

pub struct Demo {
    settings: Settings,
    driver: NeighborGrid,
    population: Population,
    goals: Vec<(EntityHandle, Vec2)>,
    async_hits: Arc<AtomicUsize>,
}

impl Demo {
    pub fn new(settings: Settings) -> Result<Self> {
        settings.validate()?;
        let driver = NeighborGrid::new(settings.grid.clone(), Arc::new(NullSink))?;
        let mut demo = Self {
            settings,
            driver,
            population: Population::new(),
            goals: Vec::new(),
            async_hits: Arc::new(AtomicUsize::new(0)),
        };
        demo.spawn_scene();
        Ok(demo)
    }

    fn spawn_scene(&mut self) {
        let crowd = &self.settings.crowd;
        let mut rng = StdRng::seed_from_u64(self.settings.simulation.seed);

        for i in 0..crowd.agents {
            let angle = i as f32 / crowd.agents.max(1) as f32 * std::f32::consts::TAU;
            let jitter = Vec2::new(rng.gen_range(-1.0..1.0), rng.gen_range(-1.0..1.0));
            let start = Vec2::from_angle(angle) * crowd.ring_radius + jitter;
            let mut record = AgentRecord::new(start.extend(0.0), crowd.agent_radius);
            record.avoidance_config = crowd.avoidance;
            record.multi_cell = i % 16 == 0;
            let handle = self.population.spawn_agent(record);
            self.goals.push((handle, -start));
        }

        for _ in 0..crowd.sphere_obstacles {
            let position = Vec2::from_angle(rng.gen_range(0.0..std::f32::consts::TAU))
                * rng.gen_range(crowd.ring_radius * 0.3..crowd.ring_radius * 0.7);
            self.population.spawn_obstacle(ObstacleRecord::sphere(
                position.extend(0.0),
                crowd.obstacle_radius,
                ObstacleKind::Static,
            ));
        }

        let half = crowd.ring_radius * 0.1;
        let square = [
            Vec2::new(-half, -half),
            Vec2::new(half, -half),
            Vec2::new(half, half),
            Vec2::new(-half, half),
        ];
        self.population
            .spawn_polygon(&square, 0.0, 4.0, ObstacleKind::Static, CollisionChannels::ALL);

        tracing::info!(
            agents = self.population.agents().len(),
            obstacles = self.population.obstacles().len(),
            "scene spawned"
        );
    }

    pub fn run(&mut self) -> Result<RunReport> {
        let sim = self.settings.simulation.clone();
        let budget = Duration::from_secs_f32(self.settings.grid.frame_budget_ms.max(0.0) / 1000.0);
        let mut timer = FrameTimer::new(120, budget);
        let mut report = RunReport::default();

        for frame in 0..sim.frames {
            timer.begin();
            self.step(sim.time_step, &mut report)?;
            timer.end();
            if timer.over_budget() {
                tracing::debug!(frame, frame_ms = timer.frame_time_ms(), "frame over budget");
            }

            if sim.report_every > 0 && (frame + 1) % sim.report_every == 0 {
                let (min_ms, max_ms) = timer.frame_time_range_ms();
                tracing::info!(
                    frame = frame + 1,
                    fps = timer.fps(),
                    frame_ms = timer.frame_time_ms(),
                    min_ms,
                    max_ms,
                    register_ms = self.driver.timings().average("register").as_secs_f64() * 1000.0,
                    avoid_ms = self.driver.timings().average("avoid").as_secs_f64() * 1000.0,
                    "progress"
                );
            }
            report.frames += 1;
        }

        // Let the last async sweeps land.
        self.driver.update(&mut self.population)?;
        self.driver.pump(&self.population);

        report.async_hits = self.async_hits.load(Ordering::Relaxed);
        report.arrived = self
            .goals
            .iter()
            .filter(|(handle, goal)| {
                self.population
                    .agent(*handle)
                    .is_some_and(|agent| agent.position.truncate().distance(*goal) < 1.0)
            })
            .count();
        Ok(report)
    }

    fn step(&mut self, dt: f32, report: &mut RunReport) -> Result<()> {
        let speed = self.settings.crowd.speed;
        for &(handle, goal) in &self.goals {
            if let Some(agent) = self.population.agent_mut(handle) {
                let to_goal = goal - agent.position.truncate();
                let desired = to_goal.normalize_or_zero() * speed.min(to_goal.length() / dt);
                agent.motion.desired_velocity = desired.extend(0.0);
            }
        }

        self.driver.update(&mut self.population)?;
        self.pump_async();
        self.issue_queries(report);
        self.driver.avoid(&mut self.population, dt);

        for agent in self.population.agents_mut() {
            let velocity = agent.motion.avoiding_velocity;
            agent.position += (velocity * dt).extend(0.0);
            agent.motion.current_velocity = velocity.extend(0.0);
        }

        self.driver.finish_frame();
        Ok(())
    }

    fn pump_async(&self) {
        let finished = self.driver.pump(&self.population);
        if finished > 0 {
            tracing::trace!(finished, "async sweeps finished");
        }
    }

    /// Queries from the first agent's point of view.
    fn issue_queries(&self, report: &mut RunReport) {
        let Some(&(scout, goal)) = self.goals.first() else {
            return;
        };
        let Some(agent) = self.population.agent(scout) else {
            return;
        };
        let position = agent.position;
        let ignore = [scout];

        let nearby = QueryOptions::sorted(SortMode::NearToFar, position)
            .keep(5)
            .ignoring(&ignore);
        let outcome = self
            .driver
            .sphere_query(&self.population, &Sphere::new(position, 8.0), &nearby);
        report.sphere_hits += outcome.results.len();

        let forward = (goal.extend(0.0) - position).normalize_or_zero();
        let vision = Sector::new(position, 20.0, 4.0, forward, 90.0);
        let seen = self
            .driver
            .sector_query(&self.population, &vision, &QueryOptions::default().ignoring(&ignore));
        report.sector_hits += seen.results.len();

        let hits = self.async_hits.clone();
        let sweep = Sweep::new(position, position + forward * 15.0, 1.0);
        self.driver.sweep_async(
            sweep,
            &QueryOptions::sorted(SortMode::NearToFar, position).keep(1).ignoring(&ignore),
            Box::new(move |hit, _results| {
                if hit {
                    hits.fetch_add(1, Ordering::Relaxed);
                }
            }),
        );
    }
}
