//! Frame driver tying the grid, worker pool, passes and async queue together.
//!
//! A frame is `update` (registration) followed by any number of queries,
//! then `avoid`, then `pump` for async sweeps and `finish_frame`.

use crate::avoidance::{AvoidancePass, AvoidanceSummary};
use crate::debug::{DebugShape, DebugSink, DebugStyle, NullSink};
use crate::grid::{EntryShape, GridConfig, GridEntry, GridError, Layer, RegistrationSummary, UniformGrid};
use crate::parallel::BatchPlan;
use crate::query::{AsyncQueries, QueryOptions, QueryOutcome, Sector, Sphere, Sweep, SweepCallback};
use crate::store::{EntityStore, ObstacleKind, ObstacleShape, Population};
use horde_metrics::{PassCounters, PassTimings};
use std::sync::Arc;
use std::time::Duration;

/// Counter names reported per frame.
pub const COUNTERS: &[&str] = &[
    "cleared_cells",
    "entries",
    "skipped",
    "queries",
    "agent_neighbors",
    "obstacle_neighbors",
];

pub struct NeighborGrid {
    grid: Arc<UniformGrid>,
    pool: rayon::ThreadPool,
    debug: Arc<dyn DebugSink>,
    timings: PassTimings,
    counters: PassCounters,
    async_queries: AsyncQueries,
    budget: Duration,
    frame: u64,
}

impl NeighborGrid {
    pub fn new(config: GridConfig, debug: Arc<dyn DebugSink>) -> Result<Self, GridError> {
        config.validate()?;
        let pool = rayon::ThreadPoolBuilder::new()
            .num_threads(config.max_threads)
            .thread_name(|index| format!("horde-worker-{index}"))
            .build()?;
        let budget = Duration::from_secs_f32(config.frame_budget_ms.max(0.0) / 1000.0);
        let grid = Arc::new(UniformGrid::new(config, debug.clone())?);

        Ok(Self {
            grid,
            pool,
            debug,
            timings: PassTimings::default(),
            counters: PassCounters::new(COUNTERS),
            async_queries: AsyncQueries::new(),
            budget,
            frame: 0,
        })
    }

    pub fn without_debug(config: GridConfig) -> Result<Self, GridError> {
        Self::new(config, Arc::new(NullSink))
    }

    pub fn grid(&self) -> &UniformGrid {
        &self.grid
    }

    pub fn config(&self) -> &GridConfig {
        self.grid.config()
    }

    pub fn pool(&self) -> &rayon::ThreadPool {
        &self.pool
    }

    pub fn timings(&self) -> &PassTimings {
        &self.timings
    }

    pub fn counters(&self) -> &PassCounters {
        &self.counters
    }

    pub fn frame(&self) -> u64 {
        self.frame
    }


    /// Rebuild the grid for this frame from `population`.
    ///
    /// Refreshes each agent's avoidance snapshot, clears last frame's
    /// transient cells and registers agents, dynamic obstacles and any
    /// static obstacle not yet in the grid.
    pub fn update(&mut self, population: &mut Population) -> Result<RegistrationSummary, GridError> {
        let config = self.grid.config().clone();
        let debug = self.debug.clone();
        let pool = &self.pool;
        let grid = exclusive(&mut self.grid, &self.async_queries)?;

        let summary = horde_metrics::time_pass!(self.timings, "register", {
            pool.install(|| register(grid, population, &config, debug.as_ref()))
        });

        self.counters.add("cleared_cells", summary.cleared_cells);
        self.counters.add("entries", summary.entries);
        self.counters.add("skipped", summary.skipped);
        if summary.skipped > 0 {
            tracing::warn!(skipped = summary.skipped, "entities outside the grid were not registered");
        }
        tracing::debug!(frame = self.frame, ?summary, "grid updated");
        Ok(summary)
    }

    /// Compute `motion.avoiding_velocity` for every agent.
    pub fn avoid(&mut self, population: &mut Population, time_step: f32) -> AvoidanceSummary {
        let grid: &UniformGrid = &self.grid;
        let pool = &self.pool;
        let summary = horde_metrics::time_pass!(self.timings, "avoid", {
            pool.install(|| AvoidancePass::new(grid).run(population, time_step))
        });
        self.counters.add("agent_neighbors", summary.agent_neighbors);
        self.counters.add("obstacle_neighbors", summary.obstacle_neighbors);
        summary
    }

    pub fn sphere_query<S: EntityStore + ?Sized>(
        &self,
        store: &S,
        sphere: &Sphere,
        options: &QueryOptions<'_>,
    ) -> QueryOutcome {
        self.counters.add("queries", 1);
        self.grid.sphere_query(store, sphere, options)
    }

    pub fn sweep_query<S: EntityStore + ?Sized>(
        &self,
        store: &S,
        sweep: &Sweep,
        options: &QueryOptions<'_>,
    ) -> QueryOutcome {
        self.counters.add("queries", 1);
        self.grid.sweep_query(store, sweep, options)
    }

    pub fn sector_query<S: EntityStore + ?Sized>(
        &self,
        store: &S,
        sector: &Sector,
        options: &QueryOptions<'_>,
    ) -> QueryOutcome {
        self.counters.add("queries", 1);
        self.grid.sector_query(store, sector, options)
    }

    /// Start a sweep whose geometry runs on the pool. `callback` fires
    /// during a later [`NeighborGrid::pump`].
    pub fn sweep_async(&self, sweep: Sweep, options: &QueryOptions<'_>, callback: SweepCallback) {
        self.counters.add("queries", 1);
        self.async_queries
            .sweep(&self.pool, self.grid.clone(), sweep, options, callback);
    }

    /// Finish completed async sweeps on the calling (owner) thread.
    pub fn pump<S: EntityStore + ?Sized>(&self, store: &S) -> usize {
        self.async_queries.pump(store)
    }

    /// Drop every static obstacle and mark their records for registration
    /// on the next update.
    pub fn clear_static_obstacles(&mut self, population: &mut Population) -> Result<(), GridError> {
        exclusive(&mut self.grid, &self.async_queries)?.clear_static_obstacles();
        population.reset_static_registration();
        Ok(())
    }

    /// Close the frame: log pass timings, warn when over budget, reset
    /// per-frame counters. Returns the summed pass time.
    pub fn finish_frame(&mut self) -> Duration {
        let total: Duration = self
            .timings
            .iter()
            .map(|(pass, _)| self.timings.last(pass))
            .sum();
        horde_metrics::metrics! {
            for (pass, elapsed) in self.timings.iter() {
                tracing::trace!(pass, ?elapsed, average = ?self.timings.average(pass), "pass timing");
            }
        }
        if !self.budget.is_zero() && total > self.budget {
            tracing::warn!(frame = self.frame, ?total, budget = ?self.budget, "grid passes over frame budget");
        }
        tracing::debug!(
            frame = self.frame,
            ?total,
            counters = ?self.counters.iter().collect::<Vec<_>>(),
            "frame finished"
        );
        self.counters.reset();
        self.frame += 1;
        total
    }
}

impl std::fmt::Debug for NeighborGrid {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("NeighborGrid")
            .field("grid", &self.grid)
            .field("threads", &self.pool.current_num_threads())
            .field("frame", &self.frame)
            .finish()
    }
}

/// Exclusive access to the grid once every background sweep has let go.
fn exclusive<'g>(grid: &'g mut Arc<UniformGrid>, queries: &AsyncQueries) -> Result<&'g mut UniformGrid, GridError> {
    queries.wait_idle();
    let holders = Arc::strong_count(grid) - 1;
    Arc::get_mut(grid).ok_or(GridError::GridInUse { holders })
}

/// Registration body, run inside the worker pool.
fn register(
    grid: &mut UniformGrid,
    population: &mut Population,
    config: &GridConfig,
    debug: &dyn DebugSink,
) -> RegistrationSummary {
    let agent_plan = BatchPlan::new(population.agents().len(), config.max_threads, config.min_batch_size);
    agent_plan.for_each_mut(population.agents_mut(), |agent| agent.sync_avoidance());

    let pass = grid.begin_registration();

    agent_plan.for_each(population.agents(), |agent| {
        let radius = agent.grid_radius();
        pass.register_agent(GridEntry::sphere(agent.handle, agent.position, radius), agent.multi_cell);
        if agent.draw_debug {
            debug.submit(DebugShape::Sphere {
                center: agent.position,
                radius,
                style: DebugStyle::new(DebugStyle::GREEN),
            });
        }
    });

    let obstacle_plan = BatchPlan::new(population.obstacles().len(), config.max_threads, config.min_batch_size);
    obstacle_plan.for_each_mut(population.obstacles_mut(), |obstacle| {
        if obstacle.excluded {
            return;
        }
        let layer = match obstacle.kind {
            ObstacleKind::Dynamic => Layer::Obstacles,
            ObstacleKind::Static if obstacle.registered => return,
            ObstacleKind::Static => Layer::StaticObstacles,
        };

        let entry = GridEntry::sphere(obstacle.handle, obstacle.position, obstacle.radius())
            .with_channels(obstacle.channels);
        match &obstacle.shape {
            ObstacleShape::Sphere { .. } => pass.register_sphere_obstacle(entry, layer),
            ObstacleShape::Edge(edge) => pass.register_edge_obstacle(
                GridEntry {
                    shape: EntryShape::Edge(*edge),
                    ..entry
                },
                layer,
            ),
        }
        if obstacle.kind == ObstacleKind::Static {
            obstacle.registered = true;
        }

        if obstacle.draw_debug {
            debug.submit(DebugShape::Sphere {
                center: obstacle.position,
                radius: obstacle.radius(),
                style: DebugStyle::new(DebugStyle::ORANGE),
            });
        }
    });

    pass.finish()
}
