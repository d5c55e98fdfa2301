//! Neighbor gathering and the parallel avoidance pass.

use super::solver::{compute_avoiding_velocity, AgentNeighbor, AvoidingAgent, ObstacleNeighbor};
use crate::entity::EntityHandle;
use crate::grid::{EntryShape, Layer, UniformGrid};
use crate::parallel::BatchPlan;
use crate::store::{left_of, AgentRecord, EntityStore, Population};
use crate::traits::{TraitFilter, TraitMask};
use glam::{Vec2, Vec3};
use rayon::prelude::*;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// Totals for one pass.
#[derive(Debug, Default, Clone, Copy, PartialEq, Eq)]
pub struct AvoidanceSummary {
    pub agents: usize,
    pub solved: usize,
    pub agent_neighbors: usize,
    pub obstacle_neighbors: usize,
}

/// Outcome of one agent's solve.
#[derive(Debug, Default, Clone, Copy)]
struct Solved {
    velocity: Vec2,
    agent_neighbors: usize,
    obstacle_neighbors: usize,
}

#[derive(Debug, Clone, Copy)]
struct Candidate {
    dist_sq: f32,
    hash: u32,
    entity: EntityHandle,
}

impl Ord for Candidate {
    fn cmp(&self, other: &Self) -> Ordering {
        self.dist_sq
            .total_cmp(&other.dist_sq)
            .then(self.hash.cmp(&other.hash))
    }
}

impl PartialOrd for Candidate {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Candidate {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Candidate {}

/// Reads the grid and agent snapshots, writes each agent's
/// `motion.avoiding_velocity`.
pub struct AvoidancePass<'a> {
    grid: &'a UniformGrid,
}

impl<'a> AvoidancePass<'a> {
    pub fn new(grid: &'a UniformGrid) -> Self {
        Self { grid }
    }

    /// Solve every agent on the current rayon pool.
    ///
    /// Velocities are computed from a read-only view of the population and
    /// written back afterwards, so no agent sees another's new velocity
    /// within the same pass.
    pub fn run(&self, population: &mut Population, time_step: f32) -> AvoidanceSummary {
        let config = self.grid.config();
        let count = population.agents().len();
        let plan = BatchPlan::new(count, config.max_threads, config.min_batch_size);

        let solved: Vec<Solved> = {
            let view: &Population = population;
            view.agents()
                .par_iter()
                .with_min_len(plan.batch_size)
                .map(|agent| self.solve(view, agent, time_step))
                .collect()
        };

        population
            .agents_mut()
            .par_iter_mut()
            .with_min_len(plan.batch_size)
            .zip(solved.par_iter())
            .for_each(|(agent, solved)| agent.motion.avoiding_velocity = solved.velocity);

        let summary = solved.iter().fold(
            AvoidanceSummary {
                agents: count,
                ..AvoidanceSummary::default()
            },
            |mut summary, solved| {
                summary.agent_neighbors += solved.agent_neighbors;
                summary.obstacle_neighbors += solved.obstacle_neighbors;
                summary
            },
        );
        let summary = AvoidanceSummary {
            solved: population
                .agents()
                .iter()
                .filter(|a| a.avoidance_config.enabled)
                .count(),
            ..summary
        };
        tracing::trace!(?summary, threads = plan.threads, "avoidance pass finished");
        summary
    }

    fn solve(&self, population: &Population, agent: &AgentRecord, time_step: f32) -> Solved {
        let desired = agent.motion.desired_velocity.truncate();
        let config = &agent.avoidance_config;
        if !config.enabled {
            return Solved {
                velocity: desired,
                ..Solved::default()
            };
        }

        let hash = agent.handle.grid_hash();
        let state = &agent.avoidance;
        let neighbors = self.agent_neighbors(population, agent, hash);
        let mut avoiding = AvoidingAgent {
            position: state.position,
            radius: state.radius,
            velocity: state.velocity,
            desired_velocity: desired,
            max_speed: desired.length(),
            time_horizon_agent: config.time_horizon_agent,
            time_horizon_obstacle: config.time_horizon_obstacle,
            hash,
        };
        let velocity = compute_avoiding_velocity(&avoiding, &neighbors, &[], time_step);

        // Second solve against obstacles, starting from the agent-only result.
        avoiding.max_speed = if agent.motion.pushed_back {
            velocity.length().max(agent.motion.push_back_speed)
        } else {
            velocity.length()
        };
        avoiding.desired_velocity = velocity;
        avoiding.velocity = velocity;
        let (spheres, edges) = self.obstacle_neighbors(population, agent, avoiding.max_speed);
        let velocity = compute_avoiding_velocity(&avoiding, &spheres, &edges, time_step);

        Solved {
            velocity,
            agent_neighbors: neighbors.len(),
            obstacle_neighbors: spheres.len() + edges.len(),
        }
    }

    /// The nearest `max_neighbors` agents within the trace distance.
    fn agent_neighbors(&self, population: &Population, agent: &AgentRecord, hash: u32) -> Vec<AgentNeighbor> {
        let config = &agent.avoidance_config;
        if config.max_neighbors == 0 {
            return Vec::new();
        }
        let radius = agent.avoidance.radius;
        let reach = config.trace_distance + radius;
        let reach_sq = reach * reach;
        let extent = Vec3::new(reach, reach, radius);

        let mut filter = TraitFilter::ANY
            .including(TraitMask::AGENT)
            .excluding(config.ignore_groups.trait_mask());
        if agent.traits.contains(TraitMask::DYING) {
            // Dying agents only avoid each other.
            filter = filter.including(TraitMask::DYING);
        }

        let mut seen = hashbrown::HashSet::new();
        let mut nearest: BinaryHeap<Candidate> = BinaryHeap::with_capacity(config.max_neighbors + 1);

        for coord in self
            .grid
            .coords_in_box(agent.position - extent, agent.position + extent)
        {
            for entry in self.grid.entries(Layer::Agents, coord) {
                if entry.hash == hash {
                    continue;
                }
                let dist_sq = agent.position.distance_squared(entry.position);
                if dist_sq > reach_sq || !seen.insert(entry.hash) {
                    continue;
                }
                if !population.matches(entry.entity, &filter) {
                    continue;
                }
                let candidate = Candidate {
                    dist_sq,
                    hash: entry.hash,
                    entity: entry.entity,
                };
                if nearest.len() < config.max_neighbors {
                    nearest.push(candidate);
                } else if nearest.peek().is_some_and(|worst| candidate < *worst) {
                    nearest.pop();
                    nearest.push(candidate);
                }
            }
        }

        nearest
            .into_sorted_vec()
            .into_iter()
            .filter_map(|candidate| {
                let other = population.agent(candidate.entity)?;
                Some(AgentNeighbor {
                    position: other.avoidance.position,
                    radius: other.avoidance.radius,
                    velocity: other.avoidance.velocity,
                    can_avoid: other.avoidance.can_avoid,
                    hash: candidate.hash,
                })
            })
            .collect()
    }

    /// Sphere obstacles and the edges whose right-hand side the agent is on,
    /// within reach of one obstacle horizon.
    fn obstacle_neighbors(
        &self,
        population: &Population,
        agent: &AgentRecord,
        max_speed: f32,
    ) -> (Vec<AgentNeighbor>, Vec<ObstacleNeighbor>) {
        let radius = agent.avoidance.radius;
        let reach = agent.avoidance_config.time_horizon_obstacle * max_speed + radius;
        let extent = Vec3::new(reach, reach, radius);
        let position = agent.position.truncate();
        let low = agent.position.z - radius;
        let high = agent.position.z + radius;

        let mut seen = hashbrown::HashSet::new();
        let mut spheres = Vec::new();
        let mut edges = Vec::new();

        for layer in Layer::OBSTACLES {
            for coord in self
                .grid
                .coords_in_box(agent.position - extent, agent.position + extent)
            {
                for entry in self.grid.entries(layer, coord) {
                    if !seen.insert(entry.hash) || !population.is_valid(entry.entity) {
                        continue;
                    }
                    match &entry.shape {
                        EntryShape::Sphere => spheres.push(AgentNeighbor::sphere_obstacle(
                            entry.position.truncate(),
                            entry.radius,
                            entry.hash,
                        )),
                        EntryShape::Edge(edge) => {
                            let half_height = edge.height * 0.5;
                            if high < entry.position.z - half_height || low > entry.position.z + half_height {
                                continue;
                            }
                            let start = entry.position.truncate();
                            if left_of(start, edge.end, position) < 0.0 {
                                edges.push(ObstacleNeighbor::from_edge(start, edge));
                            }
                        }
                    }
                }
            }
        }
        (spheres, edges)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debug::NullSink;
    use crate::grid::{GridConfig, GridEntry};
    use crate::store::{ObstacleKind, ObstacleRecord};
    use crate::traits::{AvoidanceGroup, AvoidanceGroups, CollisionChannels};
    use glam::UVec3;
    use std::sync::Arc;

    fn grid() -> UniformGrid {
        let config = GridConfig {
            cell_size: Vec3::splat(2.0),
            grid_size: UVec3::new(20, 20, 1),
            origin: Vec3::new(-20.0, -20.0, -1.0),
            ..GridConfig::default()
        }
        .with_threads(4, 1);
        UniformGrid::new(config, Arc::new(NullSink)).unwrap()
    }

    fn walker(population: &mut Population, position: Vec3, velocity: Vec3) -> EntityHandle {
        let mut record = AgentRecord::new(position, 0.5);
        record.motion.desired_velocity = velocity;
        record.motion.current_velocity = velocity;
        record.avoidance_config.trace_distance = 3.0;
        population.spawn_agent(record)
    }

    fn register(grid: &mut UniformGrid, population: &Population) {
        let pass = grid.begin_registration();
        for agent in population.agents() {
            pass.register_agent(GridEntry::sphere(agent.handle, agent.position, agent.grid_radius()), false);
        }
        for obstacle in population.obstacles() {
            let entry = GridEntry::sphere(obstacle.handle, obstacle.position, obstacle.radius())
                .with_channels(obstacle.channels);
            match &obstacle.shape {
                crate::store::ObstacleShape::Sphere { .. } => pass.register_sphere_obstacle(entry, Layer::Obstacles),
                crate::store::ObstacleShape::Edge(edge) => {
                    let mut entry = entry;
                    entry.shape = EntryShape::Edge(*edge);
                    pass.register_edge_obstacle(entry, Layer::StaticObstacles)
                }
            }
        }
        pass.finish();
    }

    #[test]
    fn head_on_agents_sidestep() {
        let mut grid = grid();
        let mut population = Population::new();
        let a = walker(&mut population, Vec3::new(-1.0, 0.0, 0.0), Vec3::X);
        let b = walker(&mut population, Vec3::new(1.0, 0.0, 0.0), Vec3::NEG_X);
        register(&mut grid, &population);

        let summary = AvoidancePass::new(&grid).run(&mut population, 0.1);
        assert_eq!(summary.agents, 2);
        assert_eq!(summary.agent_neighbors, 2);

        let va = population.agent(a).unwrap().motion.avoiding_velocity;
        let vb = population.agent(b).unwrap().motion.avoiding_velocity;
        assert!((va.x - 0.75).abs() < 1e-3 && (va.y + 0.433).abs() < 1e-3);
        assert!((vb.x + 0.75).abs() < 1e-3 && (vb.y - 0.433).abs() < 1e-3);
    }

    #[test]
    fn ignored_groups_are_not_avoided() {
        let mut grid = grid();
        let mut population = Population::new();
        let group = AvoidanceGroup::new(2);

        let mut record = AgentRecord::new(Vec3::new(-1.0, 0.0, 0.0), 0.5);
        record.motion.desired_velocity = Vec3::X;
        record.motion.current_velocity = Vec3::X;
        record.avoidance_config.ignore_groups = AvoidanceGroups::NONE.with(group);
        let a = population.spawn_agent(record);

        let mut record = AgentRecord::new(Vec3::new(1.0, 0.0, 0.0), 0.5);
        record.avoidance_config.group = Some(group);
        population.spawn_agent(record);
        register(&mut grid, &population);

        AvoidancePass::new(&grid).run(&mut population, 0.1);
        assert_eq!(population.agent(a).unwrap().motion.avoiding_velocity, Vec2::X);
    }

    #[test]
    fn neighbor_count_is_capped() {
        let mut grid = grid();
        let mut population = Population::new();
        let center = walker(&mut population, Vec3::ZERO, Vec3::X);
        population.agent_mut(center).unwrap().avoidance_config.max_neighbors = 3;
        for i in 0..8 {
            let angle = i as f32 * std::f32::consts::TAU / 8.0;
            walker(&mut population, Vec3::new(angle.cos(), angle.sin(), 0.0) * 2.0, Vec3::ZERO);
        }
        population.agent_mut(center).unwrap().sync_avoidance();
        register(&mut grid, &population);

        let pass = AvoidancePass::new(&grid);
        let record = population.agent(center).unwrap();
        let neighbors = pass.agent_neighbors(&population, record, center.grid_hash());
        assert_eq!(neighbors.len(), 3);
    }

    #[test]
    fn edges_only_from_their_outer_side() {
        let mut grid = grid();
        let mut population = Population::new();
        // Square around the origin, counter-clockwise.
        let square = [
            Vec2::new(2.0, -2.0),
            Vec2::new(6.0, -2.0),
            Vec2::new(6.0, 2.0),
            Vec2::new(2.0, 2.0),
        ];
        population.spawn_polygon(&square, 0.0, 2.0, ObstacleKind::Static, CollisionChannels::ALL);
        population.spawn_obstacle(ObstacleRecord::sphere(Vec3::new(-1.8, 0.0, 0.0), 0.5, ObstacleKind::Dynamic));
        let agent = walker(&mut population, Vec3::ZERO, Vec3::X * 2.0);
        population.agent_mut(agent).unwrap().avoidance_config.time_horizon_obstacle = 2.0;
        register(&mut grid, &population);

        let pass = AvoidancePass::new(&grid);
        let record = population.agent(agent).unwrap();
        let (spheres, edges) = pass.obstacle_neighbors(&population, record, 10.0);
        assert_eq!(spheres.len(), 1);
        // Only the edge facing the agent (x = 2) sees it on its right.
        assert_eq!(edges.len(), 1);
        assert_eq!(edges[0].point, Vec2::new(2.0, 2.0));

        pass.run(&mut population, 0.1);
        let velocity = population.agent(agent).unwrap().motion.avoiding_velocity;
        assert!(velocity.is_finite());
        // Reaching the wall at x = 2 takes at least one obstacle horizon.
        assert!(velocity.x <= 0.75 + 1e-3);
    }
}
