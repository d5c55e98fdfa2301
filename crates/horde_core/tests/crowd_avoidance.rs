//! Multi-frame avoidance through the full driver.

#![allow(clippy::unwrap_used)]

use glam::{UVec3, Vec2, Vec3};
use horde_core::grid::GridConfig;
use horde_core::store::{AgentRecord, ObstacleKind, Population};
use horde_core::traits::CollisionChannels;
use horde_core::entity::EntityHandle;
use horde_core::NeighborGrid;

const DT: f32 = 0.1;
const SPEED: f32 = 1.5;
const RADIUS: f32 = 0.5;

fn config() -> GridConfig {
    GridConfig {
        cell_size: Vec3::new(2.0, 2.0, 4.0),
        grid_size: UVec3::new(16, 16, 1),
        origin: Vec3::new(-16.0, -16.0, -2.0),
        ..GridConfig::default()
    }
    .with_threads(4, 2)
}

/// Steer toward `goal`, run avoidance, integrate.
fn step(driver: &mut NeighborGrid, population: &mut Population, goals: &[(EntityHandle, Vec2)]) {
    for &(handle, goal) in goals {
        let agent = population.agent_mut(handle).unwrap();
        let to_goal = goal - agent.position.truncate();
        let speed = SPEED.min(to_goal.length() / DT);
        agent.motion.desired_velocity = (to_goal.normalize_or_zero() * speed).extend(0.0);
    }

    driver.update(population).unwrap();
    driver.avoid(population, DT);

    for agent in population.agents_mut() {
        let velocity = agent.motion.avoiding_velocity;
        agent.position += (velocity * DT).extend(0.0);
        agent.motion.current_velocity = velocity.extend(0.0);
    }
    driver.finish_frame();
}

fn min_separation(population: &Population) -> f32 {
    let agents = population.agents();
    let mut min = f32::MAX;
    for (i, a) in agents.iter().enumerate() {
        for b in &agents[i + 1..] {
            min = min.min(a.position.truncate().distance(b.position.truncate()));
        }
    }
    min
}

fn spawn(population: &mut Population, position: Vec2) -> EntityHandle {
    let mut record = AgentRecord::new(position.extend(0.0), RADIUS);
    record.avoidance_config.trace_distance = 8.0;
    record.avoidance_config.time_horizon_agent = 2.0;
    record.avoidance_config.time_horizon_obstacle = 1.0;
    population.spawn_agent(record)
}

#[test]
fn agents_swapping_across_a_circle_keep_apart() {
    let mut driver = NeighborGrid::without_debug(config()).unwrap();
    let mut population = Population::new();
    let count = 8;
    let goals: Vec<_> = (0..count)
        .map(|i| {
            let angle = i as f32 / count as f32 * std::f32::consts::TAU;
            let start = Vec2::from_angle(angle) * 6.0;
            // Slight offset so the crossing is not perfectly symmetric.
            let goal = -start + start.perp().normalize() * 0.3;
            (spawn(&mut population, start), goal)
        })
        .collect();

    let mut closest = f32::MAX;
    for _ in 0..250 {
        step(&mut driver, &mut population, &goals);
        closest = closest.min(min_separation(&population));
    }

    // Two radii, with slack for the discrete step.
    assert!(closest > 2.0 * RADIUS * 0.9, "agents overlapped: {closest}");
    for &(handle, goal) in &goals {
        let position = population.agent(handle).unwrap().position.truncate();
        assert!(position.distance(goal) < 10.0, "agent stuck at {position}");
    }
}

#[test]
fn agent_is_held_off_a_wall() {
    let mut driver = NeighborGrid::without_debug(config()).unwrap();
    let mut population = Population::new();
    let wall = [
        Vec2::new(3.0, -4.0),
        Vec2::new(5.0, -4.0),
        Vec2::new(5.0, 4.0),
        Vec2::new(3.0, 4.0),
    ];
    population.spawn_polygon(&wall, 0.0, 4.0, ObstacleKind::Static, CollisionChannels::ALL);
    let agent = spawn(&mut population, Vec2::ZERO);
    let goals = [(agent, Vec2::new(10.0, 0.0))];

    for _ in 0..60 {
        step(&mut driver, &mut population, &goals);
        let x = population.agent(agent).unwrap().position.x;
        assert!(x + RADIUS <= 3.0 + 0.05, "agent entered the wall at x = {x}");
    }
}

#[test]
fn disabled_agents_keep_their_desired_velocity() {
    let mut driver = NeighborGrid::without_debug(config()).unwrap();
    let mut population = Population::new();
    let a = spawn(&mut population, Vec2::new(-1.0, 0.0));
    let b = spawn(&mut population, Vec2::new(1.0, 0.0));
    population.agent_mut(a).unwrap().avoidance_config.enabled = false;

    step(&mut driver, &mut population, &[(a, Vec2::new(10.0, 0.0)), (b, Vec2::new(-10.0, 0.0))]);
    assert_eq!(population.agent(a).unwrap().motion.avoiding_velocity, Vec2::new(SPEED, 0.0));
    // B takes its half of the avoidance and slows down.
    let slowed = population.agent(b).unwrap().motion.avoiding_velocity;
    assert!(slowed.x > -SPEED + 0.5, "{slowed}");
}
