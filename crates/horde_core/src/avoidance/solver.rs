//! ORCA half-plane construction and the solve.

use super::line::{det, OrcaLine, RVO_EPSILON};
use super::lp::{linear_program2, linear_program3};
use crate::grid::EdgeData;
use glam::Vec2;

/// Horizons and time steps are clamped to at least this many seconds.
const MIN_TIME: f32 = 1e-4;

/// The agent being solved for.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AvoidingAgent {
    pub position: Vec2,
    pub radius: f32,
    pub velocity: Vec2,
    pub desired_velocity: Vec2,
    pub max_speed: f32,
    pub time_horizon_agent: f32,
    pub time_horizon_obstacle: f32,
    /// Grid hash, for separating coincident agents deterministically.
    pub hash: u32,
}

/// Another agent, or a sphere obstacle (zero velocity, cannot avoid).
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AgentNeighbor {
    pub position: Vec2,
    pub radius: f32,
    pub velocity: Vec2,
    /// Whether the neighbor takes half of the correction.
    pub can_avoid: bool,
    pub hash: u32,
}

impl AgentNeighbor {
    pub fn sphere_obstacle(position: Vec2, radius: f32, hash: u32) -> Self {
        Self {
            position,
            radius,
            velocity: Vec2::ZERO,
            can_avoid: false,
            hash,
        }
    }
}

/// One polygon edge from `point` to `next_point`, with the vertex data of
/// both ends.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ObstacleNeighbor {
    pub point: Vec2,
    /// Unit direction of this edge.
    pub direction: Vec2,
    pub convex: bool,
    pub next_point: Vec2,
    /// Unit direction of the following edge.
    pub next_direction: Vec2,
    pub next_convex: bool,
}

impl ObstacleNeighbor {
    pub fn from_edge(point: Vec2, edge: &EdgeData) -> Self {
        Self {
            point,
            direction: edge.direction,
            convex: edge.convex,
            next_point: edge.end,
            next_direction: edge.next_direction,
            next_convex: edge.next_convex,
        }
    }
}

/// One end of an edge as seen by the obstacle line builder.
#[derive(Debug, Clone, Copy)]
struct Vertex {
    point: Vec2,
    direction: Vec2,
    convex: bool,
}

/// Left leg tangent from the origin to a disc of `radius` around `relative`.
fn left_leg(relative: Vec2, radius: f32, dist_sq: f32) -> Vec2 {
    let leg = (dist_sq - radius * radius).max(0.0).sqrt();
    Vec2::new(
        relative.x * leg - relative.y * radius,
        relative.x * radius + relative.y * leg,
    ) / dist_sq
}

fn right_leg(relative: Vec2, radius: f32, dist_sq: f32) -> Vec2 {
    let leg = (dist_sq - radius * radius).max(0.0).sqrt();
    Vec2::new(
        relative.x * leg + relative.y * radius,
        -relative.x * radius + relative.y * leg,
    ) / dist_sq
}

fn perp(v: Vec2) -> Vec2 {
    Vec2::new(-v.y, v.x)
}

/// Append the constraint of one edge, if it adds anything.
fn push_obstacle_line(agent: &AvoidingAgent, obstacle: &ObstacleNeighbor, lines: &mut Vec<OrcaLine>) {
    let inv_horizon = 1.0 / agent.time_horizon_obstacle.max(MIN_TIME);
    let radius = agent.radius;
    let radius_sq = radius * radius;

    let mut left = Vertex {
        point: obstacle.point,
        direction: obstacle.direction,
        convex: obstacle.convex,
    };
    let mut right = Vertex {
        point: obstacle.next_point,
        direction: obstacle.next_direction,
        convex: obstacle.next_convex,
    };

    let relative1 = left.point - agent.position;
    let relative2 = right.point - agent.position;

    // Already covered by an earlier obstacle line.
    let covered = lines.iter().any(|line| {
        det(relative1 * inv_horizon - line.point, line.direction) - inv_horizon * radius >= -RVO_EPSILON
            && det(relative2 * inv_horizon - line.point, line.direction) - inv_horizon * radius >= -RVO_EPSILON
    });
    if covered {
        return;
    }

    let dist_sq1 = relative1.length_squared();
    let dist_sq2 = relative2.length_squared();
    let edge = right.point - left.point;
    let edge_len_sq = edge.length_squared();
    if edge_len_sq <= f32::EPSILON {
        return;
    }
    let s = (-relative1).dot(edge) / edge_len_sq;
    let dist_sq_line = (-relative1 - edge * s).length_squared();

    if s < 0.0 && dist_sq1 <= radius_sq {
        // Touching the left vertex.
        if left.convex {
            if let Some(direction) = perp(relative1).try_normalize() {
                lines.push(OrcaLine::new(Vec2::ZERO, direction));
            }
        }
        return;
    }
    if s > 1.0 && dist_sq2 <= radius_sq {
        // Touching the right vertex; the next edge handles it unless it
        // faces away.
        if right.convex && det(relative2, right.direction) >= 0.0 {
            if let Some(direction) = perp(relative2).try_normalize() {
                lines.push(OrcaLine::new(Vec2::ZERO, direction));
            }
        }
        return;
    }
    if (0.0..1.0).contains(&s) && dist_sq_line <= radius_sq {
        // Touching the segment.
        lines.push(OrcaLine::new(Vec2::ZERO, -left.direction));
        return;
    }

    let single_vertex;
    let (mut left_leg_direction, mut right_leg_direction);
    if s < 0.0 && dist_sq_line <= radius_sq {
        // Seen obliquely: the left vertex alone defines the obstacle.
        if !left.convex {
            return;
        }
        right = left;
        single_vertex = true;
        left_leg_direction = left_leg(relative1, radius, dist_sq1);
        right_leg_direction = right_leg(relative1, radius, dist_sq1);
    } else if s > 1.0 && dist_sq_line <= radius_sq {
        if !right.convex {
            return;
        }
        left = right;
        single_vertex = true;
        left_leg_direction = left_leg(relative2, radius, dist_sq2);
        right_leg_direction = right_leg(relative2, radius, dist_sq2);
    } else {
        single_vertex = false;
        left_leg_direction = if left.convex {
            left_leg(relative1, radius, dist_sq1)
        } else {
            // Non-convex: the leg extends the cut-off line.
            -left.direction
        };
        right_leg_direction = if right.convex {
            right_leg(relative2, radius, dist_sq2)
        } else {
            left.direction
        };
    }

    // Legs never point into the neighboring edge; velocities projected on
    // such a foreign leg get no constraint.
    let mut left_foreign = false;
    let mut right_foreign = false;
    if left.convex && det(left_leg_direction, -left.direction) >= 0.0 {
        left_leg_direction = -left.direction;
        left_foreign = true;
    }
    if right.convex && det(right_leg_direction, right.direction) <= 0.0 {
        right_leg_direction = right.direction;
        right_foreign = true;
    }

    let left_cutoff = (left.point - agent.position) * inv_horizon;
    let right_cutoff = (right.point - agent.position) * inv_horizon;
    let cutoff = right_cutoff - left_cutoff;
    let velocity = agent.velocity;

    let t = if single_vertex || cutoff.length_squared() <= f32::EPSILON {
        0.5
    } else {
        (velocity - left_cutoff).dot(cutoff) / cutoff.length_squared()
    };
    let t_left = (velocity - left_cutoff).dot(left_leg_direction);
    let t_right = (velocity - right_cutoff).dot(right_leg_direction);

    let cutoff_circle = |center: Vec2, lines: &mut Vec<OrcaLine>| {
        if let Some(unit_w) = (velocity - center).try_normalize() {
            lines.push(OrcaLine::new(
                center + unit_w * (radius * inv_horizon),
                Vec2::new(unit_w.y, -unit_w.x),
            ));
        }
    };

    if (t < 0.0 && t_left < 0.0) || (single_vertex && t_left < 0.0 && t_right < 0.0) {
        cutoff_circle(left_cutoff, lines);
        return;
    }
    if t > 1.0 && t_right < 0.0 {
        cutoff_circle(right_cutoff, lines);
        return;
    }

    let dist_sq_cutoff = if t < 0.0 || t > 1.0 || single_vertex {
        f32::INFINITY
    } else {
        (velocity - (left_cutoff + cutoff * t)).length_squared()
    };
    let dist_sq_left = if t_left < 0.0 {
        f32::INFINITY
    } else {
        (velocity - (left_cutoff + left_leg_direction * t_left)).length_squared()
    };
    let dist_sq_right = if t_right < 0.0 {
        f32::INFINITY
    } else {
        (velocity - (right_cutoff + right_leg_direction * t_right)).length_squared()
    };

    let (anchor, direction) = if dist_sq_cutoff <= dist_sq_left && dist_sq_cutoff <= dist_sq_right {
        (left_cutoff, -left.direction)
    } else if dist_sq_left <= dist_sq_right {
        if left_foreign {
            return;
        }
        (left_cutoff, left_leg_direction)
    } else {
        if right_foreign {
            return;
        }
        (right_cutoff, -right_leg_direction)
    };
    lines.push(OrcaLine::new(anchor + perp(direction) * (radius * inv_horizon), direction));
}

/// Append the reciprocal constraint against one agent-like neighbor.
fn push_agent_line(agent: &AvoidingAgent, other: &AgentNeighbor, time_step: f32, lines: &mut Vec<OrcaLine>) {
    let inv_horizon = 1.0 / agent.time_horizon_agent.max(MIN_TIME);
    let relative_position = other.position - agent.position;
    let relative_velocity = agent.velocity - other.velocity;
    let dist_sq = relative_position.length_squared();
    let combined_radius = agent.radius + other.radius;
    let combined_radius_sq = combined_radius * combined_radius;

    let (direction, u) = if dist_sq > combined_radius_sq {
        // No collision yet.
        let w = relative_velocity - relative_position * inv_horizon;
        let w_length_sq = w.length_squared();
        let dot1 = w.dot(relative_position);

        if dot1 < 0.0 && dot1 * dot1 > combined_radius_sq * w_length_sq {
            // Project on the cut-off circle.
            let w_length = w_length_sq.sqrt();
            let unit_w = w / w_length;
            (
                Vec2::new(unit_w.y, -unit_w.x),
                unit_w * (combined_radius * inv_horizon - w_length),
            )
        } else {
            // Project on the nearer leg.
            let direction = if det(relative_position, w) > 0.0 {
                left_leg(relative_position, combined_radius, dist_sq)
            } else {
                -right_leg(relative_position, combined_radius, dist_sq)
            };
            (direction, direction * relative_velocity.dot(direction) - relative_velocity)
        }
    } else {
        // Already overlapping: resolve within one time step.
        let inv_step = 1.0 / time_step.max(MIN_TIME);
        let w = relative_velocity - relative_position * inv_step;
        let w_length = w.length();
        let unit_w = if w_length > RVO_EPSILON {
            w / w_length
        } else {
            separating_direction(agent, other, relative_position)
        };
        (
            Vec2::new(unit_w.y, -unit_w.x),
            unit_w * (combined_radius * inv_step - w_length),
        )
    };

    let share = if other.can_avoid { 0.5 } else { 1.0 };
    lines.push(OrcaLine::new(agent.velocity + u * share, direction));
}

/// Push direction when the relative velocity gives none: away from the
/// neighbor, or along a hash-ordered axis when the two coincide.
fn separating_direction(agent: &AvoidingAgent, other: &AgentNeighbor, relative_position: Vec2) -> Vec2 {
    if let Some(away) = (-relative_position).try_normalize() {
        return away;
    }
    if agent.hash < other.hash {
        Vec2::NEG_X
    } else {
        Vec2::X
    }
}

/// Velocity closest to `agent.desired_velocity` that avoids every
/// neighbor within the time horizons, capped at `agent.max_speed`.
///
/// Obstacle lines are built first and stay hard constraints in the
/// fallback program. Non-finite results collapse to zero.
pub fn compute_avoiding_velocity(
    agent: &AvoidingAgent,
    agents: &[AgentNeighbor],
    obstacles: &[ObstacleNeighbor],
    time_step: f32,
) -> Vec2 {
    let mut lines = Vec::with_capacity(agents.len() + obstacles.len());
    for obstacle in obstacles {
        push_obstacle_line(agent, obstacle, &mut lines);
    }
    let hard_lines = lines.len();
    for other in agents {
        push_agent_line(agent, other, time_step, &mut lines);
    }

    let max_speed = agent.max_speed.max(0.0);
    let (failed, mut result) = linear_program2(&lines, max_speed, agent.desired_velocity, false);
    if failed < lines.len() {
        result = linear_program3(&lines, hard_lines, failed, max_speed, result);
    }

    if result.is_finite() {
        result
    } else {
        Vec2::ZERO
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    fn agent(position: Vec2, velocity: Vec2) -> AvoidingAgent {
        AvoidingAgent {
            position,
            radius: 0.5,
            velocity,
            desired_velocity: velocity,
            max_speed: velocity.length(),
            time_horizon_agent: 1.0,
            time_horizon_obstacle: 1.0,
            hash: 1,
        }
    }

    fn neighbor(position: Vec2, velocity: Vec2) -> AgentNeighbor {
        AgentNeighbor {
            position,
            radius: 0.5,
            velocity,
            can_avoid: true,
            hash: 2,
        }
    }

    #[test]
    fn no_neighbors_keeps_desired_velocity() {
        let a = agent(Vec2::ZERO, Vec2::new(1.0, 0.0));
        assert_eq!(compute_avoiding_velocity(&a, &[], &[], 0.1), Vec2::new(1.0, 0.0));
    }

    #[test]
    fn head_on_pair_sidesteps_symmetrically() {
        let a = agent(Vec2::new(-1.0, 0.0), Vec2::new(1.0, 0.0));
        let b = agent(Vec2::new(1.0, 0.0), Vec2::new(-1.0, 0.0));
        let va = compute_avoiding_velocity(&a, &[neighbor(b.position, b.velocity)], &[], 0.1);
        let vb = compute_avoiding_velocity(&b, &[neighbor(a.position, a.velocity)], &[], 0.1);

        assert_relative_eq!(va.x, 0.75, epsilon = 1e-3);
        assert_relative_eq!(va.y, -0.433, epsilon = 1e-3);
        assert_relative_eq!(vb.x, -0.75, epsilon = 1e-3);
        assert_relative_eq!(vb.y, 0.433, epsilon = 1e-3);

        // They separate faster than without correction.
        let dt = 0.1;
        let gap = ((b.position + vb * dt) - (a.position + va * dt)).length();
        assert!(gap > 1.8);
    }

    #[test]
    fn static_neighbor_takes_full_responsibility() {
        let a = agent(Vec2::new(-1.0, 0.0), Vec2::new(1.0, 0.0));
        let wall = AgentNeighbor::sphere_obstacle(Vec2::new(1.0, 0.0), 0.5, 2);
        let shared = compute_avoiding_velocity(&a, &[neighbor(wall.position, Vec2::ZERO)], &[], 0.1);
        let full = compute_avoiding_velocity(&a, &[wall], &[], 0.1);
        // Full responsibility deviates further from the desired heading.
        assert!(full.y.abs() >= shared.y.abs());
        assert!(full.length() <= a.max_speed + 1e-4);
    }

    #[test]
    fn coincident_agents_stay_finite() {
        let mut a = agent(Vec2::ZERO, Vec2::ZERO);
        a.max_speed = 1.0;
        let v = compute_avoiding_velocity(&a, &[neighbor(Vec2::ZERO, Vec2::ZERO)], &[], 0.1);
        assert!(v.is_finite());
        assert!(v.length() <= 1.0 + 1e-4);
    }

    #[test]
    fn output_respects_max_speed() {
        let mut a = agent(Vec2::ZERO, Vec2::new(3.0, 4.0));
        a.max_speed = 2.0;
        let v = compute_avoiding_velocity(&a, &[neighbor(Vec2::new(0.0, 3.0), Vec2::ZERO)], &[], 0.1);
        assert!(v.length() <= 2.0 + 1e-4);
    }

    #[test]
    fn wall_ahead_caps_approach_speed() {
        // Edge running -y at x = 1; the agent is on its right-hand side.
        let wall = ObstacleNeighbor {
            point: Vec2::new(1.0, 5.0),
            direction: Vec2::NEG_Y,
            convex: true,
            next_point: Vec2::new(1.0, -5.0),
            next_direction: Vec2::NEG_X,
            next_convex: true,
        };
        let mut a = agent(Vec2::ZERO, Vec2::new(2.0, 0.0));
        a.time_horizon_obstacle = 1.0;
        let v = compute_avoiding_velocity(&a, &[], &[wall], 0.1);
        // Reaching the wall (less the radius) takes at least one horizon.
        assert_relative_eq!(v.x, 0.5, epsilon = 1e-4);
        assert_relative_eq!(v.y, 0.0, epsilon = 1e-4);
    }

    #[test]
    fn wall_behind_adds_nothing() {
        // Edge running +y at x = -1; the agent is on its right-hand side
        // and moving away.
        let wall = ObstacleNeighbor {
            point: Vec2::new(-1.0, -5.0),
            direction: Vec2::Y,
            convex: true,
            next_point: Vec2::new(-1.0, 5.0),
            next_direction: Vec2::X,
            next_convex: true,
        };
        let a = agent(Vec2::ZERO, Vec2::new(1.0, 0.0));
        let v = compute_avoiding_velocity(&a, &[], &[wall], 0.1);
        assert_relative_eq!(v.x, 1.0, epsilon = 1e-4);
    }
}
