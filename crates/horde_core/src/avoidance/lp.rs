//! Incremental 2D linear programs over a speed disc.

use super::line::{det, OrcaLine, RVO_EPSILON};
use glam::Vec2;

/// Optimize along `lines[line_no]` subject to the earlier lines and the
/// disc of radius `radius`. Returns `None` when infeasible.
fn linear_program1(
    lines: &[OrcaLine],
    line_no: usize,
    radius: f32,
    opt_velocity: Vec2,
    direction_opt: bool,
) -> Option<Vec2> {
    let line = lines[line_no];
    let dot = line.point.dot(line.direction);
    let discriminant = dot * dot + radius * radius - line.point.length_squared();
    if !(discriminant >= 0.0) {
        // The disc misses the line entirely.
        return None;
    }

    let sqrt_discriminant = discriminant.sqrt();
    let mut t_left = -dot - sqrt_discriminant;
    let mut t_right = -dot + sqrt_discriminant;

    for other in &lines[..line_no] {
        let denominator = det(line.direction, other.direction);
        let numerator = det(other.direction, line.point - other.point);

        if denominator.abs() <= RVO_EPSILON {
            // Parallel.
            if numerator < 0.0 {
                return None;
            }
            continue;
        }

        let t = numerator / denominator;
        if denominator >= 0.0 {
            t_right = t_right.min(t);
        } else {
            t_left = t_left.max(t);
        }
        if t_left > t_right {
            return None;
        }
    }

    let t = if direction_opt {
        if opt_velocity.dot(line.direction) > 0.0 {
            t_right
        } else {
            t_left
        }
    } else {
        let t = line.direction.dot(opt_velocity - line.point);
        if t < t_left {
            t_left
        } else if t > t_right {
            t_right
        } else {
            t
        }
    };
    Some(line.point + line.direction * t)
}

/// Velocity closest to `opt_velocity` (or furthest along it when
/// `direction_opt`) inside the disc and every half-plane.
///
/// Returns the index of the first line that could not be satisfied
/// (`lines.len()` on success) and the best velocity found so far.
pub(crate) fn linear_program2(
    lines: &[OrcaLine],
    radius: f32,
    opt_velocity: Vec2,
    direction_opt: bool,
) -> (usize, Vec2) {
    let mut result = if direction_opt {
        // `opt_velocity` is a unit direction here.
        opt_velocity * radius
    } else if opt_velocity.length_squared() > radius * radius {
        opt_velocity.normalize_or_zero() * radius
    } else {
        opt_velocity
    };

    for i in 0..lines.len() {
        if lines[i].violation(result) > 0.0 {
            match linear_program1(lines, i, radius, opt_velocity, direction_opt) {
                Some(next) => result = next,
                None => return (i, result),
            }
        }
    }
    (lines.len(), result)
}

/// Fallback when the program is infeasible from `begin_line` on: minimize
/// the largest penetration of the soft lines while keeping the first
/// `hard_lines` satisfied.
pub(crate) fn linear_program3(
    lines: &[OrcaLine],
    hard_lines: usize,
    begin_line: usize,
    radius: f32,
    mut result: Vec2,
) -> Vec2 {
    let mut distance = 0.0;
    let mut projected: Vec<OrcaLine> = Vec::with_capacity(lines.len());

    for i in begin_line..lines.len() {
        let line = lines[i];
        if line.violation(result) <= distance {
            continue;
        }

        projected.clear();
        projected.extend_from_slice(&lines[..hard_lines]);

        for other in &lines[hard_lines..i] {
            let determinant = det(line.direction, other.direction);
            let point = if determinant.abs() <= RVO_EPSILON {
                if line.direction.dot(other.direction) > 0.0 {
                    // Same direction; `other` is implied by `line`.
                    continue;
                }
                (line.point + other.point) * 0.5
            } else {
                line.point + line.direction * (det(other.direction, line.point - other.point) / determinant)
            };
            let Some(direction) = (other.direction - line.direction).try_normalize() else {
                continue;
            };
            projected.push(OrcaLine::new(point, direction));
        }

        let toward = Vec2::new(-line.direction.y, line.direction.x);
        let (failed, candidate) = linear_program2(&projected, radius, toward, true);
        // Failure here is floating-point noise; keep the previous result.
        if failed >= projected.len() {
            result = candidate;
        }
        distance = line.violation(result);
    }
    result
}
