use glam::Vec2;

/// Numerical tolerance for parallel lines and coverage tests.
pub(crate) const RVO_EPSILON: f32 = 1e-5;

/// Directed line bounding a half-plane of allowed velocities. Velocities
/// to the left of `direction` through `point` are allowed.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OrcaLine {
    pub point: Vec2,
    /// Unit length.
    pub direction: Vec2,
}

impl OrcaLine {
    pub fn new(point: Vec2, direction: Vec2) -> Self {
        Self { point, direction }
    }

    /// Positive when `velocity` lies outside the allowed half-plane; the
    /// magnitude is the penetration depth.
    #[inline]
    pub fn violation(&self, velocity: Vec2) -> f32 {
        det(self.direction, self.point - velocity)
    }
}

/// 2D cross product.
#[inline]
pub(crate) fn det(a: Vec2, b: Vec2) -> f32 {
    a.perp_dot(b)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn violation_sign() {
        // Allowed side is y >= 0 for a line along +x through the origin.
        let line = OrcaLine::new(Vec2::ZERO, Vec2::X);
        assert!(line.violation(Vec2::new(0.0, 1.0)) < 0.0);
        assert!(line.violation(Vec2::new(0.0, -1.0)) > 0.0);
        assert_eq!(det(Vec2::X, Vec2::Y), 1.0);
    }
}
