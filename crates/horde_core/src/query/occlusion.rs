//! Line-of-sight test against the obstacle layers.

use super::cells::distance_sq_to_segment;
use crate::entity::EntityHandle;
use crate::grid::{distance_sq_to_segment_2d, EntryShape, GridEntry, Layer, UniformGrid};
use crate::traits::CollisionChannels;
use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

/// Sphere cast from `origin` toward each candidate's surface. Candidates
/// behind an obstacle on one of the `mask` channels are dropped.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct OcclusionCheck {
    pub origin: Vec3,
    pub radius: f32,
    pub mask: CollisionChannels,
}

impl OcclusionCheck {
    pub fn new(origin: Vec3, radius: f32, mask: CollisionChannels) -> Self {
        Self {
            origin,
            radius: radius.max(0.0),
            mask,
        }
    }

    /// Point on the candidate's surface facing the cast origin.
    fn target(&self, entry: &GridEntry) -> Vec3 {
        let toward = (entry.position - self.origin).normalize_or_zero();
        entry.position - toward * entry.radius
    }

    /// Occluders for which `alive` is false are ignored, so despawned static
    /// obstacles stop blocking before their cells are cleared.
    pub(crate) fn blocks(
        &self,
        grid: &UniformGrid,
        entry: &GridEntry,
        alive: impl Fn(EntityHandle) -> bool,
    ) -> bool {
        if self.mask.is_empty() {
            return false;
        }
        let start = self.origin;
        let end = self.target(entry);
        let extent = Vec3::splat(self.radius);
        let cell_reach = self.radius + grid.half_diagonal();
        let cell_reach_sq = cell_reach * cell_reach;

        for coord in grid.coords_in_box(start.min(end) - extent, start.max(end) + extent) {
            if distance_sq_to_segment(grid.coord_to_location(coord), start, end) > cell_reach_sq {
                continue;
            }
            for layer in Layer::OBSTACLES {
                let blocked = grid
                    .entries(layer, coord)
                    .iter()
                    .filter(|obstacle| obstacle.channels.intersects(self.mask) && alive(obstacle.entity))
                    .any(|obstacle| self.obstructed_by(obstacle, start, end));
                if blocked {
                    return true;
                }
            }
        }
        false
    }

    fn obstructed_by(&self, obstacle: &GridEntry, start: Vec3, end: Vec3) -> bool {
        let reach = self.radius + obstacle.radius;
        match &obstacle.shape {
            EntryShape::Sphere => distance_sq_to_segment(obstacle.position, start, end) <= reach * reach,
            EntryShape::Edge(edge) => {
                let half_height = edge.height * 0.5;
                let low = start.z.min(end.z) - self.radius;
                let high = start.z.max(end.z) + self.radius;
                if high < obstacle.position.z - half_height || low > obstacle.position.z + half_height {
                    return false;
                }
                segment_distance_sq_2d(start.truncate(), end.truncate(), obstacle.position.truncate(), edge.end)
                    <= reach * reach
            }
        }
    }
}

/// Squared distance between segments `a0..a1` and `b0..b1` in the plane.
fn segment_distance_sq_2d(a0: Vec2, a1: Vec2, b0: Vec2, b1: Vec2) -> f32 {
    if segments_cross(a0, a1, b0, b1) {
        return 0.0;
    }
    distance_sq_to_segment_2d(a0, b0, b1)
        .min(distance_sq_to_segment_2d(a1, b0, b1))
        .min(distance_sq_to_segment_2d(b0, a0, a1))
        .min(distance_sq_to_segment_2d(b1, a0, a1))
}

fn segments_cross(a0: Vec2, a1: Vec2, b0: Vec2, b1: Vec2) -> bool {
    let d1 = (a1 - a0).perp_dot(b0 - a0);
    let d2 = (a1 - a0).perp_dot(b1 - a0);
    let d3 = (b1 - b0).perp_dot(a0 - b0);
    let d4 = (b1 - b0).perp_dot(a1 - b0);
    d1 * d2 < 0.0 && d3 * d4 < 0.0
}
