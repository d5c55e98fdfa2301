//! Candidate cell enumeration.
//!
//! Each shape widens itself by `reach` (the largest single-cell entry
//! radius plus half a cell diagonal) so that any entry whose center could
//! satisfy the exact test sits in one of the returned cells.

use super::SortMode;
use crate::grid::UniformGrid;
use glam::{Vec2, Vec3};

#[derive(Debug, Copy, Clone)]
pub(crate) struct CandidateCell {
    pub index: usize,
    /// Squared distance from the cell center to the sort origin.
    pub dist_sq: f32,
}

/// Cells whose centers lie within `reach` of `center`.
pub(crate) fn sphere_cells(grid: &UniformGrid, center: Vec3, reach: f32) -> Vec<usize> {
    let reach_sq = reach * reach;
    let extent = Vec3::splat(reach);
    grid.coords_in_box(center - extent, center + extent)
        .filter(|&coord| grid.coord_to_location(coord).distance_squared(center) <= reach_sq)
        .filter_map(|coord| grid.coord_to_index(coord))
        .collect()
}

/// Cells whose centers lie within `reach` of the segment `start..end`.
pub(crate) fn sweep_cells(grid: &UniformGrid, start: Vec3, end: Vec3, reach: f32) -> Vec<usize> {
    let reach_sq = reach * reach;
    let extent = Vec3::splat(reach);
    grid.coords_in_box(start.min(end) - extent, start.max(end) + extent)
        .filter(|&coord| distance_sq_to_segment(grid.coord_to_location(coord), start, end) <= reach_sq)
        .filter_map(|coord| grid.coord_to_index(coord))
        .collect()
}

/// Horizontal wedge of cells, pruned by the sector's boundary rays.
pub(crate) struct SectorBounds {
    pub origin: Vec3,
    pub forward: Vec2,
    pub cos_half_angle: f32,
    pub left: Vec2,
    pub right: Vec2,
    pub full_circle: bool,
}

pub(crate) fn sector_cells(
    grid: &UniformGrid,
    bounds: &SectorBounds,
    reach_xy: f32,
    reach_z: f32,
    slack_xy: f32,
) -> Vec<usize> {
    let origin = bounds.origin;
    let extent = Vec3::new(reach_xy, reach_xy, reach_z);
    let origin_xy = origin.truncate();
    let reach_sq = reach_xy * reach_xy;

    grid.coords_in_box(origin - extent, origin + extent)
        .filter(|&coord| {
            let center = grid.coord_to_location(coord);
            let delta = center.truncate() - origin_xy;
            if delta.length_squared() > reach_sq || (center.z - origin.z).abs() > reach_z {
                return false;
            }
            bounds.full_circle || wedge_distance(bounds, delta) <= slack_xy
        })
        .filter_map(|coord| grid.coord_to_index(coord))
        .collect()
}

/// Distance from `delta` (relative to the apex) to the sector wedge.
fn wedge_distance(bounds: &SectorBounds, delta: Vec2) -> f32 {
    let len_sq = delta.length_squared();
    if len_sq <= f32::EPSILON || delta.dot(bounds.forward) >= bounds.cos_half_angle * len_sq.sqrt() {
        return 0.0;
    }
    ray_distance(delta, bounds.left).min(ray_distance(delta, bounds.right))
}

fn ray_distance(point: Vec2, direction: Vec2) -> f32 {
    let t = point.dot(direction).max(0.0);
    point.distance(direction * t)
}

/// Attach sort distances and order the cells for scanning.
pub(crate) fn order(
    grid: &UniformGrid,
    cells: Vec<usize>,
    sort: SortMode,
    sort_origin: Vec3,
) -> Vec<CandidateCell> {
    let mut ordered: Vec<CandidateCell> = cells
        .into_iter()
        .map(|index| CandidateCell {
            index,
            dist_sq: grid
                .coord_to_location(grid.index_to_coord(index))
                .distance_squared(sort_origin),
        })
        .collect();

    match sort {
        SortMode::None => {}
        SortMode::NearToFar => ordered.sort_unstable_by(|a, b| a.dist_sq.total_cmp(&b.dist_sq)),
        SortMode::FarToNear => ordered.sort_unstable_by(|a, b| b.dist_sq.total_cmp(&a.dist_sq)),
    }
    ordered
}

pub(crate) fn closest_point_on_segment(point: Vec3, start: Vec3, end: Vec3) -> Vec3 {
    let ab = end - start;
    let len_sq = ab.length_squared();
    if len_sq <= f32::EPSILON {
        return start;
    }
    let t = ((point - start).dot(ab) / len_sq).clamp(0.0, 1.0);
    start + ab * t
}

pub(crate) fn distance_sq_to_segment(point: Vec3, start: Vec3, end: Vec3) -> f32 {
    point.distance_squared(closest_point_on_segment(point, start, end))
}
