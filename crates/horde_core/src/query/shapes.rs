//! Query volumes and the synchronous query entry points.

use super::cells::{closest_point_on_segment, sector_cells, sphere_cells, sweep_cells, SectorBounds};
use super::collect::{scan, QueryShape, StoreGate};
use super::{QueryOptions, QueryOutcome};
use crate::debug::{DebugShape, DebugSink, DebugStyle};
use crate::grid::{GridEntry, UniformGrid};
use crate::store::EntityStore;
use glam::{Vec2, Vec3};
use serde::{Deserialize, Serialize};

/// Angles at or above this many degrees skip the cone test.
const FULL_CIRCLE_DEGREES: f32 = 360.0 - 1e-3;

#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sphere {
    pub center: Vec3,
    pub radius: f32,
}

impl Sphere {
    pub fn new(center: Vec3, radius: f32) -> Self {
        Self { center, radius }
    }

    /// Zero-radius sphere: everything whose own sphere contains `location`.
    pub fn point(location: Vec3) -> Self {
        Self::new(location, 0.0)
    }
}

/// Sphere swept from `start` to `end`.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sweep {
    pub start: Vec3,
    pub end: Vec3,
    pub radius: f32,
}

impl Sweep {
    pub fn new(start: Vec3, end: Vec3, radius: f32) -> Self {
        Self { start, end, radius }
    }
}

/// Vertical cylinder slice opening along `direction`.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct Sector {
    pub origin: Vec3,
    pub radius: f32,
    pub height: f32,
    /// Only the horizontal component is used.
    pub direction: Vec3,
    /// Full opening angle in degrees, `0..=360`.
    pub angle_degrees: f32,
}

impl Sector {
    pub fn new(origin: Vec3, radius: f32, height: f32, direction: Vec3, angle_degrees: f32) -> Self {
        Self {
            origin,
            radius,
            height,
            direction,
            angle_degrees,
        }
    }

    fn forward(&self) -> Vec2 {
        self.direction.truncate().try_normalize().unwrap_or(Vec2::X)
    }

    fn full_circle(&self) -> bool {
        self.angle_degrees >= FULL_CIRCLE_DEGREES
    }

    fn half_angle(&self) -> f32 {
        (self.angle_degrees.clamp(0.0, 360.0) * 0.5).to_radians()
    }
}

fn surface_toward(entry: &GridEntry, from: Vec3) -> Vec3 {
    let toward = (entry.position - from).normalize_or_zero();
    entry.position - toward * entry.radius
}

impl QueryShape for Sphere {
    const NAME: &'static str = "sphere";

    fn is_valid(&self) -> bool {
        self.center.is_finite() && self.radius.is_finite() && self.radius >= 0.0
    }

    fn candidate_cells(&self, grid: &UniformGrid, reach: f32) -> Vec<usize> {
        sphere_cells(grid, self.center, self.radius + reach)
    }

    fn test(&self, entry: &GridEntry) -> Option<(Vec3, Vec3)> {
        let reach = self.radius + entry.radius;
        (entry.position.distance_squared(self.center) <= reach * reach)
            .then(|| (surface_toward(entry, self.center), self.center))
    }

    fn draw(&self, sink: &dyn DebugSink, style: DebugStyle) {
        sink.submit(DebugShape::Sphere {
            center: self.center,
            radius: self.radius,
            style,
        });
    }
}

impl QueryShape for Sweep {
    const NAME: &'static str = "sweep";

    fn is_valid(&self) -> bool {
        self.start.is_finite() && self.end.is_finite() && self.radius.is_finite() && self.radius >= 0.0
    }

    fn candidate_cells(&self, grid: &UniformGrid, reach: f32) -> Vec<usize> {
        sweep_cells(grid, self.start, self.end, self.radius + reach)
    }

    fn test(&self, entry: &GridEntry) -> Option<(Vec3, Vec3)> {
        let reach = self.radius + entry.radius;
        let axis = self.end - self.start;
        let length = axis.length();
        if length > f32::EPSILON {
            // Cheap reject past either cap before the clamped projection.
            let along = (entry.position - self.start).dot(axis / length);
            if along < -reach || along > length + reach {
                return None;
            }
        }
        let closest = closest_point_on_segment(entry.position, self.start, self.end);
        (entry.position.distance_squared(closest) <= reach * reach)
            .then(|| (surface_toward(entry, closest), closest))
    }

    fn draw(&self, sink: &dyn DebugSink, style: DebugStyle) {
        sink.submit(DebugShape::Capsule {
            start: self.start,
            end: self.end,
            radius: self.radius,
            style,
        });
    }
}

/// Sector with its derived cone terms.
struct SectorShape {
    sector: Sector,
    bounds: SectorBounds,
}

impl SectorShape {
    fn new(sector: Sector) -> Self {
        let forward = sector.forward();
        let half = sector.half_angle();
        let bounds = SectorBounds {
            origin: sector.origin,
            forward,
            cos_half_angle: half.cos(),
            left: Vec2::from_angle(half).rotate(forward),
            right: Vec2::from_angle(-half).rotate(forward),
            full_circle: sector.full_circle(),
        };
        Self { sector, bounds }
    }
}

impl QueryShape for SectorShape {
    const NAME: &'static str = "sector";

    fn is_valid(&self) -> bool {
        let s = &self.sector;
        s.origin.is_finite()
            && s.direction.is_finite()
            && s.radius.is_finite()
            && s.radius >= 0.0
            && s.height.is_finite()
            && s.height >= 0.0
            && s.angle_degrees.is_finite()
    }

    fn candidate_cells(&self, grid: &UniformGrid, reach: f32) -> Vec<usize> {
        sector_cells(
            grid,
            &self.bounds,
            self.sector.radius + reach,
            self.sector.height * 0.5 + reach,
            reach,
        )
    }

    fn test(&self, entry: &GridEntry) -> Option<(Vec3, Vec3)> {
        let sector = &self.sector;
        let delta = entry.position - sector.origin;
        if delta.z.abs() > sector.height * 0.5 + entry.radius {
            return None;
        }
        let flat = delta.truncate();
        let flat_sq = flat.length_squared();
        let reach = sector.radius + entry.radius;
        if flat_sq > reach * reach {
            return None;
        }
        if !self.bounds.full_circle
            && flat_sq > f32::EPSILON
            && self.bounds.forward.dot(flat) < self.bounds.cos_half_angle * flat_sq.sqrt()
        {
            return None;
        }
        Some((surface_toward(entry, sector.origin), sector.origin))
    }

    fn draw(&self, sink: &dyn DebugSink, style: DebugStyle) {
        let s = &self.sector;
        sink.submit(DebugShape::Sector {
            origin: s.origin,
            radius: s.radius,
            height: s.height,
            direction: self.bounds.forward.extend(0.0),
            angle_degrees: s.angle_degrees,
            style,
        });
    }
}

impl UniformGrid {
    /// Agents whose sphere overlaps `sphere`.
    pub fn sphere_query<S: EntityStore + ?Sized>(
        &self,
        store: &S,
        sphere: &Sphere,
        options: &QueryOptions<'_>,
    ) -> QueryOutcome {
        let gate = StoreGate {
            store,
            filter: options.filter,
        };
        QueryOutcome::new(scan(self, sphere, options, &gate))
    }

    /// Agents within `R + r` of the segment `start..end`.
    pub fn sweep_query<S: EntityStore + ?Sized>(
        &self,
        store: &S,
        sweep: &Sweep,
        options: &QueryOptions<'_>,
    ) -> QueryOutcome {
        let gate = StoreGate {
            store,
            filter: options.filter,
        };
        QueryOutcome::new(scan(self, sweep, options, &gate))
    }

    /// Agents whose center lies in the cone and whose sphere reaches the
    /// sector's radius and height band.
    pub fn sector_query<S: EntityStore + ?Sized>(
        &self,
        store: &S,
        sector: &Sector,
        options: &QueryOptions<'_>,
    ) -> QueryOutcome {
        let gate = StoreGate {
            store,
            filter: options.filter,
        };
        QueryOutcome::new(scan(self, &SectorShape::new(*sector), options, &gate))
    }
}
