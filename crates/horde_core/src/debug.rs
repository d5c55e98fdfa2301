//! Diagnostic draw requests.
//!
//! The grid and the query engine push outlines into a [`DebugSink`] handed
//! to them at construction. Nothing reads the shapes back, so a sink may
//! drop them.

use glam::Vec3;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use std::time::Duration;

/// Color, lifetime and line thickness of one outline.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugStyle {
    pub color: [u8; 4],
    pub duration: Duration,
    pub thickness: f32,
}

impl DebugStyle {
    pub const RED: [u8; 4] = [255, 0, 0, 255];
    pub const GREEN: [u8; 4] = [0, 255, 0, 255];
    pub const ORANGE: [u8; 4] = [255, 165, 0, 255];

    pub const fn new(color: [u8; 4]) -> Self {
        Self {
            color,
            duration: Duration::ZERO,
            thickness: 0.0,
        }
    }
}

impl Default for DebugStyle {
    fn default() -> Self {
        Self::new(Self::RED)
    }
}

#[derive(Debug, Clone, PartialEq)]
pub enum DebugShape {
    Sphere {
        center: Vec3,
        radius: f32,
        style: DebugStyle,
    },
    Capsule {
        start: Vec3,
        end: Vec3,
        radius: f32,
        style: DebugStyle,
    },
    Sector {
        origin: Vec3,
        radius: f32,
        height: f32,
        direction: Vec3,
        angle_degrees: f32,
        style: DebugStyle,
    },
    Point {
        location: Vec3,
        size: f32,
        style: DebugStyle,
    },
}

/// Append-only queue of draw requests.
pub trait DebugSink: Send + Sync {
    fn submit(&self, shape: DebugShape);
}

/// Sink that drops everything.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullSink;

impl DebugSink for NullSink {
    fn submit(&self, _shape: DebugShape) {}
}

/// Sink that keeps shapes until tooling drains them.
#[derive(Debug, Default)]
pub struct DebugQueue {
    shapes: Mutex<Vec<DebugShape>>,
}

impl DebugQueue {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn drain(&self) -> Vec<DebugShape> {
        std::mem::take(&mut *self.shapes.lock())
    }

    pub fn len(&self) -> usize {
        self.shapes.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl DebugSink for DebugQueue {
    fn submit(&self, shape: DebugShape) {
        self.shapes.lock().push(shape);
    }
}

/// Per-query drawing switch.
#[derive(Debug, Copy, Clone, PartialEq, Serialize, Deserialize)]
pub struct DebugDraw {
    pub enabled: bool,
    pub shape: DebugStyle,
    pub hit_point_size: f32,
}

impl DebugDraw {
    pub const OFF: Self = Self {
        enabled: false,
        shape: DebugStyle::new(DebugStyle::RED),
        hit_point_size: 0.0,
    };

    pub fn on(color: [u8; 4]) -> Self {
        Self {
            enabled: true,
            shape: DebugStyle::new(color),
            hit_point_size: 10.0,
        }
    }

    pub(crate) fn hit_points(&self, sink: &dyn DebugSink, points: impl Iterator<Item = Vec3>) {
        if !self.enabled {
            return;
        }
        let style = DebugStyle {
            color: DebugStyle::GREEN,
            ..self.shape
        };
        for location in points {
            sink.submit(DebugShape::Point {
                location,
                size: self.hit_point_size,
                style,
            });
        }
    }
}

impl Default for DebugDraw {
    fn default() -> Self {
        Self::OFF
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn queue_drains_in_submission_order() {
        let queue = DebugQueue::new();
        queue.submit(DebugShape::Point {
            location: Vec3::ZERO,
            size: 1.0,
            style: DebugStyle::default(),
        });
        queue.submit(DebugShape::Sphere {
            center: Vec3::ONE,
            radius: 2.0,
            style: DebugStyle::default(),
        });
        let shapes = queue.drain();
        assert_eq!(shapes.len(), 2);
        assert!(matches!(shapes[0], DebugShape::Point { .. }));
        assert!(queue.is_empty());
    }

    #[test]
    fn disabled_draw_submits_nothing() {
        let queue = DebugQueue::new();
        DebugDraw::OFF.hit_points(&queue, [Vec3::ZERO].into_iter());
        assert!(queue.is_empty());
        DebugDraw::on(DebugStyle::ORANGE).hit_points(&queue, [Vec3::ZERO].into_iter());
        assert_eq!(queue.len(), 1);
    }
}
