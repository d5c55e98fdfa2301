//! Boundary to the entity store, plus an in-memory store.
//!
//! The grid never owns entity data. Queries ask an [`EntityStore`] whether a
//! handle is still alive and which traits it carries; the registration and
//! avoidance passes walk [`Population`] records in parallel batches.

use crate::avoidance::{AvoidanceConfig, AvoidanceState};
use crate::entity::EntityHandle;
use crate::grid::EdgeData;
use crate::traits::{AvoidanceGroup, Category, CollisionChannels, TraitFilter, TraitMask};
use glam::{Vec2, Vec3};

/// Read access the query engine needs from whoever owns entity data.
pub trait EntityStore {
    fn is_valid(&self, entity: EntityHandle) -> bool;

    fn traits(&self, entity: EntityHandle) -> Option<TraitMask>;

    fn matches(&self, entity: EntityHandle, filter: &TraitFilter) -> bool {
        self.traits(entity).is_some_and(|mask| filter.matches(mask))
    }
}

/// Movement state the avoidance pass reads and writes.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub struct Motion {
    /// Velocity the agent would like to move at (from navigation).
    pub desired_velocity: Vec3,
    pub current_velocity: Vec3,
    /// Being launched by an external impulse.
    pub launching: bool,
    /// Being knocked back.
    pub pushed_back: bool,
    /// Minimum speed while knocked back.
    pub push_back_speed: f32,
    /// Output of the last avoidance pass.
    pub avoiding_velocity: Vec2,
}

#[derive(Debug, Clone)]
pub struct AgentRecord {
    pub handle: EntityHandle,
    pub position: Vec3,
    pub collider_radius: f32,
    pub scale: f32,
    pub traits: TraitMask,
    pub category: Category,
    /// Register into every overlapped cell instead of only the home cell.
    pub multi_cell: bool,
    pub draw_debug: bool,
    pub motion: Motion,
    pub avoidance_config: AvoidanceConfig,
    pub avoidance: AvoidanceState,
}

impl AgentRecord {
    pub fn new(position: Vec3, collider_radius: f32) -> Self {
        Self {
            handle: EntityHandle::new(0, 0),
            position,
            collider_radius,
            scale: 1.0,
            traits: TraitMask::AGENT,
            category: Category::default(),
            multi_cell: false,
            draw_debug: false,
            motion: Motion::default(),
            avoidance_config: AvoidanceConfig::default(),
            avoidance: AvoidanceState::default(),
        }
    }

    pub fn grid_radius(&self) -> f32 {
        self.collider_radius * self.scale
    }

    /// Refresh the avoidance snapshot from the current transform and motion.
    pub fn sync_avoidance(&mut self) {
        self.avoidance.position = self.position.truncate();
        self.avoidance.radius = self.grid_radius() * self.avoidance_config.radius_multiplier;
        self.avoidance.velocity = self.motion.current_velocity.truncate();
        self.avoidance.can_avoid = !self.motion.launching && !self.motion.pushed_back;

        self.traits.remove(AvoidanceGroup::ALL_BITS);
        if let Some(group) = self.avoidance_config.group {
            self.traits.insert(group.trait_bit());
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ObstacleKind {
    /// Re-registered every frame.
    Dynamic,
    /// Registered once.
    Static,
}

#[derive(Debug, Clone)]
pub enum ObstacleShape {
    Sphere { radius: f32 },
    Edge(EdgeData),
}

#[derive(Debug, Clone)]
pub struct ObstacleRecord {
    pub handle: EntityHandle,
    pub position: Vec3,
    pub shape: ObstacleShape,
    pub kind: ObstacleKind,
    pub channels: CollisionChannels,
    pub traits: TraitMask,
    /// Set once a static obstacle is in the grid.
    pub registered: bool,
    /// Temporarily left out of the grid.
    pub excluded: bool,
    pub draw_debug: bool,
}

impl ObstacleRecord {
    pub fn sphere(position: Vec3, radius: f32, kind: ObstacleKind) -> Self {
        Self {
            handle: EntityHandle::new(0, 0),
            position,
            shape: ObstacleShape::Sphere { radius },
            kind,
            channels: CollisionChannels::channel(0),
            traits: TraitMask::OBSTACLE,
            registered: false,
            excluded: false,
            draw_debug: false,
        }
    }

    /// Half thickness of an edge, or the sphere radius.
    pub fn radius(&self) -> f32 {
        match self.shape {
            ObstacleShape::Sphere { radius } => radius,
            ObstacleShape::Edge(_) => 0.0,
        }
    }
}

#[derive(Debug, Clone, Copy)]
enum Slot {
    Agent(u32),
    Obstacle(u32),
    Free,
}

#[derive(Debug, Clone, Copy)]
struct SlotMeta {
    generation: u32,
    slot: Slot,
}

/// Generational in-memory store of agents and obstacles.
///
/// Records are kept densely so passes can split them into `&mut` batches.
/// Structural changes (`spawn_*`, `despawn`) need `&mut self`, so they
/// happen on the owning thread only.
#[derive(Debug, Default)]
pub struct Population {
    meta: Vec<SlotMeta>,
    free: Vec<u32>,
    agents: Vec<AgentRecord>,
    obstacles: Vec<ObstacleRecord>,
}

impl Population {
    pub fn new() -> Self {
        Self::default()
    }

    fn allocate(&mut self, slot: Slot) -> EntityHandle {
        match self.free.pop() {
            Some(index) => {
                let meta = &mut self.meta[index as usize];
                meta.slot = slot;
                EntityHandle::new(index, meta.generation)
            }
            None => {
                let index = self.meta.len() as u32;
                self.meta.push(SlotMeta {
                    generation: 0,
                    slot,
                });
                EntityHandle::new(index, 0)
            }
        }
    }

    pub fn spawn_agent(&mut self, mut record: AgentRecord) -> EntityHandle {
        let handle = self.allocate(Slot::Agent(self.agents.len() as u32));
        record.handle = handle;
        record.traits.insert(TraitMask::AGENT);
        record.sync_avoidance();
        self.agents.push(record);
        handle
    }

    pub fn spawn_obstacle(&mut self, mut record: ObstacleRecord) -> EntityHandle {
        let handle = self.allocate(Slot::Obstacle(self.obstacles.len() as u32));
        record.handle = handle;
        record.traits.insert(TraitMask::OBSTACLE);
        self.obstacles.push(record);
        handle
    }

    /// Spawn a closed polygon wall, one edge obstacle per vertex.
    ///
    /// Vertices are in counter-clockwise order when seen from above for a
    /// solid obstacle; agents stay on the right-hand side of each edge.
    pub fn spawn_polygon(
        &mut self,
        vertices: &[Vec2],
        z: f32,
        height: f32,
        kind: ObstacleKind,
        channels: CollisionChannels,
    ) -> Vec<EntityHandle> {
        let n = vertices.len();
        if n < 2 {
            return Vec::new();
        }

        let direction = |i: usize| (vertices[(i + 1) % n] - vertices[i]).normalize_or_zero();
        let convex = |i: usize| {
            if n == 2 {
                return true;
            }
            let prev = vertices[(i + n - 1) % n];
            let next = vertices[(i + 1) % n];
            left_of(prev, vertices[i], next) >= 0.0
        };

        (0..n)
            .map(|i| {
                let next = (i + 1) % n;
                let edge = EdgeData {
                    end: vertices[next],
                    direction: direction(i),
                    next_direction: direction(next),
                    convex: convex(i),
                    next_convex: convex(next),
                    height,
                };
                let mut record = ObstacleRecord::sphere(vertices[i].extend(z), 0.0, kind);
                record.shape = ObstacleShape::Edge(edge);
                record.channels = channels;
                self.spawn_obstacle(record)
            })
            .collect()
    }

    /// Free the slot; the handle and copies of it become invalid.
    pub fn despawn(&mut self, entity: EntityHandle) -> bool {
        if !self.is_valid(entity) {
            return false;
        }
        let meta = &mut self.meta[entity.index() as usize];
        let slot = std::mem::replace(&mut meta.slot, Slot::Free);
        meta.generation = meta.generation.wrapping_add(1);
        self.free.push(entity.index());

        match slot {
            Slot::Agent(dense) => {
                self.agents.swap_remove(dense as usize);
                if let Some(moved) = self.agents.get(dense as usize) {
                    self.meta[moved.handle.index() as usize].slot = Slot::Agent(dense);
                }
            }
            Slot::Obstacle(dense) => {
                self.obstacles.swap_remove(dense as usize);
                if let Some(moved) = self.obstacles.get(dense as usize) {
                    self.meta[moved.handle.index() as usize].slot = Slot::Obstacle(dense);
                }
            }
            Slot::Free => {}
        }
        true
    }

    fn slot(&self, entity: EntityHandle) -> Option<Slot> {
        self.meta
            .get(entity.index() as usize)
            .filter(|meta| meta.generation == entity.generation())
            .map(|meta| meta.slot)
    }

    pub fn agent(&self, entity: EntityHandle) -> Option<&AgentRecord> {
        match self.slot(entity)? {
            Slot::Agent(dense) => self.agents.get(dense as usize),
            _ => None,
        }
    }

    pub fn agent_mut(&mut self, entity: EntityHandle) -> Option<&mut AgentRecord> {
        match self.slot(entity)? {
            Slot::Agent(dense) => self.agents.get_mut(dense as usize),
            _ => None,
        }
    }

    pub fn obstacle(&self, entity: EntityHandle) -> Option<&ObstacleRecord> {
        match self.slot(entity)? {
            Slot::Obstacle(dense) => self.obstacles.get(dense as usize),
            _ => None,
        }
    }

    pub fn obstacle_mut(&mut self, entity: EntityHandle) -> Option<&mut ObstacleRecord> {
        match self.slot(entity)? {
            Slot::Obstacle(dense) => self.obstacles.get_mut(dense as usize),
            _ => None,
        }
    }

    pub fn agents(&self) -> &[AgentRecord] {
        &self.agents
    }

    pub fn agents_mut(&mut self) -> &mut [AgentRecord] {
        &mut self.agents
    }

    pub fn obstacles(&self) -> &[ObstacleRecord] {
        &self.obstacles
    }

    pub fn obstacles_mut(&mut self) -> &mut [ObstacleRecord] {
        &mut self.obstacles
    }

    /// Mark every static obstacle for registration again, e.g. after
    /// [`UniformGrid::clear_static_obstacles`](crate::grid::UniformGrid::clear_static_obstacles).
    pub fn reset_static_registration(&mut self) {
        for obstacle in &mut self.obstacles {
            obstacle.registered = false;
        }
    }

    pub fn len(&self) -> usize {
        self.agents.len() + self.obstacles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl EntityStore for Population {
    fn is_valid(&self, entity: EntityHandle) -> bool {
        matches!(self.slot(entity), Some(Slot::Agent(_) | Slot::Obstacle(_)))
    }

    fn traits(&self, entity: EntityHandle) -> Option<TraitMask> {
        match self.slot(entity)? {
            Slot::Agent(dense) => self.agents.get(dense as usize).map(|a| a.traits),
            Slot::Obstacle(dense) => self.obstacles.get(dense as usize).map(|o| o.traits),
            Slot::Free => None,
        }
    }
}

/// Positive when `c` lies to the left of the directed line `a -> b`.
pub(crate) fn left_of(a: Vec2, b: Vec2, c: Vec2) -> f32 {
    (a - c).perp_dot(b - a)
}
