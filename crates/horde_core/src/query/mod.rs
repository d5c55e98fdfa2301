//! Shape queries over the agent layer.
//!
//! Sphere, swept-sphere and sector queries share one scan: enumerate
//! candidate cells, visit them nearest-first when ranking, test each entry
//! (validity, ignore set, exact shape test, dedupe, occlusion, trait
//! filter) and keep the best `KeepCount` results.

mod async_sweep;
mod cells;
mod collect;
mod occlusion;
mod shapes;

pub use async_sweep::{AsyncQueries, SweepCallback};
pub use occlusion::OcclusionCheck;
pub use shapes::{Sector, Sphere, Sweep};

use crate::debug::DebugDraw;
use crate::entity::EntityHandle;
use crate::traits::TraitFilter;
use glam::Vec3;
use serde::{Deserialize, Serialize};
use smallvec::SmallVec;

/// Result ordering, by distance from the sort origin to the entity center.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum SortMode {
    /// Unordered. Lists are shuffled.
    None,
    #[default]
    NearToFar,
    FarToNear,
}

/// Cap on the number of results.
#[derive(Debug, Copy, Clone, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum KeepCount {
    #[default]
    All,
    /// Single best match, tracked without a result list.
    Best,
    Limit(usize),
}

impl KeepCount {
    pub fn limit(self) -> Option<usize> {
        match self {
            KeepCount::All => None,
            KeepCount::Best => Some(1),
            KeepCount::Limit(n) => Some(n),
        }
    }
}

impl From<i32> for KeepCount {
    /// `1` keeps the best match, `n > 1` keeps `n`, anything else is
    /// unbounded.
    fn from(count: i32) -> Self {
        match count {
            1 => KeepCount::Best,
            n if n > 1 => KeepCount::Limit(n as usize),
            _ => KeepCount::All,
        }
    }
}

/// Parameters shared by every query shape.
#[derive(Debug, Clone)]
pub struct QueryOptions<'a> {
    pub keep_count: KeepCount,
    pub sort: SortMode,
    pub sort_origin: Vec3,
    pub ignore: &'a [EntityHandle],
    pub filter: TraitFilter,
    pub occlusion: Option<OcclusionCheck>,
    pub debug: DebugDraw,
}

impl Default for QueryOptions<'_> {
    fn default() -> Self {
        Self {
            keep_count: KeepCount::All,
            sort: SortMode::NearToFar,
            sort_origin: Vec3::ZERO,
            ignore: &[],
            filter: TraitFilter::ANY,
            occlusion: None,
            debug: DebugDraw::OFF,
        }
    }
}

impl<'a> QueryOptions<'a> {
    pub fn sorted(sort: SortMode, sort_origin: Vec3) -> Self {
        Self {
            sort,
            sort_origin,
            ..Self::default()
        }
    }

    pub fn keep(mut self, keep_count: impl Into<KeepCount>) -> Self {
        self.keep_count = keep_count.into();
        self
    }

    pub fn ignoring(mut self, ignore: &'a [EntityHandle]) -> Self {
        self.ignore = ignore;
        self
    }

    pub fn filtered(mut self, filter: TraitFilter) -> Self {
        self.filter = filter;
        self
    }

    pub fn occluded_by(mut self, occlusion: OcclusionCheck) -> Self {
        self.occlusion = Some(occlusion);
        self
    }

    pub fn drawn(mut self, debug: DebugDraw) -> Self {
        self.debug = debug;
        self
    }

    /// Copy with an owned ignore list, for the async sweep.
    pub(crate) fn detach(&self) -> DetachedOptions {
        DetachedOptions {
            keep_count: self.keep_count,
            sort: self.sort,
            sort_origin: self.sort_origin,
            ignore: self.ignore.to_vec(),
            filter: self.filter,
            occlusion: self.occlusion,
            debug: self.debug,
        }
    }
}

#[derive(Debug, Clone)]
pub(crate) struct DetachedOptions {
    pub keep_count: KeepCount,
    pub sort: SortMode,
    pub sort_origin: Vec3,
    pub ignore: Vec<EntityHandle>,
    pub filter: TraitFilter,
    pub occlusion: Option<OcclusionCheck>,
    pub debug: DebugDraw,
}

impl DetachedOptions {
    pub fn borrow(&self) -> QueryOptions<'_> {
        QueryOptions {
            keep_count: self.keep_count,
            sort: self.sort,
            sort_origin: self.sort_origin,
            ignore: &self.ignore,
            filter: self.filter,
            occlusion: self.occlusion,
            debug: self.debug,
        }
    }
}

/// One matched entity.
#[derive(Debug, Copy, Clone, PartialEq)]
pub struct QueryResult {
    pub entity: EntityHandle,
    /// Entity center at registration time.
    pub position: Vec3,
    /// Point on the entity's surface facing the query shape.
    pub hit_point: Vec3,
    /// Point of the query shape closest to the entity.
    pub shape_point: Vec3,
    /// Squared distance from the sort origin, used for ranking.
    pub dist_sq: f32,
    pub(crate) hash: u32,
}

pub type QueryResults = SmallVec<[QueryResult; 1]>;

/// `hit` is true iff `results` is non-empty.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct QueryOutcome {
    pub hit: bool,
    pub results: QueryResults,
}

impl QueryOutcome {
    pub fn new(results: QueryResults) -> Self {
        Self {
            hit: !results.is_empty(),
            results,
        }
    }

    pub fn entities(&self) -> impl Iterator<Item = EntityHandle> + '_ {
        self.results.iter().map(|r| r.entity)
    }
}
