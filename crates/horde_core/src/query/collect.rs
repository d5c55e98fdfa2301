//! The scan shared by every query shape.

use super::cells::{order, CandidateCell};
use super::{KeepCount, QueryOptions, QueryResult, QueryResults, SortMode};
use crate::debug::{DebugSink, DebugStyle};
use crate::entity::EntityHandle;
use crate::grid::{GridEntry, Layer, UniformGrid};
use crate::store::EntityStore;
use crate::traits::TraitFilter;
use glam::Vec3;
use rand::seq::SliceRandom;
use std::cmp::Ordering;
use std::collections::BinaryHeap;

/// A query volume.
pub(crate) trait QueryShape {
    const NAME: &'static str;

    /// Finite dimensions and non-negative radii.
    fn is_valid(&self) -> bool;

    /// Cells that may hold a match, widened by `reach`.
    fn candidate_cells(&self, grid: &UniformGrid, reach: f32) -> Vec<usize>;

    /// Exact test. Returns `(hit_point, shape_point)` on a match.
    fn test(&self, entry: &GridEntry) -> Option<(Vec3, Vec3)>;

    fn draw(&self, sink: &dyn DebugSink, style: DebugStyle);
}

/// Checks that need the entity store.
pub(crate) trait Gate {
    /// Whether results are final, which allows early termination.
    const FINAL: bool;

    fn is_valid(&self, entity: EntityHandle) -> bool;

    fn passes_filter(&self, entity: EntityHandle) -> bool;
}

pub(crate) struct StoreGate<'a, S: ?Sized> {
    pub store: &'a S,
    pub filter: TraitFilter,
}

impl<S: EntityStore + ?Sized> Gate for StoreGate<'_, S> {
    const FINAL: bool = true;

    #[inline]
    fn is_valid(&self, entity: EntityHandle) -> bool {
        self.store.is_valid(entity)
    }

    #[inline]
    fn passes_filter(&self, entity: EntityHandle) -> bool {
        self.store.matches(entity, &self.filter)
    }
}

/// Admits everything; the owner thread filters later.
pub(crate) struct DeferredGate;

impl Gate for DeferredGate {
    const FINAL: bool = false;

    fn is_valid(&self, _entity: EntityHandle) -> bool {
        true
    }

    fn passes_filter(&self, _entity: EntityHandle) -> bool {
        true
    }
}

enum IgnoreSet {
    Linear(Vec<EntityHandle>),
    Hashed(hashbrown::HashSet<EntityHandle>),
}

impl IgnoreSet {
    fn new(ignore: &[EntityHandle]) -> Self {
        if ignore.len() <= 16 {
            IgnoreSet::Linear(ignore.to_vec())
        } else {
            IgnoreSet::Hashed(ignore.iter().copied().collect())
        }
    }

    #[inline]
    fn contains(&self, entity: &EntityHandle) -> bool {
        match self {
            IgnoreSet::Linear(list) => list.contains(entity),
            IgnoreSet::Hashed(set) => set.contains(entity),
        }
    }
}

/// Ranking key: smaller is better under the active sort mode.
#[derive(Debug, Copy, Clone)]
struct Rank {
    key: f32,
    hash: u32,
    dist_sq: f32,
}

impl Rank {
    fn of(result: &QueryResult, sort: SortMode) -> Self {
        let key = match sort {
            SortMode::FarToNear => -result.dist_sq,
            SortMode::NearToFar | SortMode::None => result.dist_sq,
        };
        Self {
            key,
            hash: result.hash,
            dist_sq: result.dist_sq,
        }
    }
}

impl Ord for Rank {
    fn cmp(&self, other: &Self) -> Ordering {
        self.key
            .total_cmp(&other.key)
            .then(self.hash.cmp(&other.hash))
    }
}

impl PartialOrd for Rank {
    fn partial_cmp(&self, other: &Self) -> Option<Ordering> {
        Some(self.cmp(other))
    }
}

impl PartialEq for Rank {
    fn eq(&self, other: &Self) -> bool {
        self.cmp(other) == Ordering::Equal
    }
}

impl Eq for Rank {}

pub(crate) fn rank_order(a: &QueryResult, b: &QueryResult, sort: SortMode) -> Ordering {
    Rank::of(a, sort).cmp(&Rank::of(b, sort))
}

/// Accumulates matches under a `KeepCount`.
pub(crate) struct Collector {
    keep: KeepCount,
    sort: SortMode,
    best: Option<QueryResult>,
    list: Vec<QueryResult>,
    /// Max-heap of the best `limit` ranks; its top is the worst kept.
    kept: BinaryHeap<Rank>,
}

impl Collector {
    pub fn new(keep: KeepCount, sort: SortMode) -> Self {
        let keep = match keep {
            KeepCount::Limit(1) => KeepCount::Best,
            other => other,
        };
        Self {
            keep,
            sort,
            best: None,
            list: Vec::new(),
            kept: BinaryHeap::new(),
        }
    }

    pub fn offer(&mut self, result: QueryResult) {
        match self.keep {
            KeepCount::Best => {
                let better = self
                    .best
                    .as_ref()
                    .map_or(true, |best| rank_order(&result, best, self.sort) == Ordering::Less);
                if better {
                    self.best = Some(result);
                }
            }
            KeepCount::Limit(limit) => {
                if self.sort != SortMode::None {
                    self.kept.push(Rank::of(&result, self.sort));
                    if self.kept.len() > limit {
                        self.kept.pop();
                    }
                }
                self.list.push(result);
            }
            KeepCount::All => self.list.push(result),
        }
    }

    /// Squared distance of the worst result that would still be kept,
    /// once the limit is saturated.
    pub fn bound(&self) -> Option<f32> {
        if self.sort == SortMode::None {
            return None;
        }
        match self.keep {
            KeepCount::Best => self.best.map(|best| best.dist_sq),
            KeepCount::Limit(limit) if limit > 0 && self.kept.len() >= limit => {
                self.kept.peek().map(|rank| rank.dist_sq)
            }
            _ => None,
        }
    }

    /// Unordered single-result queries stop at the first match.
    pub fn satisfied(&self) -> bool {
        self.sort == SortMode::None && self.keep == KeepCount::Best && self.best.is_some()
    }

    pub fn finish(self) -> QueryResults {
        let Collector {
            keep,
            sort,
            best,
            mut list,
            ..
        } = self;

        if keep == KeepCount::Best {
            return best.into_iter().collect();
        }

        match sort {
            SortMode::None => list.shuffle(&mut rand::thread_rng()),
            _ => list.sort_unstable_by(|a, b| rank_order(a, b, sort)),
        }
        if let Some(limit) = keep.limit() {
            list.truncate(limit);
        }
        QueryResults::from_vec(list)
    }
}

/// True once no cell from `cell` onward can beat the worst kept result.
///
/// An entry's center lies within half a cell diagonal of its home cell's
/// center; the bound allows a full two diagonals.
fn past_threshold(cell: &CandidateCell, worst_dist_sq: f32, sort: SortMode, slack: f32) -> bool {
    let worst = worst_dist_sq.sqrt();
    match sort {
        SortMode::NearToFar => {
            let limit = worst + slack;
            cell.dist_sq > limit * limit
        }
        SortMode::FarToNear => {
            let limit = worst - slack;
            limit > 0.0 && cell.dist_sq < limit * limit
        }
        SortMode::None => false,
    }
}

/// Run one query over the agent layer.
pub(crate) fn scan<Q: QueryShape, G: Gate>(
    grid: &UniformGrid,
    shape: &Q,
    options: &QueryOptions<'_>,
    gate: &G,
) -> QueryResults {
    if !shape.is_valid() {
        tracing::trace!(shape = Q::NAME, "rejected degenerate query shape");
        return QueryResults::new();
    }
    let reach = grid.agent_reach() + grid.half_diagonal();
    let cells = order(
        grid,
        shape.candidate_cells(grid, reach),
        options.sort,
        options.sort_origin,
    );
    let candidate_count = cells.len();

    let ignore = IgnoreSet::new(options.ignore);
    let keep = if G::FINAL {
        options.keep_count
    } else {
        KeepCount::All
    };
    let mut collector = Collector::new(keep, options.sort);
    let mut seen = hashbrown::HashSet::<u32>::new();
    let slack = 2.0 * grid.cell_diagonal();
    let mut visited = 0usize;

    'cells: for cell in &cells {
        if G::FINAL {
            if let Some(worst) = collector.bound() {
                if past_threshold(cell, worst, options.sort, slack) {
                    break;
                }
            }
        }
        visited += 1;

        for entry in grid.entries_at(Layer::Agents, cell.index) {
            if !gate.is_valid(entry.entity) || ignore.contains(&entry.entity) {
                continue;
            }
            let Some((hit_point, shape_point)) = shape.test(entry) else {
                continue;
            };
            if !seen.insert(entry.hash) {
                continue;
            }
            if let Some(occlusion) = &options.occlusion {
                if occlusion.blocks(grid, entry, |occluder| gate.is_valid(occluder)) {
                    continue;
                }
            }
            if !gate.passes_filter(entry.entity) {
                continue;
            }

            collector.offer(QueryResult {
                entity: entry.entity,
                position: entry.position,
                hit_point,
                shape_point,
                dist_sq: entry.position.distance_squared(options.sort_origin),
                hash: entry.hash,
            });
            if collector.satisfied() {
                break 'cells;
            }
        }
    }

    let results = collector.finish();

    if options.debug.enabled {
        let sink = grid.debug_sink();
        shape.draw(sink, options.debug.shape);
        options
            .debug
            .hit_points(sink, results.iter().map(|r| r.hit_point));
    }

    tracing::trace!(
        shape = Q::NAME,
        candidates = candidate_count,
        visited,
        hits = results.len(),
        "query"
    );
    results
}
