//! Two-phase sweep: geometry on the pool, filtering on the owner thread.

use super::collect::{scan, DeferredGate};
use super::shapes::Sweep;
use super::{DetachedOptions, QueryOptions, QueryResult};
use crate::grid::UniformGrid;
use crate::store::EntityStore;
use parking_lot::{Condvar, Mutex};
use std::sync::mpsc::{channel, Receiver, Sender};
use std::sync::Arc;

/// Completion callback: `(hit, results)`.
pub type SweepCallback = Box<dyn FnOnce(bool, Vec<QueryResult>) + Send>;

/// Phase-1 output waiting for the owner thread.
struct Provisional {
    results: Vec<QueryResult>,
    options: DetachedOptions,
    callback: SweepCallback,
}

#[derive(Default)]
struct InFlight {
    count: Mutex<usize>,
    idle: Condvar,
}

impl InFlight {
    fn start(&self) {
        *self.count.lock() += 1;
    }

    fn finish(&self) {
        let mut count = self.count.lock();
        *count = count.saturating_sub(1);
        if *count == 0 {
            self.idle.notify_all();
        }
    }
}

/// Queue of sweeps whose background phase has been scheduled.
pub struct AsyncQueries {
    sender: Sender<Provisional>,
    receiver: Receiver<Provisional>,
    in_flight: Arc<InFlight>,
}

impl Default for AsyncQueries {
    fn default() -> Self {
        Self::new()
    }
}

impl AsyncQueries {
    pub fn new() -> Self {
        let (sender, receiver) = channel();
        Self {
            sender,
            receiver,
            in_flight: Arc::new(InFlight::default()),
        }
    }

    /// Schedule the geometric phase on `pool`. The callback fires from a
    /// later [`AsyncQueries::pump`] on the owner thread.
    pub fn sweep(
        &self,
        pool: &rayon::ThreadPool,
        grid: Arc<UniformGrid>,
        sweep: Sweep,
        options: &QueryOptions<'_>,
        callback: SweepCallback,
    ) {
        let options = options.detach();
        let sender = self.sender.clone();
        let in_flight = self.in_flight.clone();
        in_flight.start();

        pool.spawn(move || {
            let results = scan(&grid, &sweep, &options.borrow(), &DeferredGate).into_vec();
            drop(grid);
            let provisional = Provisional {
                results,
                options,
                callback,
            };
            if sender.send(provisional).is_err() {
                tracing::warn!("async sweep finished after its queue was dropped");
            }
            in_flight.finish();
        });
    }

    pub fn in_flight(&self) -> usize {
        *self.in_flight.count.lock()
    }

    /// Block until every scheduled phase 1 has released its grid handle.
    pub fn wait_idle(&self) {
        let mut count = self.in_flight.count.lock();
        while *count > 0 {
            self.in_flight.idle.wait(&mut count);
        }
    }

    /// Finish every completed sweep: drop stale handles, apply the trait
    /// filter and count limit, then fire the callback. Returns the number
    /// of callbacks fired.
    pub fn pump<S: EntityStore + ?Sized>(&self, store: &S) -> usize {
        let mut fired = 0;
        for Provisional {
            mut results,
            options,
            callback,
        } in self.receiver.try_iter()
        {
            results.retain(|r| store.is_valid(r.entity) && store.matches(r.entity, &options.filter));
            if let Some(limit) = options.keep_count.limit() {
                results.truncate(limit);
            }
            callback(!results.is_empty(), results);
            fired += 1;
        }
        if fired > 0 {
            tracing::trace!(fired, "async sweeps completed");
        }
        fired
    }
}

impl Drop for AsyncQueries {
    fn drop(&mut self) {
        let pending = self.receiver.try_iter().count() + self.in_flight();
        if pending > 0 {
            tracing::warn!(pending, "dropping async sweeps without firing their callbacks");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::debug::NullSink;
    use crate::entity::EntityHandle;
    use crate::grid::{GridConfig, GridEntry};
    use crate::query::{KeepCount, SortMode};
    use crate::traits::{TraitFilter, TraitMask};
    use glam::{UVec3, Vec3};
    use std::collections::HashMap;

    struct Store(HashMap<EntityHandle, TraitMask>);

    impl EntityStore for Store {
        fn is_valid(&self, entity: EntityHandle) -> bool {
            self.0.contains_key(&entity)
        }

        fn traits(&self, entity: EntityHandle) -> Option<TraitMask> {
            self.0.get(&entity).copied()
        }
    }

    #[test]
    fn sweep_completes_on_pump() {
        let config = GridConfig {
            cell_size: Vec3::ONE,
            grid_size: UVec3::new(20, 4, 1),
            origin: Vec3::ZERO,
            ..GridConfig::default()
        };
        let mut grid = UniformGrid::new(config, Arc::new(NullSink)).unwrap();
        let mut store = Store(HashMap::new());
        {
            let pass = grid.begin_registration();
            for i in 0..10u32 {
                let handle = EntityHandle::new(i, 0);
                let traits = if i % 2 == 0 { TraitMask::AGENT } else { TraitMask::AGENT | TraitMask::DYING };
                store.0.insert(handle, traits);
                pass.register_agent(GridEntry::sphere(handle, Vec3::new(i as f32 + 0.5, 2.0, 0.5), 0.2), false);
            }
            pass.finish();
        }
        let mut grid = Arc::new(grid);
        let pool = rayon::ThreadPoolBuilder::new().num_threads(2).build().unwrap();
        let queries = AsyncQueries::new();

        let received = Arc::new(Mutex::new(None));
        let sink = received.clone();
        let sweep = Sweep::new(Vec3::new(0.0, 2.0, 0.5), Vec3::new(19.0, 2.0, 0.5), 0.5);
        let options = QueryOptions::sorted(SortMode::NearToFar, sweep.start)
            .keep(KeepCount::Limit(3))
            .filtered(TraitFilter::ANY.excluding(TraitMask::DYING));
        queries.sweep(&pool, grid.clone(), sweep, &options, Box::new(move |hit, results| {
            *sink.lock() = Some((hit, results));
        }));

        queries.wait_idle();
        assert_eq!(queries.in_flight(), 0);
        assert!(Arc::get_mut(&mut grid).is_some());

        // Despawned before the owner thread finalizes.
        store.0.remove(&EntityHandle::new(0, 0));
        assert_eq!(queries.pump(&store), 1);

        let (hit, results) = received.lock().take().unwrap();
        assert!(hit);
        let indices: Vec<u32> = results.iter().map(|r| r.entity.index()).collect();
        assert_eq!(indices, vec![2, 4, 6]);
        assert_eq!(queries.pump(&store), 0);
    }
}
