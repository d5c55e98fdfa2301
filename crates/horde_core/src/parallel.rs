//! Thread and batch sizing for data-parallel passes.

use rayon::prelude::*;

/// How a workload of `count` items is split across the pool.
#[derive(Debug, Copy, Clone, PartialEq, Eq)]
pub struct BatchPlan {
    pub threads: usize,
    pub batch_size: usize,
}

impl BatchPlan {
    /// `threads = clamp(count / min_batch, 1, max_threads)`,
    /// `batch_size = ceil(count / threads)`.
    ///
    /// Small workloads collapse to one batch; large ones never exceed
    /// `max_threads` batches.
    pub fn new(count: usize, max_threads: usize, min_batch_size: usize) -> Self {
        let threads = (count / min_batch_size.max(1)).clamp(1, max_threads.max(1));
        let batch_size = count.div_ceil(threads).max(1);
        Self {
            threads,
            batch_size,
        }
    }

    /// Index ranges of each batch.
    pub fn ranges(&self, count: usize) -> impl Iterator<Item = std::ops::Range<usize>> + '_ {
        let batch_size = self.batch_size;
        (0..self.threads)
            .map(move |batch| batch * batch_size..((batch + 1) * batch_size).min(count))
            .filter(|range| !range.is_empty())
    }

    /// Run `f` over `items` in `batch_size` chunks on the current rayon pool.
    pub fn for_each_mut<T, F>(&self, items: &mut [T], f: F)
    where
        T: Send,
        F: Fn(&mut T) + Sync + Send,
    {
        if self.threads == 1 {
            items.iter_mut().for_each(f);
            return;
        }
        items
            .par_chunks_mut(self.batch_size)
            .for_each(|chunk| chunk.iter_mut().for_each(&f));
    }

    /// Read-only counterpart of [`BatchPlan::for_each_mut`].
    pub fn for_each<T, F>(&self, items: &[T], f: F)
    where
        T: Sync,
        F: Fn(&T) + Sync + Send,
    {
        if self.threads == 1 {
            items.iter().for_each(f);
            return;
        }
        items
            .par_chunks(self.batch_size)
            .for_each(|chunk| chunk.iter().for_each(&f));
    }
}
