//! Thread-tier helpers: per-worker rayon pools and the accumulate-then-merge reduction

use crate::error::Result;
use parking_lot::Mutex;
use rayon::prelude::*;
use serde::{Deserialize, Serialize};

/// Configuration for a worker's thread pool
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ParallelConfig {
    /// `None` sizes the pool to the machine
    pub n_threads: Option<usize>,
}

impl ParallelConfig {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_threads(mut self, n: usize) -> Self {
        self.n_threads = Some(n);
        self
    }

    pub fn num_threads(&self) -> usize {
        self.n_threads.unwrap_or_else(rayon::current_num_threads)
    }

    /// Build a dedicated pool sized by this configuration
    pub fn build_pool(&self) -> Result<rayon::ThreadPool> {
        Ok(rayon::ThreadPoolBuilder::new()
            .num_threads(self.num_threads())
            .build()?)
    }
}

/// Accumulate-then-merge reduction.
///
/// Every rayon task folds its share of `iter` into a task-local partial built by
/// `identity`; each finished partial is merged into `acc` while holding its lock.
pub fn reduce_with<I, A, P, ID, F, M>(iter: I, acc: A, identity: ID, fold: F, merge: M) -> A
where
    I: ParallelIterator,
    A: Send,
    P: Send,
    ID: Fn() -> P + Sync + Send,
    F: Fn(P, I::Item) -> P + Sync + Send,
    M: Fn(&mut A, P) + Sync + Send,
{
    let shared = Mutex::new(acc);
    iter.fold(&identity, fold)
        .for_each(|partial| merge(&mut shared.lock(), partial));
    shared.into_inner()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_reduce_with_sums() {
        let total = reduce_with(
            (0..1000u64).into_par_iter(),
            0u64,
            || 0u64,
            |partial, x| partial + x,
            |acc, partial| *acc += partial,
        );
        assert_eq!(total, 999 * 1000 / 2);
    }

    #[test]
    fn test_reduce_with_vector_partials() {
        let counts = reduce_with(
            (0..100usize).into_par_iter(),
            vec![0usize; 3],
            || vec![0usize; 3],
            |mut partial, x| {
                partial[x % 3] += 1;
                partial
            },
            |acc, partial| {
                for (a, p) in acc.iter_mut().zip(partial) {
                    *a += p;
                }
            },
        );
        assert_eq!(counts, vec![34, 33, 33]);
    }

    #[test]
    fn test_parallel_config() {
        let config = ParallelConfig::new().with_threads(2);
        assert_eq!(config.num_threads(), 2);
        let pool = config.build_pool().unwrap();
        assert_eq!(pool.current_num_threads(), 2);
    }
}
