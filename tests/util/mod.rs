#![allow(dead_code)]
use mesh_dist::prelude::*;
use std::time::Duration;

/// Receive timeout for threaded tests; a hung protocol fails instead of blocking the suite.
pub const WATCHDOG: Duration = Duration::from_secs(10);

/// Run `f` on every rank of a fresh `size`-rank [`LocalFabric`], one thread per
/// rank, and return the results in rank order.
pub fn run_ranks<R, F>(size: usize, f: F) -> Vec<R>
where
    R: Send,
    F: Fn(ProcessGroup<'_>) -> R + Sync,
{
    let fabric = LocalFabric::new(size).unwrap().with_timeout(WATCHDOG);
    run_ranks_on(&fabric, f)
}

/// Like [`run_ranks`] but on a caller-configured fabric.
pub fn run_ranks_on<R, F>(fabric: &LocalFabric, f: F) -> Vec<R>
where
    R: Send,
    F: Fn(ProcessGroup<'_>) -> R + Sync,
{
    let endpoints = fabric.endpoints();
    let f = &f;
    std::thread::scope(|s| {
        let joins: Vec<_> = endpoints
            .iter()
            .map(|ep| s.spawn(move || f(ProcessGroup::from_communicator(ep).unwrap())))
            .collect();
        joins.into_iter().map(|j| j.join().unwrap()).collect()
    })
}

/// Assert vec is a permutation of another vec (order-agnostic).
pub fn assert_permutation<T: Ord + Copy + std::fmt::Debug>(got: &[T], want: &[T]) {
    let mut a = got.to_vec();
    a.sort_unstable();
    let mut b = want.to_vec();
    b.sort_unstable();
    assert_eq!(a, b, "not a permutation\n got={:?}\nwant={:?}", got, want);
}
