mod util;
use util::*;

use mesh_dist::algs::collectives::{barrier, distribute};
use mesh_dist::prelude::*;
use std::time::Duration;

#[test]
fn scatter_one_from_non_zero_root() {
    let got = run_ranks(4, |group| {
        let values = [10u64, 11, 12, 13];
        let mine = group.is_root(2).then_some(&values[..]);
        scatter_one(&*group, 2, mine).unwrap()
    });
    assert_eq!(got, vec![vec![10], vec![11], vec![12], vec![13]]);
}

#[test]
fn scatter_with_wrong_length_delivers_nothing() {
    let fabric = LocalFabric::new(3)
        .unwrap()
        .with_timeout(Duration::from_millis(200));
    let got = run_ranks_on(&fabric, |group| {
        let values = [1u32, 2];
        let mine = group.is_root(0).then_some(&values[..]);
        scatter_one(&*group, 0, mine)
    });
    assert_eq!(got[0], Err(MeshDistError::size_mismatch("scatter_one", 3, 2)));
    for worker in &got[1..] {
        assert!(matches!(worker, Err(MeshDistError::ProtocolViolation(_))));
    }
}

#[test]
fn all_gather_orders_by_rank() {
    let got = run_ranks(4, |group| {
        let mut slots = [0u32; 4];
        slots[group.rank()] = (group.rank() * group.rank()) as u32;
        all_gather(&*group, &mut slots).unwrap();
        slots
    });
    for slots in got {
        assert_eq!(slots, [0, 1, 4, 9]);
    }
}

#[test]
fn all_reduce_max_agrees_everywhere() {
    let got = run_ranks(5, |group| {
        let value = [3u64, 41, 7, 0, 40][group.rank()];
        all_reduce_max(&*group, value).unwrap()
    });
    assert_eq!(got, vec![41; 5]);
}

#[test]
fn send_receive_reports_actual_count() {
    // Ring: rank r sends r + 1 values to r + 1 and receives from r - 1.
    let got = run_ranks(3, |group| {
        let (me, p) = (group.rank(), group.size());
        let send: Vec<f64> = (0..=me).map(|i| (10 * me + i) as f64).collect();
        let mut recv = [f64::NAN; 8];
        let n = send_receive(&*group, &send, (me + 1) % p, &mut recv, (me + p - 1) % p).unwrap();
        recv[..n].to_vec()
    });
    assert_eq!(got[0], vec![20.0, 21.0, 22.0]);
    assert_eq!(got[1], vec![0.0]);
    assert_eq!(got[2], vec![10.0, 11.0]);
}

#[test]
fn send_receive_overflow_is_size_mismatch() {
    let got = run_ranks(2, |group| {
        let other = 1 - group.rank();
        let mut recv = [0u64; 1];
        send_receive(&*group, &[1u64, 2, 3], other, &mut recv, other)
    });
    for r in got {
        assert_eq!(r, Err(MeshDistError::size_mismatch("recv", 8, 24)));
    }
}

#[test]
fn distribute_routes_by_partition() {
    let got = run_ranks(3, |group| {
        let me = group.rank() as u64;
        let values: Vec<u64> = (0..6).map(|i| 100 * me + i).collect();
        let partition: Vec<usize> = (0..6).map(|i| i % 3).collect();
        distribute(&*group, &values, &partition).unwrap()
    });
    for (rank, (values, sources)) in got.iter().enumerate() {
        let want: Vec<u64> = (0..3u64)
            .flat_map(|src| [100 * src + rank as u64, 100 * src + rank as u64 + 3])
            .collect();
        assert_permutation(values, &want);
        for (v, &src) in values.iter().zip(sources) {
            assert_eq!((v / 100) as usize, src);
        }
        assert_eq!(&sources[..2], &[rank, rank]);
    }
}

#[test]
fn duplicated_groups_and_barrier() {
    let got = run_ranks(3, |group| {
        let inner = group.duplicate().unwrap();
        barrier(&*inner).unwrap();
        let mut slots = [0u16; 3];
        slots[inner.rank()] = inner.rank() as u16 + 1;
        all_gather(&*inner, &mut slots).unwrap();
        barrier(&*group).unwrap();
        slots
    });
    assert!(got.iter().all(|s| *s == [1, 2, 3]));
}
