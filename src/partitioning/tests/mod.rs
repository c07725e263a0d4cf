use super::*;

#[test]
fn ten_items_over_three_ranks() {
    let ranges: Vec<_> = (0..3).map(|r| local_range(10, 3, r).unwrap()).collect();
    assert_eq!(
        ranges,
        vec![
            IndexRange { first: 0, last: 4 },
            IndexRange { first: 4, last: 7 },
            IndexRange { first: 7, last: 10 },
        ]
    );
    assert_eq!(owner_of(6, 10, 3).unwrap(), 1);
    assert_eq!(owner_of(7, 10, 3).unwrap(), 2);
}

#[test]
fn empty_set_gives_empty_ranges_and_no_valid_index() {
    let part = IndexPartition::new(0, 4).unwrap();
    for range in part.ranges() {
        assert_eq!(range, IndexRange { first: 0, last: 0 });
        assert!(range.is_empty());
    }
    assert_eq!(part.ranges().count(), 4);
    assert_eq!(
        owner_of(0, 0, 4),
        Err(MeshDistError::OutOfRange { index: 0, len: 0 })
    );
}

#[test]
fn single_rank_owns_everything() {
    assert_eq!(local_range(17, 1, 0).unwrap(), IndexRange { first: 0, last: 17 });
    for i in 0..17 {
        assert_eq!(owner_of(i, 17, 1).unwrap(), 0);
    }
}

#[test]
fn more_ranks_than_items() {
    let part = IndexPartition::new(2, 5).unwrap();
    assert_eq!(part.counts(), vec![1, 1, 0, 0, 0]);
    assert_eq!(part.owner(1).unwrap(), 1);
    assert_eq!(part.range(4).unwrap(), IndexRange { first: 2, last: 2 });
}

#[test]
fn index_past_end_is_out_of_range() {
    assert_eq!(
        owner_of(10, 10, 3),
        Err(MeshDistError::OutOfRange { index: 10, len: 10 })
    );
}

#[test]
fn invalid_rank_queries_are_rejected() {
    assert_eq!(
        local_range(10, 3, 3),
        Err(MeshDistError::InvalidRank { rank: 3, size: 3 })
    );
    assert!(local_range(10, 0, 0).is_err());
    assert!(IndexPartition::new(10, 0).is_err());
}

#[test]
fn range_display_is_half_open() {
    assert_eq!(IndexRange { first: 4, last: 7 }.to_string(), "[4, 7)");
}
