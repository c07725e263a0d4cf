// Runs four ranks as threads of this process over an in-process fabric,
// distributes a unit cube and checks that every vertex has exactly one owner.
//
//   cargo run --example local_ranks
use mesh_dist::prelude::*;
use std::time::Duration;

fn main() -> Result<(), MeshDistError> {
    const RANKS: usize = 4;
    let fabric = LocalFabric::new(RANKS)?.with_timeout(Duration::from_secs(30));
    let handles = fabric.endpoints();
    let mesh = unit_cube(3, 3, 3)?;

    let shares = std::thread::scope(|s| {
        let joins: Vec<_> = handles
            .iter()
            .map(|ep| {
                let mesh = &mesh;
                s.spawn(move || {
                    let group = ProcessGroup::from_communicator(ep)?;
                    let config = DistributionConfig::default();
                    distribute_mesh(&group, group.is_root(config.root).then_some(mesh), &config)
                })
            })
            .collect();
        joins
            .into_iter()
            .map(|j| {
                j.join().unwrap_or_else(|_| {
                    Err(MeshDistError::ProtocolViolation("rank thread panicked".into()))
                })
            })
            .collect::<Result<Vec<_>, _>>()
    })?;

    let owned: usize = shares.iter().map(|l| l.num_local_vertices()).sum();
    for (rank, local) in shares.iter().enumerate() {
        println!("rank {rank}: {local}");
    }
    println!("{owned} of {} vertices owned", mesh.num_vertices());

    let mut owners = vec![0usize; mesh.num_vertices()];
    for index in shares.iter().flat_map(|l| l.vertex_indices()) {
        owners[*index as usize] += 1;
    }
    if let Some(v) = owners.iter().position(|&n| n != 1) {
        return Err(MeshDistError::ProtocolViolation(format!(
            "vertex {v} has {} owners",
            owners[v]
        )));
    }
    Ok(())
}
