// Distributes a 16x16 triangulated unit square from rank 0 over every rank of
// the job and prints each rank's share. Without `mpi-support` it runs as a
// single process.
//
//   cargo mpirun -n 4 --features mpi-support --example distribute_unit_square
use mesh_dist::algs::collectives::barrier;
use mesh_dist::prelude::*;

fn main() -> Result<(), MeshDistError> {
    let fabric = mesh_dist::fabric::init(&FabricConfig::default())?;
    let group = ProcessGroup::new(&fabric)?;
    let config = DistributionConfig::default();

    let mesh = if group.is_root(config.root) {
        Some(unit_square(16, 16)?)
    } else {
        None
    };
    let local = distribute_mesh(&group, mesh.as_ref(), &config)?;

    println!("rank {}: {}", group.rank(), local);
    barrier(&*group)?;
    Ok(())
}
