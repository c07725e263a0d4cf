#![cfg_attr(docsrs, feature(doc_cfg))]
//! # mesh-dist
//!
//! mesh-dist is the process-group and index-partitioning layer of a parallel
//! finite-element code. A job of P cooperating processes uses it to agree on a
//! contiguous ownership of a globally indexed set, to move data between
//! processes with blocking collectives, and to spread a mesh held on one
//! process over all of them.
//!
//! ## Features
//! - [`fabric::init`] brings up a serial, in-process or MPI fabric
//! - [`algs::process_group::ProcessGroup`] gives each algorithm its own communication context
//! - [`partitioning::local_range`] and [`partitioning::owner_of`] compute block ownership without communication
//! - [`algs::collectives`] offers typed scatter, all-gather, all-reduce and paired send/receive
//! - [`algs::distribute::distribute_mesh`] splits a serial mesh into per-rank [`mesh::LocalMeshData`]
//!
//! ## Usage
//!
//! ```toml
//! [dependencies]
//! mesh-dist = "0.1"
//! # features = ["mpi-support"]
//! ```
//!
//! ```
//! use mesh_dist::prelude::*;
//!
//! let fabric = mesh_dist::fabric::init(&FabricConfig {
//!     backend: FabricBackend::Serial,
//! })?;
//! let group = ProcessGroup::new(&fabric)?;
//! let mesh = unit_square(4, 4)?;
//! let local = distribute_mesh(&group, Some(&mesh), &DistributionConfig::default())?;
//! assert_eq!(local.num_local_cells(), 32);
//! # Ok::<(), MeshDistError>(())
//! ```
//!
//! Without `mpi-support`, [`algs::communicator::LocalFabric`] runs several
//! ranks as threads of one process; the `local_ranks` demo shows how.

pub mod algs;
pub mod fabric;
pub mod mesh;
pub mod mesh_error;
pub mod partitioning;

/// A convenient prelude to import the most-used traits & types:
pub mod prelude {
    pub use crate::algs::collectives::{all_gather, all_reduce_max, scatter_one, send_receive};
    pub use crate::algs::communicator::{CommTag, Communicator, LocalFabric, NoComm};
    #[cfg(feature = "mpi-support")]
    pub use crate::algs::communicator::MpiComm;
    pub use crate::algs::distribute::{DistributionConfig, Role, distribute_mesh};
    pub use crate::algs::process_group::ProcessGroup;
    pub use crate::fabric::{FabricBackend, FabricConfig, FabricHandle};
    pub use crate::mesh::meshgen::{unit_cube, unit_interval, unit_square};
    pub use crate::mesh::{GlobalMeshData, LocalMeshData, SerialMesh, SimpleMesh};
    pub use crate::mesh_error::MeshDistError;
    pub use crate::partitioning::{IndexPartition, IndexRange, local_range, owner_of};
}
