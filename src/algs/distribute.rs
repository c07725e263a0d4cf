//! Root/worker distribution of a serially held mesh.
//!
//! The root extracts the whole mesh, then every rank takes part in
//!
//! 1. `scatter_one` of the [`WireMeshHeader`] (same header for all),
//! 2. `scatter_one` of the per-rank [`WireCounts`],
//! 3. `all_reduce_max` of the payload byte length, the shared receive capacity,
//! 4. one `send_receive` between the root and each worker carrying that worker's payload.
//!
//! Workers recompute their ranges with [`local_range`] and check every count
//! the root announces against their own. A single-process group never touches
//! the communicator.

use crate::algs::collectives::{all_reduce_max, scatter_one, send_receive};
use crate::algs::communicator::{Communicator, check_peer};
use crate::algs::process_group::ProcessGroup;
use crate::algs::wire::{WireCounts, WireMeshHeader, decode_payload, encode_payload, payload_len};
use crate::mesh::{GlobalMeshData, LocalMeshData, MeshMetadata, SerialMesh};
use crate::mesh_error::MeshDistError;
use crate::partitioning::{IndexPartition, IndexRange, local_range};
use serde::{Deserialize, Serialize};

#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct DistributionConfig {
    /// Rank that holds the serial mesh.
    pub root: usize,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum RootState {
    Idle,
    Extracting,
    Broadcasting,
    Done,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum WorkerState {
    Idle,
    Receiving,
    Done,
}

fn violation(rank: usize, message: String) -> MeshDistError {
    log::error!("[rank {rank}] protocol violation: {message}");
    MeshDistError::ProtocolViolation(message)
}

/// The rank that owns the serial mesh and feeds every other rank.
#[derive(Debug)]
pub struct RootRole {
    rank: usize,
    state: RootState,
}

impl RootRole {
    pub fn state(&self) -> RootState {
        self.state
    }

    fn advance(&mut self, next: RootState) {
        log::debug!("[rank {}] root {:?} -> {:?}", self.rank, self.state, next);
        self.state = next;
    }

    /// Extract `mesh` and hand each rank its share; returns the root's own share.
    ///
    /// If the mesh is missing or cannot be extracted, the workers are sent an
    /// abort header so they fail instead of waiting.
    pub fn run<M: SerialMesh + ?Sized>(
        &mut self,
        comm: &dyn Communicator,
        mesh: Option<&M>,
    ) -> Result<LocalMeshData, MeshDistError> {
        if self.state != RootState::Idle {
            return Err(violation(
                self.rank,
                format!("root role run again from {:?}", self.state),
            ));
        }
        self.advance(RootState::Extracting);
        let size = comm.size();
        let extracted = mesh
            .ok_or(MeshDistError::MissingMesh { rank: self.rank })
            .and_then(GlobalMeshData::extract);
        let global = match extracted {
            Ok(global) => global,
            Err(e) => {
                if size > 1 {
                    let abort = vec![WireMeshHeader::aborted(); size];
                    scatter_one(comm, self.rank, Some(abort.as_slice()))?;
                }
                return Err(e);
            }
        };

        if size == 1 {
            self.advance(RootState::Done);
            return Ok(LocalMeshData::from(global));
        }

        self.advance(RootState::Broadcasting);
        let meta = *global.metadata();
        let header = WireMeshHeader::from(&meta);
        scatter_one(comm, self.rank, Some(vec![header; size].as_slice()))?;

        let vertices = IndexPartition::new(meta.num_global_vertices, size)?;
        let cells = IndexPartition::new(meta.num_global_cells, size)?;
        let ranges: Vec<(IndexRange, IndexRange)> =
            vertices.ranges().zip(cells.ranges()).collect();
        let counts: Vec<WireCounts> = ranges
            .iter()
            .map(|(v, c)| WireCounts::new(v.len(), c.len()))
            .collect();
        scatter_one(comm, self.rank, Some(counts.as_slice()))?;

        let payloads: Vec<Vec<u8>> = ranges
            .iter()
            .enumerate()
            .map(|(rank, &(v, c))| {
                if rank == self.rank {
                    Vec::new()
                } else {
                    let (indices, conn, coords) = global.slice(v, c);
                    encode_payload(indices, conn, coords)
                }
            })
            .collect();
        let longest = payloads.iter().map(Vec::len).max().unwrap_or(0);
        all_reduce_max(comm, longest as u64)?;

        for (rank, payload) in payloads.iter().enumerate() {
            if rank == self.rank {
                continue;
            }
            log::debug!(
                "[rank {}] sending {} bytes to rank {rank}",
                self.rank,
                payload.len()
            );
            let echoed = send_receive::<u8>(comm, payload, rank, &mut [], rank)?;
            if echoed != 0 {
                return Err(violation(
                    self.rank,
                    format!("rank {rank} replied with {echoed} bytes"),
                ));
            }
        }

        let (v, c) = ranges[self.rank];
        let local = LocalMeshData::from_global_slice(&global, v, c)?;
        self.advance(RootState::Done);
        Ok(local)
    }
}

/// Any rank other than the root.
#[derive(Debug)]
pub struct WorkerRole {
    rank: usize,
    root: usize,
    state: WorkerState,
}

impl WorkerRole {
    pub fn state(&self) -> WorkerState {
        self.state
    }

    fn advance(&mut self, next: WorkerState) {
        log::debug!("[rank {}] worker {:?} -> {:?}", self.rank, self.state, next);
        self.state = next;
    }

    /// Receive this rank's share from the root.
    pub fn run(&mut self, comm: &dyn Communicator) -> Result<LocalMeshData, MeshDistError> {
        if self.state != WorkerState::Idle {
            return Err(violation(
                self.rank,
                format!("worker role run again from {:?}", self.state),
            ));
        }
        self.advance(WorkerState::Receiving);
        let (rank, size, root) = (self.rank, comm.size(), self.root);

        let header = scatter_one::<WireMeshHeader>(comm, root, None)?[0];
        if header.is_aborted() {
            return Err(violation(rank, format!("root {root} aborted distribution")));
        }
        header.check_version()?;
        let meta = MeshMetadata::from(&header);

        let counts = scatter_one::<WireCounts>(comm, root, None)?[0];
        let vertex_range = local_range(meta.num_global_vertices, size, rank)?;
        let cell_range = local_range(meta.num_global_cells, size, rank)?;
        if counts.vertices() != vertex_range.len() || counts.cells() != cell_range.len() {
            return Err(violation(
                rank,
                format!(
                    "root announced {} vertices and {} cells, expected {} and {}",
                    counts.vertices(),
                    counts.cells(),
                    vertex_range.len(),
                    cell_range.len()
                ),
            ));
        }

        let expected = payload_len(&header, counts.vertices(), counts.cells());
        let capacity = all_reduce_max(comm, expected as u64)? as usize;
        let mut buf = vec![0u8; capacity];
        let got = send_receive::<u8>(comm, &[], root, &mut buf, root)?;
        if got != expected {
            return Err(violation(
                rank,
                format!("payload of {got} bytes, expected {expected}"),
            ));
        }
        log::debug!("[rank {rank}] received {got} bytes from rank {root}");

        let (indices, cells, coords) = decode_payload(&buf[..got], &header, &counts)?;
        let local =
            LocalMeshData::from_parts(meta, vertex_range, cell_range, indices, cells, coords)?;
        self.advance(WorkerState::Done);
        Ok(local)
    }
}

/// What this rank does during distribution, fixed once per group.
#[derive(Debug)]
pub enum Role {
    Root(RootRole),
    Worker(WorkerRole),
}

impl Role {
    pub fn select(group: &ProcessGroup<'_>, config: &DistributionConfig) -> Result<Self, MeshDistError> {
        let (rank, size) = (group.rank(), group.size());
        check_peer(config.root, size)?;
        let role = if group.is_root(config.root) {
            Role::Root(RootRole {
                rank,
                state: RootState::Idle,
            })
        } else {
            Role::Worker(WorkerRole {
                rank,
                root: config.root,
                state: WorkerState::Idle,
            })
        };
        log::info!(
            "[rank {rank}/{size}] selected {} role",
            if role.is_root() { "root" } else { "worker" }
        );
        Ok(role)
    }

    pub fn is_root(&self) -> bool {
        matches!(self, Role::Root(_))
    }

    /// Run the role once. `mesh` is only looked at on the root.
    pub fn run<M: SerialMesh + ?Sized>(
        &mut self,
        comm: &dyn Communicator,
        mesh: Option<&M>,
    ) -> Result<LocalMeshData, MeshDistError> {
        match self {
            Role::Root(root) => root.run(comm, mesh),
            Role::Worker(worker) => worker.run(comm),
        }
    }
}

/// Collective: distribute the mesh held on `config.root` over `group`.
///
/// Every rank returns its own [`LocalMeshData`]. Vertices are split by their
/// position in the root's vertex order, cells by cell index, both with
/// [`local_range`].
pub fn distribute_mesh<M: SerialMesh + ?Sized>(
    group: &ProcessGroup<'_>,
    mesh: Option<&M>,
    config: &DistributionConfig,
) -> Result<LocalMeshData, MeshDistError> {
    let mut role = Role::select(group, config)?;
    role.run(&**group, mesh)
}
