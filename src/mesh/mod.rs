//! Mesh records on both sides of distribution.
//!
//! - [`SerialMesh`] is the boundary to whatever holds the authoritative serial
//!   mesh; [`SimpleMesh`] is a minimal flat-array implementation of it.
//! - [`GlobalMeshData`] is the root-only snapshot extracted from a serial mesh
//!   in one pass.
//! - [`LocalMeshData`] is the share of that snapshot owned by one rank, in
//!   global numbering. It is read-only once built.

pub mod meshgen;

use crate::algs::wire::WireMeshHeader;
use crate::mesh_error::MeshDistError;
use crate::partitioning::IndexRange;
use serde::{Deserialize, Serialize};
use std::fmt;

/// A vertex as seen through [`SerialMesh::vertices`].
#[derive(Copy, Clone, Debug)]
pub struct VertexRef<'a> {
    /// Global vertex index.
    pub index: usize,
    pub coordinates: &'a [f64],
}

/// A cell as seen through [`SerialMesh::cells`].
#[derive(Copy, Clone, Debug)]
pub struct CellRef<'a> {
    pub index: usize,
    /// Global indices of the cell's vertices, in local cell order.
    pub vertices: &'a [usize],
}

/// What distribution needs from a serially held mesh.
pub trait SerialMesh {
    fn gdim(&self) -> usize;
    fn tdim(&self) -> usize;
    fn num_vertices(&self) -> usize;
    fn num_cells(&self) -> usize;
    fn vertices(&self) -> Box<dyn Iterator<Item = VertexRef<'_>> + '_>;
    fn cells(&self) -> Box<dyn Iterator<Item = CellRef<'_>> + '_>;
}

/// Flat-array mesh with a single cell shape.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct SimpleMesh {
    gdim: usize,
    tdim: usize,
    vertices_per_cell: usize,
    coordinates: Vec<f64>,
    cells: Vec<usize>,
}

impl SimpleMesh {
    /// `coordinates` holds `gdim` values per vertex, `cells` holds
    /// `vertices_per_cell` vertex indices per cell.
    pub fn new(
        gdim: usize,
        tdim: usize,
        coordinates: Vec<f64>,
        vertices_per_cell: usize,
        cells: Vec<usize>,
    ) -> Result<Self, MeshDistError> {
        if gdim == 0 {
            return Err(MeshDistError::InvalidMesh("gdim must be non-zero".into()));
        }
        if coordinates.len() % gdim != 0 {
            return Err(MeshDistError::InvalidMesh(format!(
                "{} coordinate values is not a multiple of gdim {gdim}",
                coordinates.len()
            )));
        }
        if vertices_per_cell == 0 && !cells.is_empty() {
            return Err(MeshDistError::InvalidMesh(
                "cells given with zero vertices per cell".into(),
            ));
        }
        if vertices_per_cell != 0 && cells.len() % vertices_per_cell != 0 {
            return Err(MeshDistError::InvalidMesh(format!(
                "{} connectivity entries is not a multiple of {vertices_per_cell}",
                cells.len()
            )));
        }
        let num_vertices = coordinates.len() / gdim;
        if let Some(&bad) = cells.iter().find(|&&v| v >= num_vertices) {
            return Err(MeshDistError::OutOfRange {
                index: bad,
                len: num_vertices,
            });
        }
        Ok(Self {
            gdim,
            tdim,
            vertices_per_cell,
            coordinates,
            cells,
        })
    }

    pub fn vertices_per_cell(&self) -> usize {
        self.vertices_per_cell
    }
}

impl SerialMesh for SimpleMesh {
    fn gdim(&self) -> usize {
        self.gdim
    }
    fn tdim(&self) -> usize {
        self.tdim
    }
    fn num_vertices(&self) -> usize {
        self.coordinates.len() / self.gdim
    }
    fn num_cells(&self) -> usize {
        if self.vertices_per_cell == 0 {
            0
        } else {
            self.cells.len() / self.vertices_per_cell
        }
    }
    fn vertices(&self) -> Box<dyn Iterator<Item = VertexRef<'_>> + '_> {
        Box::new(
            self.coordinates
                .chunks_exact(self.gdim)
                .enumerate()
                .map(|(index, coordinates)| VertexRef { index, coordinates }),
        )
    }
    fn cells(&self) -> Box<dyn Iterator<Item = CellRef<'_>> + '_> {
        Box::new(
            self.cells
                .chunks_exact(self.vertices_per_cell.max(1))
                .enumerate()
                .map(|(index, vertices)| CellRef { index, vertices }),
        )
    }
}

/// Scalar metadata shared by every rank after distribution.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct MeshMetadata {
    pub gdim: usize,
    pub tdim: usize,
    pub vertices_per_cell: usize,
    pub num_global_vertices: usize,
    pub num_global_cells: usize,
}

impl From<&MeshMetadata> for WireMeshHeader {
    fn from(m: &MeshMetadata) -> Self {
        WireMeshHeader::new(
            m.gdim,
            m.tdim,
            m.vertices_per_cell,
            m.num_global_vertices,
            m.num_global_cells,
        )
    }
}

impl From<&WireMeshHeader> for MeshMetadata {
    fn from(h: &WireMeshHeader) -> Self {
        MeshMetadata {
            gdim: h.gdim(),
            tdim: h.tdim(),
            vertices_per_cell: h.vertices_per_cell(),
            num_global_vertices: h.num_vertices(),
            num_global_cells: h.num_cells(),
        }
    }
}

/// Root-only snapshot of a serial mesh.
#[derive(Clone, Debug, PartialEq)]
pub struct GlobalMeshData {
    metadata: MeshMetadata,
    vertex_coordinates: Vec<f64>,
    vertex_indices: Vec<u64>,
    cell_vertices: Vec<u64>,
}

impl GlobalMeshData {
    /// Walk `mesh` once, copying coordinates, global vertex indices and cell connectivity.
    pub fn extract<M: SerialMesh + ?Sized>(mesh: &M) -> Result<Self, MeshDistError> {
        let gdim = mesh.gdim();
        let num_vertices = mesh.num_vertices();
        let num_cells = mesh.num_cells();
        if gdim == 0 {
            return Err(MeshDistError::InvalidMesh("gdim must be non-zero".into()));
        }

        let mut vertex_coordinates = Vec::with_capacity(num_vertices * gdim);
        let mut vertex_indices = Vec::with_capacity(num_vertices);
        let mut seen = vec![false; num_vertices];
        for vertex in mesh.vertices() {
            if vertex.coordinates.len() != gdim {
                return Err(MeshDistError::InvalidMesh(format!(
                    "vertex {} has {} coordinates, expected {gdim}",
                    vertex.index,
                    vertex.coordinates.len()
                )));
            }
            if vertex.index >= num_vertices {
                return Err(MeshDistError::OutOfRange {
                    index: vertex.index,
                    len: num_vertices,
                });
            }
            if std::mem::replace(&mut seen[vertex.index], true) {
                return Err(MeshDistError::InvalidMesh(format!(
                    "global vertex index {} yielded twice",
                    vertex.index
                )));
            }
            vertex_coordinates.extend_from_slice(vertex.coordinates);
            vertex_indices.push(vertex.index as u64);
        }
        if vertex_indices.len() != num_vertices {
            return Err(MeshDistError::InvalidMesh(format!(
                "mesh reports {num_vertices} vertices but yielded {}",
                vertex_indices.len()
            )));
        }

        let mut vertices_per_cell = None;
        let mut cell_vertices = Vec::new();
        let mut seen_cells = 0;
        for cell in mesh.cells() {
            let vpc = *vertices_per_cell.get_or_insert_with(|| {
                cell_vertices.reserve(num_cells * cell.vertices.len());
                cell.vertices.len()
            });
            if cell.vertices.len() != vpc || vpc == 0 {
                return Err(MeshDistError::InvalidMesh(format!(
                    "cell {} has {} vertices, expected {vpc}",
                    cell.index,
                    cell.vertices.len()
                )));
            }
            for &v in cell.vertices {
                if v >= num_vertices {
                    return Err(MeshDistError::OutOfRange {
                        index: v,
                        len: num_vertices,
                    });
                }
                cell_vertices.push(v as u64);
            }
            seen_cells += 1;
        }
        if seen_cells != num_cells {
            return Err(MeshDistError::InvalidMesh(format!(
                "mesh reports {num_cells} cells but yielded {seen_cells}"
            )));
        }

        Ok(Self {
            metadata: MeshMetadata {
                gdim,
                tdim: mesh.tdim(),
                vertices_per_cell: vertices_per_cell.unwrap_or(0),
                num_global_vertices: num_vertices,
                num_global_cells: num_cells,
            },
            vertex_coordinates,
            vertex_indices,
            cell_vertices,
        })
    }

    pub fn metadata(&self) -> &MeshMetadata {
        &self.metadata
    }

    pub fn num_vertices(&self) -> usize {
        self.metadata.num_global_vertices
    }

    pub fn num_cells(&self) -> usize {
        self.metadata.num_global_cells
    }

    pub fn vertex_coordinates(&self) -> &[f64] {
        &self.vertex_coordinates
    }

    pub fn vertex_indices(&self) -> &[u64] {
        &self.vertex_indices
    }

    pub fn cell_vertices(&self) -> &[u64] {
        &self.cell_vertices
    }

    /// Arrays for vertices in `vertices` and cells in `cells`:
    /// `(vertex indices, cell connectivity, coordinates)`.
    pub(crate) fn slice(
        &self,
        vertices: IndexRange,
        cells: IndexRange,
    ) -> (&[u64], &[u64], &[f64]) {
        let gdim = self.metadata.gdim;
        let vpc = self.metadata.vertices_per_cell;
        (
            &self.vertex_indices[vertices.as_range()],
            &self.cell_vertices[cells.first * vpc..cells.last * vpc],
            &self.vertex_coordinates[vertices.first * gdim..vertices.last * gdim],
        )
    }
}

/// One rank's share of a distributed mesh, in global numbering.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct LocalMeshData {
    metadata: MeshMetadata,
    vertex_range: IndexRange,
    cell_range: IndexRange,
    vertex_coordinates: Vec<f64>,
    vertex_indices: Vec<u64>,
    cell_vertices: Vec<u64>,
}

impl LocalMeshData {
    /// Build from arrays whose lengths must match the ranges and metadata.
    pub(crate) fn from_parts(
        metadata: MeshMetadata,
        vertex_range: IndexRange,
        cell_range: IndexRange,
        vertex_indices: Vec<u64>,
        cell_vertices: Vec<u64>,
        vertex_coordinates: Vec<f64>,
    ) -> Result<Self, MeshDistError> {
        let checks = [
            ("vertex_indices", vertex_range.len(), vertex_indices.len()),
            (
                "cell_vertices",
                cell_range.len() * metadata.vertices_per_cell,
                cell_vertices.len(),
            ),
            (
                "vertex_coordinates",
                vertex_range.len() * metadata.gdim,
                vertex_coordinates.len(),
            ),
        ];
        for (op, expected, found) in checks {
            if expected != found {
                return Err(MeshDistError::size_mismatch(op, expected, found));
            }
        }
        Ok(Self {
            metadata,
            vertex_range,
            cell_range,
            vertex_coordinates,
            vertex_indices,
            cell_vertices,
        })
    }

    /// Copy the share of `global` given by the two ranges.
    pub(crate) fn from_global_slice(
        global: &GlobalMeshData,
        vertex_range: IndexRange,
        cell_range: IndexRange,
    ) -> Result<Self, MeshDistError> {
        let (indices, cells, coords) = global.slice(vertex_range, cell_range);
        Self::from_parts(
            global.metadata,
            vertex_range,
            cell_range,
            indices.to_vec(),
            cells.to_vec(),
            coords.to_vec(),
        )
    }

    pub fn metadata(&self) -> &MeshMetadata {
        &self.metadata
    }
    pub fn gdim(&self) -> usize {
        self.metadata.gdim
    }
    pub fn tdim(&self) -> usize {
        self.metadata.tdim
    }
    pub fn vertices_per_cell(&self) -> usize {
        self.metadata.vertices_per_cell
    }
    pub fn num_global_vertices(&self) -> usize {
        self.metadata.num_global_vertices
    }
    pub fn num_global_cells(&self) -> usize {
        self.metadata.num_global_cells
    }

    /// Global positions `[first, last)` of the vertices held here.
    pub fn vertex_range(&self) -> IndexRange {
        self.vertex_range
    }

    /// Global cell indices `[first, last)` held here.
    pub fn cell_range(&self) -> IndexRange {
        self.cell_range
    }

    pub fn num_local_vertices(&self) -> usize {
        self.vertex_indices.len()
    }

    pub fn num_local_cells(&self) -> usize {
        self.cell_range.len()
    }

    pub fn vertex_coordinates(&self) -> &[f64] {
        &self.vertex_coordinates
    }

    pub fn vertex_indices(&self) -> &[u64] {
        &self.vertex_indices
    }

    pub fn cell_vertices(&self) -> &[u64] {
        &self.cell_vertices
    }

    /// `(global index, coordinates)` for each local vertex.
    pub fn vertices(&self) -> impl Iterator<Item = (u64, &[f64])> + '_ {
        self.vertex_indices
            .iter()
            .copied()
            .zip(self.vertex_coordinates.chunks_exact(self.metadata.gdim.max(1)))
    }

    /// `(global cell index, global vertex indices)` for each local cell.
    pub fn cells(&self) -> impl Iterator<Item = (usize, &[u64])> + '_ {
        self.cell_range.as_range().zip(
            self.cell_vertices
                .chunks_exact(self.metadata.vertices_per_cell.max(1)),
        )
    }
}

/// A single process owns the whole mesh: move the arrays over unchanged.
impl From<GlobalMeshData> for LocalMeshData {
    fn from(global: GlobalMeshData) -> Self {
        let m = global.metadata;
        Self {
            vertex_range: IndexRange {
                first: 0,
                last: m.num_global_vertices,
            },
            cell_range: IndexRange {
                first: 0,
                last: m.num_global_cells,
            },
            metadata: m,
            vertex_coordinates: global.vertex_coordinates,
            vertex_indices: global.vertex_indices,
            cell_vertices: global.cell_vertices,
        }
    }
}

impl fmt::Display for LocalMeshData {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "LocalMeshData(gdim={}, tdim={}, vertices {} of {}, cells {} of {})",
            self.gdim(),
            self.tdim(),
            self.vertex_range,
            self.num_global_vertices(),
            self.cell_range,
            self.num_global_cells()
        )
    }
}
