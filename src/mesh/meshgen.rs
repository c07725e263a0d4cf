//! Structured simplex meshes of the unit interval, square and cube.
//!
//! Vertices are numbered lexicographically with x fastest. Cells are numbered
//! per structured block in the same order, with the simplices of each block
//! consecutive.

use crate::mesh::SimpleMesh;
use crate::mesh_error::MeshDistError;
use itertools::iproduct;

fn check_divisions(n: &[usize]) -> Result<(), MeshDistError> {
    if n.iter().any(|&d| d == 0) {
        return Err(MeshDistError::InvalidMesh(format!(
            "every direction needs at least one division, got {n:?}"
        )));
    }
    Ok(())
}

/// `n` intervals on `[0, 1]`.
pub fn unit_interval(n: usize) -> Result<SimpleMesh, MeshDistError> {
    check_divisions(&[n])?;
    let coords = (0..=n).map(|i| i as f64 / n as f64).collect();
    let cells = (0..n).flat_map(|i| [i, i + 1]).collect();
    SimpleMesh::new(1, 1, coords, 2, cells)
}

/// `nx * ny` squares on `[0, 1]^2`, each cut into two triangles along its diagonal.
pub fn unit_square(nx: usize, ny: usize) -> Result<SimpleMesh, MeshDistError> {
    check_divisions(&[nx, ny])?;
    let vid = |i: usize, j: usize| j * (nx + 1) + i;

    let mut coords = Vec::with_capacity(2 * (nx + 1) * (ny + 1));
    for (j, i) in iproduct!(0..=ny, 0..=nx) {
        coords.extend([i as f64 / nx as f64, j as f64 / ny as f64]);
    }

    let mut cells = Vec::with_capacity(6 * nx * ny);
    for (j, i) in iproduct!(0..ny, 0..nx) {
        let (v0, v1) = (vid(i, j), vid(i + 1, j));
        let (v2, v3) = (vid(i, j + 1), vid(i + 1, j + 1));
        cells.extend([v0, v1, v3, v0, v2, v3]);
    }
    SimpleMesh::new(2, 2, coords, 3, cells)
}

/// `nx * ny * nz` hexahedra on `[0, 1]^3`, each cut into six tetrahedra
/// sharing the main diagonal.
pub fn unit_cube(nx: usize, ny: usize, nz: usize) -> Result<SimpleMesh, MeshDistError> {
    check_divisions(&[nx, ny, nz])?;
    let vid = |i: usize, j: usize, k: usize| (k * (ny + 1) + j) * (nx + 1) + i;

    let mut coords = Vec::with_capacity(3 * (nx + 1) * (ny + 1) * (nz + 1));
    for (k, j, i) in iproduct!(0..=nz, 0..=ny, 0..=nx) {
        coords.extend([
            i as f64 / nx as f64,
            j as f64 / ny as f64,
            k as f64 / nz as f64,
        ]);
    }

    let mut cells = Vec::with_capacity(24 * nx * ny * nz);
    for (k, j, i) in iproduct!(0..nz, 0..ny, 0..nx) {
        let v = [
            vid(i, j, k),
            vid(i + 1, j, k),
            vid(i, j + 1, k),
            vid(i + 1, j + 1, k),
            vid(i, j, k + 1),
            vid(i + 1, j, k + 1),
            vid(i, j + 1, k + 1),
            vid(i + 1, j + 1, k + 1),
        ];
        for [a, b] in [[1, 3], [1, 5], [4, 5], [2, 3], [4, 6], [2, 6]] {
            cells.extend([v[0], v[a], v[b], v[7]]);
        }
    }
    SimpleMesh::new(3, 3, coords, 4, cells)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mesh::SerialMesh;

    #[test]
    fn interval_counts_and_ends() {
        let m = unit_interval(4).unwrap();
        assert_eq!((m.num_vertices(), m.num_cells()), (5, 4));
        let last = m.vertices().last().unwrap();
        assert_eq!(last.coordinates, &[1.0]);
        assert_eq!(m.cells().nth(3).unwrap().vertices, &[3, 4]);
    }

    #[test]
    fn square_counts() {
        let m = unit_square(4, 4).unwrap();
        assert_eq!((m.gdim(), m.tdim()), (2, 2));
        assert_eq!((m.num_vertices(), m.num_cells()), (25, 32));
        assert!(m.cells().all(|c| c.vertices.len() == 3));
    }

    #[test]
    fn cube_counts_and_volume() {
        let m = unit_cube(2, 1, 1).unwrap();
        assert_eq!((m.num_vertices(), m.num_cells()), (12, 12));
        let x: Vec<&[f64]> = m.vertices().map(|v| v.coordinates).collect();
        let volume: f64 = m
            .cells()
            .map(|c| {
                let p = |n: usize| x[c.vertices[n]];
                let d = |n: usize| [0, 1, 2].map(|a| p(n)[a] - p(0)[a]);
                let (a, b, e) = (d(1), d(2), d(3));
                let det = a[0] * (b[1] * e[2] - b[2] * e[1]) - a[1] * (b[0] * e[2] - b[2] * e[0])
                    + a[2] * (b[0] * e[1] - b[1] * e[0]);
                det.abs() / 6.0
            })
            .sum();
        assert!((volume - 1.0).abs() < 1e-12);
    }

    #[test]
    fn zero_divisions_rejected() {
        assert!(matches!(unit_square(0, 3), Err(MeshDistError::InvalidMesh(_))));
    }
}
