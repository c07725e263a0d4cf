//! Fixed, versioned, little-endian wire types for mesh distribution.

use crate::mesh_error::MeshDistError;
use bytemuck::{Pod, Zeroable};
use static_assertions::const_assert_eq;
use std::mem::{align_of, size_of};

/// Bump when the layout or semantics change in incompatible ways.
pub const WIRE_VERSION: u16 = 1;

/// Header flag: the root failed before broadcasting and no mesh follows.
pub const FLAG_ABORT: u16 = 1;

// All multi-byte integers in these structs are little-endian on the wire.
// We store them pre-LE with `.to_le()` and decode with `.from_le()`.

/// Scalar mesh metadata, sent before any array so receivers can size buffers.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable)]
pub struct WireMeshHeader {
    pub version_le: u16,
    pub flags_le: u16,
    pub gdim_le: u32,
    pub tdim_le: u32,
    pub vertices_per_cell_le: u32,
    pub num_vertices_le: u64,
    pub num_cells_le: u64,
}

impl WireMeshHeader {
    pub fn new(
        gdim: usize,
        tdim: usize,
        vertices_per_cell: usize,
        num_vertices: usize,
        num_cells: usize,
    ) -> Self {
        Self {
            version_le: WIRE_VERSION.to_le(),
            flags_le: 0,
            gdim_le: (gdim as u32).to_le(),
            tdim_le: (tdim as u32).to_le(),
            vertices_per_cell_le: (vertices_per_cell as u32).to_le(),
            num_vertices_le: (num_vertices as u64).to_le(),
            num_cells_le: (num_cells as u64).to_le(),
        }
    }
    /// Header sent in place of a real one when the root cannot proceed.
    pub fn aborted() -> Self {
        Self {
            flags_le: FLAG_ABORT.to_le(),
            ..Self::new(0, 0, 0, 0, 0)
        }
    }
    pub fn is_aborted(&self) -> bool {
        u16::from_le(self.flags_le) & FLAG_ABORT != 0
    }
    pub fn version(&self) -> u16 {
        u16::from_le(self.version_le)
    }
    pub fn gdim(&self) -> usize {
        u32::from_le(self.gdim_le) as usize
    }
    pub fn tdim(&self) -> usize {
        u32::from_le(self.tdim_le) as usize
    }
    pub fn vertices_per_cell(&self) -> usize {
        u32::from_le(self.vertices_per_cell_le) as usize
    }
    pub fn num_vertices(&self) -> usize {
        u64::from_le(self.num_vertices_le) as usize
    }
    pub fn num_cells(&self) -> usize {
        u64::from_le(self.num_cells_le) as usize
    }

    /// Reject headers written by an incompatible peer.
    pub fn check_version(&self) -> Result<(), MeshDistError> {
        if self.version() == WIRE_VERSION {
            Ok(())
        } else {
            Err(MeshDistError::ProtocolViolation(format!(
                "wire version {} (expected {WIRE_VERSION})",
                self.version()
            )))
        }
    }
}

/// Per-rank item counts the root is about to send.
#[repr(C)]
#[derive(Copy, Clone, Debug, Pod, Zeroable, PartialEq, Eq)]
pub struct WireCounts {
    pub vertices_le: u64,
    pub cells_le: u64,
}

impl WireCounts {
    pub fn new(vertices: usize, cells: usize) -> Self {
        Self {
            vertices_le: (vertices as u64).to_le(),
            cells_le: (cells as u64).to_le(),
        }
    }
    pub fn vertices(&self) -> usize {
        u64::from_le(self.vertices_le) as usize
    }
    pub fn cells(&self) -> usize {
        u64::from_le(self.cells_le) as usize
    }
}

// ===== Mesh payload ========================================================
//
// One message per rank:
//   vertex global indices  u64 LE  x nv
//   cell connectivity      u64 LE  x nc * vertices_per_cell
//   vertex coordinates     f64 LE  x nv * gdim

/// Byte length of a payload carrying `vertices` vertices and `cells` cells.
pub fn payload_len(header: &WireMeshHeader, vertices: usize, cells: usize) -> usize {
    8 * (vertices + cells * header.vertices_per_cell() + vertices * header.gdim())
}

/// Encode one rank's share of the mesh.
pub fn encode_payload(indices: &[u64], cells: &[u64], coordinates: &[f64]) -> Vec<u8> {
    let mut buf = Vec::with_capacity(8 * (indices.len() + cells.len() + coordinates.len()));
    for v in indices.iter().chain(cells) {
        buf.extend_from_slice(&v.to_le_bytes());
    }
    for x in coordinates {
        buf.extend_from_slice(&x.to_le_bytes());
    }
    buf
}

/// Decoded payload: `(indices, cells, coordinates)`.
pub type Payload = (Vec<u64>, Vec<u64>, Vec<f64>);

/// Decode a payload whose shape is known from the header and counts.
pub fn decode_payload(
    bytes: &[u8],
    header: &WireMeshHeader,
    counts: &WireCounts,
) -> Result<Payload, MeshDistError> {
    let expected = payload_len(header, counts.vertices(), counts.cells());
    if bytes.len() != expected {
        return Err(MeshDistError::size_mismatch("decode_payload", expected, bytes.len()));
    }
    let n_idx = counts.vertices();
    let n_cell = counts.cells() * header.vertices_per_cell();
    let mut words = bytes.chunks_exact(8).map(|c| {
        let mut w = [0u8; 8];
        w.copy_from_slice(c);
        w
    });
    let indices = words.by_ref().take(n_idx).map(u64::from_le_bytes).collect();
    let cells = words.by_ref().take(n_cell).map(u64::from_le_bytes).collect();
    let coordinates = words.map(f64::from_le_bytes).collect();
    Ok((indices, cells, coordinates))
}

pub fn cast_slice<T: Pod>(v: &[T]) -> &[u8] {
    bytemuck::cast_slice(v)
}

pub fn cast_slice_mut<T: Pod>(v: &mut [T]) -> &mut [u8] {
    bytemuck::cast_slice_mut(v)
}

// ===== Compile-time sanity checks =========================================

const_assert_eq!(size_of::<WireMeshHeader>(), 32);
const_assert_eq!(align_of::<WireMeshHeader>(), 8);
const_assert_eq!(size_of::<WireCounts>(), 16);

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn header_survives_bytes() {
        let h = WireMeshHeader::new(2, 2, 3, 25, 32);
        let mut out = WireMeshHeader::zeroed();
        cast_slice_mut(std::slice::from_mut(&mut out)).copy_from_slice(cast_slice(&[h]));
        assert_eq!(out.version(), WIRE_VERSION);
        assert_eq!(
            (out.gdim(), out.tdim(), out.vertices_per_cell()),
            (2, 2, 3)
        );
        assert_eq!((out.num_vertices(), out.num_cells()), (25, 32));
        assert!(out.check_version().is_ok());
        assert!(!out.is_aborted());
        assert!(WireMeshHeader::aborted().is_aborted());
    }

    #[test]
    fn version_guard() {
        let mut h = WireMeshHeader::new(1, 1, 2, 2, 1);
        h.version_le = 99u16.to_le();
        assert!(matches!(
            h.check_version(),
            Err(MeshDistError::ProtocolViolation(_))
        ));
    }

    #[test]
    fn payload_sections_stay_apart() {
        let h = WireMeshHeader::new(2, 2, 3, 3, 1);
        let counts = WireCounts::new(2, 1);
        let bytes = encode_payload(&[4, 5], &[4, 5, 9], &[0.0, 0.5, 1.0, -1.5]);
        assert_eq!(bytes.len(), payload_len(&h, 2, 1));
        let (idx, cells, coords) = decode_payload(&bytes, &h, &counts).unwrap();
        assert_eq!(idx, vec![4, 5]);
        assert_eq!(cells, vec![4, 5, 9]);
        assert_eq!(coords, vec![0.0, 0.5, 1.0, -1.5]);
    }

    #[test]
    fn short_payload_is_rejected() {
        let h = WireMeshHeader::new(2, 2, 3, 3, 1);
        let err = decode_payload(&[0u8; 8], &h, &WireCounts::new(1, 0)).unwrap_err();
        assert_eq!(err, MeshDistError::size_mismatch("decode_payload", 24, 8));
    }
}
