//! MeshDistError: Unified error type for mesh-dist public APIs
//!
//! Every condition reported here is a contract violation by the caller or by a
//! cooperating rank. None of them is transient, so nothing in this crate retries;
//! callers are expected to abort the job on error.

use thiserror::Error;

/// Unified error type for fabric, collective, partitioning and distribution operations.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum MeshDistError {
    /// The communication substrate is not available for the named call.
    #[error("communication fabric unavailable in `{call}`")]
    FabricUnavailable { call: &'static str },
    /// A buffer handed to a collective has the wrong length.
    #[error("size mismatch in `{op}`: expected {expected}, found {found}")]
    SizeMismatch {
        op: &'static str,
        expected: usize,
        found: usize,
    },
    /// A global index query past the end of the indexed set.
    #[error("index {index} out of range for {len} items")]
    OutOfRange { index: usize, len: usize },
    /// A rank (or rank count) outside the process group.
    #[error("rank {rank} is not valid for a group of {size} processes")]
    InvalidRank { rank: usize, size: usize },
    /// Ranks disagree about the protocol they are running.
    #[error("protocol violation: {0}")]
    ProtocolViolation(String),
    /// A point-to-point transfer with `neighbor` failed.
    #[error("communication error with rank {neighbor}: {message}")]
    CommError { neighbor: usize, message: String },
    /// Serial mesh data is inconsistent with its own metadata.
    #[error("invalid mesh: {0}")]
    InvalidMesh(String),
    /// The root rank was asked to distribute but was given no mesh.
    #[error("rank {rank} is the distribution root but holds no mesh")]
    MissingMesh { rank: usize },
}

impl MeshDistError {
    /// Shorthand for a [`MeshDistError::SizeMismatch`].
    pub fn size_mismatch(op: &'static str, expected: usize, found: usize) -> Self {
        MeshDistError::SizeMismatch {
            op,
            expected,
            found,
        }
    }
}
