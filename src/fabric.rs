//! Fabric initialization.
//!
//! The job entry point calls [`init`] exactly once and passes the resulting
//! [`FabricHandle`] to every [`ProcessGroup`](crate::algs::process_group::ProcessGroup)
//! it creates. Dropping the handle tears the fabric down (for MPI this finalizes
//! the library), so it must outlive every group built on it.

use crate::algs::communicator::{Communicator, LocalComm, LocalFabric, NoComm};
use crate::mesh_error::MeshDistError;
use serde::{Deserialize, Serialize};

/// Which communication substrate to bring up.
#[derive(Copy, Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum FabricBackend {
    /// MPI if compiled with `mpi-support`, otherwise serial.
    #[default]
    Auto,
    /// A single process with no fabric.
    Serial,
    /// MPI; requires the `mpi-support` feature.
    Mpi,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct FabricConfig {
    pub backend: FabricBackend,
}

enum Backend {
    Serial(NoComm),
    Local(LocalComm),
    #[cfg(feature = "mpi-support")]
    Mpi {
        world: crate::algs::communicator::MpiComm,
        // Dropped last: finalizes MPI.
        _universe: mpi::environment::Universe,
    },
}

/// Process-wide fabric state produced by [`init`].
pub struct FabricHandle {
    backend: Backend,
}

impl FabricHandle {
    /// Handle for a single process with no fabric.
    pub fn serial() -> Self {
        Self {
            backend: Backend::Serial(NoComm),
        }
    }

    /// Handle for one rank of an in-process [`LocalFabric`].
    pub fn local(comm: LocalComm) -> Self {
        Self {
            backend: Backend::Local(comm),
        }
    }

    /// One handle per rank of `fabric`, in rank order.
    pub fn local_ranks(fabric: &LocalFabric) -> Vec<Self> {
        fabric.endpoints().into_iter().map(Self::local).collect()
    }

    /// The world communicator; groups duplicate this rather than using it directly.
    pub fn world(&self) -> &dyn Communicator {
        match &self.backend {
            Backend::Serial(comm) => comm,
            Backend::Local(comm) => comm,
            #[cfg(feature = "mpi-support")]
            Backend::Mpi { world, .. } => world,
        }
    }

    pub fn rank(&self) -> usize {
        self.world().rank()
    }

    pub fn size(&self) -> usize {
        self.world().size()
    }

    pub fn backend_name(&self) -> &'static str {
        match &self.backend {
            Backend::Serial(_) => "serial",
            Backend::Local(_) => "local",
            #[cfg(feature = "mpi-support")]
            Backend::Mpi { .. } => "mpi",
        }
    }
}

impl std::fmt::Debug for FabricHandle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FabricHandle")
            .field("backend", &self.backend_name())
            .field("rank", &self.rank())
            .field("size", &self.size())
            .finish()
    }
}

/// Bring up the fabric described by `config`.
///
/// MPI can be initialized only once per process; a second call fails with
/// `FabricUnavailable` rather than returning a second handle.
pub fn init(config: &FabricConfig) -> Result<FabricHandle, MeshDistError> {
    let handle = match config.backend {
        FabricBackend::Serial => FabricHandle::serial(),
        #[cfg(feature = "mpi-support")]
        FabricBackend::Mpi | FabricBackend::Auto => init_mpi()?,
        #[cfg(not(feature = "mpi-support"))]
        FabricBackend::Mpi => return Err(MeshDistError::FabricUnavailable { call: "init" }),
        #[cfg(not(feature = "mpi-support"))]
        FabricBackend::Auto => FabricHandle::serial(),
    };
    log::info!(
        "fabric up: backend={} rank={} size={}",
        handle.backend_name(),
        handle.rank(),
        handle.size()
    );
    Ok(handle)
}

#[cfg(feature = "mpi-support")]
fn init_mpi() -> Result<FabricHandle, MeshDistError> {
    use crate::algs::communicator::MpiComm;
    use once_cell::sync::OnceCell;

    static INITIALIZED: OnceCell<()> = OnceCell::new();
    if INITIALIZED.set(()).is_err() {
        log::error!("MPI initialization requested twice in one process");
        return Err(MeshDistError::FabricUnavailable { call: "init" });
    }
    let universe = mpi::initialize().ok_or_else(|| {
        log::error!("MPI_Init failed or MPI was already initialized elsewhere");
        MeshDistError::FabricUnavailable { call: "MPI_Init" }
    })?;
    let world = MpiComm::new(universe.world());
    Ok(FabricHandle {
        backend: Backend::Mpi {
            world,
            _universe: universe,
        },
    })
}
