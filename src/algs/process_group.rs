//! Scoped communication contexts.
//!
//! A [`ProcessGroup`] owns a duplicate of its parent's context for as long as it
//! lives, so two groups in flight at once never see each other's messages. The
//! duplicate is released when the group is dropped.

use crate::algs::communicator::Communicator;
use crate::fabric::FabricHandle;
use crate::mesh_error::MeshDistError;
use std::ops::Deref;

pub struct ProcessGroup<'a> {
    comm: Box<dyn Communicator + 'a>,
}

impl<'a> ProcessGroup<'a> {
    /// Collective over the world of `fabric`.
    pub fn new(fabric: &'a FabricHandle) -> Result<Self, MeshDistError> {
        Self::from_communicator(fabric.world())
    }

    /// Collective over every rank of `parent`.
    pub fn from_communicator(parent: &'a dyn Communicator) -> Result<Self, MeshDistError> {
        let comm = parent.duplicate()?;
        debug_assert!(comm.rank() < comm.size());
        log::trace!("process group {}/{} created", comm.rank(), comm.size());
        Ok(Self { comm })
    }

    /// Collective: a further independent group over the same ranks.
    pub fn duplicate(&self) -> Result<ProcessGroup<'_>, MeshDistError> {
        ProcessGroup::from_communicator(&*self.comm)
    }

    pub fn rank(&self) -> usize {
        self.comm.rank()
    }

    pub fn size(&self) -> usize {
        self.comm.size()
    }

    /// True on `root`, the rank that broadcasts in root/worker protocols.
    pub fn is_root(&self, root: usize) -> bool {
        self.rank() == root
    }
}

impl<'a> Deref for ProcessGroup<'a> {
    type Target = dyn Communicator + 'a;

    fn deref(&self) -> &Self::Target {
        &*self.comm
    }
}

impl std::fmt::Debug for ProcessGroup<'_> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ProcessGroup")
            .field("rank", &self.rank())
            .field("size", &self.size())
            .finish()
    }
}
