//! Communication primitives and the algorithms built on them.

pub mod collectives;
pub mod communicator;
pub mod distribute;
pub mod process_group;
pub mod wire;

pub use distribute::{DistributionConfig, distribute_mesh};
pub use process_group::ProcessGroup;
