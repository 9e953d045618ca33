//! Region ownership: per-region arenas, worker threads and the two-phase
//! hand-off that moves objects between them.
#![forbid(unsafe_code)]

mod arena;
mod handoff;
mod ownership;
mod pool;

pub use arena::{ObjectId, RegionArena};
pub use craft_bridge::{BlockPos, RegionCoord};
pub use handoff::{Detached, HandoffError, Rejected};
pub use ownership::{OwnershipMap, WorkerId};
pub use pool::{
    CommandResult, PoolConfig, RegionCommand, RegionError, RegionPool, Reply, TickReport,
    TriggerAction,
};
