use craft_codec::SurrogateBytes;
use craft_content::Key;
use craft_mapping::HostVersion;
use thiserror::Error;

use crate::pos::{BlockPos, RegionCoord};
use crate::wire::WireDescriptor;

/// Failure inside the host's own persistence or transmission call.
#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("host call failed: {0}")]
pub struct HostError(pub String);

pub type ClientId = u64;

/// One object as the host stores it: a position plus its tagged payload.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NativeRecord {
    pub pos: BlockPos,
    pub payload: SurrogateBytes,
}

/// Intercept points one host release exposes. Implemented per version by a
/// thin adapter; the bridge never reaches past these calls.
pub trait HostAdapter: Send + Sync {
    fn version(&self) -> HostVersion;

    /// Host deserialization of a region's object records.
    fn read_region(&self, region: RegionCoord) -> Result<Vec<NativeRecord>, HostError>;

    /// Host persistence call; replaces the region's records.
    fn write_region(&self, region: RegionCoord, records: Vec<NativeRecord>) -> Result<(), HostError>;

    /// Host block at `pos`, or `None` when the position is empty.
    fn block_at(&self, pos: BlockPos) -> Result<Option<Key>, HostError>;

    /// Host transmission of world-state descriptors to one client.
    fn send(&self, client: ClientId, descriptors: Vec<WireDescriptor>) -> Result<(), HostError>;
}
