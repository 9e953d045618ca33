use craft_bridge::{
    BlockPos, ClientId, HostAdapter, HostError, NativeRecord, RegionCoord, WireDescriptor,
};
use craft_content::Key;
use craft_mapping::HostVersion;
use hashbrown::HashMap;
use parking_lot::Mutex;

/// Host adapter that keeps region records and sent descriptors in memory.
/// Stands in for a server when running `craft simulate`. The terrain is flat:
/// stone below `ground`, air above unless a block was set.
pub struct MemoryHost {
    version: HostVersion,
    ground: i32,
    regions: Mutex<HashMap<RegionCoord, Vec<NativeRecord>>>,
    blocks: Mutex<HashMap<BlockPos, Key>>,
    sent: Mutex<HashMap<ClientId, usize>>,
}

const STONE: &str = "minecraft:stone";

impl MemoryHost {
    pub fn new(version: HostVersion, ground: i32) -> Self {
        Self {
            version,
            ground,
            regions: Mutex::new(HashMap::new()),
            blocks: Mutex::new(HashMap::new()),
            sent: Mutex::new(HashMap::new()),
        }
    }

    pub fn stored(&self, region: RegionCoord) -> usize {
        self.regions.lock().get(&region).map_or(0, Vec::len)
    }

    pub fn set_block(&self, pos: BlockPos, block: Key) {
        self.blocks.lock().insert(pos, block);
    }

    pub fn sent_to(&self, client: ClientId) -> usize {
        self.sent.lock().get(&client).copied().unwrap_or(0)
    }
}

impl HostAdapter for MemoryHost {
    fn version(&self) -> HostVersion {
        self.version
    }

    fn read_region(&self, region: RegionCoord) -> Result<Vec<NativeRecord>, HostError> {
        Ok(self.regions.lock().get(&region).cloned().unwrap_or_default())
    }

    fn write_region(&self, region: RegionCoord, records: Vec<NativeRecord>) -> Result<(), HostError> {
        self.regions.lock().insert(region, records);
        Ok(())
    }

    fn block_at(&self, pos: BlockPos) -> Result<Option<Key>, HostError> {
        if let Some(key) = self.blocks.lock().get(&pos) {
            return Ok(Some(key.clone()));
        }
        if pos.y < self.ground {
            let stone = STONE.parse().map_err(|e| HostError(format!("{STONE}: {e}")))?;
            return Ok(Some(stone));
        }
        Ok(None)
    }

    fn send(&self, client: ClientId, descriptors: Vec<WireDescriptor>) -> Result<(), HostError> {
        *self.sent.lock().entry(client).or_insert(0) += descriptors.len();
        Ok(())
    }
}
