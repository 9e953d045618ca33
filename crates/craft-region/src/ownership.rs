use craft_bridge::{BlockPos, RegionCoord};
use hashbrown::HashMap;

pub type WorkerId = usize;

/// Which worker owns which region.
///
/// Unpinned regions are striped over workers so that neighbouring regions
/// land on different workers whenever there is more than one.
#[derive(Clone, Debug)]
pub struct OwnershipMap {
    workers: usize,
    region_size: i32,
    pinned: HashMap<RegionCoord, WorkerId>,
}

impl OwnershipMap {
    pub fn new(workers: usize, region_size: i32) -> Self {
        Self {
            workers: workers.max(1),
            region_size: region_size.max(1),
            pinned: HashMap::new(),
        }
    }

    /// Assigns `region` to `worker` explicitly. Ignored for unknown workers.
    pub fn pin(&mut self, region: RegionCoord, worker: WorkerId) -> bool {
        if worker >= self.workers {
            return false;
        }
        self.pinned.insert(region, worker);
        true
    }

    #[inline]
    pub fn workers(&self) -> usize {
        self.workers
    }

    #[inline]
    pub fn region_size(&self) -> i32 {
        self.region_size
    }

    pub fn owner(&self, region: RegionCoord) -> WorkerId {
        if let Some(&w) = self.pinned.get(&region) {
            return w;
        }
        let stripe = i64::from(region.rx) + 31 * i64::from(region.rz);
        stripe.rem_euclid(self.workers as i64) as WorkerId
    }

    #[inline]
    pub fn region_of(&self, pos: BlockPos) -> RegionCoord {
        pos.region(self.region_size)
    }

    pub fn owner_of(&self, pos: BlockPos) -> (RegionCoord, WorkerId) {
        let region = self.region_of(pos);
        (region, self.owner(region))
    }
}
