use std::fmt;

use craft_bridge::{BlockPos, RegionCoord, WorldObject};
use craft_registry::RegistrySnapshot;
use hashbrown::HashMap;

use crate::handoff::{Detached, HandoffError, Rejected};

/// Identity of a live object. Unique across all regions of a pool.
#[derive(Copy, Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ObjectId(pub u64);

impl fmt::Display for ObjectId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// Objects of one region, owned by exactly one worker.
#[derive(Debug)]
pub struct RegionArena {
    coord: RegionCoord,
    size: i32,
    objects: HashMap<ObjectId, WorldObject>,
}

impl RegionArena {
    pub fn new(coord: RegionCoord, size: i32) -> Self {
        Self {
            coord,
            size,
            objects: HashMap::new(),
        }
    }

    #[inline]
    pub fn coord(&self) -> RegionCoord {
        self.coord
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.objects.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.objects.is_empty()
    }

    pub fn contains(&self, id: ObjectId) -> bool {
        self.objects.contains_key(&id)
    }

    pub fn get(&self, id: ObjectId) -> Option<&WorldObject> {
        self.objects.get(&id)
    }

    pub fn get_mut(&mut self, id: ObjectId) -> Option<&mut WorldObject> {
        self.objects.get_mut(&id)
    }

    /// The object occupying `pos`, if any.
    pub fn object_at(&self, pos: BlockPos) -> Option<&WorldObject> {
        self.objects.values().find(|o| o.pos() == pos)
    }

    pub fn iter(&self) -> impl Iterator<Item = (ObjectId, &WorldObject)> {
        self.objects.iter().map(|(&id, o)| (id, o))
    }

    /// Adds a new object. It must lie inside this region.
    pub fn insert(&mut self, id: ObjectId, object: WorldObject) -> Result<(), HandoffError> {
        let pos = object.pos();
        if !self.coord.contains(pos, self.size) {
            return Err(HandoffError::OutOfRegion {
                id,
                pos,
                region: self.coord,
            });
        }
        if self.objects.contains_key(&id) {
            return Err(HandoffError::Duplicate {
                id,
                region: self.coord,
            });
        }
        self.objects.insert(id, object);
        Ok(())
    }

    /// Replaces the region's contents, e.g. with what the host just loaded.
    pub fn replace(&mut self, objects: impl IntoIterator<Item = (ObjectId, WorldObject)>) {
        self.objects.clear();
        for (id, object) in objects {
            if !self.coord.contains(object.pos(), self.size) {
                log::warn!("{}: keeping {} from {} although it lies outside", self.coord, id, object.pos());
            }
            self.objects.insert(id, object);
        }
    }

    /// Contents in id order, which is the order they are written back in.
    pub fn objects(&self) -> Vec<WorldObject> {
        let mut ids: Vec<ObjectId> = self.objects.keys().copied().collect();
        ids.sort_unstable();
        ids.iter().filter_map(|id| self.objects.get(id).cloned()).collect()
    }

    /// First phase of a move: removes the object and finalizes it against
    /// `snapshot`. On failure the object stays where it was.
    pub fn detach(&mut self, id: ObjectId, snapshot: &RegistrySnapshot) -> Result<Detached, HandoffError> {
        let object = self.objects.remove(&id).ok_or(HandoffError::NotFound {
            id,
            region: self.coord,
        })?;
        match Detached::finalize(id, object, snapshot) {
            Ok(d) => Ok(d),
            Err((object, e)) => {
                self.objects.insert(id, object);
                Err(e)
            }
        }
    }

    /// Second phase of a move. A refused object is handed back intact.
    pub fn attach(&mut self, detached: Detached, snapshot: &RegistrySnapshot) -> Result<ObjectId, Rejected> {
        let detached = detached.revalidate(snapshot)?;
        let id = detached.id();
        let pos = detached.pos();
        let refused = if !self.coord.contains(pos, self.size) {
            Some(HandoffError::OutOfRegion {
                id,
                pos,
                region: self.coord,
            })
        } else if self.objects.contains_key(&id) {
            Some(HandoffError::Duplicate {
                id,
                region: self.coord,
            })
        } else {
            None
        };
        if let Some(error) = refused {
            return Err(Rejected { detached, error });
        }
        let (id, object) = detached.into_parts();
        self.objects.insert(id, object);
        Ok(id)
    }
}
