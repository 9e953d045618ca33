use craft_bridge::{BlockPos, RegionCoord, WorldObject};
use craft_content::{Key, SchemaViolation};
use craft_registry::RegistrySnapshot;
use thiserror::Error;

use crate::arena::ObjectId;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum HandoffError {
    #[error("{id} is not in region {region}")]
    NotFound { id: ObjectId, region: RegionCoord },
    #[error("{id} at {pos} lies outside region {region}")]
    OutOfRegion {
        id: ObjectId,
        pos: BlockPos,
        region: RegionCoord,
    },
    #[error("{id} is already present in region {region}")]
    Duplicate { id: ObjectId, region: RegionCoord },
    #[error("{id} ({key}) no longer fits its schema: {reason}")]
    Invalid {
        id: ObjectId,
        key: Key,
        reason: SchemaViolation,
    },
    #[error("region {0} is not loaded")]
    NotLoaded(RegionCoord),
}

/// An object in transit between two arenas.
///
/// Not `Clone`: whoever holds the value holds the only copy, so the object
/// cannot be live in two regions at once.
#[derive(Debug)]
pub struct Detached {
    id: ObjectId,
    object: WorldObject,
    origin: BlockPos,
    generation: u64,
}

/// A hand-off the destination refused, with the object given back.
#[derive(Debug)]
pub struct Rejected {
    pub detached: Detached,
    pub error: HandoffError,
}

impl Detached {
    /// Finalizes `object` against `snapshot` before it leaves its arena.
    pub(crate) fn finalize(
        id: ObjectId,
        object: WorldObject,
        snapshot: &RegistrySnapshot,
    ) -> Result<Detached, (WorldObject, HandoffError)> {
        if let Err(e) = validate(id, &object, snapshot) {
            return Err((object, e));
        }
        let origin = object.pos();
        Ok(Detached {
            id,
            object,
            origin,
            generation: snapshot.generation,
        })
    }

    #[inline]
    pub fn id(&self) -> ObjectId {
        self.id
    }

    #[inline]
    pub fn pos(&self) -> BlockPos {
        self.object.pos()
    }

    /// Position the object had when it was detached.
    #[inline]
    pub fn origin(&self) -> BlockPos {
        self.origin
    }

    /// Snapshot generation the object was last validated under.
    #[inline]
    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn object(&self) -> &WorldObject {
        &self.object
    }

    /// Moves the object to `pos`; the arena check happens on attach.
    pub fn retarget(mut self, pos: BlockPos) -> Detached {
        set_pos(&mut self.object, pos);
        self
    }

    /// Re-validates when the registry swapped since detach.
    pub(crate) fn revalidate(self, snapshot: &RegistrySnapshot) -> Result<Detached, Rejected> {
        if self.generation == snapshot.generation {
            return Ok(self);
        }
        match validate(self.id, &self.object, snapshot) {
            Ok(()) => Ok(Detached {
                generation: snapshot.generation,
                ..self
            }),
            Err(error) => Err(Rejected {
                detached: self,
                error,
            }),
        }
    }

    pub(crate) fn into_parts(self) -> (ObjectId, WorldObject) {
        (self.id, self.object)
    }
}

/// Custom objects must still satisfy their definition's schema. Objects
/// whose definition is gone travel as they are and are detached on save.
fn validate(id: ObjectId, object: &WorldObject, snapshot: &RegistrySnapshot) -> Result<(), HandoffError> {
    let WorldObject::Custom { instance, .. } = object else {
        return Ok(());
    };
    match snapshot.definitions.get(&instance.key) {
        Some(def) => def
            .schema
            .validate(&instance.values)
            .map_err(|reason| HandoffError::Invalid {
                id,
                key: instance.key.clone(),
                reason,
            }),
        None => Ok(()),
    }
}

fn set_pos(object: &mut WorldObject, to: BlockPos) {
    match object {
        WorldObject::Native(record) => record.pos = to,
        WorldObject::Custom { pos, .. } | WorldObject::Placeholder { pos, .. } => *pos = to,
    }
}
