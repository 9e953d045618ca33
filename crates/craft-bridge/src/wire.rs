use std::collections::BTreeMap;

use crate::pos::BlockPos;

/// How the client should render an object.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ModelRef {
    /// Model bound to the surrogate block state by the resource pack.
    Block { model: String },
    /// Item model component (1.21.4 and later).
    ItemModel { model: String },
    /// Numeric custom model data (before 1.21.4).
    CustomModelData(u32),
    /// Model served by an external renderer.
    External { model: String },
}

/// Outgoing description of one object, as the client will see it.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WireDescriptor {
    pub pos: BlockPos,
    pub native: String,
    pub state: u32,
    pub model: Option<ModelRef>,
    /// Display text fields after placeholder expansion.
    pub text: BTreeMap<String, String>,
}
