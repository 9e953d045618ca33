//! Engine bridge: the load, save and transmit seams between the host and
//! custom content.
#![forbid(unsafe_code)]

pub mod bridge;
pub mod host;
pub mod pos;
pub mod report;
pub mod wire;

pub use bridge::{
    Bridge, BridgeError, InstantiateError, SurrogateView, WorldObject, decode_records,
    encode_objects,
};
pub use host::{ClientId, HostAdapter, HostError, NativeRecord};
pub use pos::{BlockPos, RegionCoord};
pub use report::{LoadReport, ObjectFailure, SaveReport};
pub use wire::{ModelRef, WireDescriptor};
