//! Surrogate codec: custom object state <-> host-native tagged records.
#![forbid(unsafe_code)]

pub mod codec;
pub mod instance;
pub mod nbt;

pub use codec::{
    DecodeError, Decoded, EncodeError, MARKER, SurrogateCodec, UnknownObject, encode,
    encode_detached, has_marker,
};
pub use instance::{ObjectInstance, SurrogateBytes};
