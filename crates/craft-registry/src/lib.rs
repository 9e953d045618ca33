//! Region-safe registry facade over definitions, mapping tables and codec.
#![forbid(unsafe_code)]

mod registry;
mod snapshot;

pub use registry::{Phase, Registry, ReloadError, ReloadReport};
pub use snapshot::RegistrySnapshot;
