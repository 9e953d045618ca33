//! Version-scoped mapping from content keys to host-native surrogates.
#![forbid(unsafe_code)]

pub mod catalogue;
pub mod table;
pub mod version;

pub use catalogue::{CatalogueError, Catalogues, NativeCatalogue, SurrogateRange};
pub use table::{MappingConflict, MappingTable, SurrogateMapping, UnmappedKey};
pub use version::{HostVersion, UnknownVersion};
