use std::collections::BTreeMap;
use std::sync::Arc;

use craft_bridge::SurrogateView;
use craft_codec::SurrogateCodec;
use craft_content::{DefinitionSet, Excluded};
use craft_mapping::{HostVersion, MappingTable};

/// Everything one generation of content resolves against. Immutable once
/// published; a reload builds a fresh one.
#[derive(Debug, Default)]
pub struct RegistrySnapshot {
    pub generation: u64,
    pub definitions: Arc<DefinitionSet>,
    pub tables: BTreeMap<HostVersion, Arc<MappingTable>>,
    pub excluded: Vec<Excluded>,
}

impl RegistrySnapshot {
    #[inline]
    pub fn table(&self, version: HostVersion) -> Option<&Arc<MappingTable>> {
        self.tables.get(&version)
    }

    pub fn versions(&self) -> impl Iterator<Item = HostVersion> + '_ {
        self.tables.keys().copied()
    }
}

impl SurrogateView for RegistrySnapshot {
    fn codec(&self, version: HostVersion) -> Option<SurrogateCodec<'_>> {
        self.tables
            .get(&version)
            .map(|t| SurrogateCodec::new(&self.definitions, t))
    }
}
