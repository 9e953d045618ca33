use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;

use craft_content::{DefinitionSet, Key};
use serde::Serialize;
use thiserror::Error;

use crate::catalogue::{CatalogueError, NativeCatalogue, SurrogateRange};
use crate::version::HostVersion;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum MappingConflict {
    /// The catalogue ran out of native states for a family.
    #[error("{version}: catalogue exhausted for family '{family}' while mapping {key} (needs {requested}, {remaining} left)")]
    CatalogueExhausted {
        version: HostVersion,
        family: String,
        key: Key,
        requested: u64,
        remaining: u64,
    },
    #[error("{version}: no surrogate family '{family}' for {key}")]
    UnknownFamily {
        version: HostVersion,
        family: String,
        key: Key,
    },
    /// Two definitions would share a native state.
    #[error("{version}: {first} and {second} both map onto {native}[{state}]")]
    SurrogateCollision {
        version: HostVersion,
        native: String,
        state: u32,
        first: Key,
        second: Key,
    },
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
#[error("{key} has no surrogate for {version}")]
pub struct UnmappedKey {
    pub version: HostVersion,
    pub key: Key,
}

/// Surrogate assigned to one definition for one host version.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct SurrogateMapping {
    pub key: Key,
    pub surrogate: SurrogateRange,
    pub packed_bits: u32,
}

impl SurrogateMapping {
    /// Native state carrying the given packed logical state.
    pub fn native_state(&self, packed: u32) -> Option<u32> {
        (packed < self.surrogate.count).then(|| self.surrogate.first_state + packed)
    }

    pub fn packed_for(&self, native_state: u32) -> Option<u32> {
        self.surrogate
            .contains(&self.surrogate.native, native_state)
            .then(|| native_state - self.surrogate.first_state)
    }

    #[inline]
    pub fn native(&self) -> &str {
        &self.surrogate.native
    }
}

#[derive(Serialize)]
struct Manifest<'a> {
    version: HostVersion,
    fallback: &'a str,
    mapping: Vec<ManifestEntry<'a>>,
}

#[derive(Serialize)]
struct ManifestEntry<'a> {
    key: &'a str,
    family: &'a str,
    native: &'a str,
    first_state: u32,
    count: u32,
    packed_bits: u32,
}

/// Total, injective key -> surrogate mapping for one host version.
#[derive(Clone, Debug)]
pub struct MappingTable {
    version: HostVersion,
    fallback: String,
    entries: Vec<Arc<SurrogateMapping>>,
    by_key: HashMap<Key, usize>,
    // native id -> first state of each range -> entry index
    by_native: HashMap<String, BTreeMap<u32, usize>>,
}

impl MappingTable {
    /// Assigns surrogates in declaration order. `catalogue` is not modified;
    /// allocation runs against a private copy.
    pub fn build(
        definitions: &DefinitionSet,
        catalogue: &NativeCatalogue,
    ) -> Result<MappingTable, MappingConflict> {
        Self::build_from(definitions, catalogue, None)
    }

    /// Like [`MappingTable::build`], but definitions that survive from
    /// `previous` with the same family and state count keep their surrogate.
    /// New definitions fill the remaining space first-fit.
    pub fn rebuild(
        definitions: &DefinitionSet,
        catalogue: &NativeCatalogue,
        previous: &MappingTable,
    ) -> Result<MappingTable, MappingConflict> {
        Self::build_from(definitions, catalogue, Some(previous))
    }

    fn build_from(
        definitions: &DefinitionSet,
        catalogue: &NativeCatalogue,
        previous: Option<&MappingTable>,
    ) -> Result<MappingTable, MappingConflict> {
        let version = catalogue.version();
        let mut alloc = catalogue.clone();
        let mut table = MappingTable {
            version,
            fallback: catalogue.fallback().to_string(),
            entries: Vec::with_capacity(definitions.len()),
            by_key: HashMap::with_capacity(definitions.len()),
            by_native: HashMap::new(),
        };

        let mut kept: HashMap<&Key, SurrogateRange> = HashMap::new();
        if let Some(prev) = previous.filter(|p| p.version == version) {
            for def in definitions.iter() {
                let Ok(m) = prev.resolve(&def.key) else {
                    continue;
                };
                let same_shape = m.surrogate.family == def.family
                    && u64::from(m.surrogate.count) == def.schema.state_count();
                if same_shape && alloc.reserve(&m.surrogate) {
                    kept.insert(&def.key, m.surrogate.clone());
                }
            }
        }

        let carried = kept.len();
        for def in definitions.iter() {
            let requested = def.schema.state_count();
            if let Some(surrogate) = kept.remove(&def.key) {
                table.insert(SurrogateMapping {
                    key: def.key.clone(),
                    surrogate,
                    packed_bits: def.schema.packed_bits(),
                })?;
                continue;
            }
            let surrogate = alloc
                .allocate(&def.family, requested)
                .map_err(|e| match e {
                    CatalogueError::UnknownFamily { family } => MappingConflict::UnknownFamily {
                        version,
                        family,
                        key: def.key.clone(),
                    },
                    CatalogueError::Exhausted {
                        family,
                        requested,
                        remaining,
                    } => MappingConflict::CatalogueExhausted {
                        version,
                        family,
                        key: def.key.clone(),
                        requested,
                        remaining,
                    },
                })?;
            table.insert(SurrogateMapping {
                key: def.key.clone(),
                surrogate,
                packed_bits: def.schema.packed_bits(),
            })?;
        }

        log::debug!(
            "{}: mapped {} definitions ({} carried over)",
            version,
            table.entries.len(),
            carried
        );
        Ok(table)
    }

    /// Table with no entries; every lookup is unmapped.
    pub fn empty(version: HostVersion, fallback: impl Into<String>) -> MappingTable {
        MappingTable {
            version,
            fallback: fallback.into(),
            entries: Vec::new(),
            by_key: HashMap::new(),
            by_native: HashMap::new(),
        }
    }

    fn insert(&mut self, mapping: SurrogateMapping) -> Result<(), MappingConflict> {
        let ranges = self
            .by_native
            .entry(mapping.surrogate.native.clone())
            .or_default();
        let first = mapping.surrogate.first_state;
        let last = mapping.surrogate.last_state();
        // Nearest range starting at or before `last` is the only possible overlap.
        if let Some((_, &i)) = ranges.range(..=last).next_back() {
            let other = &self.entries[i];
            if other.surrogate.last_state() >= first {
                return Err(MappingConflict::SurrogateCollision {
                    version: self.version,
                    native: mapping.surrogate.native.clone(),
                    state: first.max(other.surrogate.first_state),
                    first: other.key.clone(),
                    second: mapping.key,
                });
            }
        }
        let idx = self.entries.len();
        ranges.insert(first, idx);
        self.by_key.insert(mapping.key.clone(), idx);
        self.entries.push(Arc::new(mapping));
        Ok(())
    }

    #[inline]
    pub fn version(&self) -> HostVersion {
        self.version
    }

    #[inline]
    pub fn fallback(&self) -> &str {
        &self.fallback
    }

    pub fn resolve(&self, key: &Key) -> Result<&Arc<SurrogateMapping>, UnmappedKey> {
        self.by_key
            .get(key)
            .map(|&i| &self.entries[i])
            .ok_or_else(|| UnmappedKey {
                version: self.version,
                key: key.clone(),
            })
    }

    /// Reverse lookup of a native id and state.
    pub fn by_surrogate(&self, native: &str, state: u32) -> Option<&Arc<SurrogateMapping>> {
        let ranges = self.by_native.get(native)?;
        let (_, &i) = ranges.range(..=state).next_back()?;
        let m = &self.entries[i];
        m.surrogate.contains(native, state).then_some(m)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<SurrogateMapping>> {
        self.entries.iter()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.entries.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Canonical TOML rendering in declaration order.
    pub fn manifest(&self) -> Result<String, toml::ser::Error> {
        toml::to_string(&Manifest {
            version: self.version,
            fallback: &self.fallback,
            mapping: self
                .entries
                .iter()
                .map(|m| ManifestEntry {
                    key: m.key.as_str(),
                    family: &m.surrogate.family,
                    native: &m.surrogate.native,
                    first_state: m.surrogate.first_state,
                    count: m.surrogate.count,
                    packed_bits: m.packed_bits,
                })
                .collect(),
        })
    }
}
