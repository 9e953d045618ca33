use std::collections::BTreeMap;
use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use craft_codec::{
    DecodeError, Decoded, EncodeError, ObjectInstance, SurrogateBytes, SurrogateCodec,
};
use craft_compat::CapabilityTable;
use craft_content::{
    DefinitionError, DefinitionSet, DefinitionSource, DefinitionStore, Excluded, Key, SnapshotCell,
};
use craft_mapping::{
    Catalogues, HostVersion, MappingConflict, MappingTable, SurrogateMapping, UnmappedKey,
};
use parking_lot::Mutex;
use rayon::prelude::*;
use thiserror::Error;

use crate::snapshot::RegistrySnapshot;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum ReloadError {
    #[error(transparent)]
    Definition(#[from] DefinitionError),
    #[error(transparent)]
    Mapping(#[from] MappingConflict),
    #[error("no native catalogue for host version {0}")]
    MissingCatalogue(HostVersion),
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ReloadReport {
    pub generation: u64,
    pub definitions: usize,
    pub versions: Vec<HostVersion>,
    pub excluded: Vec<Excluded>,
}

#[derive(Copy, Clone, Debug, PartialEq, Eq)]
pub enum Phase {
    /// Serving reads from the active snapshot.
    Stable,
    /// A reload is building; reads are still served from the active snapshot.
    Swapping,
}

const STABLE: u8 = 0;
const SWAPPING: u8 = 1;

/// Inputs fixed between reloads. Held under the reload lock.
struct BuildInputs {
    catalogues: Catalogues,
    versions: Vec<HostVersion>,
}

/// Returns the phase to `Stable` however the reload ends.
struct SwapGuard<'a>(&'a AtomicU8);

impl<'a> SwapGuard<'a> {
    fn enter(phase: &'a AtomicU8) -> Self {
        phase.store(SWAPPING, Ordering::Release);
        Self(phase)
    }
}

impl Drop for SwapGuard<'_> {
    fn drop(&mut self) {
        self.0.store(STABLE, Ordering::Release);
    }
}

/// Shared entry point for every region worker.
///
/// Each read takes one snapshot at entry and uses only that snapshot until it
/// returns. Reloads are serialized among themselves and publish by swapping
/// the snapshot pointer, so readers never wait on a build.
pub struct Registry {
    active: SnapshotCell<RegistrySnapshot>,
    /// Definitions of the active snapshot; only installed once its tables built.
    definitions: DefinitionStore,
    /// An empty table per catalogued version, for decoding versions that are
    /// not active.
    idle: BTreeMap<HostVersion, Arc<MappingTable>>,
    phase: AtomicU8,
    capabilities: CapabilityTable,
    inputs: Mutex<BuildInputs>,
}

impl Registry {
    /// Starts with no definitions and an empty table for each version.
    pub fn new(
        catalogues: Catalogues,
        capabilities: CapabilityTable,
        versions: Vec<HostVersion>,
    ) -> Result<Registry, ReloadError> {
        let idle: BTreeMap<_, _> = catalogues
            .versions()
            .filter_map(|v| {
                let cat = catalogues.get(v)?;
                Some((v, Arc::new(MappingTable::empty(v, cat.fallback()))))
            })
            .collect();
        let mut tables = BTreeMap::new();
        for &v in &versions {
            let table = idle.get(&v).ok_or(ReloadError::MissingCatalogue(v))?;
            tables.insert(v, table.clone());
        }
        let definitions = DefinitionStore::new(DefinitionSet::empty());
        Ok(Registry {
            active: SnapshotCell::new(RegistrySnapshot {
                generation: 0,
                definitions: definitions.snapshot(),
                tables,
                excluded: Vec::new(),
            }),
            definitions,
            idle,
            phase: AtomicU8::new(STABLE),
            capabilities,
            inputs: Mutex::new(BuildInputs {
                catalogues,
                versions,
            }),
        })
    }

    #[inline]
    pub fn snapshot(&self) -> Arc<RegistrySnapshot> {
        self.active.load()
    }

    pub fn phase(&self) -> Phase {
        match self.phase.load(Ordering::Acquire) {
            SWAPPING => Phase::Swapping,
            _ => Phase::Stable,
        }
    }

    /// Definitions behind the active snapshot.
    #[inline]
    pub fn definitions(&self) -> Arc<DefinitionSet> {
        self.definitions.snapshot()
    }

    /// Native a version's catalogue names for objects without a surrogate,
    /// whether or not the version is active.
    pub fn fallback(&self, version: HostVersion) -> Option<&str> {
        self.idle.get(&version).map(|t| t.fallback())
    }

    /// Table to decode `version` against when it has no active table.
    fn idle_table(&self, version: HostVersion) -> Arc<MappingTable> {
        match self.idle.get(&version) {
            Some(table) => table.clone(),
            // Uncatalogued: nothing maps and decoding never reads the fallback.
            None => Arc::new(MappingTable::empty(version, "")),
        }
    }

    #[inline]
    pub fn generation(&self) -> u64 {
        self.active.load().generation
    }

    /// Capability table frozen at startup.
    #[inline]
    pub fn capabilities(&self) -> &CapabilityTable {
        &self.capabilities
    }

    pub fn resolve(&self, version: HostVersion, key: &Key) -> Result<Arc<SurrogateMapping>, UnmappedKey> {
        let snap = self.active.load();
        let unmapped = || UnmappedKey {
            version,
            key: key.clone(),
        };
        let table = snap.table(version).ok_or_else(unmapped)?;
        table.resolve(key).cloned()
    }

    pub fn encode(
        &self,
        instance: &ObjectInstance,
        version: HostVersion,
    ) -> Result<SurrogateBytes, EncodeError> {
        let snap = self.active.load();
        let table = snap.table(version).ok_or_else(|| UnmappedKey {
            version,
            key: instance.key.clone(),
        })?;
        SurrogateCodec::new(&snap.definitions, table).encode(instance)
    }

    pub fn decode(
        &self,
        bytes: &SurrogateBytes,
        version: HostVersion,
    ) -> Result<ObjectInstance, DecodeError> {
        let snap = self.active.load();
        match snap.table(version) {
            Some(table) => SurrogateCodec::new(&snap.definitions, table).decode(bytes),
            None => {
                // Nothing is mapped, but framing errors still surface as such.
                let idle = self.idle_table(version);
                SurrogateCodec::new(&snap.definitions, &idle).decode(bytes)
            }
        }
    }

    pub fn decode_lenient(&self, bytes: &SurrogateBytes, version: HostVersion) -> Decoded {
        let snap = self.active.load();
        match snap.table(version) {
            Some(table) => SurrogateCodec::new(&snap.definitions, table).decode_lenient(bytes),
            None => {
                let idle = self.idle_table(version);
                SurrogateCodec::new(&snap.definitions, &idle).decode_lenient(bytes)
            }
        }
    }

    /// Loads `sources`, builds every active version's table and publishes the
    /// result. Any failure leaves the current snapshot in place.
    pub fn reload(&self, sources: &[DefinitionSource]) -> Result<ReloadReport, ReloadError> {
        let inputs = self.inputs.lock();
        let _swap = SwapGuard::enter(&self.phase);
        let result = self
            .definitions
            .prepare(sources, &self.capabilities)
            .map_err(ReloadError::from)
            .and_then(|(kept, excluded)| self.publish(&inputs, kept, excluded));
        if let Err(e) = &result {
            log::warn!(
                "reload rejected, staying on generation {}: {}",
                self.generation(),
                e
            );
        }
        result
    }

    /// Rebuilds the current definitions for a new set of host versions.
    pub fn set_versions(&self, versions: Vec<HostVersion>) -> Result<ReloadReport, ReloadError> {
        let mut inputs = self.inputs.lock();
        let _swap = SwapGuard::enter(&self.phase);
        let current = self.active.load();
        let previous = std::mem::replace(&mut inputs.versions, versions);
        let result = self.publish(&inputs, self.definitions.snapshot(), current.excluded.clone());
        if let Err(e) = &result {
            log::warn!("version change rejected: {}", e);
            inputs.versions = previous;
        }
        result
    }

    fn publish(
        &self,
        inputs: &BuildInputs,
        definitions: Arc<DefinitionSet>,
        excluded: Vec<Excluded>,
    ) -> Result<ReloadReport, ReloadError> {
        // Reloads hold the inputs lock, so nobody else publishes in between.
        let current = self.active.load();
        let tables = build_tables(
            &definitions,
            &inputs.catalogues,
            &inputs.versions,
            &current.tables,
        )?;
        let generation = current.generation + 1;
        let report = ReloadReport {
            generation,
            definitions: definitions.len(),
            versions: tables.keys().copied().collect(),
            excluded: excluded.clone(),
        };
        self.definitions.install(definitions.clone());
        self.active.store(Arc::new(RegistrySnapshot {
            generation,
            definitions,
            tables,
            excluded,
        }));
        log::info!(
            "registry generation {}: {} definitions across {} versions, {} excluded",
            generation,
            report.definitions,
            report.versions.len(),
            report.excluded.len()
        );
        Ok(report)
    }
}

/// Builds one table per version in parallel, keeping surrogates from
/// `previous` where they still fit. The first failure in version order is
/// reported.
fn build_tables(
    definitions: &DefinitionSet,
    catalogues: &Catalogues,
    versions: &[HostVersion],
    previous: &BTreeMap<HostVersion, Arc<MappingTable>>,
) -> Result<BTreeMap<HostVersion, Arc<MappingTable>>, ReloadError> {
    let built: Vec<(HostVersion, Result<MappingTable, ReloadError>)> = versions
        .par_iter()
        .map(|&v| {
            let table = catalogues
                .get(v)
                .ok_or(ReloadError::MissingCatalogue(v))
                .and_then(|cat| {
                    match previous.get(&v) {
                        Some(prev) => MappingTable::rebuild(definitions, cat, prev),
                        None => MappingTable::build(definitions, cat),
                    }
                    .map_err(ReloadError::from)
                });
            (v, table)
        })
        .collect();
    let mut out = BTreeMap::new();
    for (v, table) in built {
        out.insert(v, Arc::new(table?));
    }
    Ok(out)
}

impl std::fmt::Debug for Registry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let snap = self.active.load();
        f.debug_struct("Registry")
            .field("generation", &snap.generation)
            .field("definitions", &snap.definitions.len())
            .field("versions", &snap.tables.keys().collect::<Vec<_>>())
            .field("phase", &self.phase())
            .finish()
    }
}
