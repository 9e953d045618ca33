use std::collections::HashMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::Arc;

use craft_compat::{CapabilityTable, CapabilityUnavailable};
use thiserror::Error;

use crate::behavior::Behavior;
use crate::config::ContentFile;
use crate::definition::{Appearance, BehaviorFlags, ContentDefinition, ContentKind};
use crate::key::{DEFAULT_NAMESPACE, Key, KeyError};
use crate::schema::Schema;
use crate::snapshot::SnapshotCell;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum DefinitionError {
    #[error("duplicate content key {key} (declared in {first} and again in {second})")]
    DuplicateKey {
        key: Key,
        first: String,
        second: String,
    },
    #[error("invalid schema for {key}: {reason}")]
    InvalidSchema { key: String, reason: String },
    #[error("{key} requires unknown capability '{capability}'")]
    UnknownCapability { key: Key, capability: String },
    #[error("invalid content key in {origin}: {source}")]
    InvalidKey { origin: String, source: KeyError },
    #[error("failed to parse {origin}: {message}")]
    Parse { origin: String, message: String },
    #[error("failed to read {path}: {message}")]
    Io { path: PathBuf, message: String },
}

/// A parsed content file and where it came from.
#[derive(Clone, Debug)]
pub struct DefinitionSource {
    pub origin: String,
    pub file: ContentFile,
}

impl DefinitionSource {
    pub fn new(origin: impl Into<String>, file: ContentFile) -> Self {
        Self {
            origin: origin.into(),
            file,
        }
    }

    pub fn parse(origin: impl Into<String>, text: &str) -> Result<Self, DefinitionError> {
        let origin = origin.into();
        let file: ContentFile = toml::from_str(text).map_err(|e| DefinitionError::Parse {
            origin: origin.clone(),
            message: e.to_string(),
        })?;
        Ok(Self { origin, file })
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, DefinitionError> {
        let path = path.as_ref();
        let text = fs::read_to_string(path).map_err(|e| DefinitionError::Io {
            path: path.to_path_buf(),
            message: e.to_string(),
        })?;
        Self::parse(path.display().to_string(), &text)
    }

    /// Every `*.toml` file below `dir`, in sorted path order.
    pub fn from_dir(dir: impl AsRef<Path>) -> Result<Vec<Self>, DefinitionError> {
        let mut paths = Vec::new();
        collect_toml(dir.as_ref(), &mut paths)?;
        paths.sort();
        paths.iter().map(Self::from_path).collect()
    }
}

fn collect_toml(dir: &Path, out: &mut Vec<PathBuf>) -> Result<(), DefinitionError> {
    let io = |e: std::io::Error| DefinitionError::Io {
        path: dir.to_path_buf(),
        message: e.to_string(),
    };
    for entry in fs::read_dir(dir).map_err(io)? {
        let path = entry.map_err(io)?.path();
        if path.is_dir() {
            collect_toml(&path, out)?;
        } else if path.extension().and_then(|e| e.to_str()) == Some("toml") {
            out.push(path);
        }
    }
    Ok(())
}

/// A definition left out of the active set because a capability is missing.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct Excluded {
    pub key: Key,
    pub reason: CapabilityUnavailable,
}

/// Immutable, validated set of definitions in declaration order.
#[derive(Clone, Debug, Default)]
pub struct DefinitionSet {
    definitions: Vec<Arc<ContentDefinition>>,
    by_key: HashMap<Key, usize>,
}

impl DefinitionSet {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Validates and compiles `sources`. Declaration order is source order,
    /// then order within each file.
    pub fn load(
        sources: &[DefinitionSource],
        capabilities: &CapabilityTable,
    ) -> Result<DefinitionSet, DefinitionError> {
        let mut set = DefinitionSet::default();
        for source in sources {
            for def in &source.file.content {
                let key = Key::parse_with_default(&def.key, DEFAULT_NAMESPACE).map_err(|e| {
                    DefinitionError::InvalidKey {
                        origin: source.origin.clone(),
                        source: e,
                    }
                })?;
                if let Some(&i) = set.by_key.get(&key) {
                    return Err(DefinitionError::DuplicateKey {
                        key,
                        first: set.definitions[i].origin.clone(),
                        second: source.origin.clone(),
                    });
                }
                let invalid = |reason: String| DefinitionError::InvalidSchema {
                    key: key.to_string(),
                    reason,
                };
                let kind = match def.kind.as_deref() {
                    None => ContentKind::Block,
                    Some(k) => ContentKind::parse(k)
                        .ok_or_else(|| invalid(format!("unknown kind '{k}'")))?,
                };
                let schema = Schema::compile(&def.fields).map_err(invalid)?;
                let mut behaviors = Vec::with_capacity(def.behaviors.len());
                for b in &def.behaviors {
                    behaviors.push(Behavior::compile(b, &schema).map_err(invalid)?);
                }
                for cap in &def.requires {
                    if !capabilities.knows(cap) {
                        return Err(DefinitionError::UnknownCapability {
                            key,
                            capability: cap.clone(),
                        });
                    }
                }
                let family = def
                    .family
                    .clone()
                    .unwrap_or_else(|| kind.default_family().to_string());
                let definition = ContentDefinition {
                    appearance: Appearance::from_def(&key, def.appearance.clone()),
                    flags: BehaviorFlags::from_def(kind, def.flags),
                    key: key.clone(),
                    kind,
                    family,
                    schema,
                    behaviors,
                    requires: def.requires.clone(),
                    origin: source.origin.clone(),
                };
                set.by_key.insert(key, set.definitions.len());
                set.definitions.push(Arc::new(definition));
            }
        }
        Ok(set)
    }

    /// Splits off definitions whose required capabilities are absent.
    pub fn exclude_unavailable(&self, capabilities: &CapabilityTable) -> (DefinitionSet, Vec<Excluded>) {
        let mut kept = DefinitionSet::default();
        let mut excluded = Vec::new();
        for def in &self.definitions {
            match def.requires.iter().find(|c| !capabilities.is_present(c)) {
                Some(cap) => {
                    log::warn!(
                        "excluding {} from {}: capability '{}' is absent",
                        def.key,
                        def.origin,
                        cap
                    );
                    excluded.push(Excluded {
                        key: def.key.clone(),
                        reason: CapabilityUnavailable::Absent { name: cap.clone() },
                    });
                }
                None => {
                    kept.by_key.insert(def.key.clone(), kept.definitions.len());
                    kept.definitions.push(def.clone());
                }
            }
        }
        (kept, excluded)
    }

    pub fn get(&self, key: &Key) -> Option<&Arc<ContentDefinition>> {
        self.by_key.get(key).map(|&i| &self.definitions[i])
    }

    #[inline]
    pub fn contains(&self, key: &Key) -> bool {
        self.by_key.contains_key(key)
    }

    pub fn iter(&self) -> impl Iterator<Item = &Arc<ContentDefinition>> {
        self.definitions.iter()
    }

    #[inline]
    pub fn len(&self) -> usize {
        self.definitions.len()
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.definitions.is_empty()
    }
}

/// Holds the active definition snapshot and swaps it on reload.
#[derive(Debug, Default)]
pub struct DefinitionStore {
    active: SnapshotCell<DefinitionSet>,
}

impl DefinitionStore {
    pub fn new(set: DefinitionSet) -> Self {
        Self {
            active: SnapshotCell::new(set),
        }
    }

    #[inline]
    pub fn snapshot(&self) -> Arc<DefinitionSet> {
        self.active.load()
    }

    /// Loads `sources` and drops what the capabilities cannot serve, without
    /// touching the active snapshot.
    pub fn prepare(
        &self,
        sources: &[DefinitionSource],
        capabilities: &CapabilityTable,
    ) -> Result<(Arc<DefinitionSet>, Vec<Excluded>), DefinitionError> {
        let set = DefinitionSet::load(sources, capabilities)?;
        let (kept, excluded) = set.exclude_unavailable(capabilities);
        Ok((Arc::new(kept), excluded))
    }

    #[inline]
    pub fn install(&self, set: Arc<DefinitionSet>) {
        self.active.store(set);
    }

    /// Loads `sources` into a new snapshot and installs it. On error the
    /// previous snapshot stays active.
    pub fn reload(
        &self,
        sources: &[DefinitionSource],
        capabilities: &CapabilityTable,
    ) -> Result<(Arc<DefinitionSet>, Vec<Excluded>), DefinitionError> {
        match self.prepare(sources, capabilities) {
            Ok((next, excluded)) => {
                self.install(next.clone());
                log::info!(
                    "definitions reloaded: {} active, {} excluded",
                    next.len(),
                    excluded.len()
                );
                Ok((next, excluded))
            }
            Err(e) => {
                log::warn!("definition reload rejected, keeping previous set: {}", e);
                Err(e)
            }
        }
    }
}
