use std::collections::BTreeMap;
use std::error::Error;
use std::fs;
use std::path::Path;

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::version::HostVersion;

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum CatalogueError {
    #[error("no surrogate pool for family '{family}'")]
    UnknownFamily { family: String },
    #[error("family '{family}' cannot supply {requested} states ({remaining} left)")]
    Exhausted {
        family: String,
        requested: u64,
        remaining: u64,
    },
}

/// A contiguous run of host-native states standing in for one definition.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct SurrogateRange {
    pub family: String,
    pub native: String,
    pub first_state: u32,
    pub count: u32,
}

impl SurrogateRange {
    #[inline]
    pub fn contains(&self, native: &str, state: u32) -> bool {
        self.native == native
            && state >= self.first_state
            && (state - self.first_state) < self.count
    }

    #[inline]
    pub fn last_state(&self) -> u32 {
        self.first_state + self.count.saturating_sub(1)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
struct Pool {
    family: String,
    native: String,
    // first state -> length of each free run
    free: BTreeMap<u32, u32>,
}

impl Pool {
    fn remaining(&self) -> u64 {
        self.free.values().map(|&n| u64::from(n)).sum()
    }

    /// First-fit: the lowest free run long enough for `want`.
    fn take(&mut self, want: u32) -> Option<u32> {
        let (&start, &len) = self.free.iter().find(|&(_, &len)| len >= want)?;
        self.free.remove(&start);
        if len > want {
            self.free.insert(start + want, len - want);
        }
        Some(start)
    }

    /// Carves out exactly `first..first + count` if all of it is free.
    fn reserve(&mut self, first: u32, count: u32) -> bool {
        let Some((&start, &len)) = self.free.range(..=first).next_back() else {
            return false;
        };
        let end = u64::from(start) + u64::from(len);
        if u64::from(first) + u64::from(count) > end {
            return false;
        }
        self.free.remove(&start);
        if first > start {
            self.free.insert(start, first - start);
        }
        let tail = first + count;
        if u64::from(tail) < end {
            self.free.insert(tail, (end - u64::from(tail)) as u32);
        }
        true
    }
}

/// Per-version allocator of host-native surrogate states.
///
/// Allocation is first-fit over pools in declaration order, so the same
/// request sequence against the same catalogue always yields the same ranges.
/// On a fresh catalogue this is plain sequential allocation.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct NativeCatalogue {
    version: HostVersion,
    fallback: String,
    pools: Vec<Pool>,
}

impl NativeCatalogue {
    pub fn new(version: HostVersion, fallback: impl Into<String>) -> Self {
        Self {
            version,
            fallback: fallback.into(),
            pools: Vec::new(),
        }
    }

    /// Adds a pool of `count` states from `first`. A pool reaching past
    /// `u32::MAX` is cut short there.
    pub fn with_pool(
        mut self,
        family: impl Into<String>,
        native: impl Into<String>,
        first: u32,
        count: u32,
    ) -> Self {
        let family = family.into();
        let room = u32::MAX - first;
        if count > room {
            log::warn!(
                "{}: pool '{}' at {} asks for {} states, only {} fit",
                self.version,
                family,
                first,
                count,
                room
            );
        }
        let count = count.min(room);
        let mut free = BTreeMap::new();
        if count > 0 {
            free.insert(first, count);
        }
        self.pools.push(Pool {
            family,
            native: native.into(),
            free,
        });
        self
    }

    #[inline]
    pub fn version(&self) -> HostVersion {
        self.version
    }

    /// Native identifier used for objects that cannot be mapped.
    #[inline]
    pub fn fallback(&self) -> &str {
        &self.fallback
    }

    pub fn remaining(&self, family: &str) -> u64 {
        self.pools
            .iter()
            .filter(|p| p.family == family)
            .map(Pool::remaining)
            .sum()
    }

    /// Takes the next `count` contiguous states of `family`.
    pub fn allocate(&mut self, family: &str, count: u64) -> Result<SurrogateRange, CatalogueError> {
        if !self.pools.iter().any(|p| p.family == family) {
            return Err(CatalogueError::UnknownFamily {
                family: family.into(),
            });
        }
        let remaining = self.remaining(family);
        let exhausted = || CatalogueError::Exhausted {
            family: family.into(),
            requested: count,
            remaining,
        };
        let want = u32::try_from(count).map_err(|_| exhausted())?;
        let (pool, first_state) = self
            .pools
            .iter_mut()
            .filter(|p| p.family == family)
            .find_map(|p| {
                let first = p.take(want)?;
                Some((p, first))
            })
            .ok_or_else(exhausted)?;
        Ok(SurrogateRange {
            family: pool.family.clone(),
            native: pool.native.clone(),
            first_state,
            count: want,
        })
    }

    /// Claims a specific range again, e.g. one held under a previous build.
    /// Returns false if any part of it is taken or outside every pool.
    pub fn reserve(&mut self, range: &SurrogateRange) -> bool {
        self.pools
            .iter_mut()
            .filter(|p| p.family == range.family && p.native == range.native)
            .any(|p| p.reserve(range.first_state, range.count))
    }
}

// --- Config ---

#[derive(Deserialize)]
struct CatalogueConfig {
    #[serde(default)]
    version: Vec<VersionDef>,
}

#[derive(Deserialize)]
struct VersionDef {
    id: HostVersion,
    #[serde(default = "default_fallback")]
    fallback: String,
    #[serde(default)]
    pool: Vec<PoolDef>,
}

#[derive(Deserialize)]
struct PoolDef {
    family: String,
    native: String,
    #[serde(default)]
    first: u32,
    count: u32,
}

fn default_fallback() -> String {
    "minecraft:barrier".to_string()
}

/// Catalogues for every version the host adapter layer knows about.
#[derive(Clone, Debug, Default)]
pub struct Catalogues {
    by_version: BTreeMap<HostVersion, NativeCatalogue>,
}

impl Catalogues {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, catalogue: NativeCatalogue) {
        self.by_version.insert(catalogue.version, catalogue);
    }

    pub fn get(&self, version: HostVersion) -> Option<&NativeCatalogue> {
        self.by_version.get(&version)
    }

    pub fn versions(&self) -> impl Iterator<Item = HostVersion> + '_ {
        self.by_version.keys().copied()
    }

    pub fn from_toml_str(toml_str: &str) -> Result<Self, Box<dyn Error>> {
        let cfg: CatalogueConfig = toml::from_str(toml_str)?;
        let mut out = Catalogues::new();
        for v in cfg.version {
            let mut cat = NativeCatalogue::new(v.id, v.fallback);
            for p in v.pool {
                if p.first.checked_add(p.count).is_none() {
                    return Err(format!(
                        "{}: pool '{}' overflows the state range",
                        v.id, p.family
                    )
                    .into());
                }
                cat = cat.with_pool(p.family, p.native, p.first, p.count);
            }
            out.insert(cat);
        }
        Ok(out)
    }

    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, Box<dyn Error>> {
        let s = fs::read_to_string(path)?;
        Self::from_toml_str(&s)
    }
}
