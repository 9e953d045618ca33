use std::collections::{BTreeMap, HashMap};

use serde::Deserialize;

/// Capability names the core knows how to talk about.
pub mod well_known {
    pub const MODEL_ENGINE: &str = "model-engine";
    pub const BETTER_MODEL: &str = "better-model";
    pub const PLACEHOLDER: &str = "placeholder";
    pub const PERMISSIONS: &str = "permissions";
    pub const SLIME_WORLD: &str = "slime-world";
    pub const PROTOCOL_TRANSLATION: &str = "protocol-translation";
    pub const NAMEPLATES: &str = "nameplates";

    pub const ALL: &[&str] = &[
        MODEL_ENGINE,
        BETTER_MODEL,
        PLACEHOLDER,
        PERMISSIONS,
        SLIME_WORLD,
        PROTOCOL_TRANSLATION,
        NAMEPLATES,
    ];
}

#[derive(Clone, Debug, PartialEq, Eq, Deserialize)]
#[serde(tag = "state", rename_all = "lowercase")]
pub enum CapabilityState {
    Present {
        #[serde(default)]
        version: Option<String>,
    },
    Absent,
}

impl CapabilityState {
    #[inline]
    pub fn is_present(&self) -> bool {
        matches!(self, CapabilityState::Present { .. })
    }
}

/// Environment inspection collaborator. Implementations report which
/// optional providers are loaded; the answer is read exactly once.
pub trait CapabilityProbe {
    fn probe(&self, name: &str) -> CapabilityState;
}

/// Probe backed by a fixed map, used by config overrides and tests.
#[derive(Clone, Debug, Default)]
pub struct StaticProbe {
    present: HashMap<String, Option<String>>,
}

impl StaticProbe {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, name: impl Into<String>, version: Option<&str>) -> Self {
        self.present.insert(name.into(), version.map(str::to_string));
        self
    }
}

impl CapabilityProbe for StaticProbe {
    fn probe(&self, name: &str) -> CapabilityState {
        match self.present.get(name) {
            Some(version) => CapabilityState::Present {
                version: version.clone(),
            },
            None => CapabilityState::Absent,
        }
    }
}

/// Frozen result of startup probing. There is no mutating API.
#[derive(Clone, Debug, Default)]
pub struct CapabilityTable {
    states: BTreeMap<String, CapabilityState>,
}

impl CapabilityTable {
    /// Probes every known capability name once.
    pub fn probe<'a>(
        known: impl IntoIterator<Item = &'a str>,
        probe: &dyn CapabilityProbe,
    ) -> Self {
        let mut states = BTreeMap::new();
        for name in known {
            let state = probe.probe(name);
            match &state {
                CapabilityState::Present { version } => log::info!(
                    "capability {} present{}",
                    name,
                    version
                        .as_deref()
                        .map(|v| format!(" ({v})"))
                        .unwrap_or_default()
                ),
                CapabilityState::Absent => log::debug!("capability {} absent", name),
            }
            states.insert(name.to_string(), state);
        }
        Self { states }
    }

    /// Probes the well-known capability set.
    pub fn probe_well_known(probe: &dyn CapabilityProbe) -> Self {
        Self::probe(well_known::ALL.iter().copied(), probe)
    }

    pub fn capability(&self, name: &str) -> CapabilityState {
        self.states
            .get(name)
            .cloned()
            .unwrap_or(CapabilityState::Absent)
    }

    #[inline]
    pub fn is_present(&self, name: &str) -> bool {
        self.states.get(name).is_some_and(CapabilityState::is_present)
    }

    /// Whether `name` was part of the probed set, present or not.
    #[inline]
    pub fn knows(&self, name: &str) -> bool {
        self.states.contains_key(name)
    }

    pub fn names(&self) -> impl Iterator<Item = &str> {
        self.states.keys().map(String::as_str)
    }
}
