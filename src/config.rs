use std::collections::BTreeMap;
use std::error::Error;
use std::fs;
use std::path::{Path, PathBuf};

use craft_compat::{CapabilityTable, StaticProbe};
use craft_content::{DefinitionError, DefinitionSource};
use craft_mapping::{Catalogues, HostVersion};
use serde::Deserialize;

/// A capability override: `true`/`false`, or the provider version string.
#[derive(Clone, Debug, Deserialize, PartialEq, Eq)]
#[serde(untagged)]
pub enum CapabilitySetting {
    Enabled(bool),
    Version(String),
}

/// Operator configuration, usually `craft.toml`.
#[derive(Clone, Debug, Deserialize)]
#[serde(default)]
pub struct CoreConfig {
    pub content_dirs: Vec<PathBuf>,
    pub catalogue: PathBuf,
    pub versions: Vec<HostVersion>,
    pub workers: usize,
    pub region_size: i32,
    /// Reload content while `simulate` runs. `craft watch` always reloads.
    pub watch: bool,
    pub capabilities: BTreeMap<String, CapabilitySetting>,
}

impl Default for CoreConfig {
    fn default() -> Self {
        Self {
            content_dirs: vec![PathBuf::from("content")],
            catalogue: PathBuf::from("catalogue.toml"),
            versions: vec![HostVersion::V1_21_4],
            workers: 4,
            region_size: 512,
            watch: false,
            capabilities: BTreeMap::new(),
        }
    }
}

impl CoreConfig {
    pub fn from_toml_str(toml_str: &str) -> Result<Self, Box<dyn Error>> {
        let cfg: CoreConfig = toml::from_str(toml_str)?;
        if cfg.region_size <= 0 {
            return Err(format!("region_size must be positive, got {}", cfg.region_size).into());
        }
        if cfg.versions.is_empty() {
            return Err("at least one host version must be active".into());
        }
        Ok(cfg)
    }

    /// Loads `path`; relative paths inside are taken relative to its directory.
    pub fn from_path(path: impl AsRef<Path>) -> Result<Self, Box<dyn Error>> {
        let path = path.as_ref();
        let s = fs::read_to_string(path)?;
        let mut cfg = Self::from_toml_str(&s)?;
        if let Some(base) = path.parent() {
            cfg.rebase(base);
        }
        Ok(cfg)
    }

    fn rebase(&mut self, base: &Path) {
        let join = |p: &PathBuf| if p.is_relative() { base.join(p) } else { p.clone() };
        self.content_dirs = self.content_dirs.iter().map(join).collect();
        self.catalogue = join(&self.catalogue);
    }

    pub fn probe(&self) -> StaticProbe {
        self.capabilities
            .iter()
            .fold(StaticProbe::new(), |probe, (name, setting)| match setting {
                CapabilitySetting::Enabled(true) => probe.with(name.as_str(), None),
                CapabilitySetting::Enabled(false) => probe,
                CapabilitySetting::Version(v) => probe.with(name.as_str(), Some(v.as_str())),
            })
    }

    pub fn capability_table(&self) -> CapabilityTable {
        CapabilityTable::probe_well_known(&self.probe())
    }

    pub fn catalogues(&self) -> Result<Catalogues, Box<dyn Error>> {
        Catalogues::from_path(&self.catalogue)
            .map_err(|e| format!("{}: {}", self.catalogue.display(), e).into())
    }

    /// Content files from every configured directory, in directory order.
    pub fn sources(&self) -> Result<Vec<DefinitionSource>, DefinitionError> {
        let mut out = Vec::new();
        for dir in &self.content_dirs {
            out.extend(DefinitionSource::from_dir(dir)?);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use craft_compat::well_known;

    #[test]
    fn defaults_fill_missing_keys() {
        let cfg = CoreConfig::from_toml_str("workers = 2\n").unwrap();
        assert_eq!(cfg.workers, 2);
        assert_eq!(cfg.region_size, 512);
        assert_eq!(cfg.versions, [HostVersion::V1_21_4]);
        assert!(!cfg.watch);
    }

    #[test]
    fn rejects_bad_values() {
        assert!(CoreConfig::from_toml_str("region_size = 0\n").is_err());
        assert!(CoreConfig::from_toml_str("versions = []\n").is_err());
        assert!(CoreConfig::from_toml_str("versions = [\"1.8.9\"]\n").is_err());
    }

    #[test]
    fn capability_overrides_feed_the_probe() {
        let cfg = CoreConfig::from_toml_str(
            r#"
            [capabilities]
            model-engine = "R4.0.8"
            placeholder = true
            better-model = false
            "#,
        )
        .unwrap();
        let table = cfg.capability_table();
        assert!(table.is_present(well_known::MODEL_ENGINE));
        assert!(table.is_present(well_known::PLACEHOLDER));
        assert!(!table.is_present(well_known::BETTER_MODEL));
        assert!(!table.is_present(well_known::PERMISSIONS));
    }

    #[test]
    fn shipped_configuration_loads_and_maps() {
        let root = Path::new(env!("CARGO_MANIFEST_DIR"));
        let cfg = CoreConfig::from_path(root.join("craft.toml")).unwrap();
        let registry = craft_registry::Registry::new(
            cfg.catalogues().unwrap(),
            cfg.capability_table(),
            cfg.versions.clone(),
        )
        .unwrap();
        let report = registry.reload(&cfg.sources().unwrap()).unwrap();
        assert!(report.excluded.is_empty());
        assert_eq!(report.versions, [HostVersion::V1_20_4, HostVersion::V1_21_4]);
        let lamp = "craft:lamp".parse().unwrap();
        assert!(registry.resolve(HostVersion::V1_20_4, &lamp).is_ok());
        assert!(registry.resolve(HostVersion::V1_21_4, &lamp).is_ok());
    }

    #[test]
    fn paths_are_relative_to_the_config_file() {
        let dir = tempfile::tempdir().unwrap();
        let content = dir.path().join("packs");
        fs::create_dir(&content).unwrap();
        fs::write(
            content.join("ores.toml"),
            "[[content]]\nkey = \"ruby_ore\"\n",
        )
        .unwrap();
        fs::write(
            dir.path().join("catalogue.toml"),
            "[[version]]\nid = \"1.21.4\"\n[[version.pool]]\nfamily = \"note_block\"\nnative = \"minecraft:note_block\"\ncount = 10\n",
        )
        .unwrap();
        let path = dir.path().join("craft.toml");
        fs::write(&path, "content_dirs = [\"packs\"]\nversions = [\"1.21.4\"]\n").unwrap();

        let cfg = CoreConfig::from_path(&path).unwrap();
        assert_eq!(cfg.content_dirs, [content]);
        assert_eq!(cfg.sources().unwrap().len(), 1);
        let cats = cfg.catalogues().unwrap();
        assert_eq!(cats.get(HostVersion::V1_21_4).unwrap().remaining("note_block"), 10);
    }
}
