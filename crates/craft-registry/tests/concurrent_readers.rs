use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::thread;

use craft_codec::ObjectInstance;
use craft_compat::{CapabilityTable, StaticProbe};
use craft_content::{DefinitionSource, FieldValue, Key};
use craft_mapping::{Catalogues, HostVersion, NativeCatalogue};
use craft_registry::{Phase, Registry, RegistrySnapshot};

const VERSIONS: [HostVersion; 3] = [HostVersion::V1_20_1, HostVersion::V1_20_6, HostVersion::V1_21_4];

const FORWARD: &str = r#"
[[content]]
key = "alpha"
fields = [{ name = "lit", type = "bool" }]
[[content]]
key = "beta"
[[content]]
key = "gamma"
fields = [{ name = "power", type = "int", max = 3 }]
"#;

// Same keys in reverse, plus one only this set has.
const REVERSED: &str = r#"
[[content]]
key = "gamma"
fields = [{ name = "power", type = "int", max = 3 }]
[[content]]
key = "beta"
[[content]]
key = "alpha"
fields = [{ name = "lit", type = "bool" }]
[[content]]
key = "delta"
"#;

fn registry() -> Registry {
    let mut cats = Catalogues::new();
    for v in VERSIONS {
        cats.insert(
            NativeCatalogue::new(v, "minecraft:barrier")
                .with_pool("note_block", "minecraft:note_block", 1, 799),
        );
    }
    Registry::new(
        cats,
        CapabilityTable::probe_well_known(&StaticProbe::new()),
        VERSIONS.to_vec(),
    )
    .unwrap()
}

fn keys_of(snap: &RegistrySnapshot) -> Vec<Key> {
    snap.definitions.iter().map(|d| d.key.clone()).collect()
}

/// Every table in the snapshot was built from exactly the snapshot's definitions.
fn assert_untorn(snap: &RegistrySnapshot) {
    let keys = keys_of(snap);
    for (v, table) in &snap.tables {
        let mapped: Vec<Key> = table.iter().map(|m| m.key.clone()).collect();
        assert_eq!(mapped, keys, "{v} table disagrees with generation {}", snap.generation);
    }
}

#[test]
fn readers_never_see_a_torn_snapshot() {
    let registry = Arc::new(registry());
    registry
        .reload(&[DefinitionSource::parse("forward.toml", FORWARD).unwrap()])
        .unwrap();
    let forward = vec![DefinitionSource::parse("forward.toml", FORWARD).unwrap()];
    let reversed = vec![DefinitionSource::parse("reversed.toml", REVERSED).unwrap()];
    let done = Arc::new(AtomicBool::new(false));

    let readers: Vec<_> = (0..8)
        .map(|i| {
            let registry = registry.clone();
            let done = done.clone();
            thread::spawn(move || {
                let version = VERSIONS[i % VERSIONS.len()];
                let alpha: Key = "alpha".parse().unwrap();
                let mut last_generation = 0;
                let mut reads = 0u64;
                while !done.load(Ordering::Acquire) || reads < 100 {
                    let snap = registry.snapshot();
                    assert!(snap.generation >= last_generation);
                    last_generation = snap.generation;
                    assert_untorn(&snap);

                    // alpha exists in both sets and keeps its surrogate across swaps
                    let mapping = registry.resolve(version, &alpha).unwrap();
                    assert_eq!(mapping.surrogate.count, 2);

                    let mut values = snap.definitions.get(&alpha).unwrap().schema.defaults();
                    values.insert("lit".into(), FieldValue::Bool(reads % 2 == 0));
                    let instance = ObjectInstance::new(alpha.clone(), values);
                    let bytes = registry.encode(&instance, version).unwrap();
                    assert_eq!(registry.decode(&bytes, version).unwrap(), instance);
                    reads += 1;
                }
                reads
            })
        })
        .collect();

    for round in 0..50 {
        let sources = if round % 2 == 0 { &reversed } else { &forward };
        let report = registry.reload(sources).unwrap();
        assert_eq!(report.generation, round + 2);
        assert_eq!(report.versions, VERSIONS);
    }
    done.store(true, Ordering::Release);

    for r in readers {
        assert!(r.join().unwrap() >= 100);
    }
    assert_eq!(registry.phase(), Phase::Stable);
    assert_eq!(registry.generation(), 51);
    // last reload was the forward set
    assert_eq!(keys_of(&registry.snapshot()).len(), 3);
}

#[test]
fn rejected_reloads_race_with_readers_without_effect() {
    let registry = Arc::new(registry());
    registry
        .reload(&[DefinitionSource::parse("forward.toml", FORWARD).unwrap()])
        .unwrap();
    let manifest = registry
        .snapshot()
        .table(HostVersion::V1_21_4)
        .unwrap()
        .manifest()
        .unwrap();

    let writer = {
        let registry = registry.clone();
        thread::spawn(move || {
            // unknown field type: always rejected
            let bad = vec![
                DefinitionSource::parse(
                    "bad.toml",
                    "[[content]]\nkey = \"x\"\nfields = [{ name = \"f\", type = \"map\" }]\n",
                )
                .unwrap(),
            ];
            for _ in 0..50 {
                assert!(registry.reload(&bad).is_err());
            }
        })
    };
    for _ in 0..500 {
        let snap = registry.snapshot();
        assert_eq!(snap.generation, 1);
        assert_untorn(&snap);
    }
    writer.join().unwrap();

    assert_eq!(registry.phase(), Phase::Stable);
    assert_eq!(
        registry.snapshot().table(HostVersion::V1_21_4).unwrap().manifest().unwrap(),
        manifest
    );
}
