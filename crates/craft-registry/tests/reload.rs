use std::sync::Arc;

use craft_codec::{DecodeError, Decoded, ObjectInstance};
use craft_compat::{CapabilityTable, StaticProbe, well_known};
use craft_content::{DefinitionError, DefinitionSource, FieldValue, Key};
use craft_mapping::{Catalogues, HostVersion, MappingConflict, NativeCatalogue, UnmappedKey};
use craft_registry::{Phase, Registry, ReloadError};

const V: HostVersion = HostVersion::V1_21_4;

fn key(s: &str) -> Key {
    s.parse().unwrap()
}

fn source(text: &str) -> Vec<DefinitionSource> {
    vec![DefinitionSource::parse("content.toml", text).unwrap()]
}

fn catalogues(slots: u32) -> Catalogues {
    let mut cats = Catalogues::new();
    for v in [HostVersion::V1_20_1, HostVersion::V1_21_4] {
        cats.insert(
            NativeCatalogue::new(v, "minecraft:barrier")
                .with_pool("note_block", "minecraft:note_block", 1, slots)
                .with_pool("item_model", "minecraft:paper", 1000, 64),
        );
    }
    cats
}

fn registry(slots: u32, model_engine: bool) -> Registry {
    let mut probe = StaticProbe::new();
    if model_engine {
        probe = probe.with(well_known::MODEL_ENGINE, Some("R4.0.8"));
    }
    Registry::new(
        catalogues(slots),
        CapabilityTable::probe_well_known(&probe),
        vec![HostVersion::V1_20_1, V],
    )
    .unwrap()
}

const A_B: &str = "[[content]]\nkey = \"a\"\n[[content]]\nkey = \"b\"\n";
const B: &str = "[[content]]\nkey = \"b\"\n";
const A_B_C_D: &str = "[[content]]\nkey = \"a\"\n[[content]]\nkey = \"b\"\n[[content]]\nkey = \"c\"\n[[content]]\nkey = \"d\"\n";

#[test]
fn starts_empty_and_stable() {
    let reg = registry(4, false);
    assert_eq!(reg.generation(), 0);
    assert_eq!(reg.phase(), Phase::Stable);
    assert_eq!(
        reg.resolve(V, &key("a")).unwrap_err(),
        UnmappedKey { version: V, key: key("a") }
    );
    let versions: Vec<_> = reg.snapshot().versions().collect();
    assert_eq!(versions, [HostVersion::V1_20_1, V]);
}

#[test]
fn remove_then_exhaust_scenario() {
    let reg = registry(3, false);

    let report = reg.reload(&source(A_B)).unwrap();
    assert_eq!(report.generation, 1);
    assert_eq!(report.definitions, 2);
    let a = reg.resolve(V, &key("a")).unwrap();
    let b = reg.resolve(V, &key("b")).unwrap();
    assert_ne!(a.surrogate, b.surrogate);

    // a removed: a is unmapped, b keeps exactly what it had
    reg.reload(&source(B)).unwrap();
    assert_eq!(reg.resolve(V, &key("a")).unwrap_err().key, key("a"));
    assert_eq!(reg.resolve(V, &key("b")).unwrap().surrogate, b.surrogate);

    // back to a and b, then two more with a single slot left
    reg.reload(&source(A_B)).unwrap();
    let before = reg.snapshot();
    let err = reg.reload(&source(A_B_C_D)).unwrap_err();
    assert!(matches!(
        err,
        ReloadError::Mapping(MappingConflict::CatalogueExhausted { ref key, remaining: 0, .. })
            if key.as_str() == "craft:d"
    ));
    assert_eq!(reg.phase(), Phase::Stable);
    assert_eq!(reg.generation(), before.generation);
    assert!(reg.resolve(V, &key("a")).is_ok());
    assert_eq!(reg.resolve(V, &key("b")).unwrap().surrogate, b.surrogate);
    assert!(reg.resolve(V, &key("c")).is_err());
    assert_eq!(
        reg.snapshot().table(V).unwrap().manifest().unwrap(),
        before.table(V).unwrap().manifest().unwrap()
    );
}

#[test]
fn invalid_content_keeps_the_last_good_snapshot() {
    let reg = registry(8, false);
    reg.reload(&source(A_B)).unwrap();
    let err = reg
        .reload(&source("[[content]]\nkey = \"a\"\n[[content]]\nkey = \"craft:a\"\n"))
        .unwrap_err();
    assert!(matches!(err, ReloadError::Definition(DefinitionError::DuplicateKey { .. })));
    assert_eq!(reg.generation(), 1);
    assert!(reg.resolve(V, &key("b")).is_ok());
}

#[test]
fn missing_capability_never_resolves() {
    let content = r#"
[[content]]
key = "statue"
kind = "furniture"
family = "note_block"
requires = ["model-engine"]
appearance = { external = "statue_rig" }

[[content]]
key = "wand"
kind = "item"
"#;
    let without = registry(8, false);
    let report = without.reload(&source(content)).unwrap();
    assert_eq!(report.definitions, 1);
    assert_eq!(report.excluded.len(), 1);
    assert_eq!(report.excluded[0].key, key("statue"));
    assert!(without.resolve(V, &key("statue")).is_err());
    assert!(without.resolve(V, &key("wand")).is_ok());
    assert_eq!(without.snapshot().excluded, report.excluded);

    let with = registry(8, true);
    assert!(with.reload(&source(content)).unwrap().excluded.is_empty());
    assert!(with.resolve(V, &key("statue")).is_ok());
}

#[test]
fn encode_decode_through_the_facade() {
    let reg = registry(32, false);
    reg.reload(&source(
        "[[content]]\nkey = \"lamp\"\nfields = [{ name = \"power\", type = \"int\", max = 15 }]\n",
    ))
    .unwrap();
    let mut values = reg
        .snapshot()
        .definitions
        .get(&key("lamp"))
        .unwrap()
        .schema
        .defaults();
    values.insert("power".into(), FieldValue::Int(9));
    let lamp = ObjectInstance::new(key("lamp"), values);

    for v in [HostVersion::V1_20_1, V] {
        let bytes = reg.encode(&lamp, v).unwrap();
        assert_eq!(reg.decode(&bytes, v).unwrap(), lamp);
    }

    // a version with no table only knows that nothing is mapped
    let bytes = reg.encode(&lamp, V).unwrap();
    assert!(reg.encode(&lamp, HostVersion::V1_20_4).is_err());
    assert!(matches!(
        reg.decode(&bytes, HostVersion::V1_20_4),
        Err(DecodeError::UnknownSurrogate { .. })
    ));
    assert!(matches!(
        reg.decode_lenient(&bytes, HostVersion::V1_20_4),
        Decoded::Placeholder(_)
    ));
}

#[test]
fn set_versions_rebuilds_and_rejects_unknown_catalogues() {
    let reg = registry(8, false);
    reg.reload(&source(A_B)).unwrap();

    let report = reg.set_versions(vec![V]).unwrap();
    assert_eq!(report.versions, [V]);
    assert_eq!(report.definitions, 2);
    assert!(reg.resolve(HostVersion::V1_20_1, &key("a")).is_err());
    assert!(reg.resolve(V, &key("a")).is_ok());

    let err = reg.set_versions(vec![V, HostVersion::V1_20_6]).unwrap_err();
    assert_eq!(err, ReloadError::MissingCatalogue(HostVersion::V1_20_6));
    assert_eq!(reg.generation(), report.generation);

    // the rejected version list was not kept
    let next = reg.reload(&source(A_B)).unwrap();
    assert_eq!(next.versions, [V]);
}

#[test]
fn definitions_change_only_with_a_published_snapshot() {
    let reg = registry(3, false);
    assert!(reg.definitions().is_empty());
    reg.reload(&source(A_B)).unwrap();
    let published = reg.definitions();
    assert_eq!(published.len(), 2);
    assert!(Arc::ptr_eq(&published, &reg.snapshot().definitions));

    // content that parses but cannot be mapped leaves the definitions alone
    assert!(reg.reload(&source(A_B_C_D)).is_err());
    assert!(Arc::ptr_eq(&published, &reg.definitions()));
    assert!(!reg.definitions().contains(&key("c")));

    reg.set_versions(vec![V]).unwrap();
    assert!(Arc::ptr_eq(&published, &reg.definitions()));
}

#[test]
fn fallback_native_comes_from_each_catalogue() {
    let mut cats = catalogues(8);
    cats.insert(
        NativeCatalogue::new(HostVersion::V1_20_4, "minecraft:structure_void")
            .with_pool("note_block", "minecraft:note_block", 1, 8),
    );
    let reg = Registry::new(
        cats,
        CapabilityTable::probe_well_known(&StaticProbe::new()),
        vec![V],
    )
    .unwrap();
    assert_eq!(reg.fallback(V), Some("minecraft:barrier"));
    assert_eq!(reg.fallback(HostVersion::V1_20_4), Some("minecraft:structure_void"));
    assert_eq!(reg.fallback(HostVersion::V1_20_6), None);

    // inactive and uncatalogued versions both decode against an empty table
    reg.reload(&source(B)).unwrap();
    let bytes = reg
        .encode(&ObjectInstance::new(key("b"), Default::default()), V)
        .unwrap();
    for v in [HostVersion::V1_20_4, HostVersion::V1_20_6] {
        assert!(reg.decode_lenient(&bytes, v).is_placeholder());
    }
}
