use craft_compat::{CapabilityTable, StaticProbe, well_known};
use craft_content::{
    ContentKind, DefinitionError, DefinitionSet, DefinitionSource, DefinitionStore, FieldValue, Key,
};

const ORES: &str = r#"
[[content]]
key = "ruby_ore"
kind = "block"
fields = [
    { name = "lit", type = "bool" },
    { name = "facing", type = "enum", values = ["north", "east", "south", "west"] },
]
appearance = { model = "craft:block/ruby_ore", texture = "craft:block/ruby" }

[[content]]
key = "craft:lamp"
requires = ["model-engine"]
appearance = { external = "lamp_rig" }
fields = [{ name = "power", type = "int", max = 15, default = 7 }]
behaviors = [{ type = "adjustable_power" }]
"#;

const ITEMS: &str = r#"
[[content]]
key = "craft:ruby"
kind = "item"
fields = [
    { name = "lore", type = "list", of = { type = "text", max_len = 64 }, max_len = 4 },
]
"#;

fn capabilities(model_engine: bool) -> CapabilityTable {
    let mut probe = StaticProbe::new();
    if model_engine {
        probe = probe.with(well_known::MODEL_ENGINE, Some("R4.0.8"));
    }
    CapabilityTable::probe_well_known(&probe)
}

fn sources() -> Vec<DefinitionSource> {
    vec![
        DefinitionSource::parse("ores.toml", ORES).unwrap(),
        DefinitionSource::parse("items.toml", ITEMS).unwrap(),
    ]
}

#[test]
fn load_keeps_declaration_order() {
    let set = DefinitionSet::load(&sources(), &capabilities(true)).unwrap();
    let keys: Vec<String> = set.iter().map(|d| d.key.to_string()).collect();
    assert_eq!(keys, ["craft:ruby_ore", "craft:lamp", "craft:ruby"]);

    let ruby = set.get(&"craft:ruby".parse().unwrap()).unwrap();
    assert_eq!(ruby.kind, ContentKind::Item);
    assert_eq!(ruby.family, "item_model");
    assert_eq!(ruby.schema.packed_bits(), 0);

    let lamp = set.get(&"craft:lamp".parse().unwrap()).unwrap();
    assert_eq!(lamp.schema.defaults()["power"], FieldValue::Int(7));
    assert!(lamp.has_behavior("adjustable_power"));
    assert_eq!(lamp.appearance.model, "craft:lamp");
}

#[test]
fn duplicate_keys_across_files_are_rejected() {
    let mut srcs = sources();
    srcs.push(DefinitionSource::parse("dupe.toml", "[[content]]\nkey = \"ruby_ore\"\n").unwrap());
    let err = DefinitionSet::load(&srcs, &capabilities(true)).unwrap_err();
    match err {
        DefinitionError::DuplicateKey { key, first, second } => {
            assert_eq!(key, "craft:ruby_ore".parse::<Key>().unwrap());
            assert_eq!(first, "ores.toml");
            assert_eq!(second, "dupe.toml");
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn unknown_capability_is_a_load_error() {
    let src = DefinitionSource::parse(
        "x.toml",
        "[[content]]\nkey = \"x\"\nrequires = [\"hologram-renderer\"]\n",
    )
    .unwrap();
    let err = DefinitionSet::load(&[src], &capabilities(true)).unwrap_err();
    assert!(matches!(err, DefinitionError::UnknownCapability { ref capability, .. } if capability == "hologram-renderer"));
}

#[test]
fn behaviors_missing_fields_are_schema_errors() {
    let src = DefinitionSource::parse(
        "x.toml",
        "[[content]]\nkey = \"dial\"\nbehaviors = [{ type = \"adjustable_power\" }]\n",
    )
    .unwrap();
    let err = DefinitionSet::load(&[src], &capabilities(true)).unwrap_err();
    assert!(matches!(err, DefinitionError::InvalidSchema { .. }));
}

#[test]
fn absent_capability_excludes_definition() {
    let set = DefinitionSet::load(&sources(), &capabilities(false)).unwrap();
    let (kept, excluded) = set.exclude_unavailable(&capabilities(false));
    assert_eq!(kept.len(), 2);
    assert!(!kept.contains(&"craft:lamp".parse().unwrap()));
    assert_eq!(excluded.len(), 1);
    assert_eq!(excluded[0].key.as_str(), "craft:lamp");
}

#[test]
fn failed_reload_keeps_previous_snapshot() {
    let caps = capabilities(true);
    let store = DefinitionStore::default();
    let (first, _) = store.reload(&sources(), &caps).unwrap();
    assert_eq!(first.len(), 3);

    let broken = DefinitionSource::parse(
        "broken.toml",
        "[[content]]\nkey = \"bad\"\nfields = [{ name = \"n\", type = \"int\" }]\n",
    )
    .unwrap();
    assert!(store.reload(&[broken], &caps).is_err());
    let current = store.snapshot();
    assert!(std::sync::Arc::ptr_eq(&first, &current));
}

#[test]
fn parse_errors_name_their_origin() {
    let err = DefinitionSource::parse("oops.toml", "[[content]\n").unwrap_err();
    assert!(matches!(err, DefinitionError::Parse { ref origin, .. } if origin == "oops.toml"));
}
