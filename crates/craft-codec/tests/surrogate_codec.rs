use bytes::Bytes;
use craft_codec::nbt::{self, Compound, Tag};
use craft_codec::{
    DecodeError, Decoded, ObjectInstance, SurrogateBytes, SurrogateCodec, encode_detached,
    has_marker,
};
use craft_compat::{CapabilityTable, StaticProbe};
use craft_content::{DefinitionSet, DefinitionSource, FieldValue, FieldValues, Key};
use craft_mapping::{HostVersion, MappingTable, NativeCatalogue};

const CONTENT: &str = r#"
[[content]]
key = "lamp"
fields = [
    { name = "power", type = "int", max = 15 },
    { name = "lit", type = "bool" },
    { name = "label", type = "text", max_len = 32 },
    { name = "tags", type = "list", of = { type = "enum", values = ["warm", "cold"] } },
]

[[content]]
key = "crate"
kind = "item"
"#;

struct Fixture {
    defs: DefinitionSet,
    table: MappingTable,
}

impl Fixture {
    fn new(content: &str) -> Self {
        let caps = CapabilityTable::probe_well_known(&StaticProbe::new());
        let defs = DefinitionSet::load(&[DefinitionSource::parse("c.toml", content).unwrap()], &caps)
            .unwrap();
        let cat = NativeCatalogue::new(HostVersion::V1_21_4, "minecraft:barrier")
            .with_pool("note_block", "minecraft:note_block", 0, 800)
            .with_pool("item_model", "minecraft:paper", 1000, 100);
        let table = MappingTable::build(&defs, &cat).unwrap();
        Self { defs, table }
    }

    fn codec(&self) -> SurrogateCodec<'_> {
        SurrogateCodec::new(&self.defs, &self.table)
    }
}

fn key(s: &str) -> Key {
    s.parse().unwrap()
}

fn lamp() -> ObjectInstance {
    ObjectInstance::new(
        key("lamp"),
        FieldValues::from([
            ("power".to_string(), FieldValue::Int(11)),
            ("lit".to_string(), FieldValue::Bool(true)),
            ("label".to_string(), FieldValue::Text("hall".into())),
            (
                "tags".to_string(),
                FieldValue::List(vec![FieldValue::Enum("cold".into())]),
            ),
        ]),
    )
}

#[test]
fn encode_then_decode_is_identity() {
    let fx = Fixture::new(CONTENT);
    let bytes = fx.codec().encode(&lamp()).unwrap();
    assert!(has_marker(bytes.as_slice()));
    assert_eq!(fx.codec().decode(&bytes).unwrap(), lamp());

    // the host sees a plain native record: id + state inside the lamp's range
    let (_, root) = nbt::read_root(bytes.as_slice()).unwrap();
    assert_eq!(root.get("id"), Some(&Tag::String("minecraft:note_block".into())));
    let mapping = fx.table.resolve(&key("lamp")).unwrap();
    match root.get("state") {
        Some(Tag::Int(s)) => assert!(mapping.surrogate.contains("minecraft:note_block", *s as u32)),
        other => panic!("unexpected state {other:?}"),
    }
}

#[test]
fn encoding_is_deterministic() {
    let fx = Fixture::new(CONTENT);
    assert_eq!(fx.codec().encode(&lamp()).unwrap(), fx.codec().encode(&lamp()).unwrap());
}

#[test]
fn unmarked_native_state_decodes_by_reverse_lookup() {
    let fx = Fixture::new(CONTENT);
    let mapping = fx.table.resolve(&key("lamp")).unwrap();
    let root = Compound::new()
        .with("id", Tag::String("minecraft:note_block".into()))
        .with("state", Tag::Int(mapping.native_state(3).unwrap() as i32));
    let bytes = SurrogateBytes::new(nbt::write_root("", &root));
    let obj = fx.codec().decode(&bytes).unwrap();
    assert_eq!(obj.key, key("lamp"));
    // packed layout is declaration order: power (4 bits) then lit
    assert_eq!(obj.values["power"], FieldValue::Int(3));
    assert_eq!(obj.values["lit"], FieldValue::Bool(false));
    assert_eq!(obj.values["label"], FieldValue::Text(String::new()));
}

#[test]
fn every_truncation_is_rejected_as_truncated() {
    let fx = Fixture::new(CONTENT);
    let bytes = fx.codec().encode(&lamp()).unwrap();
    for cut in 0..bytes.len() {
        let short = SurrogateBytes::new(bytes.bytes().slice(..cut));
        assert!(
            matches!(fx.codec().decode(&short), Err(DecodeError::Truncated { .. })),
            "cut at {cut}"
        );
    }
}

#[test]
fn schema_mismatch_is_detected() {
    let fx = Fixture::new(CONTENT);
    // a record claiming an out-of-range packed state
    let bytes = SurrogateBytes::new(nbt::write_root(
        "",
        &Compound::new()
            .with("id", Tag::String("minecraft:note_block".into()))
            .with("state", Tag::Int(0))
            .with(
                "craft",
                Tag::Compound(
                    Compound::new()
                        .with("key", Tag::String("craft:lamp".into()))
                        .with("packed", Tag::Int(1 << 20)),
                ),
            ),
    ));
    assert!(matches!(
        fx.codec().decode(&bytes),
        Err(DecodeError::SchemaMismatch { ref key, .. }) if key.as_str() == "craft:lamp"
    ));

    // a data field of the wrong type
    let bytes = SurrogateBytes::new(nbt::write_root(
        "",
        &Compound::new()
            .with("id", Tag::String("minecraft:note_block".into()))
            .with("state", Tag::Int(0))
            .with(
                "craft",
                Tag::Compound(
                    Compound::new()
                        .with("key", Tag::String("craft:lamp".into()))
                        .with("packed", Tag::Int(0))
                        .with("data", Tag::Compound(Compound::new().with("label", Tag::Int(4)))),
                ),
            ),
    ));
    assert!(matches!(fx.codec().decode(&bytes), Err(DecodeError::SchemaMismatch { .. })));
}

#[test]
fn unknown_records_round_trip_byte_for_byte() {
    let fx = Fixture::new(CONTENT);
    let without_lamp = Fixture::new("[[content]]\nkey = \"crate\"\nkind = \"item\"\n");
    let foreign: Vec<SurrogateBytes> = vec![
        fx.codec().encode(&lamp()).unwrap(),
        SurrogateBytes::from(Bytes::from_static(b"\x0a\x00\x00\x01\x00\x01x")),
        SurrogateBytes::from(vec![0xde, 0xad, 0xbe, 0xef]),
        SurrogateBytes::new(nbt::write_root(
            "chunk",
            &Compound::new()
                .with("id", Tag::String("minecraft:stone".into()))
                .with("state", Tag::Int(1)),
        )),
    ];
    for b in foreign {
        let decoded = without_lamp.codec().decode_lenient(&b);
        assert!(decoded.is_placeholder());
        assert_eq!(decoded.encode(&without_lamp.codec()).unwrap(), b);
    }
}

#[test]
fn removed_definition_decodes_to_placeholder_naming_its_key() {
    let fx = Fixture::new(CONTENT);
    let bytes = fx.codec().encode(&lamp()).unwrap();
    let later = Fixture::new("[[content]]\nkey = \"crate\"\nkind = \"item\"\n");
    match later.codec().decode_lenient(&bytes) {
        Decoded::Placeholder(unknown) => {
            assert_eq!(unknown.key(), Some(&key("lamp")));
            assert_eq!(unknown.bytes, bytes);
        }
        other => panic!("unexpected {other:?}"),
    }
}

#[test]
fn detached_objects_survive_until_remapped() {
    let fx = Fixture::new(CONTENT);
    let bytes = encode_detached(&lamp(), "minecraft:barrier");
    let (_, root) = nbt::read_root(bytes.as_slice()).unwrap();
    assert_eq!(root.get("id"), Some(&Tag::String("minecraft:barrier".into())));
    assert_eq!(fx.codec().decode(&bytes).unwrap(), lamp());
}

#[test]
fn encode_rejects_values_outside_the_schema() {
    let fx = Fixture::new(CONTENT);
    let mut bad = lamp();
    bad.values.insert("power".into(), FieldValue::Int(16));
    assert!(fx.codec().encode(&bad).is_err());
    let unknown = ObjectInstance::new(key("ghost"), FieldValues::new());
    assert!(fx.codec().encode(&unknown).is_err());
}
