use craft_content::config::FieldDef;
use craft_content::{FieldValue, FieldValues, Schema};
use proptest::prelude::*;

fn int_field(name: &str, min: i64, span: i64) -> FieldDef {
    FieldDef {
        name: name.into(),
        ty: "int".into(),
        min: Some(min),
        max: Some(min + span - 1),
        values: None,
        max_len: None,
        of: None,
        default: None,
    }
}

fn enum_field(name: &str, n: usize) -> FieldDef {
    FieldDef {
        name: name.into(),
        ty: "enum".into(),
        min: None,
        max: None,
        values: Some((0..n).map(|i| format!("v{i}")).collect()),
        max_len: None,
        of: None,
        default: None,
    }
}

proptest! {
    // Any admissible assignment of state fields survives pack -> unpack
    #[test]
    fn pack_unpack_roundtrip(
        min in -1000i64..1000,
        span in 1i64..=300,
        n in 1usize..=40,
        pick_int in any::<u16>(),
        pick_enum in any::<u8>(),
        flag in any::<bool>(),
    ) {
        let schema = Schema::compile(&[
            int_field("a", min, span),
            enum_field("b", n),
            FieldDef {
                name: "c".into(),
                ty: "bool".into(),
                min: None,
                max: None,
                values: None,
                max_len: None,
                of: None,
                default: None,
            },
        ]).unwrap();
        let a = min + (pick_int as i64 % span);
        let b = format!("v{}", pick_enum as usize % n);
        let values = FieldValues::from([
            ("a".to_string(), FieldValue::Int(a as i32)),
            ("b".to_string(), FieldValue::Enum(b)),
            ("c".to_string(), FieldValue::Bool(flag)),
        ]);
        let packed = schema.pack(&values).unwrap();
        prop_assert!(schema.packed_bits() == 32 || packed >> schema.packed_bits() == 0);
        prop_assert_eq!(schema.unpack(packed).unwrap(), values);
    }

    // Distinct assignments never collide in the packed state
    #[test]
    fn packing_is_injective(span in 2i64..=64, x in 0i64..64, y in 0i64..64) {
        prop_assume!(x < span && y < span && x != y);
        let schema = Schema::compile(&[int_field("a", 0, span)]).unwrap();
        let px = schema.pack(&FieldValues::from([("a".to_string(), FieldValue::Int(x as i32))])).unwrap();
        let py = schema.pack(&FieldValues::from([("a".to_string(), FieldValue::Int(y as i32))])).unwrap();
        prop_assert_ne!(px, py);
    }
}
