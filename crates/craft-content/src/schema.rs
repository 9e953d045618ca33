use std::collections::{BTreeMap, HashMap, HashSet};

use thiserror::Error;

use crate::config::{ElementDef, FieldDef};

pub const MAX_PACKED_BITS: u32 = 32;
pub const MAX_INT_SPAN: i64 = 1 << 16;
pub const MAX_ENUM_VALUES: usize = 256;
pub const MAX_TEXT_LEN: usize = 4096;
pub const MAX_LIST_LEN: usize = 256;
const DEFAULT_TEXT_LEN: usize = 256;
const DEFAULT_LIST_LEN: usize = 16;

/// Logical values of an object, keyed by field name.
pub type FieldValues = BTreeMap<String, FieldValue>;

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldValue {
    Bool(bool),
    Int(i32),
    Enum(String),
    Text(String),
    List(Vec<FieldValue>),
}

impl FieldValue {
    pub fn as_int(&self) -> Option<i32> {
        match self {
            FieldValue::Int(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_bool(&self) -> Option<bool> {
        match self {
            FieldValue::Bool(v) => Some(*v),
            _ => None,
        }
    }

    pub fn as_str(&self) -> Option<&str> {
        match self {
            FieldValue::Enum(s) | FieldValue::Text(s) => Some(s),
            _ => None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Error)]
pub enum SchemaViolation {
    #[error("missing field '{field}'")]
    Missing { field: String },
    #[error("field '{field}' is not part of the schema")]
    Unknown { field: String },
    #[error("field '{field}' does not admit {value:?}")]
    Inadmissible { field: String, value: FieldValue },
    #[error("packed state {packed:#x} selects a value outside field '{field}'")]
    PackedOutOfRange { field: String, packed: u32 },
    #[error("packed state {packed:#x} sets bits beyond the {bits}-bit layout")]
    PackedOverflow { packed: u32, bits: u32 },
}

/// Element type: everything a field can be except a list.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ScalarType {
    Bool,
    Int { min: i32, max: i32 },
    Enum { values: Vec<String> },
    Text { max_len: usize },
}

impl ScalarType {
    /// Width in the packed state, or `None` for fields that travel as data.
    pub fn bits(&self) -> Option<u32> {
        match self {
            ScalarType::Bool => Some(1),
            ScalarType::Int { min, max } => Some(bits_for((*max as i64 - *min as i64 + 1) as u32)),
            ScalarType::Enum { values } => Some(bits_for(values.len() as u32)),
            ScalarType::Text { .. } => None,
        }
    }

    pub fn admits(&self, value: &FieldValue) -> bool {
        match (self, value) {
            (ScalarType::Bool, FieldValue::Bool(_)) => true,
            (ScalarType::Int { min, max }, FieldValue::Int(v)) => v >= min && v <= max,
            (ScalarType::Enum { values }, FieldValue::Enum(v)) => values.iter().any(|s| s == v),
            (ScalarType::Text { max_len }, FieldValue::Text(v)) => v.len() <= *max_len,
            _ => false,
        }
    }

    pub fn first_value(&self) -> FieldValue {
        match self {
            ScalarType::Bool => FieldValue::Bool(false),
            ScalarType::Int { min, .. } => FieldValue::Int(*min),
            ScalarType::Enum { values } => FieldValue::Enum(values.first().cloned().unwrap_or_default()),
            ScalarType::Text { .. } => FieldValue::Text(String::new()),
        }
    }

    fn index_of(&self, value: &FieldValue) -> Option<u32> {
        match (self, value) {
            (ScalarType::Bool, FieldValue::Bool(v)) => Some(*v as u32),
            (ScalarType::Int { min, max }, FieldValue::Int(v)) if v >= min && v <= max => {
                Some((*v as i64 - *min as i64) as u32)
            }
            (ScalarType::Enum { values }, FieldValue::Enum(v)) => {
                values.iter().position(|s| s == v).map(|i| i as u32)
            }
            _ => None,
        }
    }

    fn value_at(&self, index: u32) -> Option<FieldValue> {
        match self {
            ScalarType::Bool if index <= 1 => Some(FieldValue::Bool(index == 1)),
            ScalarType::Int { min, max } => {
                let v = *min as i64 + index as i64;
                (v <= *max as i64).then_some(FieldValue::Int(v as i32))
            }
            ScalarType::Enum { values } => values
                .get(index as usize)
                .map(|s| FieldValue::Enum(s.clone())),
            _ => None,
        }
    }

    fn from_toml(&self, v: &toml::Value) -> Option<FieldValue> {
        let value = match (self, v) {
            (ScalarType::Bool, toml::Value::Boolean(b)) => FieldValue::Bool(*b),
            (ScalarType::Int { .. }, toml::Value::Integer(i)) => {
                FieldValue::Int(i32::try_from(*i).ok()?)
            }
            (ScalarType::Enum { .. }, toml::Value::String(s)) => FieldValue::Enum(s.clone()),
            (ScalarType::Text { .. }, toml::Value::String(s)) => FieldValue::Text(s.clone()),
            _ => return None,
        };
        self.admits(&value).then_some(value)
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum FieldType {
    Scalar(ScalarType),
    List { of: ScalarType, max_len: usize },
}

impl FieldType {
    pub fn admits(&self, value: &FieldValue) -> bool {
        match (self, value) {
            (FieldType::Scalar(s), v) => s.admits(v),
            (FieldType::List { of, max_len }, FieldValue::List(items)) => {
                items.len() <= *max_len && items.iter().all(|i| of.admits(i))
            }
            _ => false,
        }
    }

    /// The scalar element type for list fields, or the scalar itself.
    pub fn element(&self) -> &ScalarType {
        match self {
            FieldType::Scalar(s) => s,
            FieldType::List { of, .. } => of,
        }
    }

    #[inline]
    pub fn is_list(&self) -> bool {
        matches!(self, FieldType::List { .. })
    }

    fn state_bits(&self) -> Option<u32> {
        match self {
            FieldType::Scalar(s) => s.bits(),
            FieldType::List { .. } => None,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct FieldSpec {
    pub name: String,
    pub ty: FieldType,
    pub default: FieldValue,
}

// Position of a state field inside the packed state
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct StateSlot {
    pub field: usize,
    pub bits: u32,
    pub offset: u32,
}

/// Compiled, validated data schema of one content type.
///
/// Bool, int and enum fields are bit-packed in declaration order into a
/// single `u32`; text and list fields are carried alongside as data.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct Schema {
    fields: Vec<FieldSpec>,
    index: HashMap<String, usize>,
    slots: Vec<StateSlot>,
    packed_bits: u32,
}

#[inline]
fn bits_for(count: u32) -> u32 {
    if count <= 1 {
        0
    } else {
        32 - (count - 1).leading_zeros()
    }
}

fn compile_scalar(
    ty: &str,
    min: Option<i64>,
    max: Option<i64>,
    values: Option<&Vec<String>>,
    max_len: Option<usize>,
) -> Result<ScalarType, String> {
    match ty {
        "bool" => Ok(ScalarType::Bool),
        "int" => {
            let min = min.unwrap_or(0);
            let max = max.ok_or_else(|| "int field needs 'max'".to_string())?;
            if min > max {
                return Err(format!("int range {min}..={max} is empty"));
            }
            if i32::try_from(min).is_err() || i32::try_from(max).is_err() {
                return Err(format!("int range {min}..={max} exceeds 32 bits"));
            }
            if max - min + 1 > MAX_INT_SPAN {
                return Err(format!(
                    "int range {min}..={max} spans more than {MAX_INT_SPAN} values"
                ));
            }
            Ok(ScalarType::Int {
                min: min as i32,
                max: max as i32,
            })
        }
        "enum" => {
            let values = values.cloned().unwrap_or_default();
            if values.is_empty() || values.len() > MAX_ENUM_VALUES {
                return Err(format!(
                    "enum needs 1..={MAX_ENUM_VALUES} values, got {}",
                    values.len()
                ));
            }
            let mut seen = HashSet::new();
            for v in &values {
                if !seen.insert(v.as_str()) {
                    return Err(format!("enum value '{v}' repeated"));
                }
            }
            Ok(ScalarType::Enum { values })
        }
        "text" => {
            let max_len = max_len.unwrap_or(DEFAULT_TEXT_LEN);
            if max_len == 0 || max_len > MAX_TEXT_LEN {
                return Err(format!("text max_len must be in 1..={MAX_TEXT_LEN}"));
            }
            Ok(ScalarType::Text { max_len })
        }
        other => Err(format!("unknown field type '{other}'")),
    }
}

fn compile_element(def: &ElementDef) -> Result<ScalarType, String> {
    if def.ty == "list" || def.of.is_some() {
        return Err("recursive field type: list elements must be scalar".into());
    }
    compile_scalar(&def.ty, def.min, def.max, def.values.as_ref(), def.max_len)
}

fn compile_field(def: &FieldDef) -> Result<FieldSpec, String> {
    if def.name.is_empty() {
        return Err("field with empty name".into());
    }
    let ty = if def.ty == "list" {
        let of = def
            .of
            .as_ref()
            .ok_or_else(|| format!("list field '{}' needs an element type 'of'", def.name))?;
        let of = compile_element(of).map_err(|e| format!("field '{}': {e}", def.name))?;
        let max_len = def.max_len.unwrap_or(DEFAULT_LIST_LEN);
        if max_len == 0 || max_len > MAX_LIST_LEN {
            return Err(format!(
                "field '{}': list max_len must be in 1..={MAX_LIST_LEN}",
                def.name
            ));
        }
        FieldType::List { of, max_len }
    } else {
        if def.of.is_some() {
            return Err(format!("field '{}': only lists take 'of'", def.name));
        }
        FieldType::Scalar(
            compile_scalar(&def.ty, def.min, def.max, def.values.as_ref(), def.max_len)
                .map_err(|e| format!("field '{}': {e}", def.name))?,
        )
    };
    let default = match (&def.default, &ty) {
        (None, FieldType::Scalar(s)) => s.first_value(),
        (None, FieldType::List { .. }) => FieldValue::List(Vec::new()),
        (Some(v), FieldType::Scalar(s)) => s
            .from_toml(v)
            .ok_or_else(|| format!("field '{}': default {v} is not admissible", def.name))?,
        (Some(toml::Value::Array(items)), FieldType::List { of, max_len }) => {
            if items.len() > *max_len {
                return Err(format!("field '{}': default list too long", def.name));
            }
            let mut out = Vec::with_capacity(items.len());
            for item in items {
                out.push(of.from_toml(item).ok_or_else(|| {
                    format!("field '{}': default element {item} is not admissible", def.name)
                })?);
            }
            FieldValue::List(out)
        }
        (Some(v), FieldType::List { .. }) => {
            return Err(format!("field '{}': default {v} is not a list", def.name));
        }
    };
    Ok(FieldSpec {
        name: def.name.clone(),
        ty,
        default,
    })
}

impl Schema {
    /// Compiles field declarations. The error is a human-readable reason.
    pub fn compile(defs: &[FieldDef]) -> Result<Schema, String> {
        let mut fields = Vec::with_capacity(defs.len());
        let mut index = HashMap::with_capacity(defs.len());
        for def in defs {
            let spec = compile_field(def)?;
            if index.insert(spec.name.clone(), fields.len()).is_some() {
                return Err(format!("field '{}' declared twice", spec.name));
            }
            fields.push(spec);
        }
        let mut slots = Vec::new();
        let mut offset: u32 = 0;
        for (i, f) in fields.iter().enumerate() {
            if let Some(bits) = f.ty.state_bits() {
                slots.push(StateSlot {
                    field: i,
                    bits,
                    offset,
                });
                offset = offset.saturating_add(bits);
            }
        }
        if offset > MAX_PACKED_BITS {
            return Err(format!(
                "state fields need {offset} bits, at most {MAX_PACKED_BITS} fit the packed state"
            ));
        }
        Ok(Schema {
            fields,
            index,
            slots,
            packed_bits: offset,
        })
    }

    #[inline]
    pub fn fields(&self) -> &[FieldSpec] {
        &self.fields
    }

    pub fn field(&self, name: &str) -> Option<&FieldSpec> {
        self.index.get(name).map(|&i| &self.fields[i])
    }

    #[inline]
    pub fn packed_bits(&self) -> u32 {
        self.packed_bits
    }

    #[inline]
    pub fn slots(&self) -> &[StateSlot] {
        &self.slots
    }

    /// Number of distinct packed states the layout can express.
    pub fn state_count(&self) -> u64 {
        1u64 << self.packed_bits
    }

    pub fn is_state_field(&self, name: &str) -> bool {
        self.index
            .get(name)
            .is_some_and(|&i| self.slots.iter().any(|s| s.field == i))
    }

    /// Fields carried outside the packed state.
    pub fn data_fields(&self) -> impl Iterator<Item = &FieldSpec> {
        self.fields.iter().filter(|f| f.ty.state_bits().is_none())
    }

    pub fn defaults(&self) -> FieldValues {
        self.fields
            .iter()
            .map(|f| (f.name.clone(), f.default.clone()))
            .collect()
    }

    /// Default values overlaid with `overrides`, validated.
    pub fn complete(&self, overrides: FieldValues) -> Result<FieldValues, SchemaViolation> {
        let mut values = self.defaults();
        for (name, value) in overrides {
            if !self.index.contains_key(&name) {
                return Err(SchemaViolation::Unknown { field: name });
            }
            values.insert(name, value);
        }
        self.validate(&values)?;
        Ok(values)
    }

    pub fn validate(&self, values: &FieldValues) -> Result<(), SchemaViolation> {
        for name in values.keys() {
            if !self.index.contains_key(name) {
                return Err(SchemaViolation::Unknown {
                    field: name.clone(),
                });
            }
        }
        for f in &self.fields {
            let v = values.get(&f.name).ok_or_else(|| SchemaViolation::Missing {
                field: f.name.clone(),
            })?;
            if !f.ty.admits(v) {
                return Err(SchemaViolation::Inadmissible {
                    field: f.name.clone(),
                    value: v.clone(),
                });
            }
        }
        Ok(())
    }

    /// Packs the state fields of `values`. Missing state fields pack as their default.
    pub fn pack(&self, values: &FieldValues) -> Result<u32, SchemaViolation> {
        let mut acc: u32 = 0;
        for slot in &self.slots {
            let f = &self.fields[slot.field];
            let v = values.get(&f.name).unwrap_or(&f.default);
            let idx = f
                .ty
                .element()
                .index_of(v)
                .ok_or_else(|| SchemaViolation::Inadmissible {
                    field: f.name.clone(),
                    value: v.clone(),
                })?;
            if slot.bits == 0 {
                continue;
            }
            acc |= idx << slot.offset;
        }
        Ok(acc)
    }

    /// Expands `packed` into state field values.
    pub fn unpack(&self, packed: u32) -> Result<FieldValues, SchemaViolation> {
        if self.packed_bits < 32 && packed >> self.packed_bits != 0 {
            return Err(SchemaViolation::PackedOverflow {
                packed,
                bits: self.packed_bits,
            });
        }
        let mut out = FieldValues::new();
        for slot in &self.slots {
            let f = &self.fields[slot.field];
            let mask: u32 = if slot.bits >= 32 {
                u32::MAX
            } else {
                (1u32 << slot.bits) - 1
            };
            let idx = (packed >> slot.offset) & mask;
            let value =
                f.ty.element()
                    .value_at(idx)
                    .ok_or_else(|| SchemaViolation::PackedOutOfRange {
                        field: f.name.clone(),
                        packed,
                    })?;
            out.insert(f.name.clone(), value);
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn field(name: &str, ty: &str) -> FieldDef {
        FieldDef {
            name: name.into(),
            ty: ty.into(),
            min: None,
            max: None,
            values: None,
            max_len: None,
            of: None,
            default: None,
        }
    }

    #[test]
    fn layout_follows_declaration_order() {
        let mut facing = field("facing", "enum");
        facing.values = Some(vec!["north".into(), "south".into(), "west".into(), "east".into()]);
        let mut power = field("power", "int");
        power.max = Some(15);
        let schema = Schema::compile(&[
            facing,
            field("label", "text"),
            field("lit", "bool"),
            power,
        ])
        .unwrap();
        let slots = schema.slots();
        assert_eq!(slots.len(), 3);
        assert_eq!((slots[0].bits, slots[0].offset), (2, 0));
        assert_eq!((slots[1].bits, slots[1].offset), (1, 2));
        assert_eq!((slots[2].bits, slots[2].offset), (4, 3));
        assert_eq!(schema.packed_bits(), 7);
        assert!(!schema.is_state_field("label"));
        assert_eq!(schema.data_fields().count(), 1);
    }

    #[test]
    fn pack_unpack_restores_state_fields() {
        let mut power = field("power", "int");
        power.min = Some(-3);
        power.max = Some(12);
        let schema = Schema::compile(&[field("lit", "bool"), power]).unwrap();
        let values = FieldValues::from([
            ("lit".to_string(), FieldValue::Bool(true)),
            ("power".to_string(), FieldValue::Int(7)),
        ]);
        let packed = schema.pack(&values).unwrap();
        assert_eq!(schema.unpack(packed).unwrap(), values);
    }

    #[test]
    fn unpack_rejects_out_of_range_indices() {
        let mut mode = field("mode", "enum");
        mode.values = Some(vec!["a".into(), "b".into(), "c".into()]);
        let schema = Schema::compile(&[mode]).unwrap();
        assert!(matches!(
            schema.unpack(3),
            Err(SchemaViolation::PackedOutOfRange { .. })
        ));
        assert!(matches!(
            schema.unpack(4),
            Err(SchemaViolation::PackedOverflow { .. })
        ));
    }

    #[test]
    fn rejects_recursive_and_unbounded_types() {
        let mut nested = field("xs", "list");
        nested.of = Some(Box::new(ElementDef {
            ty: "list".into(),
            min: None,
            max: None,
            values: None,
            max_len: None,
            of: None,
        }));
        let err = Schema::compile(&[nested]).unwrap_err();
        assert!(err.contains("recursive"), "{err}");

        let mut wide = field("n", "int");
        wide.max = Some(1 << 20);
        assert!(Schema::compile(&[wide]).is_err());

        let mut long = field("t", "text");
        long.max_len = Some(MAX_TEXT_LEN + 1);
        assert!(Schema::compile(&[long]).is_err());
    }

    #[test]
    fn rejects_layouts_wider_than_packed_state() {
        let defs: Vec<FieldDef> = (0..3)
            .map(|i| {
                let mut f = field(&format!("n{i}"), "int");
                f.max = Some((1 << 12) - 1);
                f
            })
            .collect();
        let err = Schema::compile(&defs).unwrap_err();
        assert!(err.contains("36 bits"), "{err}");
    }

    #[test]
    fn complete_fills_defaults_and_rejects_strangers() {
        let mut power = field("power", "int");
        power.max = Some(15);
        power.default = Some(toml::Value::Integer(4));
        let schema = Schema::compile(&[power, field("label", "text")]).unwrap();
        let values = schema.complete(FieldValues::new()).unwrap();
        assert_eq!(values["power"], FieldValue::Int(4));
        assert_eq!(values["label"], FieldValue::Text(String::new()));

        let err = schema
            .complete(FieldValues::from([("nope".to_string(), FieldValue::Bool(true))]))
            .unwrap_err();
        assert!(matches!(err, SchemaViolation::Unknown { .. }));

        let err = schema
            .complete(FieldValues::from([("power".to_string(), FieldValue::Int(16))]))
            .unwrap_err();
        assert!(matches!(err, SchemaViolation::Inadmissible { .. }));
    }
}
